use crate::error::EngineError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::people;
use serde_json::json;

/// Stand-in for the external account system.
fn users_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let username = get_required_str(req, "username")?;
    let nickname = get_optional_str(req, "nickname");
    let user = people::insert_user(conn, &username, nickname.as_deref()).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "users" }))
    })?;
    Ok(json!({ "user": user }))
}

fn students_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = get_required_str(req, "userId")?;
    let student = people::find_student_by_user(conn, &user_id)?
        .ok_or_else(|| EngineError::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => users_create(state, req),
        "students.get" => students_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
