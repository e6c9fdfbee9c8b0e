use crate::error::EngineError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::ExaminationType;
use crate::store::{examinations, papers};
use serde_json::json;
use tracing::info;

fn examinations_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let paper_id = get_required_str(req, "paperId")?;
    let name = get_required_str(req, "name")?;
    let exam_type: ExaminationType = get_optional(req, "examType")?.unwrap_or_default();
    let duration_seconds = match req.params.get("durationSeconds") {
        None | Some(serde_json::Value::Null) => 0,
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => n,
            _ => {
                return Err(HandlerErr::bad_params("durationSeconds must be a non-negative integer")
                    .with_details(json!({ "durationSeconds": v })))
            }
        },
    };

    if papers::load_paper(conn, &paper_id)?.is_none() {
        return Err(EngineError::not_found("paper not found").into());
    }
    let exam = examinations::insert_examination(conn, &paper_id, &name, exam_type, duration_seconds)
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "examinations" }))
        })?;
    info!(examination_id = %exam.id, paper_id = %paper_id, "created examination");
    Ok(json!({ "examination": exam }))
}

fn examinations_publish(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let exam_id = get_required_str(req, "examinationId")?;
    let published = req
        .params
        .get("published")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if !examinations::set_published(conn, &exam_id, published)? {
        return Err(EngineError::not_found("examination not found").into());
    }
    info!(examination_id = %exam_id, published, "examination visibility changed");
    Ok(json!({ "examinationId": exam_id, "published": published }))
}

fn examinations_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let exam_id = get_required_str(req, "examinationId")?;
    let exam = examinations::find_examination(conn, &exam_id)?
        .ok_or_else(|| EngineError::not_found("examination not found"))?;
    Ok(json!({ "examination": exam }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "examinations.create" => examinations_create(state, req),
        "examinations.publish" => examinations_publish(state, req),
        "examinations.get" => examinations_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
