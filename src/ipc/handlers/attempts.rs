use crate::attempt::{self, Submission, SubmittedAnswer};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn attempts_create_by_paper(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = get_required_str(req, "userId")?;
    let paper_id = get_required_str(req, "paperId")?;
    let board = attempt::create_by_exam_paper(conn, &user_id, &paper_id)?;
    Ok(json!({ "board": board }))
}

fn attempts_create_by_examination(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = get_required_str(req, "userId")?;
    let exam_id = get_required_str(req, "examinationId")?;
    let board = attempt::create_by_examination(conn, &user_id, &exam_id)?;
    Ok(json!({ "board": board }))
}

fn attempts_submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let submission = Submission {
        attempt_id: get_required_str(req, "attemptId")?,
        answers: get_optional::<Vec<SubmittedAnswer>>(req, "answers")?.unwrap_or_default(),
        timeout: req
            .params
            .get("timeout")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };
    let result = attempt::submit(conn, &submission)?;
    Ok(json!({ "result": result }))
}

fn attempts_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let attempt_id = get_required_str(req, "attemptId")?;
    let review = attempt::review(conn, &attempt_id)?;
    Ok(json!({ "attempt": review }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attempts.createByPaper" => attempts_create_by_paper(state, req),
        "attempts.createByExamination" => attempts_create_by_examination(state, req),
        "attempts.submit" => attempts_submit(state, req),
        "attempts.get" => attempts_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
