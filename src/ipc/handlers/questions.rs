use crate::codec::PaperCodec;
use crate::error::{is_foreign_key_violation, EngineError};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional, get_optional_str, get_required_str, get_string_list, parse_params, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::Question;
use crate::store::questions::{self, QuestionFilter};
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

fn check_length(codec: &PaperCodec, field: &str, value: &str) -> Result<(), HandlerErr> {
    let max = codec.max_cell_chars();
    if value.chars().count() > max {
        return Err(HandlerErr::bad_params(format!("{field} exceeds {max} characters"))
            .with_details(json!({ "field": field })));
    }
    Ok(())
}

/// Normalizes an incoming question in place: trimmed text, validated
/// answer key, upper-case unique option codes. Every stored text obeys
/// the workbook cell limit so the question survives export and import.
/// Non-choice types drop their options.
fn normalize_question(codec: &PaperCodec, q: &mut Question) -> Result<(), HandlerErr> {
    q.text = q.text.trim().to_string();
    if q.text.is_empty() {
        return Err(HandlerErr::bad_params("question text is required"));
    }
    check_length(codec, "question text", &q.text)?;
    q.correct_answer = codec
        .validate_answer(q.question_type, q.correct_answer.trim())
        .map_err(HandlerErr::bad_params)?;
    check_length(codec, "correct answer", &q.correct_answer)?;

    if !q.question_type.has_options() {
        q.options.clear();
        return Ok(());
    }
    let mut seen = HashSet::new();
    for opt in q.options.iter_mut() {
        opt.code = opt.code.to_ascii_uppercase();
        if !opt.code.is_ascii_uppercase() {
            return Err(HandlerErr::bad_params("option codes must be letters A-Z")
                .with_details(json!({ "code": opt.code })));
        }
        if !seen.insert(opt.code) {
            return Err(HandlerErr::bad_params(format!("duplicate option code {}", opt.code)));
        }
        opt.text = opt.text.trim().to_string();
        if opt.text.is_empty() {
            return Err(HandlerErr::bad_params(format!("option {} text is required", opt.code)));
        }
        check_length(codec, "option text", &opt.text)?;
    }
    Ok(())
}

fn questions_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut q: Question = parse_params(req)?;
    q.id.clear();
    normalize_question(&state.codec, &mut q)?;

    let tx = conn.unchecked_transaction()?;
    questions::insert_question(&tx, &mut q).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "questions" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "question": q }))
}

fn questions_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "questions": [] }));
    };
    let filter = QuestionFilter {
        text: get_optional_str(req, "text"),
        question_type: get_optional(req, "type")?,
        difficulty: get_optional(req, "difficulty")?,
    };
    let list = questions::list_questions(conn, &filter)?;
    Ok(json!({ "questions": list }))
}

fn questions_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let question_id = get_required_str(req, "questionId")?;
    let q = questions::find_question(conn, &question_id)?
        .ok_or_else(|| EngineError::not_found("question not found"))?;
    Ok(json!({ "question": q }))
}

fn questions_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let question_id = get_required_str(req, "questionId")?;
    let mut q: Question = parse_params(req)?;
    q.id = question_id;
    normalize_question(&state.codec, &mut q)?;

    let tx = conn.unchecked_transaction()?;
    if !questions::update_question(&tx, &mut q)? {
        return Err(EngineError::not_found("question not found").into());
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    Ok(json!({ "question": q }))
}

/// Bulk delete. All or nothing: a question still used by a paper or an
/// attempt rejects the whole batch.
fn questions_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let ids = get_string_list(req, "questionIds")?;

    let tx = conn.unchecked_transaction()?;
    let removed = match questions::delete_questions(&tx, &ids) {
        Ok(n) => n,
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(EngineError::conflict("question is still used by a paper or attempt").into());
        }
        Err(e) => return Err(e.into()),
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    info!(removed, "deleted questions");
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "questions.create" => questions_create(state, req),
        "questions.get" => questions_get(state, req),
        "questions.list" => questions_list(state, req),
        "questions.update" => questions_update(state, req),
        "questions.delete" => questions_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
