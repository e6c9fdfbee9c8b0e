use crate::assembly::{self, RandomRequest};
use crate::error::{is_foreign_key_violation, EngineError};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional, get_optional_str, get_required_str, get_string_list, require_db};
use crate::ipc::types::{AppState, Request};
use crate::model::{Difficulty, ExamPaper, ExamPaperType, Question};
use crate::store::{papers, questions};
use crate::workbook;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn paper_summary(paper: &ExamPaper) -> serde_json::Value {
    json!({
        "id": paper.id,
        "name": paper.name,
        "paperType": paper.paper_type,
        "difficulty": paper.difficulty,
        "totalQuestions": paper.total_questions,
    })
}

/// Parses every sheet of the workbook and stores the clean ones. Sheets
/// with errors are reported and skipped; they never block the others.
fn papers_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let path = PathBuf::from(get_required_str(req, "path")?);
    let book = workbook::read_xlsx_file(&path).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;

    let mut outcome = state.codec.parse(&book);
    for (sheet, messages) in &outcome.errors {
        warn!(sheet = %sheet, errors = messages.len(), "sheet rejected during import");
    }

    let tx = conn.unchecked_transaction()?;
    for paper in outcome.papers.iter_mut() {
        papers::insert_paper(&tx, paper).map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "exam_papers", "name": paper.name }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        path = %path.to_string_lossy(),
        imported = outcome.papers.len(),
        rejected = outcome.errors.len(),
        "imported exam papers"
    );
    let imported: Vec<serde_json::Value> = outcome.papers.iter().map(paper_summary).collect();
    Ok(json!({ "papers": imported, "errors": outcome.errors }))
}

fn papers_export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let ids = get_string_list(req, "paperIds")?;
    let out_path = PathBuf::from(get_required_str(req, "outPath")?);

    let mut selected = Vec::with_capacity(ids.len());
    for id in &ids {
        let paper = papers::load_paper(conn, id)?.ok_or_else(|| {
            HandlerErr::new("not_found", "paper not found").with_details(json!({ "paperId": id }))
        })?;
        selected.push(paper);
    }

    let book = state.codec.generate(&selected);
    let sheets: Vec<&str> = book.sheets.iter().map(|s| s.name.as_str()).collect();
    let bytes = workbook::write_xlsx_file(&out_path, &book).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;

    info!(path = %out_path.to_string_lossy(), papers = selected.len(), bytes, "exported exam papers");
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "bytes": bytes,
        "sheets": sheets,
    }))
}

fn papers_random(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let request = RandomRequest {
        name: get_optional_str(req, "name"),
        ceiling: get_optional::<Difficulty>(req, "difficulty")?.filter(|d| *d != Difficulty::None),
        paper_type: get_optional(req, "paperType")?,
    };
    let paper = assembly::assemble_random(conn, &state.config.assembly(), &request)?;
    Ok(json!({ "paper": paper }))
}

fn papers_redo_incorrect(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let attempt_id = get_required_str(req, "attemptId")?;
    let paper = assembly::assemble_redo_incorrect(conn, &attempt_id)?;
    Ok(json!({ "paper": paper }))
}

/// Manual authoring from stored questions, kept in the given order.
fn papers_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(req, "name")?;
    let ids = get_string_list(req, "questionIds")?;
    if ids.is_empty() {
        return Err(HandlerErr::bad_params("questionIds must not be empty"));
    }

    let tx = conn.unchecked_transaction()?;
    let mut by_id = questions::questions_by_ids(&tx, &ids)?;
    let mut picked: Vec<Question> = Vec::with_capacity(ids.len());
    for id in &ids {
        let Some(q) = by_id.remove(id) else {
            return Err(HandlerErr::new("not_found", "question not found")
                .with_details(json!({ "questionId": id })));
        };
        picked.push(q);
    }

    let mut paper = ExamPaper {
        id: String::new(),
        name,
        paper_type: ExamPaperType::Create,
        difficulty: Difficulty::truncated_average(picked.iter().map(|q| q.difficulty)),
        total_questions: 0,
        questions: papers::links_for(picked),
    };
    papers::insert_paper(&tx, &mut paper).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "exam_papers" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(paper_id = %paper.id, questions = paper.total_questions, "created exam paper");
    Ok(json!({ "paper": paper }))
}

fn papers_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let paper_id = get_required_str(req, "paperId")?;
    let paper = papers::load_paper(conn, &paper_id)?
        .ok_or_else(|| EngineError::not_found("paper not found"))?;
    Ok(json!({ "paper": paper }))
}

fn papers_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "papers": [] }));
    };
    Ok(json!({ "papers": papers::list_papers(conn)? }))
}

fn papers_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let paper_id = get_required_str(req, "paperId")?;
    match papers::delete_paper(conn, &paper_id) {
        Ok(true) => Ok(json!({ "ok": true })),
        Ok(false) => Err(EngineError::not_found("paper not found").into()),
        Err(e) if is_foreign_key_violation(&e) => {
            Err(EngineError::conflict("paper is used by an examination or attempt").into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "papers.import" => papers_import(state, req),
        "papers.export" => papers_export(state, req),
        "papers.random" => papers_random(state, req),
        "papers.redoIncorrect" => papers_redo_incorrect(state, req),
        "papers.create" => papers_create(state, req),
        "papers.get" => papers_get(state, req),
        "papers.list" => papers_list(state, req),
        "papers.delete" => papers_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
