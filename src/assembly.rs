//! Builds exam papers out of questions already in the bank.

use crate::error::{is_foreign_key_violation, EngineError, EngineResult};
use crate::model::{Difficulty, ExamPaper, ExamPaperType, Question, QuestionType};
use crate::store::{attempts, papers, questions};
use rusqlite::Connection;
use tracing::{info, warn};

pub const DEFAULT_PER_TYPE: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct AssemblyOptions {
    /// Cap on questions drawn for each question type.
    pub per_type: usize,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            per_type: DEFAULT_PER_TYPE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RandomRequest {
    pub name: Option<String>,
    /// Highest difficulty allowed; `None` draws from the whole bank.
    pub ceiling: Option<Difficulty>,
    pub paper_type: Option<ExamPaperType>,
}

/// Stratified random paper: up to `per_type` questions of each type, in
/// fixed type order, numbered from 1.
pub fn assemble_random(
    conn: &Connection,
    options: &AssemblyOptions,
    req: &RandomRequest,
) -> EngineResult<ExamPaper> {
    let tx = conn.unchecked_transaction()?;

    let mut pool: Vec<Question> = Vec::new();
    for question_type in QuestionType::ALL {
        pool.extend(questions::random_questions(
            &tx,
            question_type,
            req.ceiling,
            options.per_type,
        )?);
    }
    if pool.is_empty() {
        return Err(EngineError::not_found("no usable questions found"));
    }

    let difficulty = req
        .ceiling
        .unwrap_or_else(|| Difficulty::truncated_average(pool.iter().map(|q| q.difficulty)));
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "Random paper {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            )
        });

    let mut paper = ExamPaper {
        id: String::new(),
        name,
        paper_type: req.paper_type.unwrap_or(ExamPaperType::Random),
        difficulty,
        total_questions: 0,
        questions: papers::links_for(pool),
    };
    save_assembled(&tx, &mut paper)?;
    tx.commit()?;

    info!(
        paper_id = %paper.id,
        questions = paper.total_questions,
        "assembled random paper"
    );
    Ok(paper)
}

/// A paper made of the questions a student got wrong in a submitted
/// attempt, in attempt order.
pub fn assemble_redo_incorrect(conn: &Connection, attempt_id: &str) -> EngineResult<ExamPaper> {
    let tx = conn.unchecked_transaction()?;

    let Some(attempt) = attempts::load_attempt(&tx, attempt_id)? else {
        return Err(EngineError::not_found("attempt not found"));
    };
    if !attempt.is_submission {
        return Err(EngineError::conflict("attempt has not been submitted"));
    }

    let wrong: Vec<String> = attempt
        .answers
        .iter()
        .filter(|a| a.is_correct == Some(false))
        .map(|a| a.question_id.clone())
        .collect();
    let mut by_id = questions::questions_by_ids(&tx, &wrong)?;
    let picked: Vec<Question> = wrong.iter().filter_map(|id| by_id.remove(id)).collect();
    if picked.is_empty() {
        return Err(EngineError::not_found("no incorrect answers to redo"));
    }

    let source_name = papers::load_paper(&tx, &attempt.exam_paper_id)?
        .map(|p| p.name)
        .unwrap_or_default();
    let mut paper = ExamPaper {
        id: String::new(),
        name: format!("{source_name} (redo)").trim().to_string(),
        paper_type: ExamPaperType::RedoIncorrect,
        difficulty: Difficulty::truncated_average(picked.iter().map(|q| q.difficulty)),
        total_questions: 0,
        questions: papers::links_for(picked),
    };
    save_assembled(&tx, &mut paper)?;
    tx.commit()?;

    info!(
        paper_id = %paper.id,
        attempt_id,
        questions = paper.total_questions,
        "assembled redo paper"
    );
    Ok(paper)
}

/// A question deleted between selection and save surfaces as a retryable
/// error; any other storage failure is returned unchanged.
fn save_assembled(conn: &Connection, paper: &mut ExamPaper) -> EngineResult<()> {
    match papers::insert_paper(conn, paper) {
        Ok(()) => Ok(()),
        Err(e) if is_foreign_key_violation(&e) => {
            warn!(error = %e, "question pool changed while saving assembled paper");
            Err(EngineError::Retryable(
                "selected questions changed while saving, please retry".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
