use crate::model::{ExamPaper, ExamPaperQuestion, Question};
use crate::store::questions;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSummary {
    pub id: String,
    pub name: String,
    pub paper_type: crate::model::ExamPaperType,
    pub difficulty: crate::model::Difficulty,
    pub total_questions: i64,
}

/// Persists a paper and its links.
///
/// A link whose `question_id` is empty but which embeds a question (the
/// import flow) inserts that question first. A link that already points at
/// a stored question only writes the join row; its embedded copy is left
/// untouched.
pub fn insert_paper(conn: &Connection, paper: &mut ExamPaper) -> rusqlite::Result<()> {
    if paper.id.is_empty() {
        paper.id = Uuid::new_v4().to_string();
    }
    paper.total_questions = paper.questions.len() as i64;
    conn.execute(
        "INSERT INTO exam_papers(id, name, paper_type, difficulty, total_questions)
         VALUES(?, ?, ?, ?, ?)",
        (
            &paper.id,
            &paper.name,
            paper.paper_type,
            paper.difficulty,
            paper.total_questions,
        ),
    )?;

    let mut link_stmt = conn.prepare(
        "INSERT INTO exam_paper_questions(id, exam_paper_id, question_id, sort_order)
         VALUES(?, ?, ?, ?)",
    )?;
    for link in paper.questions.iter_mut() {
        if link.question_id.is_empty() {
            if let Some(q) = link.question.as_mut() {
                questions::insert_question(conn, q)?;
                link.question_id = q.id.clone();
            }
        }
        if link.id.is_empty() {
            link.id = Uuid::new_v4().to_string();
        }
        link.exam_paper_id = paper.id.clone();
        link_stmt.execute((&link.id, &paper.id, &link.question_id, link.order))?;
    }
    Ok(())
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PaperSummary> {
    Ok(PaperSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        paper_type: row.get(2)?,
        difficulty: row.get(3)?,
        total_questions: row.get(4)?,
    })
}

/// Loads the paper with its ordered links, each embedding its question and options.
pub fn load_paper(conn: &Connection, paper_id: &str) -> rusqlite::Result<Option<ExamPaper>> {
    let summary = conn
        .query_row(
            "SELECT id, name, paper_type, difficulty, total_questions
             FROM exam_papers WHERE id = ?",
            [paper_id],
            summary_from_row,
        )
        .optional()?;
    let Some(summary) = summary else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, exam_paper_id, question_id, sort_order
         FROM exam_paper_questions
         WHERE exam_paper_id = ?
         ORDER BY sort_order",
    )?;
    let mut links = stmt
        .query_map([paper_id], |row| {
            Ok(ExamPaperQuestion {
                id: row.get(0)?,
                exam_paper_id: row.get(1)?,
                question_id: row.get(2)?,
                order: row.get(3)?,
                question: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<String> = links.iter().map(|l| l.question_id.clone()).collect();
    let mut by_id = questions::questions_by_ids(conn, &ids)?;
    for link in links.iter_mut() {
        link.question = by_id.remove(&link.question_id);
    }

    Ok(Some(ExamPaper {
        id: summary.id,
        name: summary.name,
        paper_type: summary.paper_type,
        difficulty: summary.difficulty,
        total_questions: summary.total_questions,
        questions: links,
    }))
}

pub fn list_papers(conn: &Connection) -> rusqlite::Result<Vec<PaperSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, paper_type, difficulty, total_questions
         FROM exam_papers
         ORDER BY name, rowid",
    )?;
    let rows = stmt
        .query_map([], summary_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes the paper; its links go with it.
pub fn delete_paper(conn: &Connection, paper_id: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM exam_papers WHERE id = ?", [paper_id])?;
    Ok(n > 0)
}

/// Builds in-order links over already stored questions, numbered from 1.
pub fn links_for(questions: Vec<Question>) -> Vec<ExamPaperQuestion> {
    questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| ExamPaperQuestion {
            id: String::new(),
            exam_paper_id: String::new(),
            question_id: q.id.clone(),
            order: i as i64 + 1,
            question: Some(q),
        })
        .collect()
}
