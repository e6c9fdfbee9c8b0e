use crate::model::{Difficulty, Question, QuestionOption, QuestionType};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub text: Option<String>,
    pub question_type: Option<QuestionType>,
    pub difficulty: Option<Difficulty>,
}

const QUESTION_COLUMNS: &str = "id, text, question_type, correct_answer, difficulty";

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        text: row.get(1)?,
        question_type: row.get(2)?,
        correct_answer: row.get(3)?,
        difficulty: row.get(4)?,
        options: Vec::new(),
    })
}

fn option_code(raw: &str) -> char {
    raw.chars().next().unwrap_or('A')
}

/// Inserts the question and its options. Missing ids are generated in place.
pub fn insert_question(conn: &Connection, q: &mut Question) -> rusqlite::Result<()> {
    if q.id.is_empty() {
        q.id = Uuid::new_v4().to_string();
    }
    conn.execute(
        "INSERT INTO questions(id, text, question_type, correct_answer, difficulty)
         VALUES(?, ?, ?, ?, ?)",
        (&q.id, &q.text, q.question_type, &q.correct_answer, q.difficulty),
    )?;
    insert_options(conn, &q.id, &mut q.options)
}

fn insert_options(
    conn: &Connection,
    question_id: &str,
    options: &mut [QuestionOption],
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO question_options(id, question_id, code, text) VALUES(?, ?, ?, ?)",
    )?;
    for opt in options.iter_mut() {
        if opt.id.is_empty() {
            opt.id = Uuid::new_v4().to_string();
        }
        opt.question_id = question_id.to_string();
        stmt.execute((&opt.id, question_id, opt.code.to_string(), &opt.text))?;
    }
    Ok(())
}

/// Overwrites the question fields and replaces its options wholesale.
/// Returns false when the question does not exist.
pub fn update_question(conn: &Connection, q: &mut Question) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE questions
         SET text = ?, question_type = ?, correct_answer = ?, difficulty = ?
         WHERE id = ?",
        (&q.text, q.question_type, &q.correct_answer, q.difficulty, &q.id),
    )?;
    if changed == 0 {
        return Ok(false);
    }
    conn.execute(
        "DELETE FROM question_options WHERE question_id = ?",
        [&q.id],
    )?;
    for opt in q.options.iter_mut() {
        opt.id = String::new();
    }
    insert_options(conn, &q.id, &mut q.options)?;
    Ok(true)
}

pub fn delete_questions(conn: &Connection, ids: &[String]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM questions WHERE id = ?")?;
    let mut removed = 0;
    for id in ids {
        removed += stmt.execute([id])?;
    }
    Ok(removed)
}

pub fn find_question(conn: &Connection, id: &str) -> rusqlite::Result<Option<Question>> {
    let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?");
    let q = conn
        .query_row(&sql, [id], question_from_row)
        .optional()?;
    match q {
        Some(mut q) => {
            q.options = load_options(conn, &q.id)?;
            Ok(Some(q))
        }
        None => Ok(None),
    }
}

pub fn list_questions(conn: &Connection, filter: &QuestionFilter) -> rusqlite::Result<Vec<Question>> {
    let mut sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(text) = filter.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        sql.push_str(" AND instr(text, ?) > 0");
        bind.push(Value::Text(text.to_string()));
    }
    if let Some(t) = filter.question_type {
        sql.push_str(" AND question_type = ?");
        bind.push(Value::Integer(t.code()));
    }
    if let Some(d) = filter.difficulty {
        sql.push_str(" AND difficulty = ?");
        bind.push(Value::Integer(d.code()));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let questions = stmt
        .query_map(params_from_iter(bind), question_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_options(conn, questions)
}

/// Loads the given questions, keyed by id. Unknown ids are skipped.
pub fn questions_by_ids(
    conn: &Connection,
    ids: &[String],
) -> rusqlite::Result<HashMap<String, Question>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let questions = stmt
        .query_map(params_from_iter(ids.iter()), question_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(attach_options(conn, questions)?
        .into_iter()
        .map(|q| (q.id.clone(), q))
        .collect())
}

/// Up to `limit` questions of one type in store-random order, optionally
/// capped at a difficulty ceiling.
pub fn random_questions(
    conn: &Connection,
    question_type: QuestionType,
    ceiling: Option<Difficulty>,
    limit: usize,
) -> rusqlite::Result<Vec<Question>> {
    let sql = format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions
         WHERE question_type = ?1 AND (?2 IS NULL OR difficulty <= ?2)
         ORDER BY RANDOM()
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let questions = stmt
        .query_map(
            (question_type, ceiling.map(Difficulty::code), limit as i64),
            question_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    attach_options(conn, questions)
}

pub fn load_options(conn: &Connection, question_id: &str) -> rusqlite::Result<Vec<QuestionOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, question_id, code, text FROM question_options
         WHERE question_id = ?
         ORDER BY code",
    )?;
    let rows = stmt
        .query_map([question_id], |row| {
            let code: String = row.get(2)?;
            Ok(QuestionOption {
                id: row.get(0)?,
                question_id: row.get(1)?,
                code: option_code(&code),
                text: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn attach_options(conn: &Connection, mut questions: Vec<Question>) -> rusqlite::Result<Vec<Question>> {
    for q in questions.iter_mut() {
        q.options = load_options(conn, &q.id)?;
    }
    Ok(questions)
}
