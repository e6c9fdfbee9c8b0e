use crate::model::{AnswerHistory, StudentAnswer};
use rusqlite::{Connection, OptionalExtension};

pub fn insert_attempt(conn: &Connection, h: &AnswerHistory) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO answer_histories(
            id, student_id, exam_paper_id, examination_id, difficulty, start_time,
            duration_seconds, total_questions
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &h.id,
            &h.student_id,
            &h.exam_paper_id,
            &h.examination_id,
            h.difficulty,
            &h.start_time,
            h.duration_seconds,
            h.total_questions,
        ),
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO student_answers(
            id, student_id, question_id, question_type, answer_history_id, answer, is_correct, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for a in &h.answers {
        stmt.execute((
            &a.id,
            &a.student_id,
            &a.question_id,
            a.question_type,
            &a.answer_history_id,
            &a.answer,
            a.is_correct,
            a.order,
        ))?;
    }
    Ok(())
}

pub fn load_attempt(conn: &Connection, id: &str) -> rusqlite::Result<Option<AnswerHistory>> {
    let head = conn
        .query_row(
            "SELECT id, student_id, exam_paper_id, examination_id, difficulty, start_time,
                    submission_time, duration_seconds, time_taken_seconds, is_submission,
                    is_timeout, total_incorrect, total_questions, total_answered
             FROM answer_histories WHERE id = ?",
            [id],
            |row| {
                Ok(AnswerHistory {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    exam_paper_id: row.get(2)?,
                    examination_id: row.get(3)?,
                    difficulty: row.get(4)?,
                    start_time: row.get(5)?,
                    submission_time: row.get(6)?,
                    duration_seconds: row.get(7)?,
                    time_taken_seconds: row.get(8)?,
                    is_submission: row.get(9)?,
                    is_timeout: row.get(10)?,
                    total_incorrect: row.get(11)?,
                    total_questions: row.get(12)?,
                    total_answered: row.get(13)?,
                    answers: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut head) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, student_id, question_id, question_type, answer_history_id, answer, is_correct, sort_order
         FROM student_answers
         WHERE answer_history_id = ?
         ORDER BY sort_order",
    )?;
    head.answers = stmt
        .query_map([id], |row| {
            Ok(StudentAnswer {
                id: row.get(0)?,
                student_id: row.get(1)?,
                question_id: row.get(2)?,
                question_type: row.get(3)?,
                answer_history_id: row.get(4)?,
                answer: row.get(5)?,
                is_correct: row.get(6)?,
                order: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(head))
}

/// Any attempt id the student holds for the examination, oldest first.
pub fn find_exam_attempt(
    conn: &Connection,
    student_id: &str,
    examination_id: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM answer_histories
         WHERE student_id = ? AND examination_id = ?
         ORDER BY rowid
         LIMIT 1",
        (student_id, examination_id),
        |r| r.get(0),
    )
    .optional()
}

pub fn count_exam_attempts(
    conn: &Connection,
    student_id: &str,
    examination_id: &str,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM answer_histories WHERE student_id = ? AND examination_id = ?",
        (student_id, examination_id),
        |r| r.get(0),
    )
}

/// Final state written by a submission.
#[derive(Debug, Clone)]
pub struct SubmissionRecord<'a> {
    pub attempt_id: &'a str,
    pub submission_time: &'a str,
    pub time_taken_seconds: i64,
    pub is_timeout: bool,
    pub total_incorrect: i64,
    pub total_answered: i64,
}

/// Flips the attempt to submitted. Returns false when it was already
/// submitted (or does not exist); nothing is written in that case.
pub fn mark_submitted(conn: &Connection, rec: &SubmissionRecord<'_>) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE answer_histories
         SET is_submission = 1,
             submission_time = ?,
             time_taken_seconds = ?,
             is_timeout = ?,
             total_incorrect = ?,
             total_answered = ?
         WHERE id = ? AND is_submission = 0",
        (
            rec.submission_time,
            rec.time_taken_seconds,
            rec.is_timeout,
            rec.total_incorrect,
            rec.total_answered,
            rec.attempt_id,
        ),
    )?;
    Ok(n == 1)
}

pub fn save_graded_answer(
    conn: &Connection,
    answer_id: &str,
    answer: Option<&str>,
    is_correct: bool,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE student_answers SET answer = ?, is_correct = ? WHERE id = ?",
        (answer, is_correct, answer_id),
    )?;
    Ok(())
}
