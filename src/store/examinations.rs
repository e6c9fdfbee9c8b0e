use crate::model::{Examination, ExaminationType};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub fn insert_examination(
    conn: &Connection,
    exam_paper_id: &str,
    name: &str,
    exam_type: ExaminationType,
    duration_seconds: i64,
) -> rusqlite::Result<Examination> {
    let exam = Examination {
        id: Uuid::new_v4().to_string(),
        exam_paper_id: exam_paper_id.to_string(),
        name: name.to_string(),
        exam_type,
        duration_seconds,
        is_published: false,
        participant_count: 0,
    };
    conn.execute(
        "INSERT INTO examinations(id, exam_paper_id, name, exam_type, duration_seconds)
         VALUES(?, ?, ?, ?, ?)",
        (
            &exam.id,
            &exam.exam_paper_id,
            &exam.name,
            exam.exam_type,
            exam.duration_seconds,
        ),
    )?;
    Ok(exam)
}

pub fn find_examination(conn: &Connection, id: &str) -> rusqlite::Result<Option<Examination>> {
    conn.query_row(
        "SELECT id, exam_paper_id, name, exam_type, duration_seconds, is_published, participant_count
         FROM examinations WHERE id = ?",
        [id],
        |row| {
            Ok(Examination {
                id: row.get(0)?,
                exam_paper_id: row.get(1)?,
                name: row.get(2)?,
                exam_type: row.get(3)?,
                duration_seconds: row.get(4)?,
                is_published: row.get(5)?,
                participant_count: row.get(6)?,
            })
        },
    )
    .optional()
}

pub fn set_published(conn: &Connection, id: &str, published: bool) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE examinations SET is_published = ? WHERE id = ?",
        (published, id),
    )?;
    Ok(n > 0)
}

pub fn increment_participants(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE examinations SET participant_count = participant_count + 1 WHERE id = ?",
        [id],
    )
}
