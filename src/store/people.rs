use crate::model::{Student, User};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Student accumulator columns. Only ever incremented in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentCounter {
    Practice,
    Exam,
    Questions,
    Answers,
    Incorrect,
}

impl StudentCounter {
    fn column(self) -> &'static str {
        match self {
            StudentCounter::Practice => "practice_count",
            StudentCounter::Exam => "exam_count",
            StudentCounter::Questions => "question_total",
            StudentCounter::Answers => "answer_total",
            StudentCounter::Incorrect => "incorrect_total",
        }
    }
}

pub fn insert_user(conn: &Connection, username: &str, nickname: Option<&str>) -> rusqlite::Result<User> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        nickname: nickname.map(str::to_string),
    };
    conn.execute(
        "INSERT INTO users(id, username, nickname) VALUES(?, ?, ?)",
        (&user.id, &user.username, &user.nickname),
    )?;
    Ok(user)
}

pub fn find_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, nickname FROM users WHERE id = ?",
        [user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
            })
        },
    )
    .optional()
}

const STUDENT_COLUMNS: &str = "id, user_id, name, practice_count, exam_count,
    question_total, answer_total, incorrect_total";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        practice_count: row.get(3)?,
        exam_count: row.get(4)?,
        question_total: row.get(5)?,
        answer_total: row.get(6)?,
        incorrect_total: row.get(7)?,
    })
}

pub fn find_student_by_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = ?");
    conn.query_row(&sql, [user_id], student_from_row).optional()
}

pub fn insert_student(conn: &Connection, user: &User) -> rusqlite::Result<Student> {
    let student = Student {
        id: Uuid::new_v4().to_string(),
        user_id: Some(user.id.clone()),
        name: user.display_name(),
        practice_count: 0,
        exam_count: 0,
        question_total: 0,
        answer_total: 0,
        incorrect_total: 0,
    };
    conn.execute(
        "INSERT INTO students(id, user_id, name) VALUES(?, ?, ?)",
        (&student.id, &student.user_id, &student.name),
    )?;
    Ok(student)
}

/// `UPDATE students SET <counter> = <counter> + by WHERE id = ?`
pub fn increment_student(
    conn: &Connection,
    student_id: &str,
    counter: StudentCounter,
    by: i64,
) -> rusqlite::Result<usize> {
    let col = counter.column();
    let sql = format!("UPDATE students SET {col} = {col} + ? WHERE id = ?");
    conn.execute(&sql, (by, student_id))
}
