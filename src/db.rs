use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "examd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            nickname TEXT
        )",
        [],
    )?;

    // Counters are accumulators; nothing recomputes them from history.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            user_id TEXT UNIQUE,
            name TEXT NOT NULL,
            practice_count INTEGER NOT NULL DEFAULT 0,
            exam_count INTEGER NOT NULL DEFAULT 0,
            question_total INTEGER NOT NULL DEFAULT 0,
            answer_total INTEGER NOT NULL DEFAULT 0,
            incorrect_total INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            question_type INTEGER NOT NULL,
            correct_answer TEXT NOT NULL DEFAULT '',
            difficulty INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_type_difficulty
         ON questions(question_type, difficulty)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS question_options(
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL,
            code TEXT NOT NULL,
            text TEXT NOT NULL,
            FOREIGN KEY(question_id) REFERENCES questions(id) ON DELETE CASCADE,
            UNIQUE(question_id, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_question_options_question ON question_options(question_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_papers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            paper_type INTEGER NOT NULL DEFAULT 0,
            difficulty INTEGER NOT NULL DEFAULT 0,
            total_questions INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_paper_questions(
            id TEXT PRIMARY KEY,
            exam_paper_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(exam_paper_id) REFERENCES exam_papers(id) ON DELETE CASCADE,
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(exam_paper_id, sort_order)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_paper_questions_paper
         ON exam_paper_questions(exam_paper_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS examinations(
            id TEXT PRIMARY KEY,
            exam_paper_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exam_type INTEGER NOT NULL DEFAULT 0,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            participant_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(exam_paper_id) REFERENCES exam_papers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS answer_histories(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exam_paper_id TEXT NOT NULL,
            examination_id TEXT,
            difficulty INTEGER NOT NULL DEFAULT 0,
            start_time TEXT NOT NULL,
            submission_time TEXT,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            time_taken_seconds INTEGER NOT NULL DEFAULT 0,
            is_submission INTEGER NOT NULL DEFAULT 0,
            is_timeout INTEGER NOT NULL DEFAULT 0,
            total_incorrect INTEGER NOT NULL DEFAULT 0,
            total_questions INTEGER NOT NULL DEFAULT 0,
            total_answered INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(exam_paper_id) REFERENCES exam_papers(id),
            FOREIGN KEY(examination_id) REFERENCES examinations(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answer_histories_student_exam
         ON answer_histories(student_id, examination_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_answers(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            question_type INTEGER NOT NULL,
            answer_history_id TEXT NOT NULL,
            answer TEXT,
            is_correct INTEGER,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            FOREIGN KEY(answer_history_id) REFERENCES answer_histories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_answers_history
         ON student_answers(answer_history_id, sort_order)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
pub fn open_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
