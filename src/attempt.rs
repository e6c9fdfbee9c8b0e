//! Attempt lifecycle: board creation, submission and review.
//!
//! An attempt moves from created (`is_submission = false`) to submitted
//! exactly once. Multi-step writes run inside one transaction.

use crate::error::{is_foreign_key_violation, EngineError, EngineResult};
use crate::grading::{self, GradeInput};
use crate::model::{
    AnswerBoard, AnswerHistory, BoardOption, BoardQuestion, ExamPaper, Student, StudentAnswer,
};
use crate::store::people::StudentCounter;
use crate::store::{attempts, examinations, papers, people, questions};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub attempt_id: String,
    pub answers: Vec<SubmittedAnswer>,
    /// Set by the caller when the client-side timer ran out.
    pub timeout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub attempt_id: String,
    pub total_questions: i64,
    pub total_answered: i64,
    pub total_incorrect: i64,
    pub time_taken_seconds: i64,
    pub is_timeout: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReview {
    #[serde(flatten)]
    pub attempt: AnswerHistory,
    /// Keyed by question id. Empty until the attempt is submitted.
    pub correct_answers: BTreeMap<String, String>,
}

/// Finds the user's student record, creating it on first use.
fn resolve_student(conn: &Connection, user_id: &str) -> EngineResult<Student> {
    let Some(user) = people::find_user(conn, user_id)? else {
        return Err(EngineError::not_found("user not found"));
    };
    if let Some(student) = people::find_student_by_user(conn, &user.id)? {
        return Ok(student);
    }
    let student = people::insert_student(conn, &user)?;
    info!(student_id = %student.id, user_id, "created student record");
    Ok(student)
}

fn require_questions(paper: Option<ExamPaper>) -> EngineResult<ExamPaper> {
    let Some(paper) = paper else {
        return Err(EngineError::not_found("paper not found"));
    };
    if paper.questions.is_empty() {
        return Err(EngineError::not_found("paper has no questions"));
    }
    Ok(paper)
}

/// Turns every paper link into an unanswered row. The link's embedded
/// question is detached; only its id and type travel into the snapshot.
fn snapshot(
    paper: ExamPaper,
    student: &Student,
    examination_id: Option<String>,
    duration_seconds: i64,
) -> EngineResult<AnswerHistory> {
    let attempt_id = Uuid::new_v4().to_string();
    let mut answers = Vec::with_capacity(paper.questions.len());
    for mut link in paper.questions {
        let Some(question) = link.question.take() else {
            return Err(EngineError::Invariant(format!(
                "paper question {} has no question loaded",
                link.question_id
            )));
        };
        answers.push(StudentAnswer {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            question_id: link.question_id,
            question_type: question.question_type,
            answer_history_id: attempt_id.clone(),
            answer: None,
            is_correct: None,
            order: link.order,
        });
    }

    Ok(AnswerHistory {
        id: attempt_id,
        student_id: student.id.clone(),
        exam_paper_id: paper.id,
        examination_id,
        difficulty: paper.difficulty,
        start_time: Utc::now().to_rfc3339(),
        submission_time: None,
        duration_seconds,
        time_taken_seconds: 0,
        is_submission: false,
        is_timeout: false,
        total_incorrect: 0,
        total_questions: answers.len() as i64,
        total_answered: 0,
        answers,
    })
}

/// Snapshot rows only reference rows that were just loaded, so a foreign
/// key failure here means the data moved underneath the transaction.
fn insert_snapshot(conn: &Connection, attempt: &AnswerHistory) -> EngineResult<()> {
    match attempts::insert_attempt(conn, attempt) {
        Ok(()) => Ok(()),
        Err(e) if is_foreign_key_violation(&e) => {
            error!(attempt_id = %attempt.id, error = %e, "attempt snapshot hit a foreign key violation");
            Err(EngineError::Invariant(e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn create_by_exam_paper(
    conn: &Connection,
    user_id: &str,
    exam_paper_id: &str,
) -> EngineResult<AnswerBoard> {
    let tx = conn.unchecked_transaction()?;
    let student = resolve_student(&tx, user_id)?;
    let paper = require_questions(papers::load_paper(&tx, exam_paper_id)?)?;

    let attempt = snapshot(paper, &student, None, 0)?;
    insert_snapshot(&tx, &attempt)?;
    people::increment_student(&tx, &student.id, StudentCounter::Practice, 1)?;
    tx.commit()?;

    info!(
        attempt_id = %attempt.id,
        student_id = %student.id,
        exam_paper_id,
        questions = attempt.total_questions,
        "created practice attempt"
    );
    load_board(conn, &attempt.id)
}

pub fn create_by_examination(
    conn: &Connection,
    user_id: &str,
    examination_id: &str,
) -> EngineResult<AnswerBoard> {
    let tx = conn.unchecked_transaction()?;
    let student = resolve_student(&tx, user_id)?;

    if let Some(existing) = attempts::find_exam_attempt(&tx, &student.id, examination_id)? {
        let published = examinations::find_examination(&tx, examination_id)?
            .map(|e| e.is_published)
            .unwrap_or(false);
        if !published {
            return Err(EngineError::conflict("examination is not published yet"));
        }
        tx.commit()?;
        return load_board(conn, &existing);
    }

    let Some(exam) = examinations::find_examination(&tx, examination_id)? else {
        return Err(EngineError::not_found("examination not found"));
    };
    let paper = require_questions(papers::load_paper(&tx, &exam.exam_paper_id)?)?;
    if !exam.is_published {
        return Err(EngineError::conflict("examination is not published yet"));
    }

    let attempt = snapshot(paper, &student, Some(exam.id.clone()), exam.duration_seconds)?;
    insert_snapshot(&tx, &attempt)?;
    people::increment_student(&tx, &student.id, StudentCounter::Exam, 1)?;

    // Read-after-write gate: only the first attempt counts as a participant.
    // Two concurrent first attempts can both observe more than one row or
    // both observe one; nothing serializes them across requests.
    let first = attempts::count_exam_attempts(&tx, &student.id, &exam.id)? == 1;
    if first {
        examinations::increment_participants(&tx, &exam.id)?;
    }
    tx.commit()?;

    info!(
        attempt_id = %attempt.id,
        student_id = %student.id,
        examination_id,
        first_attempt = first,
        "created examination attempt"
    );
    load_board(conn, &attempt.id)
}

/// Grades and seals an attempt. A second submission is a conflict and
/// leaves the stored attempt untouched.
pub fn submit(conn: &Connection, submission: &Submission) -> EngineResult<SubmissionResult> {
    let tx = conn.unchecked_transaction()?;
    let Some(attempt) = attempts::load_attempt(&tx, &submission.attempt_id)? else {
        return Err(EngineError::not_found("attempt not found"));
    };
    if attempt.is_submission {
        warn!(attempt_id = %attempt.id, "rejected resubmission");
        return Err(EngineError::conflict("attempt already submitted"));
    }

    let mut submitted: HashMap<&str, Option<&str>> = HashMap::new();
    for a in &submission.answers {
        if submitted.insert(a.question_id.as_str(), a.answer.as_deref()).is_some() {
            return Err(EngineError::Validation(format!(
                "duplicate answer for question {}",
                a.question_id
            )));
        }
    }

    let ids: Vec<String> = attempt.answers.iter().map(|a| a.question_id.clone()).collect();
    let keys = questions::questions_by_ids(&tx, &ids)?;
    let mut inputs = Vec::with_capacity(attempt.answers.len());
    for row in &attempt.answers {
        let Some(q) = keys.get(&row.question_id) else {
            return Err(EngineError::Invariant(format!(
                "question {} referenced by attempt {} is missing",
                row.question_id, attempt.id
            )));
        };
        inputs.push(GradeInput {
            question_type: row.question_type,
            correct_answer: q.correct_answer.as_str(),
            submitted: submitted.get(row.question_id.as_str()).copied().flatten(),
        });
    }
    let outcome = grading::grade(inputs.iter().copied());

    let now = Utc::now();
    let time_taken_seconds = DateTime::parse_from_rfc3339(&attempt.start_time)
        .map(|start| (now - start.with_timezone(&Utc)).num_seconds().max(0))
        .unwrap_or(0);
    let is_timeout = submission.timeout
        || (attempt.duration_seconds > 0 && time_taken_seconds > attempt.duration_seconds);

    let submission_time = now.to_rfc3339();
    let sealed = attempts::mark_submitted(
        &tx,
        &attempts::SubmissionRecord {
            attempt_id: &attempt.id,
            submission_time: &submission_time,
            time_taken_seconds,
            is_timeout,
            total_incorrect: outcome.total_incorrect,
            total_answered: outcome.total_answered,
        },
    )?;
    if !sealed {
        warn!(attempt_id = %attempt.id, "attempt was sealed concurrently");
        return Err(EngineError::conflict("attempt already submitted"));
    }

    for (row, ok) in attempt.answers.iter().zip(outcome.correctness.iter()) {
        let answer = submitted.get(row.question_id.as_str()).copied().flatten();
        attempts::save_graded_answer(&tx, &row.id, answer, *ok)?;
    }

    people::increment_student(&tx, &attempt.student_id, StudentCounter::Questions, attempt.total_questions)?;
    people::increment_student(&tx, &attempt.student_id, StudentCounter::Answers, outcome.total_answered)?;
    people::increment_student(&tx, &attempt.student_id, StudentCounter::Incorrect, outcome.total_incorrect)?;
    tx.commit()?;

    info!(
        attempt_id = %attempt.id,
        incorrect = outcome.total_incorrect,
        answered = outcome.total_answered,
        is_timeout,
        "attempt submitted"
    );
    Ok(SubmissionResult {
        attempt_id: attempt.id,
        total_questions: attempt.total_questions,
        total_answered: outcome.total_answered,
        total_incorrect: outcome.total_incorrect,
        time_taken_seconds,
        is_timeout,
    })
}

/// Stored attempt with correct answers revealed once submitted.
pub fn review(conn: &Connection, attempt_id: &str) -> EngineResult<AttemptReview> {
    let Some(attempt) = attempts::load_attempt(conn, attempt_id)? else {
        return Err(EngineError::not_found("attempt not found"));
    };
    let mut correct_answers = BTreeMap::new();
    if attempt.is_submission {
        let ids: Vec<String> = attempt.answers.iter().map(|a| a.question_id.clone()).collect();
        for (id, q) in questions::questions_by_ids(conn, &ids)? {
            correct_answers.insert(id, q.correct_answer);
        }
    }
    Ok(AttemptReview {
        attempt,
        correct_answers,
    })
}

/// Answer board for a stored attempt.
pub fn load_board(conn: &Connection, attempt_id: &str) -> EngineResult<AnswerBoard> {
    let Some(attempt) = attempts::load_attempt(conn, attempt_id)? else {
        return Err(EngineError::not_found("attempt not found"));
    };

    let name = match attempt.examination_id.as_deref() {
        Some(exam_id) => examinations::find_examination(conn, exam_id)?.map(|e| e.name),
        None => papers::load_paper(conn, &attempt.exam_paper_id)?.map(|p| p.name),
    }
    .unwrap_or_default();

    let ids: Vec<String> = attempt.answers.iter().map(|a| a.question_id.clone()).collect();
    let by_id = questions::questions_by_ids(conn, &ids)?;
    let questions = attempt
        .answers
        .iter()
        .map(|a| {
            let q = by_id.get(&a.question_id);
            BoardQuestion {
                order: a.order,
                question_id: a.question_id.clone(),
                text: q.map(|q| q.text.clone()).unwrap_or_default(),
                question_type: a.question_type,
                options: q
                    .map(|q| {
                        q.sorted_options()
                            .into_iter()
                            .map(|o| BoardOption {
                                code: o.code,
                                text: o.text.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                answer: a.answer.clone(),
            }
        })
        .collect();

    Ok(AnswerBoard {
        attempt_id: attempt.id,
        exam_paper_id: attempt.exam_paper_id,
        examination_id: attempt.examination_id,
        name,
        difficulty: attempt.difficulty,
        duration_seconds: attempt.duration_seconds,
        start_time: attempt.start_time,
        is_submission: attempt.is_submission,
        total_questions: attempt.total_questions,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;
    use crate::model::{
        Difficulty, ExamPaperType, ExaminationType, Question, QuestionOption, QuestionType,
    };

    struct Fixture {
        conn: Connection,
        user_id: String,
        paper_id: String,
        question_ids: Vec<String>,
    }

    fn fixture() -> Fixture {
        let conn = open_test_db();
        let user = people::insert_user(&conn, "lin", Some("Lin")).expect("user");

        let specs = [
            (QuestionType::SingleChoice, "B"),
            (QuestionType::MultipleChoice, "ABC"),
            (QuestionType::TrueFalse, "1"),
        ];
        let mut qs = Vec::new();
        for (t, key) in specs {
            let mut q = Question {
                id: String::new(),
                text: format!("{t:?}"),
                question_type: t,
                correct_answer: key.to_string(),
                difficulty: Difficulty::Medium,
                options: if t.has_options() {
                    ['A', 'B', 'C', 'D']
                        .into_iter()
                        .map(|c| QuestionOption {
                            id: String::new(),
                            question_id: String::new(),
                            code: c,
                            text: format!("option {c}"),
                        })
                        .collect()
                } else {
                    Vec::new()
                },
            };
            questions::insert_question(&conn, &mut q).expect("question");
            qs.push(q);
        }
        let question_ids = qs.iter().map(|q| q.id.clone()).collect();
        let mut paper = ExamPaper {
            id: String::new(),
            name: "Midterm".into(),
            paper_type: ExamPaperType::Create,
            difficulty: Difficulty::Medium,
            total_questions: 0,
            questions: papers::links_for(qs),
        };
        papers::insert_paper(&conn, &mut paper).expect("paper");

        Fixture {
            conn,
            user_id: user.id,
            paper_id: paper.id,
            question_ids,
        }
    }

    fn student(f: &Fixture) -> Student {
        people::find_student_by_user(&f.conn, &f.user_id)
            .expect("query")
            .expect("student")
    }

    #[test]
    fn paper_attempt_snapshots_questions_and_counts_practice() {
        let f = fixture();
        let board = create_by_exam_paper(&f.conn, &f.user_id, &f.paper_id).expect("board");
        assert_eq!(board.total_questions, 3);
        assert_eq!(board.name, "Midterm");
        assert!(!board.is_submission);
        assert!(board.questions.iter().all(|q| q.answer.is_none()));
        assert_eq!(board.questions[0].options.len(), 4);
        assert_eq!(board.questions[0].order, 1);

        let s = student(&f);
        assert_eq!(s.name, "Lin");
        assert_eq!(s.practice_count, 1);

        let stored = attempts::load_attempt(&f.conn, &board.attempt_id)
            .expect("load")
            .expect("attempt");
        assert_eq!(stored.answers.len() as i64, stored.total_questions);
        assert!(stored.answers.iter().all(|a| a.is_correct.is_none()));
        let n: i64 = f
            .conn
            .query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 3);
    }

    #[test]
    fn paper_attempt_reports_missing_inputs() {
        let f = fixture();
        let err = create_by_exam_paper(&f.conn, "nobody", &f.paper_id).expect_err("user");
        assert_eq!(err.to_string(), "user not found");
        let err = create_by_exam_paper(&f.conn, &f.user_id, "nope").expect_err("paper");
        assert_eq!(err.to_string(), "paper not found");

        let mut empty = ExamPaper {
            id: String::new(),
            name: "Empty".into(),
            paper_type: ExamPaperType::Create,
            difficulty: Difficulty::None,
            total_questions: 0,
            questions: Vec::new(),
        };
        papers::insert_paper(&f.conn, &mut empty).expect("paper");
        let err = create_by_exam_paper(&f.conn, &f.user_id, &empty.id).expect_err("empty");
        assert_eq!(err.to_string(), "paper has no questions");
    }

    #[test]
    fn examination_attempt_is_idempotent_and_counts_one_participant() {
        let f = fixture();
        let exam = examinations::insert_examination(
            &f.conn,
            &f.paper_id,
            "Final",
            ExaminationType::Exam,
            1800,
        )
        .expect("exam");

        let err = create_by_examination(&f.conn, &f.user_id, &exam.id).expect_err("unpublished");
        assert!(matches!(err, EngineError::Conflict(_)));

        examinations::set_published(&f.conn, &exam.id, true).expect("publish");
        let first = create_by_examination(&f.conn, &f.user_id, &exam.id).expect("first");
        let second = create_by_examination(&f.conn, &f.user_id, &exam.id).expect("second");
        assert_eq!(first.attempt_id, second.attempt_id);
        assert_eq!(first.duration_seconds, 1800);
        assert_eq!(first.name, "Final");

        let stored = examinations::find_examination(&f.conn, &exam.id)
            .expect("query")
            .expect("exam");
        assert_eq!(stored.participant_count, 1);
        assert_eq!(student(&f).exam_count, 1);

        examinations::set_published(&f.conn, &exam.id, false).expect("unpublish");
        let err = create_by_examination(&f.conn, &f.user_id, &exam.id).expect_err("hidden");
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn submit_grades_once_and_rejects_resubmission() {
        let f = fixture();
        let board = create_by_exam_paper(&f.conn, &f.user_id, &f.paper_id).expect("board");
        let answers = vec![
            SubmittedAnswer {
                question_id: f.question_ids[0].clone(),
                answer: Some(" b ".into()),
            },
            SubmittedAnswer {
                question_id: f.question_ids[1].clone(),
                answer: Some("CABD".into()),
            },
        ];
        let result = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id.clone(),
                answers,
                timeout: false,
            },
        )
        .expect("submit");
        assert_eq!(result.total_incorrect, 2);
        assert_eq!(result.total_answered, 2);
        assert!(!result.is_timeout);

        let sealed = attempts::load_attempt(&f.conn, &board.attempt_id)
            .expect("load")
            .expect("attempt");
        let flags: Vec<Option<bool>> = sealed.answers.iter().map(|a| a.is_correct).collect();
        assert_eq!(flags, vec![Some(false), Some(true), Some(false)]);

        let again = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id.clone(),
                answers: vec![SubmittedAnswer {
                    question_id: f.question_ids[0].clone(),
                    answer: Some("B".into()),
                }],
                timeout: false,
            },
        )
        .expect_err("resubmission");
        assert!(matches!(again, EngineError::Conflict(_)));

        let after = attempts::load_attempt(&f.conn, &board.attempt_id)
            .expect("load")
            .expect("attempt");
        assert_eq!(after, sealed);

        let s = student(&f);
        assert_eq!(s.question_total, 3);
        assert_eq!(s.answer_total, 2);
        assert_eq!(s.incorrect_total, 2);

        let review = review(&f.conn, &board.attempt_id).expect("review");
        assert_eq!(review.correct_answers.get(&f.question_ids[1]).map(String::as_str), Some("ABC"));
    }

    #[test]
    fn duplicate_answers_are_rejected_without_sealing() {
        let f = fixture();
        let board = create_by_exam_paper(&f.conn, &f.user_id, &f.paper_id).expect("board");
        let answer = |a: &str| SubmittedAnswer {
            question_id: f.question_ids[0].clone(),
            answer: Some(a.into()),
        };
        let err = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id.clone(),
                answers: vec![answer("A"), answer("B")],
                timeout: false,
            },
        )
        .expect_err("duplicate");
        assert_eq!(err.code(), "bad_params");

        let stored = attempts::load_attempt(&f.conn, &board.attempt_id)
            .expect("load")
            .expect("attempt");
        assert!(!stored.is_submission);
    }

    #[test]
    fn timeout_flag_is_recorded() {
        let f = fixture();
        let board = create_by_exam_paper(&f.conn, &f.user_id, &f.paper_id).expect("board");
        let result = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id,
                answers: Vec::new(),
                timeout: true,
            },
        )
        .expect("submit");
        assert!(result.is_timeout);
        assert_eq!(result.total_incorrect, 3);
        assert_eq!(result.total_answered, 0);
    }

    #[test]
    fn overrunning_the_duration_times_out() {
        let f = fixture();
        let exam = examinations::insert_examination(
            &f.conn,
            &f.paper_id,
            "Timed",
            ExaminationType::Exam,
            60,
        )
        .expect("exam");
        examinations::set_published(&f.conn, &exam.id, true).expect("publish");
        let board = create_by_examination(&f.conn, &f.user_id, &exam.id).expect("board");

        let started = (Utc::now() - chrono::Duration::seconds(120)).to_rfc3339();
        f.conn
            .execute(
                "UPDATE answer_histories SET start_time = ? WHERE id = ?",
                (&started, &board.attempt_id),
            )
            .expect("backdate");

        let result = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id.clone(),
                answers: Vec::new(),
                timeout: false,
            },
        )
        .expect("submit");
        assert!(result.is_timeout);
        assert!(result.time_taken_seconds >= 120);

        let stored = attempts::load_attempt(&f.conn, &board.attempt_id)
            .expect("load")
            .expect("attempt");
        assert!(stored.is_timeout);
        assert_eq!(stored.time_taken_seconds, result.time_taken_seconds);
    }

    #[test]
    fn within_the_duration_is_not_a_timeout() {
        let f = fixture();
        let exam = examinations::insert_examination(
            &f.conn,
            &f.paper_id,
            "Relaxed",
            ExaminationType::Exam,
            3600,
        )
        .expect("exam");
        examinations::set_published(&f.conn, &exam.id, true).expect("publish");
        let board = create_by_examination(&f.conn, &f.user_id, &exam.id).expect("board");
        let result = submit(
            &f.conn,
            &Submission {
                attempt_id: board.attempt_id,
                answers: Vec::new(),
                timeout: false,
            },
        )
        .expect("submit");
        assert!(!result.is_timeout);
    }

    #[test]
    fn snapshot_foreign_key_failure_is_an_invariant_violation() {
        let f = fixture();
        let student = resolve_student(&f.conn, &f.user_id).expect("student");
        let paper = papers::load_paper(&f.conn, &f.paper_id)
            .expect("load")
            .expect("paper");
        let mut attempt = snapshot(paper, &student, None, 0).expect("snapshot");
        attempt.answers[0].question_id = "missing-question".into();

        let tx = f.conn.unchecked_transaction().expect("tx");
        let err = insert_snapshot(&tx, &attempt).expect_err("fk");
        assert!(matches!(err, EngineError::Invariant(_)));
        assert_eq!(err.code(), "invariant_violation");
        drop(tx);
        assert!(attempts::load_attempt(&f.conn, &attempt.id)
            .expect("load")
            .is_none());
    }
}
