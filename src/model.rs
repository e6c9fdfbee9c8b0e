use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements integer-backed SQL storage for a small code enum.
macro_rules! sql_code_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.code()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let code = i64::column_result(value)?;
                <$ty>::from_code(code).ok_or(FromSqlError::OutOfRange(code))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillInTheBlank,
}

impl QuestionType {
    /// Stratification order used by random assembly.
    pub const ALL: [QuestionType; 4] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::FillInTheBlank,
    ];

    pub fn code(self) -> i64 {
        match self {
            QuestionType::SingleChoice => 1,
            QuestionType::MultipleChoice => 2,
            QuestionType::TrueFalse => 3,
            QuestionType::FillInTheBlank => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(QuestionType::SingleChoice),
            2 => Some(QuestionType::MultipleChoice),
            3 => Some(QuestionType::TrueFalse),
            4 => Some(QuestionType::FillInTheBlank),
            _ => None,
        }
    }

    /// Spreadsheet label for the type column.
    pub fn label(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "单选题",
            QuestionType::MultipleChoice => "多选题",
            QuestionType::TrueFalse => "判断题",
            QuestionType::FillInTheBlank => "填空题",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        QuestionType::ALL.into_iter().find(|t| t.label() == label)
    }

    pub fn has_options(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice
        )
    }
}

sql_code_enum!(QuestionType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Difficulty {
    #[default]
    None,
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn code(self) -> i64 {
        match self {
            Difficulty::None => 0,
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Difficulty::None),
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Average of the level codes, truncated back to a level.
    /// An empty input averages to `None`.
    pub fn truncated_average<I>(levels: I) -> Difficulty
    where
        I: IntoIterator<Item = Difficulty>,
    {
        let mut sum: i64 = 0;
        let mut count: i64 = 0;
        for d in levels {
            sum += d.code();
            count += 1;
        }
        if count == 0 {
            return Difficulty::None;
        }
        Difficulty::from_code(sum / count).unwrap_or_default()
    }
}

sql_code_enum!(Difficulty);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamPaperType {
    #[default]
    None,
    Random,
    Import,
    Create,
    RedoIncorrect,
    RandomPractice,
}

impl ExamPaperType {
    pub fn code(self) -> i64 {
        match self {
            ExamPaperType::None => 0,
            ExamPaperType::Random => 1,
            ExamPaperType::Import => 2,
            ExamPaperType::Create => 3,
            ExamPaperType::RedoIncorrect => 4,
            ExamPaperType::RandomPractice => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ExamPaperType::None),
            1 => Some(ExamPaperType::Random),
            2 => Some(ExamPaperType::Import),
            3 => Some(ExamPaperType::Create),
            4 => Some(ExamPaperType::RedoIncorrect),
            5 => Some(ExamPaperType::RandomPractice),
            _ => None,
        }
    }
}

sql_code_enum!(ExamPaperType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExaminationType {
    #[default]
    Exam,
    Mock,
    Practice,
}

impl ExaminationType {
    pub fn code(self) -> i64 {
        match self {
            ExaminationType::Exam => 0,
            ExaminationType::Mock => 1,
            ExaminationType::Practice => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ExaminationType::Exam),
            1 => Some(ExaminationType::Mock),
            2 => Some(ExaminationType::Practice),
            _ => None,
        }
    }
}

sql_code_enum!(ExaminationType);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub question_id: String,
    pub code: char,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Options ordered by their letter code.
    pub fn sorted_options(&self) -> Vec<&QuestionOption> {
        let mut out: Vec<&QuestionOption> = self.options.iter().collect();
        out.sort_by_key(|o| o.code);
        out
    }
}

/// Paper to question link. `question` is populated when the link was
/// built from an import or loaded with its graph; it is never written
/// through the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPaperQuestion {
    pub id: String,
    pub exam_paper_id: String,
    pub question_id: String,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPaper {
    pub id: String,
    pub name: String,
    pub paper_type: ExamPaperType,
    pub difficulty: Difficulty,
    pub total_questions: i64,
    pub questions: Vec<ExamPaperQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Examination {
    pub id: String,
    pub exam_paper_id: String,
    pub name: String,
    pub exam_type: ExaminationType,
    pub duration_seconds: i64,
    pub is_published: bool,
    pub participant_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub nickname: Option<String>,
}

impl User {
    /// Student display name: nickname, then username, then empty.
    pub fn display_name(&self) -> String {
        match self.nickname.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => self.username.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub practice_count: i64,
    pub exam_count: i64,
    pub question_total: i64,
    pub answer_total: i64,
    pub incorrect_total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswer {
    pub id: String,
    pub student_id: String,
    pub question_id: String,
    pub question_type: QuestionType,
    pub answer_history_id: String,
    pub answer: Option<String>,
    pub is_correct: Option<bool>,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerHistory {
    pub id: String,
    pub student_id: String,
    pub exam_paper_id: String,
    pub examination_id: Option<String>,
    pub difficulty: Difficulty,
    pub start_time: String,
    pub submission_time: Option<String>,
    pub duration_seconds: i64,
    pub time_taken_seconds: i64,
    pub is_submission: bool,
    pub is_timeout: bool,
    pub total_incorrect: i64,
    pub total_questions: i64,
    pub total_answered: i64,
    pub answers: Vec<StudentAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardOption {
    pub code: char,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardQuestion {
    pub order: i64,
    pub question_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<BoardOption>,
    pub answer: Option<String>,
}

/// What a student sees while answering. Carries no correct answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBoard {
    pub attempt_id: String,
    pub exam_paper_id: String,
    pub examination_id: Option<String>,
    pub name: String,
    pub difficulty: Difficulty,
    pub duration_seconds: i64,
    pub start_time: String,
    pub is_submission: bool,
    pub total_questions: i64,
    pub questions: Vec<BoardQuestion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_average_drops_fraction() {
        let avg = Difficulty::truncated_average([
            Difficulty::Easy,
            Difficulty::Hard,
            Difficulty::Hard,
        ]);
        // (1 + 3 + 3) / 3 = 2.33
        assert_eq!(avg, Difficulty::Medium);
        let avg = Difficulty::truncated_average([Difficulty::Easy, Difficulty::Medium]);
        assert_eq!(avg, Difficulty::Easy);
        assert_eq!(Difficulty::truncated_average([]), Difficulty::None);
    }

    #[test]
    fn labels_round_trip() {
        for t in QuestionType::ALL {
            assert_eq!(QuestionType::from_label(t.label()), Some(t));
            assert_eq!(QuestionType::from_code(t.code()), Some(t));
        }
        assert_eq!(QuestionType::from_label("essay"), None);
    }

    #[test]
    fn display_name_prefers_nickname() {
        let mut u = User {
            id: "u1".into(),
            username: "lin".into(),
            nickname: Some("Lin W.".into()),
        };
        assert_eq!(u.display_name(), "Lin W.");
        u.nickname = Some("  ".into());
        assert_eq!(u.display_name(), "lin");
        u.username = String::new();
        u.nickname = None;
        assert_eq!(u.display_name(), "");
    }
}
