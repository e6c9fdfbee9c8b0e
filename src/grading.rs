use crate::model::QuestionType;

/// One submitted answer paired with its key.
#[derive(Debug, Clone, Copy)]
pub struct GradeInput<'a> {
    pub question_type: QuestionType,
    pub correct_answer: &'a str,
    pub submitted: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeOutcome {
    pub correctness: Vec<bool>,
    pub total_incorrect: i64,
    pub total_answered: i64,
}

/// Whether a single answer is correct.
///
/// Both sides are trimmed. Multiple choice passes when every letter of the
/// key appears somewhere in the submission; extra letters are not
/// penalised. Every other type needs an exact, case-sensitive match.
/// A blank key accepts any non-blank submission. A blank submission is
/// never correct.
pub fn is_correct(question_type: QuestionType, correct_answer: &str, submitted: Option<&str>) -> bool {
    let Some(submitted) = submitted.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let key = correct_answer.trim();
    if key.is_empty() {
        return true;
    }
    match question_type {
        QuestionType::MultipleChoice => key.chars().all(|c| submitted.contains(c)),
        _ => submitted == key,
    }
}

/// Grades a whole attempt in order.
pub fn grade<'a, I>(inputs: I) -> GradeOutcome
where
    I: IntoIterator<Item = GradeInput<'a>>,
{
    let mut correctness = Vec::new();
    let mut total_incorrect = 0;
    let mut total_answered = 0;
    for input in inputs {
        if input.submitted.map(|s| !s.trim().is_empty()).unwrap_or(false) {
            total_answered += 1;
        }
        let ok = is_correct(input.question_type, input.correct_answer, input.submitted);
        if !ok {
            total_incorrect += 1;
        }
        correctness.push(ok);
    }
    GradeOutcome {
        correctness,
        total_incorrect,
        total_answered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_choice_uses_containment() {
        let mc = QuestionType::MultipleChoice;
        assert!(is_correct(mc, "ABC", Some("CAB")));
        assert!(!is_correct(mc, "ABC", Some("AB")));
        assert!(is_correct(mc, "ABC", Some("ABCD")));
        assert!(is_correct(mc, " ABC ", Some(" BCA")));
    }

    #[test]
    fn exact_match_types_are_trimmed_and_case_sensitive() {
        let sc = QuestionType::SingleChoice;
        assert!(!is_correct(sc, "B", Some(" b ")));
        assert!(is_correct(sc, "B", Some("B")));
        assert!(is_correct(sc, "B", Some("  B\t")));
        assert!(is_correct(QuestionType::TrueFalse, "1", Some("1")));
        assert!(!is_correct(QuestionType::TrueFalse, "1", Some("0")));
        assert!(!is_correct(QuestionType::FillInTheBlank, "Paris", Some("paris")));
    }

    #[test]
    fn blank_submissions_are_never_correct() {
        assert!(!is_correct(QuestionType::FillInTheBlank, "", None));
        assert!(!is_correct(QuestionType::FillInTheBlank, "", Some("   ")));
        assert!(!is_correct(QuestionType::MultipleChoice, "AB", Some("")));
    }

    #[test]
    fn blank_key_accepts_any_answer() {
        assert!(is_correct(QuestionType::FillInTheBlank, "", Some("anything")));
        assert!(is_correct(QuestionType::SingleChoice, "  ", Some("C")));
    }

    #[test]
    fn grade_tallies_incorrect_and_answered() {
        let out = grade([
            GradeInput {
                question_type: QuestionType::SingleChoice,
                correct_answer: "A",
                submitted: Some("A"),
            },
            GradeInput {
                question_type: QuestionType::MultipleChoice,
                correct_answer: "AC",
                submitted: Some("A"),
            },
            GradeInput {
                question_type: QuestionType::TrueFalse,
                correct_answer: "0",
                submitted: None,
            },
        ]);
        assert_eq!(out.correctness, vec![true, false, false]);
        assert_eq!(out.total_incorrect, 2);
        assert_eq!(out.total_answered, 2);
    }
}
