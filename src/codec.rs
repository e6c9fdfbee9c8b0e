//! Exam paper <-> spreadsheet grid.
//!
//! One sheet per paper. Row 1 is a header, data starts on row 2:
//!
//! | col | content                                         |
//! |-----|-------------------------------------------------|
//! | 1   | order (integer)                                 |
//! | 2   | question text                                   |
//! | 3   | type label (单选题 / 多选题 / 判断题 / 填空题)   |
//! | 4   | difficulty `1`/`2`/`3`                          |
//! | 5   | correct answer, blank accepts anything          |
//! | 6+  | option texts A..Z, choice questions only        |

use crate::model::{
    Difficulty, ExamPaper, ExamPaperQuestion, ExamPaperType, Question, QuestionOption,
    QuestionType,
};
use crate::workbook::{Sheet, Workbook};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DEFAULT_MAX_CELL_CHARS: usize = 256;
pub const MAX_OPTION_COLUMNS: usize = 26;
const FIXED_COLUMNS: usize = 5;
const HEADERS: [&str; FIXED_COLUMNS] = ["序号", "题目", "题型", "难度", "答案"];
const DEFAULT_SHEET_NAME: &str = "Sheet1";
/// Excel's limits on worksheet names.
const MAX_SHEET_NAME_CHARS: usize = 31;
const FORBIDDEN_SHEET_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

#[derive(Debug, Clone, Copy)]
pub struct CodecOptions {
    pub max_cell_chars: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_cell_chars: DEFAULT_MAX_CELL_CHARS,
        }
    }
}

/// Papers parsed from the clean sheets plus the messages of every sheet
/// that failed. A failed sheet contributes no paper.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub papers: Vec<ExamPaper>,
    pub errors: BTreeMap<String, Vec<String>>,
}

pub struct PaperCodec {
    options: CodecOptions,
    letters: Regex,
}

impl PaperCodec {
    pub fn new(options: CodecOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            options,
            letters: Regex::new(r"^[a-zA-Z]+$")?,
        })
    }

    pub fn max_cell_chars(&self) -> usize {
        self.options.max_cell_chars
    }

    pub fn parse(&self, workbook: &Workbook) -> ParseOutcome {
        let mut out = ParseOutcome::default();
        for sheet in &workbook.sheets {
            match self.parse_sheet(sheet) {
                Ok(paper) => out.papers.push(paper),
                Err(messages) => {
                    out.errors
                        .entry(sheet.name.clone())
                        .or_default()
                        .extend(messages);
                }
            }
        }
        out
    }

    fn parse_sheet(&self, sheet: &Sheet) -> Result<ExamPaper, Vec<String>> {
        let mut errors: Vec<String> = Vec::new();
        let mut links: Vec<ExamPaperQuestion> = Vec::new();
        let mut seen_orders: HashSet<i64> = HashSet::new();

        for (idx, raw) in sheet.rows.iter().enumerate().skip(1) {
            let row_no = idx + 1;
            let width = raw.len().min(FIXED_COLUMNS + MAX_OPTION_COLUMNS);
            let cells: Vec<&str> = raw[..width].iter().map(|c| c.trim()).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            let cell = |col: usize| cells.get(col - 1).copied().unwrap_or("");

            // Length is measured before trimming.
            let before = errors.len();
            for (i, c) in raw[..width].iter().enumerate() {
                if c.chars().count() > self.options.max_cell_chars {
                    errors.push(format!(
                        "row {row_no}, column {}: value exceeds {} characters",
                        i + 1,
                        self.options.max_cell_chars
                    ));
                }
            }
            if errors.len() > before {
                continue;
            }

            let order = match parse_order(cell(1)) {
                Some(v) => {
                    if !seen_orders.insert(v) {
                        errors.push(format!("row {row_no}: duplicate order {v}"));
                    }
                    Some(v)
                }
                None => {
                    errors.push(format!("row {row_no}: order must be an integer"));
                    None
                }
            };

            let text = cell(2);
            if text.is_empty() {
                errors.push(format!("row {row_no}: question text is required"));
            }

            let question_type = QuestionType::from_label(cell(3));
            if question_type.is_none() {
                let labels: Vec<&str> = QuestionType::ALL.iter().map(|t| t.label()).collect();
                errors.push(format!(
                    "row {row_no}: question type must be one of {}",
                    labels.join(", ")
                ));
            }

            let difficulty = match cell(4) {
                "1" => Some(Difficulty::Easy),
                "2" => Some(Difficulty::Medium),
                "3" => Some(Difficulty::Hard),
                _ => {
                    errors.push(format!("row {row_no}: difficulty must be 1, 2 or 3"));
                    None
                }
            };

            let correct_answer = match question_type {
                Some(t) => match self.validate_answer(t, cell(5)) {
                    Ok(v) => Some(v),
                    Err(msg) => {
                        errors.push(format!("row {row_no}: {msg}"));
                        None
                    }
                },
                None => None,
            };

            let (Some(order), Some(question_type), Some(difficulty), Some(correct_answer)) =
                (order, question_type, difficulty, correct_answer)
            else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            let options = if question_type.has_options() {
                option_cells(&cells)
            } else {
                Vec::new()
            };

            links.push(ExamPaperQuestion {
                id: String::new(),
                exam_paper_id: String::new(),
                question_id: String::new(),
                order,
                question: Some(Question {
                    id: String::new(),
                    text: text.to_string(),
                    question_type,
                    correct_answer,
                    difficulty,
                    options,
                }),
            });
        }

        if errors.is_empty() && links.is_empty() {
            errors.push("no questions found".to_string());
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        links.sort_by_key(|l| l.order);
        let difficulty = Difficulty::truncated_average(
            links
                .iter()
                .filter_map(|l| l.question.as_ref().map(|q| q.difficulty)),
        );
        Ok(ExamPaper {
            id: String::new(),
            name: sheet.name.clone(),
            paper_type: ExamPaperType::Import,
            difficulty,
            total_questions: links.len() as i64,
            questions: links,
        })
    }

    /// Checks a trimmed answer key against its type and returns the stored
    /// form. Choice keys are upper-cased.
    pub fn validate_answer(&self, question_type: QuestionType, raw: &str) -> Result<String, String> {
        if raw.is_empty() {
            return Ok(String::new());
        }
        match question_type {
            QuestionType::SingleChoice => {
                if raw.chars().count() == 1 && self.letters.is_match(raw) {
                    Ok(raw.to_ascii_uppercase())
                } else {
                    Err("single choice answer must be one letter".to_string())
                }
            }
            QuestionType::MultipleChoice => {
                if self.letters.is_match(raw) {
                    Ok(raw.to_ascii_uppercase())
                } else {
                    Err("multiple choice answer must contain letters only".to_string())
                }
            }
            QuestionType::TrueFalse => match raw {
                "0" | "1" => Ok(raw.to_string()),
                _ => Err("true/false answer must be 0 or 1".to_string()),
            },
            QuestionType::FillInTheBlank => Ok(raw.to_string()),
        }
    }

    /// One sheet per paper, rows in `order`. Papers must carry their
    /// question graph; links without an embedded question are skipped.
    pub fn generate(&self, papers: &[ExamPaper]) -> Workbook {
        let mut used: HashMap<String, usize> = HashMap::new();
        let mut sheets = Vec::with_capacity(papers.len());

        for paper in papers {
            let name = unique_sheet_name(&sheet_base_name(&paper.name), &mut used);

            let mut links: Vec<&ExamPaperQuestion> = paper.questions.iter().collect();
            links.sort_by_key(|l| l.order);

            let option_columns = links
                .iter()
                .filter_map(|l| l.question.as_ref())
                .filter(|q| q.question_type.has_options())
                .flat_map(|q| q.options.iter().filter_map(|o| option_index(o.code)))
                .map(|i| i + 1)
                .max()
                .unwrap_or(0);

            let mut header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
            header.extend((0..option_columns).map(|i| option_letter(i).to_string()));
            let mut rows = vec![header];

            for link in links {
                let Some(q) = link.question.as_ref() else {
                    continue;
                };
                let difficulty = match q.difficulty {
                    Difficulty::None => String::new(),
                    d => d.code().to_string(),
                };
                let mut row = vec![
                    link.order.to_string(),
                    q.text.clone(),
                    q.question_type.label().to_string(),
                    difficulty,
                    q.correct_answer.clone(),
                ];
                if q.question_type.has_options() {
                    for opt in q.sorted_options() {
                        let Some(i) = option_index(opt.code) else {
                            continue;
                        };
                        let col = FIXED_COLUMNS + i;
                        if row.len() <= col {
                            row.resize(col + 1, String::new());
                        }
                        row[col] = opt.text.clone();
                    }
                }
                rows.push(row);
            }

            sheets.push(Sheet { name, rows });
        }

        Workbook { sheets }
    }
}

fn parse_order(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // Numeric cells may come back as "3.0".
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

fn option_cells(cells: &[&str]) -> Vec<QuestionOption> {
    cells
        .iter()
        .skip(FIXED_COLUMNS)
        .take(MAX_OPTION_COLUMNS)
        .enumerate()
        .filter(|(_, text)| !text.is_empty())
        .map(|(i, text)| QuestionOption {
            id: String::new(),
            question_id: String::new(),
            code: option_letter(i),
            text: text.to_string(),
        })
        .collect()
}

fn option_letter(i: usize) -> char {
    (b'A' + i as u8) as char
}

fn option_index(code: char) -> Option<usize> {
    let c = code.to_ascii_uppercase();
    if c.is_ascii_uppercase() {
        Some((c as u8 - b'A') as usize)
    } else {
        None
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// A name Excel accepts: forbidden characters become `_`, surrounding
/// apostrophes are stripped, at most 31 characters, never blank.
fn sheet_base_name(paper_name: &str) -> String {
    let cleaned: String = paper_name
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').trim();
    if cleaned.is_empty() {
        return DEFAULT_SHEET_NAME.to_string();
    }
    truncate_chars(cleaned, MAX_SHEET_NAME_CHARS)
}

/// Sheet names compare case-insensitively. A collision gets a `-n`
/// suffix; the stem is shortened so the result stays within 31 characters.
fn unique_sheet_name(base: &str, used: &mut HashMap<String, usize>) -> String {
    let key = base.to_lowercase();
    if !used.contains_key(&key) {
        used.insert(key, 0);
        return base.to_string();
    }
    loop {
        let counter = used.entry(key.clone()).or_insert(0);
        *counter += 1;
        let suffix = format!("-{counter}");
        let stem = truncate_chars(base, MAX_SHEET_NAME_CHARS - suffix.len());
        let candidate = format!("{stem}{suffix}");
        let candidate_key = candidate.to_lowercase();
        if !used.contains_key(&candidate_key) {
            used.insert(candidate_key, 0);
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PaperCodec {
        PaperCodec::new(CodecOptions::default()).expect("codec")
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn header() -> Vec<String> {
        row(&["序号", "题目", "题型", "难度", "答案", "A", "B", "C", "D"])
    }

    fn sheet(name: &str, rows: Vec<Vec<String>>) -> Sheet {
        let mut all = vec![header()];
        all.extend(rows);
        Sheet {
            name: name.into(),
            rows: all,
        }
    }

    #[test]
    fn parses_all_question_types() {
        let book = Workbook {
            sheets: vec![sheet(
                "Unit 1",
                vec![
                    row(&["2", "Pick all primes", "多选题", "3", "ac", "2", "4", "5"]),
                    row(&["1", "Capital of France?", "单选题", "1", "B", "Rome", "Paris"]),
                    row(&["3", "The earth is flat", "判断题", "2", "0", "ignored"]),
                    row(&["4", "H2O is ____", "填空题", "1", "water"]),
                ],
            )],
        };
        let out = codec().parse(&book);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let paper = &out.papers[0];
        assert_eq!(paper.name, "Unit 1");
        assert_eq!(paper.paper_type, ExamPaperType::Import);
        assert_eq!(paper.total_questions, 4);

        let qs: Vec<&Question> = paper
            .questions
            .iter()
            .filter_map(|l| l.question.as_ref())
            .collect();
        assert_eq!(qs[0].text, "Capital of France?");
        assert_eq!(qs[0].options.len(), 2);
        assert_eq!(qs[0].options[1].code, 'B');
        assert_eq!(qs[1].correct_answer, "AC");
        assert_eq!(qs[1].options.len(), 3);
        // Options are only read for choice questions.
        assert!(qs[2].options.is_empty());
        assert_eq!(qs[3].correct_answer, "water");

        // (1 + 3 + 2 + 1) / 4 = 1.75 -> Easy
        assert_eq!(paper.difficulty, Difficulty::Easy);
    }

    #[test]
    fn errors_are_collected_per_sheet_and_siblings_still_parse() {
        let long = "x".repeat(257);
        let book = Workbook {
            sheets: vec![
                sheet(
                    "Broken",
                    vec![
                        row(&["one", "", "问答题", "4", ""]),
                        row(&["2", &long, "填空题", "1", ""]),
                        row(&["3", "q", "单选题", "1", "AB"]),
                        row(&["4", "q", "多选题", "1", "A,B"]),
                        row(&["5", "q", "判断题", "1", "yes"]),
                        row(&["5", "dup", "填空题", "1", ""]),
                    ],
                ),
                sheet("Good", vec![row(&["1", "q", "填空题", "2", ""])]),
            ],
        };
        let out = codec().parse(&book);
        assert_eq!(out.papers.len(), 1);
        assert_eq!(out.papers[0].name, "Good");

        let msgs = out.errors.get("Broken").expect("broken sheet errors");
        assert!(msgs.iter().any(|m| m == "row 2: order must be an integer"));
        assert!(msgs.iter().any(|m| m == "row 2: question text is required"));
        assert!(msgs.iter().any(|m| m.starts_with("row 2: question type must be one of")));
        assert!(msgs.iter().any(|m| m == "row 2: difficulty must be 1, 2 or 3"));
        assert!(msgs.iter().any(|m| m == "row 3, column 2: value exceeds 256 characters"));
        assert!(msgs.iter().any(|m| m == "row 4: single choice answer must be one letter"));
        assert!(msgs.iter().any(|m| m == "row 5: multiple choice answer must contain letters only"));
        assert!(msgs.iter().any(|m| m == "row 6: true/false answer must be 0 or 1"));
        assert!(msgs.iter().any(|m| m == "row 7: duplicate order 5"));
    }

    #[test]
    fn blank_rows_are_skipped_and_empty_sheets_rejected() {
        let book = Workbook {
            sheets: vec![
                sheet(
                    "Sparse",
                    vec![
                        row(&["", "", ""]),
                        row(&["1", "q", "填空题", "1", ""]),
                    ],
                ),
                sheet("Empty", vec![]),
            ],
        };
        let out = codec().parse(&book);
        assert_eq!(out.papers.len(), 1);
        assert_eq!(out.papers[0].total_questions, 1);
        assert_eq!(
            out.errors.get("Empty"),
            Some(&vec!["no questions found".to_string()])
        );
    }

    #[test]
    fn option_columns_past_z_are_dropped() {
        let mut cells = vec!["1", "many options", "单选题", "1", "A"];
        let texts: Vec<String> = (0..30).map(|i| format!("opt{i}")).collect();
        cells.extend(texts.iter().map(|s| s.as_str()));
        let book = Workbook {
            sheets: vec![sheet("Wide", vec![row(&cells)])],
        };
        let out = codec().parse(&book);
        let q = out.papers[0].questions[0].question.as_ref().expect("question");
        assert_eq!(q.options.len(), MAX_OPTION_COLUMNS);
        assert_eq!(q.options.last().map(|o| o.code), Some('Z'));
    }

    #[test]
    fn generate_then_parse_reproduces_the_paper() {
        let book = Workbook {
            sheets: vec![sheet(
                "Round",
                vec![
                    row(&["1", "Capital?", "单选题", "1", "B", "Rome", "Paris"]),
                    row(&["2", "Primes", "多选题", "3", "AC", "2", "", "5"]),
                    row(&["3", "Flat?", "判断题", "2", "0"]),
                    row(&["4", "H2O", "填空题", "1", ""]),
                ],
            )],
        };
        let c = codec();
        let first = c.parse(&book);
        let regenerated = c.generate(&first.papers);
        let second = c.parse(&regenerated);
        assert!(second.errors.is_empty(), "{:?}", second.errors);

        let strip = |p: &ExamPaper| -> Vec<(i64, Question)> {
            p.questions
                .iter()
                .map(|l| (l.order, l.question.clone().expect("question")))
                .collect()
        };
        assert_eq!(strip(&first.papers[0]), strip(&second.papers[0]));
        // Gapped option codes keep their column.
        let primes = &second.papers[0].questions[1].question.as_ref().expect("q").options;
        assert_eq!(primes.iter().map(|o| o.code).collect::<Vec<_>>(), vec!['A', 'C']);
    }

    #[test]
    fn generate_reproduces_a_canonical_grid() {
        let book = Workbook {
            sheets: vec![Sheet {
                name: "Exact".into(),
                rows: vec![
                    row(&["序号", "题目", "题型", "难度", "答案", "A", "B", "C"]),
                    row(&["1", "Capital?", "单选题", "1", "B", "Rome", "Paris", "Oslo"]),
                    row(&["2", "Primes", "多选题", "3", "AC", "2", "4", "5"]),
                    row(&["3", "Flat?", "判断题", "2", "0"]),
                    row(&["4", "H2O", "填空题", "1", "water"]),
                ],
            }],
        };
        let c = codec();
        let parsed = c.parse(&book);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(c.generate(&parsed.papers), book);
    }

    #[test]
    fn padded_cells_count_their_whitespace() {
        let padded = format!("q{}", " ".repeat(300));
        let book = Workbook {
            sheets: vec![sheet("Padded", vec![row(&["1", &padded, "填空题", "1", ""])])],
        };
        let out = codec().parse(&book);
        assert!(out.papers.is_empty());
        assert_eq!(
            out.errors.get("Padded"),
            Some(&vec!["row 2, column 2: value exceeds 256 characters".to_string()])
        );
    }

    #[test]
    fn sheet_names_follow_excel_rules() {
        let paper = |name: &str| ExamPaper {
            id: String::new(),
            name: name.into(),
            paper_type: ExamPaperType::Random,
            difficulty: Difficulty::None,
            total_questions: 0,
            questions: Vec::new(),
        };
        let long = "Random paper 2026-10-15 00:35:42";
        let book = codec().generate(&[
            paper(long),
            paper(long),
            paper("a/b?[c]*"),
            paper("QUIZ"),
            paper("quiz"),
            paper("'quoted'"),
        ]);
        let names: Vec<&str> = book.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Random paper 2026-10-15 00_35_4",
                "Random paper 2026-10-15 00_35-1",
                "a_b__c__",
                "QUIZ",
                "quiz-1",
                "quoted",
            ]
        );
        for name in names {
            assert!(name.chars().count() <= MAX_SHEET_NAME_CHARS);
            assert!(!name.contains(FORBIDDEN_SHEET_CHARS));
        }
    }

    #[test]
    fn generate_names_sheets_uniquely() {
        let paper = |name: &str| ExamPaper {
            id: String::new(),
            name: name.into(),
            paper_type: ExamPaperType::Create,
            difficulty: Difficulty::None,
            total_questions: 0,
            questions: Vec::new(),
        };
        let book = codec().generate(&[paper("Quiz"), paper("Quiz"), paper(" "), paper("Quiz"), paper("")]);
        let names: Vec<&str> = book.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Quiz", "Quiz-1", "Sheet1", "Quiz-2", "Sheet1-1"]);
        assert_eq!(book.sheets[0].rows[0][0], "序号");
    }
}
