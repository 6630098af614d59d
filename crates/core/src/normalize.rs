//! Mapping loosely-shaped model items onto [`GeneratedQuestion`].
//!
//! Models answer in several shapes. Each field is decoded by first detecting
//! which recognised shape is present, in a fixed precedence order, and only
//! then reading it. Anything unrecognised falls through to defaults.

use serde_json::{Map, Value};

use crate::types::{GeneratedQuestion, QuestionOption, QuestionType};

pub const DEFAULT_TIME_LIMIT_SECONDS: u32 = 60;
pub const DEFAULT_POINTS: u32 = 5;

enum TextShape<'a> {
    /// `{"question": {"text": ...}}`
    Nested(&'a str),
    /// `{"questionText": ...}`
    Flat(&'a str),
    /// `{"question": "..."}`
    Bare(&'a str),
    Missing,
}

impl<'a> TextShape<'a> {
    fn detect(item: &'a Map<String, Value>) -> Self {
        let question = item.get("question");
        if let Some(text) = question.and_then(|q| q.get("text")).and_then(Value::as_str) {
            return Self::Nested(text);
        }
        if let Some(text) = item.get("questionText").and_then(Value::as_str) {
            return Self::Flat(text);
        }
        if let Some(text) = question.and_then(Value::as_str) {
            return Self::Bare(text);
        }
        Self::Missing
    }

    fn decode(self) -> String {
        match self {
            Self::Nested(text) | Self::Flat(text) | Self::Bare(text) => text.trim().to_string(),
            Self::Missing => String::new(),
        }
    }
}

enum OptionsShape<'a> {
    /// `options: [{text, correct, explanation} | "text", ...]`
    Flat(&'a [Value]),
    /// `solution.incorrectLotItems` and/or `solution.correctLotItem`.
    LotItems {
        incorrect: &'a [Value],
        correct: Option<&'a Value>,
    },
    Missing,
}

impl<'a> OptionsShape<'a> {
    /// An explicit `options` array wins over options implied by the solution.
    fn detect(item: &'a Map<String, Value>) -> Self {
        if let Some(options) = item.get("options").and_then(Value::as_array) {
            return Self::Flat(options);
        }
        if let Some(solution) = item.get("solution").and_then(Value::as_object) {
            let incorrect = solution.get("incorrectLotItems").and_then(Value::as_array);
            let correct = solution.get("correctLotItem").filter(|v| v.is_object());
            if incorrect.is_some() || correct.is_some() {
                return Self::LotItems {
                    incorrect: incorrect.map(Vec::as_slice).unwrap_or_default(),
                    correct,
                };
            }
        }
        Self::Missing
    }

    fn decode(self) -> Vec<QuestionOption> {
        match self {
            Self::LotItems { incorrect, correct } => incorrect
                .iter()
                .map(|lot| lot_option(lot, false))
                .chain(correct.map(|lot| lot_option(lot, true)))
                .collect(),
            Self::Flat(options) => options.iter().filter_map(flat_option).collect(),
            Self::Missing => Vec::new(),
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Models misspell the key often enough that both spellings are accepted.
fn explanation_of(value: &Value) -> String {
    ["explaination", "explanation"]
        .iter()
        .map(|key| text_of(&value[*key]))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn lot_option(lot: &Value, correct: bool) -> QuestionOption {
    QuestionOption {
        text: text_of(&lot["text"]),
        correct,
        explanation: explanation_of(lot),
    }
}

fn flat_option(option: &Value) -> Option<QuestionOption> {
    match option {
        Value::Object(_) => Some(QuestionOption {
            text: text_of(&option["text"]),
            correct: option["correct"].as_bool().unwrap_or(false),
            explanation: explanation_of(option),
        }),
        Value::String(text) => Some(QuestionOption {
            text: text.trim().to_string(),
            correct: false,
            explanation: String::new(),
        }),
        _ => None,
    }
}

/// `question.<key>` first, then the flat `<key>` the prompt asks models for.
/// Only when both are absent or unusable do the defaults apply.
fn metadata<'a>(item: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    item.get("question")
        .and_then(|q| q.get(key))
        .or_else(|| item.get(key))
}

fn positive_u32(value: &Value) -> Option<u32> {
    let n = value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f > 0.0).map(|f| f as u64))?;
    u32::try_from(n).ok().filter(|n| *n > 0)
}

/// Normalise one raw model item into a question tagged with its origin.
pub fn normalize_raw_question(
    raw: &Value,
    segment_id: &str,
    question_type: QuestionType,
) -> GeneratedQuestion {
    let empty = Map::new();
    let (item, question_text) = match raw {
        Value::Object(item) => (item, TextShape::detect(item).decode()),
        Value::String(text) => (&empty, text.trim().to_string()),
        _ => (&empty, String::new()),
    };

    GeneratedQuestion {
        segment_id: segment_id.to_string(),
        question_type,
        question_text,
        options: OptionsShape::detect(item).decode(),
        solution: item.get("solution").cloned().unwrap_or(Value::Null),
        is_parameterized: metadata(item, "isParameterized")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        time_limit_seconds: metadata(item, "timeLimitSeconds")
            .and_then(positive_u32)
            .unwrap_or(DEFAULT_TIME_LIMIT_SECONDS),
        points: metadata(item, "points")
            .and_then(positive_u32)
            .unwrap_or(DEFAULT_POINTS),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn lot_item_shape_yields_one_correct_option() {
        let raw = json!({
            "question": {
                "text": "Which pigment absorbs light in photosynthesis?",
                "isParameterized": false,
                "timeLimitSeconds": 45,
                "points": 4
            },
            "solution": {
                "incorrectLotItems": [
                    {"text": "Keratin", "explaination": "A structural protein."},
                    {"text": "Hemoglobin", "explanation": "Carries oxygen in blood."},
                    {"text": "Melanin", "explanation": "Skin pigment."}
                ],
                "correctLotItem": {"text": "Chlorophyll", "explaination": "Absorbs red and blue light."}
            }
        });

        let question = normalize_raw_question(&raw, "t1", QuestionType::Sol);

        assert_eq!(question.question_text, "Which pigment absorbs light in photosynthesis?");
        assert_eq!(question.options.len(), 4);
        assert_eq!(question.options.iter().filter(|o| o.correct).count(), 1);
        let correct = question.options.last().unwrap();
        assert_eq!(correct.text, "Chlorophyll");
        assert_eq!(correct.explanation, "Absorbs red and blue light.");
        assert_eq!(question.options[0].explanation, "A structural protein.");
        assert_eq!((question.time_limit_seconds, question.points), (45, 4));
        assert_eq!(question.segment_id, "t1");
        assert_eq!(question.question_type, QuestionType::Sol);
    }

    #[test]
    fn flat_shape_reads_options_and_flat_metadata() {
        let raw = json!({
            "questionText": "Order the stages of mitosis.",
            "options": [
                {"text": "Prophase", "correct": true, "explanation": "First."},
                {"text": "Metaphase", "correct": true, "explanation": "Second."},
                "Anaphase",
                42,
                {"text": "Telophase"}
            ],
            "solution": "Prophase, Metaphase, Anaphase, Telophase",
            "isParameterized": true,
            "timeLimitSeconds": 120,
            "points": 10
        });

        let question = normalize_raw_question(&raw, "02:00.000", QuestionType::Otl);

        assert_eq!(question.question_text, "Order the stages of mitosis.");
        let texts: Vec<_> = question.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Prophase", "Metaphase", "Anaphase", "Telophase"]);
        assert!(!question.options[3].correct);
        assert_eq!(question.solution, json!("Prophase, Metaphase, Anaphase, Telophase"));
        assert!(question.is_parameterized);
        assert_eq!((question.time_limit_seconds, question.points), (120, 10));
    }

    #[test]
    fn flat_options_take_precedence_over_lot_items() {
        let raw = json!({
            "questionText": "Which gas do plants release?",
            "options": [
                {"text": "Oxygen", "correct": true, "explanation": "Photosynthesis by-product."},
                {"text": "Nitrogen", "correct": false, "explanation": "Not produced."},
                {"text": "Argon", "correct": false, "explanation": "Inert."},
                {"text": "Helium", "correct": false, "explanation": "Not produced."}
            ],
            "solution": {"incorrectLotItems": [{"text": "x"}]}
        });
        let question = normalize_raw_question(&raw, "s", QuestionType::Sol);

        let texts: Vec<_> = question.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Oxygen", "Nitrogen", "Argon", "Helium"]);
        assert_eq!(question.options.iter().filter(|o| o.correct).count(), 1);
        assert_eq!(question.solution, json!({"incorrectLotItems": [{"text": "x"}]}));
    }

    #[test]
    fn lot_items_apply_without_flat_options() {
        let raw = json!({
            "questionText": "Q",
            "solution": {"correctLotItem": {"text": "kept"}}
        });
        let question = normalize_raw_question(&raw, "s", QuestionType::Sol);
        assert_eq!(question.options.len(), 1);
        assert_eq!(question.options[0].text, "kept");
        assert!(question.options[0].correct);
    }

    #[test]
    fn nested_text_wins_over_flat_text() {
        let raw = json!({"question": {"text": "nested"}, "questionText": "flat"});
        assert_eq!(normalize_raw_question(&raw, "s", QuestionType::Sol).question_text, "nested");

        let bare = json!({"question": "bare"});
        assert_eq!(normalize_raw_question(&bare, "s", QuestionType::Sol).question_text, "bare");
    }

    #[test]
    fn nested_metadata_wins_over_flat_metadata() {
        let raw = json!({
            "question": {"text": "Q", "timeLimitSeconds": 30, "isParameterized": false},
            "timeLimitSeconds": 200,
            "isParameterized": true,
            "points": 9
        });
        let question = normalize_raw_question(&raw, "s", QuestionType::Sml);
        assert_eq!(question.time_limit_seconds, 30);
        assert!(!question.is_parameterized);
        assert_eq!(question.points, 9);
    }

    #[test]
    fn missing_metadata_uses_defaults() {
        let raw = json!({"questionText": "What is ATP?"});
        let question = normalize_raw_question(&raw, "t1", QuestionType::Sml);

        assert!(question.options.is_empty());
        assert_eq!(question.solution, Value::Null);
        assert!(!question.is_parameterized);
        assert_eq!(question.time_limit_seconds, DEFAULT_TIME_LIMIT_SECONDS);
        assert_eq!(question.points, DEFAULT_POINTS);
    }

    #[test]
    fn degenerate_metadata_falls_back() {
        let raw = json!({"questionText": "Q", "timeLimitSeconds": 0, "points": "ten"});
        let question = normalize_raw_question(&raw, "t1", QuestionType::Nat);
        assert_eq!(question.time_limit_seconds, 60);
        assert_eq!(question.points, 5);

        let float = json!({"questionText": "Q", "timeLimitSeconds": 90.0});
        assert_eq!(normalize_raw_question(&float, "t1", QuestionType::Nat).time_limit_seconds, 90);
    }

    #[test]
    fn non_object_items_do_not_fail() {
        let text = normalize_raw_question(&json!("Define osmosis."), "t1", QuestionType::Des);
        assert_eq!(text.question_text, "Define osmosis.");

        let number = normalize_raw_question(&json!(7), "t1", QuestionType::Des);
        assert_eq!(number.question_text, "");
        assert!(number.options.is_empty());
    }
}
