//! Per-type prompt clauses, scoring and response schemas.
//!
//! The generation engine looks everything type-specific up here, so adding a
//! question format means adding a row, not a branch.

use serde_json::{Value, json};

use crate::types::QuestionType;

pub struct QuestionTypeProfile {
    pub question_type: QuestionType,
    pub description: &'static str,
    pub prompt_clause: &'static str,
    pub time_limit_seconds: u32,
    pub points: u32,
    /// JSON shown for `solution` in the prompt example; matches the schema.
    pub solution_example: &'static str,
    schema: Option<fn() -> Value>,
}

impl QuestionTypeProfile {
    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    /// Schema for one question object, if one is registered.
    pub fn question_schema(&self) -> Option<Value> {
        self.schema.map(|build| build())
    }
}

static PROFILES: [QuestionTypeProfile; 5] = [
    QuestionTypeProfile {
        question_type: QuestionType::Sol,
        description: "single-correct multiple choice",
        prompt_clause: "Generate a single-correct MCQ. Exactly one option has \"correct\": true.",
        time_limit_seconds: 60,
        points: 5,
        solution_example: r#""...""#,
        schema: Some(choice_schema),
    },
    QuestionTypeProfile {
        question_type: QuestionType::Sml,
        description: "multiple-correct multiple choice",
        prompt_clause: "Generate a multiple-correct MCQ. Two or three options have \"correct\": true.",
        time_limit_seconds: 90,
        points: 8,
        solution_example: r#""...""#,
        schema: Some(choice_schema),
    },
    QuestionTypeProfile {
        question_type: QuestionType::Otl,
        description: "ordering",
        prompt_clause: "Generate an ordering question. List the options already sorted in the correct order.",
        time_limit_seconds: 120,
        points: 10,
        solution_example: r#""...""#,
        schema: Some(choice_schema),
    },
    QuestionTypeProfile {
        question_type: QuestionType::Nat,
        description: "numeric answer",
        prompt_clause: "Generate a numeric-answer question. The solution holds the numeric value; exactly one option has \"correct\": true and states that value.",
        time_limit_seconds: 90,
        points: 6,
        solution_example: r#"{"value": 0, "tolerance": 0}"#,
        schema: Some(numeric_schema),
    },
    QuestionTypeProfile {
        question_type: QuestionType::Des,
        description: "descriptive answer",
        prompt_clause: "Generate a descriptive question with a detailed model answer as the solution. Exactly one option has \"correct\": true and summarises that answer.",
        time_limit_seconds: 300,
        points: 15,
        solution_example: r#""...""#,
        schema: None,
    },
];

pub fn profile(question_type: QuestionType) -> &'static QuestionTypeProfile {
    // PROFILES is ordered like QuestionType::ALL.
    &PROFILES[question_type as usize]
}

/// Response schema for `count` questions: one object, or an array of exactly `count`.
pub fn schema_for(question_type: QuestionType, count: u32) -> Option<Value> {
    let question = profile(question_type).question_schema()?;
    if count == 1 {
        return Some(question);
    }
    Some(json!({
        "type": "array",
        "items": question,
        "minItems": count,
        "maxItems": count,
    }))
}

fn option_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": { "type": "string" },
            "correct": { "type": "boolean" },
            "explanation": { "type": "string" },
        },
        "required": ["text", "correct", "explanation"],
    })
}

fn question_object_schema(solution: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "questionText": { "type": "string" },
            "options": {
                "type": "array",
                "items": option_schema(),
                "minItems": 4,
            },
            "solution": solution,
            "isParameterized": { "type": "boolean" },
            "timeLimitSeconds": { "type": "integer" },
            "points": { "type": "integer" },
        },
        "required": [
            "questionText",
            "options",
            "solution",
            "isParameterized",
            "timeLimitSeconds",
            "points",
        ],
    })
}

fn choice_schema() -> Value {
    question_object_schema(json!({ "type": "string" }))
}

fn numeric_schema() -> Value {
    question_object_schema(json!({
        "type": "object",
        "properties": {
            "value": { "type": "number" },
            "tolerance": { "type": "number" },
        },
        "required": ["value"],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_type() {
        for question_type in QuestionType::ALL {
            assert_eq!(profile(question_type).question_type, question_type);
        }
    }

    #[test]
    fn timing_and_points_match_type() {
        let sol = profile(QuestionType::Sol);
        assert_eq!((sol.time_limit_seconds, sol.points), (60, 5));
        let otl = profile(QuestionType::Otl);
        assert_eq!((otl.time_limit_seconds, otl.points), (120, 10));
        let des = profile(QuestionType::Des);
        assert_eq!((des.time_limit_seconds, des.points), (300, 15));
    }

    #[test]
    fn single_question_schema_is_an_object() {
        let schema = schema_for(QuestionType::Sol, 1).unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["options"]["minItems"], 4);
    }

    #[test]
    fn batch_schema_pins_item_count() {
        let schema = schema_for(QuestionType::Nat, 3).unwrap();
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["minItems"], 3);
        assert_eq!(schema["maxItems"], 3);
        assert_eq!(schema["items"]["properties"]["solution"]["type"], "object");
    }

    #[test]
    fn solution_examples_match_their_schema() {
        for question_type in QuestionType::ALL {
            let profile = profile(question_type);
            let example: Value = serde_json::from_str(profile.solution_example).unwrap();
            let Some(schema) = profile.question_schema() else {
                continue;
            };
            match schema["properties"]["solution"]["type"].as_str() {
                Some("object") => assert!(example.is_object(), "{question_type}"),
                Some("string") => assert!(example.is_string(), "{question_type}"),
                other => panic!("unexpected solution type {other:?}"),
            }
        }
    }

    #[test]
    fn descriptive_has_no_schema() {
        assert!(!profile(QuestionType::Des).has_schema());
        assert!(schema_for(QuestionType::Des, 2).is_none());
    }
}
