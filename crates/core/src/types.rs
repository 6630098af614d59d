use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use serde_json::Value;

use crate::error::{QuizgenError, Result};

/// A topical span of a transcript, keyed by its end timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub end_time: String,
    pub transcript_lines: Vec<String>,
}

/// Cleaned segment text keyed by segment id, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTextMap {
    entries: Vec<(String, String)>,
}

impl SegmentTextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `text` under `id`. A repeated id appends to the existing text so
    /// keys stay unique and keep their first-seen position.
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        let id = id.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(key, _)| *key == id) {
            Some((_, existing)) => {
                existing.push(' ');
                existing.push_str(&text);
            }
            None => self.entries.push((id, text)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, text)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, text)| (key.as_str(), text.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SegmentTextMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (id, text) in iter {
            map.insert(id, text);
        }
        map
    }
}

impl Serialize for SegmentTextMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, text) in &self.entries {
            map.serialize_entry(id, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SegmentTextMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SegmentTextMapVisitor;

        impl<'de> Visitor<'de> for SegmentTextMapVisitor {
            type Value = SegmentTextMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of segment id to transcript text")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut map = SegmentTextMap::new();
                while let Some((id, text)) = access.next_entry::<String, String>()? {
                    map.insert(id, text);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(SegmentTextMapVisitor)
    }
}

/// The closed set of supported question formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    /// Single correct option.
    #[serde(rename = "SOL")]
    Sol,
    /// Multiple correct options.
    #[serde(rename = "SML")]
    Sml,
    /// Ordering.
    #[serde(rename = "OTL")]
    Otl,
    /// Numeric answer.
    #[serde(rename = "NAT")]
    Nat,
    /// Descriptive answer.
    #[serde(rename = "DES")]
    Des,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::Sol,
        QuestionType::Sml,
        QuestionType::Otl,
        QuestionType::Nat,
        QuestionType::Des,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            QuestionType::Sol => "SOL",
            QuestionType::Sml => "SML",
            QuestionType::Otl => "OTL",
            QuestionType::Nat => "NAT",
            QuestionType::Des => "DES",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for QuestionType {
    type Err = QuizgenError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim();
        QuestionType::ALL
            .into_iter()
            .find(|t| t.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| QuizgenError::invalid_argument(format!("unknown question type {tag:?}")))
    }
}

/// Requested number of questions per type for one generation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionSpec(BTreeMap<QuestionType, u32>);

impl QuestionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, question_type: QuestionType, count: u32) -> Self {
        self.0.insert(question_type, count);
        self
    }

    /// Build a spec from `(tag, count)` pairs such as `("SOL", 2)`.
    pub fn from_tags<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |spec, (tag, count)| {
                Ok(spec.with(tag.as_ref().parse()?, count))
            })
    }

    /// Accept the list-of-specs form (`[{...}]`); only the first entry is used.
    pub fn first_of(specs: &[QuestionSpec]) -> Result<Self> {
        let first = specs
            .first()
            .ok_or_else(|| QuizgenError::invalid_argument("question specification list is empty"))?;
        first.validate()?;
        Ok(first.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.active().next().is_none() {
            return Err(QuizgenError::invalid_argument(
                "question specification has no type with a positive count",
            ));
        }
        Ok(())
    }

    /// Entries with a positive count, in type order.
    pub fn active(&self) -> impl Iterator<Item = (QuestionType, u32)> + '_ {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(question_type, count)| (*question_type, *count))
    }

    pub fn total(&self) -> u32 {
        self.active().map(|(_, count)| count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub text: String,
    pub correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub segment_id: String,
    pub question_type: QuestionType,
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub solution: Value,
    pub is_parameterized: bool,
    pub time_limit_seconds: u32,
    pub points: u32,
}

/// A model item exactly as returned, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    pub segment_id: String,
    pub question_type: QuestionType,
    pub item: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The request itself failed (timeout, refused, upstream error).
    Transport,
    /// The model answered but the payload could not be used.
    Parse,
}

/// One `(segment, type)` pair that contributed no questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFailure {
    pub segment_id: String,
    pub question_type: QuestionType,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub questions: Vec<GeneratedQuestion>,
    pub raw: Vec<RawQuestion>,
    pub failures: Vec<PairFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTranscript {
    pub segments: SegmentTextMap,
    pub outcome: GenerationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_map_keeps_discovery_order_and_unique_keys() {
        let mut map = SegmentTextMap::new();
        map.insert("02:00.000", "second");
        map.insert("01:00.000", "first");
        map.insert("02:00.000", "more");

        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["02:00.000", "01:00.000"]);
        assert_eq!(map.get("02:00.000"), Some("second more"));
    }

    #[test]
    fn segment_map_serializes_as_ordered_object() {
        let map: SegmentTextMap = [("b", "two"), ("a", "one")].into_iter().collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"b":"two","a":"one"}"#);

        let back: SegmentTextMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn question_type_parses_tags() {
        assert_eq!("SOL".parse::<QuestionType>().unwrap(), QuestionType::Sol);
        assert_eq!(" des ".parse::<QuestionType>().unwrap(), QuestionType::Des);
        assert!("MCQ".parse::<QuestionType>().is_err());
        assert_eq!(serde_json::to_string(&QuestionType::Otl).unwrap(), r#""OTL""#);
    }

    #[test]
    fn spec_requires_a_positive_count() {
        assert!(QuestionSpec::new().validate().is_err());
        assert!(QuestionSpec::new().with(QuestionType::Sol, 0).validate().is_err());
        assert!(QuestionSpec::new().with(QuestionType::Nat, 2).validate().is_ok());
    }

    #[test]
    fn spec_iterates_active_entries_in_type_order() {
        let spec = QuestionSpec::from_tags([("DES", 1), ("SOL", 2), ("SML", 0)]).unwrap();
        let active: Vec<_> = spec.active().collect();
        assert_eq!(active, vec![(QuestionType::Sol, 2), (QuestionType::Des, 1)]);
        assert_eq!(spec.total(), 3);
    }

    #[test]
    fn spec_list_form_uses_first_entry() {
        let specs: Vec<QuestionSpec> = serde_json::from_str(r#"[{"SOL": 1}, {"DES": 4}]"#).unwrap();
        let spec = QuestionSpec::first_of(&specs).unwrap();
        assert_eq!(spec.active().collect::<Vec<_>>(), vec![(QuestionType::Sol, 1)]);

        assert!(QuestionSpec::first_of(&[]).is_err());
        let empty: Vec<QuestionSpec> = serde_json::from_str("[{}]").unwrap();
        assert!(matches!(
            QuestionSpec::first_of(&empty),
            Err(QuizgenError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn generated_question_uses_camel_case() {
        let question = GeneratedQuestion {
            segment_id: "t1".into(),
            question_type: QuestionType::Sol,
            question_text: "What is chlorophyll?".into(),
            options: vec![],
            solution: Value::Null,
            is_parameterized: false,
            time_limit_seconds: 60,
            points: 5,
        };
        let json = serde_json::to_value(&question).unwrap();
        assert_eq!(json["segmentId"], "t1");
        assert_eq!(json["questionType"], "SOL");
        assert_eq!(json["timeLimitSeconds"], 60);
    }
}
