//! Stage 2: quiz questions for every `(segment, question type)` pair.
//!
//! Each pair is one request. A pair that fails, whether in transport or in
//! parsing, is recorded in [`GenerationOutcome::failures`] and contributes no
//! questions; it never aborts the rest of the batch.

use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt, stream};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::PipelineConfig,
    error::{QuizgenError, Result},
    normalize::normalize_raw_question,
    question_types::{profile, schema_for},
    repair::{collapse_whitespace, drop_trailing_commas, extract_json, isolate_value, join_adjacent_values},
    transport::{CompletionRequest, LlmTransport},
    types::{
        FailureStage, GeneratedQuestion, GenerationOutcome, PairFailure, QuestionSpec,
        QuestionType, RawQuestion, SegmentTextMap,
    },
};

/// What a request's questions are drawn from.
#[derive(Clone, Copy)]
enum Source<'a> {
    Transcript(&'a str),
    Topic(&'a str),
}

struct Pair<'a> {
    segment_id: &'a str,
    source: Source<'a>,
    question_type: QuestionType,
    count: u32,
}

impl Pair<'_> {
    fn failure(&self, stage: FailureStage, error: &QuizgenError) -> PairFailure {
        PairFailure {
            segment_id: self.segment_id.to_string(),
            question_type: self.question_type,
            stage,
            reason: error.to_string(),
        }
    }
}

type PairResult = std::result::Result<(Vec<GeneratedQuestion>, Vec<RawQuestion>), PairFailure>;

fn question_prompt(question_type: QuestionType, count: u32, source: Source<'_>) -> String {
    let profile = profile(question_type);
    let tag = question_type.tag();
    let time_limit = profile.time_limit_seconds;
    let points = profile.points;
    let description = profile.description;
    let clause = profile.prompt_clause;
    let solution = profile.solution_example;

    let example = format!(
        r#"{{
  "questionText": "...",
  "options": [
    {{"text": "...", "correct": true, "explanation": "..."}},
    {{"text": "...", "correct": false, "explanation": "..."}}
  ],
  "solution": {solution},
  "isParameterized": false,
  "timeLimitSeconds": {time_limit},
  "points": {points}
}}"#
    );
    // Mirrors schema_for: one object for a single question, an array otherwise.
    let shape = if count == 1 {
        format!("You must output a single JSON object exactly in this shape, no nesting, no markdown:\n{example}")
    } else {
        format!(
            "You must output a JSON array of exactly {count} objects, each exactly in this shape, no nesting, no markdown:\n[\n{example}\n]"
        )
    };
    let (lead, material) = match source {
        Source::Transcript(text) => ("Based on the transcript below", format!("Transcript:\n{text}")),
        Source::Topic(topic) => ("As a classroom poll on the topic below", format!("Topic:\n{topic}")),
    };

    format!(
        r#"You are an AI question generator.
{lead}, generate exactly {count} question(s) of type {tag} ({description}).
For each question:
- Provide at least 4 options.
- Mark the correct option(s) with "correct": true.
- Give every option an explanation of why it is correct or incorrect.

{shape}
Do not wrap questionText inside another "question" object. Output must be raw JSON.

Important:
- Output only JSON, no markdown, no extra text.
- Fill all fields.
- questionText must be clear and relevant to the material.

{material}

{clause} timeLimitSeconds: {time_limit}, points: {points}"#
    )
}

/// Turn a generation reply into its list of raw items.
///
/// Accepts an array, a single item object, or `{"questions": [...]}`. When
/// the extracted text does not parse, the first balanced value is repaired
/// and parsed once more.
fn parse_question_items(text: &str) -> Result<Vec<Value>> {
    let extracted = extract_json(text);
    let value: Value = serde_json::from_str(&extracted).or_else(|first| {
        let repaired = collapse_whitespace(&join_adjacent_values(&drop_trailing_commas(
            &isolate_value(&extracted),
        )));
        serde_json::from_str(&repaired).map_err(|_| first)
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("questions") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![Value::Object(object)],
        },
        other => {
            return Err(QuizgenError::malformed(format!(
                "expected a question object or array, got {other}"
            )));
        }
    };

    if items.is_empty() {
        return Err(QuizgenError::malformed("reply contained no questions"));
    }
    if !items.iter().any(|item| item.is_object() || item.is_string()) {
        return Err(QuizgenError::malformed("reply items are not questions"));
    }
    Ok(items)
}

pub struct GenerationEngine {
    transport: Arc<dyn LlmTransport>,
    config: PipelineConfig,
}

impl GenerationEngine {
    pub fn new(transport: Arc<dyn LlmTransport>, config: PipelineConfig) -> Self {
        Self { transport, config }
    }

    /// Generate questions for every segment and every requested type.
    ///
    /// Only precondition violations are returned as errors: an empty segment
    /// map or a spec without a positive count. Per-pair failures land in the
    /// outcome. Results keep segment-major, type-minor order even when
    /// requests run concurrently.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), model = %model))]
    pub async fn generate_questions(
        &self,
        segments: &SegmentTextMap,
        spec: &QuestionSpec,
        model: &str,
    ) -> Result<GenerationOutcome> {
        if segments.is_empty() {
            return Err(QuizgenError::invalid_argument(
                "segments are required and must be non-empty",
            ));
        }
        spec.validate()?;

        let mut pairs = Vec::new();
        for (segment_id, text) in segments.iter() {
            if text.trim().is_empty() {
                warn!(segment_id, "skipping segment without text");
                continue;
            }
            pairs.extend(spec.active().map(|(question_type, count)| Pair {
                segment_id,
                source: Source::Transcript(text),
                question_type,
                count,
            }));
        }

        info!(
            segments = segments.len(),
            pairs = pairs.len(),
            concurrency = self.config.max_concurrent_requests,
            "generating questions"
        );

        let temperature = self.config.generation_temperature;
        let results: Vec<PairResult> = stream::iter(
            pairs.iter().map(|pair| self.run_pair(pair, model, temperature)),
        )
        .buffered(self.config.max_concurrent_requests.max(1))
        .collect()
        .await;

        let outcome = collect_outcome(results);
        info!(
            questions = outcome.questions.len(),
            failed_pairs = outcome.failures.len(),
            "question generation finished"
        );
        Ok(outcome)
    }

    /// Generate `count` single-correct poll questions about `topic`.
    ///
    /// The request is handled like one generation pair keyed by the trimmed
    /// topic: a failure is recorded in the outcome instead of being returned.
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4(), model = %model, count = count))]
    pub async fn generate_poll_questions(
        &self,
        topic: &str,
        count: u32,
        model: &str,
    ) -> Result<GenerationOutcome> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(QuizgenError::invalid_argument("topic is required"));
        }
        if count == 0 {
            return Err(QuizgenError::invalid_argument(
                "poll question count must be at least 1",
            ));
        }

        let pair = Pair {
            segment_id: topic,
            source: Source::Topic(topic),
            question_type: QuestionType::Sol,
            count,
        };
        let result = self
            .run_pair(&pair, model, self.config.poll_temperature)
            .await;
        Ok(collect_outcome([result]))
    }

    #[instrument(
        skip_all,
        fields(segment_id = %pair.segment_id, question_type = %pair.question_type, count = pair.count)
    )]
    async fn run_pair(&self, pair: &Pair<'_>, model: &str, temperature: f64) -> PairResult {
        let response_schema = schema_for(pair.question_type, pair.count);
        if response_schema.is_none() {
            warn!("no response schema registered, requesting unconstrained output");
        }

        let request = CompletionRequest {
            model: model.to_string(),
            prompt: question_prompt(pair.question_type, pair.count, pair.source),
            temperature,
            top_p: None,
            response_schema,
            timeout: Duration::from_millis(self.config.request_timeout_ms),
        };

        let completion = match self.transport.complete(request).await {
            Ok(completion) => completion,
            Err(e) => {
                match &e {
                    QuizgenError::UpstreamTimeout { timeout_ms, .. } => {
                        warn!(timeout_ms, "question request timed out, skipping pair")
                    }
                    QuizgenError::UpstreamUnavailable { url, .. } => {
                        warn!(%url, "generation endpoint unreachable, skipping pair")
                    }
                    other => warn!(error = %other, "question request failed, skipping pair"),
                }
                return Err(pair.failure(FailureStage::Transport, &e));
            }
        };

        let items = parse_question_items(&completion.text).map_err(|e| {
            warn!(error = %e, "could not parse question reply, skipping pair");
            pair.failure(FailureStage::Parse, &e)
        })?;

        if items.len() != pair.count as usize {
            debug!(requested = pair.count, received = items.len(), "question count differs");
        }

        let questions = items
            .iter()
            .map(|item| normalize_raw_question(item, pair.segment_id, pair.question_type))
            .collect();
        let raw = items
            .into_iter()
            .map(|item| RawQuestion {
                segment_id: pair.segment_id.to_string(),
                question_type: pair.question_type,
                item,
            })
            .collect();

        Ok((questions, raw))
    }
}

fn collect_outcome(results: impl IntoIterator<Item = PairResult>) -> GenerationOutcome {
    let mut outcome = GenerationOutcome::default();
    for result in results {
        match result {
            Ok((questions, raw)) => {
                outcome.questions.extend(questions);
                outcome.raw.extend(raw);
            }
            Err(failure) => outcome.failures.push(failure),
        }
    }
    outcome
}
