//! Stage 1: split a timed transcript into topical segments.
//!
//! The model is asked for a JSON array of `{end_time, transcript_lines}`.
//! Unusable replies are expected rather than exceptional, so a parse or shape
//! failure switches to [`fallback_segments`], a deterministic line-bucketing
//! split. Transport failures are not papered over and propagate.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::PipelineConfig,
    error::{QuizgenError, Result},
    format::{NO_TIMESTAMP, clean_transcript_lines, last_timestamp, placeholder_end_time},
    repair::repair_segment_payload,
    transport::{CompletionRequest, LlmTransport},
    types::{SegmentTextMap, TranscriptSegment},
};

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn segmentation_prompt(transcript: &str, desired_segments: usize) -> String {
    format!(
        r#"Analyze the following timed lecture transcript. Segment into meaningful subtopics (max {desired_segments} segments).
Format: each line as [start_time --> end_time] text OR start_time --> end_time text.
Response must be ONLY valid JSON array, no markdown, no explanation, no comments.
Use property name "transcript_lines" exactly.

Example:
[
  {{
    "end_time": "01:30.000",
    "transcript_lines": ["00:00.000 --> 00:30.000 Text", "00:30.000 --> 01:30.000 More text"]
  }}
]

Transcript:
{transcript}

JSON:"#
    )
}

pub struct SegmentationEngine {
    transport: Arc<dyn LlmTransport>,
    config: PipelineConfig,
}

impl SegmentationEngine {
    pub fn new(transport: Arc<dyn LlmTransport>, config: PipelineConfig) -> Self {
        Self { transport, config }
    }

    /// Segment `transcript` into at most `desired_segments` topical spans.
    ///
    /// Returns cleaned text keyed by segment end time. Fails with
    /// `InvalidArgument` before any request for a blank transcript or a zero
    /// segment count, with the transport error if the request fails, and with
    /// `MalformedResponse` if not even the fallback yields usable text.
    #[instrument(
        skip_all,
        fields(run_id = %Uuid::new_v4(), model = %model, desired_segments = desired_segments)
    )]
    pub async fn segment_transcript(
        &self,
        transcript: &str,
        model: &str,
        desired_segments: usize,
    ) -> Result<SegmentTextMap> {
        if transcript.trim().is_empty() {
            return Err(QuizgenError::invalid_argument(
                "transcript text is required and must be non-empty",
            ));
        }
        if desired_segments == 0 {
            return Err(QuizgenError::invalid_argument(
                "desired segment count must be at least 1",
            ));
        }

        info!(chars = transcript.len(), "segmenting transcript");

        let request = CompletionRequest {
            model: model.to_string(),
            prompt: segmentation_prompt(transcript, desired_segments),
            temperature: self.config.segmentation_temperature,
            top_p: Some(self.config.segmentation_top_p),
            response_schema: None,
            timeout: Duration::from_millis(self.config.request_timeout_ms),
        };

        let completion = self.transport.complete(request).await.inspect_err(|e| {
            match e {
                QuizgenError::UpstreamTimeout { timeout_ms, .. } => {
                    error!(timeout_ms, "segmentation request timed out")
                }
                QuizgenError::UpstreamUnavailable { url, .. } => {
                    error!(%url, "generation endpoint unreachable")
                }
                other => error!(error = %other, "segmentation request failed"),
            }
        })?;

        debug!(preview = preview(&completion.text), "segmentation reply");

        let parsed = parse_segments(&completion.text).and_then(|segments| {
            let map = build_segment_map(segments)?;
            info!(segments = map.len(), "model segmentation accepted");
            Ok(map)
        });

        match parsed {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(
                    error = %e,
                    preview = preview(&completion.text),
                    "unusable segmentation reply, using fallback split"
                );
                let segments = fallback_segments(
                    transcript,
                    desired_segments,
                    self.config.min_fallback_lines,
                );
                info!(segments = segments.len(), "fallback segments created");
                build_segment_map(segments.into_iter().map(Ok))
            }
        }
    }
}

/// Repair and validate a segmentation reply.
///
/// The outer shape must hold: a non-empty array whose elements each carry a
/// non-empty string `end_time` and an array `transcript_lines`. Individual
/// line values are checked later, per segment.
fn parse_segments(text: &str) -> Result<Vec<Result<TranscriptSegment>>> {
    let repaired = repair_segment_payload(text);
    let value: Value = serde_json::from_str(&repaired)?;

    let items = value
        .as_array()
        .ok_or_else(|| QuizgenError::malformed("segmentation reply is not an array"))?;
    if items.is_empty() {
        return Err(QuizgenError::malformed("segmentation reply is an empty array"));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let end_time = item
                .get("end_time")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    QuizgenError::malformed(format!("segment {index} has no end_time"))
                })?;
            let lines = item
                .get("transcript_lines")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    QuizgenError::malformed(format!("segment {index} has no transcript_lines array"))
                })?;
            Ok(segment_from_lines(end_time, lines))
        })
        .collect()
}

fn segment_from_lines(end_time: &str, lines: &[Value]) -> Result<TranscriptSegment> {
    let transcript_lines = lines
        .iter()
        .map(|line| match line {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(QuizgenError::malformed(format!(
                "transcript line is not text: {other}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TranscriptSegment {
        end_time: end_time.to_string(),
        transcript_lines,
    })
}

fn build_segment_map<I>(segments: I) -> Result<SegmentTextMap>
where
    I: IntoIterator<Item = Result<TranscriptSegment>>,
{
    let mut map = SegmentTextMap::new();
    for segment in segments {
        let segment = match segment {
            Ok(segment) => segment,
            Err(e) => {
                warn!(error = %e, "dropping segment that could not be cleaned");
                continue;
            }
        };
        let text = clean_transcript_lines(&segment.transcript_lines);
        if text.is_empty() {
            debug!(end_time = %segment.end_time, "dropping empty segment");
            continue;
        }
        map.insert(segment.end_time, text);
    }

    if map.is_empty() {
        return Err(QuizgenError::malformed("no segment has usable transcript text"));
    }
    Ok(map)
}

fn end_time_of(lines: &[&str], start: usize) -> String {
    lines
        .last()
        .and_then(|line| last_timestamp(line))
        .map(str::to_string)
        .unwrap_or_else(|| placeholder_end_time(start))
}

/// Deterministic split used when the model reply cannot be used.
///
/// Up to `min_lines` non-empty lines stay in one segment. Longer transcripts
/// are cut into consecutive chunks of `max(min_lines, ceil(n / desired))`
/// lines. Each end time is the last timestamp on the chunk's final line, or a
/// placeholder derived from the chunk's starting line index.
pub fn fallback_segments(
    transcript: &str,
    desired_segments: usize,
    min_lines: usize,
) -> Vec<TranscriptSegment> {
    let lines: Vec<&str> = transcript
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() <= min_lines {
        let end_time = lines
            .last()
            .and_then(|line| last_timestamp(line))
            .unwrap_or(NO_TIMESTAMP)
            .to_string();
        return vec![TranscriptSegment {
            end_time,
            transcript_lines: lines.iter().map(|l| l.to_string()).collect(),
        }];
    }

    let per_segment = min_lines.max(lines.len().div_ceil(desired_segments.max(1)));

    lines
        .chunks(per_segment)
        .enumerate()
        .map(|(chunk, chunk_lines)| TranscriptSegment {
            end_time: end_time_of(chunk_lines, chunk * per_segment),
            transcript_lines: chunk_lines.iter().map(|l| l.to_string()).collect(),
        })
        .collect()
}
