//! Transcripts and their speaker segments.
//!
//! A transcript stores the full transcription result verbatim as JSON
//! (`content`) alongside the flattened text (`raw_content`). Segments are
//! persisted separately, one row per contiguous speaker run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single recognized word with timing (seconds from recording start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub word: String,

    pub start_time: f64,

    pub end_time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_tag: Option<i32>,
}

/// A contiguous run of words from one speaker, as stored in transcript content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSegment {
    pub speaker_tag: i32,

    pub text: String,

    pub start_time: f64,

    pub end_time: f64,

    pub words: Vec<Word>,
}

/// Full transcription result, stored verbatim as the transcript `content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptContent {
    pub segments: Vec<ContentSegment>,

    pub full_text: String,

    /// End time of the last segment (seconds)
    pub duration: f64,

    pub word_count: usize,

    pub speaker_count: usize,

    pub language: String,

    /// Mean word confidence across all segments
    pub confidence: f64,
}

/// Parse stored transcript content; `None` if the JSON is not valid content
pub fn parse_transcript_content(content: &str) -> Option<TranscriptContent> {
    match serde_json::from_str(content) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, "Failed to parse transcript content");
            None
        }
    }
}

/// Serialize transcript content for storage
pub fn serialize_transcript_content(content: &TranscriptContent) -> String {
    // Plain data with string keys; serialization cannot fail
    serde_json::to_string(content).unwrap_or_default()
}

/// Persisted transcript (at most one per conversation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub id: String,

    pub conversation_id: String,

    /// Verbatim JSON of [`TranscriptContent`]
    pub content: String,

    /// Space-joined text of all segments
    pub raw_content: String,

    pub processing_time_ms: u64,

    pub word_count: usize,

    pub created_at: DateTime<Utc>,
}

/// Persisted speaker segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,

    pub transcript_id: String,

    /// "Speaker {tag}"
    pub speaker_label: String,

    pub text: String,

    pub start_time: f64,

    pub end_time: f64,

    pub confidence: f64,

    pub words: Vec<Word>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_content() -> TranscriptContent {
        TranscriptContent {
            segments: vec![
                ContentSegment {
                    speaker_tag: 1,
                    text: "Hello world".to_string(),
                    start_time: 0.0,
                    end_time: 1.5,
                    words: vec![
                        Word {
                            word: "Hello".to_string(),
                            start_time: 0.0,
                            end_time: 0.5,
                            confidence: Some(0.95),
                            speaker_tag: Some(1),
                        },
                        Word {
                            word: "world".to_string(),
                            start_time: 0.5,
                            end_time: 1.5,
                            confidence: None,
                            speaker_tag: Some(1),
                        },
                    ],
                },
                ContentSegment {
                    speaker_tag: 2,
                    text: "Hi".to_string(),
                    start_time: 2.0,
                    end_time: 2.25,
                    words: vec![Word {
                        word: "Hi".to_string(),
                        start_time: 2.0,
                        end_time: 2.25,
                        confidence: Some(0.5),
                        speaker_tag: Some(2),
                    }],
                },
            ],
            full_text: "Hello world Hi".to_string(),
            duration: 2.25,
            word_count: 3,
            speaker_count: 2,
            language: "en-US".to_string(),
            confidence: 0.725,
        }
    }

    #[test]
    fn test_content_round_trip_is_identity() {
        let serialized = serialize_transcript_content(&sample_content());
        let parsed = parse_transcript_content(&serialized).unwrap();

        assert_eq!(parsed, sample_content());
        assert_eq!(serialize_transcript_content(&parsed), serialized);
    }

    #[test]
    fn test_content_uses_camel_case_keys() {
        let serialized = serialize_transcript_content(&sample_content());
        assert!(serialized.contains("\"fullText\":\"Hello world Hi\""));
        assert!(serialized.contains("\"speakerTag\":1"));
        // Absent confidences are omitted rather than written as null
        assert!(!serialized.contains("null"));
    }

    #[test]
    fn test_parse_invalid_content() {
        assert!(parse_transcript_content("not json").is_none());
        assert!(parse_transcript_content("{\"segments\": 3}").is_none());
    }
}
