//! Turning recognized words into a speaker-attributed transcript.
//!
//! A segment is a contiguous run of words sharing one speaker tag; a new
//! segment starts whenever the tag changes between consecutive words,
//! regardless of any time gap.

use std::collections::HashSet;

use serde_json::Value;

use crate::config::SpeechConfig;
use crate::domain::{ContentSegment, TranscriptContent, Word};

/// Options passed to the speech recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeOptions {
    pub language_code: String,
    pub model: String,
    pub speaker_count: u32,
    pub enable_punctuation: bool,
    pub enable_word_time_offsets: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            model: "latest_long".to_string(),
            speaker_count: 2,
            enable_punctuation: true,
            enable_word_time_offsets: true,
        }
    }
}

impl TranscribeOptions {
    /// Recognizer defaults from the speech configuration
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            language_code: config.language_code.clone(),
            model: config.model.clone(),
            speaker_count: config.speaker_count,
            ..Default::default()
        }
    }
}

/// Convert a recognizer time value to fractional seconds.
///
/// Accepts `{seconds, nanos}` objects (either field a number or numeric
/// string), duration strings like `"1.500s"`, and plain numbers. Anything
/// else is 0.
pub fn time_to_seconds(value: &Value) -> f64 {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds").map(integer_field).unwrap_or(0);
            let nanos = map.get("nanos").map(integer_field).unwrap_or(0);
            seconds as f64 + nanos as f64 / 1e9
        }
        Value::String(s) => s.trim_end_matches('s').parse().unwrap_or(0.0),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn integer_field(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Group words into speaker segments. Untagged words count as speaker 0.
pub fn build_segments(words: Vec<Word>) -> Vec<ContentSegment> {
    let mut segments: Vec<ContentSegment> = Vec::new();

    for word in words {
        let tag = word.speaker_tag.unwrap_or(0);
        match segments.last_mut() {
            Some(current) if current.speaker_tag == tag => {
                current.text.push(' ');
                current.text.push_str(&word.word);
                current.end_time = word.end_time;
                current.words.push(word);
            }
            _ => segments.push(ContentSegment {
                speaker_tag: tag,
                text: word.word.clone(),
                start_time: word.start_time,
                end_time: word.end_time,
                words: vec![word],
            }),
        }
    }

    segments
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean of the word confidences present in a segment (0 if none)
pub fn segment_confidence(segment: &ContentSegment) -> f64 {
    mean(segment.words.iter().filter_map(|w| w.confidence))
}

/// Mean of all word confidences across segments (0 if none)
pub fn average_confidence(segments: &[ContentSegment]) -> f64 {
    mean(
        segments
            .iter()
            .flat_map(|s| s.words.iter())
            .filter_map(|w| w.confidence),
    )
}

pub fn speaker_label(tag: i32) -> String {
    format!("Speaker {}", tag)
}

/// Build the full transcript content with derived statistics
pub fn summarize(segments: Vec<ContentSegment>, language: &str) -> TranscriptContent {
    let full_text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let word_count = full_text.split_whitespace().count();
    let duration = segments.last().map(|s| s.end_time).unwrap_or(0.0);
    let speaker_count = segments
        .iter()
        .map(|s| s.speaker_tag)
        .collect::<HashSet<_>>()
        .len();
    let confidence = average_confidence(&segments);

    TranscriptContent {
        segments,
        full_text,
        duration,
        word_count,
        speaker_count,
        language: language.to_string(),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn word(text: &str, tag: i32, start: f64, confidence: Option<f64>) -> Word {
        Word {
            word: text.to_string(),
            start_time: start,
            end_time: start + 0.4,
            confidence,
            speaker_tag: Some(tag),
        }
    }

    #[test]
    fn test_time_conversion() {
        assert_eq!(time_to_seconds(&json!({ "seconds": "1", "nanos": 500000000 })), 1.5);
        assert_eq!(time_to_seconds(&json!({ "seconds": 2 })), 2.0);
        assert_eq!(time_to_seconds(&json!({ "nanos": 250000000 })), 0.25);
        assert_eq!(time_to_seconds(&json!("3.200s")), 3.2);
        assert_eq!(time_to_seconds(&Value::Null), 0.0);
    }

    #[test]
    fn test_segment_boundaries_follow_speaker_changes() {
        let words = vec![
            word("a", 1, 0.0, None),
            word("b", 1, 0.5, None),
            word("c", 2, 1.0, None),
            word("d", 2, 1.5, None),
            word("e", 1, 9.0, None),
        ];
        let segments = build_segments(words);

        let tags: Vec<_> = segments.iter().map(|s| s.speaker_tag).collect();
        assert_eq!(tags, vec![1, 2, 1]);
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a b", "c d", "e"]);
        assert_eq!(segments[0].start_time, 0.0);
        assert!((segments[0].end_time - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_confidences_and_statistics() {
        let words = vec![
            word("Hello", 1, 0.0, Some(0.95)),
            word("world", 1, 0.5, Some(0.92)),
            word("Hi", 2, 1.2, Some(0.93)),
        ];
        let content = summarize(build_segments(words), "en-US");

        assert_eq!(content.segments.len(), 2);
        assert!((segment_confidence(&content.segments[0]) - 0.935).abs() < 1e-9);
        assert!((content.confidence - 0.9333333333).abs() < 1e-6);
        assert_eq!(content.full_text, "Hello world Hi");
        assert_eq!(content.word_count, 3);
        assert_eq!(content.speaker_count, 2);
        assert!((content.duration - 1.6).abs() < 1e-9);
        assert_eq!(speaker_label(content.segments[1].speaker_tag), "Speaker 2");
    }

    #[test]
    fn test_missing_confidences_average_to_zero() {
        let segments = build_segments(vec![word("hm", 1, 0.0, None)]);
        assert_eq!(segment_confidence(&segments[0]), 0.0);
        assert_eq!(average_confidence(&segments), 0.0);

        let empty = summarize(Vec::new(), "en-US");
        assert_eq!(empty.word_count, 0);
        assert_eq!(empty.duration, 0.0);
        assert_eq!(empty.confidence, 0.0);
    }
}
