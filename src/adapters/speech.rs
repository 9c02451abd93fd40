//! Google Cloud Speech-to-Text adapter.
//!
//! Uses the REST `speech:longrunningrecognize` method with speaker
//! diarization and polls the returned operation until it is done.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::{AdapterError, SpeechTranscriber};
use crate::config::SpeechConfig;
use crate::domain::Word;
use crate::transcription::{time_to_seconds, TranscribeOptions};

const SAMPLE_RATE_HERTZ: u32 = 48_000;
const MAX_SPEAKER_COUNT: u32 = 10;

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<RecognizeResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Option<Vec<RecognitionResult>>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    words: Vec<WordInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WordInfo {
    #[serde(default)]
    word: String,
    #[serde(default)]
    start_time: Value,
    #[serde(default)]
    end_time: Value,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    speaker_tag: Option<i32>,
}

/// Speech-to-Text REST client authenticated with an API key
pub struct GoogleSpeechClient {
    config: SpeechConfig,
    http: Client,
}

impl GoogleSpeechClient {
    pub fn new(config: SpeechConfig) -> Result<Self, AdapterError> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn recognize_body(url: &str, options: &TranscribeOptions) -> Value {
        json!({
            "config": {
                "encoding": "OGG_OPUS",
                "sampleRateHertz": SAMPLE_RATE_HERTZ,
                "languageCode": options.language_code,
                "model": options.model,
                "useEnhanced": true,
                "enableAutomaticPunctuation": options.enable_punctuation,
                "enableWordTimeOffsets": options.enable_word_time_offsets,
                "diarizationConfig": {
                    "enableSpeakerDiarization": true,
                    "minSpeakerCount": options.speaker_count,
                    "maxSpeakerCount": MAX_SPEAKER_COUNT.max(options.speaker_count),
                },
            },
            "audio": { "uri": url },
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AdapterError> {
        let response = request
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                service: "speech",
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Poll an operation until it is done or the configured timeout passes
    async fn wait_for(&self, mut operation: Operation) -> Result<RecognizeResponse, AdapterError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = Instant::now() + timeout;

        while !operation.done {
            if Instant::now() >= deadline {
                return Err(AdapterError::Timeout(timeout));
            }
            sleep(poll).await;

            debug!(operation = %operation.name, "Polling recognition operation");
            let url = self.url(&format!("operations/{}", operation.name));
            operation = self.send(self.http.get(&url)).await?;
        }

        if let Some(error) = operation.error {
            return Err(AdapterError::InvalidResponse(format!(
                "Recognition failed ({}): {}",
                error.code, error.message
            )));
        }
        Ok(operation.response.unwrap_or_default())
    }
}

/// Flatten the first alternative of every result into timed words
fn collect_words(response: RecognizeResponse) -> Result<Vec<Word>, AdapterError> {
    let results = response
        .results
        .ok_or_else(|| AdapterError::InvalidResponse("No transcription results".to_string()))?;

    Ok(results
        .into_iter()
        .filter_map(|result| result.alternatives.into_iter().next())
        .flat_map(|alternative| alternative.words)
        .map(|info| Word {
            word: info.word,
            start_time: time_to_seconds(&info.start_time),
            end_time: time_to_seconds(&info.end_time),
            confidence: info.confidence,
            speaker_tag: info.speaker_tag,
        })
        .collect())
}

#[async_trait]
impl SpeechTranscriber for GoogleSpeechClient {
    async fn transcribe(&self, url: &str, options: &TranscribeOptions) -> Result<Vec<Word>> {
        let body = Self::recognize_body(url, options);
        let operation: Operation = self
            .send(self.http.post(self.url("speech:longrunningrecognize")).json(&body))
            .await
            .context("Failed to start recognition")?;
        info!(operation = %operation.name, "Recognition started");

        let response = self
            .wait_for(operation)
            .await
            .context("Failed to transcribe audio")?;
        let words = collect_words(response).context("Failed to transcribe audio")?;
        info!(words = words.len(), "Recognition finished");
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_body() {
        let options = TranscribeOptions {
            speaker_count: 3,
            ..Default::default()
        };
        let body = GoogleSpeechClient::recognize_body("https://signed/a.ogg", &options);

        assert_eq!(body["audio"]["uri"], "https://signed/a.ogg");
        assert_eq!(body["config"]["languageCode"], "en-US");
        assert_eq!(body["config"]["model"], "latest_long");
        assert_eq!(body["config"]["sampleRateHertz"], 48000);
        assert_eq!(body["config"]["diarizationConfig"]["minSpeakerCount"], 3);
        assert_eq!(body["config"]["diarizationConfig"]["maxSpeakerCount"], 10);
    }

    #[test]
    fn test_collect_words_from_operation() {
        let operation: Operation = serde_json::from_value(json!({
            "name": "op-1",
            "done": true,
            "response": {
                "results": [
                    { "alternatives": [{ "words": [
                        { "word": "Hello", "startTime": "0s", "endTime": "0.400s", "speakerTag": 1 },
                        { "word": "there", "startTime": { "seconds": "0", "nanos": 500000000 },
                          "endTime": "0.900s", "confidence": 0.9, "speakerTag": 2 }
                    ]}]},
                    { "alternatives": [] }
                ]
            }
        }))
        .unwrap();

        let words = collect_words(operation.response.unwrap()).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].end_time, 0.4);
        assert_eq!(words[1].start_time, 0.5);
        assert_eq!(words[1].speaker_tag, Some(2));
        assert_eq!(words[1].confidence, Some(0.9));
    }

    #[test]
    fn test_missing_results_is_an_error() {
        let err = collect_words(RecognizeResponse::default()).unwrap_err();
        assert!(err.to_string().contains("No transcription results"));
    }

    #[test]
    fn test_url() {
        let client = GoogleSpeechClient::new(SpeechConfig::default()).unwrap();
        assert_eq!(
            client.url("speech:longrunningrecognize"),
            "https://speech.googleapis.com/v1/speech:longrunningrecognize"
        );
    }
}
