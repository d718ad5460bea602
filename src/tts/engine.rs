//! Speech synthesis engines
//!
//! Engines are blocking and return encoded (MP3) audio. They run on the
//! worker pool, never on the dispatch task.

use bytes::Bytes;
use std::cell::OnceCell;
use std::time::Duration;

use crate::error::SynthesisError;
use crate::tts::voices::language_of;

pub trait SpeechEngine: Send + Sync {
    fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, SynthesisError>;
}

/// Longest text the translate endpoint accepts per request
const MAX_CHUNK_CHARS: usize = 100;

thread_local! {
    // Blocking clients own a runtime; keeping one per worker thread keeps
    // them away from the async dispatch task entirely.
    static HTTP: OnceCell<reqwest::blocking::Client> = const { OnceCell::new() };
}

/// Google Translate speech endpoint (the protocol gTTS speaks)
#[derive(Debug, Clone)]
pub struct GoogleTts {
    endpoint: String,
    timeout: Duration,
}

impl GoogleTts {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn fetch(&self, chunk: &str, lang: &str) -> Result<Bytes, SynthesisError> {
        HTTP.with(|cell| {
            let client = match cell.get() {
                Some(client) => client,
                None => {
                    let client = reqwest::blocking::Client::builder()
                        .user_agent(concat!("voicebot/", env!("CARGO_PKG_VERSION")))
                        .build()
                        .map_err(|e| SynthesisError::Engine(e.to_string()))?;
                    cell.get_or_init(|| client)
                }
            };

            let response = client
                .get(&self.endpoint)
                .query(&[("ie", "UTF-8"), ("client", "tw-ob"), ("tl", lang), ("q", chunk)])
                .timeout(self.timeout)
                .send()
                .map_err(|e| SynthesisError::Engine(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SynthesisError::Engine(format!("HTTP {}", status)));
            }
            response
                .bytes()
                .map_err(|e| SynthesisError::Engine(e.to_string()))
        })
    }
}

impl SpeechEngine for GoogleTts {
    fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, SynthesisError> {
        let lang = language_of(voice);
        let mut audio = Vec::new();
        for chunk in split_text(text, MAX_CHUNK_CHARS) {
            audio.extend_from_slice(&self.fetch(&chunk, &lang)?);
        }
        tracing::debug!(lang = %lang, bytes = audio.len(), "Speech fetched");
        Ok(Bytes::from(audio))
    }
}

/// Split on whitespace into chunks of at most `max_chars` characters.
/// Words longer than the limit are cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
