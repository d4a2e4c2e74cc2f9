// src/services/question_generator.rs

//! Topic-based question drafting through a generative model endpoint.
//!
//! The model is asked for a JSON array of four-option questions whose correct
//! answer is a letter. Drafts come back as [`CreateQuestionRequest`]s so they go
//! through the same validation and sanitization as hand-written questions.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    config::Config,
    error::AppError,
    models::question::{CreateQuestionRequest, Difficulty},
};

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct QuestionGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl QuestionGenerator {
    /// Builds a generator when an endpoint is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let endpoint = config.ai_api_url.clone()?;
        let client = match Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to build HTTP client, question generation disabled: {}", e);
                return None;
            }
        };

        Some(Self {
            client,
            endpoint,
            api_key: config.ai_api_key.clone(),
        })
    }

    /// Asks the model for `count` questions about `topic`.
    pub async fn generate(&self, topic: &str, count: u32) -> Result<Vec<GeneratedQuestion>, AppError> {
        let payload = json!({
            "contents": [{
                "parts": [{ "text": prompt(topic, count) }]
            }],
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 1024,
            }
        });

        tracing::info!(count, "Requesting generated questions");

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| upstream(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(upstream(format!("model service answered {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| upstream(format!("unreadable response: {}", e)))?;
        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| upstream("response has no candidate text".to_string()))?;

        parse_questions(text).map_err(|e| upstream(format!("candidate is not a question list: {}", e)))
    }
}

fn upstream(reason: String) -> AppError {
    tracing::warn!("Question generation failed: {}", reason);
    AppError::ServiceUnavailable("Failed to generate questions. Please try again.".to_string())
}

fn prompt(topic: &str, count: u32) -> String {
    format!(
        r#"Generate {count} multiple choice questions about {topic}. Format as JSON array with structure:
[
  {{
    "text": "question text",
    "options": ["option1", "option2", "option3", "option4"],
    "correct_answer": "A",
    "difficulty": "medium"
  }}
]"#
    )
}

/// Correct answer as the model writes it: a letter, or occasionally an index.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerKey {
    Index(usize),
    Letter(String),
}

impl AnswerKey {
    /// Index into `options`, or `None` when the key points nowhere.
    pub fn resolve(&self, options: &[String]) -> Option<usize> {
        let index = match self {
            AnswerKey::Index(i) => *i,
            AnswerKey::Letter(s) => {
                let s = s.trim();
                match s.chars().collect::<Vec<_>>().as_slice() {
                    [c] if c.is_ascii_alphabetic() => (c.to_ascii_uppercase() as u8 - b'A') as usize,
                    _ => s
                        .parse()
                        .ok()
                        .or_else(|| options.iter().position(|o| o.trim() == s))?,
                }
            }
        };
        (index < options.len()).then_some(index)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: AnswerKey,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl GeneratedQuestion {
    /// Converts the draft into an authoring request, or `None` when its answer
    /// key does not match an option.
    pub fn into_request(self) -> Option<CreateQuestionRequest> {
        let correct_answer = self.correct_answer.resolve(&self.options)?;
        let difficulty = self
            .difficulty
            .as_deref()
            .and_then(|d| Difficulty::parse(&d.trim().to_lowercase()))
            .unwrap_or_default();

        Some(CreateQuestionRequest {
            text: self.text,
            options: self.options,
            correct_answer,
            difficulty,
        })
    }
}

/// Parses the model's text, which may be wrapped in a Markdown code fence.
pub fn parse_questions(text: &str) -> Result<Vec<GeneratedQuestion>, serde_json::Error> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        ["TCP", "UDP", "IP", "ARP"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_letter_keys_map_to_indexes() {
        assert_eq!(AnswerKey::Letter("A".into()).resolve(&options()), Some(0));
        assert_eq!(AnswerKey::Letter(" c ".into()).resolve(&options()), Some(2));
        assert_eq!(AnswerKey::Letter("E".into()).resolve(&options()), None);
        assert_eq!(AnswerKey::Index(3).resolve(&options()), Some(3));
        assert_eq!(AnswerKey::Index(4).resolve(&options()), None);
    }

    #[test]
    fn test_option_text_is_accepted_as_key() {
        assert_eq!(AnswerKey::Letter("UDP".into()).resolve(&options()), Some(1));
        assert_eq!(AnswerKey::Letter("SCTP".into()).resolve(&options()), None);
    }

    #[test]
    fn test_fenced_candidate_is_parsed() {
        let text = r#"```json
[
  {"text": "Which protocol is connectionless?", "options": ["TCP", "UDP", "IP", "ARP"], "correct_answer": "B", "difficulty": "Easy"},
  {"text": "Which layer does IP belong to?", "options": ["Link", "Network", "Transport", "Session"], "correct_answer": 1}
]
```"#;
        let drafts = parse_questions(text).unwrap();
        assert_eq!(drafts.len(), 2);

        let first = drafts[0].clone().into_request().unwrap();
        assert_eq!(first.correct_answer, 1);
        assert_eq!(first.difficulty, Difficulty::Easy);

        let second = drafts[1].clone().into_request().unwrap();
        assert_eq!(second.correct_answer, 1);
        assert_eq!(second.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_non_array_candidate_is_an_error() {
        assert!(parse_questions("Sorry, I cannot help with that.").is_err());
    }
}
