use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::quiz::Question;

/// Number of wrong answers a multiple-choice item must carry to be usable.
pub const INCORRECT_ANSWERS_PER_QUESTION: usize = 3;

/// OpenTDB `response_code` for "too many requests"; worth retrying later.
const RATE_LIMITED: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("could not reach the trivia provider: {0}")]
    Network(String),

    #[error("unexpected response from the trivia provider: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Network failures are worth offering a retry for, bad payloads are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Fetches exactly `amount` questions or fails. Never retries on its own.
    async fn fetch_questions(&self, amount: usize) -> Result<Vec<Question>, ProviderError>;
}

#[derive(Debug, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub response_code: Option<u32>,
    pub results: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct RawQuestion {
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl RawQuestion {
    fn has_answer_count(&self) -> bool {
        self.incorrect_answers.len() == INCORRECT_ANSWERS_PER_QUESTION
    }

    fn into_question(self) -> Question {
        Question {
            prompt: decode(&self.question),
            correct_answer: decode(&self.correct_answer),
            incorrect_answers: self.incorrect_answers.iter().map(|a| decode(a)).collect(),
            category: self.category.as_deref().map(decode),
            difficulty: self.difficulty.as_deref().map(decode),
        }
    }
}

fn decode(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Validates a provider payload and turns its first `amount` usable items into questions.
pub fn normalize(raw: RawResponse, amount: usize) -> Result<Vec<Question>, ProviderError> {
    match raw.response_code {
        None | Some(0) => {}
        Some(RATE_LIMITED) => {
            return Err(ProviderError::Network(
                "provider is rate limiting requests".to_string(),
            ))
        }
        Some(code) => {
            return Err(ProviderError::Malformed(format!(
                "provider answered with response code {}",
                code
            )))
        }
    }

    // Decoding first: entities can make two different raw answers equal.
    let questions: Vec<Question> = raw
        .results
        .into_iter()
        .filter(RawQuestion::has_answer_count)
        .map(RawQuestion::into_question)
        .filter(|question| {
            let usable = question.is_well_formed();
            if !usable {
                debug!("Skipping question with ambiguous answers: {}", question.prompt);
            }
            usable
        })
        .take(amount)
        .collect();

    if questions.len() < amount {
        return Err(ProviderError::Malformed(format!(
            "expected {} usable questions, got {}",
            amount,
            questions.len()
        )));
    }
    Ok(questions)
}

/// Client for the Open Trivia Database `api.php` endpoint.
pub struct OpenTriviaProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenTriviaProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl QuestionProvider for OpenTriviaProvider {
    async fn fetch_questions(&self, amount: usize) -> Result<Vec<Question>, ProviderError> {
        info!("Fetching {} questions from {}", amount, self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("amount", amount.to_string().as_str()), ("type", "multiple")])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| {
                warn!("Trivia request failed: {}", err);
                ProviderError::from(err)
            })?;

        let raw: RawResponse = response.json().await.map_err(|err| {
            warn!("Trivia response could not be decoded: {}", err);
            ProviderError::Malformed(err.to_string())
        })?;
        debug!("Provider returned {} raw items", raw.results.len());

        normalize(raw, amount)
    }
}
