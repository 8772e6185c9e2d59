//! Topic classifier backed by the Gemini `generateContent` endpoint

use std::time::Duration;

use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::annotate::Classifier;
use crate::annotate::error::{AnnotateError, ClassifyError};

/// Default timeout for classification requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Topic categories a paper may be assigned
pub const CATEGORIES: [&str; 5] = [
    "Deep Learning",
    "Natural Language Processing",
    "Computer Vision",
    "Reinforcement Learning",
    "Optimization & Theory",
];

/// Category of answers outside `CATEGORIES`
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .find(|text| !text.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

/// Prompt asking for exactly one category name
pub fn prompt(title: &str, abstract_text: &str) -> String {
    format!(
        "Given the following research paper details:\n\
         Title: {}\n\
         Abstract: {}\n\n\
         Classify this paper into one of these categories: {}.\n\
         Just return the category name.",
        title,
        abstract_text,
        CATEGORIES.join(", ")
    )
}

/// Map a model answer onto the category list
pub fn normalize_category(answer: &str) -> String {
    let answer = answer.trim();
    CATEGORIES
        .iter()
        .find(|category| **category == answer)
        .map_or_else(|| UNCATEGORIZED.to_string(), |category| category.to_string())
}

/// Classifier calling the Gemini Developer API with an API key
#[derive(Clone)]
pub struct GeminiClassifier {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for GeminiClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClassifier")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
impl GeminiClassifier {
    /// Set the base URL (for testing only)
    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

impl GeminiClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AnnotateError> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate(&self, prompt: String) -> Result<String, ClassifyError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifyError::from_message(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::from_message(e.to_string()))?;

        if !status.is_success() {
            let (message, api_status) = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(parsed) => (parsed.error.message, parsed.error.status),
                Err(_) => (body, String::new()),
            };
            let message = format!("{}: {}", status, message);
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || api_status == "RESOURCE_EXHAUSTED" {
                    ClassifyError::Quota(message)
                } else {
                    ClassifyError::from_message(message)
                },
            );
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifyError::Other(format!("Failed to parse response: {}", e)))?;
        parsed
            .text()
            .map(str::to_string)
            .ok_or_else(|| ClassifyError::Other("Response contains no text".to_string()))
    }
}

impl Classifier for GeminiClassifier {
    #[instrument(skip(self, abstract_text), fields(model = %self.model), level = "debug")]
    async fn classify(&self, title: &str, abstract_text: &str) -> Result<String, ClassifyError> {
        let answer = self.generate(prompt(title, abstract_text)).await?;
        let category = normalize_category(&answer);
        debug!("Model answered '{}', category {}", answer.trim(), category);
        Ok(category)
    }
}
