use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use altura_core::config::LlmConfig;

/// Failure classes of a completion call. Only `RateLimited` is retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// A file handed to the oracle next to the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn read(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "documento".to_string());
        let mime_type = mime_for(&file_name).to_string();
        Ok(Self { file_name, mime_type, bytes })
    }

    /// Content as UTF-8 when the file is plain text.
    pub fn as_text(&self) -> Option<&str> {
        if !self.mime_type.starts_with("text/") {
            return None;
        }
        std::str::from_utf8(&self.bytes).ok()
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;

    /// Completion over a prompt plus a file. Plain-text files are inlined into the prompt.
    async fn complete_with_attachment(
        &self,
        prompt: &str,
        attachment: &Attachment,
    ) -> Result<String, OracleError> {
        match attachment.as_text() {
            Some(text) => self.complete(&format!("{prompt}\n\nCONTENIDO DEL DOCUMENTO:\n{text}")).await,
            None => Err(OracleError::Unavailable(format!(
                "{} attachments are not supported by this client",
                attachment.mime_type
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). A server hint wins when present.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponential = self
            .base_delay
            .checked_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(self.max_delay);
        retry_after.unwrap_or(exponential).min(self.max_delay)
    }
}

/// Bounds every call with a timeout and backs off exponentially on rate limits.
pub struct RetryingLlmClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingLlmClient<C>
where
    C: LlmClient,
{
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<F, Fut>(&self, operation: &'static str, mut call: F) -> Result<String, OracleError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<String, OracleError>> + Send,
    {
        let mut attempt = 0_u32;
        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(OracleError::Timeout(self.policy.timeout)),
            };

            match outcome {
                Err(OracleError::RateLimited { retry_after }) if attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay_for(attempt, retry_after);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "oracle rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    warn!(operation, attempt, error = %error, "oracle call failed");
                    return Err(error);
                }
                Ok(reply) => return Ok(reply),
            }
        }
    }
}

#[async_trait]
impl<C> LlmClient for RetryingLlmClient<C>
where
    C: LlmClient,
{
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.run("complete", || self.inner.complete(prompt)).await
    }

    async fn complete_with_attachment(
        &self,
        prompt: &str,
        attachment: &Attachment,
    ) -> Result<String, OracleError> {
        self.run("complete_with_attachment", || self.inner.complete_with_attachment(prompt, attachment))
            .await
    }
}

/// Pulls the outermost JSON object out of a free-form completion, tolerating code fences
/// and surrounding prose.
pub fn json_object(reply: &str) -> Result<Map<String, Value>, OracleError> {
    let cleaned = reply.replace("```json", "").replace("```", "");
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(OracleError::InvalidResponse("no JSON object in reply".to_string()));
    };
    if end < start {
        return Err(OracleError::InvalidResponse("no JSON object in reply".to_string()));
    }

    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(OracleError::InvalidResponse("reply is not a JSON object".to_string())),
        Err(error) => Err(OracleError::InvalidResponse(error.to_string())),
    }
}

/// Non-empty string value for `key`; JSON nulls and "null" strings count as absent.
pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null")).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
