//! HTTP completion clients for the supported providers.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use altura_core::config::{LlmConfig, LlmProvider};

use crate::llm::{Attachment, LlmClient, OracleError};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ERROR_BODY_LIMIT: usize = 300;

pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, OracleError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| OracleError::Unavailable(error.to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Gemini => format!("{}/models/{}:generateContent", self.base_url, self.model),
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }

    fn request_body(&self, prompt: &str, attachment: Option<&Attachment>) -> Result<Value, OracleError> {
        request_body(
            self.provider,
            &self.model,
            self.temperature,
            self.max_tokens,
            prompt,
            attachment,
        )
    }

    async fn send(&self, prompt: &str, attachment: Option<&Attachment>) -> Result<String, OracleError> {
        let body = self.request_body(prompt, attachment)?;
        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = match self.provider {
                LlmProvider::Gemini => request.header("x-goog-api-key", key.expose_secret()),
                LlmProvider::OpenAi | LlmProvider::Ollama => request.bearer_auth(key.expose_secret()),
            };
        }

        debug!(provider = self.provider.as_str(), model = %self.model, "sending completion request");
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                OracleError::Timeout(self.timeout)
            } else {
                OracleError::Unavailable(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body, self.timeout));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| OracleError::InvalidResponse(error.to_string()))?;
        completion_text(self.provider, &payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.send(prompt, None).await
    }

    async fn complete_with_attachment(
        &self,
        prompt: &str,
        attachment: &Attachment,
    ) -> Result<String, OracleError> {
        if let Some(text) = attachment.as_text() {
            return self.send(&format!("{prompt}\n\nCONTENIDO DEL DOCUMENTO:\n{text}"), None).await;
        }
        self.send(prompt, Some(attachment)).await
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Gemini => GEMINI_BASE_URL,
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

fn request_body(
    provider: LlmProvider,
    model: &str,
    temperature: f32,
    max_tokens: u32,
    prompt: &str,
    attachment: Option<&Attachment>,
) -> Result<Value, OracleError> {
    let body = match provider {
        LlmProvider::Gemini => {
            let mut parts = vec![json!({ "text": prompt })];
            if let Some(file) = attachment {
                parts.push(json!({
                    "inline_data": { "mime_type": file.mime_type, "data": STANDARD.encode(&file.bytes) }
                }));
            }
            json!({
                "contents": [{ "role": "user", "parts": parts }],
                "generationConfig": { "temperature": temperature, "maxOutputTokens": max_tokens }
            })
        }
        LlmProvider::OpenAi => {
            let content = match attachment {
                None => json!(prompt),
                Some(file) => {
                    let data_url = format!("data:{};base64,{}", file.mime_type, STANDARD.encode(&file.bytes));
                    let part = if file.mime_type.starts_with("image/") {
                        json!({ "type": "image_url", "image_url": { "url": data_url } })
                    } else {
                        json!({ "type": "file", "file": { "filename": file.file_name, "file_data": data_url } })
                    };
                    json!([{ "type": "text", "text": prompt }, part])
                }
            };
            json!({
                "model": model,
                "messages": [{ "role": "user", "content": content }],
                "temperature": temperature,
                "max_tokens": max_tokens
            })
        }
        LlmProvider::Ollama => {
            let mut body = json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": temperature, "num_predict": max_tokens }
            });
            if let Some(file) = attachment {
                if !file.mime_type.starts_with("image/") {
                    return Err(OracleError::Unavailable(format!(
                        "ollama cannot read {} attachments",
                        file.mime_type
                    )));
                }
                body["images"] = json!([STANDARD.encode(&file.bytes)]);
            }
            body
        }
    };
    Ok(body)
}

fn completion_text(provider: LlmProvider, payload: &Value) -> Result<String, OracleError> {
    let text = match provider {
        LlmProvider::Gemini => payload["candidates"][0]["content"]["parts"].as_array().map(|parts| {
            parts.iter().filter_map(|part| part["text"].as_str()).collect::<Vec<_>>().join("")
        }),
        LlmProvider::OpenAi => payload["choices"][0]["message"]["content"].as_str().map(str::to_string),
        LlmProvider::Ollama => payload["response"].as_str().map(str::to_string),
    };

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(OracleError::InvalidResponse(format!(
            "{} reply carried no completion text",
            provider.as_str()
        ))),
    }
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    timeout: Duration,
) -> OracleError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => OracleError::Timeout(timeout),
        _ => {
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            OracleError::Unavailable(format!("{status}: {excerpt}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;
    use serde_json::json;

    use altura_core::config::LlmProvider;

    use crate::llm::{Attachment, OracleError};

    use super::{classify_status, completion_text, request_body};

    fn pdf() -> Attachment {
        Attachment {
            file_name: "rut.pdf".to_owned(),
            mime_type: "application/pdf".to_owned(),
            bytes: b"%PDF-1.4".to_vec(),
        }
    }

    #[test]
    fn gemini_body_inlines_document_as_base64() {
        let body = request_body(LlmProvider::Gemini, "gemini-1.5-flash", 0.3, 300, "extrae", Some(&pdf()))
            .expect("body");

        assert_eq!(body["contents"][0]["parts"][0]["text"], "extrae");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "application/pdf");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], "JVBERi0xLjQ=");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 300);
    }

    #[test]
    fn openai_body_uses_file_part_for_pdfs() {
        let plain = request_body(LlmProvider::OpenAi, "gpt-4o-mini", 0.3, 300, "hola", None).expect("body");
        assert_eq!(plain["messages"][0]["content"], "hola");

        let with_file =
            request_body(LlmProvider::OpenAi, "gpt-4o-mini", 0.3, 300, "extrae", Some(&pdf())).expect("body");
        assert_eq!(with_file["messages"][0]["content"][1]["type"], "file");
        assert_eq!(with_file["messages"][0]["content"][1]["file"]["filename"], "rut.pdf");
    }

    #[test]
    fn ollama_rejects_non_image_attachments() {
        assert!(matches!(
            request_body(LlmProvider::Ollama, "llama3", 0.3, 300, "extrae", Some(&pdf())),
            Err(OracleError::Unavailable(_))
        ));
    }

    #[test]
    fn completion_text_reads_each_provider_shape() {
        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "company_" }, { "text": "info" }] } }] });
        assert_eq!(completion_text(LlmProvider::Gemini, &gemini), Ok("company_info".to_owned()));

        let openai = json!({ "choices": [{ "message": { "content": "consultation" } }] });
        assert_eq!(completion_text(LlmProvider::OpenAi, &openai), Ok("consultation".to_owned()));

        let ollama = json!({ "response": "   " });
        assert!(matches!(
            completion_text(LlmProvider::Ollama, &ollama),
            Err(OracleError::InvalidResponse(_))
        ));
    }

    #[test]
    fn status_codes_map_to_oracle_errors() {
        let timeout = Duration::from_secs(30);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(4)), "", timeout),
            OracleError::RateLimited { retry_after: Some(Duration::from_secs(4)) }
        );
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT, None, "", timeout), OracleError::Timeout(timeout));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, "bad key", timeout),
            OracleError::Unavailable(message) if message.contains("401")
        ));
    }
}
