//! Telegram Bot API over plain HTTPS: `getUpdates` long polling in, `sendMessage` and
//! `sendDocument` out, `getFile` for uploads.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use altura_core::config::TelegramConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::events::{
    ChatEnvelope, ChatEvent, ChatOutbound, ChatUser, DocumentMessage, TextMessage, TransportError,
};
use crate::runner::UpdateTransport;

/// Hard limit of a single Telegram text message.
pub const MAX_MESSAGE_CHARS: usize = 4096;
const MAX_CAPTION_CHARS: usize = 1024;
/// Bots cannot download files larger than this through `getFile`.
const MAX_DOWNLOAD_BYTES: u64 = 20 * 1_048_576;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ALLOWED_UPDATES: &[&str] = &["message"];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub document: Option<Document>,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotIdentity {
    username: Option<String>,
}

#[derive(Debug)]
enum ApiFailure {
    Http(String),
    Api { code: Option<u16>, description: String, retry_after: Option<u64> },
}

impl ApiFailure {
    fn from_http(error: reqwest::Error) -> Self {
        // the request url carries the bot token
        Self::Http(error.without_url().to_string())
    }

    fn is_parse_error(&self) -> bool {
        matches!(self, Self::Api { code: Some(400), description, .. } if description.contains("parse"))
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Api { code: Some(429), retry_after, .. } => Some(retry_after.unwrap_or(1)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(message) => write!(f, "{message}"),
            Self::Api { code, description, .. } => match code {
                Some(code) => write!(f, "telegram api error {code}: {description}"),
                None => write!(f, "telegram api error: {description}"),
            },
        }
    }
}

/// Thin Bot API client shared by the polling transport and the outbound side.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base_url: String,
    token: SecretString,
    documents_dir: PathBuf,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| TransportError::Connect(error.without_url().to_string()))?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            documents_dir: config.documents_dir.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base_url, self.token.expose_secret(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base_url, self.token.expose_secret(), file_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, ApiFailure> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiFailure::from_http)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiFailure> {
        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(ApiFailure::from_http)?;
        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ApiFailure::Api {
                code: envelope.error_code.or(Some(status.as_u16())),
                description: envelope.description.unwrap_or_else(|| "missing result".to_string()),
                retry_after: envelope.parameters.and_then(|parameters| parameters.retry_after),
            }),
        }
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let mut body = json!({ "timeout": timeout_secs, "allowed_updates": ALLOWED_UPDATES });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        // the HTTP timeout must outlive the long poll
        let timeout = Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT;
        self.call("getUpdates", body, timeout)
            .await
            .map_err(|failure| TransportError::Receive(failure.to_string()))
    }

    async fn send_chunk(&self, chat_id: i64, text: &str) -> Result<(), ApiFailure> {
        let formatted = json!({
            "chat_id": chat_id,
            "text": to_telegram_markdown(text),
            "parse_mode": "Markdown",
        });
        match self.call::<serde_json::Value>("sendMessage", formatted, REQUEST_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(failure) if failure.is_parse_error() => {
                debug!(chat_id, "markdown rejected; resending as plain text");
                let plain = json!({ "chat_id": chat_id, "text": text });
                self.call::<serde_json::Value>("sendMessage", plain, REQUEST_TIMEOUT).await.map(|_| ())
            }
            Err(failure) => Err(failure),
        }
    }

    async fn upload_document(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<(), ApiFailure> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_chars(caption, MAX_CAPTION_CHARS))
            .part("document", Part::bytes(bytes).file_name(file_name.to_string()));
        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .timeout(REQUEST_TIMEOUT * 2)
            .multipart(form)
            .send()
            .await
            .map_err(ApiFailure::from_http)?;
        Self::decode::<serde_json::Value>(response).await.map(|_| ())
    }
}

/// Retries a call once after the delay Telegram asks for on HTTP 429.
async fn with_rate_limit_retry<F, Fut>(operation: F) -> Result<(), ApiFailure>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), ApiFailure>>,
{
    match operation().await {
        Err(failure) => match failure.retry_after() {
            Some(seconds) => {
                warn!(retry_after = seconds, "telegram rate limit hit; retrying once");
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                operation().await
            }
            None => Err(failure),
        },
        ok => ok,
    }
}

#[async_trait]
impl ChatOutbound for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            with_rate_limit_retry(|| self.send_chunk(chat_id, &chunk))
                .await
                .map_err(|failure| TransportError::Send(failure.to_string()))?;
        }
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|error| TransportError::Send(format!("{}: {error}", path.display())))?;
        with_rate_limit_retry(|| self.upload_document(chat_id, bytes.clone(), file_name, caption))
            .await
            .map_err(|failure| TransportError::Send(failure.to_string()))
    }

    async fn download(&self, document: &DocumentMessage) -> Result<PathBuf, TransportError> {
        if document.file_size.is_some_and(|size| size > MAX_DOWNLOAD_BYTES) {
            return Err(TransportError::Download(format!(
                "{} exceeds the {} MB bot download limit",
                document.file_name,
                MAX_DOWNLOAD_BYTES / 1_048_576
            )));
        }

        let file: File = self
            .call("getFile", json!({ "file_id": document.file_id }), REQUEST_TIMEOUT)
            .await
            .map_err(|failure| TransportError::Download(failure.to_string()))?;
        let file_path = file
            .file_path
            .ok_or_else(|| TransportError::Download("telegram returned no file path".to_string()))?;

        let response = self
            .http
            .get(self.file_url(&file_path))
            .timeout(REQUEST_TIMEOUT * 2)
            .send()
            .await
            .map_err(|error| TransportError::Download(error.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Download(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| TransportError::Download(error.without_url().to_string()))?;

        tokio::fs::create_dir_all(&self.documents_dir)
            .await
            .map_err(|error| TransportError::Download(error.to_string()))?;
        let prefix = uuid::Uuid::new_v4().simple().to_string();
        let destination =
            self.documents_dir.join(format!("{}_{}", &prefix[..8], sanitize_file_name(&document.file_name)));
        tokio::fs::write(&destination, &bytes)
            .await
            .map_err(|error| TransportError::Download(error.to_string()))?;

        info!(file = %destination.display(), size = bytes.len(), "saved inbound document");
        Ok(destination)
    }
}

/// Long-polling source of updates. The offset advances as updates are acknowledged, so an
/// update is redelivered after a restart unless it was acknowledged first.
pub struct TelegramTransport {
    client: TelegramClient,
    poll_timeout_secs: u64,
    offset: Mutex<Option<i64>>,
    buffer: Mutex<VecDeque<ChatEnvelope>>,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient, poll_timeout_secs: u64) -> Self {
        Self { client, poll_timeout_secs, offset: Mutex::new(None), buffer: Mutex::new(VecDeque::new()) }
    }
}

#[async_trait]
impl UpdateTransport for TelegramTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let identity: BotIdentity = self
            .client
            .call("getMe", json!({}), REQUEST_TIMEOUT)
            .await
            .map_err(|failure| TransportError::Connect(failure.to_string()))?;
        info!(bot = identity.username.as_deref().unwrap_or("unknown"), "telegram bot authenticated");
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
        loop {
            if let Some(envelope) = self.buffer.lock().await.pop_front() {
                return Ok(Some(envelope));
            }

            let offset = *self.offset.lock().await;
            let updates = self.client.get_updates(offset, self.poll_timeout_secs).await?;
            if !updates.is_empty() {
                debug!(count = updates.len(), "telegram updates received");
            }
            self.buffer.lock().await.extend(updates.into_iter().map(envelope_from_update));
        }
    }

    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
        let mut offset = self.offset.lock().await;
        let next = update_id + 1;
        if offset.map_or(true, |current| next > current) {
            *offset = Some(next);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub fn envelope_from_update(update: Update) -> ChatEnvelope {
    let event = match update.message {
        Some(message) => message_event(message),
        None => ChatEvent::Unsupported { kind: "non_message".to_string() },
    };
    ChatEnvelope { update_id: update.update_id, event }
}

fn message_event(message: Message) -> ChatEvent {
    let Some(from) = message.from else {
        return ChatEvent::Unsupported { kind: "anonymous".to_string() };
    };
    let user = ChatUser { id: from.id, display_name: display_name(&from) };
    let chat_id = message.chat.id;

    if let Some(document) = message.document {
        return ChatEvent::Document(DocumentMessage {
            chat_id,
            user,
            file_id: document.file_id,
            file_name: document.file_name.unwrap_or_else(|| "documento".to_string()),
            file_size: document.file_size,
        });
    }
    // the last size is the largest
    if let Some(photo) = message.photo.and_then(|sizes| sizes.into_iter().last()) {
        return ChatEvent::Document(DocumentMessage {
            chat_id,
            user,
            file_id: photo.file_id,
            file_name: format!("foto_{}.jpg", message.message_id),
            file_size: photo.file_size,
        });
    }
    match message.text {
        Some(text) => ChatEvent::Text(TextMessage { chat_id, user, text }),
        None => ChatEvent::Unsupported { kind: "other".to_string() },
    }
}

fn display_name(user: &User) -> Option<String> {
    let full = match &user.last_name {
        Some(last) => format!("{} {}", user.first_name, last),
        None => user.first_name.clone(),
    };
    let full = full.trim().to_string();
    if full.is_empty() {
        user.username.clone()
    } else {
        Some(full)
    }
}

/// Replies use `**bold**`; legacy Telegram Markdown expects single asterisks.
pub fn to_telegram_markdown(text: &str) -> String {
    text.replace("**", "*")
}

/// Splits at paragraph, then line boundaries, never inside a UTF-8 character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while boundary > 0 && !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let region = &remaining[..boundary];
        let split_at = region
            .rfind("\n\n")
            .map(|position| position + 1)
            .or_else(|| region.rfind('\n'))
            .unwrap_or(boundary);
        let split_at = if split_at == 0 {
            remaining.char_indices().nth(1).map_or(remaining.len(), |(index, _)| index)
        } else {
            split_at
        };

        let (head, tail) = remaining.split_at(split_at);
        let head = head.trim_end();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        remaining = tail.trim_start_matches('\n');
    }
    chunks
}

/// Strips path separators and traversal sequences and caps the length at 200 bytes.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| *c != '/' && *c != '\\' && *c != '\0').collect();
    let cleaned = cleaned.replace("..", "");
    let cleaned = if cleaned.trim().is_empty() { "documento".to_string() } else { cleaned };
    if cleaned.len() <= 200 {
        return cleaned;
    }
    let extension = cleaned.rfind('.').map(|dot| &cleaned[dot..]).filter(|ext| ext.len() < 20).unwrap_or("");
    let mut stem_end = 200 - extension.len();
    while !cleaned.is_char_boundary(stem_end) {
        stem_end -= 1;
    }
    format!("{}{}", &cleaned[..stem_end], extension)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
