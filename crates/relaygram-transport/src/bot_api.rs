//! Telegram Bot API binding.
//!
//! The backlog is read from the bot's pending `channel_post` updates. Updates
//! are only confirmed once they are settled (older than the checkpoint, or
//! from another chat), so anything not yet replicated survives a crash.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use relaygram_core::{ChatId, MediaKind, MediaRef, MessageId, Payload, SourceMessage};

use crate::client::Transport;
use crate::error::{SendError, SendResult, TransportError, TransportResult};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport that talks to the Telegram Bot API over HTTPS.
pub struct BotApiTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl BotApiTransport {
    pub fn new(bot_token: &str) -> TransportResult<Self> {
        Self::with_api_base(DEFAULT_API_BASE, bot_token)
    }

    pub fn with_api_base(api_base: &str, bot_token: &str) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> SendResult<T> {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        interpret(status, &text)
    }

    async fn fetch(&self, chat: ChatId, after: MessageId) -> TransportResult<Vec<SourceMessage>> {
        let mut offset: Option<i64> = None;

        loop {
            let mut body = json!({
                "timeout": 0,
                "allowed_updates": ["channel_post"],
            });
            if let Some(offset) = offset {
                body["offset"] = json!(offset);
            }

            let updates: Vec<Update> = self.call("getUpdates", &body).await?;

            match read_page(updates, chat, after) {
                Page::Confirm(next) => {
                    debug!(up_to = next - 1, "Confirming settled updates");
                    offset = Some(next);
                }
                Page::Deliver(messages) => return Ok(messages),
            }
        }
    }
}

impl Transport for BotApiTransport {
    fn fetch_backlog(
        &self,
        chat: ChatId,
        after: MessageId,
    ) -> impl Future<Output = TransportResult<Vec<SourceMessage>>> + Send {
        self.fetch(chat, after)
    }

    fn send_single(
        &self,
        chat: ChatId,
        message: &SourceMessage,
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<MessageId>> + Send {
        let (method, body) = single_request(chat, message, reply_to);
        async move {
            let sent: SentMessage = self.call(method, &body).await?;
            Ok(sent.message_id)
        }
    }

    fn send_group(
        &self,
        chat: ChatId,
        members: &[SourceMessage],
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<Vec<MessageId>>> + Send {
        let request = group_request(chat, members, reply_to);
        async move {
            let body = request?;
            let sent: Vec<SentMessage> = self.call("sendMediaGroup", &body).await?;
            Ok(sent.into_iter().map(|m| m.message_id).collect())
        }
    }
}

/// Turn an HTTP status and body into a result.
fn interpret<T: DeserializeOwned>(status: u16, body: &str) -> SendResult<T> {
    let response: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) if status == 429 => {
            return Err(SendError::RateLimited {
                retry_after: Duration::from_secs(1),
            })
        }
        Err(e) if (200..300).contains(&status) => {
            return Err(SendError::Failed(TransportError::Serialization(e)))
        }
        Err(_) => {
            return Err(SendError::Failed(TransportError::Api {
                code: i64::from(status),
                description: body.chars().take(200).collect(),
            }))
        }
    };

    if response.ok {
        return response.result.ok_or_else(|| {
            SendError::Failed(TransportError::Protocol("ok response without result".into()))
        });
    }

    let retry_after = response.parameters.and_then(|p| p.retry_after);
    let code = response.error_code.unwrap_or(i64::from(status));
    match retry_after {
        Some(secs) => Err(SendError::RateLimited {
            retry_after: Duration::from_secs(secs),
        }),
        None if code == 429 => Err(SendError::RateLimited {
            retry_after: Duration::from_secs(1),
        }),
        None => Err(SendError::Failed(TransportError::Api {
            code,
            description: response.description.unwrap_or_default(),
        })),
    }
}

fn reply_parameters(reply_to: MessageId) -> Value {
    json!({
        "message_id": reply_to,
        "allow_sending_without_reply": true,
    })
}

fn single_request(
    chat: ChatId,
    message: &SourceMessage,
    reply_to: Option<MessageId>,
) -> (&'static str, Value) {
    let mut body = Map::new();
    body.insert("chat_id".into(), json!(chat));

    let method = match &message.payload.media {
        None => {
            body.insert(
                "text".into(),
                json!(message.payload.text.clone().unwrap_or_default()),
            );
            body.insert("link_preview_options".into(), json!({"is_disabled": true}));
            "sendMessage"
        }
        Some(media) => {
            body.insert(media.kind.as_str().into(), json!(media.file_id));
            if media.kind.accepts_caption() {
                if let Some(caption) = &message.payload.text {
                    body.insert("caption".into(), json!(caption));
                }
            }
            media_method(media.kind)
        }
    };

    if let Some(target) = reply_to {
        body.insert("reply_parameters".into(), reply_parameters(target));
    }

    (method, Value::Object(body))
}

fn group_request(
    chat: ChatId,
    members: &[SourceMessage],
    reply_to: Option<MessageId>,
) -> SendResult<Value> {
    let mut media = Vec::with_capacity(members.len());
    for member in members {
        let reference = member.payload.media.as_ref().ok_or_else(|| {
            TransportError::Unsupported(format!("album member {} has no media", member.id))
        })?;
        if !reference.kind.groupable() {
            return Err(TransportError::Unsupported(format!(
                "{} cannot be part of an album (message {})",
                reference.kind.as_str(),
                member.id
            ))
            .into());
        }

        let mut item = json!({
            "type": reference.kind.as_str(),
            "media": reference.file_id,
        });
        if let Some(caption) = &member.payload.text {
            item["caption"] = json!(caption);
        }
        media.push(item);
    }

    let mut body = json!({
        "chat_id": chat,
        "media": media,
    });
    if let Some(target) = reply_to {
        body["reply_parameters"] = reply_parameters(target);
    }
    Ok(body)
}

fn media_method(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Photo => "sendPhoto",
        MediaKind::Video => "sendVideo",
        MediaKind::Document => "sendDocument",
        MediaKind::Audio => "sendAudio",
        MediaKind::Animation => "sendAnimation",
        MediaKind::Voice => "sendVoice",
        MediaKind::Sticker => "sendSticker",
        MediaKind::VideoNote => "sendVideoNote",
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    channel_post: Option<Post>,
}

impl Update {
    /// Nothing left to replicate from this update.
    fn is_settled(&self, chat: ChatId, after: MessageId) -> bool {
        match &self.channel_post {
            Some(post) => post.chat.id != chat || post.message_id <= after,
            None => true,
        }
    }
}

/// What to do with one page of `getUpdates`.
#[derive(Debug, PartialEq)]
enum Page {
    /// The page starts with settled updates; read again from this offset.
    Confirm(i64),
    /// Nothing at the head is settled; these are the posts to replicate.
    Deliver(Vec<SourceMessage>),
}

/// Decide a page. Only the settled prefix may be confirmed, since confirming
/// an update drops it from the bot's queue for good.
fn read_page(updates: Vec<Update>, chat: ChatId, after: MessageId) -> Page {
    let settled = updates
        .iter()
        .take_while(|u| u.is_settled(chat, after))
        .last()
        .map(|u| u.update_id);
    if let Some(last) = settled {
        return Page::Confirm(last + 1);
    }

    let messages = updates
        .into_iter()
        .filter_map(|u| u.channel_post)
        .filter(|post| post.chat.id == chat && post.message_id > after)
        .filter_map(|post| {
            let id = post.message_id;
            let message = post.into_source_message();
            if message.is_none() {
                debug!(source_id = id, "Skipping post with nothing to forward");
            }
            message
        })
        .collect();

    Page::Deliver(messages)
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct ReplyRef {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct Post {
    message_id: MessageId,
    chat: Chat,
    #[serde(default)]
    media_group_id: Option<String>,
    #[serde(default)]
    reply_to_message: Option<ReplyRef>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Option<Vec<FileRef>>,
    #[serde(default)]
    video: Option<FileRef>,
    #[serde(default)]
    animation: Option<FileRef>,
    #[serde(default)]
    document: Option<FileRef>,
    #[serde(default)]
    audio: Option<FileRef>,
    #[serde(default)]
    voice: Option<FileRef>,
    #[serde(default)]
    sticker: Option<FileRef>,
    #[serde(default)]
    video_note: Option<FileRef>,
}

impl Post {
    fn media(&self) -> Option<MediaRef> {
        // Animations also carry a `document`; check them first.
        let candidates = [
            (MediaKind::Photo, self.photo.as_ref().and_then(|sizes| sizes.last())),
            (MediaKind::Video, self.video.as_ref()),
            (MediaKind::Animation, self.animation.as_ref()),
            (MediaKind::Document, self.document.as_ref()),
            (MediaKind::Audio, self.audio.as_ref()),
            (MediaKind::Voice, self.voice.as_ref()),
            (MediaKind::Sticker, self.sticker.as_ref()),
            (MediaKind::VideoNote, self.video_note.as_ref()),
        ];
        candidates
            .into_iter()
            .find_map(|(kind, file)| file.map(|f| MediaRef::new(kind, f.file_id.clone())))
    }

    fn into_source_message(self) -> Option<SourceMessage> {
        let payload = Payload {
            media: self.media(),
            text: self.text.or(self.caption),
        };
        if payload.is_empty() {
            return None;
        }

        Some(SourceMessage {
            id: self.message_id,
            group_id: self.media_group_id,
            reply_to: self.reply_to_message.map(|r| r.message_id),
            payload,
        })
    }
}
