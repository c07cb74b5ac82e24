use serde::{Deserialize, Serialize};

/// Per-channel message identifier. Monotonically increasing, not contiguous.
pub type MessageId = i64;

/// Channel (chat) identifier as used by the transport.
pub type ChatId = i64;

/// Album identifier shared by the members of a media group.
pub type GroupId = String;

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Animation,
    Voice,
    Sticker,
    VideoNote,
}

impl MediaKind {
    /// Whether this kind of media may be sent as part of an album.
    pub fn groupable(&self) -> bool {
        matches!(
            self,
            MediaKind::Photo | MediaKind::Video | MediaKind::Document | MediaKind::Audio
        )
    }

    /// Whether the destination accepts a caption alongside this media.
    pub fn accepts_caption(&self) -> bool {
        !matches!(self, MediaKind::Sticker | MediaKind::VideoNote)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Animation => "animation",
            MediaKind::Voice => "voice",
            MediaKind::Sticker => "sticker",
            MediaKind::VideoNote => "video_note",
        }
    }
}

/// A reference to media already stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    /// Transport-issued handle that can be re-sent without re-uploading.
    pub file_id: String,
}

impl MediaRef {
    pub fn new(kind: MediaKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
        }
    }
}

/// The content of a message: text (or caption) and/or a media reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.media.is_none()
    }
}

/// A message read from the source channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    /// Identifier within the source channel; also the ordering key.
    pub id: MessageId,
    /// Album this message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Source identifier of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    pub payload: Payload,
}

impl SourceMessage {
    /// Create a plain text message.
    pub fn text(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            group_id: None,
            reply_to: None,
            payload: Payload {
                text: Some(text.into()),
                media: None,
            },
        }
    }

    /// Create a media message without caption.
    pub fn media(id: MessageId, media: MediaRef) -> Self {
        Self {
            id,
            group_id: None,
            reply_to: None,
            payload: Payload {
                text: None,
                media: Some(media),
            },
        }
    }

    /// Attach a caption (or replace the text).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.payload.text = Some(text.into());
        self
    }

    /// Mark this message as a member of an album.
    pub fn in_group(mut self, group_id: impl Into<GroupId>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Mark this message as a reply to another source message.
    pub fn replying_to(mut self, target: MessageId) -> Self {
        self.reply_to = Some(target);
        self
    }
}
