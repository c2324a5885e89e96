use crate::error::PublishError;
use crate::task::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of post being published
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Images,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Images => "images",
            ContentType::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post to publish. Only the path field matching `content_type` is consulted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Content {
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "images", default)]
    pub image_paths: Vec<PathBuf>,
    #[serde(rename = "video", default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    /// Size of the video file on disk. Set only by [`Content::probe_media`], never read from input.
    #[serde(skip)]
    pub video_size_bytes: Option<u64>,
}

impl Content {
    /// Image post with the given title and images
    pub fn images(title: impl Into<String>, image_paths: Vec<PathBuf>) -> Self {
        Self {
            content_type: ContentType::Images,
            title: title.into(),
            image_paths,
            ..Default::default()
        }
    }

    /// Video post with the given title and video file
    pub fn video(title: impl Into<String>, video_path: impl Into<PathBuf>) -> Self {
        Self {
            content_type: ContentType::Video,
            title: title.into(),
            video_path: Some(video_path.into()),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Media files the publish flow will upload, in upload order
    pub fn media_paths(&self) -> Vec<PathBuf> {
        match self.content_type {
            ContentType::Images => self.image_paths.clone(),
            ContentType::Video => self.video_path.iter().cloned().collect(),
        }
    }

    /// Replace `video_size_bytes` with the size read from the file system.
    pub fn probe_media(&mut self) {
        self.video_size_bytes = match (&self.content_type, &self.video_path) {
            (ContentType::Video, Some(path)) => std::fs::metadata(path).ok().map(|meta| meta.len()),
            _ => None,
        };
    }

    /// Encode as a task payload
    pub fn to_payload(&self) -> Result<Payload, PublishError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(PublishError::InvalidPayload(format!(
                "content encoded as {} instead of an object",
                other
            ))),
        }
    }

    /// Decode from a task payload
    pub fn from_payload(payload: &Payload) -> Result<Self, PublishError> {
        serde_json::from_value(serde_json::Value::Object(payload.clone()))
            .map_err(|e| PublishError::InvalidPayload(e.to_string()))
    }
}

/// Per-platform content constraints
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContentLimits {
    pub title_max_length: usize,
    pub body_max_length: usize,
    pub max_images: usize,
    pub max_video_size: u64,
    pub max_tags: usize,
    pub allowed_video_formats: Vec<String>,
    pub allowed_image_formats: Vec<String>,
}

impl ContentLimits {
    pub fn allows_video_format(&self, path: &std::path::Path) -> bool {
        extension_allowed(path, &self.allowed_video_formats)
    }

    pub fn allows_image_format(&self, path: &std::path::Path) -> bool {
        extension_allowed(path, &self.allowed_image_formats)
    }
}

fn extension_allowed(path: &std::path::Path, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    allowed
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').to_lowercase() == ext)
}

/// Field a validation violation refers to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationField {
    Title,
    Body,
    Images,
    Video,
    Tags,
}

impl ViolationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationField::Title => "title",
            ViolationField::Body => "body",
            ViolationField::Images => "images",
            ViolationField::Video => "video",
            ViolationField::Tags => "tags",
        }
    }
}

/// One broken content rule
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub field: ViolationField,
    pub message: String,
}

impl Violation {
    pub fn new(field: ViolationField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.as_str(), self.message)
    }
}
