use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Major media family of an attachment's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFamily {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaFamily {
    /// Anything that isn't image/audio/video is treated as a document.
    pub fn from_content_type(content_type: &str) -> Self {
        let major = content_type.split('/').next().unwrap_or_default();
        match major {
            "image" => MediaFamily::Image,
            "audio" => MediaFamily::Audio,
            "video" => MediaFamily::Video,
            _ => MediaFamily::Document,
        }
    }
}

/// A stored media record with its same-family alternates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub uuid: Uuid,
    pub content_type: String,
    pub url: String,
    pub size: usize,
    pub width: usize,
    pub height: usize,
    pub duration: usize,
    pub alternates: Vec<Media>,
}

impl Media {
    pub fn family(&self) -> MediaFamily {
        MediaFamily::from_content_type(&self.content_type)
    }
}
