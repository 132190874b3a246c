//! Attachment resolution.
//!
//! Expands raw `contentType:url` tokens into send-ready attachments,
//! consulting the backend's media store to pick a supported alternate when
//! the provider restricts content types or sizes.

use std::collections::HashMap;

use courier_backend::{Backend, Media, MediaFamily};
use courier_core::SendError;

/// A send-ready attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub family: MediaFamily,
    pub content_type: String,
    pub url: String,
    /// Present when the backend resolved the URL to a stored record.
    pub media: Option<Media>,
    /// First image alternate of a video, when one exists.
    pub thumbnail: Option<Media>,
}

/// Provider constraints for one media family.
#[derive(Debug, Clone, Default)]
pub struct MediaSupport {
    /// Accepted content types; empty means every type is accepted.
    pub types: Vec<String>,
    pub max_bytes: Option<usize>,
}

impl MediaSupport {
    fn accepts(&self, media: &Media) -> bool {
        if !self.types.is_empty() && !self.types.iter().any(|t| t == &media.content_type) {
            return false;
        }
        match self.max_bytes {
            Some(max) => media.size <= max,
            None => true,
        }
    }
}

/// Resolves raw attachment tokens against provider constraints.
///
/// An empty `support` map accepts everything. Attachments the provider
/// cannot take are dropped, not errored; a malformed token fails the send.
pub async fn resolve_attachments(
    backend: &dyn Backend,
    tokens: &[String],
    support: &HashMap<MediaFamily, MediaSupport>,
    allow_url_only: bool,
) -> Result<Vec<Attachment>, SendError> {
    let mut attachments = Vec::with_capacity(tokens.len());

    for token in tokens {
        let (content_type, url) = token
            .split_once(':')
            .ok_or_else(|| SendError::Other(format!("invalid attachment format: {token}")))?;
        if url.starts_with("//") || content_type.is_empty() {
            return Err(SendError::Other(format!(
                "invalid attachment format: {token}"
            )));
        }

        let media = backend
            .resolve_media(url)
            .await
            .map_err(|e| SendError::Other(e.to_string()))?;

        let Some(media) = media else {
            if allow_url_only {
                attachments.push(Attachment {
                    family: MediaFamily::from_content_type(content_type),
                    content_type: content_type.to_string(),
                    url: url.to_string(),
                    media: None,
                    thumbnail: None,
                });
            }
            continue;
        };

        let family = media.family();
        let constraint = support.get(&family);
        if constraint.is_none() && !support.is_empty() {
            // provider enumerates families and this one isn't among them
            continue;
        }

        let chosen = std::iter::once(&media)
            .chain(media.alternates.iter().filter(|alt| alt.family() == family))
            .find(|candidate| constraint.map(|c| c.accepts(candidate)).unwrap_or(true))
            .cloned();

        let Some(chosen) = chosen else {
            continue;
        };

        let thumbnail = if chosen.family() == MediaFamily::Video {
            media
                .alternates
                .iter()
                .find(|alt| alt.family() == MediaFamily::Image)
                .cloned()
        } else {
            None
        };

        attachments.push(Attachment {
            family: chosen.family(),
            content_type: chosen.content_type.clone(),
            url: chosen.url.clone(),
            media: Some(chosen),
            thumbnail,
        });
    }

    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_backend::MemoryBackend;
    use uuid::Uuid;

    fn media(content_type: &str, url: &str, size: usize) -> Media {
        Media {
            uuid: Uuid::new_v4(),
            content_type: content_type.to_string(),
            url: url.to_string(),
            size,
            width: 0,
            height: 0,
            duration: 0,
            alternates: Vec::new(),
        }
    }

    #[tokio::test]
    async fn malformed_tokens_fail_the_send() {
        let backend = MemoryBackend::new();
        let err = resolve_attachments(
            &backend,
            &["no-colon-or-url".to_string()],
            &HashMap::new(),
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SendError::Other(_)));

        let err = resolve_attachments(
            &backend,
            &["image/jpeg://missing-scheme.jpg".to_string()],
            &HashMap::new(),
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SendError::Other(_)));
    }

    #[tokio::test]
    async fn unresolved_url_kept_when_url_only_allowed() {
        let backend = MemoryBackend::new();
        let tokens = vec!["image/jpeg:https://example.com/a.jpg".to_string()];

        let kept = resolve_attachments(&backend, &tokens, &HashMap::new(), true)
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].family, MediaFamily::Image);
        assert!(kept[0].media.is_none());

        let dropped = resolve_attachments(&backend, &tokens, &HashMap::new(), false)
            .await
            .unwrap();
        assert!(dropped.is_empty());
    }

    #[tokio::test]
    async fn empty_support_accepts_all_types() {
        let backend = MemoryBackend::new();
        backend.add_media(media("audio/amr", "https://example.com/a.amr", 5000));

        let resolved = resolve_attachments(
            &backend,
            &["audio/amr:https://example.com/a.amr".to_string()],
            &HashMap::new(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].content_type, "audio/amr");
    }

    #[tokio::test]
    async fn alternate_selected_when_primary_unsupported() {
        let backend = MemoryBackend::new();
        let mut primary = media("audio/amr", "https://example.com/a.amr", 5000);
        primary
            .alternates
            .push(media("audio/mp3", "https://example.com/a.mp3", 6000));
        backend.add_media(primary);

        let mut support = HashMap::new();
        support.insert(
            MediaFamily::Audio,
            MediaSupport {
                types: vec!["audio/mp3".to_string()],
                max_bytes: None,
            },
        );

        let resolved = resolve_attachments(
            &backend,
            &["audio/amr:https://example.com/a.amr".to_string()],
            &support,
            false,
        )
        .await
        .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].content_type, "audio/mp3");
        assert_eq!(resolved[0].url, "https://example.com/a.mp3");
    }

    #[tokio::test]
    async fn oversized_media_dropped() {
        let backend = MemoryBackend::new();
        backend.add_media(media("image/jpeg", "https://example.com/big.jpg", 2_000_000));

        let mut support = HashMap::new();
        support.insert(
            MediaFamily::Image,
            MediaSupport {
                types: vec![],
                max_bytes: Some(1_000_000),
            },
        );

        let resolved = resolve_attachments(
            &backend,
            &["image/jpeg:https://example.com/big.jpg".to_string()],
            &support,
            false,
        )
        .await
        .unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn video_gets_image_thumbnail() {
        let backend = MemoryBackend::new();
        let mut video = media("video/mp4", "https://example.com/v.mp4", 900_000);
        video
            .alternates
            .push(media("image/jpeg", "https://example.com/v-thumb.jpg", 20_000));
        backend.add_media(video);

        let resolved = resolve_attachments(
            &backend,
            &["video/mp4:https://example.com/v.mp4".to_string()],
            &HashMap::new(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(resolved.len(), 1);
        let thumb = resolved[0].thumbnail.as_ref().unwrap();
        assert_eq!(thumb.url, "https://example.com/v-thumb.jpg");
    }
}
