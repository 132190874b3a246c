//! Outbound message splitting.
//!
//! An outbound payload becomes an ordered list of parts obeying the
//! provider's maximum lengths, attachment policy and captioned-attachment
//! eligibility. Parts are sent strictly in order; the first part-level
//! error abandons the rest.

use courier_backend::MediaFamily;
use courier_core::{MsgOut, OptInRef};

use crate::media::Attachment;

/// Provider-declared splitting limits.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Maximum byte length of one text part.
    pub max_text_len: usize,
    /// Maximum byte length of an attachment caption; 0 disables captions.
    pub max_caption_len: usize,
    /// Media families eligible to carry a caption.
    pub captionable: Vec<MediaFamily>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_text_len: 160,
            max_caption_len: 0,
            captionable: Vec::new(),
        }
    }
}

/// Payload of one outbound part.
#[derive(Debug, Clone)]
pub enum PartContent {
    Text(String),
    Attachment(Attachment),
    CaptionedAttachment {
        attachment: Attachment,
        caption: String,
    },
    OptIn(OptInRef),
}

#[derive(Debug, Clone)]
pub struct MsgPart {
    pub content: PartContent,
    pub is_first: bool,
    pub is_last: bool,
}

/// Splits an outbound message into ordered parts.
///
/// When exactly one attachment is present, the text is non-empty, fits the
/// caption limit, and the attachment's family is captionable, a single
/// captioned part is emitted. Otherwise attachments are emitted one part
/// each, followed by the split text.
pub fn split_msg(msg: &MsgOut, attachments: Vec<Attachment>, opts: &SplitOptions) -> Vec<MsgPart> {
    let mut contents: Vec<PartContent> = Vec::new();

    if let Some(opt_in) = &msg.opt_in {
        contents.push(PartContent::OptIn(OptInRef {
            id: opt_in.id,
            name: opt_in.name.clone(),
        }));
    } else if attachments.len() == 1
        && !msg.text.is_empty()
        && msg.text.len() <= opts.max_caption_len
        && opts.captionable.contains(&attachments[0].family)
    {
        let mut attachments = attachments;
        contents.push(PartContent::CaptionedAttachment {
            attachment: attachments.remove(0),
            caption: msg.text.clone(),
        });
    } else {
        for attachment in attachments {
            contents.push(PartContent::Attachment(attachment));
        }
        if !msg.text.is_empty() {
            for text in split_text(&msg.text, opts.max_text_len) {
                contents.push(PartContent::Text(text));
            }
        }
    }

    let count = contents.len();
    contents
        .into_iter()
        .enumerate()
        .map(|(i, content)| MsgPart {
            content,
            is_first: i == 0,
            is_last: i + 1 == count,
        })
        .collect()
}

/// Splits text into parts no longer than `max_len` bytes.
///
/// Walks characters accumulating into the current part; the part closes
/// when its byte length reaches the maximum, or early when a space shows up
/// within the final six bytes. Emitted parts are whitespace-trimmed.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return vec![trimmed.to_string()];
    }

    let break_zone = max_len.saturating_sub(6);
    let mut parts = Vec::new();
    let mut part = String::new();

    for ch in text.chars() {
        if part.len() + ch.len_utf8() > max_len {
            flush(&mut parts, &mut part);
        }
        part.push(ch);
        if part.len() >= max_len || (ch == ' ' && part.len() > break_zone) {
            flush(&mut parts, &mut part);
        }
    }
    flush(&mut parts, &mut part);

    parts
}

fn flush(parts: &mut Vec<String>, part: &mut String) {
    let trimmed = part.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    part.clear();
}
