//! Inline file blocks embedded in chat text.
//!
//! A block looks like:
//!
//! ```text
//! ### FILE ###
//! #FILENAME=install.log
//! <content>
//! ### FILE END ###
//! ```
//!
//! Inbound, text attachments of a post are encoded into one block appended
//! to the user's text. Outbound, the first block in a model reply is cut out
//! and delivered as a real file. The two directions share only the grammar;
//! decoding an encoded block is not expected to round-trip.

use relaybot_core::channel::{Attachment, AttachmentFetcher};
use tracing::debug;

pub const FILE_START: &str = "### FILE ###";
pub const FILE_END: &str = "### FILE END ###";
pub const FILENAME_DIRECTIVE: &str = "#FILENAME=";
pub const TRUNCATION_NOTICE: &str = "== THE FILE WAS CUT OFF DUE TO CHARACTER LIMIT ==";

/// Default character budget of one encoded block.
pub const DEFAULT_CHAR_BUDGET: usize = 30_000;

/// One file carried in a block. `filename` is empty when the block named none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSection {
    pub filename: String,
    pub content: String,
}

/// A model reply with its embedded file (if any) separated out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    /// What remains to be shown as text
    pub text: String,
    pub file: Option<FileSection>,
}

/// Encode sections into one block, truncated to `budget` characters.
///
/// Returns `None` when there is nothing to encode.
pub fn encode_sections(sections: &[FileSection], budget: usize) -> Option<String> {
    if sections.is_empty() {
        return None;
    }

    let mut block = format!("{FILE_START}\n");
    for section in sections {
        block.push_str(FILENAME_DIRECTIVE);
        block.push_str(&section.filename);
        block.push('\n');
        block.push_str(&section.content);
        block.push_str("\n\n");
    }

    let length = block.chars().count();
    if length >= budget {
        debug!(length, budget, "Attachment block truncated");
        truncate_chars(&mut block, budget);
        block.push('\n');
        block.push_str(TRUNCATION_NOTICE);
        block.push('\n');
    }

    block.push_str(FILE_END);
    Some(block)
}

/// Download the text attachments of a post and encode them.
///
/// Non-text attachments and failed downloads are skipped. Returns `None`
/// when no attachment yielded text.
pub async fn encode_inbound(
    attachments: &[Attachment],
    fetcher: &dyn AttachmentFetcher,
    budget: usize,
) -> Option<String> {
    let mut sections = Vec::new();

    for attachment in attachments.iter().filter(|a| a.is_text()) {
        let Some(bytes) = fetcher.fetch(&attachment.url).await else {
            debug!(filename = %attachment.filename, "Skipping attachment that failed to download");
            continue;
        };
        sections.push(FileSection {
            filename: attachment.filename.clone(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    encode_sections(&sections, budget)
}

/// Append an encoded block to the user's own text.
pub fn merge_with_user_text(user_text: &str, block: &str) -> String {
    if user_text.trim().is_empty() {
        block.to_string()
    } else {
        format!("{user_text}\n{block}")
    }
}

/// Cut the first complete file block out of a model reply.
///
/// A reply without a complete block comes back unchanged.
pub fn decode_outbound(reply: &str) -> DecodedReply {
    let unchanged = || DecodedReply {
        text: reply.to_string(),
        file: None,
    };

    let Some(start) = reply.find(FILE_START) else {
        return unchanged();
    };
    let body_start = start + FILE_START.len();
    let Some(body_len) = reply[body_start..].find(FILE_END) else {
        return unchanged();
    };
    let body_end = body_start + body_len;
    let block_end = body_end + FILE_END.len();

    let body = &reply[body_start..body_end];
    let mut filename = None;
    let mut content_lines = Vec::new();
    for line in body.lines() {
        match line.trim_start().strip_prefix(FILENAME_DIRECTIVE) {
            Some(name) => {
                if filename.is_none() {
                    filename = Some(name.trim().to_string());
                }
            }
            None => content_lines.push(line),
        }
    }

    let text = format!("{}{}", &reply[..start], &reply[block_end..]);
    let content = content_lines.join("\n").trim().to_string();

    // An empty block is stripped but yields no file.
    DecodedReply {
        text: text.trim().to_string(),
        file: (!content.is_empty()).then(|| FileSection {
            filename: filename.unwrap_or_default(),
            content,
        }),
    }
}

/// Truncate `s` to at most `max_chars` characters.
fn truncate_chars(s: &mut String, max_chars: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
}
