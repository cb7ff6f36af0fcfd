//! Turning FETCH results into mirror header rows.

use mailparse::MailHeaderMap;
use mirrorbox_imap::{FetchData, Flag};

use crate::mirror::{MessageFlags, MessageHeader};

/// Threading headers pulled out of a `BODY[HEADER.FIELDS (...)]` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadingHeaders {
    /// `Message-ID`
    pub message_id: Option<String>,
    /// `In-Reply-To`
    pub in_reply_to: Option<String>,
    /// `References`, oldest first.
    pub references: Vec<String>,
}

/// Parses a raw header block. Folded lines are joined and names match
/// case-insensitively; the first occurrence of a header wins.
#[must_use]
pub fn parse_threading_headers(raw: &[u8]) -> ThreadingHeaders {
    let text = String::from_utf8_lossy(raw);
    let mut out = ThreadingHeaders::default();

    for (name, value) in unfold(&text) {
        match name.to_ascii_lowercase().as_str() {
            "message-id" if out.message_id.is_none() => {
                out.message_id = message_ids(&value).into_iter().next();
            }
            "in-reply-to" if out.in_reply_to.is_none() => {
                out.in_reply_to = message_ids(&value).into_iter().next();
            }
            "references" if out.references.is_empty() => out.references = message_ids(&value),
            _ => {}
        }
    }
    out
}

fn unfold(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
        if line.is_empty() {
            continue;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

/// Extracts `<...>` identifiers. A bare token is accepted when the value has
/// no brackets at all.
fn message_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        ids.push(rest[start..=start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    if ids.is_empty() {
        ids.extend(value.split_whitespace().next().map(str::to_string));
    }
    ids
}

/// Decodes RFC 2047 encoded-words (`=?charset?B|Q?text?=`) inside a header
/// value, honoring the declared charset. Whitespace between adjacent
/// encoded-words is dropped and words that fail to decode are kept verbatim.
#[must_use]
pub fn decode_header_value(value: &str) -> String {
    let line = format!("X: {value}");
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_string(),
    }
}

/// Builds the header row for one FETCH response. Returns `None` when the
/// response carries no UID.
#[must_use]
pub fn header_from_fetch(data: &FetchData) -> Option<MessageHeader> {
    let uid = data.uid?.get();
    let threading = data
        .header_fields
        .as_deref()
        .map(parse_threading_headers)
        .unwrap_or_default();
    let envelope = data.envelope.as_ref();

    let message_id = threading
        .message_id
        .or_else(|| envelope.and_then(|e| e.message_id.clone()));
    let in_reply_to = threading
        .in_reply_to
        .or_else(|| envelope.and_then(|e| e.in_reply_to.clone()));

    Some(MessageHeader {
        uid,
        message_id,
        in_reply_to,
        references: threading.references,
        subject: envelope
            .and_then(|e| e.subject.as_deref())
            .map(decode_header_value),
        from: envelope
            .and_then(|e| e.from.first())
            .map(|a| decode_header_value(&a.display())),
        date: envelope.and_then(|e| e.date.clone()),
        internal_date: data.internal_date.clone(),
        size: data.size,
        flags: data
            .flags
            .as_deref()
            .map(MessageFlags::from_imap)
            .unwrap_or_default(),
        mod_seq: data.mod_seq.map(|m| m.get()),
    })
}

/// Builds the header row for a message the client holds in full, such as
/// one it just appended.
#[must_use]
pub fn header_from_message(uid: u32, flags: &[Flag], raw: &[u8]) -> MessageHeader {
    let mut header = MessageHeader {
        uid,
        size: u32::try_from(raw.len()).ok(),
        flags: MessageFlags::from_imap(flags),
        ..MessageHeader::default()
    };
    let Ok((fields, body_offset)) = mailparse::parse_headers(raw) else {
        return header;
    };
    let threading = parse_threading_headers(&raw[..body_offset.min(raw.len())]);
    header.message_id = threading.message_id;
    header.in_reply_to = threading.in_reply_to;
    header.references = threading.references;
    header.subject = fields.get_first_value("Subject");
    header.from = fields.get_first_value("From");
    header.date = fields.get_first_value("Date");
    header
}
