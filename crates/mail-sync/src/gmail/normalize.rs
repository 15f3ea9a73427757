//! Gmail API response normalization
//!
//! Converts Gmail API messages into locally mirrored `Email`s.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{TimeZone, Utc};

use super::api::{GmailMessage, Header, MessageBody, MessagePart, MessagePayload};
use crate::models::{AccountId, Email, EmailAddress, EmailId, ThreadId};

/// Normalize a full Gmail message into an `Email` owned by `account_id`
///
/// Fails only when the message has no payload (e.g. it was fetched with
/// `format=minimal`); every other missing field gets a default.
pub fn normalize_message(gmail_msg: GmailMessage, account_id: AccountId) -> Result<Email> {
    let payload = gmail_msg
        .payload
        .as_ref()
        .with_context(|| format!("Message {} has no payload", gmail_msg.id))?;

    let header = |name: &str| find_header(payload.headers.as_deref(), name);

    let from = header("From")
        .map(|s| EmailAddress::parse(&s))
        .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com"));
    let to = header("To").map(|s| parse_address_list(&s)).unwrap_or_default();
    let cc = header("Cc").map(|s| parse_address_list(&s)).unwrap_or_default();
    let subject = header("Subject").unwrap_or_default();

    let internal_date: i64 = gmail_msg.internal_date.parse().unwrap_or(0);
    let received_at = Utc
        .timestamp_millis_opt(internal_date)
        .single()
        .unwrap_or_else(Utc::now);

    let body_text = find_body(payload, "text/plain").or_else(|| {
        // Single-part messages sometimes omit the mime type
        payload
            .body
            .as_ref()
            .filter(|_| payload.mime_type.is_none())
            .and_then(decode_body)
    });
    let body_html = find_body(payload, "text/html");

    let snippet = if gmail_msg.snippet.is_empty() {
        body_text
            .as_deref()
            .map(|text| text.chars().take(200).collect())
            .unwrap_or_default()
    } else {
        decode_html_entities(&gmail_msg.snippet)
    };

    Ok(Email::builder(
        EmailId::new(&gmail_msg.id),
        account_id,
        ThreadId::new(&gmail_msg.thread_id),
    )
    .from(from)
    .to(to)
    .cc(cc)
    .subject(subject)
    .snippet(snippet)
    .received_at(received_at)
    .internal_date(internal_date)
    .labels(gmail_msg.label_ids.unwrap_or_default())
    .body_text(body_text)
    .body_html(body_html)
    .build())
}

/// Case-insensitive header lookup
fn find_header(headers: Option<&[Header]>, name: &str) -> Option<String> {
    headers?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

fn parse_address_list(s: &str) -> Vec<EmailAddress> {
    s.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(EmailAddress::parse)
        .collect()
}

fn has_mime(mime_type: Option<&String>, wanted: &str) -> bool {
    mime_type.is_some_and(|m| m.starts_with(wanted))
}

/// First body of the wanted mime type, depth-first through nested parts
fn find_body(payload: &MessagePayload, mime: &str) -> Option<String> {
    if has_mime(payload.mime_type.as_ref(), mime)
        && let Some(text) = payload.body.as_ref().and_then(decode_body)
    {
        return Some(text);
    }
    payload
        .parts
        .as_deref()
        .and_then(|parts| find_body_in_parts(parts, mime))
}

fn find_body_in_parts(parts: &[MessagePart], mime: &str) -> Option<String> {
    parts.iter().find_map(|part| {
        if has_mime(part.mime_type.as_ref(), mime)
            && let Some(text) = part.body.as_ref().and_then(decode_body)
        {
            return Some(text);
        }
        part.parts
            .as_deref()
            .and_then(|nested| find_body_in_parts(nested, mime))
    })
}

/// Decode a base64 body; Gmail uses URL-safe alphabet with varying padding
///
/// Invalid UTF-8 sequences become U+FFFD rather than dropping the body.
fn decode_body(body: &MessageBody) -> Option<String> {
    let data = body.data.as_deref()?;
    [
        &BASE64_URL_SAFE_NO_PAD,
        &BASE64_URL_SAFE,
        &BASE64_STANDARD,
        &BASE64_STANDARD_NO_PAD,
    ]
    .iter()
    .find_map(|engine| engine.decode(data).ok())
    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn body(text: &str) -> MessageBody {
        MessageBody {
            size: Some(text.len() as u32),
            data: Some(BASE64_URL_SAFE_NO_PAD.encode(text)),
        }
    }

    fn part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            part_id: None,
            mime_type: Some(mime.to_string()),
            filename: None,
            headers: None,
            body: Some(body(text)),
            parts: None,
        }
    }

    fn make_message(payload: Option<MessagePayload>) -> GmailMessage {
        GmailMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
            snippet: "Fish &amp; chips".to_string(),
            internal_date: "1700000000000".to_string(),
            payload,
        }
    }

    fn multipart_payload() -> MessagePayload {
        MessagePayload {
            headers: Some(vec![
                header("FROM", "Alice <alice@example.com>"),
                header("To", "bob@example.com, Carol <carol@example.com>"),
                header("Subject", "Lunch"),
            ]),
            body: None,
            mime_type: Some("multipart/mixed".to_string()),
            parts: Some(vec![MessagePart {
                part_id: Some("0".to_string()),
                mime_type: Some("multipart/alternative".to_string()),
                filename: None,
                headers: None,
                body: None,
                parts: Some(vec![
                    part("text/plain", "plain body"),
                    part("text/html", "<p>html body</p>"),
                ]),
            }]),
        }
    }

    #[test]
    fn test_normalize_multipart() {
        let email = normalize_message(make_message(Some(multipart_payload())), 9).unwrap();

        assert_eq!(email.id.as_str(), "m1");
        assert_eq!(email.account_id, 9);
        assert_eq!(email.from.name.as_deref(), Some("Alice"));
        assert_eq!(email.to.len(), 2);
        assert_eq!(email.to[1].email, "carol@example.com");
        assert_eq!(email.subject, "Lunch");
        assert_eq!(email.snippet, "Fish & chips");
        assert_eq!(email.body_text.as_deref(), Some("plain body"));
        assert_eq!(email.body_html.as_deref(), Some("<p>html body</p>"));
        assert_eq!(email.internal_date, 1_700_000_000_000);
        assert_eq!(email.received_at.timestamp_millis(), 1_700_000_000_000);
        assert!(!email.is_read());
    }

    #[test]
    fn test_normalize_without_payload_fails() {
        assert!(normalize_message(make_message(None), 1).is_err());
    }

    #[test]
    fn test_decode_padded_body() {
        let padded = MessageBody {
            size: None,
            data: Some("SGVsbG8sIFdvcmxkIQ==".to_string()),
        };
        assert_eq!(decode_body(&padded).as_deref(), Some("Hello, World!"));
    }

    #[test]
    fn test_decode_body_with_invalid_utf8() {
        // Latin-1 "café ok" mislabelled as UTF-8
        let latin1 = MessageBody {
            size: None,
            data: Some(BASE64_URL_SAFE_NO_PAD.encode(b"caf\xe9 ok")),
        };
        assert_eq!(decode_body(&latin1).as_deref(), Some("caf\u{FFFD} ok"));
    }

    #[test]
    fn test_entities_decode_amp_last() {
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
    }
}
