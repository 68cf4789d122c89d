//! Normalizes raw Gmail messages into `ParsedEmail` records.
//!
//! The parser never fails the pipeline: malformed MIME structures degrade
//! to empty bodies rather than returning errors.

use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart};
use regex::Regex;
use shared_types::{EmailAddress, ParsedEmail};
use std::sync::OnceLock;

/// Character budget for text handed to the classifier/embedder.
const AI_TEXT_LIMIT: usize = 10_000;
/// Snippet length when the provider supplies none.
const SNIPPET_LIMIT: usize = 200;

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap())
}

fn script_iframe_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|iframe)\b.*?</(script|iframe)>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn img_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap())
}

fn pixel_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\b(width|height)\s*=\s*["']?1["'\s/>]"#).unwrap())
}

/// Parse a full Gmail message into the normalized record the rest of the
/// pipeline consumes.
pub fn parse_message(message: &Message) -> ParsedEmail {
    let subject = header_value(message, "Subject").to_string();
    let from = parse_address(header_value(message, "From"));
    let to = header_value(message, "To").to_string();
    let date = DateTime::parse_from_rfc2822(header_value(message, "Date"))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let mut html_body = None;
    let mut plain_body = None;
    if let Some(payload) = &message.payload {
        collect_bodies(payload, &mut html_body, &mut plain_body);
    }

    let html_body = html_body.unwrap_or_default();
    let mut plain_body = plain_body.unwrap_or_default();

    // No plain part: derive one from the HTML
    if plain_body.is_empty() && !html_body.is_empty() {
        plain_body = html_to_plain(&html_body);
    }

    let snippet = match message.snippet.as_deref() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => truncate_chars(&plain_body, SNIPPET_LIMIT).to_string(),
    };

    let has_images = html_body.contains("<img") || html_body.contains("background-image");

    ParsedEmail {
        subject,
        from,
        to,
        date,
        html_body,
        plain_body,
        snippet,
        has_images,
    }
}

/// Case-insensitive header lookup; missing headers read as empty.
fn header_value<'a>(message: &'a Message, name: &str) -> &'a str {
    message
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .and_then(|headers| {
            headers.iter().find(|h| {
                h.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        })
        .and_then(|h| h.value.as_deref())
        .unwrap_or("")
}

/// Parse a sender header like `"John Doe" <john@example.com>`.
///
/// A bare address with no angle brackets yields the whole header as the
/// email and an empty name.
pub fn parse_address(header: &str) -> EmailAddress {
    let header = header.trim();

    if let (Some(start), Some(end)) = (header.rfind('<'), header.rfind('>')) {
        if start < end {
            let email = header[start + 1..end].trim().to_string();
            let name = header[..start].trim().trim_matches('"').trim().to_string();
            return EmailAddress { email, name };
        }
    }

    EmailAddress {
        email: header.to_string(),
        name: String::new(),
    }
}

/// Recursive MIME walk collecting the first text/html and first text/plain
/// bodies. Part data arrives already base64url-decoded.
fn collect_bodies(part: &MessagePart, html: &mut Option<String>, plain: &mut Option<String>) {
    let data = part.body.as_ref().and_then(|b| b.data.as_ref());

    match part.mime_type.as_deref() {
        Some("text/html") if html.is_none() => {
            if let Some(decoded) = data.and_then(|d| String::from_utf8(d.clone()).ok()) {
                *html = Some(decoded);
            }
        }
        Some("text/plain") if plain.is_none() => {
            if let Some(decoded) = data.and_then(|d| String::from_utf8(d.clone()).ok()) {
                *plain = Some(decoded);
            }
        }
        _ => {}
    }

    if let Some(parts) = &part.parts {
        for nested in parts {
            collect_bodies(nested, html, plain);
        }
    }
}

/// Flatten HTML to text: drop script/style blocks, strip remaining tags,
/// collapse whitespace.
pub fn html_to_plain(html: &str) -> String {
    let without_blocks = script_style_re().replace_all(html, " ");
    let without_tags = tag_re().replace_all(&without_blocks, " ");
    let without_brackets: String = without_tags
        .chars()
        .map(|c| if c == '<' || c == '>' { ' ' } else { c })
        .collect();

    without_brackets.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenate subject and plain body for AI analysis, bounded to the
/// fixed character budget.
pub fn extract_text_for_ai(parsed: &ParsedEmail) -> String {
    let text = format!("{}\n\n{}", parsed.subject, parsed.plain_body);
    truncate_chars(&text, AI_TEXT_LIMIT).to_string()
}

/// Scrub HTML before persisting: drops script/iframe blocks and 1x1
/// tracking-pixel images.
pub fn clean_html(html: &str) -> String {
    let without_blocks = script_iframe_re().replace_all(html, "");
    img_tag_re()
        .replace_all(&without_blocks, |caps: &regex::Captures<'_>| {
            let tag = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            if pixel_attr_re().is_match(tag) {
                String::new()
            } else {
                tag.to_string()
            }
        })
        .into_owned()
}

/// Truncate to at most `max_chars` characters on a char boundary. A no-op
/// for shorter input.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePartBody, MessagePartHeader};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn text_part(mime: &str, body: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessagePartBody {
                data: Some(body.as_bytes().to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn message_with(headers: Vec<MessagePartHeader>, parts: Vec<MessagePart>) -> Message {
        Message {
            payload: Some(MessagePart {
                mime_type: Some("multipart/alternative".to_string()),
                headers: Some(headers),
                parts: Some(parts),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let msg = message_with(
            vec![header("SUBJECT", "Flash Sale"), header("from", "a@b.com")],
            vec![],
        );

        let parsed = parse_message(&msg);
        assert_eq!(parsed.subject, "Flash Sale");
        assert_eq!(parsed.from.email, "a@b.com");
    }

    #[test]
    fn parses_quoted_display_name() {
        let addr = parse_address("\"Jane Founder\" <jane@startup.io>");
        assert_eq!(addr.name, "Jane Founder");
        assert_eq!(addr.email, "jane@startup.io");
    }

    #[test]
    fn parses_unquoted_display_name() {
        let addr = parse_address("Jane Founder <jane@startup.io>");
        assert_eq!(addr.name, "Jane Founder");
        assert_eq!(addr.email, "jane@startup.io");
    }

    #[test]
    fn bare_address_has_empty_name() {
        let addr = parse_address("jane@startup.io");
        assert_eq!(addr.email, "jane@startup.io");
        assert_eq!(addr.name, "");
    }

    #[test]
    fn angle_brackets_without_name() {
        let addr = parse_address("<jane@startup.io>");
        assert_eq!(addr.email, "jane@startup.io");
        assert_eq!(addr.name, "");
    }

    #[test]
    fn derived_plain_text_has_no_markup() {
        let html = "<html><head><style>.a { color: red; }</style></head>\
                    <body><script>track();</script><p>Hello <b>there</b></p>\
                    <div>Shop   now</div></body></html>";
        let msg = message_with(
            vec![header("Subject", "Hi")],
            vec![text_part("text/html", html)],
        );

        let parsed = parse_message(&msg);
        assert!(!parsed.plain_body.contains('<'));
        assert!(!parsed.plain_body.contains('>'));
        assert!(!parsed.plain_body.contains("track()"));
        assert!(!parsed.plain_body.contains("color: red"));
        assert_eq!(parsed.plain_body, "Hello there Shop now");
    }

    #[test]
    fn explicit_plain_part_wins_over_derivation() {
        let msg = message_with(
            vec![],
            vec![
                text_part("text/plain", "plain version"),
                text_part("text/html", "<p>html version</p>"),
            ],
        );

        let parsed = parse_message(&msg);
        assert_eq!(parsed.plain_body, "plain version");
        assert_eq!(parsed.html_body, "<p>html version</p>");
    }

    #[test]
    fn first_part_of_each_type_wins_in_nested_multipart() {
        let nested = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: Some(vec![
                text_part("text/plain", "first plain"),
                text_part("text/html", "<p>first html</p>"),
            ]),
            ..Default::default()
        };
        let msg = message_with(
            vec![],
            vec![nested, text_part("text/plain", "second plain")],
        );

        let parsed = parse_message(&msg);
        assert_eq!(parsed.plain_body, "first plain");
        assert_eq!(parsed.html_body, "<p>first html</p>");
    }

    #[test]
    fn provider_snippet_preferred() {
        let mut msg = message_with(vec![], vec![text_part("text/plain", "body text")]);
        msg.snippet = Some("provider snippet".to_string());

        let parsed = parse_message(&msg);
        assert_eq!(parsed.snippet, "provider snippet");
    }

    #[test]
    fn snippet_falls_back_to_first_200_chars() {
        let long_body = "x".repeat(500);
        let msg = message_with(vec![], vec![text_part("text/plain", &long_body)]);

        let parsed = parse_message(&msg);
        assert_eq!(parsed.snippet.chars().count(), 200);
    }

    #[test]
    fn detects_images() {
        let with_img = message_with(
            vec![],
            vec![text_part("text/html", "<img src=\"banner.png\">")],
        );
        assert!(parse_message(&with_img).has_images);

        let with_bg = message_with(
            vec![],
            vec![text_part(
                "text/html",
                "<div style=\"background-image: url(x.png)\">hi</div>",
            )],
        );
        assert!(parse_message(&with_bg).has_images);

        let without = message_with(vec![], vec![text_part("text/html", "<p>no pictures</p>")]);
        assert!(!parse_message(&without).has_images);
    }

    #[test]
    fn missing_payload_yields_empty_record() {
        let parsed = parse_message(&Message::default());
        assert_eq!(parsed.subject, "");
        assert_eq!(parsed.html_body, "");
        assert_eq!(parsed.plain_body, "");
        assert!(!parsed.has_images);
    }

    #[test]
    fn ai_text_is_bounded() {
        let parsed = ParsedEmail {
            subject: "s".repeat(100),
            from: EmailAddress {
                email: "a@b.com".to_string(),
                name: String::new(),
            },
            to: String::new(),
            date: Utc::now(),
            html_body: String::new(),
            plain_body: "b".repeat(20_000),
            snippet: String::new(),
            has_images: false,
        };

        let text = extract_text_for_ai(&parsed);
        assert_eq!(text.chars().count(), AI_TEXT_LIMIT);
        assert!(text.starts_with(&parsed.subject));
    }

    #[test]
    fn truncation_is_noop_on_short_input() {
        assert_eq!(truncate_chars("short", 10_000), "short");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld".repeat(50);
        let truncated = truncate_chars(&s, 100);
        assert_eq!(truncated.chars().count(), 100);
    }

    #[test]
    fn clean_html_strips_scripts_and_iframes() {
        let html = "<p>keep</p><script>evil()</script><iframe src=\"x\">frame</iframe>";
        let cleaned = clean_html(html);
        assert_eq!(cleaned, "<p>keep</p>");
    }

    #[test]
    fn clean_html_strips_tracking_pixels() {
        let html = "<img src=\"track.gif\" width=\"1\" height=\"1\">\
                    <img src=\"hero.png\" width=\"600\">";
        let cleaned = clean_html(html);
        assert!(!cleaned.contains("track.gif"));
        assert!(cleaned.contains("hero.png"));
    }

    #[test]
    fn parses_rfc2822_date() {
        let msg = message_with(
            vec![header("Date", "Tue, 1 Jul 2025 10:52:37 +0200")],
            vec![],
        );

        let parsed = parse_message(&msg);
        assert_eq!(parsed.date.to_rfc3339(), "2025-07-01T08:52:37+00:00");
    }
}
