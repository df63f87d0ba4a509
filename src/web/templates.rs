//! HTML for the conversation browser.
//!
//! Handlebars escapes every `{{value}}`, so logged user text and model
//! output cannot inject markup into the page.

use handlebars::Handlebars;
use serde::Serialize;

use crate::store::ConversationRecord;

const MESSAGES_TEMPLATE_NAME: &str = "messages";

const MESSAGES_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Conversation log</title>
</head>
<body>
<h1>Conversation log</h1>
<p>{{count}} record(s), {{order}}</p>
<ul>
{{#each records}}
<li>({{username}}, {{timestamp}}): {{message}}, {{bot_reply}}</li>
{{/each}}
</ul>
</body>
</html>
"#;

#[derive(Serialize)]
struct RecordView<'a> {
    username: &'a str,
    timestamp: String,
    message: &'a str,
    bot_reply: &'a str,
}

#[derive(Serialize)]
struct MessagesPage<'a> {
    count: usize,
    order: &'a str,
    records: Vec<RecordView<'a>>,
}

/// Display form used on the page and in CSV exports.
pub fn display_timestamp(record: &ConversationRecord) -> String {
    record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn templates<'a>() -> Result<Handlebars<'a>, handlebars::TemplateError> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_template_string(MESSAGES_TEMPLATE_NAME, MESSAGES_TEMPLATE)?;
    Ok(registry)
}

pub fn render_messages(
    registry: &Handlebars<'_>,
    records: &[ConversationRecord],
    order: &str,
) -> Result<String, handlebars::RenderError> {
    let page = MessagesPage {
        count: records.len(),
        order,
        records: records
            .iter()
            .map(|r| RecordView {
                username: &r.username,
                timestamp: display_timestamp(r),
                message: &r.message,
                bot_reply: &r.bot_reply,
            })
            .collect(),
    };
    registry.render(MESSAGES_TEMPLATE_NAME, &page)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(username: &str, message: &str, reply: &str) -> ConversationRecord {
        ConversationRecord {
            id: 1,
            user_id: "42".into(),
            username: username.into(),
            message: message.into(),
            bot_reply: reply.into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 45).unwrap(),
        }
    }

    #[test]
    fn renders_record_line() {
        let html = render_messages(
            &templates().unwrap(),
            &[record("Hello", "What is 2+2?", "4")],
            "desc",
        )
        .unwrap();
        assert!(html.contains("<li>(Hello, 2026-03-01 12:30:45): What is 2+2?, 4</li>"), "{html}");
        assert!(html.contains("1 record(s), desc"));
    }

    #[test]
    fn escapes_markup() {
        let html = render_messages(
            &templates().unwrap(),
            &[record("<b>x</b>", "<script>alert(1)</script>", "a & b")],
            "asc",
        )
        .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(html.contains("a &amp; b"));
    }

    #[test]
    fn empty_log_renders() {
        let html = render_messages(&templates().unwrap(), &[], "desc").unwrap();
        assert!(html.contains("0 record(s)"));
        assert!(!html.contains("<li>"));
    }
}
