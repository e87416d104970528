//! Transcript presenter

use std::io::Write;

use crate::types::Message;

/// `[role]: text` for every text item, in transcript order.
/// Images, tool traces, and unknown content kinds are skipped.
pub fn transcript_lines(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .flat_map(|m| {
            m.content
                .iter()
                .filter_map(move |item| item.as_text().map(|text| format!("[{}]: {}", m.role, text)))
        })
        .collect()
}

/// Write the transcript to `out`, returning the number of lines written
pub fn render<W: Write>(messages: &[Message], out: &mut W) -> std::io::Result<usize> {
    let lines = transcript_lines(messages);
    for line in &lines {
        writeln!(out, "{}", line)?;
    }
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, ImageFile, MessageRole};

    fn message(id: &str, role: MessageRole, content: Vec<ContentItem>) -> Message {
        Message {
            id: id.to_string(),
            thread_id: "thread_1".to_string(),
            role,
            content,
            created_at: None,
        }
    }

    #[test]
    fn test_render_skips_image_message() {
        let messages = vec![
            message("msg_1", MessageRole::Agent, vec![ContentItem::text("Priority: High")]),
            message(
                "msg_2",
                MessageRole::Agent,
                vec![ContentItem::ImageFile {
                    image_file: ImageFile {
                        file_id: "file_1".to_string(),
                    },
                }],
            ),
        ];

        let mut out = Vec::new();
        let written = render(&messages, &mut out).unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "[agent]: Priority: High\n");
    }

    #[test]
    fn test_lines_keep_order_and_roles() {
        let messages = vec![
            message("msg_1", MessageRole::User, vec![ContentItem::text("Login broken")]),
            message(
                "msg_2",
                MessageRole::Agent,
                vec![
                    ContentItem::text("Priority: High"),
                    ContentItem::Unsupported,
                    ContentItem::text("Team: Backend"),
                ],
            ),
        ];
        assert_eq!(
            transcript_lines(&messages),
            vec![
                "[user]: Login broken".to_string(),
                "[agent]: Priority: High".to_string(),
                "[agent]: Team: Backend".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_transcript() {
        let mut out = Vec::new();
        assert_eq!(render(&[], &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
