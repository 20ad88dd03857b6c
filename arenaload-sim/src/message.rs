use std::time::SystemTime;

use arenaload_store::Command;
use serde::{Deserialize, Serialize};

use crate::validation::escape_html;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Achievement,
}

/// An entry of the message list, stored as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub player: String,
    pub message: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    ///
    /// The player name and text are HTML-escaped. Callers validate them beforehand.
    pub fn new(player: &str, message: &str, kind: MessageKind) -> Self {
        Self {
            player: escape_html(player),
            message: escape_html(message),
            timestamp: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
            kind,
        }
    }
}

/// Pushes `value` to the front of a list and trims it to the newest `cap` entries.
///
/// Both commands must go out in one batch.
pub fn capped_push(key: &str, value: String, cap: usize) -> Vec<Command> {
    vec![
        Command::ListPush {
            key: key.to_owned(),
            value,
        },
        Command::ListTrim {
            key: key.to_owned(),
            start: 0,
            stop: cap as isize - 1,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_field() {
        let message = ChatMessage {
            player: "Ice_Queen".into(),
            message: "GG".into(),
            timestamp: "2025-01-01T00:00:00.000Z".into(),
            kind: MessageKind::Achievement,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "player": "Ice_Queen",
                "message": "GG",
                "timestamp": "2025-01-01T00:00:00.000Z",
                "type": "achievement",
            })
        );
    }

    #[test]
    fn new_escapes_content() {
        let message = ChatMessage::new("Ice_Queen", "that's <it>", MessageKind::Chat);
        assert_eq!(message.message, "that&#x27;s &lt;it&gt;");
        assert!(humantime::parse_rfc3339(&message.timestamp).is_ok());
    }
}
