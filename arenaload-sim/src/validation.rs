//! Checks applied to generated content before it reaches the message list.
//!
//! All functions here are pure.

use crate::error::ValidationError;

pub const MAX_PLAYER_NAME_LEN: usize = 30;
pub const MAX_MESSAGE_LEN: usize = 200;

/// Substrings that mark a message as a script injection attempt, matched case-insensitively.
pub const BLOCKED_PATTERNS: [&str; 4] = ["<script", "javascript:", "onload=", "onerror="];

/// Accepts 1 to 30 ASCII letters, digits, spaces, dashes or underscores.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_PLAYER_NAME_LEN {
        return Err(ValidationError::PlayerNameLength {
            len,
            max: MAX_PLAYER_NAME_LEN,
        });
    }

    match name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_')))
    {
        Some(c) => Err(ValidationError::PlayerNameCharacter(c)),
        None => Ok(()),
    }
}

/// Accepts non-empty messages of at most 200 characters without blocked patterns.
pub fn validate_message(message: &str) -> Result<(), ValidationError> {
    let len = message.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyMessage);
    }
    if len > MAX_MESSAGE_LEN {
        return Err(ValidationError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }

    let lower = message.to_lowercase();
    match BLOCKED_PATTERNS.into_iter().find(|p| lower.contains(p)) {
        Some(pattern) => Err(ValidationError::BlockedPattern(pattern)),
        None => Ok(()),
    }
}

/// Escapes `<`, `>`, `"` and `'` for display in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_names() {
        assert_eq!(validate_player_name("Ice_Queen"), Ok(()));
        assert_eq!(validate_player_name("the big-one 2"), Ok(()));
        assert_eq!(validate_player_name(&"a".repeat(30)), Ok(()));

        assert_eq!(
            validate_player_name(""),
            Err(ValidationError::PlayerNameLength { len: 0, max: 30 })
        );
        assert_eq!(
            validate_player_name(&"a".repeat(31)),
            Err(ValidationError::PlayerNameLength { len: 31, max: 30 })
        );
        assert_eq!(
            validate_player_name("bob<script>"),
            Err(ValidationError::PlayerNameCharacter('<'))
        );
        assert_eq!(
            validate_player_name("zoë"),
            Err(ValidationError::PlayerNameCharacter('ë'))
        );
    }

    #[test]
    fn messages() {
        assert_eq!(validate_message("GG everyone! 🎮"), Ok(()));
        assert_eq!(validate_message(&"x".repeat(200)), Ok(()));

        assert_eq!(validate_message(""), Err(ValidationError::EmptyMessage));
        assert_eq!(
            validate_message(&"x".repeat(201)),
            Err(ValidationError::MessageTooLong { len: 201, max: 200 })
        );
        assert_eq!(
            validate_message("hi <SCRIPT>alert(1)</SCRIPT>"),
            Err(ValidationError::BlockedPattern("<script"))
        );
        assert_eq!(
            validate_message("<img OnError=x>"),
            Err(ValidationError::BlockedPattern("onerror="))
        );
        assert_eq!(
            validate_message("click javascript:void(0)"),
            Err(ValidationError::BlockedPattern("javascript:"))
        );
    }

    #[test]
    fn verdicts_are_stable() {
        for input in ["Ice_Queen", "", "<script", "a b-c_d", &"y".repeat(250)] {
            assert_eq!(validate_player_name(input), validate_player_name(input));
            assert_eq!(validate_message(input), validate_message(input));
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<b>"it's"</b>"#),
            "&lt;b&gt;&quot;it&#x27;s&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain & simple"), "plain & simple");
    }
}
