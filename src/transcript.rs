//! Splitting a note into front matter and conversation turns.
//!
//! A note looks like this:
//!
//! ```text
//! ---
//! model: anthropic@claude-sonnet-4-20250514
//! temperature: 0.2
//! ---
//! What changed in the release?
//!
//! <hr class="__chat_turn">
//! role::assistant
//!
//! Two things...
//! ```
//!
//! Turns are separated by a [`TURN_SEPARATOR`] line. A turn may start with a
//! `role::<name>` line; otherwise roles alternate starting with `user`.

use chat_core::{ConfigLayer, Message, Role};

/// Line that separates two turns.
pub const TURN_SEPARATOR: &str = "<hr class=\"__chat_turn\">";

const ROLE_PREFIX: &str = "role::";
const FRONT_MATTER_FENCE: &str = "---";

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("front matter is not closed with '---'")]
    UnclosedFrontMatter,

    #[error("invalid front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),

    #[error("turn {turn}: {message}")]
    Role { turn: usize, message: String },
}

/// A parsed note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Per-note overrides from the YAML front matter.
    pub front_matter: ConfigLayer,
    pub messages: Vec<Message>,
}

impl Transcript {
    /// Whether the last turn is one the model should answer.
    #[must_use]
    pub fn awaits_reply(&self) -> bool {
        self.messages.last().is_some_and(|m| m.role == Role::User)
    }
}

/// Parse a note.
///
/// # Errors
///
/// Returns an error for unclosed or invalid front matter, or an unknown
/// `role::` marker.
pub fn parse(text: &str) -> Result<Transcript, TranscriptError> {
    let (front_matter, body) = split_front_matter(text)?;
    let front_matter = match front_matter {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)?,
        _ => ConfigLayer::default(),
    };

    let mut messages: Vec<Message> = Vec::new();
    for (index, chunk) in split_turns(body).iter().enumerate() {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }

        let (role, content) = match chunk.strip_prefix(ROLE_PREFIX) {
            Some(rest) => {
                let (name, content) = rest.split_once('\n').unwrap_or((rest, ""));
                let role = name.parse::<Role>().map_err(|message| TranscriptError::Role {
                    turn: index + 1,
                    message,
                })?;
                (role, content.trim())
            }
            None => (next_role(messages.last().map(|m| m.role)), chunk),
        };

        if !content.is_empty() {
            messages.push(Message {
                role,
                content: content.to_string(),
            });
        }
    }

    Ok(Transcript {
        front_matter,
        messages,
    })
}

/// Text appended before the model's reply.
#[must_use]
pub fn reply_header(current: &str) -> String {
    format!("{}{TURN_SEPARATOR}\n{ROLE_PREFIX}assistant\n\n", spacer(current))
}

/// Text appended after the reply so the user can write the next turn.
#[must_use]
pub fn next_turn_header(current: &str) -> String {
    format!("{}{TURN_SEPARATOR}\n{ROLE_PREFIX}user\n\n", spacer(current))
}

fn spacer(current: &str) -> &'static str {
    if current.is_empty() || current.ends_with("\n\n") {
        ""
    } else if current.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    }
}

const fn next_role(previous: Option<Role>) -> Role {
    match previous {
        Some(Role::User) => Role::Assistant,
        _ => Role::User,
    }
}

fn split_front_matter(text: &str) -> Result<(Option<&str>, &str), TranscriptError> {
    let Some(rest) = text
        .strip_prefix(FRONT_MATTER_FENCE)
        .and_then(|r| r.strip_prefix('\n').or_else(|| r.strip_prefix("\r\n")))
    else {
        return Ok((None, text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            return Ok((Some(&rest[..offset]), &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(TranscriptError::UnclosedFrontMatter)
}

fn split_turns(body: &str) -> Vec<String> {
    let mut turns = vec![String::new()];
    for line in body.lines() {
        if line.trim() == TURN_SEPARATOR {
            turns.push(String::new());
        } else if let Some(current) = turns.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_note_is_one_user_turn() {
        let transcript = parse("What is a monad?\n").unwrap();
        assert_eq!(transcript.messages, vec![Message::user("What is a monad?")]);
        assert!(transcript.awaits_reply());
        assert_eq!(transcript.front_matter, ConfigLayer::default());
    }

    #[test]
    fn front_matter_becomes_a_config_layer() {
        let text = "---\nmodel: ollama@llama3.2\ntemperature: 0.2\nsystem_commands:\n  - Be terse.\n---\nHi\n";
        let transcript = parse(text).unwrap();
        assert_eq!(
            transcript.front_matter.model.as_deref(),
            Some("ollama@llama3.2")
        );
        assert_eq!(transcript.front_matter.temperature, Some(0.2));
        assert_eq!(
            transcript.front_matter.system_commands,
            Some(vec!["Be terse.".to_string()])
        );
        assert_eq!(transcript.messages, vec![Message::user("Hi")]);
    }

    #[test]
    fn turns_alternate_unless_marked() {
        let text = format!(
            "Question one\n{TURN_SEPARATOR}\nAnswer one\n{TURN_SEPARATOR}\nrole::system\nStay on topic.\n{TURN_SEPARATOR}\nQuestion two\n"
        );
        let transcript = parse(&text).unwrap();
        let roles: Vec<Role> = transcript.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::System, Role::User]
        );
        assert_eq!(transcript.messages[2].content, "Stay on topic.");
    }

    #[test]
    fn empty_turns_are_skipped() {
        let text = format!("{TURN_SEPARATOR}\nrole::user\n\n{TURN_SEPARATOR}\nrole::user\nHello\n");
        let transcript = parse(&text).unwrap();
        assert_eq!(transcript.messages, vec![Message::user("Hello")]);
    }

    #[test]
    fn unknown_role_is_reported() {
        let text = format!("Hi\n{TURN_SEPARATOR}\nrole::narrator\nOnce upon a time\n");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, TranscriptError::Role { turn: 2, .. }));
    }

    #[test]
    fn unclosed_front_matter_is_an_error() {
        assert!(matches!(
            parse("---\nmodel: gpt-4o\nHi\n"),
            Err(TranscriptError::UnclosedFrontMatter)
        ));
    }

    #[test]
    fn headers_round_trip_through_parse() {
        let mut note = "Hi".to_string();
        note.push_str(&reply_header(&note));
        note.push_str("Hello!\n");
        note.push_str(&next_turn_header(&note));
        assert!(note.starts_with("Hi\n\n<hr class=\"__chat_turn\">\nrole::assistant\n\nHello!\n\n"));

        let transcript = parse(&note).unwrap();
        assert_eq!(
            transcript.messages,
            vec![Message::user("Hi"), Message::assistant("Hello!")]
        );
        assert!(!transcript.awaits_reply());
    }
}
