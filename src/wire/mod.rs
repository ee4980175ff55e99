//! Line-oriented, pipe-delimited wire protocol (§6).
//!
//! A message is one text line, newline-terminated:
//! `COMMAND|FILENAME|CONTENT|TIMESTAMP|CLIENT_ID`. The `CONTENT` field is
//! escaped independently of the other fields so it may itself contain `|`
//! or newlines.

mod command;
mod escape;

pub use command::Command;
pub use escape::{escape_content, unescape_content};

use std::fmt;

/// A parsed wire frame: command plus its four pipe-delimited fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub filename: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<String>,
    pub client_id: Option<String>,
}

/// Errors produced while parsing a line into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self { command, filename: None, content: None, timestamp: None, client_id: None }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Parses a single line (without its trailing newline) into a `Frame`.
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        if line.is_empty() {
            return Err(FrameError::Empty);
        }
        let mut fields = split_unescaped(line, 5);
        let command_str = fields.next().ok_or(FrameError::Empty)?;
        let command = Command::parse(command_str)
            .ok_or_else(|| FrameError::UnknownCommand(command_str.to_string()))?;
        let filename = non_empty(fields.next());
        // An empty raw CONTENT field encodes the absent value, per §6; a
        // non-empty raw field is unescaped even if it decodes to "".
        let content = non_empty(fields.next()).map(|raw| unescape_content(&raw));
        let timestamp = non_empty(fields.next());
        let client_id = non_empty(fields.next());
        Ok(Self { command, filename, content, timestamp, client_id })
    }

    /// Serializes this frame as a single line, without a trailing newline.
    pub fn serialize(&self) -> String {
        let content = self.content.as_deref().map(escape_content).unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.command,
            self.filename.as_deref().unwrap_or(""),
            content,
            self.timestamp.as_deref().unwrap_or(""),
            self.client_id.as_deref().unwrap_or(""),
        )
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field.filter(|s| !s.is_empty()).map(|s| s.to_string())
}

/// Splits `line` on unescaped `|` into at most `max_fields` pieces. A `|`
/// preceded by an odd number of backslashes is considered escaped and is
/// not a field boundary; this is only used to find the CONTENT field's
/// extent, so the content field's own escaping is re-applied by the caller
/// via [`unescape_content`].
fn split_unescaped(line: &str, max_fields: usize) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::with_capacity(max_fields);
    let bytes = line.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    let mut backslashes = 0usize;
    while i < bytes.len() && pieces.len() + 1 < max_fields {
        match bytes[i] {
            b'\\' => backslashes += 1,
            b'|' if backslashes % 2 == 0 => {
                pieces.push(&line[start..i]);
                start = i + 1;
                backslashes = 0;
            }
            _ => backslashes = 0,
        }
        i += 1;
    }
    pieces.push(&line[start..]);
    pieces.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trip_s6() {
        let raw = "A|B\nC\\D";
        let escaped = escape_content(raw);
        assert_eq!(escaped, "A\\|B\\nC\\\\D");
        assert_eq!(unescape_content(&escaped), raw);
    }

    #[test]
    fn frame_round_trip_with_pipe_in_content() {
        let frame = Frame::new(Command::Write)
            .with_filename("a.txt")
            .with_content("A|B\nC\\D")
            .with_timestamp("123")
            .with_client_id("c1");
        let line = frame.serialize();
        let parsed = Frame::parse(&line).expect("parses");
        assert_eq!(parsed, frame);
    }

    #[test]
    fn empty_fields_round_trip_as_absent() {
        let frame = Frame::new(Command::List);
        let line = frame.serialize();
        assert_eq!(line, "LIST||||");
        let parsed = Frame::parse(&line).expect("parses");
        assert_eq!(parsed.filename, None);
        assert_eq!(parsed.content, None);
    }

    #[test]
    fn unknown_command_is_protocol_error() {
        assert_eq!(
            Frame::parse("BOGUS|a.txt|||"),
            Err(FrameError::UnknownCommand("BOGUS".to_string()))
        );
    }

    #[test]
    fn empty_line_is_empty_error() {
        assert_eq!(Frame::parse(""), Err(FrameError::Empty));
    }
}
