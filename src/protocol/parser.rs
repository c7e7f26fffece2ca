//! Streaming frame parser.
//!
//! The parser is a byte-driven automaton. It scans every line for the
//! frame prefix, drops lines that do not start with it, and decodes the
//! kind, arguments and properties of those that do.
//!
//! ```text
//!            prefix matched              ' '
//! [Prefix] ───────────────> [Kind] ──────────> [Space] <──────────────┐
//!    ^ │ mismatch             │ '\n'        │  │ '"'  │ other       │
//!    │ v                      v             │  v      v             │
//! [Pass] ──'\n'──> ...    complete          │ [Token quoted/bare] ──┘
//!                                           │    │ '\\'   ^
//!                                           │    v        │
//!                                           │ [Escape] ───┘
//! ```
//!
//! A malformed frame is discarded and scanning resumes at the next line.
//! No error ever leaves this module for bad input; only I/O faults do.

use std::io::{self, BufRead};

use super::message::{is_valid_key_bytes, Message, MessageKind, Properties};
use super::FRAME_PREFIX;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Matched this many bytes of the prefix
    Prefix(usize),
    /// Accumulating the kind token
    Kind,
    /// Just closed a quoted token; a separator must follow
    SpaceExpected,
    /// Between tokens
    Space,
    /// Inside a token
    Token { quoted: bool, part: Part },
    /// After a backslash inside a token
    Escape { quoted: bool, part: Part },
    /// Discarding the rest of a line
    Pass,
}

#[derive(Debug)]
struct Pending {
    kind: MessageKind,
    arguments: Vec<String>,
    properties: Properties,
}

impl Pending {
    fn into_message(self) -> Message {
        Message::from_parts(self.kind, self.arguments, self.properties)
    }
}

/// Incremental frame parser
///
/// Feed bytes with [`FrameParser::push`]; a completed frame is returned as
/// soon as its terminating newline arrives.
#[derive(Debug)]
pub struct FrameParser {
    state: State,
    key: Vec<u8>,
    value: Vec<u8>,
    pending: Option<Pending>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create a parser positioned at the start of a line
    pub fn new() -> Self {
        Self {
            state: State::Prefix(0),
            key: Vec::new(),
            value: Vec::new(),
            pending: None,
        }
    }

    /// Whether the parser is in the middle of a frame.
    pub fn in_frame(&self) -> bool {
        self.pending.is_some() || (self.state == State::Kind && !self.key.is_empty())
    }

    /// Consume one byte, returning a message when it completes a frame.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        match self.state {
            State::Prefix(matched) => {
                let prefix = FRAME_PREFIX.as_bytes();
                self.state = if byte == prefix[matched] {
                    if matched + 1 == prefix.len() {
                        self.clear_buffers();
                        State::Kind
                    } else {
                        State::Prefix(matched + 1)
                    }
                } else if byte == b'\n' {
                    State::Prefix(0)
                } else {
                    State::Pass
                };
                None
            },
            State::Kind => {
                if byte.is_ascii_alphanumeric() {
                    self.key.push(byte);
                    return None;
                }
                if byte == b'\r' {
                    return None;
                }
                if byte != b' ' && byte != b'\n' {
                    return self.abort(byte);
                }
                let kind = String::from_utf8_lossy(&self.key).parse::<MessageKind>();
                match kind {
                    Ok(kind) => {
                        self.pending = Some(Pending {
                            kind,
                            arguments: Vec::new(),
                            properties: Properties::new(),
                        });
                        self.clear_buffers();
                        if byte == b'\n' {
                            self.complete()
                        } else {
                            self.state = State::Space;
                            None
                        }
                    },
                    Err(_) => self.abort(byte),
                }
            },
            State::SpaceExpected => match byte {
                b' ' | b'\r' => {
                    self.state = State::Space;
                    None
                },
                b'\n' => self.complete(),
                _ => self.abort(byte),
            },
            State::Space => match byte {
                b' ' | b'\r' => None,
                b'\n' => self.complete(),
                b'"' => {
                    self.clear_buffers();
                    self.state = State::Token {
                        quoted: true,
                        part: Part::Key,
                    };
                    None
                },
                _ => {
                    self.clear_buffers();
                    self.state = State::Token {
                        quoted: false,
                        part: Part::Key,
                    };
                    self.push(byte)
                },
            },
            State::Token { quoted, part } => self.token_byte(quoted, part, byte),
            State::Escape { quoted, part } => {
                match byte {
                    b'\n' => return self.abort(byte),
                    b'n' => self.append(part, b'\n'),
                    other => self.append(part, other),
                }
                self.state = State::Token { quoted, part };
                None
            },
            State::Pass => {
                if byte == b'\n' {
                    self.state = State::Prefix(0);
                }
                None
            },
        }
    }

    /// Signal end of stream.
    ///
    /// A frame already under way is completed as if a newline had arrived.
    pub fn finish(&mut self) -> Option<Message> {
        let message = if self.in_frame() {
            match self.push(b'\n') {
                Some(message) => Some(message),
                None => self.pending.take().map(Pending::into_message),
            }
        } else {
            None
        };
        self.reset();
        message
    }

    /// Drop any partial frame and return to the start-of-line state.
    pub fn reset(&mut self) {
        self.state = State::Prefix(0);
        self.pending = None;
        self.clear_buffers();
    }

    fn token_byte(&mut self, quoted: bool, part: Part, byte: u8) -> Option<Message> {
        match byte {
            b'\\' => {
                self.state = State::Escape { quoted, part };
                None
            },
            b'"' if quoted => {
                self.finish_token(part);
                self.state = State::SpaceExpected;
                None
            },
            b' ' if !quoted => {
                self.finish_token(part);
                self.state = State::Space;
                None
            },
            b'\n' if !quoted => {
                self.finish_token(part);
                self.complete()
            },
            b'=' if part == Part::Key && is_valid_key_bytes(&self.key) => {
                self.state = State::Token {
                    quoted,
                    part: Part::Value,
                };
                None
            },
            other => {
                self.append(part, other);
                None
            },
        }
    }

    fn append(&mut self, part: Part, byte: u8) {
        match part {
            Part::Key => self.key.push(byte),
            Part::Value => self.value.push(byte),
        }
    }

    fn finish_token(&mut self, part: Part) {
        let key = String::from_utf8_lossy(&self.key).into_owned();
        if let Some(pending) = self.pending.as_mut() {
            match part {
                Part::Key => pending.arguments.push(key),
                Part::Value => {
                    let value = String::from_utf8_lossy(&self.value).into_owned();
                    pending.properties.insert(key, value);
                },
            }
        }
        self.clear_buffers();
    }

    fn complete(&mut self) -> Option<Message> {
        self.state = State::Prefix(0);
        self.clear_buffers();
        self.pending.take().map(Pending::into_message)
    }

    fn abort(&mut self, byte: u8) -> Option<Message> {
        tracing::trace!(state = ?self.state, "dropping malformed frame");
        self.pending = None;
        self.clear_buffers();
        self.state = if byte == b'\n' {
            State::Prefix(0)
        } else {
            State::Pass
        };
        None
    }

    fn clear_buffers(&mut self) {
        self.key.clear();
        self.value.clear();
    }
}

/// Reads whole messages from a buffered byte stream
///
/// Bytes are consumed exactly up to the end of each frame, so the reader
/// can be used for the whole life of a session.
#[derive(Debug)]
pub struct MessageReader<R> {
    reader: R,
    parser: FrameParser,
}

impl<R: BufRead> MessageReader<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: FrameParser::new(),
        }
    }

    /// Block until the next frame, or `None` at end of stream.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            let (used, message) = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };

                if buf.is_empty() {
                    let message = self.parser.finish();
                    if let Some(ref m) = message {
                        tracing::debug!(kind = %m.kind(), "received frame at end of stream");
                    }
                    return Ok(message);
                }

                let mut used = buf.len();
                let mut message = None;
                for (i, &byte) in buf.iter().enumerate() {
                    if let Some(m) = self.parser.push(byte) {
                        used = i + 1;
                        message = Some(m);
                        break;
                    }
                }
                (used, message)
            };

            self.reader.consume(used);

            if let Some(message) = message {
                tracing::debug!(
                    kind = %message.kind(),
                    arguments = message.argument_count(),
                    "received frame"
                );
                return Ok(Some(message));
            }
        }
    }

    /// Underlying reader
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> Iterator for MessageReader<R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_message().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_all(input: &str) -> Vec<Message> {
        MessageReader::new(Cursor::new(input.as_bytes().to_vec()))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn parse_one(input: &str) -> Message {
        let mut messages = parse_all(input);
        assert_eq!(messages.len(), 1, "expected one frame in {:?}", input);
        messages.remove(0)
    }

    #[test]
    fn test_hello_handshake() {
        let msg = parse_one(
            "@@TRAX:hello \"trax.version=1\" \"trax.region=rectangle;polygon\" \"trax.image=path\"\n",
        );
        assert_eq!(msg.kind(), MessageKind::Hello);
        assert_eq!(msg.argument_count(), 0);
        assert_eq!(msg.property("trax.version"), Some("1"));
        assert_eq!(msg.property("trax.region"), Some("rectangle;polygon"));
        assert_eq!(msg.property("trax.image"), Some("path"));
    }

    #[test]
    fn test_zero_argument_frame() {
        let msg = parse_one("@@TRAX:quit\n");
        assert_eq!(msg.kind(), MessageKind::Quit);
        assert!(msg.arguments().is_empty());
        assert!(msg.properties().is_empty());
    }

    #[test]
    fn test_kind_case_insensitive() {
        assert_eq!(parse_one("@@TRAX:STATE \"1,2,3,4\"\n").kind(), MessageKind::State);
    }

    #[test]
    fn test_unquoted_tokens() {
        let msg = parse_one("@@TRAX:state 1,2,3,4 conf=0.5 extra\n");
        assert_eq!(msg.arguments(), &["1,2,3,4".to_string(), "extra".to_string()]);
        assert_eq!(msg.property("conf"), Some("0.5"));
    }

    #[test]
    fn test_equals_in_non_key_token_is_content() {
        let msg = parse_one("@@TRAX:frame \"a b=c\" x-y=z \"k=v=w\"\n");
        assert_eq!(msg.arguments(), &["a b=c".to_string(), "x-y=z".to_string()]);
        assert_eq!(msg.property("k"), Some("v=w"));
    }

    #[test]
    fn test_key_too_long_is_argument() {
        let msg = parse_one("@@TRAX:frame \"abcdefghijklmnopq=1\"\n");
        assert_eq!(msg.argument(0), Some("abcdefghijklmnopq=1"));
        assert!(msg.properties().is_empty());
    }

    #[test]
    fn test_escapes() {
        let msg = parse_one("@@TRAX:state \"a\\\"b\\\\c\\nd\\q\" k=x\\ y\n");
        assert_eq!(msg.argument(0), Some("a\"b\\c\ndq"));
        assert_eq!(msg.property("k"), Some("x y"));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let msg = parse_one("@@TRAX:state \"k=1\" \"k=2\"\n");
        assert_eq!(msg.property("k"), Some("2"));
    }

    #[test]
    fn test_resync_after_garbage_line() {
        let messages = parse_all("loading model...\n@@TRAX:state \"1,2,3,4\"\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].argument(0), Some("1,2,3,4"));
    }

    #[test]
    fn test_prefix_not_at_line_start_is_ignored() {
        let messages = parse_all("log: @@TRAX:quit\n@@TRAX:frame \"x\"\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Frame);
    }

    #[test]
    fn test_unknown_kind_skips_only_that_frame() {
        let messages = parse_all("@@TRAX:status \"x\"\n@@TRAX:bogus\n@@TRAX:quit\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Quit);
    }

    #[test]
    fn test_escaped_newline_aborts_frame() {
        let messages = parse_all("@@TRAX:state \"1,2\\\n3,4\"\n@@TRAX:quit\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Quit);
    }

    #[test]
    fn test_garbage_after_quoted_token_aborts_frame() {
        let messages = parse_all("@@TRAX:state \"a\"b\n@@TRAX:quit\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Quit);
    }

    #[test]
    fn test_quoted_token_spans_newline() {
        let msg = parse_one("@@TRAX:state \"line1\nline2\"\n");
        assert_eq!(msg.argument(0), Some("line1\nline2"));
    }

    #[test]
    fn test_crlf_terminated() {
        let msg = parse_one("@@TRAX:state \"1,2,3,4\" \r\n");
        assert_eq!(msg.argument_count(), 1);
    }

    #[test]
    fn test_crlf_without_trailing_space() {
        let messages = parse_all("@@TRAX:quit\r\n@@TRAX:state \"1,2,3,4\"\r\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind(), MessageKind::Quit);
        assert_eq!(messages[1].argument(0), Some("1,2,3,4"));
    }

    #[test]
    fn test_eof_completes_started_frame() {
        let msg = parse_one("@@TRAX:state \"1,2,3,4\" k=v");
        assert_eq!(msg.argument(0), Some("1,2,3,4"));
        assert_eq!(msg.property("k"), Some("v"));

        assert_eq!(parse_one("@@TRAX:quit").kind(), MessageKind::Quit);
    }

    #[test]
    fn test_eof_drops_unterminated_quote() {
        let msg = parse_one("@@TRAX:state \"1,2,3,4\" \"open");
        assert_eq!(msg.arguments(), &["1,2,3,4".to_string()]);
    }

    #[test]
    fn test_eof_without_frame() {
        assert!(parse_all("").is_empty());
        assert!(parse_all("just text\n@@TR").is_empty());
        assert!(parse_all("@@TRAX:state \"x\\").is_empty());
    }

    #[test]
    fn test_reader_stops_at_frame_boundary() {
        let mut reader = MessageReader::new(Cursor::new(
            b"@@TRAX:quit\nremaining bytes".to_vec(),
        ));
        assert!(reader.read_message().unwrap().is_some());
        assert_eq!(reader.get_ref().position(), 12);
    }

    #[test]
    fn test_push_api() {
        let mut parser = FrameParser::new();
        let mut out = None;
        for &b in b"@@TRAX:frame \"img\"\n" {
            if let Some(m) = parser.push(b) {
                out = Some(m);
            }
        }
        assert_eq!(out.unwrap().argument(0), Some("img"));
        assert!(!parser.in_frame());
    }
}
