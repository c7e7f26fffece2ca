//! Protocol messages and their canonical wire serialization.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

use super::{FRAME_PREFIX, MAX_KEY_LENGTH};
use crate::error::{Result, TraxError};
use crate::image::Image;
use crate::region::Region;

/// Key/value properties carried by a message
pub type Properties = BTreeMap<String, String>;

/// Message kinds in the TraX protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Start tracking on a ground-truth region
    Initialize,
    /// Track on the next image
    Frame,
    /// Tracker reply carrying the current region
    State,
    /// End of session
    Quit,
    /// Tracker handshake with capabilities
    Hello,
}

impl MessageKind {
    /// Lowercase wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Frame => "frame",
            Self::State => "state",
            Self::Quit => "quit",
            Self::Hello => "hello",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initialize" => Ok(Self::Initialize),
            "frame" => Ok(Self::Frame),
            "state" => Ok(Self::State),
            "quit" => Ok(Self::Quit),
            "hello" => Ok(Self::Hello),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

/// Check whether `key` may be used as a property key.
///
/// Keys are 1-16 characters from `[A-Za-z0-9._]`.
pub fn is_valid_key(key: &str) -> bool {
    is_valid_key_bytes(key.as_bytes())
}

pub(crate) fn is_valid_key_bytes(key: &[u8]) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
}

/// A complete protocol frame
///
/// Messages are immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    kind: MessageKind,
    arguments: Vec<String>,
    properties: Properties,
}

impl Message {
    /// Create an empty message of the given kind
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            arguments: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub(crate) fn from_parts(
        kind: MessageKind,
        arguments: Vec<String>,
        properties: Properties,
    ) -> Self {
        Self {
            kind,
            arguments,
            properties,
        }
    }

    /// Append a positional argument
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Set a property, replacing any earlier value for the key.
    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Result<Self> {
        if !is_valid_key(key) {
            return Err(TraxError::InvalidProperty(key.to_string()));
        }
        self.properties.insert(key.to_string(), value.into());
        Ok(self)
    }

    /// Merge a property map into the message.
    pub fn with_properties(self, properties: &Properties) -> Result<Self> {
        properties
            .iter()
            .try_fold(self, |msg, (key, value)| msg.with_property(key, value.as_str()))
    }

    /// Create an INITIALIZE request
    pub fn initialize(image: &Image, region: &Region, properties: &Properties) -> Result<Self> {
        Self::new(MessageKind::Initialize)
            .with_argument(image.wire_form())
            .with_argument(region.to_string())
            .with_properties(properties)
    }

    /// Create a FRAME request
    pub fn frame(image: &Image, properties: &Properties) -> Result<Self> {
        Self::new(MessageKind::Frame)
            .with_argument(image.wire_form())
            .with_properties(properties)
    }

    /// Create a QUIT request
    pub fn quit(properties: &Properties) -> Result<Self> {
        Self::new(MessageKind::Quit).with_properties(properties)
    }

    /// Create a STATE reply (tracker side)
    pub fn state(region: &Region, properties: &Properties) -> Result<Self> {
        Self::new(MessageKind::State)
            .with_argument(region.to_string())
            .with_properties(properties)
    }

    /// Create a HELLO handshake (tracker side)
    pub fn hello(properties: &Properties) -> Result<Self> {
        Self::new(MessageKind::Hello).with_properties(properties)
    }

    /// Message kind
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Positional argument at `index`
    pub fn argument(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).map(String::as_str)
    }

    /// All positional arguments in order
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Number of positional arguments
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Property value for `key`
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether `key` is set
    pub fn contains_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// All properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Serialize to the canonical wire form, newline included.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(FRAME_PREFIX);
        out.push_str(self.kind.name());
        out.push(' ');

        for arg in &self.arguments {
            out.push('"');
            out.push_str(&escape_argument(arg));
            out.push_str("\" ");
        }

        for (key, value) in &self.properties {
            out.push('"');
            out.push_str(key);
            out.push('=');
            out.push_str(&escape(value));
            out.push_str("\" ");
        }

        out.push('\n');
        out
    }

    /// Write the frame and flush, so the peer sees it immediately.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.to_wire().as_bytes())?;
        writer.flush()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire().trim_end_matches('\n'))
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// An argument that looks like `key=value` would be read back as a
// property, so its first `=` is escaped.
fn escape_argument(arg: &str) -> String {
    let escaped = escape(arg);
    match arg.find('=') {
        Some(pos) if is_valid_key(&arg[..pos]) => escaped.replacen('=', "\\=", 1),
        _ => escaped,
    }
}
