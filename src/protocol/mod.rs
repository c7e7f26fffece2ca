//! TraX protocol framing, negotiation and client session.
//!
//! The tracker speaks a line-oriented text protocol over its stdin/stdout.
//! Every protocol line starts with a fixed marker; any other line is
//! ignored, so trackers may freely print diagnostics on the same stream.
//!
//! ## Frame Format
//!
//! ```text
//! @@TRAX:<kind> ["<arg>"]* ["<key>=<value>"]*\n
//! ```
//!
//! | Kind         | Direction        | Arguments                    |
//! |--------------|------------------|------------------------------|
//! | `hello`      | Tracker→Client   | none, capabilities as props  |
//! | `initialize` | Client→Tracker   | image, ground-truth region   |
//! | `frame`      | Client→Tracker   | image                        |
//! | `state`      | Tracker→Client   | predicted region             |
//! | `quit`       | Client→Tracker   | none                         |
//!
//! Tokens are quoted or bare. Inside a token, `\"`, `\\` and `\n` are
//! escapes, and a `key=value` split applies only when `key` is a valid
//! property key (1-16 characters from `[A-Za-z0-9._]`).
//!
//! ## Session Flow
//!
//! ```text
//! Client                            Tracker
//!    |                                |
//!    |<------- HELLO (caps) ---------|  Capabilities, once
//!    |                                |
//!    |------- INITIALIZE ----------->|  Image + ground truth
//!    |<------ STATE -----------------|  Region
//!    |                                |
//!    |------- FRAME ---------------->|  Repeated per image
//!    |<------ STATE -----------------|
//!    |                                |
//!    |------- QUIT ----------------->|  No reply
//! ```

mod capabilities;
mod message;
mod parser;
mod session;

pub use capabilities::Capabilities;
pub use message::{is_valid_key, Message, MessageKind, Properties};
pub use parser::{FrameParser, MessageReader};
pub use session::{Session, SessionState, TrackerStatus};

/// Marker that starts every protocol line
pub const FRAME_PREFIX: &str = "@@TRAX:";

/// Maximum length of a property key
pub const MAX_KEY_LENGTH: usize = 16;

/// Protocol version assumed when the tracker does not announce one
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Handshake property: protocol version
pub const PROP_VERSION: &str = "trax.version";
/// Handshake property: `;`-separated region formats
pub const PROP_REGION: &str = "trax.region";
/// Handshake property: `;`-separated image formats
pub const PROP_IMAGE: &str = "trax.image";
/// Handshake property: tracker name
pub const PROP_NAME: &str = "trax.name";
/// Handshake property: tracker identifier
pub const PROP_IDENTIFIER: &str = "trax.identifier";
