//! # TraX Client - Driving External Visual Object Trackers
//!
//! Client side of the TraX protocol: a line-oriented text protocol spoken
//! between an evaluation harness and a visual object tracker running as a
//! separate process.
//!
//! ## Features
//!
//! - **Streaming frame codec**: byte-level parser that tolerates arbitrary
//!   diagnostic output between frames
//! - **Capability negotiation**: HELLO handshake with region format fallback
//! - **Session state machine**: INITIALIZE / FRAME / QUIT with strict reply checks
//! - **Region codec**: rectangles and polygons in the wire text form
//! - **Process transport**: spawn a tracker and log the raw protocol stream
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                            Tracker
//!    |                                |
//!    |<------- HELLO (caps) ---------|
//!    |------- INITIALIZE ----------->|
//!    |<------ STATE -----------------|
//!    |------- FRAME ---------------->|   (repeated)
//!    |<------ STATE -----------------|
//!    |------- QUIT ----------------->|
//! ```
//!
//! ### State Machine
//!
//! ```text
//!              connect()                initialize()
//! [Unestablished] ────────> [Ready] ───────────────> [Initialized]
//!                              │                       │  ^ frame()
//!                              │ quit()                │  │
//!                              v                quit() v ─┘
//!                          [Closed] <──────────────────┘
//! ```
//!
//! Every request blocks until its STATE reply arrives. A protocol violation
//! or I/O failure after a request was sent leaves the session faulted.
//!
//! ## Quick Start
//!
//! ### Parsing a Stream
//!
//! ```rust
//! use std::io::Cursor;
//! use trax::{MessageKind, MessageReader};
//!
//! let input = "loading model...\n@@TRAX:state \"1,2,3,4\" conf=0.9\n";
//! let mut reader = MessageReader::new(Cursor::new(input));
//!
//! let msg = reader.read_message().unwrap().unwrap();
//! assert_eq!(msg.kind(), MessageKind::State);
//! assert_eq!(msg.argument(0), Some("1,2,3,4"));
//! assert_eq!(msg.property("conf"), Some("0.9"));
//! ```
//!
//! ### Tracking With a Spawned Tracker
//!
//! ```rust,ignore
//! use trax::{Config, Image, Properties, Rectangle, Region};
//!
//! let config = Config::load(None)?;
//! let (process, mut session) = trax::transport::spawn_session(&config)?;
//!
//! let region = Region::from(Rectangle::new(10.0, 20.0, 50.0, 40.0));
//! session.initialize(&Image::path("frames/00001.jpg"), &region, &Properties::new())?;
//!
//! let status = session.frame(&Image::path("frames/00002.jpg"), &Properties::new())?;
//! println!("{:?}", status.region);
//!
//! trax::transport::finish_session(process, session, trax::transport::DEFAULT_SHUTDOWN_GRACE)?;
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Frame codec, capabilities and session
//! - [`region`]: Region types and their text codec
//! - [`image`]: Image descriptors
//! - [`transport`]: Tracker process and protocol log tee
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod error;
pub mod image;
pub mod protocol;
pub mod region;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use error::{Result, TraxError};
pub use image::{Image, ImageFormat};
pub use protocol::{
    Capabilities, FrameParser, Message, MessageKind, MessageReader, Properties, Session,
    SessionState, TrackerStatus,
};
pub use region::{Point, Polygon, Rectangle, Region, RegionFormat};
pub use transport::{LogMode, TrackerProcess};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TraX protocol version spoken by this client
pub const PROTOCOL_VERSION: u32 = protocol::DEFAULT_PROTOCOL_VERSION;
