//! Client session with a tracker process.
//!
//! A session owns both ends of the tracker stream. Every request writes one
//! frame and blocks for exactly one reply; there is no pipelining and no
//! timeout. Wrap the transport if bounded latency is needed.

use std::io::{BufReader, Read, Write};

use serde::Serialize;

use super::capabilities::Capabilities;
use super::message::{Message, MessageKind, Properties};
use super::parser::MessageReader;
use crate::error::{Result, TraxError};
use crate::image::{Image, ImageFormat};
use crate::region::{Region, RegionFormat};

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Handshake not yet read
    Unestablished,
    /// Handshake done, waiting for INITIALIZE
    Ready,
    /// Tracker initialized, FRAME requests allowed
    Initialized,
    /// QUIT sent
    Closed,
}

/// Tracker reply to INITIALIZE or FRAME
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerStatus {
    /// Reported region, `None` when the reply could not be decoded as one
    pub region: Option<Region>,
    /// Additional properties reported by the tracker
    pub properties: Properties,
}

/// TraX client session
pub struct Session<R, W> {
    reader: MessageReader<BufReader<R>>,
    writer: W,
    capabilities: Capabilities,
    state: SessionState,
    faulted: bool,
}

impl<R: Read, W: Write> Session<R, W> {
    /// Connect over a tracker's output and input streams.
    ///
    /// Reads the tracker's HELLO before returning.
    pub fn connect(reader: R, writer: W) -> Result<Self> {
        let mut session = Self {
            reader: MessageReader::new(BufReader::new(reader)),
            writer,
            capabilities: Capabilities::default(),
            state: SessionState::Unestablished,
            faulted: false,
        };
        session.handshake()?;
        Ok(session)
    }

    fn handshake(&mut self) -> Result<()> {
        let hello = self
            .reader
            .read_message()?
            .ok_or_else(|| TraxError::Handshake("Tracker closed the stream before HELLO".into()))?;

        self.capabilities = Capabilities::from_hello(&hello)?;
        self.state = SessionState::Ready;

        tracing::debug!(
            version = self.capabilities.version,
            name = self.capabilities.name.as_deref().unwrap_or("-"),
            regions = ?self.capabilities.regions,
            images = ?self.capabilities.images,
            "handshake complete"
        );
        Ok(())
    }

    /// Initialize the tracker on `image` with the ground-truth `region`.
    ///
    /// The region is converted if the tracker does not accept its format.
    /// Nothing is sent when no region or image format can be agreed.
    pub fn initialize(
        &mut self,
        image: &Image,
        region: &Region,
        properties: &Properties,
    ) -> Result<TrackerStatus> {
        self.ensure_open()?;

        let region = self.capabilities.negotiate_region(region)?;
        self.capabilities.check_image(image)?;
        let request = Message::initialize(image, &region, properties)?;

        let status = self.exchange(&request)?;
        self.state = SessionState::Initialized;
        Ok(status)
    }

    /// Track on the next image.
    pub fn frame(&mut self, image: &Image, properties: &Properties) -> Result<TrackerStatus> {
        self.ensure_open()?;
        if self.state != SessionState::Initialized {
            return Err(TraxError::NotInitialized);
        }

        self.capabilities.check_image(image)?;
        let request = Message::frame(image, properties)?;
        self.exchange(&request)
    }

    /// Tell the tracker to stop. No reply is awaited.
    ///
    /// Never fails; a write error only means the tracker is already gone.
    pub fn quit(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Err(e) = Message::new(MessageKind::Quit).write_to(&mut self.writer) {
            tracing::warn!(error = %e, "failed to send QUIT");
        } else {
            tracing::debug!("sent quit");
        }
        self.state = SessionState::Closed;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(TraxError::SessionClosed);
        }
        if self.faulted {
            return Err(TraxError::SessionFaulted);
        }
        Ok(())
    }

    fn exchange(&mut self, request: &Message) -> Result<TrackerStatus> {
        let result = self.round_trip(request);
        if let Err(ref e) = result {
            if e.is_fatal() {
                tracing::warn!(error = %e, kind = %request.kind(), "session faulted");
                self.faulted = true;
            }
        }
        result
    }

    fn round_trip(&mut self, request: &Message) -> Result<TrackerStatus> {
        request.write_to(&mut self.writer)?;
        tracing::debug!(kind = %request.kind(), "sent frame");

        let reply = self.reader.read_message()?.ok_or_else(|| {
            TraxError::Protocol(format!(
                "Tracker closed the stream without answering {}",
                request.kind()
            ))
        })?;

        if reply.kind() != MessageKind::State {
            return Err(TraxError::Protocol(format!(
                "Invalid message, STATE expected, got {}",
                reply.kind()
            )));
        }

        let region_text = match reply.arguments() {
            [region] => region,
            args => {
                return Err(TraxError::Protocol(format!(
                    "Malformed STATE message: expected 1 argument, got {}",
                    args.len()
                )))
            },
        };

        Ok(TrackerStatus {
            region: Region::parse(region_text),
            properties: reply.properties().clone(),
        })
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether an earlier fault made the session unusable
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Capabilities from the handshake
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Negotiated protocol version
    pub fn protocol_version(&self) -> u32 {
        self.capabilities.version
    }

    /// Region formats accepted by the tracker
    pub fn region_formats(&self) -> impl Iterator<Item = RegionFormat> + '_ {
        self.capabilities.regions.iter().copied()
    }

    /// Image formats accepted by the tracker
    pub fn image_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.capabilities.images.iter().copied()
    }

    /// Tracker name, if announced
    pub fn tracker_name(&self) -> Option<&str> {
        self.capabilities.name.as_deref()
    }

    /// Tracker identifier, if announced
    pub fn tracker_identifier(&self) -> Option<&str> {
        self.capabilities.identifier.as_deref()
    }

    /// Stream the requests are written to
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<R, W> std::fmt::Debug for Session<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("faulted", &self.faulted)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
