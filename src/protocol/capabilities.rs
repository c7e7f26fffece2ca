//! Tracker capabilities announced in the HELLO handshake.
//!
//! The capability set is fixed once the handshake is read and decides
//! which region and image representations may be sent for the rest of the
//! session.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;

use super::message::{Message, MessageKind, Properties};
use super::{
    DEFAULT_PROTOCOL_VERSION, PROP_IDENTIFIER, PROP_IMAGE, PROP_NAME, PROP_REGION, PROP_VERSION,
};
use crate::error::{Result, TraxError};
use crate::image::{Image, ImageFormat};
use crate::region::{Region, RegionFormat};

/// Region formats tried, in order, when the tracker does not accept the
/// caller's region as-is.
pub const REGION_FALLBACK: [RegionFormat; 3] =
    [RegionFormat::Mask, RegionFormat::Polygon, RegionFormat::Rectangle];

/// Capabilities of the connected tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Protocol version
    pub version: u32,
    /// Region formats the tracker accepts
    pub regions: BTreeSet<RegionFormat>,
    /// Image formats the tracker accepts
    pub images: BTreeSet<ImageFormat>,
    /// Tracker name
    pub name: Option<String>,
    /// Tracker identifier
    pub identifier: Option<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            version: DEFAULT_PROTOCOL_VERSION,
            regions: BTreeSet::new(),
            images: BTreeSet::new(),
            name: None,
            identifier: None,
        }
    }
}

impl Capabilities {
    /// Read capabilities from a HELLO message.
    pub fn from_hello(message: &Message) -> Result<Self> {
        if message.kind() != MessageKind::Hello {
            return Err(TraxError::Handshake(format!(
                "Expected HELLO, got {}",
                message.kind()
            )));
        }

        let version = match message.property(PROP_VERSION) {
            Some(text) => text.trim().parse::<u32>().map_err(|_| {
                TraxError::Handshake(format!("Illegal protocol version: {:?}", text))
            })?,
            None => DEFAULT_PROTOCOL_VERSION,
        };

        Ok(Self {
            version,
            regions: parse_format_list(message.property(PROP_REGION)),
            images: parse_format_list(message.property(PROP_IMAGE)),
            name: message.property(PROP_NAME).map(str::to_string),
            identifier: message.property(PROP_IDENTIFIER).map(str::to_string),
        })
    }

    /// Build the HELLO message announcing these capabilities.
    pub fn to_hello(&self) -> Result<Message> {
        let mut props = Properties::new();
        props.insert(PROP_VERSION.to_string(), self.version.to_string());
        props.insert(PROP_REGION.to_string(), join_formats(&self.regions));
        props.insert(PROP_IMAGE.to_string(), join_formats(&self.images));
        if let Some(ref name) = self.name {
            props.insert(PROP_NAME.to_string(), name.clone());
        }
        if let Some(ref identifier) = self.identifier {
            props.insert(PROP_IDENTIFIER.to_string(), identifier.clone());
        }
        Message::hello(&props)
    }

    /// Add an accepted region format
    pub fn with_region(mut self, format: RegionFormat) -> Self {
        self.regions.insert(format);
        self
    }

    /// Add an accepted image format
    pub fn with_image(mut self, format: ImageFormat) -> Self {
        self.images.insert(format);
        self
    }

    /// Check if region format is accepted
    pub fn supports_region(&self, format: RegionFormat) -> bool {
        self.regions.contains(&format)
    }

    /// Check if image format is accepted
    pub fn supports_image(&self, format: ImageFormat) -> bool {
        self.images.contains(&format)
    }

    /// Pick the representation of `region` to send.
    ///
    /// An accepted format is used unchanged. Otherwise each format of
    /// [`REGION_FALLBACK`] the tracker accepts is tried in turn, skipping
    /// those the region cannot be converted to.
    pub fn negotiate_region(&self, region: &Region) -> Result<Region> {
        if self.supports_region(region.format()) {
            return Ok(region.clone());
        }

        for format in REGION_FALLBACK {
            if !self.supports_region(format) {
                continue;
            }
            match region.convert_to(format) {
                Ok(converted) => {
                    tracing::debug!(from = %region.format(), to = %format, "converted region");
                    return Ok(converted);
                },
                Err(e) => tracing::debug!(to = %format, error = %e, "region conversion skipped"),
            }
        }

        Err(TraxError::CapabilityMismatch(format!(
            "No known region format is supported (tracker accepts: {})",
            join_formats(&self.regions)
        )))
    }

    /// Fail unless the tracker accepts the image's format.
    pub fn check_image(&self, image: &Image) -> Result<()> {
        if self.supports_image(image.format()) {
            Ok(())
        } else {
            Err(TraxError::CapabilityMismatch(format!(
                "Image format {} is unsupported by tracker (accepts: {})",
                image.format(),
                join_formats(&self.images)
            )))
        }
    }
}

fn parse_format_list<T>(list: Option<&str>) -> BTreeSet<T>
where
    T: FromStr + Ord,
{
    let mut formats = BTreeSet::new();
    for name in list.unwrap_or_default().split(';') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match name.parse::<T>() {
            Ok(format) => {
                formats.insert(format);
            },
            Err(_) => tracing::warn!(format = name, "skipping unknown format"),
        }
    }
    formats
}

fn join_formats<T: Display>(formats: &BTreeSet<T>) -> String {
    formats
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}
