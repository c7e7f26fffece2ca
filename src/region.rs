//! Tracking regions and their wire form.
//!
//! A region is either an axis-aligned [`Rectangle`] or a [`Polygon`] of at
//! least three points. Both serialize to comma-separated numbers with three
//! fractional digits:
//!
//! | Variant   | Wire form                    |
//! |-----------|------------------------------|
//! | Rectangle | `x,y,w,h`                    |
//! | Polygon   | `x1,y1,x2,y2,...,xn,yn`      |
//!
//! The mask format can be advertised by trackers but is not encoded by this
//! client; conversion to it always fails.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};

/// Region formats a tracker may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionFormat {
    /// Axis-aligned bounding box
    Rectangle,
    /// Closed polygon
    Polygon,
    /// Binary mask (not encodable by this client)
    Mask,
}

impl RegionFormat {
    /// Wire name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Polygon => "polygon",
            Self::Mask => "mask",
        }
    }
}

impl fmt::Display for RegionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegionFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rectangle" => Ok(Self::Rectangle),
            "polygon" => Ok(Self::Polygon),
            "mask" => Ok(Self::Mask),
            _ => Err(format!("Unknown region format: {}", s)),
        }
    }
}

/// A 2D point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Create a point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rectangle {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rectangle {
    /// Create a rectangle
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corner points, clockwise from the top-left.
    pub fn corners(&self) -> [Point; 4] {
        let right = self.x + self.width;
        let bottom = self.y + self.height;
        [
            Point::new(self.x, self.y),
            Point::new(right, self.y),
            Point::new(right, bottom),
            Point::new(self.x, bottom),
        ]
    }
}

/// Polygon with at least three points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Create a polygon, failing for fewer than three points.
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() < 3 {
            return Err(TraxError::InvalidRegion(format!(
                "Polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        Ok(Self { points })
    }

    /// Create a polygon from interleaved `x, y` coordinates.
    pub fn from_coords(coords: &[f64]) -> Result<Self> {
        if coords.len() % 2 != 0 {
            return Err(TraxError::InvalidRegion(format!(
                "Odd number of polygon coordinates: {}",
                coords.len()
            )));
        }
        let points = coords
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect();
        Self::new(points)
    }

    /// Polygon vertices in order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Axis-aligned bounding box of all vertices
    pub fn bounding_box(&self) -> Rectangle {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Rectangle::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// A tracking region
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Region {
    /// Axis-aligned rectangle
    Rectangle(Rectangle),
    /// Polygon
    Polygon(Polygon),
}

impl Region {
    /// Parse a region from its wire form.
    ///
    /// Fields that are not numbers are skipped. Four numbers make a
    /// rectangle, an even count of six or more makes a polygon, and
    /// anything else yields `None`.
    pub fn parse(text: &str) -> Option<Region> {
        let numbers: Vec<f64> = text
            .split(',')
            .filter_map(|field| field.trim().parse::<f64>().ok())
            .collect();

        match numbers.len() {
            4 => Some(Region::Rectangle(Rectangle::new(
                numbers[0], numbers[1], numbers[2], numbers[3],
            ))),
            n if n > 5 && n % 2 == 0 => Polygon::from_coords(&numbers).ok().map(Region::Polygon),
            _ => None,
        }
    }

    /// Format tag of this region
    pub fn format(&self) -> RegionFormat {
        match self {
            Region::Rectangle(_) => RegionFormat::Rectangle,
            Region::Polygon(_) => RegionFormat::Polygon,
        }
    }

    /// Axis-aligned bounding box
    pub fn bounding_box(&self) -> Rectangle {
        match self {
            Region::Rectangle(rect) => *rect,
            Region::Polygon(poly) => poly.bounding_box(),
        }
    }

    /// Vertices of the region outline
    pub fn points(&self) -> Vec<Point> {
        match self {
            Region::Rectangle(rect) => rect.corners().to_vec(),
            Region::Polygon(poly) => poly.points().to_vec(),
        }
    }

    /// Convert to another format, leaving `self` untouched.
    ///
    /// Converting to the current format returns an equal region.
    pub fn convert_to(&self, format: RegionFormat) -> Result<Region> {
        match (self, format) {
            (Region::Rectangle(_), RegionFormat::Rectangle)
            | (Region::Polygon(_), RegionFormat::Polygon) => Ok(self.clone()),
            (Region::Rectangle(rect), RegionFormat::Polygon) => {
                Polygon::new(rect.corners().to_vec()).map(Region::Polygon)
            },
            (Region::Polygon(poly), RegionFormat::Rectangle) => {
                Ok(Region::Rectangle(poly.bounding_box()))
            },
            (_, RegionFormat::Mask) => Err(TraxError::CapabilityMismatch(
                "Conversion to mask regions is not supported".to_string(),
            )),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Rectangle(r) => {
                write!(f, "{:.3},{:.3},{:.3},{:.3}", r.x, r.y, r.width, r.height)
            },
            Region::Polygon(poly) => {
                for (i, p) in poly.points.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:.3},{:.3}", p.x, p.y)?;
                }
                Ok(())
            },
        }
    }
}

impl From<Rectangle> for Region {
    fn from(rect: Rectangle) -> Self {
        Region::Rectangle(rect)
    }
}

impl From<Polygon> for Region {
    fn from(poly: Polygon) -> Self {
        Region::Polygon(poly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Polygon {
        Polygon::from_coords(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]).unwrap()
    }

    #[test]
    fn test_parse_rectangle() {
        let region = Region::parse("1,2,3,4").unwrap();
        assert_eq!(region, Region::Rectangle(Rectangle::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn test_parse_polygon() {
        let region = Region::parse("0,0,1,0,1,1,0,1").unwrap();
        assert_eq!(region.format(), RegionFormat::Polygon);
        assert_eq!(region.points().len(), 4);
    }

    #[test]
    fn test_parse_arity() {
        assert!(Region::parse("1,2,3").is_none());
        assert!(Region::parse("1,2,3,4,5").is_none());
        assert!(Region::parse("1,2,3,4,5,6,7").is_none());
        assert!(Region::parse("").is_none());
    }

    #[test]
    fn test_parse_skips_bad_fields() {
        let region = Region::parse("1,2,abc,3,4,").unwrap();
        assert_eq!(region, Region::Rectangle(Rectangle::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn test_wire_form() {
        let rect = Region::from(Rectangle::new(0.0, 0.0, 10.0, 10.5));
        assert_eq!(rect.to_string(), "0.000,0.000,10.000,10.500");

        let poly = Region::from(Polygon::from_coords(&[1.0, 2.0, 3.25, 4.0, 5.0, 6.125]).unwrap());
        assert_eq!(poly.to_string(), "1.000,2.000,3.250,4.000,5.000,6.125");
    }

    #[test]
    fn test_polygon_too_few_points() {
        let result = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert!(matches!(result, Err(TraxError::InvalidRegion(_))));
        assert!(Polygon::from_coords(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_convert_identity() {
        let rect = Region::from(Rectangle::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(rect.convert_to(RegionFormat::Rectangle).unwrap(), rect);

        let poly = Region::from(unit_square());
        assert_eq!(poly.convert_to(RegionFormat::Polygon).unwrap(), poly);
    }

    #[test]
    fn test_rectangle_to_polygon_corners() {
        let rect = Region::from(Rectangle::new(1.0, 2.0, 3.0, 4.0));
        let poly = rect.convert_to(RegionFormat::Polygon).unwrap();
        assert_eq!(
            poly.points(),
            vec![
                Point::new(1.0, 2.0),
                Point::new(4.0, 2.0),
                Point::new(4.0, 6.0),
                Point::new(1.0, 6.0),
            ]
        );
    }

    #[test]
    fn test_polygon_to_rectangle_bounding_box() {
        let poly = Region::from(
            Polygon::from_coords(&[-1.0, 2.0, 5.0, -3.0, 2.0, 7.0]).unwrap(),
        );
        let rect = poly.convert_to(RegionFormat::Rectangle).unwrap();
        assert_eq!(rect, Region::Rectangle(Rectangle::new(-1.0, -3.0, 6.0, 10.0)));
    }

    #[test]
    fn test_convert_to_mask_fails() {
        let rect = Region::from(Rectangle::new(1.0, 2.0, 3.0, 4.0));
        assert!(matches!(
            rect.convert_to(RegionFormat::Mask),
            Err(TraxError::CapabilityMismatch(_))
        ));
    }

    #[test]
    fn test_region_format_from_str() {
        assert_eq!("RECTANGLE".parse::<RegionFormat>().unwrap(), RegionFormat::Rectangle);
        assert_eq!(" polygon ".parse::<RegionFormat>().unwrap(), RegionFormat::Polygon);
        assert_eq!("mask".parse::<RegionFormat>().unwrap(), RegionFormat::Mask);
        assert!("ellipse".parse::<RegionFormat>().is_err());
        assert_eq!(RegionFormat::Polygon.to_string(), "polygon");
    }
}
