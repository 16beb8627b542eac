//! Coordinate values and their quantization into broadcast blocks.
//!
//! Quantization turns the continuous coordinate space into a finite set of
//! cells, so "nearby" becomes an equality check on the cell rather than a
//! distance computation per message.

use serde_json::Value;

/// Decimal digits kept when quantizing a coordinate axis.
pub const GEOLOC_RESOLUTION: i32 = 4;

/// Widest span accepted for range retrievals, in degrees of longitude.
pub const MAX_RANGE: f64 = 10.0;

/// Malformed or out-of-range coordinate input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError;

/// A raw latitude/longitude pair as supplied by a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geoloc {
    pub lat: f64,
    pub long: f64,
}

impl Geoloc {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Parse two decimal strings. Fails on non-numeric or out-of-range input.
    /// The result is quantization-ready but not itself quantized.
    pub fn parse(lat: &str, long: &str) -> Result<Self, ParseError> {
        let lat: f64 = lat.trim().parse().map_err(|_| ParseError)?;
        let long: f64 = long.trim().parse().map_err(|_| ParseError)?;
        let loc = Self { lat, long };
        if loc.is_valid() {
            Ok(loc)
        } else {
            Err(ParseError)
        }
    }

    /// Parse coordinate fields off the wire, where clients may send either
    /// JSON strings or numbers.
    pub fn from_values(lat: &Value, long: &Value) -> Result<Self, ParseError> {
        let lat = coord_text(lat).ok_or(ParseError)?;
        let long = coord_text(long).ok_or(ParseError)?;
        Self::parse(&lat, &long)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.long)
    }

    /// Quantize both axes to [`GEOLOC_RESOLUTION`] digits.
    pub fn block(&self) -> Block {
        Block {
            lat: quantize(self.lat),
            long: quantize(self.long),
        }
    }
}

/// A quantized coordinate pair: the unit of broadcast-group and
/// storage-bucket membership.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub lat: f64,
    pub long: f64,
}

impl Block {
    /// Canonical group name for this block. Equal blocks always produce the
    /// same string.
    pub fn key(&self) -> String {
        format!("{},{}", self.lat, self.long)
    }
}

fn quantize(axis: f64) -> f64 {
    let scale = 10f64.powi(GEOLOC_RESOLUTION);
    (axis * scale).round() / scale
}

fn coord_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient range-width parse: quantized and clamped to `[0, MAX_RANGE]`.
/// Unparseable input collapses to zero rather than erroring.
pub fn parse_range(raw: &Value) -> f64 {
    let width = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if !width.is_finite() {
        return 0.0;
    }
    quantize(width).clamp(0.0, MAX_RANGE)
}
