//! Capture date and GPS position read from embedded EXIF data.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use exif::{Exif, In, Tag, Value};
use tracing::debug;

use crate::geocode::Geocoder;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Timestamp fields in preference order: original capture, then the generic
/// modification stamp, then digitization.
const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTime, Tag::DateTimeDigitized];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// Capture time as found in the file; unparseable values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTime {
    Parsed(NaiveDateTime),
    Raw(String),
}

impl CaptureTime {
    fn from_exif_ascii(raw: &str) -> Self {
        let trimmed = raw.trim_end_matches('\0').trim();
        match NaiveDateTime::parse_from_str(trimmed, EXIF_DATETIME_FORMAT) {
            Ok(parsed) => Self::Parsed(parsed),
            Err(_) => Self::Raw(trimmed.to_string()),
        }
    }

    /// Human-friendly rendering, e.g. `July 4, 2021 12:30`.
    pub fn display(&self) -> String {
        match self {
            Self::Parsed(at) => at.format("%B %-d, %Y %H:%M").to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub date_time: Option<CaptureTime>,
    pub coordinates: Option<Coordinates>,
    pub location: Option<String>,
}

impl ImageMetadata {
    pub fn is_empty(&self) -> bool {
        self.date_time.is_none() && self.location.is_none()
    }

    /// Text lines for the metadata overlay: date first, then location.
    pub fn overlay_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);
        if let Some(at) = &self.date_time {
            lines.push(at.display());
        }
        if let Some(location) = &self.location {
            lines.push(location.clone());
        }
        lines
    }
}

/// Raw EXIF findings before geocoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifFields {
    pub date_time: Option<CaptureTime>,
    pub coordinates: Option<Coordinates>,
}

/// Read capture time and GPS position from `path`.
///
/// Any read or parse failure yields empty fields.
pub fn read_exif_fields(path: &Path) -> ExifFields {
    let exif = match open_exif(path) {
        Some(exif) => exif,
        None => {
            debug!(path = %path.display(), "no exif data");
            return ExifFields::default();
        }
    };
    ExifFields {
        date_time: DATE_TAGS
            .iter()
            .find_map(|tag| ascii_field(&exif, *tag))
            .map(|raw| CaptureTime::from_exif_ascii(&raw)),
        coordinates: read_coordinates(&exif),
    }
}

fn open_exif(path: &Path) -> Option<Exif> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut buf).ok()
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|s| s.trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn read_coordinates(exif: &Exif) -> Option<Coordinates> {
    let mut lat = dms_degrees(exif, Tag::GPSLatitude)?;
    let mut lng = dms_degrees(exif, Tag::GPSLongitude)?;
    if hemisphere(exif, Tag::GPSLatitudeRef) == Some('S') {
        lat = -lat;
    }
    if hemisphere(exif, Tag::GPSLongitudeRef) == Some('W') {
        lng = -lng;
    }
    Some(Coordinates { lat, lng })
}

/// Degrees/minutes/seconds rationals folded into decimal degrees.
fn dms_degrees(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    let mut degrees = 0.0;
    for (part, scale) in parts.iter().zip([1.0, 60.0, 3600.0]) {
        if part.denom == 0 {
            return None;
        }
        degrees += part.to_f64() / scale;
    }
    if parts.is_empty() || !degrees.is_finite() {
        return None;
    }
    Some(degrees)
}

fn hemisphere(exif: &Exif, tag: Tag) -> Option<char> {
    ascii_field(exif, tag)?
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
}

/// Extract metadata for a local image and resolve its location.
///
/// Never fails; unreadable files produce [`ImageMetadata::default`].
pub async fn extract(path: PathBuf, geocoder: &mut Geocoder) -> ImageMetadata {
    let fields = match tokio::task::spawn_blocking(move || read_exif_fields(&path)).await {
        Ok(fields) => fields,
        Err(err) => {
            debug!("exif extraction task failed: {err}");
            ExifFields::default()
        }
    };
    let location = match fields.coordinates {
        Some(Coordinates { lat, lng }) => Some(geocoder.reverse_geocode(lat, lng).await),
        None => None,
    };
    ImageMetadata {
        date_time: fields.date_time,
        coordinates: fields.coordinates,
        location,
    }
}
