//! Geographic coordinate parsing and formatting.
//!
//! Field notes and site sheets carry positions in degree/minute/second form
//! with uneven typography (straight, curly, or prime quote marks). The parser
//! here accepts those variants plus plain decimal pairs, and the formatter
//! writes the French convention back out (`O` for west, seconds rounded to
//! the nearest whole).

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    #[error("unrecognised coordinate format: '{0}'")]
    Format(String),
    #[error("hemisphere letter missing in '{0}'")]
    MissingHemisphere(String),
    #[error("coordinate out of range: {0}")]
    OutOfRange(String),
}

/// Compass sector labels, French convention, 45 degrees per sector.
const COMPASS_SECTORS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SO", "O", "NO"];

/// Bucket a bearing in degrees from north into one of eight compass sectors.
pub fn compass_sector(bearing: f64) -> &'static str {
    let normalised = bearing.rem_euclid(360.0);
    let index = ((normalised + 22.5) / 45.0) as usize % 8;
    COMPASS_SECTORS[index]
}

pub struct CoordinateParser {
    dms_component: Regex,
    decimal_pair: Regex,
}

impl CoordinateParser {
    pub fn new() -> Self {
        Self {
            // One DMS component: 45°09'30" N. Minute and second marks accept
            // straight quotes, curly quotes, and prime characters.
            dms_component: Regex::new(
                r#"(?P<deg>\d{1,3})\s*[°º]\s*(?P<min>\d{1,2})\s*['’′´]\s*(?:(?P<sec>\d{1,2}(?:[.,]\d+)?)\s*(?:"|″|”|''))?\s*(?P<hemi>[NSEWOnsewo])?"#,
            )
            .expect("Invalid DMS regex"),
            decimal_pair: Regex::new(
                r"^\s*(?P<lat>-?\d{1,3}(?:\.\d+)?)\s*[,;\s]\s*(?P<lon>-?\d{1,3}(?:\.\d+)?)\s*$",
            )
            .expect("Invalid decimal pair regex"),
        }
    }

    /// Parse a position in either DMS or decimal form into (lat, lon).
    ///
    /// DMS input must carry a hemisphere letter on both components. Decimal
    /// input uses a dot as decimal separator, the two values split by a
    /// comma, semicolon, or whitespace.
    pub fn parse_point(&self, text: &str) -> Result<(f64, f64), CoordError> {
        if text.contains('°') || text.contains('º') {
            self.parse_dms_pair(text)
        } else {
            self.parse_decimal_pair(text)
        }
    }

    /// Parse a pair of DMS components, e.g. `45°09'30" N 5°43'12" E`.
    pub fn parse_dms_pair(&self, text: &str) -> Result<(f64, f64), CoordError> {
        let mut latitude = None;
        let mut longitude = None;
        let mut components = 0;

        for caps in self.dms_component.captures_iter(text) {
            components += 1;
            let raw = caps.get(0).map(|m| m.as_str()).unwrap_or(text);

            let hemi = caps
                .name("hemi")
                .map(|m| m.as_str().to_ascii_uppercase())
                .ok_or_else(|| CoordError::MissingHemisphere(raw.trim().to_string()))?;

            let value = Self::component_value(&caps, raw)?;
            match hemi.as_str() {
                "N" => latitude = Some(Self::check_range(value, 90.0, raw)?),
                "S" => latitude = Some(-Self::check_range(value, 90.0, raw)?),
                "E" => longitude = Some(Self::check_range(value, 180.0, raw)?),
                // French notation writes west as O (ouest).
                "W" | "O" => longitude = Some(-Self::check_range(value, 180.0, raw)?),
                _ => return Err(CoordError::Format(raw.trim().to_string())),
            }
        }

        if components != 2 {
            return Err(CoordError::Format(text.trim().to_string()));
        }
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Ok((lat, lon)),
            _ => Err(CoordError::Format(text.trim().to_string())),
        }
    }

    fn parse_decimal_pair(&self, text: &str) -> Result<(f64, f64), CoordError> {
        let caps = self
            .decimal_pair
            .captures(text)
            .ok_or_else(|| CoordError::Format(text.trim().to_string()))?;

        let lat: f64 = caps["lat"]
            .parse()
            .map_err(|_| CoordError::Format(text.trim().to_string()))?;
        let lon: f64 = caps["lon"]
            .parse()
            .map_err(|_| CoordError::Format(text.trim().to_string()))?;

        Ok((
            Self::check_range(lat.abs(), 90.0, text)?.copysign(lat),
            Self::check_range(lon.abs(), 180.0, text)?.copysign(lon),
        ))
    }

    fn component_value(caps: &regex::Captures<'_>, raw: &str) -> Result<f64, CoordError> {
        let degrees: f64 = caps["deg"]
            .parse()
            .map_err(|_| CoordError::Format(raw.trim().to_string()))?;
        let minutes: f64 = caps["min"]
            .parse()
            .map_err(|_| CoordError::Format(raw.trim().to_string()))?;
        let seconds: f64 = match caps.name("sec") {
            Some(m) => m
                .as_str()
                .replace(',', ".")
                .parse()
                .map_err(|_| CoordError::Format(raw.trim().to_string()))?,
            None => 0.0,
        };

        if minutes >= 60.0 || seconds >= 60.0 {
            return Err(CoordError::OutOfRange(raw.trim().to_string()));
        }
        Ok(degrees + minutes / 60.0 + seconds / 3600.0)
    }

    fn check_range(value: f64, limit: f64, raw: &str) -> Result<f64, CoordError> {
        if value > limit + 1e-9 {
            return Err(CoordError::OutOfRange(raw.trim().to_string()));
        }
        Ok(value)
    }

    /// Format a (lat, lon) pair in DMS, e.g. `45°09'30" N 5°43'12" E`.
    pub fn format_dms(&self, lat: f64, lon: f64) -> String {
        format!(
            "{} {}",
            Self::format_component(lat, 'N', 'S'),
            Self::format_component(lon, 'E', 'O'),
        )
    }

    fn format_component(value: f64, positive: char, negative: char) -> String {
        let hemi = if value < 0.0 { negative } else { positive };
        let magnitude = value.abs();

        let mut degrees = magnitude.trunc() as u32;
        let minutes_full = (magnitude - degrees as f64) * 60.0;
        let mut minutes = minutes_full.trunc() as u32;
        let mut seconds = ((minutes_full - minutes as f64) * 60.0).round() as u32;

        // Rounding seconds up can carry into the next minute or degree.
        if seconds == 60 {
            seconds = 0;
            minutes += 1;
        }
        if minutes == 60 {
            minutes = 0;
            degrees += 1;
        }

        format!("{degrees}°{minutes:02}'{seconds:02}\" {hemi}")
    }
}

impl Default for CoordinateParser {
    fn default() -> Self {
        Self::new()
    }
}
