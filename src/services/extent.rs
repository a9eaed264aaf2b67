//! Rectangular map extents and the frame fitting applied before export.
//!
//! A layout page has a fixed aspect ratio; a layer's bounding extent rarely
//! matches it. [`MapExtent::adjusted_to_ratio`] grows the extent along one
//! axis about its centre so the layer sits fully inside the page, and
//! [`MapExtent::with_margin`] adds breathing room around it.

use serde::{Deserialize, Serialize};

/// Axis-aligned extent in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl MapExtent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() / self.height()
    }

    /// An extent with no usable area: empty, inverted, or non-finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite())
            || self.width() <= 0.0
            || self.height() <= 0.0
    }

    /// Grow the extent about its centre until width / height equals `ratio`.
    ///
    /// Exactly one axis changes and the extent never shrinks, so the original
    /// area stays visible. Degenerate extents and non-positive ratios are
    /// returned unchanged.
    pub fn adjusted_to_ratio(&self, ratio: f64) -> MapExtent {
        if self.is_degenerate() || !ratio.is_finite() || ratio <= 0.0 {
            return *self;
        }

        let current = self.aspect_ratio();
        let (cx, cy) = self.center();

        if current < ratio {
            // Too tall for the page: widen.
            let half_width = self.height() * ratio / 2.0;
            MapExtent::new(cx - half_width, self.min_y, cx + half_width, self.max_y)
        } else {
            // Too wide for the page: heighten.
            let half_height = self.width() / ratio / 2.0;
            MapExtent::new(self.min_x, cy - half_height, self.max_x, cy + half_height)
        }
    }

    /// Scale both axes about the centre by `factor`.
    ///
    /// Factors below 1.0 are treated as 1.0 so a margin never crops the
    /// extent. Degenerate extents are returned unchanged.
    pub fn with_margin(&self, factor: f64) -> MapExtent {
        if self.is_degenerate() || !factor.is_finite() {
            return *self;
        }
        let factor = factor.max(1.0);

        let (cx, cy) = self.center();
        let half_width = self.width() * factor / 2.0;
        let half_height = self.height() * factor / 2.0;
        MapExtent::new(cx - half_width, cy - half_height, cx + half_width, cy + half_height)
    }

    /// Whether `other` lies fully inside this extent, within `tolerance`.
    pub fn contains(&self, other: &MapExtent, tolerance: f64) -> bool {
        self.min_x <= other.min_x + tolerance
            && self.min_y <= other.min_y + tolerance
            && self.max_x >= other.max_x - tolerance
            && self.max_y >= other.max_y - tolerance
    }
}

impl From<geo_types::Rect<f64>> for MapExtent {
    fn from(rect: geo_types::Rect<f64>) -> Self {
        MapExtent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}
