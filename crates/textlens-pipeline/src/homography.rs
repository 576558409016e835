//! Perspective correction from four user-chosen corners.
//!
//! The user marks the corners of a document on the *displayed* image.
//! [`HomographySettings::apply`] scales those points back to source
//! resolution, builds the projective mapping from the marked
//! quadrilateral onto an axis-aligned rectangle, resamples the source
//! through it with bilinear interpolation, and crops away any part of
//! the rectangle that was sampled from outside the source image.
//!
//! The rectangle is as wide as the longer of the top and bottom edges
//! and as tall as the longer of the left and right edges.

use image::Rgba;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, PixelBuffer, Point};

/// One of the four quadrilateral corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    /// Maps to `(0, 0)`.
    TopLeft,
    /// Maps to `(width, 0)`.
    TopRight,
    /// Maps to `(0, height)`.
    BottomLeft,
    /// Maps to `(width, height)`.
    BottomRight,
}

impl Corner {
    /// All corners in storage order.
    pub const ALL: [Self; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];
}

/// Four corners in display coordinates plus the display geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomographySettings {
    /// Top-left corner.
    pub top_left: Point,
    /// Top-right corner.
    pub top_right: Point,
    /// Bottom-left corner.
    pub bottom_left: Point,
    /// Bottom-right corner.
    pub bottom_right: Point,
    /// Width of the displayed image.
    pub display_width: f64,
    /// Height of the displayed image.
    pub display_height: f64,
    /// Display pixels per source pixel.
    pub display_scale: f64,
}

impl HomographySettings {
    /// Settings whose corners sit on the displayed image bounds.
    #[must_use]
    pub const fn from_size(display_width: f64, display_height: f64, display_scale: f64) -> Self {
        Self {
            top_left: Point::new(0.0, 0.0),
            top_right: Point::new(display_width, 0.0),
            bottom_left: Point::new(0.0, display_height),
            bottom_right: Point::new(display_width, display_height),
            display_width,
            display_height,
            display_scale,
        }
    }

    /// Default settings for `source` shown at `display_scale`.
    #[must_use]
    pub fn for_image(source: &PixelBuffer, display_scale: f64) -> Self {
        Self::from_size(
            f64::from(source.width()) * display_scale,
            f64::from(source.height()) * display_scale,
            display_scale,
        )
    }

    /// Position of one corner.
    #[must_use]
    pub const fn corner(&self, corner: Corner) -> Point {
        match corner {
            Corner::TopLeft => self.top_left,
            Corner::TopRight => self.top_right,
            Corner::BottomLeft => self.bottom_left,
            Corner::BottomRight => self.bottom_right,
        }
    }

    fn corner_mut(&mut self, corner: Corner) -> &mut Point {
        match corner {
            Corner::TopLeft => &mut self.top_left,
            Corner::TopRight => &mut self.top_right,
            Corner::BottomLeft => &mut self.bottom_left,
            Corner::BottomRight => &mut self.bottom_right,
        }
    }

    /// Radius around a corner within which a pointer grabs it.
    #[must_use]
    pub fn drag_distance(&self) -> f64 {
        self.display_width.min(self.display_height) / 6.0
    }

    /// Clamp a point to the display rectangle.
    #[must_use]
    pub fn clamp(&self, position: Point) -> Point {
        Point::new(
            position.x.clamp(0.0, self.display_width.max(0.0)),
            position.y.clamp(0.0, self.display_height.max(0.0)),
        )
    }

    /// Move the nearest corner within [`drag_distance`](Self::drag_distance)
    /// of `position` to the clamped position.
    ///
    /// Returns the corner that moved, or `None` if no corner was close
    /// enough, in which case the settings are unchanged.
    pub fn update_nearest(&mut self, position: Point) -> Option<Corner> {
        if !position.is_finite() {
            return None;
        }
        let reach = self.drag_distance();
        let nearest = Corner::ALL
            .into_iter()
            .map(|c| (c, self.corner(c).distance(position)))
            .filter(|&(_, d)| d < reach)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)?;
        *self.corner_mut(nearest) = self.clamp(position);
        Some(nearest)
    }

    /// Check the geometry can be mapped onto a rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidHomography`] for a non-positive or
    /// non-finite scale or display size, a corner outside the display
    /// rectangle, or three collinear corners.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("display_scale", self.display_scale),
            ("display_width", self.display_width),
            ("display_height", self.display_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::InvalidHomography(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        for corner in Corner::ALL {
            let p = self.corner(corner);
            let inside = p.is_finite()
                && (0.0..=self.display_width).contains(&p.x)
                && (0.0..=self.display_height).contains(&p.y);
            if !inside {
                return Err(PipelineError::InvalidHomography(format!(
                    "{corner:?} ({}, {}) lies outside the {}x{} display",
                    p.x, p.y, self.display_width, self.display_height
                )));
            }
        }
        let points = Corner::ALL.map(|c| self.corner(c));
        for (a, b, c) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
            if collinear(points[a], points[b], points[c]) {
                return Err(PipelineError::InvalidHomography(format!(
                    "corners {:?}, {:?} and {:?} are collinear",
                    Corner::ALL[a],
                    Corner::ALL[b],
                    Corner::ALL[c]
                )));
            }
        }
        Ok(())
    }

    /// Size in source pixels of the corrected rectangle before cropping.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn output_size(&self) -> (u32, u32) {
        let [tl, tr, bl, br] = Corner::ALL.map(|c| self.corner(c).unscale(self.display_scale));
        let width = tl.distance(tr).max(bl.distance(br));
        let height = tl.distance(bl).max(tr.distance(br));
        (
            width.round().clamp(0.0, f64::from(u32::MAX)) as u32,
            height.round().clamp(0.0, f64::from(u32::MAX)) as u32,
        )
    }

    /// Resample `source` so the marked quadrilateral fills the output.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidHomography`] if the settings do
    /// not [`validate`](Self::validate), the projective mapping is
    /// singular, or the cropped result would be empty.
    pub fn apply(&self, source: &PixelBuffer) -> Result<PixelBuffer, PipelineError> {
        self.validate()?;
        let (width, height) = self.output_size();
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidHomography(
                "corrected rectangle is empty".to_owned(),
            ));
        }

        #[allow(clippy::cast_possible_truncation)]
        let from = Corner::ALL.map(|c| {
            let p = self.corner(c).unscale(self.display_scale);
            (p.x as f32, p.y as f32)
        });
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (width as f32, height as f32);
        let to = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let projection = Projection::from_control_points(from, to).ok_or_else(|| {
            PipelineError::InvalidHomography("corner mapping is singular".to_owned())
        })?;

        let mut warped = PixelBuffer::new(width, height);
        warp_into(
            source,
            &projection,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
            &mut warped,
        );

        let crop = CropRect::from_source_corners(&projection, source, width, height);
        tracing::debug!(width, height, ?crop, "perspective corrected");
        if crop.width == 0 || crop.height == 0 {
            return Err(PipelineError::InvalidHomography(
                "nothing of the source remains after cropping".to_owned(),
            ));
        }
        if crop.is_full(width, height) {
            return Ok(warped);
        }
        Ok(image::imageops::crop_imm(&warped, crop.x, crop.y, crop.width, crop.height).to_image())
    }
}

fn collinear(a: Point, b: Point, c: Point) -> bool {
    let cross = (b.x - a.x).mul_add(c.y - a.y, -((b.y - a.y) * (c.x - a.x)));
    cross.abs() < 1e-6
}

/// Region of the warped rectangle that was sampled from inside the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRect {
    /// Map the source image corners through `projection` and take the
    /// inner margins on each side.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_source_corners(
        projection: &Projection,
        source: &PixelBuffer,
        width: u32,
        height: u32,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let (sw, sh, w, h) = (
            source.width() as f32,
            source.height() as f32,
            width as f32,
            height as f32,
        );
        let tl = *projection * (0.0, 0.0);
        let tr = *projection * (sw, 0.0);
        let bl = *projection * (0.0, sh);
        let br = *projection * (sw, sh);

        let left = (bound(tl.0.max(bl.0), 0.0, w, 0.0) - SNAP).ceil().max(0.0);
        let top = (bound(tl.1.max(tr.1), 0.0, h, 0.0) - SNAP).ceil().max(0.0);
        let right = (bound(tr.0.min(br.0), 0.0, w, w) + SNAP).floor().min(w);
        let bottom = (bound(bl.1.min(br.1), 0.0, h, h) + SNAP).floor().min(h);

        Self {
            x: left as u32,
            y: top as u32,
            width: (right - left).max(0.0) as u32,
            height: (bottom - top).max(0.0) as u32,
        }
    }

    const fn is_full(self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == width && self.height == height
    }
}

/// Margins closer than this to a pixel boundary snap to it.
const SNAP: f32 = 0.01;

/// Clamp to `min..=max`, substituting `fallback` for NaN or infinity.
fn bound(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
