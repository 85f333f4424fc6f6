//! Non-destructive crop metadata
//!
//! [`CropCoordinates`] are fractional insets from each edge of the original
//! image. They never alter the original; they are persisted next to the
//! photo reference as `crop_top`, `crop_bottom`, `crop_left`, `crop_right`.

use serde::{Deserialize, Serialize};

/// Slack allowed when converting back from pixel space
const EDGE_EPSILON: f64 = 1e-9;

/// Fractional crop insets, each in `[0, 1)`
///
/// # Invariants
/// - `top + bottom < 1`
/// - `left + right < 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCrop", into = "RawCrop")]
pub struct CropCoordinates {
    top: f64,
    bottom: f64,
    left: f64,
    right: f64,
}

/// Persisted shape
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawCrop {
    crop_top: f64,
    crop_bottom: f64,
    crop_left: f64,
    crop_right: f64,
}

impl CropCoordinates {
    /// Create validated crop insets
    ///
    /// # Errors
    /// Returns error if an inset is outside `[0, 1)` or no visible region remains
    pub fn new(top: f64, bottom: f64, left: f64, right: f64) -> Result<Self, CropError> {
        for (edge, value) in [
            ("top", top),
            ("bottom", bottom),
            ("left", left),
            ("right", right),
        ] {
            if !value.is_finite() || !(0.0..1.0).contains(&value) {
                return Err(CropError::OutOfRange { edge, value });
            }
        }
        if top + bottom >= 1.0 {
            return Err(CropError::EmptyRegion {
                axis: "vertical",
                total: top + bottom,
            });
        }
        if left + right >= 1.0 {
            return Err(CropError::EmptyRegion {
                axis: "horizontal",
                total: left + right,
            });
        }
        Ok(Self {
            top,
            bottom,
            left,
            right,
        })
    }

    /// No crop at all
    #[inline]
    #[must_use]
    pub const fn full() -> Self {
        Self {
            top: 0.0,
            bottom: 0.0,
            left: 0.0,
            right: 0.0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn top(&self) -> f64 {
        self.top
    }

    #[inline]
    #[must_use]
    pub const fn bottom(&self) -> f64 {
        self.bottom
    }

    #[inline]
    #[must_use]
    pub const fn left(&self) -> f64 {
        self.left
    }

    #[inline]
    #[must_use]
    pub const fn right(&self) -> f64 {
        self.right
    }

    /// Whether these insets leave the image untouched
    #[must_use]
    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    /// Visible rectangle in pixels for an image of `dims`
    #[must_use]
    pub fn to_pixel_rect(&self, dims: ImageDimensions) -> PixelRect {
        let width = f64::from(dims.width);
        let height = f64::from(dims.height);
        PixelRect {
            x: self.left * width,
            y: self.top * height,
            width: (1.0 - self.left - self.right) * width,
            height: (1.0 - self.top - self.bottom) * height,
        }
    }

    /// Derive insets from a visible rectangle in pixels
    ///
    /// # Errors
    /// Returns error if the rectangle is empty or does not fit inside `dims`
    pub fn from_pixel_rect(rect: PixelRect, dims: ImageDimensions) -> Result<Self, CropError> {
        if dims.width == 0 || dims.height == 0 {
            return Err(CropError::EmptyImage);
        }
        let width = f64::from(dims.width);
        let height = f64::from(dims.height);
        if rect.width <= 0.0
            || rect.height <= 0.0
            || rect.x < -EDGE_EPSILON * width
            || rect.y < -EDGE_EPSILON * height
            || rect.x + rect.width > width * (1.0 + EDGE_EPSILON)
            || rect.y + rect.height > height * (1.0 + EDGE_EPSILON)
        {
            return Err(CropError::RectOutOfBounds { rect, dims });
        }

        Self::new(
            snap(rect.y / height),
            snap((height - rect.y - rect.height) / height),
            snap(rect.x / width),
            snap((width - rect.x - rect.width) / width),
        )
    }
}

impl Default for CropCoordinates {
    fn default() -> Self {
        Self::full()
    }
}

impl TryFrom<RawCrop> for CropCoordinates {
    type Error = CropError;

    fn try_from(raw: RawCrop) -> Result<Self, Self::Error> {
        Self::new(raw.crop_top, raw.crop_bottom, raw.crop_left, raw.crop_right)
    }
}

impl From<CropCoordinates> for RawCrop {
    fn from(crop: CropCoordinates) -> Self {
        Self {
            crop_top: crop.top,
            crop_bottom: crop.bottom,
            crop_left: crop.left,
            crop_right: crop.right,
        }
    }
}

/// Clamp rounding noise around zero
fn snap(value: f64) -> f64 {
    if value.abs() < EDGE_EPSILON {
        0.0
    } else {
        value
    }
}

/// Pixel size of the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Visible region in pixel space (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Whether two rectangles agree within `tolerance` pixels on every edge
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// Crop validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CropError {
    /// Inset outside `[0, 1)`
    #[error("crop {edge} inset {value} is outside [0, 1)")]
    OutOfRange { edge: &'static str, value: f64 },

    /// Opposing insets leave nothing visible
    #[error("{axis} insets sum to {total}, leaving no visible region")]
    EmptyRegion { axis: &'static str, total: f64 },

    /// Rectangle does not fit the image
    #[error("rectangle {rect:?} does not fit inside {dims:?}")]
    RectOutOfBounds {
        rect: PixelRect,
        dims: ImageDimensions,
    },

    /// Image has a zero dimension
    #[error("image has zero width or height")]
    EmptyImage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_out_of_range_insets() {
        assert!(matches!(
            CropCoordinates::new(-0.1, 0.0, 0.0, 0.0),
            Err(CropError::OutOfRange { edge: "top", .. })
        ));
        assert!(matches!(
            CropCoordinates::new(0.0, 1.0, 0.0, 0.0),
            Err(CropError::OutOfRange { edge: "bottom", .. })
        ));
        assert!(CropCoordinates::new(f64::NAN, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn rejects_empty_visible_region() {
        assert!(matches!(
            CropCoordinates::new(0.5, 0.5, 0.0, 0.0),
            Err(CropError::EmptyRegion { axis: "vertical", .. })
        ));
        assert!(matches!(
            CropCoordinates::new(0.0, 0.0, 0.7, 0.3),
            Err(CropError::EmptyRegion { axis: "horizontal", .. })
        ));
    }

    #[test]
    fn pixel_rect_for_centered_square() {
        let crop = CropCoordinates::new(0.25, 0.25, 0.25, 0.25).unwrap();
        let rect = crop.to_pixel_rect(ImageDimensions::new(400, 200));
        assert_eq!(rect.x, 100.0);
        assert_eq!(rect.y, 50.0);
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 100.0);
    }

    #[test]
    fn full_rect_maps_to_zero_insets() {
        let dims = ImageDimensions::new(640, 480);
        let rect = PixelRect {
            x: 0.0,
            y: 0.0,
            width: 640.0,
            height: 480.0,
        };
        let crop = CropCoordinates::from_pixel_rect(rect, dims).unwrap();
        assert!(crop.is_full());
    }

    #[test]
    fn rect_outside_image_is_rejected() {
        let dims = ImageDimensions::new(100, 100);
        let rect = PixelRect {
            x: 50.0,
            y: 0.0,
            width: 60.0,
            height: 10.0,
        };
        assert!(matches!(
            CropCoordinates::from_pixel_rect(rect, dims),
            Err(CropError::RectOutOfBounds { .. })
        ));
    }

    #[test]
    fn persisted_shape_uses_crop_prefixed_keys() {
        let crop = CropCoordinates::new(0.1, 0.2, 0.3, 0.4).unwrap();
        let value = serde_json::to_value(crop).unwrap();
        assert_eq!(
            value,
            json!({"crop_top": 0.1, "crop_bottom": 0.2, "crop_left": 0.3, "crop_right": 0.4})
        );
        let back: CropCoordinates = serde_json::from_value(value).unwrap();
        assert_eq!(back, crop);
    }

    #[test]
    fn persisted_shape_is_validated_on_read() {
        let bad = json!({"crop_top": 0.6, "crop_bottom": 0.6, "crop_left": 0.0, "crop_right": 0.0});
        assert!(serde_json::from_value::<CropCoordinates>(bad).is_err());
    }
}
