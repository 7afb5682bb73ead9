//! Mapping between native slice coordinates and preview pixels.
//!
//! A preview is produced by scaling a slice to fit the preview box while
//! keeping its physical aspect ratio, then optionally rotating it 90°
//! clockwise, then mirroring it horizontally and vertically. [`Locator`]
//! performs that transform for rendering and inverts it for clicks, so both
//! directions always agree.

use crate::enums::Orientation;

use image::{GrayImage, Luma, imageops};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Per-pane display configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayTransform {
    pub mirror_horizontal: bool,
    pub mirror_vertical: bool,
    /// Ignored for views that do not support rotation
    pub rotate: bool,
}

/// Bounding box available to a preview, in display pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewBox {
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewBox {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
        }
    }
}

/// Where the rendered pixmap was drawn inside its (possibly larger) label
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixmapRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixmapRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle of a pixmap drawn at the origin
    pub fn at_origin((width, height): (u32, u32)) -> Self {
        Self::new(0.0, 0.0, f64::from(width), f64::from(height))
    }

    pub fn contains(&self, (x, y): (f64, f64)) -> bool {
        x >= self.left && x < self.left + self.width && y >= self.top && y < self.top + self.height
    }
}

/// Forward and inverse coordinate mapping for one preview pane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Locator {
    orientation: Orientation,
    native: (usize, usize),
    scaled: (u32, u32),
    transform: DisplayTransform,
}

impl Locator {
    /// `native` is the slice shape `(horizontal, vertical)` and `spacing`
    /// the physical spacing of those two axes.
    pub fn new(
        orientation: Orientation,
        native: (usize, usize),
        spacing: (f32, f32),
        preview: PreviewBox,
        transform: DisplayTransform,
    ) -> Self {
        let transform = DisplayTransform {
            rotate: transform.rotate && orientation.supports_rotation(),
            ..transform
        };
        Self {
            orientation,
            native,
            scaled: Self::fit_to_box(native, spacing, preview),
            transform,
        }
    }

    /// Largest size inside `preview` that keeps the slice's physical
    /// aspect ratio. Returned as `(width, height)`.
    pub fn fit_to_box(native: (usize, usize), spacing: (f32, f32), preview: PreviewBox) -> (u32, u32) {
        let horizontal = f64::from(spacing.0) * native.0 as f64;
        let vertical = f64::from(spacing.1) * native.1 as f64;
        if !(horizontal > 0.0 && vertical > 0.0) {
            return (preview.width.max(1), preview.height.max(1));
        }

        let (width, height) = if vertical >= horizontal {
            let height = f64::from(preview.height);
            (height * horizontal / vertical, height)
        } else {
            let width = f64::from(preview.width);
            (width, width * vertical / horizontal)
        };
        ((width.round() as u32).max(1), (height.round() as u32).max(1))
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn transform(&self) -> DisplayTransform {
        self.transform
    }

    /// Size of the slice after aspect-preserving scaling, before rotation
    pub fn scaled_size(&self) -> (u32, u32) {
        self.scaled
    }

    /// Size of the final pixmap
    pub fn pixmap_size(&self) -> (u32, u32) {
        if self.transform.rotate {
            (self.scaled.1, self.scaled.0)
        } else {
            self.scaled
        }
    }

    /// Renders an 8-bit slice indexed `[horizontal, vertical]` into the
    /// preview pixmap.
    pub fn render(&self, slice: &ArrayView2<'_, u8>) -> GrayImage {
        let (native_w, native_h) = slice.dim();
        let (width, height) = self.scaled;
        let mut image = GrayImage::from_fn(width, height, |x, y| {
            let column = source_index(x, width, native_w);
            let row = source_index(y, height, native_h);
            Luma([slice[[column, row]]])
        });

        if self.transform.rotate {
            image = imageops::rotate90(&image);
        }
        if self.transform.mirror_horizontal {
            imageops::flip_horizontal_in_place(&mut image);
        }
        if self.transform.mirror_vertical {
            imageops::flip_vertical_in_place(&mut image);
        }
        image
    }

    /// Centre of the voxel's footprint in pixmap coordinates
    pub fn to_display(&self, (a1, a2): (usize, usize)) -> (f64, f64) {
        let (width, height) = (f64::from(self.scaled.0), f64::from(self.scaled.1));
        let mut x = (a1 as f64 + 0.5) * width / self.native.0 as f64;
        let mut y = (a2 as f64 + 0.5) * height / self.native.1 as f64;

        if self.transform.rotate {
            (x, y) = (height - y, x);
        }
        let (pix_w, pix_h) = self.pixmap_size();
        if self.transform.mirror_horizontal {
            x = f64::from(pix_w) - x;
        }
        if self.transform.mirror_vertical {
            y = f64::from(pix_h) - y;
        }
        (x, y)
    }

    /// Maps a click back to the in-plane voxel `(horizontal, vertical)`.
    ///
    /// `rect` is the drawn pixmap inside the label; clicks outside it yield
    /// `None`.
    pub fn to_voxel(&self, point: (f64, f64), rect: PixmapRect) -> Option<(usize, usize)> {
        if !rect.contains(point) || self.native.0 == 0 || self.native.1 == 0 {
            return None;
        }
        let mut u = point.0 - rect.left;
        let mut v = point.1 - rect.top;

        if self.transform.mirror_vertical {
            v = rect.height - v;
        }
        if self.transform.mirror_horizontal {
            u = rect.width - u;
        }
        // Undo the clockwise rotation; rows and columns swap roles.
        let (x, y, scaled_w, scaled_h) = if self.transform.rotate {
            (v, rect.width - u, rect.height, rect.width)
        } else {
            (u, v, rect.width, rect.height)
        };

        let a1 = unscale(x, scaled_w, self.native.0);
        let a2 = unscale(y, scaled_h, self.native.1);
        Some((a1, a2))
    }
}

#[inline]
fn source_index(pixel: u32, scaled: u32, native: usize) -> usize {
    let index = ((f64::from(pixel) + 0.5) * native as f64 / f64::from(scaled)).floor() as usize;
    index.min(native - 1)
}

#[inline]
fn unscale(position: f64, scaled: f64, native: usize) -> usize {
    let index = (position * native as f64 / scaled).floor().max(0.0) as usize;
    index.min(native - 1)
}
