use serde::{Deserialize, Serialize};

use crate::rescaler::TWELVE_BIT_CEILING;

/// The three orthogonal slicing axes. Each one holds a single spatial axis
/// fixed and spans the other two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    /// Holds Z, spans X (horizontal) and Y (vertical)
    Axial,
    /// Holds Y, spans X (horizontal) and Z (vertical)
    Coronal,
    /// Holds X, spans Y (horizontal) and Z (vertical)
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Spatial axis held fixed by this view (0 = X, 1 = Y, 2 = Z)
    pub fn fixed_axis(self) -> usize {
        match self {
            Orientation::Axial => 2,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 0,
        }
    }

    /// The two in-plane spatial axes, horizontal first
    pub fn in_plane_axes(self) -> (usize, usize) {
        match self {
            Orientation::Axial => (0, 1),
            Orientation::Coronal => (0, 2),
            Orientation::Sagittal => (1, 2),
        }
    }

    /// Only the views that are not aligned with the primary (axial) view
    /// can be rotated for display.
    pub fn supports_rotation(self) -> bool {
        !matches!(self, Orientation::Axial)
    }

    /// Writes an in-plane `(a1, a2)` position into a full `(x, y, z)` index.
    /// The slicing axis's own position is left as it was.
    pub fn apply_click(self, index: [usize; 3], in_plane: (usize, usize)) -> [usize; 3] {
        let (h, v) = self.in_plane_axes();
        let mut index = index;
        index[h] = in_plane.0;
        index[v] = in_plane.1;
        index
    }
}

/// How raw samples are mapped into 8-bit display intensities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RescaleMode {
    /// One global linear scale assuming a known acquisition ceiling
    FixedDepth { ceiling: f32 },
    /// Per-channel clamp at a percentile of the channel's samples
    #[default]
    RobustPercentile,
    /// Per-channel scale by the channel's true maximum
    ChannelMax,
}

impl RescaleMode {
    pub fn twelve_bit() -> Self {
        RescaleMode::FixedDepth {
            ceiling: TWELVE_BIT_CEILING,
        }
    }
}
