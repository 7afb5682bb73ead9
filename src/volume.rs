use crate::enums::Orientation;

use ndarray::Array4;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;

/// A 4D diffusion-weighted volume with axes (X, Y, Z, Direction).
///
/// Raw volumes hold `f32` samples; the rescaled display copy is a
/// [`Volume8`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume<T = f32> {
    data: Array4<T>,
    spacing: [f32; 4],
}

/// Display-ready volume with every sample in `[0, 255]`
pub type Volume8 = Volume<u8>;

impl<T: Clone> Volume<T> {
    pub fn new(data: Array4<T>, spacing: [f32; 4]) -> Self {
        Self { data, spacing }
    }

    /// Get the dimensions of the volume (x, y, z, directions)
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    /// Number of diffusion directions (length of the 4th axis)
    pub fn directions(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array4<T> {
        &self.data
    }

    /// Physical voxel spacing, one entry per axis
    pub fn spacing(&self) -> [f32; 4] {
        self.spacing
    }

    /// Spacing of the two in-plane axes of `orientation`, horizontal first
    pub fn in_plane_spacing(&self, orientation: Orientation) -> (f32, f32) {
        let (h, v) = orientation.in_plane_axes();
        (self.spacing[h], self.spacing[v])
    }

    /// Extracts the 2D slice at `index` along the axis held by `orientation`
    /// for one direction. The view is indexed `[horizontal, vertical]`.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        direction: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, T>> {
        if !self.is_valid_index(index, orientation) || direction >= self.directions() {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![.., .., index, direction]),
            Orientation::Coronal => self.data.slice(s![.., index, .., direction]),
            Orientation::Sagittal => self.data.slice(s![index, .., .., direction]),
        };
        Some(slice)
    }

    /// Copy of the volume keeping only the given directions, in order
    pub fn select_directions(&self, directions: &[usize]) -> Self {
        Self {
            data: self.data.select(Axis(3), directions),
            spacing: self.spacing,
        }
    }

    pub fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.data.shape();
        index < dim[orientation.fixed_axis()]
    }
}
