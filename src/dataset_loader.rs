use crate::directions::{DirectionSet, parse_b_values, parse_b_vectors};
use crate::volume::Volume;

use log::{info, warn};
use ndarray::{Array2, Axis, Ix4};
use nifti::error::NiftiError;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(
        "Direction counts disagree (image: {}, b-values: {b_values}, b-vectors: {b_vectors})",
        .image.map_or_else(|| "?".to_string(), |n| n.to_string())
    )]
    Mismatch {
        image: Option<usize>,
        b_values: usize,
        b_vectors: usize,
    },

    #[error("Invalid shape: {0}")]
    Shape(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("NIfTI error: {0}")]
    Nifti(#[from] NiftiError),
}

/// Locations of the three files that make up a DWI dataset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetPaths {
    pub image: PathBuf,
    pub b_values: PathBuf,
    pub b_vectors: PathBuf,
}

impl DatasetPaths {
    pub fn new(
        image: impl Into<PathBuf>,
        b_values: impl Into<PathBuf>,
        b_vectors: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image: image.into(),
            b_values: b_values.into(),
            b_vectors: b_vectors.into(),
        }
    }
}

/// Whatever decodes the files on disk. Implementations only expose what
/// they read; agreement between the three parts is checked by
/// [`DatasetLoader::load`].
pub trait DatasetSource {
    fn image_data(&self) -> &Volume;

    fn b_values(&self) -> &[f64];

    /// 3 x D matrix
    fn b_vectors(&self) -> &Array2<f64>;

    fn signal_length(&self) -> usize {
        self.image_data().directions()
    }

    fn paths(&self) -> Option<&DatasetPaths> {
        None
    }
}

/// Already decoded data, e.g. handed over by a UI shell or built in tests
#[derive(Clone, Debug)]
pub struct InMemorySource {
    pub volume: Volume,
    pub b_values: Vec<f64>,
    pub b_vectors: Array2<f64>,
    pub paths: Option<DatasetPaths>,
}

impl DatasetSource for InMemorySource {
    fn image_data(&self) -> &Volume {
        &self.volume
    }

    fn b_values(&self) -> &[f64] {
        &self.b_values
    }

    fn b_vectors(&self) -> &Array2<f64> {
        &self.b_vectors
    }

    fn paths(&self) -> Option<&DatasetPaths> {
        self.paths.as_ref()
    }
}

/// A NIfTI image plus FSL-style `bvals` / `bvecs` text files
#[derive(Debug)]
pub struct NiftiSource {
    volume: Volume,
    b_values: Vec<f64>,
    b_vectors: Array2<f64>,
    paths: DatasetPaths,
}

impl NiftiSource {
    /// Reads all three files. A 3D image is treated as a single direction.
    pub fn open(paths: DatasetPaths) -> Result<Self, DatasetError> {
        let volume = Self::read_volume(&paths.image)?;
        let b_values = parse_b_values(&read_text(&paths.b_values)?)?;
        let b_vectors = parse_b_vectors(&read_text(&paths.b_vectors)?)?;
        Ok(Self {
            volume,
            b_values,
            b_vectors,
            paths,
        })
    }

    fn read_volume(path: &Path) -> Result<Volume, DatasetError> {
        let object = ReaderOptions::new().read_file(path)?;
        let pixdim = object.header().pixdim;
        let spacing = [
            positive_spacing(pixdim[1], 0),
            positive_spacing(pixdim[2], 1),
            positive_spacing(pixdim[3], 2),
            positive_spacing(pixdim[4], 3),
        ];

        let data = object.into_volume().into_ndarray::<f32>()?;
        let data = match data.ndim() {
            3 => data.insert_axis(Axis(3)),
            4 => data,
            n => {
                return Err(DatasetError::Shape(format!(
                    "expected a 3D or 4D image, found {n} dimensions"
                )));
            }
        };
        let data = data
            .into_dimensionality::<Ix4>()
            .map_err(|e| DatasetError::Shape(e.to_string()))?;
        Ok(Volume::new(data, spacing))
    }
}

impl DatasetSource for NiftiSource {
    fn image_data(&self) -> &Volume {
        &self.volume
    }

    fn b_values(&self) -> &[f64] {
        &self.b_values
    }

    fn b_vectors(&self) -> &Array2<f64> {
        &self.b_vectors
    }

    fn paths(&self) -> Option<&DatasetPaths> {
        Some(&self.paths)
    }
}

/// A validated dataset: a volume whose direction count agrees with its
/// b-values and b-vectors.
#[derive(Clone, Debug)]
pub struct Dataset {
    volume: Volume,
    directions: DirectionSet,
    paths: Option<DatasetPaths>,
}

impl Dataset {
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn directions(&self) -> &DirectionSet {
        &self.directions
    }

    pub fn paths(&self) -> Option<&DatasetPaths> {
        self.paths.as_ref()
    }

    /// Number of directions (D)
    pub fn signal_length(&self) -> usize {
        self.directions.len()
    }
}

pub struct DatasetLoader;

impl DatasetLoader {
    /// Validate a decoded dataset
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Mismatch`] if the image, b-values and
    /// b-vectors do not describe the same number of directions, and
    /// [`DatasetError::Shape`] for an empty image or malformed b-vectors.
    pub fn load(source: &dyn DatasetSource) -> Result<Dataset, DatasetError> {
        let image = source.signal_length();
        let b_values = source.b_values().len();
        let b_vectors = source.b_vectors();
        if b_vectors.nrows() != 3 {
            return Err(DatasetError::Shape(format!(
                "b-vectors must have 3 rows, found {}",
                b_vectors.nrows()
            )));
        }
        if image != b_values || image != b_vectors.ncols() {
            return Err(DatasetError::Mismatch {
                image: Some(image),
                b_values,
                b_vectors: b_vectors.ncols(),
            });
        }

        let volume = source.image_data();
        if volume.data().is_empty() {
            return Err(DatasetError::Shape("image has no samples".into()));
        }

        let directions = DirectionSet::new(source.b_values().to_vec(), b_vectors.clone())?;
        let (x, y, z, d) = volume.dim();
        info!("Loaded dataset {x}x{y}x{z} with {d} directions");
        Ok(Dataset {
            volume: volume.clone(),
            directions,
            paths: source.paths().cloned(),
        })
    }

    /// Open and validate a NIfTI + bvals + bvecs triple
    pub fn load_from_paths(paths: DatasetPaths) -> Result<Dataset, DatasetError> {
        let source = NiftiSource::open(paths)?;
        Self::load(&source)
    }
}

fn read_text(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn positive_spacing(value: f32, axis: usize) -> f32 {
    if value > 0.0 && value.is_finite() {
        value
    } else {
        warn!("Voxel spacing {value} on axis {axis} is not positive, using 1.0");
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, array};

    fn source(directions: usize, b_values: Vec<f64>, b_vectors: Array2<f64>) -> InMemorySource {
        InMemorySource {
            volume: Volume::new(Array4::zeros((4, 4, 4, directions)), [1.0, 1.0, 2.0, 1.0]),
            b_values,
            b_vectors,
            paths: None,
        }
    }

    fn unit_vectors(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((3, n), |(axis, d)| if axis == d % 3 { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_load_valid_dataset() {
        let source = source(5, vec![0.0, 1000.0, 1000.0, 1000.0, 1000.0], unit_vectors(5));
        let dataset = DatasetLoader::load(&source).unwrap();
        assert_eq!(dataset.signal_length(), 5);
        assert_eq!(dataset.volume().dim(), (4, 4, 4, 5));
        assert_eq!(dataset.directions().get(4), Some((1000.0, [0.0, 1.0, 0.0])));
    }

    #[test]
    fn test_load_rejects_count_mismatch() {
        let short_bvals = source(5, vec![0.0, 1000.0], unit_vectors(5));
        let err = DatasetLoader::load(&short_bvals).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Mismatch {
                image: Some(5),
                b_values: 2,
                b_vectors: 5
            }
        ));
        assert_eq!(
            err.to_string(),
            "Direction counts disagree (image: 5, b-values: 2, b-vectors: 5)"
        );

        let short_bvecs = source(2, vec![0.0, 1000.0], array![[1.0], [0.0], [0.0]]);
        assert!(matches!(
            DatasetLoader::load(&short_bvecs),
            Err(DatasetError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let paths = DatasetPaths::new("missing.nii", "missing.bvals", "missing.bvecs");
        assert!(DatasetLoader::load_from_paths(paths).is_err());
        let err = read_text(Path::new("missing.bvals")).unwrap_err();
        assert!(err.to_string().contains("missing.bvals"));
    }
}
