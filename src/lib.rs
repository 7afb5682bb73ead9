//! # DWI-QC library
//!
//! This crate serves the non-visual core of a quality control tool for
//! diffusion-weighted MRI: a reviewer scrolls through every diffusion
//! direction, marks the corrupted ones, and saves a copy of the dataset
//! without them.

//!
//! A dataset is a 4D volume (X, Y, Z, direction) plus one b-value and one
//! b-vector per direction. Volumes are read from NIfTI files together with
//! FSL style `bvals` / `bvecs` text files, or handed over already decoded
//! through [`DatasetSource`]. The volume can be previewed in the three
//! medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//!  Every preview is rescaled to 8 bits once per load, scaled to its preview
//!  box while keeping the physical aspect ratio, and can be mirrored or (for
//!  Coronal and Sagittal) rotated. Clicks on a preview are mapped back to
//!  voxel positions through the same [`Locator`].
//!
//!  Intensity rescaling supports three modes:
//!   - Robust percentile per direction (default, 99.5th percentile)
//!   - True maximum per direction
//!   - Fixed 12-bit ceiling for the whole volume
//!
//! # Examples
//!
//! ## Reviewing a dataset
//!
//! Load a dataset, look at the centre of the Sagittal axis for direction 3,
//! exclude it and save the remaining directions next to the input.
//!
//! ```no_run
//! # use dwi_qc::{DatasetPaths, NiftiWriter, Orientation, QcConfig, Session, UiEvent};
//! let mut session = Session::new(QcConfig::default());
//! session
//!     .load_from_paths(DatasetPaths::new("dwi.nii.gz", "dwi.bvals", "dwi.bvecs"), None)
//!     .expect("should have loaded the dataset");
//! session.handle(UiEvent::SelectDirection(3)).unwrap();
//! let image = session
//!     .render(Orientation::Sagittal)
//!     .expect("should have rendered the sagittal pane");
//! image.save("sagittal.png").unwrap();
//!
//! session.handle(UiEvent::ExcludeCurrent).unwrap();
//! session.save(&NiftiWriter).expect("should have saved the QC copy");
//! ```

pub mod config;
pub mod dataset_loader;
pub mod directions;
pub mod enums;
pub mod exclusion;
pub mod locator;
pub mod rescaler;
pub mod saver;
pub mod session;
pub mod volume;

pub use config::QcConfig;
pub use dataset_loader::{Dataset, DatasetError, DatasetLoader, DatasetPaths, DatasetSource};
pub use enums::{Orientation, RescaleMode};
pub use exclusion::{ExclusionSet, ValidationError};
pub use locator::{DisplayTransform, Locator, PixmapRect, PreviewBox};
pub use rescaler::rescale;
pub use saver::{NiftiWriter, SaveError, VolumeWriter};
pub use session::{QcError, Redraw, Session, UiEvent};
pub use volume::{Volume, Volume8};
