//! One QC session: the loaded dataset, its display copy, the exclusion set
//! and the state of the three preview panes.
//!
//! A UI shell owns a single [`Session`], forwards user actions as
//! [`UiEvent`]s and re-renders exactly the panes named in the returned
//! [`Redraw`]. Loading a dataset replaces everything tied to the previous
//! one; a failed load leaves the session as it was.

use crate::config::{PaneTransforms, QcConfig};
use crate::dataset_loader::{
    Dataset, DatasetError, DatasetLoader, DatasetPaths, DatasetSource, NiftiSource,
};
use crate::enums::Orientation;
use crate::exclusion::{ExclusionSet, ValidationError};
use crate::locator::{DisplayTransform, Locator, PixmapRect, PreviewBox};
use crate::rescaler::{RescaleError, rescale};
use crate::saver::{SaveError, SaveOutcome, VolumeWriter, save};
use crate::volume::Volume8;

use image::GrayImage;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QcError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rescale(#[from] RescaleError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("No dataset loaded")]
    NoDataset,
}

/// Named user actions a UI shell forwards to the session
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Show another diffusion direction in every pane
    SelectDirection(usize),
    /// Move the slice shown by one pane
    MoveSlice {
        orientation: Orientation,
        index: usize,
    },
    SetTransform {
        orientation: Orientation,
        transform: DisplayTransform,
    },
    /// Click inside a pane's label; `rect` is where the pixmap was drawn
    Click {
        orientation: Orientation,
        point: (f64, f64),
        rect: PixmapRect,
    },
    ExcludeCurrent,
    IncludeCurrent,
    /// Manual edit of the exclusion list text
    EditExclusions(String),
    ClearExclusions,
    /// Drop the dataset and return to the empty state
    Unload,
}

/// What changed as a result of an event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Redraw {
    pub panes: BTreeSet<Orientation>,
    /// The exclusion list text needs refreshing
    pub exclusions: bool,
}

impl Redraw {
    fn everything() -> Self {
        Self {
            panes: Orientation::ALL.into_iter().collect(),
            exclusions: true,
        }
    }

    fn exclusions() -> Self {
        Self {
            panes: BTreeSet::new(),
            exclusions: true,
        }
    }

    fn pane(orientation: Orientation) -> Self {
        Self {
            panes: BTreeSet::from([orientation]),
            exclusions: false,
        }
    }

    /// A pane needs redrawing when the position along the axis it holds
    /// fixed has changed.
    fn moved(from: [usize; 3], to: [usize; 3]) -> Self {
        Self {
            panes: Orientation::ALL
                .into_iter()
                .filter(|o| from[o.fixed_axis()] != to[o.fixed_axis()])
                .collect(),
            exclusions: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty() && !self.exclusions
    }
}

struct Loaded {
    dataset: Dataset,
    display: Volume8,
    exclusions: ExclusionSet,
    /// (x, y, z)
    position: [usize; 3],
    direction: usize,
}

pub struct Session {
    config: QcConfig,
    transforms: PaneTransforms,
    loaded: Option<Loaded>,
}

impl Session {
    pub fn new(config: QcConfig) -> Self {
        Self {
            transforms: config.transforms,
            config,
            loaded: None,
        }
    }

    pub fn config(&self) -> &QcConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Validates and rescales a dataset, then makes it the current one with
    /// an empty exclusion set. `progress` receives the 1-based index of each
    /// rescaled direction.
    ///
    /// # Errors
    ///
    /// On a count mismatch or a rescale failure the previous dataset, if
    /// any, stays loaded.
    pub fn load(
        &mut self,
        source: &dyn DatasetSource,
        progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<Redraw, QcError> {
        let dataset = DatasetLoader::load(source)?;
        let display = rescale(
            dataset.volume(),
            self.config.rescale_mode,
            self.config.quantile,
            progress,
        )?;

        let (x, y, z, directions) = dataset.volume().dim();
        info!("Session ready: {directions} directions, mode {:?}", self.config.rescale_mode);
        self.loaded = Some(Loaded {
            exclusions: ExclusionSet::new(directions),
            position: [x / 2, y / 2, z / 2],
            direction: 0,
            dataset,
            display,
        });
        Ok(Redraw::everything())
    }

    /// Opens a NIfTI image with its `bvals` / `bvecs` files and loads it
    pub fn load_from_paths(
        &mut self,
        paths: DatasetPaths,
        progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<Redraw, QcError> {
        let source = NiftiSource::open(paths)?;
        self.load(&source, progress)
    }

    pub fn handle(&mut self, event: UiEvent) -> Result<Redraw, QcError> {
        debug!("event {event:?}");
        if let UiEvent::SetTransform {
            orientation,
            transform,
        } = event
        {
            self.transforms.set(orientation, transform);
            return Ok(Redraw::pane(orientation));
        }
        if let UiEvent::Unload = event {
            let was_loaded = self.loaded.take().is_some();
            return Ok(if was_loaded { Redraw::everything() } else { Redraw::default() });
        }

        let transforms = self.transforms;
        let preview = self.config.preview;
        let loaded = self.loaded.as_mut().ok_or(QcError::NoDataset)?;
        let redraw = match event {
            UiEvent::SelectDirection(direction) => {
                if direction >= loaded.dataset.signal_length() || direction == loaded.direction {
                    Redraw::default()
                } else {
                    loaded.direction = direction;
                    let mut redraw = Redraw::everything();
                    redraw.exclusions = false;
                    redraw
                }
            }
            UiEvent::MoveSlice { orientation, index } => {
                if !loaded.display.is_valid_index(index, orientation) {
                    warn!("slice {index} out of range for {orientation:?}");
                    Redraw::default()
                } else {
                    let before = loaded.position;
                    loaded.position[orientation.fixed_axis()] = index;
                    Redraw::moved(before, loaded.position)
                }
            }
            UiEvent::Click {
                orientation,
                point,
                rect,
            } => {
                let locator = locator_for(loaded, orientation, transforms.get(orientation), preview);
                match locator.to_voxel(point, rect) {
                    Some(in_plane) => {
                        let before = loaded.position;
                        loaded.position = orientation.apply_click(before, in_plane);
                        Redraw::moved(before, loaded.position)
                    }
                    None => Redraw::default(),
                }
            }
            UiEvent::ExcludeCurrent => {
                if loaded.exclusions.add(loaded.direction) {
                    Redraw::exclusions()
                } else {
                    Redraw::default()
                }
            }
            UiEvent::IncludeCurrent => {
                if loaded.exclusions.remove(loaded.direction) {
                    Redraw::exclusions()
                } else {
                    Redraw::default()
                }
            }
            UiEvent::EditExclusions(text) => {
                loaded.exclusions.replace(&text)?;
                Redraw::exclusions()
            }
            UiEvent::ClearExclusions => {
                loaded.exclusions.clear();
                Redraw::exclusions()
            }
            UiEvent::SetTransform { .. } | UiEvent::Unload => Redraw::default(),
        };
        Ok(redraw)
    }

    /// Preview of one pane for the current direction and position
    pub fn render(&self, orientation: Orientation) -> Option<GrayImage> {
        let loaded = self.loaded.as_ref()?;
        let index = loaded.position[orientation.fixed_axis()];
        let slice = loaded
            .display
            .get_slice_from_axis(index, loaded.direction, orientation)?;
        Some(self.locator(orientation)?.render(&slice))
    }

    /// The mapping used to render `orientation`, for hit testing by the shell
    pub fn locator(&self, orientation: Orientation) -> Option<Locator> {
        let loaded = self.loaded.as_ref()?;
        Some(locator_for(
            loaded,
            orientation,
            self.transforms.get(orientation),
            self.config.preview,
        ))
    }

    pub fn transform(&self, orientation: Orientation) -> DisplayTransform {
        self.transforms.get(orientation)
    }

    /// Writes the QC-edited dataset. `Ok(None)` means nothing was excluded
    /// and nothing was written.
    pub fn save(&self, writer: &dyn VolumeWriter) -> Result<Option<SaveOutcome>, QcError> {
        let loaded = self.loaded.as_ref().ok_or(QcError::NoDataset)?;
        Ok(save(
            &loaded.dataset,
            &loaded.exclusions,
            &self.config.suffix,
            writer,
        )?)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.loaded.as_ref().map(|l| &l.dataset)
    }

    pub fn display_volume(&self) -> Option<&Volume8> {
        self.loaded.as_ref().map(|l| &l.display)
    }

    pub fn exclusions(&self) -> Option<&ExclusionSet> {
        self.loaded.as_ref().map(|l| &l.exclusions)
    }

    /// Text shown in the exclusion editor; also what the editor reverts to
    /// after a rejected edit
    pub fn exclusion_text(&self) -> String {
        self.exclusions()
            .map(ToString::to_string)
            .unwrap_or_else(|| "[]".to_string())
    }

    /// Current (x, y, z) position
    pub fn position(&self) -> Option<[usize; 3]> {
        self.loaded.as_ref().map(|l| l.position)
    }

    pub fn direction(&self) -> Option<usize> {
        self.loaded.as_ref().map(|l| l.direction)
    }
}

fn locator_for(
    loaded: &Loaded,
    orientation: Orientation,
    transform: DisplayTransform,
    preview: PreviewBox,
) -> Locator {
    let dim = loaded.display.data().shape();
    let (h, v) = orientation.in_plane_axes();
    Locator::new(
        orientation,
        (dim[h], dim[v]),
        loaded.display.in_plane_spacing(orientation),
        preview,
        transform,
    )
}
