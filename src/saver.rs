//! Writes the QC-edited copy of a dataset next to the original files.
//!
//! Only the directions that were not excluded are written. Alongside the
//! reduced image, b-values and b-vectors the saver leaves a provenance log
//! and a shell script that runs the usual FSL tensor fit on the new files.

use crate::dataset_loader::{Dataset, DatasetPaths};
use crate::directions::{format_b_values, format_b_vectors};
use crate::exclusion::ExclusionSet;
use crate::volume::Volume;

use log::{info, warn};
use nifti::error::NiftiError;
use nifti::writer::WriterOptions;
use nifti::{NiftiHeader, NiftiType};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix marking files as QC-edited
pub const DEFAULT_SUFFIX: &str = ".exc";

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Could not save QC output to {}", .directory.display())]
    Write {
        directory: PathBuf,
        #[source]
        source: WriteFailure,
    },

    #[error("Every direction is excluded, there is nothing left to save")]
    NothingRetained,

    #[error("Dataset was not loaded from files, nowhere to save it")]
    NoPaths,
}

#[derive(Debug, Error)]
pub enum WriteFailure {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Nifti(#[from] NiftiError),
}

/// Encodes the reduced volume. `reference` is the original image, whose
/// header the output should inherit.
pub trait VolumeWriter {
    fn write_volume(
        &self,
        volume: &Volume,
        reference: &Path,
        target: &Path,
    ) -> Result<(), WriteFailure>;
}

/// Writes NIfTI-1 images reusing the original header (affine, units,
/// spacing) and, where it can, the original datatype
#[derive(Clone, Copy, Debug, Default)]
pub struct NiftiWriter;

impl VolumeWriter for NiftiWriter {
    fn write_volume(
        &self,
        volume: &Volume,
        reference: &Path,
        target: &Path,
    ) -> Result<(), WriteFailure> {
        let header = NiftiHeader::from_file(reference)?;

        // `WriterOptions` rebuilds the file name from its stem and loses any
        // inner dot (`dwi.exc.nii` becomes `dwi.nii`), so encode under a
        // scratch name next to the target and rename it.
        let extension = if file_name(target).ends_with(".gz") {
            ".nii.gz"
        } else {
            ".nii"
        };
        let directory = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let scratch = tempfile::Builder::new()
            .suffix(extension)
            .tempfile_in(directory)?
            .into_temp_path();

        let options = WriterOptions::new(&scratch).reference_header(&header);
        write_in_reference_type(&options, &header, volume)?;
        scratch.persist(target).map_err(std::io::Error::from)?;
        Ok(())
    }
}

/// Samples were scaled by `scl_slope` / `scl_inter` on read; integer
/// datatypes are only restored when that scaling is the identity.
fn write_in_reference_type(
    options: &WriterOptions<'_>,
    header: &NiftiHeader,
    volume: &Volume,
) -> Result<(), NiftiError> {
    let data = volume.data();
    let identity = (header.scl_slope == 0.0 || header.scl_slope == 1.0) && header.scl_inter == 0.0;
    if !identity {
        return options.write_nifti(data);
    }
    match header.data_type() {
        Ok(NiftiType::Uint8) => options.write_nifti(&data.mapv(|v| v.round() as u8)),
        Ok(NiftiType::Int8) => options.write_nifti(&data.mapv(|v| v.round() as i8)),
        Ok(NiftiType::Uint16) => options.write_nifti(&data.mapv(|v| v.round() as u16)),
        Ok(NiftiType::Int16) => options.write_nifti(&data.mapv(|v| v.round() as i16)),
        Ok(NiftiType::Uint32) => options.write_nifti(&data.mapv(|v| v.round() as u32)),
        Ok(NiftiType::Int32) => options.write_nifti(&data.mapv(|v| v.round() as i32)),
        Ok(NiftiType::Uint64) => options.write_nifti(&data.mapv(|v| v.round() as u64)),
        Ok(NiftiType::Int64) => options.write_nifti(&data.mapv(|v| v.round() as i64)),
        Ok(NiftiType::Float64) => options.write_nifti(&data.mapv(f64::from)),
        _ => options.write_nifti(data),
    }
}

/// Every file produced by one save
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub image: PathBuf,
    pub b_values: PathBuf,
    pub b_vectors: PathBuf,
    pub script: PathBuf,
    pub log: PathBuf,
}

impl SaveOutcome {
    /// Output locations for a dataset, known before anything is written
    pub fn plan(paths: &DatasetPaths, suffix: &str) -> Self {
        let image = insert_suffix(&paths.image, suffix);
        let script = append(&image, ".fsl_dtifit.sh");
        Self {
            b_values: append(&paths.b_values, suffix),
            b_vectors: append(&paths.b_vectors, suffix),
            log: append(&paths.image, &format!("{suffix}.log")),
            image,
            script,
        }
    }
}

/// Saves the retained directions of `dataset`.
///
/// Returns `Ok(None)` without touching the disk when nothing is excluded.
///
/// # Errors
///
/// Returns [`SaveError::NothingRetained`] before writing anything when every
/// direction is excluded, and [`SaveError::Write`] naming the target
/// directory if any file cannot be written. Files already written by a
/// failed save are removed.
pub fn save(
    dataset: &Dataset,
    exclusions: &ExclusionSet,
    suffix: &str,
    writer: &dyn VolumeWriter,
) -> Result<Option<SaveOutcome>, SaveError> {
    if exclusions.is_empty() {
        info!("Nothing to do: no directions excluded");
        return Ok(None);
    }
    if exclusions.retained().is_empty() {
        warn!("All {} directions are excluded, refusing to save", dataset.signal_length());
        return Err(SaveError::NothingRetained);
    }
    let paths = dataset.paths().ok_or(SaveError::NoPaths)?;
    let outcome = SaveOutcome::plan(paths, suffix);
    let directory = paths
        .image
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    write_all(dataset, exclusions, paths, &outcome, writer)
        .map_err(|source| SaveError::Write { directory, source })?;

    info!(
        "Saved {} of {} directions to {}",
        exclusions.retained().len(),
        dataset.signal_length(),
        outcome.image.display()
    );
    Ok(Some(outcome))
}

fn write_all(
    dataset: &Dataset,
    exclusions: &ExclusionSet,
    paths: &DatasetPaths,
    outcome: &SaveOutcome,
    writer: &dyn VolumeWriter,
) -> Result<(), WriteFailure> {
    let mut written = Vec::new();
    let result = write_outputs(dataset, exclusions, paths, outcome, writer, &mut written);
    if result.is_err() {
        for path in written {
            if let Err(e) = fs::remove_file(path) {
                warn!("Could not remove partial output {}: {e}", path.display());
            }
        }
    }
    result
}

/// Writes every output in order, the log last, recording each finished file
/// in `written`.
fn write_outputs<'a>(
    dataset: &Dataset,
    exclusions: &ExclusionSet,
    paths: &DatasetPaths,
    outcome: &'a SaveOutcome,
    writer: &dyn VolumeWriter,
    written: &mut Vec<&'a Path>,
) -> Result<(), WriteFailure> {
    let retained = exclusions.retained();
    let volume = dataset.volume().select_directions(&retained);
    let directions = dataset.directions().select(&retained);

    writer.write_volume(&volume, &paths.image, &outcome.image)?;
    written.push(outcome.image.as_path());
    fs::write(&outcome.b_values, format_b_values(directions.b_values()))?;
    written.push(outcome.b_values.as_path());
    fs::write(&outcome.b_vectors, format_b_vectors(directions.b_vectors()))?;
    written.push(outcome.b_vectors.as_path());
    write_script(outcome)?;
    written.push(outcome.script.as_path());
    fs::write(&outcome.log, provenance_log(paths, outcome, exclusions))?;
    Ok(())
}

fn provenance_log(paths: &DatasetPaths, outcome: &SaveOutcome, exclusions: &ExclusionSet) -> String {
    let entries = [
        ("orig_nifti", paths.image.display().to_string()),
        ("new_nifti", outcome.image.display().to_string()),
        ("orig_bvals", paths.b_values.display().to_string()),
        ("new_bvals", outcome.b_values.display().to_string()),
        ("orig_bvecs", paths.b_vectors.display().to_string()),
        ("new_bvecs", outcome.b_vectors.display().to_string()),
        ("fsl_processing_script", outcome.script.display().to_string()),
        ("imageno_excluded", exclusions.to_string()),
        ("reason", "manual QC".to_string()),
    ];
    entries
        .iter()
        .map(|(key, value)| format!("{key} = {value}\n"))
        .collect()
}

fn write_script(outcome: &SaveOutcome) -> std::io::Result<()> {
    fs::write(&outcome.script, fsl_script(outcome))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&outcome.script, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Brain extraction, eddy current correction and tensor fit of the saved
/// files. Paths are relative so the script runs from the output directory.
fn fsl_script(outcome: &SaveOutcome) -> String {
    let infile = file_name(&outcome.image);
    let brain = infile.replacen(".nii", ".brain.nii", 1);
    let brain_mask = brain.replacen(".nii", "_mask.nii", 1);
    let eddy = infile.replacen(".nii", ".ec.nii", 1);
    let fit = format!("{infile}.dtifit");
    let bvals = file_name(&outcome.b_values);
    let bvecs = file_name(&outcome.b_vectors);

    format!(
        r#"#!/bin/sh

if [ -z "$FSLDIR" ]
then
    echo "FSLDIR is not set, FSL does not appear to be installed"
    exit 1
fi

echo processing file: {infile}

bet {infile} {brain} -m -R
echo brain extraction completed: {brain}, {brain_mask}

eddy_correct {infile} {eddy} 0
echo eddy current correction completed: {eddy}

dtifit --data={eddy} --out={fit} --mask={brain_mask} --bvecs={bvecs} --bvals={bvals}
echo dti fit completed: {fit}_FA, {fit}_MD, {fit}_L1, {fit}_V1

fslview {fit}_FA {fit}_V1
"#
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `scan.nii.gz` becomes `scan<suffix>.nii.gz`; names without `.nii` get
/// `<suffix>.nii` appended.
fn insert_suffix(path: &Path, suffix: &str) -> PathBuf {
    let name = file_name(path);
    let renamed = match name.find(".nii") {
        Some(at) => format!("{}{suffix}{}", &name[..at], &name[at..]),
        None => format!("{name}{suffix}.nii"),
    };
    path.with_file_name(renamed)
}

fn append(path: &Path, extra: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(extra);
    PathBuf::from(name)
}
