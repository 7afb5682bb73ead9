use crate::enums::RescaleMode;
use crate::volume::{Volume, Volume8};

use log::debug;
use ndarray::{Array4, ArrayView3, ArrayViewMut3, Axis, Zip};
use rayon::prelude::*;
use thiserror::Error;

/// Largest sample a 12-bit scanner can produce.
pub const TWELVE_BIT_CEILING: f32 = 4095.0;

/// Percentile used by [`RescaleMode::RobustPercentile`] unless configured
pub const DEFAULT_QUANTILE: f32 = 99.5;

#[derive(Debug, Error, PartialEq)]
pub enum RescaleError {
    #[error("Quantile must lie in (0, 100], got {0}")]
    InvalidQuantile(f32),

    #[error("Fixed-depth ceiling must be positive, got {0}")]
    InvalidCeiling(f32),
}

/// Converts raw samples into 8-bit display intensities.
///
/// The per-channel modes call `progress` with the 1-based index of every
/// finished direction, synchronously, on the calling thread. The sink is
/// purely informational and has no effect on the output.
///
/// # Errors
///
/// Returns an error if `quantile` is outside `(0, 100]` for the percentile
/// mode, or if the fixed-depth ceiling is not positive.
pub fn rescale(
    volume: &Volume,
    mode: RescaleMode,
    quantile: f32,
    mut progress: Option<&mut dyn FnMut(usize)>,
) -> Result<Volume8, RescaleError> {
    let data = volume.data();
    let rescaled = match mode {
        RescaleMode::FixedDepth { ceiling } => {
            if !(ceiling > 0.0) || !ceiling.is_finite() {
                return Err(RescaleError::InvalidCeiling(ceiling));
            }
            Zip::from(data).par_map_collect(|&v| scale_to_u8(v, ceiling))
        }
        RescaleMode::RobustPercentile | RescaleMode::ChannelMax => {
            if matches!(mode, RescaleMode::RobustPercentile)
                && !(quantile > 0.0 && quantile <= 100.0)
            {
                return Err(RescaleError::InvalidQuantile(quantile));
            }
            let mut out = Array4::<u8>::zeros(data.dim());
            for (c, (channel, target)) in data
                .axis_iter(Axis(3))
                .zip(out.axis_iter_mut(Axis(3)))
                .enumerate()
            {
                let max_value = match mode {
                    RescaleMode::ChannelMax => channel_max(&channel),
                    _ => percentile(&channel, quantile),
                };
                debug!("direction {c}: max value {max_value}");
                scale_channel(&channel, target, max_value);
                if let Some(report) = progress.as_deref_mut() {
                    report(c + 1);
                }
            }
            out
        }
    };
    Ok(Volume::new(rescaled, volume.spacing()))
}

/// Percentile of the channel's finite samples, linearly interpolated
/// between the two closest order statistics.
pub fn percentile(channel: &ArrayView3<'_, f32>, quantile: f32) -> f32 {
    let mut values: Vec<f32> = channel.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.par_sort_unstable_by(f32::total_cmp);

    let rank = f64::from(quantile.clamp(0.0, 100.0)) / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = (rank - lower as f64) as f32;
    values[lower] + (values[upper] - values[lower]) * fraction
}

fn channel_max(channel: &ArrayView3<'_, f32>) -> f32 {
    channel
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max)
}

fn scale_channel(channel: &ArrayView3<'_, f32>, target: ArrayViewMut3<'_, u8>, max_value: f32) {
    if !(max_value > 0.0) || !max_value.is_finite() {
        // Nothing positive to show; the output is already zeroed.
        return;
    }
    Zip::from(target)
        .and(channel)
        .par_for_each(|out, &v| *out = scale_to_u8(v, max_value));
}

/// Clamp to `[0, max_value]` first so the cast never wraps.
#[inline]
fn scale_to_u8(value: f32, max_value: f32) -> u8 {
    if !(value > 0.0) {
        return 0;
    }
    let clamped = value.min(max_value);
    ((clamped / max_value) * 255.0) as u8
}
