// GNU AGPL v3 License

use super::AudioSignal;
use crate::{config::SilenceConfig, error::RemixError};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

const EMIT_EVERY: usize = 250;

/// Observer for the progress of a silence scan.
pub(crate) trait ScanProgress: Sync {
    fn frames_scanned(&self, done: usize, total: usize);
}

impl ScanProgress for () {
    fn frames_scanned(&self, _done: usize, _total: usize) {}
}

/// Length of a scan frame in samples.
///
/// Kept fractional; frame edges are truncated when converted to indices.
pub(crate) fn frame_len(sample_rate: u32, frame_duration: f64) -> Result<f64, RemixError> {
    let len = frame_duration * sample_rate as f64;
    if len < 1.0 {
        return Err(RemixError::invalid_config(format!(
            "a {}s frame at {} Hz is shorter than one sample",
            frame_duration, sample_rate
        )));
    }
    Ok(len)
}

/// Find the indices of all frames whose peak amplitude is below the threshold.
///
/// Only whole frames are scanned, so the tail after the last full frame is
/// never reported as silent.
pub(crate) fn scan_silence(
    signal: &AudioSignal,
    config: &SilenceConfig,
    progress: &impl ScanProgress,
) -> Result<Vec<usize>, RemixError> {
    let frame_len = frame_len(signal.sample_rate, config.frame_duration)?;
    let num_frames = (signal.len() as f64 / frame_len).floor() as usize;
    // peaks are compared as f32, the type of the samples
    let threshold = config.threshold as f32;

    tracing::info!(
        "Scanning {} frames of {:.1} samples for silence",
        num_frames,
        frame_len
    );

    let scanned = AtomicUsize::new(0);
    let silent = (0..num_frames)
        .into_par_iter()
        .filter(|&frame| {
            let peak = peak_amplitude(frame_samples(signal, frame_len, frame));

            let done = scanned.fetch_add(1, Relaxed) + 1;
            if done % EMIT_EVERY == 0 || done == num_frames {
                progress.frames_scanned(done, num_frames);
            }

            peak < threshold
        })
        .collect::<Vec<_>>();

    tracing::info!("{} of {} frames are silent", silent.len(), num_frames);
    Ok(silent)
}

/// Samples of the frame at `frame`, as a half-open range.
pub(super) fn frame_samples(signal: &AudioSignal, frame_len: f64, frame: usize) -> &[f32] {
    let start = frame_start(frame_len, frame).min(signal.len());
    let stop = frame_start(frame_len, frame + 1).min(signal.len());
    &signal.samples[start..stop]
}

#[inline]
pub(super) fn frame_start(frame_len: f64, frame: usize) -> usize {
    (frame as f64 * frame_len) as usize
}

fn peak_amplitude(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| OrderedFloat(s.abs()))
        .max()
        .map_or(0.0, |peak| peak.0)
}
