// GNU AGPL v3 License

use super::{
    scan::{frame_len, frame_start},
    AudioSignal, Segment, SegmentList,
};
use crate::{config::SilenceConfig, error::RemixError};
use ordered_float::OrderedFloat;

/// Turn the silent frames of a signal into a list of segments.
///
/// A new boundary starts wherever silence resumes after more than
/// `frame_min_size` frames of sound. The first boundary is always the
/// start of the signal, and the last segment runs to its final sample.
pub(crate) fn build_segments(
    silent_frames: &[usize],
    signal: &AudioSignal,
    config: &SilenceConfig,
) -> Result<SegmentList, RemixError> {
    let (&first, rest) = silent_frames
        .split_first()
        .ok_or(RemixError::InsufficientSilence {
            threshold: config.threshold,
        })?;
    let frame_len = frame_len(signal.sample_rate, config.frame_duration)?;

    let mut boundaries = vec![0usize];
    let mut previous = first;

    for &frame in rest {
        if frame - previous > config.frame_min_size {
            let boundary = match config.refine_window {
                Some(window) => quietest_sample(signal, frame_len, frame, window),
                None => frame_start(frame_len, frame),
            };

            // boundaries must leave at least two samples for the segment before them
            let last = boundaries[boundaries.len() - 1];
            if boundary > last + 1 {
                boundaries.push(boundary);
            } else {
                tracing::debug!(
                    "Dropping boundary at sample {} (previous at {})",
                    boundary,
                    last
                );
            }
        }

        previous = frame;
    }

    if boundaries.len() < 2 {
        return Err(RemixError::DegenerateSegmentation {
            boundaries: boundaries.len(),
        });
    }

    tracing::info!("Found {} cut points", boundaries.len());

    let tail = Segment {
        start: boundaries[boundaries.len() - 1],
        end: signal.len() - 1,
    };
    let segments = boundaries
        .windows(2)
        .map(|pair| Segment {
            start: pair[0],
            end: pair[1] - 1,
        })
        .chain(Some(tail))
        .collect();

    Ok(SegmentList::new(segments, signal.sample_rate))
}

/// Index of the quietest sample in the lookahead window after a frame's start.
fn quietest_sample(signal: &AudioSignal, frame_len: f64, frame: usize, window: f64) -> usize {
    let start = frame_start(frame_len, frame);
    let stop = (frame as f64 * frame_len + window * signal.sample_rate as f64) as usize;
    let stop = stop.clamp(start + 1, signal.len());

    // min_by_key keeps the first of equal minimums
    signal.samples[start..stop]
        .iter()
        .enumerate()
        .min_by_key(|(_, sample)| OrderedFloat(sample.abs()))
        .map_or(start, |(offset, _)| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::scan_silence;

    fn config(refine: bool) -> SilenceConfig {
        SilenceConfig {
            frame_duration: 0.1,
            threshold: 0.02,
            frame_min_size: 3,
            refine_window: refine.then(|| 0.3),
        }
    }

    /// A signal of `frames` frames where the listed frame ranges are silent.
    fn signal_with_silence(
        sample_rate: u32,
        frames: usize,
        silent: &[std::ops::Range<usize>],
    ) -> AudioSignal {
        let frame_len = sample_rate as usize / 10;
        let mut samples = vec![0.5f32; frames * frame_len];
        for range in silent {
            samples[range.start * frame_len..range.end * frame_len].fill(0.0);
        }
        AudioSignal::new(samples, sample_rate)
    }

    fn segment(signal: &AudioSignal, refine: bool) -> Result<SegmentList, RemixError> {
        let config = config(refine);
        let silent = scan_silence(signal, &config, &())?;
        build_segments(&silent, signal, &config)
    }

    fn assert_covers(list: &SegmentList, len: usize) {
        let segments = list.iter().collect::<Vec<_>>();
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[segments.len() - 1].end, len - 1);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
            assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn never_silent_signal_fails() {
        let signal = AudioSignal::new(vec![0.1; 10_000], 10);
        assert!(matches!(
            segment(&signal, true),
            Err(RemixError::InsufficientSilence { .. })
        ));
    }

    #[test]
    fn silence_at_both_ends_gives_two_segments() {
        let signal = signal_with_silence(10, 1000, &[0..6, 995..1000]);
        let list = segment(&signal, true).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.first(), Segment { start: 0, end: 994 });
        assert_eq!(list.last(), Segment { start: 995, end: 999 });
    }

    #[test]
    fn single_silent_run_is_degenerate() {
        let signal = signal_with_silence(100, 50, &[10..20]);
        assert!(matches!(
            segment(&signal, true),
            Err(RemixError::DegenerateSegmentation { boundaries: 1 })
        ));
    }

    #[test]
    fn separated_silent_runs_give_one_segment_each() {
        let signal = signal_with_silence(100, 100, &[0..2, 20..22, 40..42, 60..62, 80..82]);
        let list = segment(&signal, true).unwrap();

        let starts = list.iter().map(|s| s.start).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 200, 400, 600, 800]);
        assert_covers(&list, signal.len());
    }

    #[test]
    fn short_sound_gaps_are_merged() {
        // frames 1 and 4 are only 3 apart, which does not exceed frame_min_size
        let signal = signal_with_silence(100, 60, &[0..2, 4..6, 30..32]);
        let list = segment(&signal, false).unwrap();

        let starts = list.iter().map(|s| s.start).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 300]);
    }

    #[test]
    fn refinement_snaps_to_quietest_sample() {
        let mut signal = signal_with_silence(100, 60, &[0..2, 30..33]);
        signal.samples[300..330].fill(0.01);
        signal.samples[317] = 0.0;

        let refined = segment(&signal, true).unwrap();
        assert_eq!(refined.get(1).start, 317);
        assert_eq!(refined.first().end, 316);

        let unrefined = segment(&signal, false).unwrap();
        assert_eq!(unrefined.get(1).start, 300);
    }

    #[test]
    fn refinement_window_stops_at_signal_end() {
        let mut signal = signal_with_silence(100, 20, &[0..1, 19..20]);
        signal.samples[195] = 0.001;
        signal.samples[190] = 0.002;

        let list = segment(&signal, true).unwrap();
        assert_eq!(list.last().end, 199);
        assert_covers(&list, signal.len());
    }

    #[test]
    fn unscanned_tail_joins_last_segment() {
        let mut signal = signal_with_silence(100, 40, &[0..2, 20..22]);
        signal.samples.extend(std::iter::repeat(0.5).take(7));

        let list = segment(&signal, true).unwrap();
        assert_eq!(list.last(), Segment { start: 200, end: 406 });
        assert_covers(&list, signal.len());
    }

    #[test]
    fn first_boundary_is_signal_start() {
        // silence begins well after the start
        let signal = signal_with_silence(100, 50, &[10..12, 30..32]);
        let list = segment(&signal, true).unwrap();

        assert_eq!(list.first().start, 0);
        assert_eq!(list.get(1).start, 300);
    }
}
