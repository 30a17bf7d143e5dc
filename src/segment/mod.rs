// GNU AGPL v3 License

mod build;
mod scan;

use std::{fmt, ops::Range};

pub(crate) use build::build_segments;
pub(crate) use scan::{scan_silence, ScanProgress};

/// Decoded mono audio, borrowed read-only by the segmenting stages.
#[derive(Clone)]
pub(crate) struct AudioSignal {
    pub(crate) samples: Vec<f32>,
    pub(crate) sample_rate: u32,
}

impl AudioSignal {
    pub(crate) fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for AudioSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSignal")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// A cut of the signal between two boundaries.
///
/// Both ends are absolute sample indices and the range is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Segment {
    /// Number of samples covered.
    pub(crate) fn len(self) -> usize {
        self.end - self.start + 1
    }

    /// Duration in seconds, measured from the first to the last sample.
    pub(crate) fn duration(self, sample_rate: u32) -> f64 {
        (self.end - self.start) as f64 / sample_rate as f64
    }

    pub(crate) fn start_secs(self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }

    pub(crate) fn end_secs(self, sample_rate: u32) -> f64 {
        self.end as f64 / sample_rate as f64
    }
}

/// The ordered cuts of one signal.
#[derive(Debug, Clone)]
pub(crate) struct SegmentList {
    // invariant: at least 2 segments, ascending and contiguous
    segments: Vec<Segment>,
    sample_rate: u32,
}

impl SegmentList {
    pub(crate) fn new(segments: Vec<Segment>, sample_rate: u32) -> Self {
        debug_assert!(segments.len() >= 2);
        debug_assert!(segments.windows(2).all(|w| w[0].end + 1 == w[1].start));
        // every interior segment has a duration to contribute
        debug_assert!(segments
            .iter()
            .skip(1)
            .take(segments.len().saturating_sub(2))
            .all(|s| s.len() > 1));
        Self {
            segments,
            sample_rate,
        }
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn get(&self, index: usize) -> Segment {
        self.segments[index]
    }

    pub(crate) fn first(&self) -> Segment {
        self.segments[0]
    }

    pub(crate) fn last(&self) -> Segment {
        self.segments[self.segments.len() - 1]
    }

    /// Positions of the segments that are not anchors.
    ///
    /// Each holds at least two samples.
    pub(crate) fn interior(&self) -> Range<usize> {
        1..self.segments.len() - 1
    }

    pub(crate) fn duration_of(&self, index: usize) -> f64 {
        self.segments[index].duration(self.sample_rate)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_duration_uses_sample_span() {
        let seg = Segment { start: 100, end: 299 };
        assert_eq!(seg.len(), 200);
        assert!((seg.duration(100) - 1.99).abs() < 1e-9);
        assert!((seg.start_secs(100) - 1.0).abs() < 1e-9);
        assert!((seg.end_secs(100) - 2.99).abs() < 1e-9);
    }

    #[test]
    fn interior_excludes_anchors() {
        let list = SegmentList::new(
            vec![
                Segment { start: 0, end: 9 },
                Segment { start: 10, end: 19 },
                Segment { start: 20, end: 29 },
                Segment { start: 30, end: 39 },
            ],
            10,
        );
        assert_eq!(list.interior(), 1..3);
        assert_eq!(list.first(), Segment { start: 0, end: 9 });
        assert_eq!(list.last(), Segment { start: 30, end: 39 });
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn single_sample_interior_is_rejected() {
        SegmentList::new(
            vec![
                Segment { start: 0, end: 9 },
                Segment { start: 10, end: 10 },
                Segment { start: 11, end: 19 },
            ],
            10,
        );
    }

    #[test]
    fn two_segments_have_no_interior() {
        let list = SegmentList::new(
            vec![Segment { start: 0, end: 4 }, Segment { start: 5, end: 9 }],
            10,
        );
        assert!(list.interior().is_empty());
    }
}
