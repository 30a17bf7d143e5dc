// GNU AGPL v3 License

use crate::{select::Selection, segment::SegmentList};
use std::fmt;

/// A time-bounded piece of the input video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClipSpec {
    /// Position of the source segment in the segment list.
    pub(crate) segment: usize,
    /// Start in seconds.
    pub(crate) start: f64,
    /// End in seconds.
    pub(crate) end: f64,
}

impl ClipSpec {
    pub(crate) fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for ClipSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}: {:.3}s - {:.3}s ({:.3}s)",
            self.segment,
            self.start,
            self.end,
            self.duration()
        )
    }
}

/// The ordered clips that make up the output video.
#[derive(Debug, Clone)]
pub(crate) struct AssemblyPlan {
    clips: Vec<ClipSpec>,
}

impl AssemblyPlan {
    pub(crate) fn clips(&self) -> &[ClipSpec] {
        &self.clips
    }

    pub(crate) fn duration(&self) -> f64 {
        self.clips.iter().map(ClipSpec::duration).sum()
    }
}

/// Lay out the first segment, the accepted picks, then the last segment.
pub(crate) fn assemble(segments: &SegmentList, selection: &Selection) -> AssemblyPlan {
    let sample_rate = segments.sample_rate();
    let last = segments.len() - 1;

    let clips = Some(0)
        .into_iter()
        .chain(selection.accepted.iter().copied())
        .chain(Some(last))
        .map(|index| {
            let segment = segments.get(index);
            ClipSpec {
                segment: index,
                start: segment.start_secs(sample_rate),
                end: segment.end_secs(sample_rate),
            }
        })
        .collect();

    AssemblyPlan { clips }
}
