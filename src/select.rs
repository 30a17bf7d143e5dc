// GNU AGPL v3 License

use crate::{config::SelectionConfig, error::RemixError, segment::SegmentList};
use fastrand::Rng;
use std::cmp;

/// A source of uniform draws from `0..len`.
pub(crate) trait Draw {
    fn draw(&mut self, len: usize) -> usize;
}

impl Draw for Rng {
    fn draw(&mut self, len: usize) -> usize {
        self.usize(..len)
    }
}

/// Seed a generator from the system RNG, or from a fixed seed if given.
pub(crate) fn seeded_rng(seed: Option<u64>) -> anyhow::Result<(Rng, u64)> {
    let seed = match seed {
        Some(seed) => seed,
        None => {
            let mut seed = 0u64;
            getrandom::getrandom(bytemuck::bytes_of_mut(&mut seed))?;
            seed
        }
    };

    Ok((Rng::with_seed(seed), seed))
}

/// The outcome of drawing interior segments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Selection {
    /// Every draw made, in order, including the one that hit the target.
    pub(crate) draws: Vec<usize>,
    /// The picks kept for the output, in order.
    pub(crate) accepted: Vec<usize>,
    /// Seconds covered by the anchors plus the accepted picks.
    pub(crate) duration: f64,
}

/// Draw interior segments at random until the target duration is reached.
///
/// The pick that reaches the target is not kept, so the resulting duration
/// stays under the target unless the anchors alone already exceed it.
pub(crate) fn select_segments(
    segments: &SegmentList,
    config: &SelectionConfig,
    source: &mut impl Draw,
) -> Result<Selection, RemixError> {
    let pool = segments.interior().collect::<Vec<_>>();
    if pool.is_empty() {
        return Err(RemixError::NoInteriorSegments);
    }

    let window = cmp::min(config.no_repeat_window, pool.len() - 1);
    if window < config.no_repeat_window {
        tracing::warn!(
            "Only {} interior segments, shrinking the no-repeat window from {} to {}",
            pool.len(),
            config.no_repeat_window,
            window
        );
    }

    let mut duration =
        segments.duration_of(0) + segments.duration_of(segments.len() - 1);
    let mut draws = vec![];
    let mut accepted = vec![];

    loop {
        let recent = &draws[draws.len().saturating_sub(window)..];
        let pick = draw_candidate(&pool, recent, config.max_redraws, source)?;
        draws.push(pick);

        let next = duration + segments.duration_of(pick);
        if next >= config.target_duration {
            break;
        }

        duration = next;
        accepted.push(pick);
    }

    tracing::info!(
        "Drew {} segments, kept {} for {:.2}s of {:.2}s",
        draws.len(),
        accepted.len(),
        duration,
        config.target_duration
    );

    Ok(Selection {
        draws,
        accepted,
        duration,
    })
}

/// Draw from the pool until the pick is not among the recent ones.
fn draw_candidate(
    pool: &[usize],
    recent: &[usize],
    max_redraws: usize,
    source: &mut impl Draw,
) -> Result<usize, RemixError> {
    for _ in 0..max_redraws {
        let pick = pool[source.draw(pool.len())];
        if !recent.contains(&pick) {
            return Ok(pick);
        }
        tracing::trace!("Segment {} was picked recently, redrawing", pick);
    }

    Err(RemixError::SelectionRetryExhausted {
        attempts: max_redraws,
        window: recent.len(),
    })
}
