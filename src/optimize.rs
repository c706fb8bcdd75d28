//! Track parameter optimization.
//!
//! A track may inherit parameters from a *later* track through its
//! `opti_offset` back-reference. For every track the pass looks for the best
//! later target carrying the same parameter-id list and the most identical
//! `(id, value)` pairs, and reduces the track to its unique parameters. The
//! common parameters are recovered by the decoder's un-optimization step.

use log::{debug, info};

use crate::db::{TemplateDb, resolve_param_id};
use crate::logic::{Logic, Param, Value};

#[derive(Debug, Clone)]
pub(crate) struct Optimization {
    /// Index of the target track in the sleeper list.
    pub(crate) target: usize,
    /// Parameters the track still has to carry itself.
    pub(crate) unique_params: Vec<Param>,
}

/// Find the best optimization per track, `None` where nothing matches.
/// Quick mode skips targets whose title differs; the slow mode has never
/// been observed to win anything.
pub(crate) fn optimize_tracks(
    tracks: &[&Logic],
    templates: &TemplateDb,
    quick: bool,
) -> Vec<Option<Optimization>> {
    let ids: Vec<Vec<Option<u16>>> = tracks
        .iter()
        .map(|track| {
            let title = track.title.display();
            track
                .params
                .iter()
                .map(|p| resolve_param_id(templates, &title, p))
                .collect()
        })
        .collect();

    let mut optimizations = Vec::with_capacity(tracks.len());
    let mut optimized = 0usize;
    let mut bytes_saved = 0usize;

    for i in 0..tracks.len() {
        // (target index, matched param indices of track i)
        let mut best: Option<(usize, Vec<usize>)> = None;
        for j in (i + 1)..tracks.len() {
            if let Some((_, matched)) = &best {
                if matched.len() > tracks[j].params.len() {
                    continue;
                }
            }
            if quick && tracks[i].title != tracks[j].title {
                continue;
            }
            // targets with a different id set would bleed ghost params into
            // the un-optimized track
            if ids[i] != ids[j] {
                continue;
            }
            let mut matched = Vec::new();
            for (a, p1) in tracks[i].params.iter().enumerate() {
                if matches!(p1.value, Value::Group(_)) {
                    continue;
                }
                if tracks[j]
                    .params
                    .iter()
                    .enumerate()
                    .any(|(b, p2)| ids[i][a] == ids[j][b] && p1.value == p2.value)
                {
                    matched.push(a);
                }
            }
            if !matched.is_empty()
                && best.as_ref().is_none_or(|(_, m)| matched.len() > m.len())
            {
                best = Some((j, matched));
            }
        }

        optimizations.push(best.map(|(target, matched)| {
            optimized += 1;
            for &a in &matched {
                bytes_saved += match tracks[i].params[a].value {
                    Value::Bool(_) => 1,
                    _ => 4,
                };
            }
            debug!(
                "track {} optimized against {target}: {} shared params",
                tracks[i].title.display(),
                matched.len()
            );
            let unique_params = tracks[i]
                .params
                .iter()
                .enumerate()
                .filter(|(a, _)| !matched.contains(a))
                .map(|(_, p)| p.clone())
                .collect();
            Optimization {
                target,
                unique_params,
            }
        }));
    }

    info!(
        "optimized {optimized} of {} tracks, {bytes_saved} bytes saved",
        tracks.len()
    );
    optimizations
}
