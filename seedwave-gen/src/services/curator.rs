//! Playlist curation: category quotas, fill, ordering, and flow roles

use tracing::debug;

use crate::models::{Category, FlowRole, PlaylistTrack, ScoredTrack};

/// Share of the playlist per category, in percent
pub const POPULAR_SHARE: usize = 35;
pub const DEEP_CUT_SHARE: usize = 50;
pub const HIDDEN_GEM_SHARE: usize = 15;

/// Slots reserved for each category: floor, floor, ceil
pub fn quotas(target_size: usize) -> [(Category, usize); 3] {
    [
        (Category::Popular, target_size * POPULAR_SHARE / 100),
        (Category::DeepCut, target_size * DEEP_CUT_SHARE / 100),
        (
            Category::HiddenGem,
            (target_size * HIDDEN_GEM_SHARE).div_ceil(100),
        ),
    ]
}

/// Select up to `target_size` tracks from `scored` (sorted best first)
///
/// Category buckets are filled first, then any remaining slots take the
/// best unselected tracks. Positions follow selection order.
pub fn curate(scored: &[ScoredTrack], target_size: usize) -> Vec<PlaylistTrack> {
    let mut selected = vec![false; scored.len()];
    let mut order: Vec<usize> = Vec::with_capacity(target_size);

    for (category, quota) in quotas(target_size) {
        let picks: Vec<usize> = scored
            .iter()
            .enumerate()
            .filter(|(i, s)| !selected[*i] && s.category == category)
            .map(|(i, _)| i)
            .take(quota)
            .collect();
        for i in picks {
            selected[i] = true;
            order.push(i);
        }
    }

    if order.len() < target_size {
        for (i, taken) in selected.iter_mut().enumerate() {
            if order.len() >= target_size {
                break;
            }
            if !*taken {
                *taken = true;
                order.push(i);
            }
        }
    }

    order.truncate(target_size);
    let n = order.len();
    debug!(selected = n, target = target_size, pool = scored.len(), "Curated playlist");

    order
        .into_iter()
        .enumerate()
        .map(|(index, i)| {
            let track = scored[i].clone();
            let similarity_score = similarity_score(track.scores.overall);
            PlaylistTrack {
                track,
                position: index + 1,
                reason: String::new(),
                flow_role: flow_role(index, n),
                similarity_score,
            }
        })
        .collect()
}

/// Narrative role by normalized position `index / (n - 1)`
pub fn flow_role(index: usize, n: usize) -> FlowRole {
    if index == 0 || n <= 1 {
        return FlowRole::Opener;
    }
    if index == n - 1 {
        return FlowRole::Closer;
    }

    let p = index as f64 / (n - 1) as f64;
    if p < 0.25 {
        FlowRole::Builder
    } else if p < 0.5 {
        FlowRole::Peak
    } else if p < 0.75 {
        FlowRole::Valley
    } else {
        FlowRole::Transition
    }
}

/// `overall` rounded into 1..=10
pub fn similarity_score(overall: f64) -> u8 {
    if overall.is_nan() {
        return 1;
    }
    overall.round().clamp(1.0, 10.0) as u8
}
