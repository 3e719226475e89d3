//! Points formula and final ranking.

use crate::types::{PlayerId, Room};

/// Points for one answer: a correct answer earns 100 per full remaining
/// second, a wrong one earns nothing.
pub fn points_for(is_correct: bool, time_left_ms: u64) -> u64 {
    if is_correct {
        (time_left_ms / 1000) * 100
    } else {
        0
    }
}

/// Optional post-processing applied uniformly to the final ranking. This
/// is the only sanctioned place for session-specific adjustments; it is
/// disabled (None) by default and must never inspect display names.
pub type RankingHook = std::sync::Arc<dyn Fn(&Room, &mut Vec<PlayerId>) + Send + Sync>;

/// Total order over players: score descending, cumulative response time
/// ascending, then original join order. Deterministic for identical
/// inputs.
pub fn rankings(room: &Room, hook: Option<&RankingHook>) -> Vec<PlayerId> {
    let mut order: Vec<usize> = (0..room.players.len()).collect();
    order.sort_by(|&a, &b| {
        let pa = &room.players[a].id;
        let pb = &room.players[b].id;
        let score_a = room.scores.get(pa).copied().unwrap_or(0);
        let score_b = room.scores.get(pb).copied().unwrap_or(0);
        let time_a = room.response_times.get(pa).copied().unwrap_or(0);
        let time_b = room.response_times.get(pb).copied().unwrap_or(0);

        score_b
            .cmp(&score_a)
            .then(time_a.cmp(&time_b))
            .then(a.cmp(&b))
    });

    let mut ranked: Vec<PlayerId> = order
        .into_iter()
        .map(|i| room.players[i].id.clone())
        .collect();
    if let Some(hook) = hook {
        hook(room, &mut ranked);
    }
    ranked
}
