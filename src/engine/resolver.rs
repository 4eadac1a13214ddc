//! Conflict resolution
//!
//! Several flows may react to the same external event by starting competing
//! actions. Candidates that share a channel collide; exactly one per channel
//! is emitted and the rest are discarded. The order is total, so resolution
//! is deterministic: priority first, then specificity, then recency.

use std::collections::BTreeMap;

use crate::events::{classify, Event, EventKind};

/// A `Start<A>` event waiting on conflict resolution, tagged with the
/// standing of the flow that produced it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub event: Event,
    /// Priority of the emitting flow at emission time
    pub priority: f64,
    /// Activation-chain depth of the emitting flow
    pub specificity: u32,
    /// Emission order within the current processing round
    pub seq: u64,
}

/// Outcome of one resolution round.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Winning events, in emission order
    pub winners: Vec<Event>,
    /// Discarded events, in emission order
    pub losers: Vec<Event>,
}

/// Candidates collide when they target the same channel. An explicit
/// `channel` argument wins; otherwise the action name is the channel, so two
/// utterances collide but an utterance and a gesture do not.
fn channel_key(event: &Event) -> String {
    if let Some(channel) = event.str_arg("channel") {
        return format!("channel:{}", channel);
    }
    match classify(&event.name) {
        EventKind::ActionStart { action } => action,
        _ => event.name.clone(),
    }
}

/// Pick one winner per channel.
pub fn resolve(candidates: Vec<Candidate>) -> Resolution {
    let mut groups: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
    for candidate in candidates {
        groups
            .entry(channel_key(&candidate.event))
            .or_default()
            .push(candidate);
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for (_, mut group) in groups {
        let winner = best_index(&group);
        let winning = group.remove(winner);
        tracing::debug!(
            event = %winning.event.name,
            priority = winning.priority,
            discarded = group.len(),
            "conflict resolved"
        );
        winners.push(winning);
        losers.extend(group);
    }

    winners.sort_by_key(|c| c.seq);
    losers.sort_by_key(|c| c.seq);
    Resolution {
        winners: winners.into_iter().map(|c| c.event).collect(),
        losers: losers.into_iter().map(|c| c.event).collect(),
    }
}

fn best_index(group: &[Candidate]) -> usize {
    let mut best = 0;
    for i in 1..group.len() {
        if beats(&group[i], &group[best]) {
            best = i;
        }
    }
    best
}

/// Strict ordering: priority dominates, specificity breaks priority ties,
/// recency breaks the rest.
fn beats(a: &Candidate, b: &Candidate) -> bool {
    if a.priority != b.priority {
        return a.priority > b.priority;
    }
    if a.specificity != b.specificity {
        return a.specificity > b.specificity;
    }
    a.seq > b.seq
}
