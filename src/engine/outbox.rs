//! Side-effect buffer filled while a head runs
//!
//! Statement handlers never touch the queue or the action table directly;
//! they record what happened here and the scheduler applies it. This keeps
//! the step loop pure and the ordering of effects explicit.

use crate::events::Event;

use super::state::ActionState;

#[derive(Debug, Default)]
pub struct Outbox {
    /// Events to requeue on the internal FIFO
    pub internal: Vec<Event>,
    /// Action states created by `start`/`await`/`send Start<A>`
    pub new_actions: Vec<ActionState>,
    /// `Start<Action>` events awaiting conflict resolution
    pub candidates: Vec<Event>,
    /// Action events that bypass conflict resolution (`Stop<Action>`)
    pub outgoing: Vec<Event>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty()
            && self.new_actions.is_empty()
            && self.candidates.is_empty()
            && self.outgoing.is_empty()
    }
}
