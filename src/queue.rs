//! Outgoing key presses.
//!
//! Frames are held until the controller sends a keep-alive and then written
//! one per keep-alive, which keeps them clear of the keypads' own traffic.
//! State changes are checked against the reported state after a delay and
//! re-queued until they take effect or run out of retries.

use std::collections::{HashMap, VecDeque};

use crate::protocol::{frames::Frame, table::State};


/// A state a pending command is expected to produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Effect {
    pub state: State,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct PendingCommand {
    pub frame: Frame,

    /// Empty for a plain key press, which is never verified
    pub effects: Vec<Effect>,

    pub retries: u32,
}

impl PendingCommand {
    pub fn key_press(frame: Frame) -> Self {
        Self { frame, effects: vec![], retries: 0 }
    }

    pub fn state_change(frame: Frame, effects: Vec<Effect>, retries: u32) -> Self {
        Self { frame, effects, retries }
    }

    fn desired(&self, state: State) -> Option<bool> {
        self.effects.iter()
            .find(|effect| effect.state == state)
            .map(|effect| effect.enabled)
    }
}

/// Handle for a command that has been sent and is awaiting verification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VerifyId(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    Confirmed,
    Requeued,
    Exhausted,
    /// The id was not awaiting verification
    Unknown,
}


#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    verifying: HashMap<VerifyId, PendingCommand>,
    next_id: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PendingCommand) {
        self.pending.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of sent commands awaiting verification.
    pub fn verifying(&self) -> usize {
        self.verifying.len()
    }

    /// Take the next frame to write after a keep-alive.
    ///
    /// A command with effects moves to the verifying set and the returned id
    /// must be passed to [`CommandQueue::verify`] once the controller has had
    /// time to act on it.
    pub fn transmit_next(&mut self) -> Option<(Frame, Option<VerifyId>)> {
        let command = self.pending.pop_front()?;
        let frame = command.frame.clone();

        if command.effects.is_empty() {
            return Some((frame, None));
        }

        let id = VerifyId(self.next_id);
        self.next_id += 1;
        self.verifying.insert(id, command);

        Some((frame, Some(id)))
    }

    /// Check a sent command against the reported state.
    pub fn verify(&mut self, id: VerifyId, observed: impl Fn(State) -> bool) -> Verification {
        let Some(mut command) = self.verifying.remove(&id) else {
            return Verification::Unknown;
        };

        if command.effects.iter().all(|effect| observed(effect.state) == effect.enabled) {
            return Verification::Confirmed;
        }

        if command.retries == 0 {
            return Verification::Exhausted;
        }

        command.retries -= 1;
        self.pending.push_back(command);

        Verification::Requeued
    }

    /// The value an outstanding command is driving `state` towards.
    ///
    /// The most recent request wins: queued commands newest first, then
    /// commands already sent and awaiting verification.
    pub fn desired(&self, state: State) -> Option<bool> {
        self.pending.iter().rev()
            .find_map(|command| command.desired(state))
            .or_else(|| self.verifying.values().find_map(|command| command.desired(state)))
    }
}
