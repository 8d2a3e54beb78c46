//! Server-side counters.
//!
//! A counter keeps the last committed value apart from local changes that
//! have not been sent yet. Changes are either an absolute overwrite
//! ([`Counter::force_to`]) or an accumulated delta ([`Counter::update_by`]).
//! Serialization drains the pending change; reconciliation overwrites the
//! committed value.

use serde::{Deserialize, Serialize};

/// How a dirty counter will be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Overwrite the server value
    Set,
    /// Atomically add the pending delta on the server
    Increment,
}

/// A pending write taken out of a counter by [`Counter::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWrite {
    Set(i64),
    Increment(i64),
}

/// A counter field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    value: i64,
    pending_delta: i64,
    mode: Option<CounterMode>,
}

impl Counter {
    /// A clean counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clean counter holding a committed value.
    pub fn with_value(value: i64) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Overwrite the counter with an absolute value on the next send.
    pub fn force_to(&mut self, value: i64) {
        self.mode = Some(CounterMode::Set);
        self.value = value;
        self.pending_delta = 0;
    }

    /// Add `delta` on the next send. Repeated calls accumulate.
    pub fn update_by(&mut self, delta: i64) {
        self.mode = Some(CounterMode::Increment);
        self.pending_delta += delta;
    }

    /// Last committed value; never includes an undrained delta.
    pub fn get(&self) -> i64 {
        self.value
    }

    pub fn pending_delta(&self) -> i64 {
        self.pending_delta
    }

    pub fn mode(&self) -> Option<CounterMode> {
        self.mode
    }

    /// Whether a change is waiting to be sent.
    pub fn is_dirty(&self) -> bool {
        self.mode.is_some()
    }

    /// Take the pending write, leaving the counter clean.
    ///
    /// Called by the serializer before the send is confirmed; a caller that
    /// retries a failed send must re-apply a lost delta itself.
    pub fn drain(&mut self) -> Option<CounterWrite> {
        let write = match self.mode.take()? {
            CounterMode::Set => CounterWrite::Set(self.value),
            CounterMode::Increment => CounterWrite::Increment(self.pending_delta),
        };
        self.pending_delta = 0;
        Some(write)
    }

    /// Overwrite the committed value from server data.
    pub(crate) fn commit(&mut self, value: i64) {
        self.value = value;
    }
}
