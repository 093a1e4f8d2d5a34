use std::time::{Duration, Instant};

use crate::{
    observer::{ChangeObserver, ObserverList},
    types::{PeerId, Tick},
    wire::{ReplicatedValue, ValueKind},
    world::ownership::{VariableSettings, WritePermission},
    wrapping_number::tick_greater_than,
};

/// One field of a replicated object
pub struct ReplicatedVariable {
    value: ReplicatedValue,
    /// The value most recently put on the wire, for dirty detection
    last_sent: ReplicatedValue,
    settings: VariableSettings,
    last_sent_at: Option<Instant>,
    last_local_write_tick: Option<Tick>,
    last_applied_remote_tick: Option<Tick>,
    /// The Client whose delta set the current value, if any. The Server
    /// relays such values to everyone except this peer.
    origin: Option<PeerId>,
    observers: ObserverList,
}

impl ReplicatedVariable {
    pub fn new(initial: ReplicatedValue, settings: VariableSettings) -> Self {
        Self {
            last_sent: initial.clone(),
            value: initial,
            settings,
            last_sent_at: None,
            last_local_write_tick: None,
            last_applied_remote_tick: None,
            origin: None,
            observers: ObserverList::new(),
        }
    }

    pub fn value(&self) -> &ReplicatedValue {
        &self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn settings(&self) -> &VariableSettings {
        &self.settings
    }

    pub fn permission(&self) -> WritePermission {
        self.settings.permission
    }

    pub fn origin(&self) -> Option<PeerId> {
        self.origin
    }

    pub fn is_dirty(&self) -> bool {
        !self.value.bit_eq(&self.last_sent)
    }

    /// Whether the send rate allows another delta at `now`
    pub fn rate_allows(&self, now: Instant) -> bool {
        if self.settings.send_rate_hz == 0 {
            return true;
        }
        match self.last_sent_at {
            None => true,
            Some(last_sent_at) => {
                let interval = Duration::from_secs(1) / self.settings.send_rate_hz;
                now.saturating_duration_since(last_sent_at) >= interval
            }
        }
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = self.value.clone();
        self.last_sent_at = Some(now);
    }

    pub fn add_observer(&mut self, observer: ChangeObserver) {
        self.observers.add(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Writes a value on a peer holding write permission. Returns whether the
    /// value changed; observers only run when it did.
    pub fn write_local(&mut self, value: ReplicatedValue, tick: Tick) -> bool {
        self.last_local_write_tick = Some(tick);
        self.origin = None;
        self.replace(value)
    }

    /// Whether a remote delta stamped `tick` is newer than both the last local
    /// write and the last applied remote delta
    pub fn is_newer_than_known(&self, tick: Tick) -> bool {
        let newer_than = |known: Option<Tick>| match known {
            None => true,
            Some(known) => tick_greater_than(tick, known),
        };
        newer_than(self.last_local_write_tick) && newer_than(self.last_applied_remote_tick)
    }

    /// Applies a value received from `sender`. With `relay` set the value
    /// stays dirty so that it is forwarded on the next scan, otherwise it is
    /// considered already in sync.
    pub fn apply_remote(
        &mut self,
        value: ReplicatedValue,
        tick: Tick,
        sender: PeerId,
        relay: bool,
    ) -> bool {
        if self.value.bit_eq(&value) {
            return false;
        }
        self.last_applied_remote_tick = Some(tick);
        self.origin = if sender.is_server() { None } else { Some(sender) };
        if !relay {
            self.last_sent = value.clone();
        }
        self.replace(value)
    }

    fn replace(&mut self, value: ReplicatedValue) -> bool {
        if self.value.bit_eq(&value) {
            return false;
        }
        let old = std::mem::replace(&mut self.value, value);
        self.observers.notify(&old, &self.value);
        true
    }
}
