use crate::wire::ReplicatedValue;

/// Called with `(old, new)` every time a variable's value is replaced
pub type ChangeObserver = Box<dyn FnMut(&ReplicatedValue, &ReplicatedValue)>;

/// Observers of one variable, invoked in registration order. Callbacks only
/// receive values, never the engine, so they cannot re-enter it mid-dispatch.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<ChangeObserver>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: ChangeObserver) {
        self.observers.push(observer);
    }

    pub fn notify(&mut self, old: &ReplicatedValue, new: &ReplicatedValue) {
        for observer in self.observers.iter_mut() {
            observer(old, new);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}
