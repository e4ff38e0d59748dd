//! Minimal subscriber-list events.
//!
//! Encoders and decoders deliver their output through push subscriptions:
//! zero or more emissions per input call, delivered synchronously on the
//! thread that produced them.

/// An ordered list of subscribers invoked on every emission.
pub struct Event<T> {
    subscribers: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&T) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Deliver `value` to every subscriber in subscription order.
    pub fn emit(&mut self, value: &T) {
        for subscriber in &mut self.subscribers {
            subscriber(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
