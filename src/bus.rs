//! Virtual Bus
//!
//! Named, typed publish/subscribe channels shared by every component of one
//! container. A signal is identified by the owning component's name and the
//! signal name; its payload type is fixed at registration.
//!
//! Registration is append-only: registering an existing signal hands back the
//! channel that is already there, so two components can agree on a signal
//! without coordinating who creates it.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = VirtualBus::new();
//! let moved = bus.register_signal::<f64>("stage", "position_changed")?;
//!
//! let mut rx = moved.subscribe();
//! moved.emit(1.5);
//! assert_eq!(rx.try_recv()?, 1.5);
//! ```

use crate::error::{AppResult, RedsunError};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffered messages per signal before slow subscribers start lagging.
const SIGNAL_CAPACITY: usize = 64;

// =============================================================================
// Signal<T>
// =============================================================================

/// A typed broadcast channel registered on the bus.
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    owner: String,
    name: String,
    sender: broadcast::Sender<T>,
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<T> fmt::Debug for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(owner: &str, name: &str) -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            sender,
        }
    }

    /// Component that owns this signal.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Signal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a payload. Returns the number of subscribers that received it;
    /// emitting with no subscribers is not an error.
    pub fn emit(&self, payload: T) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }

    /// Subscribe to future emissions.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// =============================================================================
// VirtualBus
// =============================================================================

type SignalKey = (String, String);

/// Shared signal registry. One per container build.
#[derive(Default)]
pub struct VirtualBus {
    signals: RwLock<BTreeMap<SignalKey, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for VirtualBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualBus")
            .field("signals", &self.signals.read().len())
            .finish()
    }
}

impl VirtualBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `owner.name` with payload type `T`, or return the existing
    /// signal when it is already registered.
    ///
    /// Fails with [`RedsunError::SignalType`] if the signal exists with a
    /// different payload type.
    pub fn register_signal<T>(&self, owner: &str, name: &str) -> AppResult<Signal<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = (owner.to_string(), name.to_string());
        let mut signals = self.signals.write();
        let entry = signals
            .entry(key)
            .or_insert_with(|| Arc::new(Signal::<T>::new(owner, name)));

        entry
            .downcast_ref::<Signal<T>>()
            .cloned()
            .ok_or_else(|| RedsunError::SignalType {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    /// Look up an already registered signal.
    ///
    /// Returns `Ok(None)` if nothing is registered under `owner.name`.
    pub fn signal<T>(&self, owner: &str, name: &str) -> AppResult<Option<Signal<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let signals = self.signals.read();
        match signals.get(&(owner.to_string(), name.to_string())) {
            None => Ok(None),
            Some(entry) => entry
                .downcast_ref::<Signal<T>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| RedsunError::SignalType {
                    owner: owner.to_string(),
                    name: name.to_string(),
                }),
        }
    }

    /// All registered `(owner, name)` pairs, sorted.
    pub fn signals(&self) -> Vec<(String, String)> {
        self.signals.read().keys().cloned().collect()
    }

    /// Number of registered signals.
    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    /// Whether no signal has been registered.
    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_subscribers() {
        let bus = VirtualBus::new();
        let signal = bus.register_signal::<f64>("stage", "position").unwrap();
        let mut rx = signal.subscribe();

        assert_eq!(signal.emit(1.5), 1);
        assert_eq!(rx.try_recv().unwrap(), 1.5);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = VirtualBus::new();
        let signal = bus.register_signal::<String>("cam", "status").unwrap();
        assert_eq!(signal.emit("idle".into()), 0);
    }

    #[test]
    fn duplicate_registration_returns_existing_channel() {
        let bus = VirtualBus::new();
        let first = bus.register_signal::<u32>("cam", "frame").unwrap();
        let second = bus.register_signal::<u32>("cam", "frame").unwrap();

        let mut rx = first.subscribe();
        second.emit(7);
        assert_eq!(rx.try_recv().unwrap(), 7);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn payload_type_is_fixed_at_registration() {
        let bus = VirtualBus::new();
        bus.register_signal::<u32>("cam", "frame").unwrap();

        let err = bus.register_signal::<String>("cam", "frame").unwrap_err();
        assert!(matches!(err, RedsunError::SignalType { .. }));
        assert!(bus.signal::<String>("cam", "frame").is_err());
        assert!(bus.signal::<u32>("cam", "missing").unwrap().is_none());
    }

    #[test]
    fn owners_are_separate_namespaces() {
        let bus = VirtualBus::new();
        bus.register_signal::<u32>("cam", "frame").unwrap();
        bus.register_signal::<u32>("stage", "frame").unwrap();

        assert_eq!(
            bus.signals(),
            vec![
                ("cam".to_string(), "frame".to_string()),
                ("stage".to_string(), "frame".to_string())
            ]
        );
    }
}
