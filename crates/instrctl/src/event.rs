//! Event objects, enablement tracking and handler dispatch
//!
//! Event payloads are immutable snapshots: they stay valid after the
//! backend reclaims the underlying event context. Handler callbacks run on
//! whatever thread the backend dispatches on and are panic-contained at
//! the dispatch boundary.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

use crate::attributes::AttrValue;
use crate::backend::{BackendHandler, HandlerId, RawEvent, Session};
use crate::constants::{EventMechanism, EventType};
use crate::resource::ResourceCore;

/// One delivered (or synthesized) event.
#[derive(Debug, Clone)]
pub struct VisaEvent {
    pub event_type: EventType,
    /// Backend context handle the snapshot was taken from, if any. The
    /// handle itself may already be reclaimed.
    pub context: Option<u64>,
    /// Attribute snapshot captured at dispatch time.
    pub attributes: HashMap<u32, AttrValue>,
    /// True for the synthesized object returned when a queue wait ran out
    /// of time.
    pub timed_out: bool,
}

impl VisaEvent {
    pub(crate) fn from_raw(raw: RawEvent) -> Self {
        VisaEvent {
            event_type: raw.event_type,
            context: raw.context,
            attributes: raw.attributes,
            timed_out: false,
        }
    }

    /// Synthesized event for a wait that timed out; not an error.
    pub(crate) fn synthesized_timeout(event_type: EventType) -> Self {
        VisaEvent {
            event_type,
            context: None,
            attributes: HashMap::new(),
            timed_out: true,
        }
    }

    pub fn attribute(&self, id: u32) -> Option<&AttrValue> {
        self.attributes.get(&id)
    }
}

/// Outcome of `wait_on_event`. Timeouts come back as `timed_out = true`
/// with a synthesized event, never as an error.
#[derive(Debug, Clone)]
pub struct WaitResponse {
    pub event: VisaEvent,
    pub timed_out: bool,
}

/// User-facing handler: `(resource, event, user_handle)`.
pub type EventHandler = Arc<dyn Fn(&ResourceCore, &VisaEvent, Option<u64>) + Send + Sync>;

/// Bookkeeping for one installed handler.
pub(crate) struct HandlerEntry {
    pub callback: EventHandler,
    /// Opaque backend handle; required at uninstall time.
    pub backend_id: HandlerId,
    pub user_handle: Option<u64>,
}

/// Per-resource event state: which (type, mechanism) pairs are enabled and
/// which handlers are installed. Guarded so install/uninstall stay
/// race-free against backend dispatch threads.
#[derive(Default)]
pub(crate) struct EventRegistry {
    enabled: Mutex<HashMap<EventType, EventMechanism>>,
    handlers: Mutex<HashMap<EventType, Vec<HandlerEntry>>>,
}

impl EventRegistry {
    /// Mechanisms currently enabled for `event_type`.
    pub fn enabled_mechanisms(&self, event_type: EventType) -> EventMechanism {
        self.enabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .copied()
            .unwrap_or(EventMechanism::empty())
    }

    /// True when every bit of `mechanism` is already enabled.
    pub fn is_enabled(&self, event_type: EventType, mechanism: EventMechanism) -> bool {
        self.enabled_mechanisms(event_type).contains(mechanism)
    }

    pub fn note_enabled(&self, event_type: EventType, mechanism: EventMechanism) {
        let mut enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = enabled.entry(event_type).or_insert(EventMechanism::empty());
        *entry |= mechanism;
    }

    pub fn note_disabled(&self, event_type: EventType, mechanism: EventMechanism) {
        let mut enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = enabled.get_mut(&event_type) {
            *entry &= !mechanism;
            if entry.is_empty() {
                enabled.remove(&event_type);
            }
        }
    }

    /// Snapshot of enabled pairs, for teardown on close.
    pub fn enabled_snapshot(&self) -> Vec<(EventType, EventMechanism)> {
        self.enabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(&ty, &mech)| (ty, mech))
            .collect()
    }

    /// Drop all enablement state; used when the resource closes.
    pub fn reset(&self) {
        self.enabled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn push_handler(&self, event_type: EventType, entry: HandlerEntry) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type)
            .or_default()
            .push(entry);
    }

    /// Remove the entry installed under `backend_id`. The opaque handle,
    /// not the callback, identifies the registration: installing the same
    /// callable twice yields two distinct handles.
    pub fn remove_handler(
        &self,
        event_type: EventType,
        backend_id: HandlerId,
    ) -> Option<HandlerEntry> {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = handlers.get_mut(&event_type)?;
        let index = entries.iter().position(|e| e.backend_id == backend_id)?;
        Some(entries.remove(index))
    }

    /// Handles of every installed handler, for teardown on close.
    pub fn installed_snapshot(&self) -> Vec<(EventType, HandlerId)> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|(&ty, entries)| entries.iter().map(move |e| (ty, e.backend_id)))
            .collect()
    }
}

/// Build the backend-facing dispatcher for one user handler. The thunk
/// re-associates the callback with its resource, snapshots stay owned by
/// the event object, and panics are logged instead of crossing back into
/// the backend.
pub(crate) fn make_dispatcher(
    core: Weak<ResourceCore>,
    callback: EventHandler,
    user_handle: Option<u64>,
) -> BackendHandler {
    Box::new(move |_session: Session, raw: &RawEvent| {
        let Some(core) = core.upgrade() else {
            // Resource already closed; nothing to deliver to.
            return;
        };
        let event = VisaEvent::from_raw(raw.clone());
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            callback(&core, &event, user_handle);
        }));
        if outcome.is_err() {
            error!(
                resource = core.resource_name(),
                event = ?event.event_type,
                "event handler panicked; swallowed at the dispatch boundary"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_disable_round_trip() {
        let registry = EventRegistry::default();
        let ty = EventType::ServiceRequest;

        assert!(!registry.is_enabled(ty, EventMechanism::QUEUE));
        registry.note_enabled(ty, EventMechanism::QUEUE);
        assert!(registry.is_enabled(ty, EventMechanism::QUEUE));
        assert!(!registry.is_enabled(ty, EventMechanism::HANDLER));

        registry.note_enabled(ty, EventMechanism::HANDLER);
        assert!(registry.is_enabled(ty, EventMechanism::ALL));

        // Disabling one mechanism leaves the other armed.
        registry.note_disabled(ty, EventMechanism::QUEUE);
        assert!(!registry.is_enabled(ty, EventMechanism::QUEUE));
        assert!(registry.is_enabled(ty, EventMechanism::HANDLER));

        registry.note_disabled(ty, EventMechanism::HANDLER);
        assert_eq!(registry.enabled_mechanisms(ty), EventMechanism::empty());
        assert!(registry.enabled_snapshot().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let registry = EventRegistry::default();
        registry.note_enabled(EventType::Trig, EventMechanism::QUEUE);
        registry.note_enabled(EventType::Clear, EventMechanism::HANDLER);
        registry.reset();
        assert!(registry.enabled_snapshot().is_empty());
        assert!(registry.installed_snapshot().is_empty());
    }

    #[test]
    fn test_duplicate_installs_distinct_handles() {
        let registry = EventRegistry::default();
        let callback: EventHandler = Arc::new(|_, _, _| {});
        let ty = EventType::ServiceRequest;

        registry.push_handler(
            ty,
            HandlerEntry {
                callback: callback.clone(),
                backend_id: HandlerId(1),
                user_handle: None,
            },
        );
        registry.push_handler(
            ty,
            HandlerEntry {
                callback,
                backend_id: HandlerId(2),
                user_handle: Some(7),
            },
        );

        assert_eq!(registry.installed_snapshot().len(), 2);
        let removed = registry.remove_handler(ty, HandlerId(1)).unwrap();
        assert_eq!(removed.backend_id, HandlerId(1));
        assert_eq!(registry.installed_snapshot(), vec![(ty, HandlerId(2))]);
        assert!(registry.remove_handler(ty, HandlerId(1)).is_none());
    }

    #[test]
    fn test_synthesized_timeout_event() {
        let event = VisaEvent::synthesized_timeout(EventType::ServiceRequest);
        assert_eq!(event.event_type, EventType::ServiceRequest);
        assert!(event.timed_out);
        assert!(event.context.is_none());
        assert!(event.attributes.is_empty());
    }

    #[test]
    fn test_snapshot_outlives_raw_event() {
        let mut attributes = HashMap::new();
        attributes.insert(0x3FFF_4025, AttrValue::Scalar(0x40));
        let raw = RawEvent {
            event_type: EventType::ServiceRequest,
            context: Some(42),
            attributes,
        };
        let event = VisaEvent::from_raw(raw);
        // The raw event is gone; the snapshot keeps its payload.
        assert_eq!(event.attribute(0x3FFF_4025), Some(&AttrValue::Scalar(0x40)));
        assert_eq!(event.context, Some(42));
        assert!(!event.timed_out);
    }
}
