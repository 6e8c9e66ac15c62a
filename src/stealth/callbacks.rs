//! Registration and dispatch of protection and detection notifications.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use log::debug;

use crate::stealth::RiskLevel;

/// Identifier of a registered callback.
///
/// Assigned from a single monotonically increasing counter starting at 1 and
/// shared by both callback kinds, so an id uniquely names a registration for
/// the process lifetime and is never reissued, even after removal.
pub type CallbackId = u64;

type ProtectionCallback = Arc<dyn Fn() + Send + Sync>;
type DetectionCallback = Arc<dyn Fn(RiskLevel, &str) + Send + Sync>;

/// Dispatches protection-triggered and detection-triggered notifications.
///
/// The bus is independent of which subsystem raises an event: registries
/// notify it when protections fire, and the [`crate::RiskAssessor`] notifies
/// it when a scan reports elevated risk.
///
/// # Reentrancy
///
/// Notification takes a snapshot of the current registrations under the lock
/// and invokes each callback outside it, so a callback may safely register
/// or unregister other callbacks without deadlocking or corrupting
/// iteration.
///
/// # Examples
///
/// ```rust
/// use veilhook::CallbackBus;
///
/// let bus = CallbackBus::new();
/// let id = bus.register_protection_callback(|| println!("protection fired"));
/// bus.notify_protection_callbacks();
/// assert!(bus.unregister_protection_callback(id));
/// assert!(!bus.unregister_protection_callback(id)); // ids are never reused
/// ```
pub struct CallbackBus {
    next_id: AtomicU64,
    protection: Mutex<HashMap<CallbackId, ProtectionCallback>>,
    detection: Mutex<HashMap<CallbackId, DetectionCallback>>,
}

impl CallbackBus {
    /// Creates an empty bus; the first assigned id is 1.
    #[must_use]
    pub fn new() -> Self {
        CallbackBus {
            next_id: AtomicU64::new(1),
            protection: Mutex::new(HashMap::new()),
            detection: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> CallbackId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Registers a callback invoked whenever a protection fires.
    pub fn register_protection_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.protection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        debug!("registered protection callback {id}");
        id
    }

    /// Removes a protection callback; returns whether it was registered.
    pub fn unregister_protection_callback(&self, id: CallbackId) -> bool {
        self.protection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Registers a callback invoked when monitoring is detected.
    ///
    /// The callback receives the assessed [`RiskLevel`] and a human-readable
    /// details string.
    pub fn register_detection_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(RiskLevel, &str) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        debug!("registered detection callback {id}");
        id
    }

    /// Removes a detection callback; returns whether it was registered.
    pub fn unregister_detection_callback(&self, id: CallbackId) -> bool {
        self.detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Invokes every registered protection callback.
    pub fn notify_protection_callbacks(&self) {
        let snapshot: Vec<ProtectionCallback> = self
            .protection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        // Invoked outside the lock so callbacks may re-enter the bus.
        for callback in snapshot {
            callback();
        }
    }

    /// Invokes every registered detection callback with the given level and
    /// details.
    pub fn notify_detection_callbacks(&self, level: RiskLevel, details: &str) {
        let snapshot: Vec<DetectionCallback> = self
            .detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for callback in snapshot {
            callback(level, details);
        }
    }

    /// Number of registered protection callbacks.
    #[must_use]
    pub fn protection_callback_count(&self) -> usize {
        self.protection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of registered detection callbacks.
    #[must_use]
    pub fn detection_callback_count(&self) -> usize {
        self.detection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for CallbackBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let bus = CallbackBus::new();
        let a = bus.register_protection_callback(|| {});
        let b = bus.register_detection_callback(|_, _| {});
        let c = bus.register_protection_callback(|| {});
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(c, 3);
    }

    #[test]
    fn test_ids_never_reused_after_unregister() {
        let bus = CallbackBus::new();
        let a = bus.register_protection_callback(|| {});
        assert!(bus.unregister_protection_callback(a));
        let b = bus.register_protection_callback(|| {});
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_unregister_unknown_id_returns_false() {
        let bus = CallbackBus::new();
        assert!(!bus.unregister_protection_callback(99));
        assert!(!bus.unregister_detection_callback(99));
        assert_eq!(bus.protection_callback_count(), 0);
        assert_eq!(bus.detection_callback_count(), 0);
    }

    #[test]
    fn test_notify_invokes_each_protection_callback() {
        let bus = CallbackBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            bus.register_protection_callback(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.notify_protection_callbacks();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_detection_callbacks_receive_level_and_details() {
        let bus = CallbackBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.register_detection_callback(move |level, details| {
            sink.lock().unwrap().push((level, details.to_string()));
        });

        bus.notify_detection_callbacks(RiskLevel::High, "debugger attached");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (RiskLevel::High, "debugger attached".to_string()));
    }

    #[test]
    fn test_callback_may_unregister_itself_during_notify() {
        let bus = Arc::new(CallbackBus::new());
        let inner = bus.clone();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_inner = fired.clone();

        // Captures its own id via a cell filled after registration.
        let id_cell = Arc::new(Mutex::new(0u64));
        let id_inner = id_cell.clone();
        let id = bus.register_protection_callback(move || {
            fired_inner.fetch_add(1, Ordering::SeqCst);
            inner.unregister_protection_callback(*id_inner.lock().unwrap());
        });
        *id_cell.lock().unwrap() = id;

        // Does not deadlock; the callback removes itself.
        bus.notify_protection_callbacks();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(bus.protection_callback_count(), 0);

        bus.notify_protection_callbacks();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_register_during_notify() {
        let bus = Arc::new(CallbackBus::new());
        let inner = bus.clone();
        bus.register_protection_callback(move || {
            inner.register_protection_callback(|| {});
        });

        bus.notify_protection_callbacks();
        assert_eq!(bus.protection_callback_count(), 2);
    }
}
