//! Thread-safe registry of active low-level hooks.
//!
//! The [`HookRegistry`] tracks every installed hook by target identity and
//! delegates the actual redirection to a [`HookBackend`]. It enforces
//! at-most-one-hook-per-target, keeps registry state consistent across
//! backend failures, and never blocks unrelated lookups while a backend call
//! is in flight.
//!
//! # Thread Safety
//!
//! The hook map is a sharded concurrent map; transient `Installing` /
//! `Uninstalling` markers reserve a target before the backend is invoked, so
//! the shard lock is never held across a backend call. Two threads racing to
//! hook the same target see exactly one success and one
//! [`crate::Error::AlreadyExists`].

use std::time::SystemTime;

use dashmap::DashMap;
use log::{debug, warn};

use crate::{hook::HookBackend, stealth::CallbackBus, Address, Error, OriginalEntry, Result};
use std::sync::Arc;

/// Tracked record for one installed hook.
///
/// Owned exclusively by the [`HookRegistry`]; callers receive copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEntry {
    /// The hooked target.
    pub target: Address,
    /// The replacement the target now redirects to.
    pub replacement: Address,
    /// Handle to the preserved original entry point.
    pub original: OriginalEntry,
    /// When the hook was installed.
    pub installed_at: SystemTime,
}

/// Per-target lifecycle state.
///
/// `Installing` and `Uninstalling` reserve the target while a backend call is
/// in flight. They are never surfaced to callers as distinct return values -
/// an operation that meets one fails with the same error kind it would have
/// produced had the in-flight operation already finished.
enum HookSlot {
    Installing,
    Hooked(HookEntry),
    Uninstalling,
}

/// Thread-safe registry for low-level function hooks.
///
/// Tracks active hooks by target identity, enforcing that a target carries at
/// most one hook at a time. Installation and removal are delegated to the
/// [`HookBackend`] supplied at construction; the registry only commits state
/// changes the backend has actually performed:
///
/// - a failed install leaves the registry without the entry (no partial
///   insert);
/// - a failed removal leaves the entry tracked, so the registry never claims
///   "unhooked" for code that is still patched.
///
/// # Examples
///
/// ```rust
/// use std::sync::{atomic::AtomicUsize, Arc};
/// use veilhook::{Address, HookRegistry, SlotBackend};
///
/// let registry = HookRegistry::new(Arc::new(SlotBackend::new()));
///
/// let slot = AtomicUsize::new(0x1000);
/// let target = Address::from_ptr(&slot);
///
/// let original = registry.register_hook(target, Address::new(0x2000))?;
/// assert_eq!(original.address().value(), 0x1000);
/// assert_eq!(registry.len(), 1);
///
/// registry.unregister_hook(target)?;
/// assert!(registry.is_empty());
/// # Ok::<(), veilhook::Error>(())
/// ```
pub struct HookRegistry {
    hooks: DashMap<Address, HookSlot>,
    backend: Arc<dyn HookBackend>,
    bus: Option<Arc<CallbackBus>>,
}

impl HookRegistry {
    /// Creates an empty registry delegating to the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn HookBackend>) -> Self {
        HookRegistry {
            hooks: DashMap::new(),
            backend,
            bus: None,
        }
    }

    /// Creates a registry that notifies the bus's protection callbacks on
    /// every successful install.
    #[must_use]
    pub fn with_callbacks(backend: Arc<dyn HookBackend>, bus: Arc<CallbackBus>) -> Self {
        HookRegistry {
            hooks: DashMap::new(),
            backend,
            bus: Some(bus),
        }
    }

    /// Resets the registry to a clean state.
    ///
    /// Best-effort removes every tracked hook through the backend, then drops
    /// all remaining tracked state unconditionally. Idempotent; safe to call
    /// multiple times.
    pub fn initialize(&self) {
        let cleared = self.clear_all_hooks();
        if !self.hooks.is_empty() {
            warn!(
                "hook registry initialize: dropping {} entries the backend could not remove",
                self.hooks.len()
            );
        }
        self.hooks.clear();
        debug!("hook registry initialized ({cleared} hooks cleared)");
    }

    /// Installs a hook redirecting `target` to `replacement`.
    ///
    /// On success the entry is tracked and a handle to the preserved original
    /// entry point is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if either address is null.
    /// - [`Error::AlreadyExists`] if `target` is already tracked (or an
    ///   install to it is in flight); the existing entry is untouched.
    /// - [`Error::BackendFailure`] if the backend rejects the redirection;
    ///   the registry is unchanged.
    pub fn register_hook(&self, target: Address, replacement: Address) -> Result<OriginalEntry> {
        if target.is_null() {
            return Err(invalid_argument!("null hook target"));
        }
        if replacement.is_null() {
            return Err(invalid_argument!("null hook replacement"));
        }

        // Reserve the target before touching the backend, so a concurrent
        // install to the same target fails fast and the shard lock is not
        // held across the backend call.
        match self.hooks.entry(target) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::AlreadyExists(target.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(HookSlot::Installing);
            }
        }

        match self.backend.install(target, replacement) {
            Ok(original) => {
                self.hooks.insert(
                    target,
                    HookSlot::Hooked(HookEntry {
                        target,
                        replacement,
                        original,
                        installed_at: SystemTime::now(),
                    }),
                );
                debug!("hooked {target} -> {replacement} (original {original})");
                if let Some(bus) = &self.bus {
                    bus.notify_protection_callbacks();
                }
                Ok(original)
            }
            Err(err) => {
                // Roll back the reservation; no partial insert.
                self.hooks.remove(&target);
                warn!("hook install failed for {target}: {err}");
                Err(err)
            }
        }
    }

    /// Removes the hook installed at `target`.
    ///
    /// The entry is removed from tracking only once the backend has actually
    /// undone the redirection.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `target` is not tracked.
    /// - [`Error::BackendFailure`] if the backend cannot undo the
    ///   redirection; the entry stays tracked.
    pub fn unregister_hook(&self, target: Address) -> Result<()> {
        if target.is_null() {
            return Err(invalid_argument!("null hook target"));
        }

        let entry = {
            let Some(mut slot) = self.hooks.get_mut(&target) else {
                return Err(Error::NotFound(target.to_string()));
            };
            match std::mem::replace(&mut *slot, HookSlot::Uninstalling) {
                HookSlot::Hooked(entry) => entry,
                // An install or removal is in flight; put the marker back and
                // report the target as not (yet) hooked.
                other => {
                    *slot = other;
                    return Err(Error::NotFound(target.to_string()));
                }
            }
        };

        match self.backend.remove(target) {
            Ok(()) => {
                self.hooks.remove(&target);
                debug!("unhooked {target}");
                Ok(())
            }
            Err(err) => {
                // The code is still patched; keep claiming the hook.
                self.hooks.insert(target, HookSlot::Hooked(entry));
                warn!("unhook failed for {target}: {err}");
                Err(err)
            }
        }
    }

    /// Best-effort removal of every tracked hook.
    ///
    /// Attempts to remove each entry, swallowing individual backend failures;
    /// entries the backend refuses to undo stay tracked. Never fails.
    /// Returns the number of hooks actually cleared.
    pub fn clear_all_hooks(&self) -> usize {
        let targets: Vec<Address> = self.hooks.iter().map(|entry| *entry.key()).collect();

        let mut cleared = 0;
        for target in targets {
            // Err means the backend refused or another thread got there first.
            if self.unregister_hook(target).is_ok() {
                cleared += 1;
            }
        }
        debug!("cleared {cleared} hooks");
        cleared
    }

    /// Returns the entry tracked for `target`, if it is fully hooked.
    #[must_use]
    pub fn get(&self, target: Address) -> Option<HookEntry> {
        self.hooks.get(&target).and_then(|slot| match &*slot {
            HookSlot::Hooked(entry) => Some(*entry),
            _ => None,
        })
    }

    /// Returns `true` if `target` currently carries a hook.
    #[must_use]
    pub fn is_hooked(&self, target: Address) -> bool {
        self.get(target).is_some()
    }

    /// Number of active hooks (in-flight installs and removals excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks
            .iter()
            .filter(|entry| matches!(entry.value(), HookSlot::Hooked(_)))
            .count()
    }

    /// Returns `true` if no hooks are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all currently hooked targets.
    #[must_use]
    pub fn targets(&self) -> Vec<Address> {
        self.hooks
            .iter()
            .filter(|entry| matches!(entry.value(), HookSlot::Hooked(_)))
            .map(|entry| *entry.key())
            .collect()
    }
}
