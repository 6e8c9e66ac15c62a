//! Method interception for dynamically-dispatched runtimes.
//!
//! Where [`crate::HookRegistry`] patches concrete code addresses, the
//! [`MethodInterceptor`] swaps the implementation slot a dynamic-dispatch
//! runtime resolves for a `(type, member)` pair - the moral equivalent of
//! Objective-C method swizzling, generalized behind the [`DispatchRuntime`]
//! capability trait so one implementation exists per supported runtime.
//!
//! The interceptor always captures the implementation it is about to replace
//! and restores exactly that pointer on unhook. Platforms without any
//! dynamic-dispatch runtime get an interceptor whose every operation fails
//! with [`crate::Error::PlatformUnsupported`] rather than having the feature
//! silently compiled out.
//!
//! # Thread Safety
//!
//! The method map is a sharded concurrent map; transient `Installing` /
//! `Uninstalling` markers reserve a `(type, member)` pair before the runtime
//! is asked to swap, so the shard lock is never held across a runtime call
//! and concurrent operations on the same pair fail fast instead of
//! interleaving with an in-flight swap.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};

use crate::{Address, Error, Result};

/// Capability interface over a dynamic-dispatch runtime.
///
/// A dispatch runtime resolves a `(type, member)` pair to a callable
/// implementation at call time and allows that implementation slot to be
/// swapped at runtime. One implementation of this trait exists per supported
/// runtime, selected at startup by the composition root.
///
/// All slot access must happen under the runtime's own method-table lock so
/// that capture-and-swap is atomic with respect to concurrent dispatch.
pub trait DispatchRuntime: Send + Sync {
    /// Returns `true` if the runtime knows a type under `type_key`.
    fn has_type(&self, type_key: &str) -> bool;

    /// Atomically replaces the implementation slot of `(type_key, member_key)`
    /// and returns the implementation it held before.
    ///
    /// Returns `None` if the member does not exist within the type (the
    /// caller is expected to have checked the type first).
    fn swap_implementation(
        &self,
        type_key: &str,
        member_key: &str,
        replacement: Address,
    ) -> Option<Address>;
}

/// Tracked record for one intercepted method.
///
/// The original implementation is captured at hook time without exception -
/// it is what makes true restoration possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHookEntry {
    /// Key of the type within the dispatch runtime.
    pub type_key: String,
    /// Key of the member within the type.
    pub member_key: String,
    /// The implementation the slot held before the swap.
    pub original_impl: Address,
}

/// Per-pair lifecycle state.
///
/// `Installing` and `Uninstalling` reserve the pair while a runtime swap is
/// in flight. They are never surfaced to callers as distinct return values -
/// an operation that meets one fails with the same error kind it would have
/// produced had the in-flight operation already finished.
enum MethodSlot {
    Installing,
    Hooked(MethodHookEntry),
    Uninstalling,
}

/// Swaps and restores method implementations in a dynamic-dispatch runtime.
///
/// Entries are keyed by `(type_key, member_key)`; each pair carries at most
/// one interception at a time. Unhooking restores the exact implementation
/// pointer captured at hook time, and the pair stays reserved until the
/// restore has committed, so a concurrent hook can never capture a
/// half-removed replacement as the original.
///
/// # Examples
///
/// ```rust
/// use veilhook::MethodInterceptor;
///
/// // Without a runtime every operation reports the platform as unsupported.
/// let interceptor = MethodInterceptor::unsupported();
/// assert!(interceptor
///     .hook("UIView", "layoutSubviews", veilhook::Address::new(0x4000))
///     .is_err());
/// ```
pub struct MethodInterceptor {
    runtime: Option<Arc<dyn DispatchRuntime>>,
    methods: DashMap<(String, String), MethodSlot>,
}

impl MethodInterceptor {
    /// Creates an interceptor bound to the given dispatch runtime.
    #[must_use]
    pub fn new(runtime: Arc<dyn DispatchRuntime>) -> Self {
        MethodInterceptor {
            runtime: Some(runtime),
            methods: DashMap::new(),
        }
    }

    /// Creates an interceptor for platforms without a dispatch runtime.
    ///
    /// Every operation on the returned interceptor fails with
    /// [`Error::PlatformUnsupported`].
    #[must_use]
    pub fn unsupported() -> Self {
        MethodInterceptor {
            runtime: None,
            methods: DashMap::new(),
        }
    }

    fn runtime(&self) -> Result<&Arc<dyn DispatchRuntime>> {
        self.runtime.as_ref().ok_or(Error::PlatformUnsupported)
    }

    /// Replaces the implementation of `(type_key, member_key)` with
    /// `replacement`, returning the implementation captured before the swap.
    ///
    /// # Errors
    ///
    /// - [`Error::PlatformUnsupported`] if no dispatch runtime is available.
    /// - [`Error::InvalidArgument`] if `replacement` is null.
    /// - [`Error::NotFound`] if the runtime has no such type, or no such
    ///   member within the type.
    /// - [`Error::AlreadyExists`] if the pair is already intercepted (or an
    ///   operation on it is in flight); the existing entry is untouched.
    pub fn hook(&self, type_key: &str, member_key: &str, replacement: Address) -> Result<Address> {
        let runtime = self.runtime()?;
        if replacement.is_null() {
            return Err(invalid_argument!("null method replacement"));
        }
        if !runtime.has_type(type_key) {
            return Err(Error::NotFound(format!("type {type_key}")));
        }

        // Reserve the pair before touching the runtime, so a concurrent
        // operation on the same pair fails fast and the shard lock is not
        // held across the runtime call.
        let key = (type_key.to_string(), member_key.to_string());
        match self.methods.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(Error::AlreadyExists(format!("{type_key}::{member_key}")));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(MethodSlot::Installing);
            }
        }

        let Some(original_impl) = runtime.swap_implementation(type_key, member_key, replacement)
        else {
            // Roll back the reservation; no partial insert.
            self.methods.remove(&key);
            return Err(Error::NotFound(format!("member {type_key}::{member_key}")));
        };

        self.methods.insert(
            key,
            MethodSlot::Hooked(MethodHookEntry {
                type_key: type_key.to_string(),
                member_key: member_key.to_string(),
                original_impl,
            }),
        );
        debug!("intercepted {type_key}::{member_key} -> {replacement}");
        Ok(original_impl)
    }

    /// Restores the original implementation of `(type_key, member_key)` and
    /// removes the entry.
    ///
    /// The pair stays reserved while the restore swap is in flight; it is
    /// removed from tracking only once the runtime has actually restored the
    /// captured implementation.
    ///
    /// # Errors
    ///
    /// - [`Error::PlatformUnsupported`] if no dispatch runtime is available.
    /// - [`Error::NotFound`] if the pair is not intercepted.
    pub fn unhook(&self, type_key: &str, member_key: &str) -> Result<()> {
        let runtime = self.runtime()?;

        let key = (type_key.to_string(), member_key.to_string());
        let entry = {
            let Some(mut slot) = self.methods.get_mut(&key) else {
                return Err(Error::NotFound(format!("{type_key}::{member_key}")));
            };
            match std::mem::replace(&mut *slot, MethodSlot::Uninstalling) {
                MethodSlot::Hooked(entry) => entry,
                // An install or removal is in flight; put the marker back and
                // report the pair as not (yet) intercepted.
                other => {
                    *slot = other;
                    return Err(Error::NotFound(format!("{type_key}::{member_key}")));
                }
            }
        };

        if runtime
            .swap_implementation(type_key, member_key, entry.original_impl)
            .is_none()
        {
            // The runtime lost the member underneath us; keep the entry so a
            // later attempt can still restore.
            warn!("restore failed for {type_key}::{member_key}: member vanished");
            self.methods.insert(key, MethodSlot::Hooked(entry));
            return Err(Error::NotFound(format!("member {type_key}::{member_key}")));
        }
        self.methods.remove(&key);
        debug!("restored {type_key}::{member_key}");
        Ok(())
    }

    /// Best-effort restoration of every intercepted method.
    ///
    /// Never fails; returns the number of methods actually restored.
    pub fn clear_all(&self) -> usize {
        let keys: Vec<(String, String)> = self
            .methods
            .iter()
            .filter(|entry| matches!(entry.value(), MethodSlot::Hooked(_)))
            .map(|entry| entry.key().clone())
            .collect();

        let mut cleared = 0;
        for (type_key, member_key) in keys {
            if self.unhook(&type_key, &member_key).is_ok() {
                cleared += 1;
            }
        }
        debug!("cleared {cleared} method hooks");
        cleared
    }

    /// Returns the tracked entry for `(type_key, member_key)`, if it is
    /// fully intercepted.
    #[must_use]
    pub fn get(&self, type_key: &str, member_key: &str) -> Option<MethodHookEntry> {
        self.methods
            .get(&(type_key.to_string(), member_key.to_string()))
            .and_then(|slot| match &*slot {
                MethodSlot::Hooked(entry) => Some(entry.clone()),
                _ => None,
            })
    }

    /// Number of intercepted methods (in-flight operations excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods
            .iter()
            .filter(|entry| matches!(entry.value(), MethodSlot::Hooked(_)))
            .count()
    }

    /// Returns `true` if no methods are intercepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
