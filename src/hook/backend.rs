//! Hook backend trait and the shipped pointer-slot implementation.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use dashmap::DashMap;

use crate::{Address, OriginalEntry, Result};

/// Platform capability that performs machine-level redirection of one
/// function to another.
///
/// The backend is the only component that touches executable memory. It holds
/// no registry state - tracking which targets are hooked is the job of
/// [`crate::HookRegistry`] - though an implementation may keep per-target
/// bookkeeping of its own (saved bytes, trampolines) needed to undo a
/// redirection.
///
/// Implementations must not crash on unsupported instruction patterns,
/// protected pages or misaligned targets; such conditions are reported as
/// [`crate::Error::BackendFailure`].
///
/// # Memory Visibility
///
/// Once `install` returns `Ok`, every subsequent invocation through `target`
/// from any thread must observe the replacement. The shipped [`SlotBackend`]
/// guarantees this with sequentially-consistent atomic swaps.
pub trait HookBackend: Send + Sync {
    /// Redirects `target` to `replacement` and returns a handle to the
    /// preserved original entry point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BackendFailure`] if the redirection mechanism
    /// rejects the operation.
    fn install(&self, target: Address, replacement: Address) -> Result<OriginalEntry>;

    /// Undoes a redirection previously installed at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BackendFailure`] if the redirection cannot be
    /// undone, in which case the target is still patched.
    fn remove(&self, target: Address) -> Result<()>;
}

/// In-process backend that redirects through function-pointer slots.
///
/// A *slot* is a pointer-sized, pointer-aligned memory cell holding a
/// function address - an import-table entry, a vtable slot, or any other
/// indirection cell the process calls through. Installing a hook atomically
/// swaps the slot's content to the replacement address and preserves the
/// prior value; the prior value is handed back as the original entry point
/// and restored verbatim on removal.
///
/// Slot redirection needs no instruction relocation or code-page rewriting,
/// so it works on any architecture and never has to disassemble the target.
///
/// # Target Contract
///
/// Every `target` passed to this backend must be the address of a valid,
/// writable, pointer-aligned slot that stays alive while the hook is
/// installed. Passing the address of anything else is undefined behavior.
/// Misaligned and null targets are rejected with
/// [`crate::Error::BackendFailure`] before any memory is touched.
///
/// # Serialization
///
/// Slot mutation is serialized behind an internal mutex so that install and
/// remove never interleave, satisfying the single-global-serialization-point
/// requirement without ever blocking registry reads.
pub struct SlotBackend {
    /// Prior slot values, keyed by target, needed to undo a redirection.
    saved: DashMap<Address, usize>,
    /// Serializes all slot mutation.
    patch_lock: Mutex<()>,
}

impl SlotBackend {
    /// Creates a backend with no installed redirections.
    #[must_use]
    pub fn new() -> Self {
        SlotBackend {
            saved: DashMap::new(),
            patch_lock: Mutex::new(()),
        }
    }

    fn validate(target: Address) -> Result<()> {
        if target.is_null() {
            return Err(backend_failure!("null slot address"));
        }
        if target.value() % std::mem::align_of::<AtomicUsize>() != 0 {
            return Err(backend_failure!("misaligned slot address {target}"));
        }
        Ok(())
    }
}

impl Default for SlotBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend for SlotBackend {
    fn install(&self, target: Address, replacement: Address) -> Result<OriginalEntry> {
        Self::validate(target)?;

        let _serial = self
            .patch_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if self.saved.contains_key(&target) {
            return Err(backend_failure!("slot {target} is already redirected"));
        }

        // SAFETY: the target contract guarantees `target` names a live,
        // writable, pointer-aligned slot; alignment was checked above.
        let slot = unsafe { &*(target.value() as *const AtomicUsize) };
        let prior = slot.swap(replacement.value(), Ordering::SeqCst);

        self.saved.insert(target, prior);
        Ok(OriginalEntry::new(Address::new(prior)))
    }

    fn remove(&self, target: Address) -> Result<()> {
        Self::validate(target)?;

        let _serial = self
            .patch_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some((_, prior)) = self.saved.remove(&target) else {
            return Err(backend_failure!("slot {target} is not redirected"));
        };

        // SAFETY: same contract as in `install`; the slot outlives the hook.
        let slot = unsafe { &*(target.value() as *const AtomicUsize) };
        slot.store(prior, Ordering::SeqCst);
        Ok(())
    }
}
