#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]
// Unsafe code is confined to 'hook/backend.rs' (slot dereference) and
// 'protection/mod.rs' (region byte copies), each behind a caller contract.

//! # veilhook
//!
//! A thread-safe runtime interception library: low-level function hooks,
//! dynamic-dispatch method interception, reversible memory obfuscation, and
//! a stealth layer that adapts behavior to detected monitoring.
//!
//! ## Features
//!
//! - **Hook registry** - at-most-one-hook-per-target tracking with
//!   fail-safe install/remove semantics over a pluggable [`HookBackend`]
//! - **Method interception** - capture-and-swap of `(type, member)`
//!   implementation slots behind the [`DispatchRuntime`] capability trait
//! - **Memory protection** - address-keyed, exactly-reversible byte
//!   obfuscation of tracked regions
//! - **Risk assessment** - pluggable monitoring probes feeding a
//!   process-wide atomic [`RiskLevel`], with anti-timing jitter
//! - **Callback bus** - reentrancy-safe protection/detection notifications
//! - **Stealth execution** - scoped call-stack sanitization with guaranteed
//!   restoration on every exit path
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{atomic::AtomicUsize, Arc};
//! use veilhook::prelude::*;
//!
//! // The composition root owns every registry; no global state.
//! let core = StealthCore::with_defaults(CoreConfig::default(), Arc::new(SlotBackend::new()));
//!
//! // Redirect a function-pointer slot and keep the original callable.
//! let slot = AtomicUsize::new(0x1000);
//! let target = Address::from_ptr(&slot);
//! let original = core.hooks().register_hook(target, Address::new(0x2000))?;
//! assert_eq!(original.address().value(), 0x1000);
//!
//! // Everything undone on teardown.
//! core.teardown();
//! # Ok::<(), veilhook::Error>(())
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into subsystem modules, each guarded by its own
//! lock so cross-subsystem contention stays minimal:
//!
//! - [`hook`] - [`HookBackend`], [`SlotBackend`], [`HookRegistry`]
//! - [`interceptor`] - [`DispatchRuntime`], [`MethodInterceptor`]
//! - [`protection`] - [`ProtectionRegistry`] and the keyed byte transform
//! - [`stealth`] - [`RiskAssessor`], [`CallbackBus`], [`StealthContext`]
//! - [`config`] - process-wide [`CoreConfig`] set once at construction
//! - [`StealthCore`] - the composition root wiring them together
//!
//! All operations are synchronous: each either completes or returns one of
//! the [`Error`] kinds before returning, and a failed operation never
//! leaves a registry partially mutated.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T, Error>`](Result):
//!
//! ```rust
//! use std::sync::Arc;
//! use veilhook::{Address, Error, HookRegistry, SlotBackend};
//!
//! let registry = HookRegistry::new(Arc::new(SlotBackend::new()));
//! match registry.register_hook(Address::NULL, Address::new(0x2000)) {
//!     Err(Error::InvalidArgument(msg)) => println!("rejected: {msg}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate emits `debug!`/`warn!` records through the [`log`] facade at
//! registry mutation points; it never initializes a logger itself.

#[macro_use]
pub(crate) mod error;

mod address;
mod core;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use veilhook::prelude::*;
///
/// let core = StealthCore::with_defaults(CoreConfig::default(), Arc::new(SlotBackend::new()));
/// assert_eq!(core.snapshot().active_hooks, 0);
/// ```
pub mod prelude;

/// Process-wide configuration: protection-type flags, timing bounds,
/// region limits.
pub mod config;

/// Low-level function hooking: the backend capability trait, the shipped
/// pointer-slot backend, and the thread-safe hook registry.
pub mod hook;

/// Method interception for dynamically-dispatched runtimes, behind the
/// capability-checked [`DispatchRuntime`] trait.
pub mod interceptor;

/// Reversible memory obfuscation: the protection registry and the
/// address-keyed byte transform.
pub mod protection;

/// Risk assessment, callback dispatch and scoped stealth execution.
pub mod stealth;

/// `veilhook` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type
/// is always [`Error`], used for all fallible operations in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `veilhook` Error type
///
/// The error kinds every API in this crate can return. See [`error`
/// categories](Error) for the full list.
pub use error::Error;

pub use address::{Address, OriginalEntry};
pub use config::{CoreConfig, ProtectionTypes, TimingConfig};
pub use core::{CoreSnapshot, StealthCore};
pub use hook::{HookBackend, HookEntry, HookRegistry, SlotBackend};
pub use interceptor::{DispatchRuntime, MethodHookEntry, MethodInterceptor};
pub use protection::{ProtectedRegion, ProtectionRegistry, RegionState};
pub use stealth::{
    CallbackBus, CallbackId, FrameSanitizer, MonitorProbe, NoopSanitizer, RiskAssessor, RiskLevel,
    StealthContext,
};
