//! Low-level function hooking.
//!
//! This module provides the machine-level redirection layer of the crate:
//!
//! - [`HookBackend`] - the platform capability that performs the actual
//!   redirection of one function to another and hands back a callable
//!   original entry point.
//! - [`SlotBackend`] - the shipped in-process backend, which redirects
//!   through function-pointer slots (IAT/vtable style) with atomic swaps.
//! - [`HookRegistry`] - the thread-safe registry tracking active hooks by
//!   target identity and enforcing at-most-one-hook-per-target.
//! - [`HookEntry`] - the tracked record for one installed hook.
//!
//! # Lifecycle
//!
//! A target moves through `Unhooked -> Installing -> Hooked -> Uninstalling
//! -> Unhooked`. The two transient states are internal in-map markers that
//! make concurrent operations on the same target fail fast while a backend
//! call is in flight; callers only ever observe success or one of the
//! [`crate::Error`] kinds.

mod backend;
mod registry;

pub use backend::{HookBackend, SlotBackend};
pub use registry::{HookEntry, HookRegistry};
