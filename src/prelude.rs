//! # veilhook Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the veilhook library. Import this module to get quick
//! access to the essential interception and stealth types.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all veilhook operations
pub use crate::Error;

/// The result type used throughout veilhook
pub use crate::Result;

/// Opaque handle types for code addresses and preserved entry points
pub use crate::{Address, OriginalEntry};

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The composition root owning every registry
pub use crate::{CoreSnapshot, StealthCore};

/// Process-wide configuration
pub use crate::{CoreConfig, ProtectionTypes, TimingConfig};

// ================================================================================================
// Hooking
// ================================================================================================

/// Low-level hook registry and backend capability
pub use crate::{HookBackend, HookEntry, HookRegistry, SlotBackend};

/// Method interception over dynamic-dispatch runtimes
pub use crate::{DispatchRuntime, MethodHookEntry, MethodInterceptor};

// ================================================================================================
// Protection and Stealth
// ================================================================================================

/// Memory obfuscation registry
pub use crate::{ProtectedRegion, ProtectionRegistry, RegionState};

/// Risk assessment and notification dispatch
pub use crate::{CallbackBus, CallbackId, MonitorProbe, RiskAssessor, RiskLevel};

/// Scoped call-stack sanitization
pub use crate::{FrameSanitizer, NoopSanitizer, StealthContext};
