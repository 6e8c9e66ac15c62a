//! Risk assessment, notification dispatch and stealth execution.
//!
//! The stealth layer adapts the crate's behavior to detected monitoring:
//!
//! - [`RiskAssessor`] scans the process for monitoring indicators through
//!   pluggable [`MonitorProbe`]s and maintains the process-wide [`RiskLevel`].
//! - [`CallbackBus`] fans protection-triggered and detection-triggered
//!   notifications out to registered listeners.
//! - [`StealthContext`] sanitizes caller-visible execution context around a
//!   protected operation and guarantees restoration on every exit path.

mod callbacks;
mod context;
mod risk;

pub use callbacks::{CallbackBus, CallbackId};
pub use context::{FrameSanitizer, NoopSanitizer, StealthContext};
pub use risk::{MonitorProbe, RiskAssessor, RiskLevel};
