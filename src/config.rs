//! Process-wide configuration for the hook engine and stealth layer.
//!
//! Configuration is set once when the [`crate::StealthCore`] composition root
//! is constructed and is read-only afterwards, except for the enabled
//! protection-type set which can be toggled at runtime through the core.

use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// The set of protection categories the stealth layer may apply.
    ///
    /// Each flag gates one category of countermeasure. Flags scope which
    /// mechanisms engage around sensitive operations - for example, call-stack
    /// sanitization only runs inside a [`crate::StealthContext`] when
    /// [`ProtectionTypes::CALL_STACK`] is enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtectionTypes: u32 {
        /// Memory signature obfuscation of protected regions.
        const MEMORY = 1 << 0;
        /// Call-stack sanitization around wrapped operations.
        const CALL_STACK = 1 << 1;
        /// Anti-timing jitter around sensitive call sites.
        const TIMING = 1 << 2;
        /// Anti-analysis countermeasures.
        const ANALYSIS = 1 << 3;
        /// Dynamic behavior adaptation driven by the risk level.
        const BEHAVIOR = 1 << 4;
        /// Network traffic shape obfuscation.
        const NETWORK = 1 << 5;
        /// Anti-debugging measures.
        const DEBUG = 1 << 6;
    }
}

/// Bounds for the anti-timing jitter delay.
///
/// [`crate::RiskAssessor::apply_anti_timing_measures`] draws a uniformly
/// random delay from `[min_delay, max_delay]` (inclusive) when randomization
/// is enabled.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Lower bound of the injected delay (default: 500µs).
    pub min_delay: Duration,

    /// Upper bound of the injected delay (default: 8ms).
    pub max_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            min_delay: Duration::from_micros(500),
            max_delay: Duration::from_millis(8),
        }
    }
}

/// Configuration for the hook engine and stealth layer.
///
/// Passed to [`crate::StealthCore::new`] at construction. The defaults enable
/// every protection type with conservative limits.
///
/// # Examples
///
/// ```rust
/// use veilhook::{CoreConfig, ProtectionTypes};
///
/// let config = CoreConfig {
///     enabled_protections: ProtectionTypes::MEMORY | ProtectionTypes::TIMING,
///     max_protected_region_bytes: 4096,
///     ..CoreConfig::default()
/// };
/// assert!(config.enabled_protections.contains(ProtectionTypes::MEMORY));
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Protection categories enabled at startup (default: all).
    pub enabled_protections: ProtectionTypes,

    /// Whether anti-timing measures randomize delays by default (default: true).
    pub randomize_timing: bool,

    /// Maximum length in bytes accepted by a single protect request
    /// (default: 64 KiB). Longer requests fail with
    /// [`crate::Error::InvalidArgument`].
    pub max_protected_region_bytes: usize,

    /// Bounds for the anti-timing jitter.
    pub timing: TimingConfig,

    /// Minimum interval between detection-technique refreshes (default: 30s).
    ///
    /// [`crate::RiskAssessor::update_detection_techniques`] skips refreshes
    /// requested inside this window unless forced.
    pub detection_refresh_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            enabled_protections: ProtectionTypes::all(),
            randomize_timing: true,
            max_protected_region_bytes: 64 * 1024,
            timing: TimingConfig::default(),
            detection_refresh_interval: Duration::from_secs(30),
        }
    }
}
