//! Composition root owning every registry of the crate.
//!
//! Prior art for this kind of system kept a process-wide singleton; here the
//! [`StealthCore`] is constructed explicitly, owns shared handles to each
//! subsystem, and is passed to collaborators. That keeps mutation visible
//! and lets tests build isolated cores.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use log::debug;

use crate::{
    config::{CoreConfig, ProtectionTypes},
    hook::{HookBackend, HookRegistry},
    interceptor::{DispatchRuntime, MethodInterceptor},
    protection::ProtectionRegistry,
    stealth::{CallbackBus, FrameSanitizer, MonitorProbe, NoopSanitizer, RiskAssessor, RiskLevel, StealthContext},
};

/// Read-only view of the core's state for observability consumers.
///
/// Snapshots are taken without blocking writers and never expose mutable
/// access to any registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSnapshot {
    /// Number of active low-level hooks.
    pub active_hooks: usize,
    /// Number of intercepted methods.
    pub hooked_methods: usize,
    /// Number of Active protected regions.
    pub protected_regions: usize,
    /// Current process-wide risk level.
    pub risk_level: RiskLevel,
}

/// Owns the hook engine and stealth layer of one process.
///
/// The core wires the subsystems together at construction: the hook registry
/// gets its backend, the method interceptor its dispatch runtime (or the
/// unsupported placeholder), the risk assessor its probes, and the hook and
/// protection registries the shared callback bus, so protection callbacks
/// fire on every successful install and protect. Collaborators receive `Arc`
/// handles through the accessors.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use veilhook::{CoreConfig, ProtectionTypes, SlotBackend, StealthCore};
///
/// let core = StealthCore::with_defaults(CoreConfig::default(), Arc::new(SlotBackend::new()));
///
/// assert!(core.is_protection_enabled(ProtectionTypes::MEMORY));
/// let snapshot = core.snapshot();
/// assert_eq!(snapshot.active_hooks, 0);
/// ```
pub struct StealthCore {
    config: CoreConfig,
    enabled: AtomicU32,
    hooks: Arc<HookRegistry>,
    interceptor: Arc<MethodInterceptor>,
    protection: Arc<ProtectionRegistry>,
    risk: Arc<RiskAssessor>,
    bus: Arc<CallbackBus>,
    sanitizer: Arc<dyn FrameSanitizer>,
}

impl StealthCore {
    /// Builds a core from explicit collaborators.
    ///
    /// `runtime` is `None` on platforms without a dynamic-dispatch runtime;
    /// the interceptor then reports [`crate::Error::PlatformUnsupported`]
    /// for every operation instead of being compiled out.
    #[must_use]
    pub fn new(
        config: CoreConfig,
        backend: Arc<dyn HookBackend>,
        runtime: Option<Arc<dyn DispatchRuntime>>,
        probes: Vec<Box<dyn MonitorProbe>>,
        sanitizer: Arc<dyn FrameSanitizer>,
    ) -> Self {
        let bus = Arc::new(CallbackBus::new());
        let interceptor = match runtime {
            Some(runtime) => MethodInterceptor::new(runtime),
            None => MethodInterceptor::unsupported(),
        };

        let core = StealthCore {
            enabled: AtomicU32::new(config.enabled_protections.bits()),
            hooks: Arc::new(HookRegistry::with_callbacks(backend, bus.clone())),
            interceptor: Arc::new(interceptor),
            protection: Arc::new(ProtectionRegistry::with_callbacks(
                config.max_protected_region_bytes,
                bus.clone(),
            )),
            risk: Arc::new(RiskAssessor::new(&config, bus.clone(), probes)),
            bus,
            sanitizer,
            config,
        };
        debug!(
            "stealth core constructed (protections: {:?})",
            core.config.enabled_protections
        );
        core
    }

    /// Builds a core with no dispatch runtime, no probes and a no-op
    /// sanitizer - the common starting point for tests and minimal embeds.
    #[must_use]
    pub fn with_defaults(config: CoreConfig, backend: Arc<dyn HookBackend>) -> Self {
        StealthCore::new(config, backend, None, Vec::new(), Arc::new(NoopSanitizer))
    }

    /// The configuration this core was built with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Shared handle to the low-level hook registry.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Shared handle to the method interceptor.
    #[must_use]
    pub fn interceptor(&self) -> &Arc<MethodInterceptor> {
        &self.interceptor
    }

    /// Shared handle to the memory protection registry.
    #[must_use]
    pub fn protection(&self) -> &Arc<ProtectionRegistry> {
        &self.protection
    }

    /// Shared handle to the risk assessor.
    #[must_use]
    pub fn risk(&self) -> &Arc<RiskAssessor> {
        &self.risk
    }

    /// Shared handle to the callback bus.
    #[must_use]
    pub fn callbacks(&self) -> &Arc<CallbackBus> {
        &self.bus
    }

    /// Enables a protection category at runtime.
    pub fn enable_protection(&self, types: ProtectionTypes) {
        self.enabled.fetch_or(types.bits(), Ordering::SeqCst);
    }

    /// Disables a protection category at runtime.
    pub fn disable_protection(&self, types: ProtectionTypes) {
        self.enabled.fetch_and(!types.bits(), Ordering::SeqCst);
    }

    /// Returns `true` if every flag in `types` is currently enabled.
    #[must_use]
    pub fn is_protection_enabled(&self, types: ProtectionTypes) -> bool {
        let current = ProtectionTypes::from_bits_truncate(self.enabled.load(Ordering::SeqCst));
        current.contains(types)
    }

    /// Injects anti-timing jitter, honoring the [`ProtectionTypes::TIMING`]
    /// flag and the configured randomization setting.
    pub fn apply_anti_timing(&self) {
        if self.is_protection_enabled(ProtectionTypes::TIMING) {
            self.risk
                .apply_anti_timing_measures(self.config.randomize_timing);
        }
    }

    /// Runs `operation` with call-stack sanitization, honoring the
    /// [`ProtectionTypes::CALL_STACK`] flag.
    pub fn run_sanitized<T>(&self, operation: impl FnOnce() -> T) -> T {
        let enabled = self.is_protection_enabled(ProtectionTypes::CALL_STACK);
        StealthContext::run(self.sanitizer.as_ref(), enabled, operation)
    }

    /// Read-only snapshot of the core's state.
    #[must_use]
    pub fn snapshot(&self) -> CoreSnapshot {
        CoreSnapshot {
            active_hooks: self.hooks.len(),
            hooked_methods: self.interceptor.len(),
            protected_regions: self.protection.len(),
            risk_level: self.risk.current_risk_level(),
        }
    }

    /// Best-effort cleanup of every subsystem.
    ///
    /// Unhooks, restores and unprotects whatever the backends permit; never
    /// fails. Returns the total number of entries cleaned up.
    pub fn teardown(&self) -> usize {
        let cleaned = self.hooks.clear_all_hooks()
            + self.interceptor.clear_all()
            + self.protection.clear_all();
        debug!("core teardown cleaned {cleaned} entries");
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::SlotBackend;
    use crate::Address;
    use std::sync::atomic::AtomicUsize;

    fn core() -> StealthCore {
        StealthCore::with_defaults(CoreConfig::default(), Arc::new(SlotBackend::new()))
    }

    #[test]
    fn test_snapshot_reflects_registries() {
        let core = core();
        let slot = AtomicUsize::new(0x1111);
        let mut buffer = vec![0x90u8; 32];

        core.hooks()
            .register_hook(Address::from_ptr(&slot), Address::new(0x2222))
            .unwrap();
        core.protection()
            .protect(Address::from_ptr(buffer.as_mut_ptr()), buffer.len())
            .unwrap();

        let snapshot = core.snapshot();
        assert_eq!(snapshot.active_hooks, 1);
        assert_eq!(snapshot.hooked_methods, 0);
        assert_eq!(snapshot.protected_regions, 1);
        assert_eq!(snapshot.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_protection_callbacks_observe_installs() {
        use std::sync::atomic::Ordering;

        let core = core();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        core.callbacks().register_protection_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let slot = AtomicUsize::new(0x1000);
        core.hooks()
            .register_hook(Address::from_ptr(&slot), Address::new(0x2000))
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let mut buffer = vec![0x90u8; 16];
        core.protection()
            .protect(Address::from_ptr(buffer.as_mut_ptr()), 16)
            .unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        core.teardown();
    }

    #[test]
    fn test_protection_toggles() {
        let core = core();
        assert!(core.is_protection_enabled(ProtectionTypes::CALL_STACK));

        core.disable_protection(ProtectionTypes::CALL_STACK);
        assert!(!core.is_protection_enabled(ProtectionTypes::CALL_STACK));
        // Other flags untouched.
        assert!(core.is_protection_enabled(ProtectionTypes::MEMORY));

        core.enable_protection(ProtectionTypes::CALL_STACK);
        assert!(core.is_protection_enabled(ProtectionTypes::CALL_STACK));
    }

    #[test]
    fn test_anti_timing_noop_when_disabled() {
        let config = CoreConfig {
            timing: crate::config::TimingConfig {
                min_delay: std::time::Duration::from_secs(5),
                max_delay: std::time::Duration::from_secs(5),
            },
            ..CoreConfig::default()
        };
        let core = StealthCore::with_defaults(config, Arc::new(SlotBackend::new()));
        core.disable_protection(ProtectionTypes::TIMING);

        let start = std::time::Instant::now();
        core.apply_anti_timing();
        // With the flag off the five-second jitter must not have run.
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_run_sanitized_returns_value() {
        let core = core();
        assert_eq!(core.run_sanitized(|| 7), 7);
        core.disable_protection(ProtectionTypes::CALL_STACK);
        assert_eq!(core.run_sanitized(|| 8), 8);
    }

    #[test]
    fn test_teardown_cleans_everything() {
        let core = core();
        let slots: Vec<AtomicUsize> = (0..3).map(|i| AtomicUsize::new(0x100 + i)).collect();
        for slot in &slots {
            core.hooks()
                .register_hook(Address::from_ptr(slot), Address::new(0x900))
                .unwrap();
        }
        let mut buffer = vec![0xAAu8; 16];
        core.protection()
            .protect(Address::from_ptr(buffer.as_mut_ptr()), 16)
            .unwrap();

        assert_eq!(core.teardown(), 4);
        let snapshot = core.snapshot();
        assert_eq!(snapshot.active_hooks, 0);
        assert_eq!(snapshot.protected_regions, 0);
        assert_eq!(buffer, vec![0xAAu8; 16]);
    }

    #[test]
    fn test_interceptor_unsupported_without_runtime() {
        let core = core();
        assert!(matches!(
            core.interceptor().hook("T", "m", Address::new(1)),
            Err(crate::Error::PlatformUnsupported)
        ));
    }
}
