//! Monitoring detection and risk-level maintenance.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;
use strum::{Display, FromRepr};

use crate::{
    config::{CoreConfig, TimingConfig},
    stealth::CallbackBus,
};

/// Coarse, ordered assessment of how likely the process is under active
/// monitoring.
///
/// Stored process-wide in a single atomic cell, written only by the
/// [`RiskAssessor`] and read by anyone deciding whether to proceed with,
/// degrade, or abort a sensitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, FromRepr)]
#[repr(u8)]
pub enum RiskLevel {
    /// Minimal indication of monitoring.
    Low = 0,
    /// Moderate indication; caution advised.
    Medium = 1,
    /// Strong indication; sensitive operations should be limited.
    High = 2,
    /// Monitoring is almost certainly active.
    Critical = 3,
}

impl RiskLevel {
    fn from_atomic(value: u8) -> RiskLevel {
        // Out-of-range values cannot be produced by this crate; degrade
        // conservatively rather than panic.
        RiskLevel::from_repr(value).unwrap_or(RiskLevel::Low)
    }
}

/// A pluggable monitoring heuristic.
///
/// The crate deliberately ships no concrete tool signatures; probes for
/// attached debuggers, foreign code in the address space, timing anomalies
/// and the like are supplied by the embedder and validated separately.
pub trait MonitorProbe: Send + Sync {
    /// Short name used in detection notifications.
    fn name(&self) -> &'static str;

    /// Inspects process state and reports a risk level.
    ///
    /// Returns `None` when the probe cannot complete its scan; the assessor
    /// treats that as no signal rather than an error.
    fn assess(&self) -> Option<RiskLevel>;

    /// Refreshes internal heuristics (signature tables, thresholds).
    ///
    /// Called by [`RiskAssessor::update_detection_techniques`]; the default
    /// is a no-op for stateless probes.
    fn refresh(&self) {}
}

/// Scans for monitoring indicators and maintains the process-wide risk level.
///
/// The scan itself is read-only with respect to hook and protection state.
/// Detected elevation is pushed to the [`CallbackBus`] so interested
/// subsystems can react (for example, pausing further hooking).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use veilhook::{CallbackBus, CoreConfig, MonitorProbe, RiskAssessor, RiskLevel};
///
/// struct AlwaysCalm;
/// impl MonitorProbe for AlwaysCalm {
///     fn name(&self) -> &'static str { "calm" }
///     fn assess(&self) -> Option<RiskLevel> { Some(RiskLevel::Low) }
/// }
///
/// let bus = Arc::new(CallbackBus::new());
/// let assessor = RiskAssessor::new(&CoreConfig::default(), bus, vec![Box::new(AlwaysCalm)]);
/// assert_eq!(assessor.check_for_monitoring(), RiskLevel::Low);
/// assert_eq!(assessor.current_risk_level(), RiskLevel::Low);
/// ```
pub struct RiskAssessor {
    level: AtomicU8,
    probes: Vec<Box<dyn MonitorProbe>>,
    bus: Arc<CallbackBus>,
    timing: TimingConfig,
    refresh_interval: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl RiskAssessor {
    /// Creates an assessor over the given probes.
    ///
    /// The initial risk level is [`RiskLevel::Low`] until the first scan.
    #[must_use]
    pub fn new(config: &CoreConfig, bus: Arc<CallbackBus>, probes: Vec<Box<dyn MonitorProbe>>) -> Self {
        RiskAssessor {
            level: AtomicU8::new(RiskLevel::Low as u8),
            probes,
            bus,
            timing: config.timing.clone(),
            refresh_interval: config.detection_refresh_interval,
            last_refresh: Mutex::new(None),
        }
    }

    /// Scans the process for monitoring indicators and returns the combined
    /// risk level.
    ///
    /// Runs every probe and takes the maximum reported level; probes that
    /// cannot complete contribute nothing, and a scan in which no probe
    /// reports degrades to [`RiskLevel::Low`] rather than failing. The
    /// result is stored as the process-wide level, and detection callbacks
    /// are notified whenever it is above `Low`.
    pub fn check_for_monitoring(&self) -> RiskLevel {
        let mut combined = RiskLevel::Low;
        let mut reporter: Option<&'static str> = None;

        for probe in &self.probes {
            match probe.assess() {
                Some(level) if level > combined => {
                    combined = level;
                    reporter = Some(probe.name());
                }
                Some(_) => {}
                None => warn!("monitor probe '{}' could not complete", probe.name()),
            }
        }

        self.level.store(combined as u8, Ordering::SeqCst);

        if combined > RiskLevel::Low {
            let details = match reporter {
                Some(name) => format!("{combined} risk reported by probe '{name}'"),
                None => format!("{combined} risk"),
            };
            debug!("monitoring detected: {details}");
            self.bus.notify_detection_callbacks(combined, &details);
        }
        combined
    }

    /// Current process-wide risk level (relaxed read; cheap for frequent
    /// callers).
    #[must_use]
    pub fn current_risk_level(&self) -> RiskLevel {
        RiskLevel::from_atomic(self.level.load(Ordering::Relaxed))
    }

    /// Injects a bounded random delay to defeat timing-correlation attacks.
    ///
    /// When `randomize` is false this is a no-op. Otherwise the delay is
    /// drawn uniformly from the configured `[min_delay, max_delay]`.
    pub fn apply_anti_timing_measures(&self, randomize: bool) {
        if !randomize {
            return;
        }
        std::thread::sleep(self.jitter_delay());
    }

    /// Samples the delay [`Self::apply_anti_timing_measures`] would inject.
    ///
    /// Always within `[min_delay, max_delay]` inclusive.
    #[must_use]
    pub fn jitter_delay(&self) -> Duration {
        let min = self.timing.min_delay.as_nanos() as u64;
        let max = self.timing.max_delay.as_nanos() as u64;
        if min >= max {
            return self.timing.min_delay;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(min..=max))
    }

    /// Refreshes the detection heuristics of every probe.
    ///
    /// Rate-limited to the configured minimum interval unless `force` is
    /// set. Returns whether a refresh actually occurred.
    pub fn update_detection_techniques(&self, force: bool) -> bool {
        let mut last = self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !force {
            if let Some(at) = *last {
                if at.elapsed() < self.refresh_interval {
                    return false;
                }
            }
        }

        for probe in &self.probes {
            probe.refresh();
        }
        *last = Some(Instant::now());
        debug!("detection techniques refreshed ({} probes)", self.probes.len());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedProbe {
        name: &'static str,
        level: Option<RiskLevel>,
        refreshes: Arc<AtomicUsize>,
    }

    impl FixedProbe {
        fn reporting(name: &'static str, level: RiskLevel) -> Box<Self> {
            Box::new(FixedProbe {
                name,
                level: Some(level),
                refreshes: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn failing(name: &'static str) -> Box<Self> {
            Box::new(FixedProbe {
                name,
                level: None,
                refreshes: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl MonitorProbe for FixedProbe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn assess(&self) -> Option<RiskLevel> {
            self.level
        }

        fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn assessor_with(probes: Vec<Box<dyn MonitorProbe>>) -> (Arc<CallbackBus>, RiskAssessor) {
        let bus = Arc::new(CallbackBus::new());
        let assessor = RiskAssessor::new(&CoreConfig::default(), bus.clone(), probes);
        (bus, assessor)
    }

    #[test]
    fn test_scan_takes_maximum_probe_level() {
        let (_, assessor) = assessor_with(vec![
            FixedProbe::reporting("a", RiskLevel::Medium),
            FixedProbe::reporting("b", RiskLevel::Critical),
            FixedProbe::reporting("c", RiskLevel::Low),
        ]);
        assert_eq!(assessor.check_for_monitoring(), RiskLevel::Critical);
        assert_eq!(assessor.current_risk_level(), RiskLevel::Critical);
    }

    #[test]
    fn test_failed_probes_degrade_to_low() {
        let (_, assessor) = assessor_with(vec![FixedProbe::failing("a"), FixedProbe::failing("b")]);
        assert_eq!(assessor.check_for_monitoring(), RiskLevel::Low);
        assert_eq!(assessor.current_risk_level(), RiskLevel::Low);
    }

    #[test]
    fn test_no_probes_means_low() {
        let (_, assessor) = assessor_with(vec![]);
        assert_eq!(assessor.check_for_monitoring(), RiskLevel::Low);
    }

    #[test]
    fn test_elevated_scan_notifies_detection_callbacks() {
        let (bus, assessor) = assessor_with(vec![FixedProbe::reporting("dbg", RiskLevel::High)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.register_detection_callback(move |level, details| {
            sink.lock().unwrap().push((level, details.to_string()));
        });

        assessor.check_for_monitoring();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, RiskLevel::High);
        assert!(seen[0].1.contains("dbg"));
    }

    #[test]
    fn test_low_scan_stays_quiet() {
        let (bus, assessor) = assessor_with(vec![FixedProbe::reporting("a", RiskLevel::Low)]);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        bus.register_detection_callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assessor.check_for_monitoring();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_is_rate_limited() {
        let (_, assessor) = assessor_with(vec![FixedProbe::reporting("a", RiskLevel::Low)]);
        assert!(assessor.update_detection_techniques(false));
        // Inside the interval: skipped unless forced.
        assert!(!assessor.update_detection_techniques(false));
        assert!(assessor.update_detection_techniques(true));
    }

    #[test]
    fn test_refresh_reaches_probes() {
        let probe = FixedProbe::reporting("a", RiskLevel::Low);
        let refreshes = probe.refreshes.clone();
        let bus = Arc::new(CallbackBus::new());
        let assessor = RiskAssessor::new(&CoreConfig::default(), bus, vec![probe]);

        assessor.update_detection_techniques(true);
        assessor.update_detection_techniques(true);
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
        // A non-forced refresh inside the interval is skipped.
        assert!(!assessor.update_detection_techniques(false));
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_jitter_within_configured_bounds() {
        let (_, assessor) = assessor_with(vec![]);
        let config = CoreConfig::default();
        for _ in 0..1000 {
            let delay = assessor.jitter_delay();
            assert!(delay >= config.timing.min_delay);
            assert!(delay <= config.timing.max_delay);
        }
    }

    #[test]
    fn test_degenerate_jitter_bounds() {
        let bus = Arc::new(CallbackBus::new());
        let config = CoreConfig {
            timing: crate::config::TimingConfig {
                min_delay: Duration::from_millis(2),
                max_delay: Duration::from_millis(2),
            },
            ..CoreConfig::default()
        };
        let assessor = RiskAssessor::new(&config, bus, vec![]);
        assert_eq!(assessor.jitter_delay(), Duration::from_millis(2));
    }

    #[test]
    fn test_risk_level_display_and_order() {
        assert_eq!(RiskLevel::Low.to_string(), "Low");
        assert_eq!(RiskLevel::Critical.to_string(), "Critical");
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }
}
