//! Concurrency stress tests for the registries.
//!
//! Multiple threads may call any operation concurrently; these tests verify
//! there are no lost updates and that per-target exclusivity holds under
//! contention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use veilhook::prelude::*;

const THREADS: usize = 16;
const HOOKS_PER_THREAD: usize = 32;

#[test]
fn concurrent_registration_of_distinct_targets_loses_nothing() {
    let registry = HookRegistry::new(Arc::new(SlotBackend::new()));
    let slots: Vec<AtomicUsize> = (0..THREADS * HOOKS_PER_THREAD)
        .map(|i| AtomicUsize::new(0x10_0000 + i))
        .collect();

    std::thread::scope(|scope| {
        for chunk in slots.chunks(HOOKS_PER_THREAD) {
            let registry = &registry;
            scope.spawn(move || {
                for slot in chunk {
                    registry
                        .register_hook(Address::from_ptr(slot), Address::new(0xFEED_0000))
                        .expect("distinct targets must all succeed");
                }
            });
        }
    });

    assert_eq!(registry.len(), THREADS * HOOKS_PER_THREAD);
    assert_eq!(registry.targets().len(), THREADS * HOOKS_PER_THREAD);

    // Every slot observes the replacement after a successful install.
    for slot in &slots {
        assert_eq!(slot.load(Ordering::SeqCst), 0xFEED_0000);
    }
}

#[test]
fn concurrent_registration_of_same_target_admits_exactly_one() {
    let registry = Arc::new(HookRegistry::new(Arc::new(SlotBackend::new())));
    let slot = Arc::new(AtomicUsize::new(0x1111));
    let successes = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let registry = registry.clone();
            let slot = slot.clone();
            let successes = successes.clone();
            scope.spawn(move || {
                if registry
                    .register_hook(Address::from_ptr(slot.as_ref()), Address::new(0x2222))
                    .is_ok()
                {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(slot.load(Ordering::SeqCst), 0x2222);
}

#[test]
fn concurrent_register_unregister_cycles_settle_clean() {
    let registry = Arc::new(HookRegistry::new(Arc::new(SlotBackend::new())));
    let slots: Vec<AtomicUsize> = (0..THREADS).map(|i| AtomicUsize::new(0x500 + i)).collect();

    std::thread::scope(|scope| {
        for slot in &slots {
            let registry = registry.clone();
            scope.spawn(move || {
                let target = Address::from_ptr(slot);
                for _ in 0..64 {
                    registry
                        .register_hook(target, Address::new(0x9000))
                        .expect("target is private to this thread");
                    registry.unregister_hook(target).expect("hook was installed");
                }
            });
        }
    });

    assert!(registry.is_empty());
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.load(Ordering::SeqCst), 0x500 + i);
    }
}

#[test]
fn concurrent_callback_registration_yields_unique_ids() {
    let bus = Arc::new(CallbackBus::new());

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let bus = bus.clone();
            handles.push(scope.spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..100 {
                    ids.push(bus.register_protection_callback(|| {}));
                }
                ids
            }));
        }

        let mut all: Vec<CallbackId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("no panics"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), THREADS * 100);
    });

    assert_eq!(bus.protection_callback_count(), THREADS * 100);
}

#[test]
fn concurrent_protect_of_distinct_regions() {
    let registry = Arc::new(ProtectionRegistry::new(4096));
    let mut buffers: Vec<Vec<u8>> = (0..THREADS).map(|_| vec![0x90u8; 256]).collect();
    let addresses: Vec<Address> = buffers
        .iter_mut()
        .map(|buffer| Address::from_ptr(buffer.as_mut_ptr()))
        .collect();

    std::thread::scope(|scope| {
        for &address in &addresses {
            let registry = registry.clone();
            scope.spawn(move || {
                registry.protect(address, 256).expect("regions are distinct");
            });
        }
    });

    assert_eq!(registry.len(), THREADS);
    assert_eq!(registry.clear_all(), THREADS);
    for buffer in &buffers {
        assert_eq!(*buffer, vec![0x90u8; 256]);
    }
}

#[test]
fn contended_protect_unprotect_cycles_never_corrupt_the_region() {
    let registry = Arc::new(ProtectionRegistry::new(4096));
    let mut buffer = vec![0x5Au8; 64];
    let address = Address::from_ptr(buffer.as_mut_ptr());

    // Both threads fight over the same address; whoever wins a protect is
    // the one that unprotects it. A protect must never snapshot bytes a
    // concurrent restore has not finished writing back.
    std::thread::scope(|scope| {
        for _ in 0..2 {
            let registry = registry.clone();
            scope.spawn(move || {
                for _ in 0..500 {
                    if registry.protect(address, 64).is_ok() {
                        registry.unprotect(address).expect("protector owns the region");
                    }
                }
            });
        }
    });

    assert!(registry.is_empty());
    assert_eq!(buffer, vec![0x5Au8; 64]);
}

#[test]
fn risk_level_visible_across_threads() {
    struct Elevated;
    impl MonitorProbe for Elevated {
        fn name(&self) -> &'static str {
            "elevated"
        }
        fn assess(&self) -> Option<RiskLevel> {
            Some(RiskLevel::High)
        }
    }

    let bus = Arc::new(CallbackBus::new());
    let assessor = Arc::new(RiskAssessor::new(
        &CoreConfig::default(),
        bus,
        vec![Box::new(Elevated)],
    ));

    assessor.check_for_monitoring();

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let assessor = assessor.clone();
            scope.spawn(move || {
                assert_eq!(assessor.current_risk_level(), RiskLevel::High);
            });
        }
    });
}
