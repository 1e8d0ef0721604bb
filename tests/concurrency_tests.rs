#![allow(clippy::unwrap_used, clippy::expect_used)]

use pathdispatch::config::{build_dispatcher, DispatchConfig, Strategy};
use pathdispatch::dispatcher::{DispatchManager, OptimisticDispatcher};
use pathdispatch::error::ErrorKind;
use pathdispatch::ids::InstanceId;
use pathdispatch::pool::Registration;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

const STRATEGIES: [Strategy; 3] = [Strategy::Plain, Strategy::Locked, Strategy::Optimistic];

/// Tracks which instances are held right now and the peak count
#[derive(Default)]
struct InFlight {
    held: Mutex<HashSet<InstanceId>>,
    peak: AtomicUsize,
}

impl InFlight {
    fn take(&self, id: InstanceId) {
        let mut held = self.held.lock().unwrap();
        assert!(held.insert(id), "instance {id} handed to two callers at once");
        self.peak.fetch_max(held.len(), Ordering::SeqCst);
    }

    fn give_back(&self, id: InstanceId) {
        assert!(self.held.lock().unwrap().remove(&id));
    }
}

#[test]
fn test_fifo_mutual_exclusion_with_factory() {
    const CAPACITY: usize = 3;
    const THREADS: usize = 8;

    for strategy in STRATEGIES {
        let manager = build_dispatcher::<usize>(&DispatchConfig::new(strategy));
        let counter = Arc::new(AtomicUsize::new(0));
        let factory_counter = Arc::clone(&counter);
        manager
            .register(
                Registration::factory("/fifo", move |_path: &str| -> anyhow::Result<usize> {
                    Ok(factory_counter.fetch_add(1, Ordering::SeqCst))
                })
                .pooled(CAPACITY),
            )
            .unwrap();

        let in_flight = InFlight::default();
        let resolutions = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..50 {
                        let resolution = manager.resolve("/fifo");
                        let id = resolution.instance().expect("factory never fails").id();
                        in_flight.take(id);
                        resolutions.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                        in_flight.give_back(id);
                        manager.release(resolution).unwrap();
                    }
                });
            }
        });

        assert_eq!(resolutions.load(Ordering::Relaxed), THREADS * 50);
        assert!(in_flight.held.lock().unwrap().is_empty());
        assert!(in_flight.peak.load(Ordering::SeqCst) <= THREADS);

        // surplus instances were retired; the pool is back to its capacity
        let stats = manager.pool_stats("/fifo").unwrap();
        assert_eq!(stats.available, CAPACITY, "{strategy}");
        assert_eq!(stats.live, CAPACITY);
        assert_eq!(stats.overflows, 0);
        assert_eq!(
            stats.created as usize,
            counter.load(Ordering::SeqCst),
            "every factory call became a pool instance"
        );
    }
}

#[test]
fn test_fifo_without_factory_never_exceeds_capacity() {
    const CAPACITY: usize = 2;
    const THREADS: usize = 6;

    for strategy in STRATEGIES {
        let manager = build_dispatcher::<u32>(&DispatchConfig::new(strategy));
        manager
            .register(Registration::instances("/fixed", vec![1, 2]))
            .unwrap();

        let in_flight = InFlight::default();
        let exhausted = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..100 {
                        let resolution = manager.resolve("/fixed");
                        match resolution.instance() {
                            Some(instance) => {
                                let id = instance.id();
                                in_flight.take(id);
                                thread::sleep(Duration::from_micros(50));
                                in_flight.give_back(id);
                            }
                            None => {
                                assert_eq!(
                                    resolution.error().unwrap().kind(),
                                    ErrorKind::PoolExhausted
                                );
                                exhausted.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        manager.release(resolution).unwrap();
                    }
                });
            }
        });

        assert!(in_flight.peak.load(Ordering::SeqCst) <= CAPACITY, "{strategy}");
        let stats = manager.pool_stats("/fixed").unwrap();
        assert_eq!(stats.available, CAPACITY);
        assert_eq!(stats.created, 2);
    }
}

#[test]
fn test_concurrent_override_never_loses_base_route() {
    const READERS: usize = 4;

    for strategy in STRATEGIES {
        let manager = build_dispatcher::<&'static str>(&DispatchConfig::new(strategy));
        manager.register(Registration::singleton("/r*", "base")).unwrap();

        let stop = AtomicBool::new(false);
        let barrier = Barrier::new(READERS + 1);

        thread::scope(|scope| {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..500 {
                    manager
                        .register(Registration::singleton("/r/x*", "deep"))
                        .unwrap();
                    manager
                        .register(Registration::singleton("/r*", "override").force(true))
                        .unwrap();
                    assert!(manager.unregister("/r*"));
                    assert!(manager.unregister("/r/x*"));
                }
                stop.store(true, Ordering::SeqCst);
            });

            for _ in 0..READERS {
                scope.spawn(|| {
                    barrier.wait();
                    while !stop.load(Ordering::SeqCst) {
                        for path in ["/r/x/1", "/r/y"] {
                            let resolution = manager.resolve(path);
                            let name = *resolution
                                .handler()
                                .unwrap_or_else(|| panic!("{path} lost its route ({strategy})"));
                            assert!(matches!(name, "base" | "deep" | "override"));
                            if path == "/r/y" {
                                assert_ne!(name, "deep");
                            }
                        }
                    }
                });
            }
        });

        // every mutation was undone; nothing stale may survive in the cache
        assert_eq!(manager.registered_paths(), vec!["/r*"]);
        assert_eq!(manager.parked_depth("/r*"), 0);
        for path in ["/r/x/1", "/r/y"] {
            let resolution = manager.resolve(path);
            assert_eq!(*resolution.handler().unwrap(), "base", "{strategy} {path}");
        }
    }
}

#[test]
fn test_concurrent_registration_of_distinct_paths() {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 50;

    for strategy in STRATEGIES {
        let manager = build_dispatcher::<usize>(&DispatchConfig::new(strategy));
        let barrier = Barrier::new(WRITERS);

        thread::scope(|scope| {
            for writer in 0..WRITERS {
                let manager = &manager;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for i in 0..PER_WRITER {
                        let value = writer * PER_WRITER + i;
                        manager
                            .register(Registration::singleton(format!("/w{value}"), value))
                            .unwrap();
                        assert_eq!(*manager.resolve(&format!("/w{value}")).handler().unwrap(), value);
                    }
                });
            }
        });

        assert_eq!(manager.registered_paths().len(), WRITERS * PER_WRITER);
        assert_eq!(
            manager.metrics().snapshot().registrations as usize,
            WRITERS * PER_WRITER
        );
    }
}

#[test]
fn test_concurrent_duplicate_registration_has_one_winner() {
    const THREADS: usize = 8;

    for strategy in STRATEGIES {
        let manager = build_dispatcher::<usize>(&DispatchConfig::new(strategy));
        let winners = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for n in 0..THREADS {
                let (manager, winners, barrier) = (&manager, &winners, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    if manager.register(Registration::singleton("/contested", n)).is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1, "{strategy}");
        assert_eq!(manager.parked_depth("/contested"), 0);
    }
}

#[test]
fn test_optimistic_escalation_accounting() {
    // with zero retries every failed validation escalates immediately
    let manager: OptimisticDispatcher<u32> =
        OptimisticDispatcher::new(DispatchConfig::new(Strategy::Optimistic).with_max_retries(0));
    manager.register(Registration::singleton("/base*", 1)).unwrap();

    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..2000 {
                manager
                    .register(Registration::singleton("/base*", 2).force(true))
                    .unwrap();
                manager.unregister("/base*");
            }
            stop.store(true, Ordering::SeqCst);
        });
        for _ in 0..3 {
            scope.spawn(|| {
                while !stop.load(Ordering::SeqCst) {
                    let resolution = manager.resolve("/base/deep/path");
                    assert!(matches!(resolution.handler().copied(), Some(1) | Some(2)));
                }
            });
        }
    });

    let snapshot = manager.metrics().snapshot();
    assert_eq!(snapshot.stale_reads, snapshot.escalations);
    assert_eq!(manager.generation() % 2, 0);
    assert_eq!(manager.generation(), 2 * (1 + 2 * 2000));
}
