use snowconf_core::id::{EPOCH_MILLIS, MAX_MACHINE_ID, MAX_SEQUENCE};
use snowconf_core::{parse_id, Clock, IdError, IdGenerator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock whose reading is set by the test.
#[derive(Clone)]
struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    fn at(millis: u64) -> Self {
        Self(Arc::new(AtomicU64::new(millis)))
    }

    fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[test]
fn concurrent_callers_never_receive_duplicates() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 5_000;

    let generator = Arc::new(IdGenerator::new(42).unwrap());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                let mut ids = Vec::with_capacity(PER_THREAD);
                let mut previous = 0;
                for _ in 0..PER_THREAD {
                    let id = generator.next_id().unwrap();
                    // Each caller observes its own ids in increasing order.
                    assert!(id > previous);
                    previous = id;
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::with_capacity(THREADS * PER_THREAD);
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}

#[test]
fn decoded_timestamp_falls_inside_call_window() {
    let generator = IdGenerator::new(MAX_MACHINE_ID).unwrap();

    let before = wall_clock_ms();
    let id = generator.next_id().unwrap();
    let after = wall_clock_ms();

    let info = parse_id(id);
    assert!((before..=after).contains(&info.timestamp_millis));
    assert_eq!(info.machine_id, MAX_MACHINE_ID);
    assert!(info.sequence <= MAX_SEQUENCE);
    assert_eq!(id >> 63, 0, "reserved bit must stay clear");
}

#[test]
fn rollback_then_recovery_resumes_from_last_valid_state() {
    let start = EPOCH_MILLIS + 86_400_000;
    let clock = ManualClock::at(start);
    let generator = IdGenerator::with_clock(12, clock.clone()).unwrap();

    let first = generator.next_id().unwrap();
    let second = generator.next_id().unwrap();
    assert_eq!(parse_id(second).sequence, 1);

    clock.set(start - 1_000);
    for _ in 0..3 {
        assert_eq!(
            generator.next_id(),
            Err(IdError::ClockRollback {
                current_ms: start - 1_000,
                last_ms: start
            })
        );
    }

    clock.set(start);
    let third = generator.next_id().unwrap();
    assert_eq!(parse_id(third).sequence, 2);

    clock.set(start + 1);
    let fourth = generator.next_id().unwrap();
    assert_eq!(parse_id(fourth).sequence, 0);
    assert_eq!(parse_id(fourth).timestamp_millis, start + 1);

    assert!(first < second && second < third && third < fourth);
}

#[test]
fn generators_with_different_machine_ids_do_not_collide_in_same_millisecond() {
    let clock = ManualClock::at(EPOCH_MILLIS + 5_000);
    let a = IdGenerator::with_clock(1, clock.clone()).unwrap();
    let b = IdGenerator::with_clock(2, clock).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..1_000 {
        assert!(seen.insert(a.next_id().unwrap()));
        assert!(seen.insert(b.next_id().unwrap()));
    }
}

#[test]
fn invalid_machine_id_is_rejected_with_custom_clock() {
    let result = IdGenerator::with_clock(MAX_MACHINE_ID + 1, ManualClock::at(EPOCH_MILLIS));
    assert!(matches!(
        result.err(),
        Some(IdError::InvalidConfiguration {
            machine_id: 1024,
            max: 1023
        })
    ));
}
