// SPDX-License-Identifier: MIT OR Apache-2.0

//! Throttling and spam detection.

use logwise::InMemoryLogger;
use logwise::global_logger::{global_loggers, set_global_loggers};
use logwise_bus::{BusConfig, Duration, Level, LogBus, LogMessage, MemorySink};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// Draining an over-limit queue warns through the global loggers; every test takes the guard.
static TEST_LOGGER_GUARD: Mutex<()> = Mutex::new(());

fn message(content: String) -> LogMessage {
    LogMessage::new(Level::Info, content)
}

#[test]
fn sixth_put_over_limit_sleeps() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let throttle = Duration::from_millis(50);
    let sink = Arc::new(MemorySink::new());
    let bus = LogBus::start(
        sink.clone(),
        BusConfig::default()
            .with_flush_period(Duration::from_secs(60))
            .with_limit_by_thread(5)
            .with_throttling_time(throttle),
    )
    .unwrap();

    let start = Instant::now();
    for i in 0..5 {
        bus.put(message(format!("m{i}")));
    }
    let under_limit = start.elapsed();
    assert!(under_limit < throttle, "puts under the limit took {under_limit:?}");
    assert_eq!(bus.stats().throttled, 0);

    let start = Instant::now();
    bus.put(message("m5".to_string()));
    let sixth = start.elapsed();
    assert!(sixth >= throttle, "sixth put took only {sixth:?}");
    assert_eq!(bus.stats().throttled, 1);

    // Throttling never drops anything.
    bus.shutdown();
    assert_eq!(sink.len(), 6);
}

#[test]
fn throttling_is_per_thread() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let sink = Arc::new(MemorySink::new());
    let bus = Arc::new(
        LogBus::start(
            sink.clone(),
            BusConfig::default()
                .with_flush_period(Duration::from_secs(60))
                .with_limit_by_thread(3)
                .with_throttling_time(Duration::from_millis(1)),
        )
        .unwrap(),
    );
    for i in 0..4 {
        bus.put(message(format!("noisy {i}")));
    }
    assert_eq!(bus.stats().throttled, 1);

    let other = bus.clone();
    std::thread::spawn(move || other.put(message("quiet".to_string())))
        .join()
        .unwrap();
    assert_eq!(bus.stats().throttled, 1);
}

#[test]
fn spammer_is_reported_at_flush() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let logger = Arc::new(InMemoryLogger::new());
    let original = global_loggers();
    set_global_loggers(vec![logger.clone()]);

    let sink = Arc::new(MemorySink::new());
    let bus = Arc::new(
        LogBus::start(
            sink.clone(),
            BusConfig::default()
                .with_flush_period(Duration::from_secs(60))
                .with_limit_by_thread(3)
                .with_throttling_time(Duration::ZERO),
        )
        .unwrap(),
    );
    let spammer = bus.clone();
    std::thread::Builder::new()
        .name("chatty".to_string())
        .spawn(move || {
            for i in 0..5 {
                spammer.put(message(format!("spam {i}")));
            }
        })
        .unwrap()
        .join()
        .unwrap();
    bus.put(message("polite".to_string()));
    logger.drain_logs();

    assert!(bus.flush_now());
    let logs = logger.drain_logs();
    assert!(logs.contains("spam logs"), "missing spam warning, got: {logs}");
    assert!(logs.contains("chatty"), "warning should name the thread, got: {logs}");
    assert_eq!(logs.matches("spam logs").count(), 1);
    assert_eq!(sink.len(), 6);

    // The queue is empty after the flush, so the next flush is quiet.
    bus.put(message("again".to_string()));
    bus.flush_now();
    assert!(!logger.drain_logs().contains("spam logs"));

    bus.shutdown();
    set_global_loggers(original);
}
