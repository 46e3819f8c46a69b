// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bus as a `logwise::Logger`.

use logwise::global_logger::{global_loggers, set_global_loggers};
use logwise::{InMemoryLogger, LogRecord, Logger};
use logwise_bus::{BusConfig, Duration, LogBus, LoggerSink};
use std::sync::{Arc, Mutex};
use test_executors::async_test;

// One test installs a bus as the global logger; keep the others from logging into it.
static TEST_LOGGER_GUARD: Mutex<()> = Mutex::new(());

fn bus_over(downstream: Arc<InMemoryLogger>) -> Arc<LogBus> {
    let bus = LogBus::start(
        Arc::new(LoggerSink::new(downstream)),
        BusConfig::default().with_flush_period(Duration::from_secs(60)),
    )
    .unwrap();
    Arc::new(bus)
}

fn record(text: &str) -> LogRecord {
    let mut record = LogRecord::new(logwise::Level::Warning);
    record.log(text);
    record
}

#[test]
fn records_are_buffered_then_forwarded() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let downstream = Arc::new(InMemoryLogger::new());
    let bus = bus_over(downstream.clone());
    bus.finish_log_record(record("first"));
    bus.finish_log_record(record("second"));
    assert_eq!(downstream.drain_logs(), "");
    bus.flush_now();
    assert_eq!(downstream.drain_logs(), "first\nsecond");
}

#[async_test]
async fn async_records_are_buffered_too() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let downstream = Arc::new(InMemoryLogger::new());
    let bus = bus_over(downstream.clone());
    bus.finish_log_record_async(record("from a future")).await;
    assert_eq!(bus.buffered(), 1);
    bus.flush_now();
    assert_eq!(downstream.drain_logs(), "from a future");
}

#[test]
fn prepare_to_die_flushes_synchronously() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let downstream = Arc::new(InMemoryLogger::new());
    let bus = bus_over(downstream.clone());
    bus.finish_log_record(record("last"));
    bus.prepare_to_die();
    assert_eq!(downstream.drain_logs(), "last");
    assert_eq!(bus.buffered(), 0);
}

#[test]
fn installed_globally_with_its_own_diagnostics() {
    let _guard = TEST_LOGGER_GUARD.lock().unwrap();
    let original = global_loggers();

    let downstream = Arc::new(InMemoryLogger::new());
    let sink = Arc::new(LoggerSink::new(downstream.clone()));
    let bus = Arc::new(
        LogBus::start(
            sink.clone(),
            BusConfig::default()
                .with_flush_period(Duration::from_secs(60))
                .with_limit_by_thread(2)
                .with_throttling_time(Duration::ZERO),
        )
        .unwrap(),
    );
    set_global_loggers(vec![bus.clone()]);

    logwise::warn_sync!("through the bus {n}", n = 1u64);
    logwise::warn_sync!("through the bus {n}", n = 2u64);
    assert_eq!(downstream.drain_logs(), "");

    // The spam warning raised while flushing goes straight to the sink.
    bus.flush_now();
    let logs = downstream.drain_logs();
    set_global_loggers(original);

    assert!(logs.contains("through the bus 1"), "got: {logs}");
    assert!(logs.contains("through the bus 2"), "got: {logs}");
    assert!(logs.contains("spam logs"), "got: {logs}");
    assert_eq!(bus.buffered(), 0);
}
