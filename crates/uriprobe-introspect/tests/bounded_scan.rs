mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use uriprobe_core::Outcome;
use uriprobe_introspect::{Adapter, Memoized, RedisBackend};

use support::{Journal, KvScript, ScanPlan, endpoint, kv_connector, refused, settings};

fn slow_keyspace() -> KvScript {
    KvScript::default().scan(ScanPlan {
        pages: 30,
        keys_per_page: 10,
        delay: Duration::from_secs(1),
    })
}

#[tokio::test(start_paused = true)]
async fn scan_returns_partial_count_at_the_cap() {
    let journal = Journal::default();
    let connector = kv_connector(slow_keyspace(), journal.clone());
    let connects = connector.connect_counter();
    let mut probe_settings = settings();
    probe_settings.scan.time_cap_ms = 5_000;
    probe_settings.scan.batch = 10;
    let mut adapter = Memoized::new(RedisBackend::with_connector(
        connector,
        endpoint("redis://localhost:6379/0"),
        &probe_settings,
    ));

    let started = Instant::now();
    let outcome = adapter.row_count_estimate("*", None).await;
    let elapsed = started.elapsed();

    let Outcome::Degraded(estimate) = outcome else {
        panic!("expected a partial estimate, got {outcome:?}");
    };
    assert!(estimate.timed_out);
    assert!((40..=50).contains(&estimate.rows), "rows = {}", estimate.rows);
    assert!(elapsed <= Duration::from_secs(5), "elapsed = {elapsed:?}");

    // The abandoned page poisoned the session; the next call reconnects.
    adapter.identity().await;
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn fast_scan_completes() {
    let journal = Journal::default();
    let script = KvScript::default().scan(ScanPlan {
        pages: 3,
        keys_per_page: 7,
        delay: Duration::from_millis(10),
    });
    let mut adapter = Memoized::new(RedisBackend::with_connector(
        kv_connector(script, journal.clone()),
        endpoint("redis://localhost:6379/0"),
        &settings(),
    ));

    let outcome = adapter.row_count_estimate("session:*", None).await;

    let Outcome::Live(estimate) = outcome else {
        panic!("expected a complete estimate, got {outcome:?}");
    };
    assert_eq!(estimate.rows, 21);
    assert!(!estimate.timed_out);
    assert_eq!(journal.count("MATCH session:*"), 3);
}

#[tokio::test(start_paused = true)]
async fn scan_of_another_database_uses_a_scoped_session() {
    let journal = Journal::default();
    let script = KvScript::default().scan(ScanPlan {
        pages: 1,
        keys_per_page: 4,
        delay: Duration::ZERO,
    });
    let mut adapter = Memoized::new(RedisBackend::with_connector(
        kv_connector(script, journal.clone()),
        endpoint("redis://localhost:6379/0"),
        &settings(),
    ));

    let outcome = adapter.row_count_estimate("", Some("3")).await;

    assert_eq!(outcome.into_value().map(|estimate| estimate.rows), Some(4));
    assert_eq!(journal.count("connect 3"), 1);
    assert_eq!(journal.count("close"), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_backoff_does_not_eat_into_the_scan_cap() {
    let journal = Journal::default();
    let script = KvScript::default().scan(ScanPlan {
        pages: 4,
        keys_per_page: 10,
        delay: Duration::from_secs(1),
    });
    let connector = kv_connector(script, journal.clone()).failing_first(vec![refused(), refused()]);
    let mut probe_settings = settings();
    probe_settings.scan.time_cap_ms = 5_000;
    let mut adapter = Memoized::new(RedisBackend::with_connector(
        connector,
        endpoint("redis://localhost:6379/0"),
        &probe_settings,
    ));

    let started = Instant::now();
    let outcome = adapter.row_count_estimate("*", None).await;

    // 1.5 s of backoff plus 4 s of pages stays inside a cap that starts at the first page.
    assert_eq!(started.elapsed(), Duration::from_millis(5_500));
    let Outcome::Live(estimate) = outcome else {
        panic!("expected a complete estimate, got {outcome:?}");
    };
    assert_eq!(estimate.rows, 40);
    assert!(!estimate.timed_out);
}
