use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::client::MockFingerprintFetcher;
use crate::Error;
use crate::FetchError;
use crate::WatchConfig;
use crate::WatchError;

fn coords(tag: &str) -> TagCoordinates {
    TagCoordinates::new("helix-saga", "go-all", tag)
}

fn test_config() -> WatchConfig {
    WatchConfig {
        poll_interval_ms: 100,
        ..Default::default()
    }
}

fn stable_fetcher() -> MockFingerprintFetcher {
    let mut fetcher = MockFingerprintFetcher::new();
    fetcher
        .expect_fetch_fingerprint()
        .returning(|c| Ok(format!("sha:{}", c.tag)));
    fetcher
}

/// Fails the first `failures` calls, then keeps answering `sha:AAA`
fn flaky_fetcher(failures: usize) -> (MockFingerprintFetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut fetcher = MockFingerprintFetcher::new();
    fetcher.expect_fetch_fingerprint().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < failures {
            Err(FetchError::Status {
                url: "http://harbor.test".into(),
                status: 404,
            }
            .into())
        } else {
            Ok("sha:AAA".to_string())
        }
    });
    (fetcher, calls)
}

fn setup(fetcher: MockFingerprintFetcher) -> (WatcherRegistry, CancellationToken) {
    let token = CancellationToken::new();
    let registry = WatcherRegistry::new(&token, Arc::new(fetcher), test_config());
    (registry, token)
}

#[tokio::test]
async fn test_get_or_create_reuses_live_watcher() {
    let (registry, _token) = setup(stable_fetcher());

    let w1 = registry.get_or_create(&coords("latest")).unwrap();
    let w2 = registry.get_or_create(&coords("latest")).unwrap();

    assert!(Arc::ptr_eq(&w1, &w2));
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&coords("latest").key()));

    registry.shutdown().await;
}

#[tokio::test]
async fn test_distinct_keys_get_distinct_watchers() {
    let (registry, _token) = setup(stable_fetcher());

    let latest = registry.get_or_create(&coords("latest")).unwrap();
    let stable = registry.get_or_create(&coords("stable")).unwrap();

    assert!(!Arc::ptr_eq(&latest, &stable));
    assert_ne!(latest.id(), stable.id());
    assert_eq!(registry.len(), 2);
    assert!(registry.get(&coords("stable").key()).is_some());
    assert!(registry.get(&coords("missing").key()).is_none());

    registry.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_yields_one_watcher() {
    let (registry, _token) = setup(stable_fetcher());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_or_create(&coords("latest")).unwrap() })
        })
        .collect();

    let mut watchers = Vec::new();
    for h in handles {
        watchers.push(h.await.unwrap());
    }

    assert!(watchers.iter().all(|w| Arc::ptr_eq(w, &watchers[0])));
    assert_eq!(registry.len(), 1);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_watch_streams_share_one_poll_loop() {
    let (registry, _token) = setup(stable_fetcher());

    let mut s1 = registry.watch(&coords("latest")).unwrap();
    let mut s2 = registry.watch(&coords("latest")).unwrap();
    assert_eq!(registry.len(), 1);

    assert_eq!(s1.next().await.unwrap().target.fingerprint.as_deref(), Some("sha:latest"));
    assert_eq!(s2.next().await.unwrap().target.fingerprint.as_deref(), Some("sha:latest"));

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_watcher_is_reaped() {
    let (fetcher, _calls) = flaky_fetcher(usize::MAX);
    let (registry, _token) = setup(fetcher);
    let key = coords("latest").key();

    let mut stream = registry.watch(&coords("latest")).unwrap();
    let watcher = registry.get(&key).unwrap();

    let last = stream.next().await.unwrap();
    assert_eq!(last.kind, EventKind::Deleted);
    assert_eq!(stream.next().await, None);

    assert!(!registry.contains(&key));
    assert!(registry.is_empty());
    assert_eq!(watcher.state(), WatcherState::Shutdown);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reaped_key_gets_a_fresh_watcher() {
    let (fetcher, _calls) = flaky_fetcher(1);
    let (registry, _token) = setup(fetcher);
    let key = coords("latest").key();

    let mut stream = registry.watch(&coords("latest")).unwrap();
    let first_id = registry.get(&key).unwrap().id();
    assert_eq!(stream.next().await.unwrap().kind, EventKind::Deleted);
    assert_eq!(stream.next().await, None);

    let replacement = registry.get_or_create(&coords("latest")).unwrap();
    assert_ne!(replacement.id(), first_id);

    // The replacement is not hit by the notice of its predecessor
    let mut fresh = replacement.watch();
    let event = fresh.next().await.unwrap();
    assert_eq!(event.kind, EventKind::Modified);
    assert_eq!(event.target.fingerprint.as_deref(), Some("sha:AAA"));

    sleep(Duration::from_secs(2)).await;
    assert!(!replacement.is_shutdown());
    assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &replacement));

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_of_one_key_leaves_others_alone() {
    let mut fetcher = MockFingerprintFetcher::new();
    fetcher.expect_fetch_fingerprint().returning(|c| {
        if c.tag == "broken" {
            Err(FetchError::Status {
                url: "http://harbor.test".into(),
                status: 500,
            }
            .into())
        } else {
            Ok("sha:AAA".to_string())
        }
    });
    let (registry, _token) = setup(fetcher);

    let mut broken = registry.watch(&coords("broken")).unwrap();
    let healthy = registry.get_or_create(&coords("latest")).unwrap();

    assert_eq!(broken.next().await.unwrap().kind, EventKind::Deleted);
    assert_eq!(broken.next().await, None);

    assert_eq!(registry.len(), 1);
    assert!(!healthy.is_shutdown());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_every_watcher() {
    let (registry, _token) = setup(stable_fetcher());

    let watchers: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|tag| registry.get_or_create(&coords(tag)).unwrap())
        .collect();
    let mut streams: Vec<_> = watchers.iter().map(|w| w.watch()).collect();

    registry.shutdown().await;

    assert!(registry.is_shutdown());
    assert!(registry.is_empty());
    for w in &watchers {
        assert_eq!(w.state(), WatcherState::Shutdown);
    }
    for s in &mut streams {
        // Drain anything published before shutdown, then expect closure
        while s.next().await.is_some() {}
    }
}

#[tokio::test]
async fn test_get_or_create_after_shutdown_fails() {
    let (registry, _token) = setup(stable_fetcher());
    registry.shutdown().await;

    let result = registry.get_or_create(&coords("latest"));
    assert!(matches!(result, Err(Error::Watch(WatchError::ShutdownInProgress))));
    assert!(registry.watch(&coords("latest")).is_err());
}

#[tokio::test]
async fn test_parent_cancellation_shuts_registry_down() {
    let (registry, token) = setup(stable_fetcher());
    let watcher = registry.get_or_create(&coords("latest")).unwrap();

    token.cancel();
    assert!(registry.is_shutdown());
    assert!(matches!(
        registry.get_or_create(&coords("latest")),
        Err(Error::Watch(WatchError::ShutdownInProgress))
    ));

    registry.shutdown().await;
    assert_eq!(watcher.state(), WatcherState::Shutdown);
}

#[tokio::test]
async fn test_shutdown_twice_is_harmless() {
    let (registry, _token) = setup(stable_fetcher());
    registry.get_or_create(&coords("latest")).unwrap();

    registry.shutdown().await;
    registry.shutdown().await;

    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_watcher_shut_down_directly_is_pruned() {
    let (registry, _token) = setup(stable_fetcher());
    let key = coords("latest").key();

    let watcher = registry.get_or_create(&coords("latest")).unwrap();
    watcher.shutdown();

    // Let the loop exit and the reaper handle the release notice
    sleep(Duration::from_millis(10)).await;

    assert!(!registry.contains(&key));
    assert!(registry.is_empty());

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_release_of_replaced_watcher_keeps_successor() {
    let (registry, _token) = setup(stable_fetcher());
    let key = coords("latest").key();

    let first = registry.get_or_create(&coords("latest")).unwrap();
    first.shutdown();
    // Replaced before the reaper saw the release notice of `first`
    let second = registry.get_or_create(&coords("latest")).unwrap();
    assert_ne!(first.id(), second.id());

    sleep(Duration::from_millis(10)).await;

    assert!(Arc::ptr_eq(&registry.get(&key).unwrap(), &second));
    assert!(!second.is_shutdown());

    registry.shutdown().await;
}
