//! Loader behavior: single-flight transfers, cache sharing, partial-failure
//! tolerant batches.

mod support;

use bridge_desktop::NullOutputDevice;
use core_playback::{Engine, EngineConfig, Loader, ResourceId};
use core_runtime::events::{Emitter, EngineEvent, LoadEvent};
use std::sync::Arc;
use std::time::Duration;
use support::{engine_with, payload, FakeDecoder, FakeFetcher};

fn loader(fetcher: Arc<FakeFetcher>) -> Loader {
    Loader::new(fetcher, Arc::new(FakeDecoder), Emitter::new(16))
}

#[tokio::test(start_paused = true)]
async fn concurrent_loads_share_one_transfer() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_delay(Duration::from_millis(50))
            .serve("a.wav", payload(1_000)),
    );
    let loader = Arc::new(loader(Arc::clone(&fetcher)));
    let resource = ResourceId::from("a.wav");

    let first = tokio::spawn({
        let loader = Arc::clone(&loader);
        let resource = resource.clone();
        async move { loader.load(&resource).await }
    });
    let second = tokio::spawn({
        let loader = Arc::clone(&loader);
        let resource = resource.clone();
        async move { loader.load(&resource).await }
    });

    let (a, b) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(fetcher.fetch_count(), 1);
    assert!(a.is_ok() && b.is_ok());
    // Both callers share the same decode, not copies of it.
    assert!(Arc::ptr_eq(a.audio.as_ref().unwrap(), b.audio.as_ref().unwrap()));
}

#[tokio::test]
async fn cached_resource_resolves_without_refetch() {
    let fetcher = Arc::new(FakeFetcher::new().serve("a.wav", payload(500)));
    let loader = loader(Arc::clone(&fetcher));
    let resource = ResourceId::from("a.wav");

    let first = loader.load(&resource).await;
    let second = loader.load(&resource).await;

    assert_eq!(fetcher.fetch_count(), 1);
    assert!(Arc::ptr_eq(
        first.audio.as_ref().unwrap(),
        second.audio.as_ref().unwrap()
    ));
    assert_eq!(
        first.audio.unwrap().duration(),
        Duration::from_millis(500)
    );
}

#[tokio::test]
async fn batch_load_tolerates_partial_failure() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve("good.wav", payload(100))
            .serve("other.wav", payload(100))
            .fail("bad.wav"),
    );
    let loader = loader(fetcher);

    let resources = [
        ResourceId::from("good.wav"),
        ResourceId::from("bad.wav"),
        ResourceId::from("other.wav"),
    ];
    let outcomes = loader.load_many(&resources).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
    assert!(outcomes[1].error.as_ref().unwrap().contains("404"));
    assert!(outcomes[2].is_ok());
}

#[tokio::test]
async fn failed_load_is_not_cached_and_can_be_retried() {
    let fetcher = Arc::new(FakeFetcher::new().fail("flaky.wav"));
    let loader = loader(Arc::clone(&fetcher));
    let resource = ResourceId::from("flaky.wav");

    let outcome = loader.load(&resource).await;
    assert!(!outcome.is_ok());
    assert!(!loader.is_cached(&resource));

    // The in-flight entry was evicted, so a retry issues a new transfer.
    let retry = loader.load(&resource).await;
    assert!(!retry.is_ok());
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn load_events_are_emitted() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve("a.wav", payload(100))
            .fail("bad.wav"),
    );
    let emitter = Emitter::new(16);
    let mut events = emitter.subscribe();
    let loader = Loader::new(fetcher, Arc::new(FakeDecoder), emitter);

    loader.load(&ResourceId::from("a.wav")).await;
    loader.load(&ResourceId::from("bad.wav")).await;

    assert_eq!(
        events.recv().await.unwrap(),
        EngineEvent::Load(LoadEvent::Loaded {
            resource: "a.wav".to_string()
        })
    );
    match events.recv().await.unwrap() {
        EngineEvent::Load(LoadEvent::Failed { resource, .. }) => {
            assert_eq!(resource, "bad.wav");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn unload_and_dispose() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .serve("a.wav", payload(100))
            .serve("b.wav", payload(100)),
    );
    let loader = loader(fetcher);
    let (a, b) = (ResourceId::from("a.wav"), ResourceId::from("b.wav"));

    loader.load(&a).await;
    loader.load(&b).await;

    loader.unload(Some(std::slice::from_ref(&a)));
    assert!(!loader.is_cached(&a));
    assert!(loader.is_cached(&b));

    loader.unload(None);
    assert!(!loader.is_cached(&b));

    loader.dispose();
    loader.dispose();
    assert!(loader.is_disposed());
    let after = loader.load(&a).await;
    assert!(!after.is_ok());
}

#[tokio::test]
async fn engine_load_replays_deferred_actions_last_write_wins() {
    let url = "clip.wav";
    let fetcher = Arc::new(FakeFetcher::new().serve(url, payload(10_000)));
    let engine: Arc<Engine> = engine_with(
        Arc::new(NullOutputDevice::new()),
        fetcher,
        EngineConfig::default(),
    );
    engine.setup().await.unwrap();

    let resource = ResourceId::from(url);
    let key = core_playback::after_load_event(&resource);
    let target = Arc::new(parking_lot::Mutex::new(Duration::ZERO));

    // Two seeks queued under the same action id before the load completes:
    // only the second survives.
    for pos in [Duration::from_secs(5), Duration::from_secs(9)] {
        let target = Arc::clone(&target);
        engine.actions().add(&key, "seek:1", false, move || {
            let target = Arc::clone(&target);
            async move {
                *target.lock() = pos;
            }
        });
    }
    assert_eq!(engine.actions().len(&key), 1);

    let outcomes = engine.load(std::slice::from_ref(&resource)).await;
    assert!(outcomes[0].is_ok());
    assert_eq!(*target.lock(), Duration::from_secs(9));
    assert_eq!(engine.actions().len(&key), 0);
}
