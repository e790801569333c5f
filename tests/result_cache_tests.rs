use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_llm::event::{AnalyticsEvent, EventHandler};
use storefront_llm::janitor::CacheJanitor;
use storefront_llm::poll::{PollEndpoint, PollResponse};
use storefront_llm::result_cache::{EvictionReason, ResultCache};

const TTL: Duration = Duration::from_secs(300);
const GRACE: Duration = Duration::from_secs(10);

/// Lets spawned tasks woken by a clock advance run to completion.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingHandler {
    fn evictions(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, AnalyticsEvent::EntryEvicted { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_analytics_event(&self, event: &AnalyticsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn cache() -> Arc<ResultCache> {
    Arc::new(ResultCache::new(TTL, GRACE))
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_entry_is_swept_after_ttl() {
    let cache = cache();
    let janitor = CacheJanitor::new(&cache, Duration::from_secs(60));
    let poll = PollEndpoint::new(Arc::clone(&cache));

    cache.create("msg_1");
    assert_eq!(poll.poll("msg_1").await, PollResponse::not_ready());

    tokio::time::advance(Duration::from_secs(301)).await;
    let evicted = janitor.sweep_once().await.unwrap();
    assert_eq!(evicted, vec![("msg_1".to_string(), EvictionReason::Expired)]);

    assert!(!cache.peek("msg_1").exists);
    assert_eq!(poll.poll("msg_1").await, PollResponse::not_ready());
}

#[tokio::test(start_paused = true)]
async fn test_entry_within_ttl_survives_sweep() {
    let cache = cache();
    cache.create("fresh");

    tokio::time::advance(TTL).await;
    assert!(cache.sweep_expired().is_empty());
    assert!(cache.peek("fresh").exists);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.sweep_expired().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ready_but_never_polled_entry_expires() {
    let cache = cache();
    cache.create("msg_1");
    cache.update("msg_1", Some(json!({"intent": "other"})), None);

    tokio::time::advance(Duration::from_secs(301)).await;
    let evicted = cache.sweep_expired();
    assert_eq!(evicted, vec![("msg_1".to_string(), EvictionReason::Expired)]);
}

#[tokio::test(start_paused = true)]
async fn test_delivered_entry_served_during_grace_then_evicted() {
    let cache = cache();
    let poll = PollEndpoint::new(Arc::clone(&cache));
    let interaction = json!({"intent": "recommendation", "sentiment": "positive"});
    let funnel = json!({"event": "view_item", "items": [{"item_id": "7"}]});

    cache.create("msg_1");
    cache.update("msg_1", Some(interaction.clone()), Some(funnel.clone()));

    let first = poll.poll("msg_1").await;
    assert!(first.ready);
    assert_eq!(first.interaction, Some(interaction));
    assert_eq!(first.analytics, Some(funnel));

    tokio::time::advance(Duration::from_secs(5)).await;
    let retry = poll.poll("msg_1").await;
    assert_eq!(
        serde_json::to_vec(&retry).unwrap(),
        serde_json::to_vec(&first).unwrap()
    );

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(poll.poll("msg_1").await, PollResponse::not_ready());
    assert!(!cache.peek("msg_1").exists);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_grace_eviction_removes_entry_without_reads() {
    let cache = cache();
    cache.create("msg_1");
    cache.update("msg_1", None, None);
    assert!(cache.read("msg_1").newly_delivered);
    // let the eviction task arm its timer before moving the clock
    settle().await;

    tokio::time::advance(GRACE).await;
    settle().await;

    assert!(!cache.peek("msg_1").exists);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delivered_entry_ignores_ttl() {
    // A delivered entry leaves through the grace path only, even past the TTL horizon.
    let cache = Arc::new(ResultCache::new(Duration::from_secs(5), Duration::from_secs(10)));
    cache.create("msg_1");
    cache.update("msg_1", None, None);
    cache.read("msg_1");

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(cache.sweep_expired().is_empty());

    tokio::time::advance(Duration::from_secs(4)).await;
    let evicted = cache.sweep_expired();
    // the scheduled eviction may have removed it first; either way it is gone once
    assert!(evicted.len() <= 1);
    if let Some((_, reason)) = evicted.first() {
        assert_eq!(*reason, EvictionReason::Delivered);
    }
    assert!(!cache.peek("msg_1").exists);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_return_identical_payloads() {
    let cache = cache();
    let poll = Arc::new(PollEndpoint::new(Arc::clone(&cache)));
    cache.create("msg_1");
    cache.update(
        "msg_1",
        Some(json!({"intent": "product_question", "topics": ["gin", "tonic"]})),
        Some(json!({"event": "add_to_cart", "items": [{"item_id": "12", "quantity": 2}]})),
    );

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            let snapshot = cache.read("msg_1");
            let body = serde_json::to_vec(&PollResponse::from(snapshot.clone())).unwrap();
            (snapshot.newly_delivered, body)
        }));
    }

    let mut deliveries = 0;
    let mut bodies = Vec::new();
    for task in tasks {
        let (newly_delivered, body) = task.await.unwrap();
        if newly_delivered {
            deliveries += 1;
        }
        bodies.push(body);
    }

    assert_eq!(deliveries, 1, "exactly one read marks delivery");
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(poll.poll("msg_1").await.ready);
}

#[tokio::test]
async fn test_janitor_stops_when_cache_is_dropped() {
    let cache = Arc::new(ResultCache::default());
    let handle = CacheJanitor::new(&cache, Duration::from_millis(5)).start();
    drop(cache);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("janitor should exit once the cache is gone")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_janitor_loop_sweeps_on_schedule() {
    let cache = cache();
    CacheJanitor::new(&cache, Duration::from_secs(60)).start();
    settle().await;
    cache.create("abandoned");

    // 6 ticks later the entry is 360s old
    tokio::time::advance(Duration::from_secs(360)).await;
    settle().await;

    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_grace_eviction_is_reported_once() {
    let handler = Arc::new(RecordingHandler::default());
    let cache = Arc::new(ResultCache::new(TTL, GRACE).with_event_handler(handler.clone()));
    let poll = PollEndpoint::new(Arc::clone(&cache)).with_event_handler(handler.clone());
    let janitor = CacheJanitor::new(&cache, Duration::from_secs(60)).with_event_handler(handler.clone());

    cache.create("msg_1");
    cache.update("msg_1", Some(json!({"intent": "other"})), None);
    assert!(poll.poll("msg_1").await.ready);
    settle().await;

    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    janitor.sweep_once().await.unwrap();
    assert_eq!(poll.poll("msg_1").await, PollResponse::not_ready());

    assert!(!cache.peek("msg_1").exists);
    assert_eq!(
        *handler.events.lock().unwrap(),
        vec![
            AnalyticsEvent::EntryDelivered {
                request_id: "msg_1".to_string()
            },
            AnalyticsEvent::EntryEvicted {
                request_id: "msg_1".to_string(),
                reason: EvictionReason::Delivered,
            },
        ]
    );
}

#[tokio::test]
async fn test_poll_past_grace_reports_eviction() {
    let handler = Arc::new(RecordingHandler::default());
    let cache = Arc::new(ResultCache::new(TTL, Duration::ZERO));
    let poll = PollEndpoint::new(Arc::clone(&cache)).with_event_handler(handler.clone());

    cache.create("msg_1");
    cache.update("msg_1", None, None);
    assert!(poll.poll("msg_1").await.ready);
    // the scheduled eviction has not run yet on this runtime; the poll removes it
    assert_eq!(poll.poll("msg_1").await, PollResponse::not_ready());
    settle().await;

    assert_eq!(
        handler.evictions(),
        vec![AnalyticsEvent::EntryEvicted {
            request_id: "msg_1".to_string(),
            reason: EvictionReason::Delivered,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_janitor_reports_ttl_eviction() {
    let handler = Arc::new(RecordingHandler::default());
    let cache = cache();
    let janitor = CacheJanitor::new(&cache, Duration::from_secs(60)).with_event_handler(handler.clone());

    cache.create("abandoned");
    tokio::time::advance(Duration::from_secs(301)).await;
    janitor.sweep_once().await.unwrap();

    assert_eq!(
        handler.evictions(),
        vec![AnalyticsEvent::EntryEvicted {
            request_id: "abandoned".to_string(),
            reason: EvictionReason::Expired,
        }]
    );
}
