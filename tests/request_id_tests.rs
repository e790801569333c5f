use futures_util::future::join_all;
use std::collections::HashSet;
use storefront_llm::request_id::{generate_request_id, is_request_id};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ten_thousand_concurrent_ids_are_distinct() {
    let tasks = (0..100).map(|_| {
        tokio::spawn(async {
            (0..100).map(|_| generate_request_id()).collect::<Vec<_>>()
        })
    });

    let mut ids = HashSet::new();
    for batch in join_all(tasks).await {
        for id in batch.unwrap() {
            assert!(is_request_id(&id), "malformed id {}", id);
            ids.insert(id);
        }
    }
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn test_ids_from_os_threads_are_distinct() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| (0..500).map(|_| generate_request_id()).collect::<Vec<_>>()))
        .collect();

    let ids: HashSet<String> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(ids.len(), 2_000);
}
