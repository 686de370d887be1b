use integration_test_utils::TestCluster;
use mix_stream::MixBlock;
use serde::de::DeserializeOwned;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(20);

pub(crate) fn make_cluster(num_hosts: usize, workers_per_host: usize) -> TestCluster {
    integration_test_utils::init_logging();
    TestCluster::new(num_hosts, workers_per_host).expect("cluster creation should succeed")
}

/// Decodes received blocks and groups their items by source worker.
#[allow(dead_code)]
pub(crate) fn items_by_source<T: DeserializeOwned>(
    blocks: &[MixBlock],
    num_workers: usize,
) -> Vec<Vec<T>> {
    let mut items: Vec<Vec<T>> = (0..num_workers).map(|_| Vec::new()).collect();
    for mix_block in blocks {
        items[mix_block.source].extend(
            mix_block
                .block
                .decode_items::<T>()
                .expect("received block should decode"),
        );
    }
    items
}

/// Runs `body` on its own thread and fails the test if it does not finish in time.
#[allow(dead_code)]
pub(crate) fn within_deadline<T, F>(body: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(body());
    });
    rx.recv_timeout(DEADLINE)
        .expect("operation should finish before the deadline")
}
