use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mix_stream::benchmark_support::{
    run_egress_dispatch_once, run_loopback_exchange_once, MixingQueueFixture,
};
use tokio::runtime::Builder;

const QUEUE_SOURCES: usize = 4;
const QUEUE_BLOCKS_PER_SOURCE: usize = 256;
const QUEUE_ITEMS_PER_BLOCK: usize = 64;
const LOOPBACK_WORKERS: usize = 4;
const LOOPBACK_ITEMS_PER_DESTINATION: usize = 1024;
const EGRESS_FRAMES: usize = 64;

fn mix_stream_criterion(c: &mut Criterion) {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("benchmark runtime should build");

    let queue_fixture = MixingQueueFixture::new(
        QUEUE_SOURCES,
        QUEUE_BLOCKS_PER_SOURCE,
        QUEUE_ITEMS_PER_BLOCK,
    )
    .expect("mixing-queue fixture should build");

    let mut mixing_queue_group = c.benchmark_group("mixing_queue");
    mixing_queue_group.bench_function("concurrent_producers", |b| {
        b.iter(|| {
            let blocks = queue_fixture.run_concurrent_producers();
            assert_eq!(blocks, QUEUE_SOURCES * QUEUE_BLOCKS_PER_SOURCE);
            black_box(blocks);
        });
    });
    mixing_queue_group.finish();

    let mut loopback_group = c.benchmark_group("loopback");
    loopback_group.bench_function("single_host_exchange", |b| {
        b.iter(|| {
            let items =
                run_loopback_exchange_once(LOOPBACK_WORKERS, LOOPBACK_ITEMS_PER_DESTINATION)
                    .expect("loopback exchange should complete");
            black_box(items);
        });
    });
    loopback_group.finish();

    let mut egress_group = c.benchmark_group("egress_forwarding");
    egress_group.bench_function("single_host_dispatch", |b| {
        b.iter(|| {
            let send_count = runtime.block_on(run_egress_dispatch_once(EGRESS_FRAMES));
            black_box(send_count);
        });
    });
    egress_group.finish();
}

criterion_group!(benches, mix_stream_criterion);
criterion_main!(benches);
