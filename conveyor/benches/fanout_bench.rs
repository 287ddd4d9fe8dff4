//! Benchmarks for delta publication.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use conveyor::broadcast::ProgressBroadcaster;
use conveyor::core::{Job, MessageKind};
use conveyor::store::JobStateStore;
use conveyor::utils;
use std::sync::Arc;

fn fanout_benchmark(c: &mut Criterion) {
    let store = Arc::new(JobStateStore::new());
    let job = Job::new(
        utils::generate_uuid(),
        "bench",
        vec!["plan".into()],
        utils::now(),
    );
    let job_id = job.id;
    store.insert(job);
    let broadcaster = ProgressBroadcaster::new(store, 64);

    c.bench_function("publish_no_subscribers", |b| {
        b.iter(|| {
            black_box(broadcaster.publish(
                job_id,
                MessageKind::StageProgress,
                Some("plan"),
                serde_json::json!({"job_progress": 50}),
            ))
        })
    });
}

criterion_group!(benches, fanout_benchmark);
criterion_main!(benches);
