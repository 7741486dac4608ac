use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use strand_engine::{
    from_here, DelayedTaskQueue, RunLoop, SequenceManager, TaskRunnerExt, TaskTraits, ThreadPool,
    ThreadPoolConfig,
};

fn bench_sequenced_posts(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequenced_runner");

    for tasks in [100u64, 1_000] {
        group.throughput(Throughput::Elements(tasks));
        group.bench_with_input(BenchmarkId::new("post_and_flush", tasks), &tasks, |b, &tasks| {
            let pool = ThreadPool::new(ThreadPoolConfig::with_max_threads(4)).unwrap();
            pool.start().unwrap();
            let runner = pool.create_sequenced_task_runner(TaskTraits::new());
            let counter = Arc::new(AtomicUsize::new(0));

            b.iter(|| {
                for _ in 0..tasks {
                    let c = counter.clone();
                    runner.post(from_here!(), move || {
                        c.fetch_add(1, Ordering::Relaxed);
                    });
                }
                pool.flush_for_testing();
            });
        });
    }

    group.finish();
}

fn bench_parallel_posts(c: &mut Criterion) {
    let pool = ThreadPool::new(ThreadPoolConfig::with_max_threads(4)).unwrap();
    pool.start().unwrap();
    let runner = pool.create_task_runner(TaskTraits::new());

    c.bench_function("parallel_runner_1000", |b| {
        b.iter(|| {
            for i in 0..1_000u64 {
                runner.post(from_here!(), move || {
                    black_box(i);
                });
            }
            pool.flush_for_testing();
        });
    });
}

fn bench_loop_posts(c: &mut Criterion) {
    c.bench_function("sequence_manager_1000", |b| {
        let manager = SequenceManager::new();
        let runner = manager.task_runner();

        b.iter(|| {
            for i in 0..1_000u64 {
                runner.post(from_here!(), move || {
                    black_box(i);
                });
            }
            RunLoop::new().run_until_idle();
        });
    });
}

fn bench_delayed_queue(c: &mut Criterion) {
    c.bench_function("delayed_queue_push_pop_1000", |b| {
        let now = Instant::now();
        b.iter(|| {
            let mut queue = DelayedTaskQueue::new();
            for i in 0..1_000u64 {
                queue.push(now + std::time::Duration::from_micros(i % 97), i);
            }
            black_box(queue.take_ready(now + std::time::Duration::from_millis(1)))
        });
    });
}

criterion_group!(
    benches,
    bench_sequenced_posts,
    bench_parallel_posts,
    bench_loop_posts,
    bench_delayed_queue
);
criterion_main!(benches);
