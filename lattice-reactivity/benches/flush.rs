//! Benchmarks for notify and flush throughput
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_reactivity::reactive::{observe, Object, Value, WatchSource, Watcher, WatcherOptions};
use lattice_reactivity::scheduler::flush_callbacks;

fn reactive_state(keys: usize) -> (Value, Object) {
    let object: Object = (0..keys).map(|i| (format!("k{i}"), Value::from(i))).collect();
    let value = Value::from(object.clone());
    observe(&value, false);
    (value, object)
}

fn bench_tracked_read(c: &mut Criterion) {
    let (value, _) = reactive_state(1);
    let watcher = Watcher::new(
        &value,
        WatchSource::getter(|s| Ok(s.get("k0"))),
        None,
        WatcherOptions::default(),
    )
    .unwrap();

    c.bench_function("tracked_read", |b| b.iter(|| black_box(watcher.get().unwrap())));
}

fn bench_write_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_flush");

    for watchers in [1usize, 10, 100] {
        let (value, object) = reactive_state(1);
        let all: Vec<Watcher> = (0..watchers)
            .map(|_| Watcher::new(&value, "k0", None, WatcherOptions::default()).unwrap())
            .collect();

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(watchers), &watchers, |b, _| {
            b.iter(|| {
                n += 1;
                object.set("k0", n);
                flush_callbacks();
            })
        });
        black_box(all);
    }

    group.finish();
}

fn bench_deep_traverse(c: &mut Criterion) {
    let (value, _) = reactive_state(256);
    c.bench_function("deep_watch_256_keys", |b| {
        b.iter(|| {
            black_box(Watcher::new(&value, WatchSource::getter(|s| Ok(s.clone())), None, WatcherOptions::default().deep(true)).unwrap())
        })
    });
}

criterion_group!(benches, bench_tracked_read, bench_write_flush, bench_deep_traverse);
criterion_main!(benches);
