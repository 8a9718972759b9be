use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use matchscout::{run_scan, scan::MemorySink, ProgressSink, ScanConfig};
use std::{fs::File, io::Write, num::NonZeroUsize, path::Path, sync::Arc};
use tempfile::tempdir;

/// Discards every event
struct NullSink;

impl ProgressSink for NullSink {}

fn create_test_files(dir: &Path, file_count: usize, lines_per_file: usize) -> std::io::Result<()> {
    for i in 0..file_count {
        let mut file = File::create(dir.join(format!("test_{}.txt", i)))?;
        for j in 0..lines_per_file {
            writeln!(
                file,
                "Line {} TODO: fix bug {} FIXME: optimize line {} NOTE: important task {}",
                j, j, j, j
            )?;
        }
    }
    Ok(())
}

fn bench_patterns(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 50, 100).unwrap();

    let patterns = [
        "TODO",
        r"TODO:.*\d+",
        r"FIXME:.*bug.*line \d+",
        r"NOTE:.*important.*\d+",
    ];

    let mut group = c.benchmark_group("Pattern");
    for (i, pattern) in patterns.iter().enumerate() {
        let config = ScanConfig::new(dir.path(), *pattern);
        group.bench_function(format!("pattern_{}", i), |b| {
            b.iter(|| black_box(run_scan(&config, Arc::new(NullSink)).unwrap()));
        });
    }
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 500, 20).unwrap();

    let mut group = c.benchmark_group("Thread Scaling");
    for threads in [1, 2, 4, 8] {
        let mut config = ScanConfig::new(dir.path(), "TODO");
        config.thread_count = NonZeroUsize::new(threads).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &config, |b, config| {
            b.iter(|| black_box(run_scan(config, Arc::new(NullSink)).unwrap()));
        });
    }
    group.finish();
}

fn bench_channel_capacity(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 500, 5).unwrap();

    let mut group = c.benchmark_group("Channel Capacity");
    for capacity in [1, 16, 1024] {
        let mut config = ScanConfig::new(dir.path(), "TODO");
        config.channel_capacity = NonZeroUsize::new(capacity).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &config, |b, config| {
            // A recording sink makes the consumer the slower side.
            b.iter(|| black_box(run_scan(config, Arc::new(MemorySink::new())).unwrap()));
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_patterns, bench_thread_scaling, bench_channel_capacity
}
criterion_main!(benches);
