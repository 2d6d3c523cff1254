//! Performance benchmarks for the file repository.
//!
//! These benchmarks measure the hot paths in the daemon:
//! - Directory listing with display metadata
//! - ZIP archive streaming through the bounded pipe
//! - Size formatting

use std::fs;
use std::io::{self, Read};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use daemon::files::{format_size, FileRepository, Root};
use tempfile::TempDir;

/// Build a tree of `dirs` directories holding `files_per_dir` files each.
fn create_tree(dirs: usize, files_per_dir: usize, file_size: usize) -> TempDir {
    let root = TempDir::new().unwrap();
    let content: Vec<u8> = (0..file_size).map(|i| (i % 251) as u8).collect();
    for d in 0..dirs {
        let dir = root.path().join(format!("dir{d:03}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..files_per_dir {
            fs::write(dir.join(format!("file{f:04}.bin")), &content).unwrap();
        }
    }
    root
}

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");

    let tree = create_tree(1, 1000, 16);
    let repository = FileRepository::new(Root::new(tree.path()).unwrap());
    group.throughput(Throughput::Elements(1000));
    group.bench_function("1000_entries", |b| {
        b.iter(|| repository.list(black_box("dir000")).unwrap());
    });

    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    group.sample_size(20);

    // Many small files: header overhead dominates
    let small = create_tree(10, 100, 1024);
    let repository = FileRepository::new(Root::new(small.path()).unwrap());
    group.throughput(Throughput::Bytes(10 * 100 * 1024));
    group.bench_function("1000_files_1KiB", |b| {
        b.iter(|| {
            let mut archive = repository.zip_directory("").unwrap();
            io::copy(&mut archive, &mut io::sink()).unwrap()
        });
    });

    // Few large files: deflate dominates
    let large = create_tree(1, 4, 4 * 1024 * 1024);
    let repository = FileRepository::new(Root::new(large.path()).unwrap());
    group.throughput(Throughput::Bytes(4 * 4 * 1024 * 1024));
    for capacity in [1, 8, 64] {
        let repository = repository.clone().with_archive_capacity(capacity);
        group.bench_function(format!("4_files_4MiB_capacity_{capacity}"), |b| {
            b.iter(|| {
                let mut archive = repository.zip_directory("dir000").unwrap();
                let mut buf = vec![0u8; 64 * 1024];
                let mut total = 0usize;
                loop {
                    let n = archive.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                total
            });
        });
    }

    group.finish();
}

fn bench_format_size(c: &mut Criterion) {
    c.bench_function("format_size", |b| {
        b.iter(|| {
            for bytes in [0u64, 1023, 1024, 1536 * 1024, u64::MAX] {
                black_box(format_size(black_box(bytes), false));
            }
        });
    });
}

criterion_group!(benches, bench_listing, bench_archive, bench_format_size);
criterion_main!(benches);
