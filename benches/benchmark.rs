use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use criterion::{criterion_group, criterion_main, Criterion};
use flate2::write::GzEncoder;
use flate2::{bufread, read, Compression};
use parallel::{ParallelConfig, ParallelGzDecoder};
use zlib::ZlibGzDecoder;

#[path = "../src/strategy/parallel.rs"]
mod parallel;
#[path = "../src/strategy/zlib.rs"]
mod zlib;

fn write_tarball(path: &Path) {
    let content: Vec<u8> = (0..4 << 20).map(|i: u32| (i % 89) as u8).collect();

    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(GzEncoder::new(
        File::create(path).unwrap(),
        Compression::default(),
    ));
    builder
        .append_data(&mut header, "payload.bin", content.as_slice())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

fn decompress_tarball(path: &Path) {
    let tar_gz = File::open(path).unwrap();
    io::copy(&mut read::MultiGzDecoder::new(tar_gz), &mut io::sink()).unwrap();
}

fn decompress_tarball_buffered(path: &Path) {
    let tar_gz = BufReader::new(File::open(path).unwrap());
    io::copy(&mut bufread::MultiGzDecoder::new(tar_gz), &mut io::sink()).unwrap();
}

fn decompress_tarball_in_memory(path: &Path) {
    let tar_gz = fs::read(path).unwrap();
    let mut tar = Vec::new();
    bufread::MultiGzDecoder::new(tar_gz.as_slice())
        .read_to_end(&mut tar)
        .unwrap();
    io::sink().write_all(&tar).unwrap();
}

fn decompress_tarball_zlib(path: &Path) {
    let tar_gz = BufReader::new(File::open(path).unwrap());
    let mut tar = ZlibGzDecoder::new(tar_gz).unwrap();
    io::copy(&mut tar, &mut io::sink()).unwrap();
}

fn decompress_tarball_parallel(path: &Path) {
    let tar_gz = File::open(path).unwrap();
    let mut tar = ParallelGzDecoder::new(tar_gz, ParallelConfig::DEFAULT).unwrap();
    io::copy(&mut tar, &mut io::sink()).unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("bench.tgz");
    write_tarball(&path);

    let mut decompress = c.benchmark_group("decompress");
    decompress.sample_size(20);

    decompress.bench_function("decompress unbuffered", |b| {
        b.iter(|| decompress_tarball(&path))
    });

    decompress.bench_function("decompress buffered", |b| {
        b.iter(|| decompress_tarball_buffered(&path))
    });

    decompress.bench_function("decompress in memory", |b| {
        b.iter(|| decompress_tarball_in_memory(&path))
    });

    decompress.bench_function("decompress zlib", |b| {
        b.iter(|| decompress_tarball_zlib(&path))
    });

    decompress.bench_function("decompress parallel", |b| {
        b.iter(|| decompress_tarball_parallel(&path))
    });

    decompress.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
