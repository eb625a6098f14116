//! Descriptor and allocator hot-path benchmarks.
//!
//! Run with `cargo bench --bench descriptor_bench`.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use myth_gpu::command::CommandAllocatorPool;
use myth_gpu::descriptor::DescriptorHeap;
use myth_gpu::native::NativeDevice;
use myth_gpu::{DescriptorType, QueueType};

fn bench_heap_allocate_release(c: &mut Criterion) {
    let device = NativeDevice::new(false);
    let mut group = c.benchmark_group("descriptor_heap");

    for &live in &[0u32, 256, 3072] {
        let heap = DescriptorHeap::new(&device, DescriptorType::CbvSrvUav, 4096).unwrap();
        // Fragment the heap: keep every other slot of the first `2 * live` alive.
        let all: Vec<_> = (0..live * 2).map(|_| heap.allocate().unwrap()).collect();
        let held: Vec<_> = all
            .into_iter()
            .enumerate()
            .filter_map(|(i, h)| (i % 2 == 0).then_some(h))
            .collect();

        group.bench_with_input(BenchmarkId::new("allocate_release", live), &live, |b, _| {
            b.iter(|| {
                let handle = heap.allocate().unwrap();
                black_box(handle.index());
                handle.release();
            });
        });
        drop(held);
    }

    group.finish();
}

fn bench_heap_burst(c: &mut Criterion) {
    let device = NativeDevice::new(false);
    let heap = DescriptorHeap::new(&device, DescriptorType::RenderTarget, 1024).unwrap();

    c.bench_function("descriptor_heap/burst_1024", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..1024).map(|_| heap.allocate().unwrap()).collect();
            black_box(heap.allocated_count());
            drop(handles);
        });
    });
}

fn bench_allocator_reuse(c: &mut Criterion) {
    let device = NativeDevice::new(false);
    let pool = CommandAllocatorPool::new(QueueType::Graphics);
    let mut fence = 0u64;

    c.bench_function("allocator_pool/request_discard", |b| {
        b.iter(|| {
            fence += 1;
            let allocator = pool.request_allocator(&device, fence - 1).unwrap();
            pool.discard_allocator(fence, allocator);
        });
    });
}

criterion_group!(
    benches,
    bench_heap_allocate_release,
    bench_heap_burst,
    bench_allocator_reuse
);
criterion_main!(benches);
