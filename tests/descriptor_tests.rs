//! Descriptor Component Tests
//!
//! Tests for:
//! - DescriptorHeap: lowest-index reuse, fixed capacity, disjoint free list
//! - DescriptorHandle: idempotent release, release on drop, view writes
//! - DescriptorHeapManager: per-type heaps, exhaustion reporting, usage

use std::sync::Arc;

use myth_gpu::descriptor::{DescriptorHeap, DescriptorHeapManager};
use myth_gpu::native::{GpuDescriptorHandle, NativeDevice, SamplerFilter, ViewDesc};
use myth_gpu::settings::DescriptorCapacities;
use myth_gpu::{DescriptorType, GpuError};

fn heap(kind: DescriptorType, capacity: u32) -> Arc<DescriptorHeap> {
    let device = NativeDevice::new(true);
    DescriptorHeap::new(&device, kind, capacity).unwrap()
}

// ============================================================================
// DescriptorHeap Tests
// ============================================================================

#[test]
fn heap_hands_out_sequential_indices() {
    let heap = heap(DescriptorType::CbvSrvUav, 8);
    let handles: Vec<_> = (0..4).map(|_| heap.allocate().unwrap()).collect();
    let indices: Vec<u32> = handles.iter().map(|h| h.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(heap.watermark(), 4);
    assert_eq!(heap.allocated_count(), 4);
}

#[test]
fn heap_of_128_fails_the_last_two_of_130_allocations() {
    let heap = heap(DescriptorType::CbvSrvUav, 128);
    let results: Vec<_> = (0..130).map(|_| heap.allocate()).collect();

    assert!(results[..128].iter().all(Option::is_some));
    assert!(results[128].is_none());
    assert!(results[129].is_none());
    assert_eq!(heap.allocated_count(), 128);
}

#[test]
fn heap_never_hands_out_an_index_at_or_above_capacity() {
    let heap = heap(DescriptorType::Sampler, 16);
    let mut handles = Vec::new();
    while let Some(handle) = heap.allocate() {
        assert!(handle.index() < 16);
        handles.push(handle);
    }
    assert_eq!(handles.len(), 16);
}

#[test]
fn heap_reuses_the_lowest_freed_index_first() {
    let heap = heap(DescriptorType::RenderTarget, 8);
    let handles: Vec<_> = (0..6).map(|_| heap.allocate().unwrap()).collect();

    handles[4].release();
    handles[1].release();
    handles[3].release();
    assert_eq!(heap.free_list(), vec![1, 3, 4]);

    let a = heap.allocate().unwrap();
    let b = heap.allocate().unwrap();
    assert_eq!(a.index(), 1);
    assert_eq!(b.index(), 3);
    assert_eq!(heap.watermark(), 6);
}

#[test]
fn allocated_indices_are_disjoint_from_the_free_list() {
    let heap = heap(DescriptorType::CbvSrvUav, 32);
    let mut live: Vec<_> = (0..20).map(|_| heap.allocate().unwrap()).collect();

    // Release every third handle, then allocate a few back.
    for handle in live.iter().step_by(3) {
        handle.release();
    }
    live.retain(|h| !h.is_released());
    for _ in 0..3 {
        live.push(heap.allocate().unwrap());
    }

    let free = heap.free_list();
    for handle in &live {
        assert!(!free.contains(&handle.index()), "index {} is both live and free", handle.index());
        assert!(heap.is_allocated(handle.index()));
    }
    assert_eq!(heap.allocated_count() as usize, live.len());
}

#[test]
fn full_heap_recovers_after_release() {
    let heap = heap(DescriptorType::DepthStencil, 2);
    let a = heap.allocate().unwrap();
    let _b = heap.allocate().unwrap();
    assert!(heap.allocate().is_none());

    drop(a);
    let c = heap.allocate().unwrap();
    assert_eq!(c.index(), 0);
}

// ============================================================================
// DescriptorHandle Tests
// ============================================================================

#[test]
fn release_is_idempotent() {
    let heap = heap(DescriptorType::CbvSrvUav, 4);
    let handle = heap.allocate().unwrap();

    assert!(handle.release());
    assert!(!handle.release());
    assert!(handle.is_released());
    assert_eq!(heap.free_list(), vec![0]);
    assert_eq!(heap.allocated_count(), 0);

    // Dropping the released handle must not free the slot a second time.
    let again = heap.allocate().unwrap();
    drop(handle);
    assert!(heap.is_allocated(again.index()));
}

#[test]
fn dropping_a_handle_returns_its_slot() {
    let heap = heap(DescriptorType::Sampler, 4);
    {
        let _handle = heap.allocate().unwrap();
        assert_eq!(heap.allocated_count(), 1);
    }
    assert_eq!(heap.allocated_count(), 0);
}

#[test]
fn handle_outliving_its_heap_releases_quietly() {
    let heap = heap(DescriptorType::CbvSrvUav, 4);
    let handle = heap.allocate().unwrap();
    drop(heap);
    assert!(!handle.release());
}

#[test]
fn shader_visible_handles_carry_gpu_addresses() {
    let srv_heap = heap(DescriptorType::CbvSrvUav, 4);
    let rtv_heap = heap(DescriptorType::RenderTarget, 4);

    let srv0 = srv_heap.allocate().unwrap();
    let srv1 = srv_heap.allocate().unwrap();
    let rtv = rtv_heap.allocate().unwrap();

    assert!(srv0.is_shader_visible());
    assert!(!srv0.gpu().is_null());
    assert!(srv1.gpu().0 > srv0.gpu().0);
    assert!(srv1.cpu().0 > srv0.cpu().0);

    assert!(!rtv.is_shader_visible());
    assert_eq!(rtv.gpu(), GpuDescriptorHandle::NULL);
}

#[test]
fn writing_a_released_handle_is_rejected() {
    let heap = heap(DescriptorType::Sampler, 2);
    let handle = heap.allocate().unwrap();
    handle
        .write(ViewDesc::Sampler {
            filter: SamplerFilter::Point,
        })
        .unwrap();
    assert!(heap.native().view(handle.index()).is_some());

    handle.release();
    assert!(heap.native().view(0).is_none());
    let err = handle
        .write(ViewDesc::Sampler {
            filter: SamplerFilter::Linear,
        })
        .unwrap_err();
    assert!(matches!(err, GpuError::InvalidDescriptor(_)));
}

// ============================================================================
// DescriptorHeapManager Tests
// ============================================================================

#[test]
fn manager_keeps_heap_types_apart() {
    let device = NativeDevice::new(true);
    let manager = DescriptorHeapManager::new(&device, &DescriptorCapacities::uniform(4)).unwrap();

    let rtv = manager.allocate(DescriptorType::RenderTarget).unwrap();
    let srv = manager.allocate(DescriptorType::CbvSrvUav).unwrap();
    assert_eq!(rtv.kind(), DescriptorType::RenderTarget);
    assert_eq!(srv.kind(), DescriptorType::CbvSrvUav);
    assert_eq!(rtv.index(), 0);
    assert_eq!(srv.index(), 0);

    assert_eq!(manager.usage(DescriptorType::RenderTarget).allocated, 1);
    assert_eq!(manager.usage(DescriptorType::Sampler).allocated, 0);
    assert_eq!(manager.usage(DescriptorType::Sampler).capacity, 4);
}

#[test]
fn manager_reports_exhaustion_as_error() {
    let device = NativeDevice::new(true);
    let capacities = DescriptorCapacities::default().with(DescriptorType::DepthStencil, 1);
    let manager = DescriptorHeapManager::new(&device, &capacities).unwrap();

    let _first = manager.try_allocate(DescriptorType::DepthStencil).unwrap();
    let err = manager.try_allocate(DescriptorType::DepthStencil).unwrap_err();
    assert!(matches!(
        err,
        GpuError::DescriptorHeapExhausted {
            kind: DescriptorType::DepthStencil,
            capacity: 1
        }
    ));
    assert!(manager.allocate(DescriptorType::DepthStencil).is_none());
}

#[test]
fn manager_free_is_idempotent() {
    let device = NativeDevice::new(true);
    let manager = DescriptorHeapManager::new(&device, &DescriptorCapacities::uniform(4)).unwrap();

    let handle = manager.allocate(DescriptorType::CbvSrvUav).unwrap();
    manager.free(&handle);
    manager.free(&handle);
    assert_eq!(manager.usage(DescriptorType::CbvSrvUav).allocated, 0);
    assert_eq!(manager.heap(DescriptorType::CbvSrvUav).free_list(), vec![0]);
}
