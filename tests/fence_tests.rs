//! Fence Component Tests
//!
//! Tests for:
//! - Fence: monotonic signal values, cached completion, `is_complete` monotonicity
//! - cpu_wait: threaded completion, never-signaled values, device loss

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use myth_gpu::fence::Fence;
use myth_gpu::native::{ExecutionMode, NativeDevice};
use myth_gpu::{GpuError, QueueType};

// ============================================================================
// Signal & Completion Tests
// ============================================================================

#[test]
fn signal_values_increase_from_one() {
    let device = NativeDevice::new(true);
    let queue = device
        .create_command_queue(QueueType::Graphics, ExecutionMode::Manual)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();

    assert_eq!(fence.last_signaled(), 0);
    assert_eq!(fence.signal(&queue).unwrap(), 1);
    assert_eq!(fence.signal(&queue).unwrap(), 2);
    assert_eq!(fence.signal(&queue).unwrap(), 3);
    assert_eq!(fence.last_signaled(), 3);
}

#[test]
fn completion_follows_queue_progress() {
    let device = NativeDevice::new(true);
    let queue = device
        .create_command_queue(QueueType::Compute, ExecutionMode::Manual)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Compute).unwrap();

    let first = fence.signal(&queue).unwrap();
    let second = fence.signal(&queue).unwrap();
    assert!(!fence.is_complete(first));

    queue.process(1);
    assert!(fence.is_complete(first));
    assert!(!fence.is_complete(second));

    queue.process_all();
    assert!(fence.is_complete(second));
    assert_eq!(fence.last_completed(), 2);
}

#[test]
fn is_complete_is_monotonic() {
    let device = NativeDevice::new(true);
    let queue = device
        .create_command_queue(QueueType::Copy, ExecutionMode::Manual)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Copy).unwrap();

    let values: Vec<u64> = (0..8).map(|_| fence.signal(&queue).unwrap()).collect();
    let mut completed_so_far = 0;
    for _ in 0..8 {
        queue.process(1);
        let now: Vec<bool> = values.iter().map(|&v| fence.is_complete(v)).collect();
        let count = now.iter().filter(|&&done| done).count();
        assert!(count > completed_so_far || count == values.len());
        // Completed values form a prefix.
        assert!(now[..count].iter().all(|&done| done));
        completed_so_far = count;
    }
    assert!(values.iter().all(|&v| fence.is_complete(v)));
}

#[test]
fn value_zero_is_always_complete() {
    let device = NativeDevice::new(true);
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();
    assert!(fence.is_complete(0));
    fence.cpu_wait(0).unwrap();
}

// ============================================================================
// cpu_wait Tests
// ============================================================================

#[test]
fn cpu_wait_returns_once_threaded_queue_retires() {
    let device = NativeDevice::new(true);
    let queue = device
        .create_command_queue(QueueType::Graphics, ExecutionMode::Threaded)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();

    let value = fence.signal(&queue).unwrap();
    fence.cpu_wait(value).unwrap();
    assert!(fence.is_complete(value));
    fence.wait_for_idle().unwrap();
}

#[test]
fn cpu_wait_blocks_until_another_thread_processes_the_queue() {
    let device = NativeDevice::new(true);
    let queue = Arc::new(
        device
            .create_command_queue(QueueType::Copy, ExecutionMode::Manual)
            .unwrap(),
    );
    let fence = Fence::new(&device, QueueType::Copy).unwrap();
    let value = fence.signal(&queue).unwrap();

    let worker = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.process_all()
        })
    };
    fence.cpu_wait(value).unwrap();
    assert_eq!(worker.join().unwrap(), 1);
}

#[test]
fn cpu_wait_on_a_value_never_signaled_is_an_error() {
    let device = NativeDevice::new(true);
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();
    let err = fence.cpu_wait(1).unwrap_err();
    assert!(matches!(err, GpuError::InvalidState(_)));
}

#[test]
fn device_removal_releases_a_blocked_wait() {
    let device = Arc::new(NativeDevice::new(true));
    let queue = device
        .create_command_queue(QueueType::Graphics, ExecutionMode::Manual)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();
    let value = fence.signal(&queue).unwrap();

    let remover = {
        let device = Arc::clone(&device);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            device.remove("driver reset");
        })
    };
    let err = fence.cpu_wait(value).unwrap_err();
    remover.join().unwrap();
    assert!(matches!(err, GpuError::DeviceLost(ref reason) if reason.contains("driver reset")));
    assert!(err.is_fatal());
}

#[test]
fn signal_after_removal_fails() {
    let device = NativeDevice::new(true);
    let queue = device
        .create_command_queue(QueueType::Graphics, ExecutionMode::Manual)
        .unwrap();
    let fence = Fence::new(&device, QueueType::Graphics).unwrap();
    device.remove("test");
    assert!(matches!(fence.signal(&queue), Err(GpuError::DeviceLost(_))));
}
