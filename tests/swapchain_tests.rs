//! Swap Chain Tests
//!
//! Tests for:
//! - Device::with_window: back buffer creation and window validation
//! - present: copy into the back buffer, flip, size/format checks
//! - resize / set_fullscreen / set_vsync on an idle GPU

use std::sync::Arc;

use myth_gpu::native::ExecutionMode;
use myth_gpu::{
    ClearColor, Device, DeviceSettings, Format, GpuError, GpuResource, RenderTarget, ResourceState,
    WindowDesc,
};

fn windowed_device(width: u32, height: u32) -> Device {
    let _ = env_logger::builder().is_test(true).try_init();
    Device::with_window(
        DeviceSettings::default()
            .with_execution(ExecutionMode::Manual)
            .with_validation(true),
        WindowDesc::new(width, height),
    )
    .unwrap()
}

fn filled_target(device: &Device, width: u32, height: u32, color: ClearColor) -> RenderTarget {
    let target = device
        .create_render_target(width, height, Format::Bgra8Unorm, ClearColor::BLACK)
        .unwrap();
    let mut ctx = device.create_graphics_context().unwrap();
    ctx.open().unwrap();
    ctx.clear_render_target(&target, color).unwrap();
    ctx.finish_and_execute(true).unwrap();
    target
}

// ============================================================================
// Creation Tests
// ============================================================================

#[test]
fn window_device_owns_a_swap_chain() {
    let device = windowed_device(8, 4);
    assert!(device.has_swap_chain());

    let (size, format, count, index) = device
        .with_swap_chain(|sc| {
            (
                (sc.width(), sc.height()),
                sc.format(),
                sc.buffer_count(),
                sc.current_back_buffer_index(),
            )
        })
        .unwrap();
    assert_eq!(size, (8, 4));
    assert_eq!(format, Format::Bgra8Unorm);
    assert_eq!(count, 2);
    assert_eq!(index, 0);
}

#[test]
fn headless_device_has_no_swap_chain() {
    let device = Device::new(DeviceSettings::default().with_execution(ExecutionMode::Manual)).unwrap();
    assert!(!device.has_swap_chain());
    assert!(device.with_swap_chain(|sc| sc.width()).is_none());

    let target = device
        .create_render_target(8, 4, Format::Bgra8Unorm, ClearColor::BLACK)
        .unwrap();
    assert!(matches!(device.present(&target), Err(GpuError::SwapChainMissing)));
    assert!(matches!(device.resize(16, 16), Err(GpuError::SwapChainMissing)));
    assert!(matches!(device.set_vsync(false), Err(GpuError::SwapChainMissing)));
}

#[test]
fn zero_sized_window_is_rejected() {
    let result = Device::with_window(
        DeviceSettings::default().with_execution(ExecutionMode::Manual),
        WindowDesc::new(0, 600),
    );
    assert!(matches!(result, Err(GpuError::InvalidState(_))));
}

// ============================================================================
// Present Tests
// ============================================================================

#[test]
fn present_flips_back_buffers() {
    let device = windowed_device(8, 4);
    let target = filled_target(&device, 8, 4, ClearColor::WHITE);

    for frame in 1..=3u64 {
        device.present(&target).unwrap();
        let (presented, index) = device
            .with_swap_chain(|sc| (sc.presented_frames(), sc.current_back_buffer_index()))
            .unwrap();
        assert_eq!(presented, frame);
        assert_eq!(index, (frame % 2) as usize);
    }

    // The presented target is back in its resting state.
    assert_eq!(target.current_state(), ResourceState::COMMON);
    assert_eq!(device.stats().total().validation_errors, 0);
}

#[test]
fn presented_texels_land_in_the_back_buffer() {
    let device = windowed_device(4, 4);
    let first_buffer = device
        .with_swap_chain(|sc| Arc::clone(sc.current_back_buffer().unwrap()))
        .unwrap();

    let red = filled_target(&device, 4, 4, ClearColor::new(1.0, 0.0, 0.0, 1.0));
    let blue = filled_target(&device, 4, 4, ClearColor::new(0.0, 0.0, 1.0, 1.0));
    device.present(&red).unwrap();
    device.present(&blue).unwrap();

    // Two buffers: the first one is current again and still holds the red frame.
    let expected = device.read_render_target(&red).unwrap();
    let actual = device.read_resource(&first_buffer).unwrap();
    assert_eq!(actual, expected);
    assert_ne!(actual, device.read_render_target(&blue).unwrap());
    assert_eq!(first_buffer.current_state(), ResourceState::PRESENT);
}

#[test]
fn present_rejects_mismatched_targets() {
    let device = windowed_device(8, 4);

    let wrong_size = filled_target(&device, 4, 4, ClearColor::BLACK);
    assert!(matches!(device.present(&wrong_size), Err(GpuError::InvalidState(_))));

    let wrong_format = device
        .create_render_target(8, 4, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap();
    assert!(matches!(device.present(&wrong_format), Err(GpuError::InvalidState(_))));

    let presented = device.with_swap_chain(|sc| sc.presented_frames()).unwrap();
    assert_eq!(presented, 0);
}

// ============================================================================
// Window State Tests
// ============================================================================

#[test]
fn resize_recreates_back_buffers() {
    let device = windowed_device(8, 4);
    let target = filled_target(&device, 8, 4, ClearColor::BLACK);
    device.present(&target).unwrap();

    device.resize(16, 8).unwrap();
    let (size, index) = device
        .with_swap_chain(|sc| ((sc.width(), sc.height()), sc.current_back_buffer_index()))
        .unwrap();
    assert_eq!(size, (16, 8));
    assert_eq!(index, 0);

    // The old-sized target no longer matches.
    assert!(matches!(device.present(&target), Err(GpuError::InvalidState(_))));
    let resized = filled_target(&device, 16, 8, ClearColor::BLACK);
    device.present(&resized).unwrap();

    assert!(matches!(device.resize(0, 8), Err(GpuError::InvalidState(_))));
}

#[test]
fn fullscreen_and_vsync_toggle() {
    let device = windowed_device(8, 4);
    let initial = device
        .with_swap_chain(|sc| (sc.is_fullscreen(), sc.vsync()))
        .unwrap();
    assert_eq!(initial, (false, true));

    device.set_fullscreen(true).unwrap();
    device.set_vsync(false).unwrap();
    let toggled = device
        .with_swap_chain(|sc| (sc.is_fullscreen(), sc.window().fullscreen, sc.vsync()))
        .unwrap();
    assert_eq!(toggled, (true, true, false));

    // Presenting without vsync still flips.
    let target = filled_target(&device, 8, 4, ClearColor::BLACK);
    device.present(&target).unwrap();
    assert_eq!(device.with_swap_chain(|sc| sc.presented_frames()), Some(1));
}

#[test]
fn fullscreen_window_desc_is_honored() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Device::with_window(
        DeviceSettings::default()
            .with_execution(ExecutionMode::Manual)
            .with_vsync(false),
        WindowDesc::new(8, 4).with_fullscreen(true),
    )
    .unwrap();
    let state = device
        .with_swap_chain(|sc| (sc.is_fullscreen(), sc.vsync()))
        .unwrap();
    assert_eq!(state, (true, false));
}
