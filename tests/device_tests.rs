//! Device Component Tests
//!
//! Tests for:
//! - Allocator recycling through contexts (reuse only after the fence retires)
//! - Resource factories: initial uploads, resting states, readback
//! - Synchronization: execute_command_list, gpu_flush, cross-queue GPU waits,
//!   stalled waits in manual execution, device loss
//! - Shader and pipeline caches
//! - Factory failures leave no descriptor slots behind

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use myth_gpu::fence::Fence;
use myth_gpu::native::{ExecutionMode, NativeDevice};
use myth_gpu::{
    ClearColor, ComputePipelineDesc, DescriptorCapacities, DescriptorType, Device, DeviceSettings,
    Format, GpuError, GpuResource, GraphicsPipelineDesc, QueueType, ResourceState, ShaderCompiler,
    ShaderKey, ShaderStage,
};

fn settings(execution: ExecutionMode) -> DeviceSettings {
    let _ = env_logger::builder().is_test(true).try_init();
    DeviceSettings::default()
        .with_execution(execution)
        .with_validation(true)
        .with_label("test-device")
}

fn manual_device() -> Device {
    Device::new(settings(ExecutionMode::Manual)).unwrap()
}

struct EchoCompiler {
    calls: AtomicUsize,
}

impl ShaderCompiler for EchoCompiler {
    fn compile(&self, key: &ShaderKey, _stage: ShaderStage) -> Result<Vec<u8>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key.source_id.ends_with(".broken") {
            return Err(format!("{}: syntax error", key.source_id));
        }
        Ok(format!("{}:{}", key.source_id, key.entry_point).into_bytes())
    }
}

// ============================================================================
// Allocator Recycling Tests
// ============================================================================

#[test]
fn allocator_is_reused_only_after_its_submission_retires() {
    let device = manual_device();
    let pool = device.queue(QueueType::Graphics).allocator_pool();
    let mut ctx = device.create_graphics_context().unwrap();

    ctx.open().unwrap();
    let first = ctx.finish_and_execute(false).unwrap();
    assert_eq!(pool.ready_tags(), vec![first]);

    // Not retired: the next open needs a second allocator.
    ctx.open().unwrap();
    assert_eq!(pool.allocator_count(), 2);
    let second = ctx.finish_and_execute(false).unwrap();
    assert_eq!(pool.ready_tags(), vec![first, second]);

    device.process_queues();
    assert!(device.queue(QueueType::Graphics).fence().is_complete(second));

    // Both retired: reuse, oldest first, without creating more.
    ctx.open().unwrap();
    ctx.finish_and_execute(true).unwrap();
    ctx.open().unwrap();
    ctx.finish_and_execute(true).unwrap();
    assert_eq!(pool.allocator_count(), 2);
}

#[test]
fn allocator_count_stays_bounded_under_steady_submission() {
    let device = Device::new(settings(ExecutionMode::Threaded)).unwrap();
    let mut ctx = device.create_compute_context().unwrap();
    for _ in 0..64 {
        ctx.open().unwrap();
        ctx.finish_and_execute(true).unwrap();
    }
    assert!(device.stats().allocators[QueueType::Compute.index()] <= 2);
}

// ============================================================================
// Resource Factory Tests
// ============================================================================

#[test]
fn vertex_buffer_upload_round_trips() {
    let device = manual_device();
    let vertices: Vec<[f32; 2]> = (0..16).map(|i| [i as f32, -(i as f32)]).collect();
    let buffer = device.create_vertex_buffer(&vertices).unwrap();

    assert_eq!(buffer.stride(), Some(8));
    assert_eq!(buffer.element_count(), 16);
    assert_eq!(buffer.current_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);
    assert_eq!(
        buffer.core().native().gpu_state(),
        ResourceState::VERTEX_AND_CONSTANT_BUFFER
    );

    let bytes = device.read_buffer(&buffer).unwrap();
    assert_eq!(bytes, bytemuck::cast_slice::<[f32; 2], u8>(&vertices));
    assert_eq!(buffer.current_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);
    assert_eq!(device.stats().total().validation_errors, 0);
}

#[test]
fn index_buffers_rest_in_index_state() {
    let device = manual_device();
    let buffer = device.create_index_buffer_u32(&[0, 1, 2, 2, 1, 3]).unwrap();
    assert_eq!(buffer.index_format(), Some(Format::R32Uint));
    assert_eq!(buffer.element_count(), 6);
    assert_eq!(buffer.current_state(), ResourceState::INDEX_BUFFER);
    assert!(buffer.view().is_none());
}

#[test]
fn index_buffer_rejects_non_index_formats_and_ragged_data() {
    let device = manual_device();
    assert!(matches!(
        device.create_index_buffer(&[0; 8], Format::R32Float),
        Err(GpuError::InvalidState(_))
    ));
    assert!(matches!(
        device.create_index_buffer(&[0; 5], Format::R16Uint),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
fn constant_buffer_is_padded_and_owns_a_view() {
    let device = manual_device();
    let buffer = device.create_constants(&[1u32, 2, 3]).unwrap();
    assert_eq!(buffer.size(), 256);
    let view = buffer.view().unwrap();
    assert_eq!(view.kind(), DescriptorType::CbvSrvUav);
    assert_eq!(device.descriptors().usage(DescriptorType::CbvSrvUav).allocated, 1);

    drop(buffer);
    assert_eq!(device.descriptors().usage(DescriptorType::CbvSrvUav).allocated, 0);
}

#[test]
fn constant_buffer_update_round_trips() -> anyhow::Result<()> {
    let device = manual_device();
    let buffer = device.create_constant_buffer(64, None)?;
    assert_eq!(buffer.current_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);

    let mut ctx = device.create_copy_context()?;
    ctx.open()?;
    ctx.update_constants(&buffer, &[7u32, 8, 9, 10])?;
    ctx.finish_and_execute(true)?;
    drop(ctx);

    let bytes = device.read_buffer(&buffer)?;
    assert_eq!(&bytes[..16], bytemuck::cast_slice::<u32, u8>(&[7, 8, 9, 10]));
    assert!(bytes[16..].iter().all(|&b| b == 0));
    assert_eq!(buffer.current_state(), ResourceState::VERTEX_AND_CONSTANT_BUFFER);
    Ok(())
}

#[test]
fn texture_upload_round_trips() {
    let device = manual_device();
    let texels: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
    let texture = device
        .create_texture_2d(4, 4, Format::Rgba8Unorm, Some(texels.as_slice()))
        .unwrap();

    assert_eq!(texture.current_state(), ResourceState::ALL_SHADER_RESOURCE);
    assert_eq!(device.read_texture(&texture).unwrap(), texels);
    assert_eq!(texture.current_state(), ResourceState::ALL_SHADER_RESOURCE);
    assert_eq!(device.stats().total().validation_errors, 0);
}

#[test]
fn texture_with_wrong_data_size_is_rejected() {
    let device = manual_device();
    assert!(matches!(
        device.create_texture_2d(4, 4, Format::Rgba8Unorm, Some(&[0u8; 10][..])),
        Err(GpuError::InvalidState(_))
    ));
    assert!(matches!(
        device.create_texture_2d(0, 4, Format::Rgba8Unorm, None),
        Err(GpuError::InvalidState(_))
    ));
    assert!(matches!(
        device.create_texture_2d(4, 4, Format::D32Float, None),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
fn uploads_and_readbacks_only_use_the_copy_queue_for_copy_states() {
    let device = manual_device();
    let copies = |queue| device.stats().queue(queue).copies;

    let texels = vec![9u8; 4 * 4 * 4];
    let texture = device
        .create_texture_2d(4, 4, Format::Rgba8Unorm, Some(texels.as_slice()))
        .unwrap();
    let buffer = device.create_vertex_buffer(&[[1.0f32; 4]; 4]).unwrap();
    assert_eq!(copies(QueueType::Copy), 0);
    let graphics = copies(QueueType::Graphics);
    assert_eq!(graphics, 2);

    // Shader resource and vertex states are not copy queue states.
    assert_eq!(device.read_texture(&texture).unwrap(), texels);
    device.read_buffer(&buffer).unwrap();
    assert_eq!(copies(QueueType::Graphics), graphics + 2);
    assert_eq!(copies(QueueType::Copy), 0);

    let target = device
        .create_render_target(4, 4, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap();
    assert_eq!(target.current_state(), ResourceState::COMMON);
    device.read_render_target(&target).unwrap();
    assert_eq!(copies(QueueType::Copy), 1);
    assert_eq!(copies(QueueType::Graphics), graphics + 2);
    assert_eq!(target.current_state(), ResourceState::COMMON);
    assert_eq!(device.stats().total().validation_errors, 0);
}

#[test]
fn targets_own_write_and_shader_views() {
    let device = manual_device();
    let color = device
        .create_render_target(8, 8, Format::Rgba16Float, ClearColor::TRANSPARENT)
        .unwrap();
    let depth = device.create_depth_target(8, 8, Format::D32Float, 0.0, 0).unwrap();
    let storage = device
        .create_unordered_access_target(8, 8, Format::Rgba32Float)
        .unwrap();

    assert!(color.rtv().is_ok());
    assert!(color.dsv().is_err());
    assert!(depth.dsv().is_ok());
    assert!(storage.uav().is_ok());
    assert_eq!(color.clear_color(), Some(ClearColor::TRANSPARENT));
    assert_eq!(depth.clear_depth(), Some((0.0, 0)));

    let stats = device.stats();
    assert_eq!(stats.descriptor_usage(DescriptorType::RenderTarget).allocated, 1);
    assert_eq!(stats.descriptor_usage(DescriptorType::DepthStencil).allocated, 1);
    // Three SRVs plus one UAV.
    assert_eq!(stats.descriptor_usage(DescriptorType::CbvSrvUav).allocated, 4);
}

#[test]
fn frame_buffer_holds_matching_attachments() {
    let device = manual_device();
    let frame_buffer = device
        .create_frame_buffer(
            32,
            16,
            &[Format::Rgba8Unorm, Format::Rgba16Float],
            Some(Format::D24UnormS8Uint),
        )
        .unwrap();
    assert_eq!(frame_buffer.colors().len(), 2);
    assert_eq!(frame_buffer.color(1).unwrap().format(), Format::Rgba16Float);
    assert_eq!(frame_buffer.depth().unwrap().width(), 32);
    assert!(device.create_frame_buffer(4, 4, &[], None).is_err());
}

#[test]
fn descriptor_exhaustion_fails_construction_without_leaking_slots() {
    let capacities = DescriptorCapacities::default().with(DescriptorType::CbvSrvUav, 1);
    let device = Device::new(settings(ExecutionMode::Manual).with_descriptor_capacities(capacities))
        .unwrap();

    let held = device
        .create_render_target(4, 4, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap();
    let err = device
        .create_render_target(4, 4, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap_err();
    assert!(matches!(
        err,
        GpuError::DescriptorHeapExhausted {
            kind: DescriptorType::CbvSrvUav,
            capacity: 1
        }
    ));
    // The second target's RTV fit but its SRV did not; the RTV went back.
    assert_eq!(device.descriptors().usage(DescriptorType::RenderTarget).allocated, 1);

    drop(held);
    device
        .create_render_target(4, 4, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap();
}

#[test]
fn memory_budget_exhaustion_is_reported() {
    let native = NativeDevice::new(true).with_memory_budget(1024);
    let device = Device::with_native(native, settings(ExecutionMode::Manual)).unwrap();
    let err = device
        .create_render_target(64, 64, Format::Rgba8Unorm, ClearColor::BLACK)
        .unwrap_err();
    assert!(matches!(err, GpuError::Native(_)));
    assert!(!err.is_fatal());
}

// ============================================================================
// Synchronization Tests
// ============================================================================

#[test]
fn execute_command_list_signals_immediately() {
    let device = manual_device();
    let queue = device.queue(QueueType::Copy);
    let allocator = queue.request_allocator(device.native()).unwrap();
    let mut list = device.native().create_command_list(QueueType::Copy).unwrap();
    list.reset(&allocator).unwrap();
    list.close().unwrap();

    let value = device.execute_command_list(QueueType::Copy, &list, false).unwrap();
    assert_eq!(queue.fence().last_signaled(), value);
    assert!(!queue.fence().is_complete(value));

    device.wait_for_fence(QueueType::Copy, value).unwrap();
    assert!(queue.fence().is_complete(value));
    queue.return_unused_allocator(allocator);
}

#[test]
fn gpu_flush_waits_for_all_prior_work() {
    let device = Device::new(settings(ExecutionMode::Threaded)).unwrap();
    let mut ctx = device.create_graphics_context().unwrap();
    let mut last = 0;
    for _ in 0..4 {
        ctx.open().unwrap();
        last = ctx.finish_and_execute(false).unwrap();
    }
    device.gpu_flush(QueueType::Graphics).unwrap();
    assert!(device.queue(QueueType::Graphics).fence().is_complete(last));
    device.gpu_flush_all().unwrap();
}

#[test]
fn cross_queue_wait_orders_work_on_the_gpu() {
    let device = manual_device();
    let buffer = device.create_constant_buffer(16, None).unwrap();

    let mut copy = device.create_copy_context().unwrap();
    copy.open().unwrap();
    copy.update_buffer(&buffer, 0, &[7; 16]).unwrap();
    let copied = copy.finish_and_execute(false).unwrap();

    device.queue_wait_for(QueueType::Graphics, QueueType::Copy, copied).unwrap();
    let mut gfx = device.create_graphics_context().unwrap();
    gfx.open().unwrap();
    gfx.set_constant_buffer(0, &buffer).unwrap();
    let drawn = gfx.finish_and_execute(false).unwrap();

    // The graphics queue cannot get past the wait on its own.
    device.queue(QueueType::Graphics).native().process_all();
    assert!(!device.queue(QueueType::Graphics).fence().is_complete(drawn));

    device.queue(QueueType::Copy).native().process_all();
    device.queue(QueueType::Graphics).native().process_all();
    assert!(device.queue(QueueType::Graphics).fence().is_complete(drawn));
    assert!(device.queue(QueueType::Copy).fence().is_complete(copied));
}

#[test]
fn cross_queue_wait_on_an_unsignaled_value_is_rejected() {
    let device = manual_device();
    assert!(matches!(
        device.queue_wait_for(QueueType::Compute, QueueType::Graphics, 5),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
fn manual_wait_that_cannot_complete_reports_a_stall() {
    let device = manual_device();
    let never = Fence::new(device.native(), QueueType::Graphics).unwrap();
    device.queue(QueueType::Graphics).gpu_wait(&never, 1).unwrap();

    let mut ctx = device.create_graphics_context().unwrap();
    ctx.open().unwrap();
    let err = ctx.finish_and_execute(true).unwrap_err();
    assert!(matches!(err, GpuError::InvalidState(_)));

    // Satisfying the wait lets the queue drain.
    never.native().signal(1);
    device.process_queues();
    assert_eq!(device.queue(QueueType::Graphics).native().pending_ops(), 0);
}

#[test]
fn device_loss_releases_blocked_waits() {
    let device = Device::new(settings(ExecutionMode::Threaded)).unwrap();
    let never = Fence::new(device.native(), QueueType::Graphics).unwrap();
    device.queue(QueueType::Graphics).gpu_wait(&never, 1).unwrap();

    let mut ctx = device.create_graphics_context().unwrap();
    ctx.open().unwrap();
    let value = ctx.finish_and_execute(false).unwrap();

    let err = std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(20));
            device.native().remove("hung queue");
        });
        device.wait_for_fence(QueueType::Graphics, value).unwrap_err()
    });
    assert!(matches!(err, GpuError::DeviceLost(_)));
    assert!(device.is_lost());
}

#[test]
fn lost_device_fails_every_factory() {
    let device = manual_device();
    device.native().remove("test");

    assert!(matches!(device.create_graphics_context(), Err(GpuError::DeviceLost(_))));
    assert!(matches!(
        device.create_render_target(4, 4, Format::Rgba8Unorm, ClearColor::BLACK),
        Err(GpuError::DeviceLost(_))
    ));
    assert!(matches!(device.gpu_flush_all(), Err(GpuError::DeviceLost(_))));
}

// ============================================================================
// Shader & Pipeline Cache Tests
// ============================================================================

#[test]
fn shaders_compile_once_per_key() {
    let device = manual_device();
    let compiler = Arc::new(EchoCompiler {
        calls: AtomicUsize::new(0),
    });
    device.shaders().set_compiler(compiler.clone());

    let a = device.load_shader("mesh.hlsl", "vs_main", ShaderStage::Vertex).unwrap();
    let b = device.load_shader("mesh.hlsl", "vs_main", ShaderStage::Vertex).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.bytecode(), b"mesh.hlsl:vs_main");
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

    let err = device
        .load_shader("bad.broken", "main", ShaderStage::Pixel)
        .unwrap_err();
    assert!(matches!(err, GpuError::ShaderCompilation { ref entry_point, .. } if entry_point == "main"));
}

#[test]
fn equal_pipeline_descriptions_share_one_pipeline() {
    let device = manual_device();
    device.shaders().set_compiler(Arc::new(EchoCompiler {
        calls: AtomicUsize::new(0),
    }));
    let vs = device.load_shader("mesh.hlsl", "vs_main", ShaderStage::Vertex).unwrap();
    let ps = device.load_shader("mesh.hlsl", "ps_main", ShaderStage::Pixel).unwrap();
    let cs = device.load_shader("cull.hlsl", "cs_main", ShaderStage::Compute).unwrap();

    let desc = GraphicsPipelineDesc::new(Arc::clone(&vs), Some(Arc::clone(&ps)))
        .with_color_formats(&[Format::Rgba8Unorm])
        .with_depth(Format::D32Float);
    let a = device.create_graphics_pipeline(&desc).unwrap();
    let b = device.create_graphics_pipeline(&desc.clone()).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let blended = desc.with_blend(myth_gpu::BlendMode::AlphaBlend);
    let c = device.create_graphics_pipeline(&blended).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_ne!(a.state_hash(), c.state_hash());

    let compute = device.create_compute_pipeline(&ComputePipelineDesc::new(cs)).unwrap();
    assert_eq!(compute.desc().shader.stage(), ShaderStage::Compute);

    assert_eq!(device.pipelines().len(), 3);
    assert_eq!(device.pipelines().hits(), 1);
    assert_eq!(device.stats().pipelines, 3);
}

#[test]
fn pipeline_with_wrong_shader_stage_is_rejected() {
    let device = manual_device();
    device.shaders().set_compiler(Arc::new(EchoCompiler {
        calls: AtomicUsize::new(0),
    }));
    let ps = device.load_shader("mesh.hlsl", "ps_main", ShaderStage::Pixel).unwrap();
    assert!(matches!(
        device.create_graphics_pipeline(&GraphicsPipelineDesc::new(Arc::clone(&ps), None)),
        Err(GpuError::InvalidState(_))
    ));
    assert!(matches!(
        device.create_compute_pipeline(&ComputePipelineDesc::new(ps)),
        Err(GpuError::InvalidState(_))
    ));
}
