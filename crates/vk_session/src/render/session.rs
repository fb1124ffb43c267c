//! Graphics session: owns every Vulkan object and drives the frame loop
//!
//! Construction order is instance, surface, physical device, logical device,
//! swapchain, render pass, descriptors, uniform buffers, pipeline,
//! framebuffers, command buffers and frame synchronization. Teardown walks the
//! same list backwards behind a device-idle barrier and reports each step to
//! the session's [`LogSink`].
//!
//! Frames are paced over `max_frames_in_flight` slots. A slot's fence is waited
//! on before its uniform buffer or command buffer is touched again, so the CPU
//! is never more than N frames ahead of the GPU.

use std::sync::Arc;

use ash::vk;

use crate::core::config::SessionConfig;
use crate::foundation::logging::{LogSink, ScopeTimer};
use crate::foundation::tracking::ResourceLedger;
use crate::platform::PlatformSurface;
use crate::render::vulkan::initialization::debug::ObjectNamer;
use crate::render::vulkan::initialization::device::{DeviceContext, LogicalDevice, PhysicalDeviceInfo};
use crate::render::vulkan::initialization::instance::{InstanceRequest, VulkanInstance};
use crate::render::vulkan::initialization::surface::PresentationSurface;
use crate::render::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::rendering::pipeline::{GraphicsPipeline, PipelineBuilder};
use crate::render::vulkan::rendering::render_pass::RenderPass;
use crate::render::vulkan::rendering::shader::ShaderBlobs;
use crate::render::vulkan::resources::buffer::UniformBuffer;
use crate::render::vulkan::resources::descriptor_set::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
use crate::render::vulkan::resources::mesh::{IndexElement, Mesh, Vertex};
use crate::render::frame::{drive_frame, FrameOutcome, FrameSteps, RecordedFrame};
use crate::render::vulkan::state::swapchain_manager::{
    AcquireOutcome, PresentOutcome, RecreateOutcome, StaleReason, SwapchainManager, SwapchainState,
};
use crate::render::vulkan::state::sync::{FramePacer, FrameSync};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::sink_line;

struct FrameSlot {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    descriptor_set: vk::DescriptorSet,
}

// Fields are listed in creation order; `teardown` consumes them backwards.
struct SessionInner<'p> {
    instance: VulkanInstance,
    surface: PresentationSurface<'p>,
    physical: PhysicalDeviceInfo,
    device: LogicalDevice,
    ctx: DeviceContext,
    namer: ObjectNamer,
    swapchain: SwapchainManager,
    render_pass: RenderPass,
    descriptor_layout: DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    uniforms: Vec<UniformBuffer>,
    pipeline: GraphicsPipeline,
    command_pool: CommandPool,
    frames: Vec<FrameSlot>,
    pacer: FramePacer,
    blobs: ShaderBlobs,
}

/// The one graphics session of a running program
///
/// The session borrows its platform for its whole lifetime and never owns it.
pub struct Session<'p> {
    platform: &'p dyn PlatformSurface,
    config: SessionConfig,
    sink: LogSink,
    ledger: Arc<ResourceLedger>,
    inner: Option<SessionInner<'p>>,
}

impl<'p> Session<'p> {
    /// Bring up every Vulkan object needed to draw into the platform's window
    ///
    /// Any failure unwinds what was already created in reverse order before
    /// the error is returned.
    pub fn new(platform: &'p dyn PlatformSurface, config: &SessionConfig) -> VulkanResult<Self> {
        config.validate().map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let sink = platform.log_sink();
        let ledger = Arc::new(ResourceLedger::new());
        let _timer = ScopeTimer::new(&sink, "session startup");

        // Blobs are read before any device object exists
        let blobs = ShaderBlobs::load(platform, &config.shaders)?;

        let request = InstanceRequest {
            application_name: config.application_name.clone(),
            application_version: config.packed_application_version(),
            api_version: config.api_version,
            enable_validation: config.enable_validation,
            enable_debug_callback: config.enable_debug_callback,
            platform_extensions: platform.required_extensions()?,
        };
        let instance = VulkanInstance::new(&request, &sink, Arc::clone(&ledger))?;
        let surface = PresentationSurface::new(platform, &instance, Arc::clone(&ledger))?;
        let physical = PhysicalDeviceInfo::select(instance.instance(), &surface, config.device_selection, &sink)?;
        let device = LogicalDevice::new(instance.instance(), &physical, Arc::clone(&ledger))?;
        let ctx = device.context();
        let namer = match instance.debug_utils() {
            Some(debug_utils) => ObjectNamer::new(Some(debug_utils.clone()), device.device().handle()),
            None => ObjectNamer::disabled(),
        };

        let mut swapchain =
            SwapchainManager::new(&ctx, device.swapchain_loader(), physical.handle, physical.queue_families());
        swapchain.create_swapchain(&surface, platform.drawable_size()?)?;
        let format = swapchain.swapchain()?.format();

        let render_pass = RenderPass::new(&ctx, format)?;
        namer.name(render_pass.handle(), "session render pass");

        let frames_in_flight = config.max_frames_in_flight;
        let descriptor_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(&ctx)?;
        let descriptor_pool = DescriptorPool::new(&ctx, count_u32(frames_in_flight)?)?;
        let set_layouts = vec![descriptor_layout.handle(); frames_in_flight];
        let descriptor_sets = descriptor_pool.allocate_descriptor_sets(&set_layouts)?;

        let uniforms = (0..frames_in_flight)
            .map(|_| UniformBuffer::new(&ctx, config.uniform_buffer_size))
            .collect::<VulkanResult<Vec<_>>>()?;
        let writer = uniforms
            .iter()
            .zip(&descriptor_sets)
            .fold(DescriptorSetWriter::new(), |writer, (uniform, &set)| {
                writer.write_uniform_buffer(set, 0, uniform.descriptor_info())
            });
        writer.update(&ctx);

        let pipeline = build_pipeline(&ctx, &render_pass, &descriptor_layout, &blobs, config, &sink)?;
        namer.name(pipeline.handle(), "session pipeline");

        swapchain.build_framebuffers(render_pass.handle())?;

        let command_pool = CommandPool::new(&ctx, physical.graphics_family)?;
        let command_buffers = command_pool.allocate_command_buffers(count_u32(frames_in_flight)?)?;

        let mut frames = Vec::with_capacity(frames_in_flight);
        for (slot, (&command_buffer, &descriptor_set)) in command_buffers.iter().zip(&descriptor_sets).enumerate() {
            let sync = FrameSync::new(&ctx)?;
            namer.name(sync.image_available.handle(), &format!("frame[{slot}] image available"));
            namer.name(sync.in_flight.handle(), &format!("frame[{slot}] in flight"));
            namer.name(command_buffer, &format!("frame[{slot}] commands"));
            namer.name(descriptor_set, &format!("frame[{slot}] uniforms set"));
            namer.name(uniforms[slot].buffer().handle(), &format!("frame[{slot}] uniforms"));
            frames.push(FrameSlot { sync, command_buffer, descriptor_set });
        }

        let extent = swapchain.swapchain()?.extent();
        sink_line!(
            sink,
            "vk: session ready on {} with {}x{} {:?}, {} frame(s) in flight",
            physical.name,
            extent.width,
            extent.height,
            format,
            frames_in_flight
        );

        let inner = SessionInner {
            instance,
            surface,
            physical,
            device,
            ctx,
            namer,
            swapchain,
            render_pass,
            descriptor_layout,
            descriptor_pool,
            uniforms,
            pipeline,
            command_pool,
            frames,
            pacer: FramePacer::new(frames_in_flight),
            blobs,
        };

        Ok(Self { platform, config: config.clone(), sink: sink.clone(), ledger, inner: Some(inner) })
    }

    fn inner(&self) -> VulkanResult<&SessionInner<'p>> {
        self.inner.as_ref().ok_or_else(|| VulkanError::invalid("session already torn down"))
    }

    fn inner_mut(&mut self) -> VulkanResult<&mut SessionInner<'p>> {
        self.inner.as_mut().ok_or_else(|| VulkanError::invalid("session already torn down"))
    }

    /// Upload a non-indexed mesh
    pub fn create_mesh(&self, name: &str, vertices: &[Vertex]) -> VulkanResult<Mesh> {
        let inner = self.inner()?;
        let mesh = Mesh::new(&inner.ctx, name, vertices)?;
        inner.namer.name(mesh.vertex_buffer(), &format!("{name} vertices"));
        Ok(mesh)
    }

    /// Upload an indexed mesh
    pub fn create_indexed_mesh<I: IndexElement + Into<u32>>(
        &self,
        name: &str,
        vertices: &[Vertex],
        indices: &[I],
    ) -> VulkanResult<Mesh> {
        let inner = self.inner()?;
        let mesh = Mesh::indexed(&inner.ctx, name, vertices, indices)?;
        inner.namer.name(mesh.vertex_buffer(), &format!("{name} vertices"));
        if let Some(index_buffer) = mesh.index_buffer() {
            inner.namer.name(index_buffer, &format!("{name} indices"));
        }
        Ok(mesh)
    }

    /// Render one frame of `mesh` with `uniforms` copied into this frame's uniform buffer
    ///
    /// A stale swapchain is rebuilt first. Out-of-date and suboptimal
    /// presentation results only mark the swapchain stale.
    pub fn draw_frame(&mut self, mesh: &Mesh, uniforms: &[u8]) -> VulkanResult<FrameOutcome> {
        drive_frame(&mut SessionFrame { session: self, mesh, uniforms })
    }

    /// [`draw_frame`](Self::draw_frame) with a plain-old-data uniform block
    pub fn draw_with<T: bytemuck::Pod>(&mut self, mesh: &Mesh, uniforms: &T) -> VulkanResult<FrameOutcome> {
        self.draw_frame(mesh, bytemuck::bytes_of(uniforms))
    }

    /// The window's drawable size changed; the next frame rebuilds the swapchain
    pub fn notify_resized(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.swapchain.mark_stale(StaleReason::Resized);
        }
    }

    /// Rebuild the swapchain against the current drawable size
    ///
    /// Framebuffers are always rebuilt. The render pass and pipeline are only
    /// rebuilt when the surface format changed.
    pub fn recreate_swapchain(&mut self) -> VulkanResult<RecreateOutcome> {
        let result = self.rebuild_swapchain();
        if result.is_err() {
            // Leave the rebuild pending so the next frame retries it
            if let Some(inner) = self.inner.as_mut() {
                inner.swapchain.mark_stale(StaleReason::Incomplete);
            }
        }
        result
    }

    fn rebuild_swapchain(&mut self) -> VulkanResult<RecreateOutcome> {
        let platform = self.platform;
        let sink = self.sink.clone();
        let config = self.config.clone();
        let inner = self.inner_mut()?;

        let _timer = ScopeTimer::new(&sink, "swapchain recreation");
        let drawable = platform.drawable_size()?;
        let outcome = inner.swapchain.recreate_swapchain(&inner.surface, drawable)?;
        // recreate_swapchain waited for the device to go idle
        inner.pacer.retire_all();

        if let RecreateOutcome::Recreated { format_changed } = outcome {
            let format = inner.swapchain.swapchain()?.format();
            if format_changed {
                sink_line!(sink, "vk: surface format changed to {format:?}, rebuilding render pass and pipeline");
                let render_pass = RenderPass::new(&inner.ctx, format)?;
                let pipeline =
                    build_pipeline(&inner.ctx, &render_pass, &inner.descriptor_layout, &inner.blobs, &config, &sink)?;
                inner.pipeline = pipeline;
                inner.render_pass = render_pass;
                inner.namer.name(inner.render_pass.handle(), "session render pass");
                inner.namer.name(inner.pipeline.handle(), "session pipeline");
            }
            inner.swapchain.build_framebuffers(inner.render_pass.handle())?;
            let extent = inner.swapchain.swapchain()?.extent();
            sink_line!(
                sink,
                "vk: swapchain generation {} at {}x{}",
                inner.swapchain.lifecycle().generation(),
                extent.width,
                extent.height
            );
        }
        Ok(outcome)
    }

    /// Block until every submitted frame has completed
    pub fn wait_idle(&mut self) -> VulkanResult<()> {
        let inner = self.inner_mut()?;
        inner.device.wait_idle()?;
        inner.pacer.retire_all();
        Ok(())
    }

    /// Current swapchain lifecycle state
    pub fn swapchain_state(&self) -> SwapchainState {
        self.inner.as_ref().map_or(SwapchainState::Destroyed, |inner| inner.swapchain.state())
    }

    /// Extent of the live swapchain, if any
    pub fn swapchain_extent(&self) -> Option<(u32, u32)> {
        let inner = self.inner.as_ref()?;
        let extent = inner.swapchain.swapchain().ok()?.extent();
        Some((extent.width, extent.height))
    }

    /// Create/destroy counters for every Vulkan object the session made
    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Size of the frame slot pool
    pub fn frames_in_flight(&self) -> usize {
        self.config.max_frames_in_flight
    }

    /// Frames submitted but not yet fenced
    pub fn in_flight_frames(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.pacer.in_flight())
    }

    /// Name of the selected physical device
    pub fn device_name(&self) -> Option<&str> {
        self.inner.as_ref().map(|inner| inner.physical.name.as_str())
    }

    /// Handles for creating resources outside the session
    pub fn device_context(&self) -> VulkanResult<DeviceContext> {
        Ok(self.inner()?.ctx.clone())
    }

    /// Diagnostics sink shared by the session's components
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    fn teardown(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let sink = &self.sink;

        if let Err(e) = inner.device.wait_idle() {
            log::warn!("wait_idle before teardown failed: {e}");
        }
        sink_line!(sink, "teardown: device idle");

        let SessionInner {
            instance,
            surface,
            physical,
            device,
            ctx,
            namer,
            swapchain,
            render_pass,
            descriptor_layout,
            descriptor_pool,
            uniforms,
            pipeline,
            command_pool,
            frames,
            pacer,
            blobs,
        } = inner;
        drop((pacer, blobs, namer));

        drop(frames);
        sink_line!(sink, "teardown: frame synchronization objects");
        drop(command_pool);
        sink_line!(sink, "teardown: command pool");
        drop(pipeline);
        sink_line!(sink, "teardown: graphics pipeline");
        drop(uniforms);
        sink_line!(sink, "teardown: uniform buffers");
        drop(descriptor_pool);
        sink_line!(sink, "teardown: descriptor pool");
        drop(descriptor_layout);
        sink_line!(sink, "teardown: descriptor set layout");
        drop(swapchain);
        sink_line!(sink, "teardown: framebuffers, image views and swapchain");
        drop(render_pass);
        sink_line!(sink, "teardown: render pass");
        drop(ctx);
        drop(device);
        sink_line!(sink, "teardown: logical device ({})", physical.name);
        drop(surface);
        sink_line!(sink, "teardown: surface");
        drop(instance);
        sink_line!(sink, "teardown: instance");

        if self.ledger.is_balanced() {
            sink_line!(sink, "teardown: every created object was destroyed");
        } else {
            for (kind, live) in self.ledger.outstanding() {
                log::error!("{live} {kind:?} object(s) outlived the session");
                sink_line!(sink, "teardown: {live} {kind:?} still alive");
            }
        }
        sink.flush();
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// One [`Session::draw_frame`] call seen as [`FrameSteps`]
struct SessionFrame<'s, 'p> {
    session: &'s mut Session<'p>,
    mesh: &'s Mesh,
    uniforms: &'s [u8],
}

impl<'p> SessionFrame<'_, 'p> {
    fn inner(&mut self) -> VulkanResult<&mut SessionInner<'p>> {
        self.session.inner_mut()
    }
}

impl FrameSteps for SessionFrame<'_, '_> {
    fn swapchain_stale(&self) -> bool {
        self.session.swapchain_state() == SwapchainState::Stale
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<RecreateOutcome> {
        self.session.recreate_swapchain()
    }

    fn wait_for_slot(&mut self) -> VulkanResult<()> {
        let inner = self.inner()?;
        let slot = inner.pacer.current_slot();
        inner.frames[slot].sync.in_flight.wait(u64::MAX)?;
        inner.pacer.retire(slot);
        Ok(())
    }

    fn acquire(&mut self) -> VulkanResult<AcquireOutcome> {
        let inner = self.inner()?;
        let frame = &inner.frames[inner.pacer.current_slot()];
        inner.swapchain.acquire_next_image(frame.sync.image_available.handle())
    }

    fn write_uniforms(&mut self) -> VulkanResult<()> {
        let uniforms = self.uniforms;
        let inner = self.inner()?;
        let slot = inner.pacer.current_slot();
        inner.uniforms[slot].update(uniforms)
    }

    fn record(&mut self, image_index: u32) -> VulkanResult<RecordedFrame> {
        let clear_color = self.session.config.clear_color;
        let mesh = self.mesh;
        let inner = self.inner()?;
        let frame = &inner.frames[inner.pacer.current_slot()];

        let extent = inner.swapchain.swapchain()?.extent();
        let framebuffer = inner.swapchain.framebuffer(image_index)?;
        let render_finished = inner.swapchain.render_finished(image_index)?;

        let mut recorder = CommandRecorder::begin(inner.device.device(), frame.command_buffer)?;
        {
            let mut pass = recorder.begin_render_pass(inner.render_pass.handle(), framebuffer, extent, clear_color);
            pass.bind_pipeline(inner.pipeline.handle());
            pass.set_full_viewport(extent);
            pass.bind_descriptor_sets(inner.pipeline.layout(), &[frame.descriptor_set]);
            pass.draw_mesh(mesh);
        }
        let command_buffer = recorder.end()?;
        Ok(RecordedFrame { command_buffer, render_finished })
    }

    fn reset_fence(&mut self) -> VulkanResult<()> {
        let inner = self.inner()?;
        inner.frames[inner.pacer.current_slot()].sync.in_flight.reset()
    }

    fn submit(&mut self, recorded: &RecordedFrame) -> VulkanResult<()> {
        let inner = self.inner()?;
        let slot = inner.pacer.current_slot();
        let sync = &inner.frames[slot].sync;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [recorded.command_buffer];
        let signal_semaphores = [recorded.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            inner
                .device
                .device()
                .queue_submit(inner.device.graphics_queue(), &[submit_info], sync.in_flight.handle())
        }
        .map_err(VulkanError::Api)?;
        inner.pacer.mark_submitted(slot);
        debug_assert!(inner.pacer.in_flight() <= inner.pacer.frames_in_flight());
        Ok(())
    }

    fn advance(&mut self) {
        if let Some(inner) = self.session.inner.as_mut() {
            inner.pacer.advance();
        }
    }

    fn present(&mut self, image_index: u32, recorded: &RecordedFrame) -> VulkanResult<PresentOutcome> {
        let inner = self.inner()?;
        inner.swapchain.present(inner.device.present_queue(), image_index, recorded.render_finished)
    }

    fn mark_stale(&mut self, reason: StaleReason) {
        if let Some(inner) = self.session.inner.as_mut() {
            inner.swapchain.mark_stale(reason);
        }
    }
}

fn build_pipeline(
    ctx: &DeviceContext,
    render_pass: &RenderPass,
    descriptor_layout: &DescriptorSetLayout,
    blobs: &ShaderBlobs,
    config: &SessionConfig,
    sink: &LogSink,
) -> VulkanResult<GraphicsPipeline> {
    let cull_mode = if config.cull_back_faces { vk::CullModeFlags::BACK } else { vk::CullModeFlags::NONE };
    PipelineBuilder::new(render_pass.handle())
        .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
        .set_layouts(&[descriptor_layout.handle()])
        .cull_mode(cull_mode)
        .build(ctx, blobs, sink)
}

fn count_u32(count: usize) -> VulkanResult<u32> {
    u32::try_from(count).map_err(|_| VulkanError::invalid(format!("count {count} exceeds u32")))
}
