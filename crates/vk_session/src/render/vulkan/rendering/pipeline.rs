//! Graphics pipeline linking

use std::ffi::CStr;

use ash::vk;

use super::shader::{ShaderBlobs, ShaderModule, ShaderStage};
use crate::foundation::logging::{LogSink, ScopeTimer};
use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point every stage is compiled with
pub const ENTRY_POINT: &CStr = c"main";

/// States supplied at record time rather than baked into the pipeline
pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Comma-separated stage list used in link diagnostics
pub fn describe_stages(stages: &[ShaderStage]) -> String {
    stages.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Owned pipeline layout
pub struct PipelineLayout {
    ctx: DeviceContext,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout over the given descriptor set layouts, no push constants
    pub fn new(ctx: &DeviceContext, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe { ctx.device().create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;
        ctx.ledger().record_create(ResourceKind::PipelineLayout);
        Ok(Self { ctx: ctx.clone(), layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_pipeline_layout(self.layout, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::PipelineLayout);
    }
}

/// Linked graphics pipeline together with its layout
pub struct GraphicsPipeline {
    ctx: DeviceContext,
    pipeline: vk::Pipeline,
    // Dropped after the pipeline
    layout: PipelineLayout,
}

impl GraphicsPipeline {
    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        log::debug!("destroying graphics pipeline {:?}", self.pipeline);
        unsafe {
            self.ctx.device().destroy_pipeline(self.pipeline, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Pipeline);
    }
}

/// Collects fixed-function state, then links shader blobs into a pipeline
pub struct PipelineBuilder {
    render_pass: vk::RenderPass,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    topology: vk::PrimitiveTopology,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
}

impl PipelineBuilder {
    /// Triangle list, back-face culling, counter-clockwise front faces
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            set_layouts: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }

    /// Vertex buffer layout
    #[must_use]
    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = vec![binding];
        self.vertex_attributes = attributes.to_vec();
        self
    }

    /// Descriptor set layouts, in set order
    #[must_use]
    pub fn set_layouts(mut self, layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = layouts.to_vec();
        self
    }

    /// Face culling
    #[must_use]
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Winding treated as front-facing
    #[must_use]
    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Primitive topology
    #[must_use]
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Compile each blob, link, and release the shader modules
    pub fn build(&self, ctx: &DeviceContext, blobs: &ShaderBlobs, sink: &LogSink) -> VulkanResult<GraphicsPipeline> {
        let _timer = ScopeTimer::new(sink, "pipeline build");

        let modules = blobs
            .stages()
            .into_iter()
            .map(|(stage, bytes)| ShaderModule::from_bytes(ctx, stage, bytes))
            .collect::<VulkanResult<Vec<_>>>()?;
        let stages: Vec<ShaderStage> = modules.iter().map(ShaderModule::stage).collect();
        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> =
            modules.iter().map(|m| m.stage_info(ENTRY_POINT)).collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);

        // Counts only, values come from the command buffer
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder().viewport_count(1).scissor_count(1);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout = PipelineLayout::new(ctx, &self.set_layouts)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            ctx.device().create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| {
            let stages = describe_stages(&stages);
            log::error!("pipeline link failed for [{stages}]: {result}");
            VulkanError::PipelineLink { stages, result }
        })?;
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| VulkanError::InitializationFailed("driver returned no pipeline".to_string()))?;
        ctx.ledger().record_create(ResourceKind::Pipeline);

        // Modules are link-time only
        drop(modules);
        sink.line(format_args!("linked pipeline from {} stage(s): {}", stages.len(), describe_stages(&stages)));

        Ok(GraphicsPipeline { ctx: ctx.clone(), pipeline, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_stages() {
        assert_eq!(describe_stages(&[ShaderStage::Vertex, ShaderStage::Fragment]), "vertex, fragment");
        assert_eq!(describe_stages(&[]), "");
    }

    #[test]
    fn test_builder_defaults() {
        let builder = PipelineBuilder::new(vk::RenderPass::null());
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);

        let builder = builder.cull_mode(vk::CullModeFlags::NONE).set_layouts(&[vk::DescriptorSetLayout::null()]);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(builder.set_layouts.len(), 1);
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert_eq!(ENTRY_POINT.to_bytes(), b"main");
    }
}
