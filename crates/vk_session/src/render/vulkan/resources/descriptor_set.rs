//! Descriptor set layout, pool and buffer writes

use ash::vk;

use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Collects bindings for a descriptor set layout
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Create the layout
    pub fn build(self, ctx: &DeviceContext) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { ctx.device().create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;
        ctx.ledger().record_create(ResourceKind::DescriptorSetLayout);

        Ok(DescriptorSetLayout { ctx: ctx.clone(), layout })
    }
}

/// Owned descriptor set layout
pub struct DescriptorSetLayout {
    ctx: DeviceContext,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_descriptor_set_layout(self.layout, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::DescriptorSetLayout);
    }
}

/// Pool for uniform-buffer descriptor sets; sets die with the pool
pub struct DescriptorPool {
    ctx: DeviceContext,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Pool holding `max_sets` sets of one uniform buffer each
    pub fn new(ctx: &DeviceContext, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(max_sets)
            .build()];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { ctx.device().create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;
        ctx.ledger().record_create(ResourceKind::DescriptorPool);

        Ok(Self { ctx: ctx.clone(), pool })
    }

    /// Allocate one set per layout entry
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.ctx.device().allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device().destroy_descriptor_pool(self.pool, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::DescriptorPool);
    }
}

/// Batches uniform-buffer writes into one `vkUpdateDescriptorSets`
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<(vk::DescriptorSet, u32, vk::DescriptorBufferInfo)>,
}

impl DescriptorSetWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform-buffer binding at a buffer range
    #[must_use]
    pub fn write_uniform_buffer(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.pending.push((set, binding, info));
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit all writes
    pub fn update(self, ctx: &DeviceContext) {
        // Buffer infos stay in `self.pending` while the writes point into it
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|(set, binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();

        unsafe { ctx.device().update_descriptor_sets(&writes, &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_queues_writes() {
        let info = vk::DescriptorBufferInfo { buffer: vk::Buffer::null(), offset: 0, range: 192 };
        let writer = DescriptorSetWriter::new()
            .write_uniform_buffer(vk::DescriptorSet::null(), 0, info)
            .write_uniform_buffer(vk::DescriptorSet::null(), 0, info);
        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
    }
}
