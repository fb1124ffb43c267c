//! Meshes: vertex data with an optional index buffer

use std::mem;

use ash::vk;

use super::buffer::{Buffer, BufferSharing};
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Position and color of one vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Linear RGB color
    pub color: [f32; 3],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    /// Single interleaved binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Location 0 position, location 1 color
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: mem::offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: mem::offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// Integer types usable as indices
pub trait IndexElement: bytemuck::Pod {
    /// Matching Vulkan index type
    const INDEX_TYPE: vk::IndexType;
}

impl IndexElement for u16 {
    const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;
}

impl IndexElement for u32 {
    const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT32;
}

/// Index buffer with its element type
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
    index_type: vk::IndexType,
}

impl IndexBuffer {
    /// Upload indices
    pub fn new<I: IndexElement>(ctx: &DeviceContext, indices: &[I]) -> VulkanResult<Self> {
        let buffer = Buffer::with_data(
            ctx,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &BufferSharing::Exclusive,
            bytemuck::cast_slice(indices),
        )?;
        Ok(Self { buffer, index_count: count_u32(indices.len())?, index_type: I::INDEX_TYPE })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Element type
    pub fn index_type(&self) -> vk::IndexType {
        self.index_type
    }
}

fn count_u32(len: usize) -> VulkanResult<u32> {
    u32::try_from(len).map_err(|_| VulkanError::invalid(format!("{len} elements exceed a u32 draw count")))
}

/// Vertex buffer plus optional index buffer
pub struct Mesh {
    name: String,
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<IndexBuffer>,
}

impl Mesh {
    /// Upload a non-indexed mesh
    pub fn new(ctx: &DeviceContext, name: impl Into<String>, vertices: &[Vertex]) -> VulkanResult<Self> {
        if vertices.is_empty() {
            return Err(VulkanError::invalid("mesh without vertices"));
        }
        let vertex_buffer = Buffer::with_data(
            ctx,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &BufferSharing::Exclusive,
            bytemuck::cast_slice(vertices),
        )?;
        Ok(Self {
            name: name.into(),
            vertex_buffer,
            vertex_count: count_u32(vertices.len())?,
            index_buffer: None,
        })
    }

    /// Upload an indexed mesh
    pub fn indexed<I: IndexElement + Into<u32>>(
        ctx: &DeviceContext,
        name: impl Into<String>,
        vertices: &[Vertex],
        indices: &[I],
    ) -> VulkanResult<Self> {
        if let Some(&out_of_range) = indices.iter().find(|&&index| Into::<u32>::into(index) as usize >= vertices.len()) {
            return Err(VulkanError::invalid(format!(
                "index {} out of range for {} vertices",
                Into::<u32>::into(out_of_range),
                vertices.len()
            )));
        }
        let mut mesh = Self::new(ctx, name, vertices)?;
        if !indices.is_empty() {
            mesh.index_buffer = Some(IndexBuffer::new(ctx, indices)?);
        }
        Ok(mesh)
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Index buffer handle if indexed
    pub fn index_buffer(&self) -> Option<vk::Buffer> {
        self.index_buffer.as_ref().map(IndexBuffer::handle)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Record binds and the draw call into a command buffer inside a render pass
    pub fn record_draw(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.handle()], &[0]);
            match &self.index_buffer {
                Some(indices) => {
                    device.cmd_bind_index_buffer(command_buffer, indices.handle(), 0, indices.index_type());
                    device.cmd_draw_indexed(command_buffer, indices.index_count(), 1, 0, 0, 0);
                }
                None => device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0),
            }
        }
    }
}
