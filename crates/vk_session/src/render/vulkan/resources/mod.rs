//! GPU resources: memory types, buffers, meshes and descriptor sets

pub mod buffer;
pub mod descriptor_set;
pub mod memory;
pub mod mesh;

pub use buffer::{Buffer, BufferSharing, UniformBuffer};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use memory::find_memory_type;
pub use mesh::{IndexBuffer, Mesh, Vertex};
