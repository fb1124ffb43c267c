//! Device buffers with bound memory
//!
//! A [`Buffer`] owns a `VkBuffer` and the `VkDeviceMemory` bound to it. The
//! memory type is chosen with [`find_memory_type`] from the buffer's
//! requirements and the requested property flags, memory is bound before any
//! data is written, and both objects are released in `Drop`.

use std::ptr;

use ash::vk;

use super::memory::find_memory_type;
use crate::foundation::tracking::ResourceKind;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Queue family sharing of a buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BufferSharing {
    /// Owned by one queue family at a time
    #[default]
    Exclusive,
    /// Shared between the listed queue families
    Concurrent(Vec<u32>),
}

/// Host-visible, host-coherent memory
pub fn host_visible_coherent() -> vk::MemoryPropertyFlags {
    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
}

/// Buffer and its memory
pub struct Buffer {
    ctx: DeviceContext,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_type_index: u32,
    mapped: *mut u8,
}

impl Buffer {
    /// Create a buffer, pick a memory type, allocate and bind
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        sharing: &BufferSharing,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid(format!("zero-sized {usage:?} buffer")));
        }

        let mut buffer_info = vk::BufferCreateInfo::builder().size(size).usage(usage);
        buffer_info = match sharing {
            BufferSharing::Exclusive => buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE),
            BufferSharing::Concurrent(families) => buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(families),
        };

        let buffer = unsafe {
            ctx.device()
                .create_buffer(&buffer_info, None)
                .map_err(|result| VulkanError::BufferCreation { size, usage, result })?
        };
        ctx.ledger().record_create(ResourceKind::Buffer);

        // Any early return below drops `this`, releasing what exists so far
        let mut this = Self {
            ctx: ctx.clone(),
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
            usage,
            memory_type_index: 0,
            mapped: ptr::null_mut(),
        };

        let requirements = unsafe { ctx.device().get_buffer_memory_requirements(buffer) };
        this.memory_type_index = find_memory_type(ctx.memory_properties(), requirements.memory_type_bits, properties)
            .map_err(|e| e.with_allocation_context(size, usage))?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(this.memory_type_index);

        this.memory = unsafe {
            ctx.device()
                .allocate_memory(&alloc_info, None)
                .map_err(|result| VulkanError::BufferCreation { size, usage, result })?
        };
        ctx.ledger().record_create(ResourceKind::DeviceMemory);

        unsafe {
            ctx.device()
                .bind_buffer_memory(buffer, this.memory, 0)
                .map_err(|result| VulkanError::BufferCreation { size, usage, result })?;
        }

        log::trace!("Buffer {size} bytes {usage:?} in memory type {}", this.memory_type_index);
        Ok(this)
    }

    /// Create a host-visible buffer and fill it with `bytes`
    pub fn with_data(
        ctx: &DeviceContext,
        usage: vk::BufferUsageFlags,
        sharing: &BufferSharing,
        bytes: &[u8],
    ) -> VulkanResult<Self> {
        let mut buffer = Self::new(ctx, bytes.len() as vk::DeviceSize, usage, sharing, host_visible_coherent())?;
        buffer.write_bytes(0, bytes)?;
        Ok(buffer)
    }

    /// Keep the whole buffer mapped until [`unmap`](Self::unmap) or drop
    pub fn map(&mut self) -> VulkanResult<()> {
        if self.mapped.is_null() {
            let ptr = unsafe {
                self.ctx
                    .device()
                    .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                    .map_err(VulkanError::Api)?
            };
            self.mapped = ptr.cast::<u8>();
        }
        Ok(())
    }

    /// Release a persistent mapping
    pub fn unmap(&mut self) {
        if !self.mapped.is_null() {
            unsafe { self.ctx.device().unmap_memory(self.memory) };
            self.mapped = ptr::null_mut();
        }
    }

    /// Whether the buffer is persistently mapped
    pub fn is_mapped(&self) -> bool {
        !self.mapped.is_null()
    }

    /// Copy bytes into the buffer at `offset`
    ///
    /// Uses the persistent mapping when present, otherwise maps for the copy.
    /// The memory must be host-visible and host-coherent.
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> VulkanResult<()> {
        let end = offset.checked_add(bytes.len() as vk::DeviceSize);
        if end.map_or(true, |end| end > self.size) {
            return Err(VulkanError::invalid(format!(
                "write of {} bytes at offset {offset} exceeds {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        let transient = !self.is_mapped();
        self.map()?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.add(offset as usize), bytes.len());
        }
        if transient {
            self.unmap();
        }
        Ok(())
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Selected memory type index
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.ctx.device().destroy_buffer(self.buffer, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::Buffer);
        if self.memory != vk::DeviceMemory::null() {
            unsafe {
                self.ctx.device().free_memory(self.memory, None);
            }
            self.ctx.ledger().record_destroy(ResourceKind::DeviceMemory);
        }
    }
}

/// Persistently mapped uniform buffer for one frame slot
pub struct UniformBuffer {
    buffer: Buffer,
}

impl UniformBuffer {
    /// Allocate and map a host-visible uniform buffer
    pub fn new(ctx: &DeviceContext, size: vk::DeviceSize) -> VulkanResult<Self> {
        let mut buffer = Buffer::new(
            ctx,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &BufferSharing::Exclusive,
            host_visible_coherent(),
        )?;
        buffer.map()?;
        Ok(Self { buffer })
    }

    /// Overwrite the leading bytes of the buffer
    pub fn update(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        self.buffer.write_bytes(0, bytes)
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo { buffer: self.buffer.handle(), offset: 0, range: self.buffer.size() }
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}
