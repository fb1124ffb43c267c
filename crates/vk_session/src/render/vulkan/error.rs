//! Vulkan error taxonomy

use ash::vk;
use thiserror::Error;

use crate::platform::PlatformError;
use crate::render::vulkan::rendering::shader::ShaderStage;

/// Vulkan errors
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan call returned an error code
    #[error("Vulkan API error: {0}")]
    Api(vk::Result),

    /// The Vulkan loader library could not be opened
    #[error("Failed to load Vulkan library: {0}")]
    Loading(String),

    /// A required instance layer is not installed
    #[error("Required instance layer not present: {0}")]
    MissingLayer(String),

    /// A required instance extension is not available
    #[error("Required instance extension not present: {0}")]
    MissingExtension(String),

    /// No enumerated physical device passed the suitability checks
    #[error("No suitable physical device among {inspected} candidate(s)")]
    NoSuitableDevice {
        /// How many devices were inspected
        inspected: usize,
    },

    /// The platform failed to create a presentation surface
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// A shader blob was rejected
    #[error("Shader module for {stage} stage failed: {reason}")]
    ShaderModule {
        /// Offending stage
        stage: ShaderStage,
        /// Driver or parser diagnostic
        reason: String,
    },

    /// `vkCreateGraphicsPipelines` failed
    #[error("Pipeline link failed for stages [{stages}]: {result}")]
    PipelineLink {
        /// Stages that were being linked
        stages: String,
        /// Driver result
        result: vk::Result,
    },

    /// No memory type satisfies a resource's requirements
    #[error(
        "No memory type matches allowed types {allowed_types:#b} with properties {required:?}{context}; device memory types: {table}"
    )]
    NoSuitableMemoryType {
        /// Bitmask from `VkMemoryRequirements::memoryTypeBits`
        allowed_types: u32,
        /// Requested property flags
        required: vk::MemoryPropertyFlags,
        /// Size and usage of the request, when known
        context: String,
        /// Rendered memory-type table of the device
        table: String,
    },

    /// Buffer creation or binding failed
    #[error("Buffer creation failed for {size} byte {usage:?} buffer: {result}")]
    BufferCreation {
        /// Requested size
        size: vk::DeviceSize,
        /// Requested usage
        usage: vk::BufferUsageFlags,
        /// Driver result
        result: vk::Result,
    },

    /// Platform collaborator failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Session construction failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Operation not valid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// What was wrong
        reason: String,
    },
}

impl VulkanError {
    /// Attach buffer size and usage to a memory-type failure
    #[must_use]
    pub fn with_allocation_context(self, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        match self {
            Self::NoSuitableMemoryType { allowed_types, required, table, .. } => Self::NoSuitableMemoryType {
                allowed_types,
                required,
                context: format!(" for {size} byte {usage:?} buffer"),
                table,
            },
            other => other,
        }
    }

    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
