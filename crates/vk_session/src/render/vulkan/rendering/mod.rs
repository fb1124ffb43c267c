//! Shader modules, pipeline linking, render pass and command recording

pub mod commands;
pub mod pipeline;
pub mod render_pass;
pub mod shader;

pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use pipeline::{GraphicsPipeline, PipelineBuilder, PipelineLayout};
pub use render_pass::RenderPass;
pub use shader::{ShaderBlobs, ShaderModule, ShaderStage};
