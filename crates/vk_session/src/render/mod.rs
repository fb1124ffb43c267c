//! Rendering: the graphics session and its Vulkan back end

pub mod frame;
pub mod session;
pub mod vulkan;

pub use frame::FrameOutcome;
pub use session::Session;
