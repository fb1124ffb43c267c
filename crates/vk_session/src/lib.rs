//! # vk_session
//!
//! A Vulkan graphics session manager. A [`Session`](render::Session) negotiates
//! instance capabilities, picks a physical device, creates the logical device and
//! its queues, keeps a swapchain sized to the window surface, allocates vertex and
//! per-frame uniform buffers, and drives a paced frame loop that recreates the
//! swapchain whenever presentation reports it stale.
//!
//! ## Features
//!
//! - **Explicit diagnostics**: every component writes to a [`LogSink`](foundation::logging::LogSink)
//!   handed down from the platform, there is no global diagnostic writer
//! - **Scoped GPU handles**: each Vulkan object is owned by a wrapper whose `Drop`
//!   destroys it, and a [`ResourceLedger`](foundation::tracking::ResourceLedger)
//!   verifies every create was matched by exactly one destroy
//! - **Configurable device selection**: first suitable device or discrete-GPU preference
//! - **Reloadable game units**: a narrow [`Game`](game::Game) boundary that can be
//!   swapped at runtime without touching session GPU state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_session::prelude::*;
//!
//! fn run(platform: &GlfwPlatform, config: &SessionConfig) -> Result<(), VulkanError> {
//!     let mut session = Session::new(platform, config)?;
//!     let quad = [
//!         Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0]),
//!         Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
//!         Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
//!     ];
//!     let mesh = session.create_mesh("triangle", &quad)?;
//!     let uniforms = [0u8; 192];
//!     session.draw_frame(&mesh, &uniforms)?;
//!     session.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod game;
pub mod platform;
pub mod render;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigError};
    pub use crate::core::config::{
        ApiVersion, ApplicationConfig, DeviceSelectionPolicy, EngineConfig, SessionConfig,
        ShaderConfig, WindowConfig,
    };
    pub use crate::foundation::logging::{LogSink, ScopeTimer};
    pub use crate::foundation::tracking::{ResourceKind, ResourceLedger};
    pub use crate::game::{Game, GameContext, GameError, GameHost, GameLoader};
    pub use crate::game::loader::{DynamicGameLoader, StaticGameLoader};
    pub use crate::platform::window::GlfwPlatform;
    pub use crate::platform::{InputEvent, KeyCode, PlatformError, PlatformSurface};
    pub use crate::render::vulkan::resources::mesh::{Mesh, Vertex};
    pub use crate::render::vulkan::{VulkanError, VulkanResult};
    pub use crate::render::{FrameOutcome, Session};
}
