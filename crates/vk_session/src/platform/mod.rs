//! Platform surface provider
//!
//! The session consumes a windowing back end through [`PlatformSurface`]: the
//! instance extensions it needs, a presentation surface bracket, the drawable
//! size, a diagnostics sink and a raw file loader for shader blobs. The session
//! borrows the platform and never owns it.

pub mod window;

use std::path::{Path, PathBuf};

use ash::extensions::khr;
use ash::vk;
use thiserror::Error;

use crate::foundation::logging::LogSink;

/// Platform collaborator failures
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Windowing system could not start
    #[error("Platform initialization failed: {0}")]
    InitializationFailed(String),

    /// Window creation failed
    #[error("Window creation failed: {0}")]
    WindowCreation(String),

    /// Presentation extensions could not be determined
    #[error("Required instance extensions unavailable: {0}")]
    Extensions(String),

    /// Surface creation returned an error code
    #[error("Surface creation failed: {0}")]
    Surface(vk::Result),

    /// Drawable size query failed
    #[error("Drawable size query failed: {0}")]
    DrawableSize(String),

    /// A file could not be read
    #[error("Can't read file '{}': {source}", path.display())]
    FileRead {
        /// Requested path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Windowing back end consumed by the session
pub trait PlatformSurface {
    /// Instance extensions the platform needs for presentation
    fn required_extensions(&self) -> PlatformResult<Vec<String>>;

    /// Create a presentation surface for the platform's window
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> PlatformResult<vk::SurfaceKHR>;

    /// Destroy a surface previously returned by [`create_surface`](Self::create_surface)
    fn destroy_surface(&self, surface_loader: &khr::Surface, surface: vk::SurfaceKHR) {
        unsafe { surface_loader.destroy_surface(surface, None) };
    }

    /// Current window backing-buffer size in pixels
    fn drawable_size(&self) -> PlatformResult<(u32, u32)>;

    /// Diagnostics sink for the session
    fn log_sink(&self) -> LogSink;

    /// Raw bytes of a file
    fn read_file(&self, path: &Path) -> PlatformResult<Vec<u8>> {
        read_file(path)
    }
}

/// Read a whole file, reporting the path on failure
pub fn read_file(path: &Path) -> PlatformResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| PlatformError::FileRead { path: path.to_path_buf(), source })
}

/// Keys the session layer distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Escape
    Escape,
    /// Space bar
    Space,
    /// F5, used as the reload key
    F5,
    /// Any other key by its back-end code
    Other(i32),
}

/// Window events forwarded to game units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// The user asked to close the window
    CloseRequested,
    /// A key went down
    KeyPressed(KeyCode),
    /// A key went up
    KeyReleased(KeyCode),
    /// The drawable size changed
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
}
