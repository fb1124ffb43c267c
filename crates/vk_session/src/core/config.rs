//! # Session Configuration
//!
//! All configuration structures consumed by the session and its host binary.
//!
//! - **Shader Config**: compiled SPIR-V blob locations per pipeline stage
//! - **Window Config**: window title, size and high pixel density mode
//! - **Session Config**: API version, validation, frames in flight and device policy
//! - **Engine Config**: logging behaviour of the host process
//!
//! Every structure is serde-serializable and loads through [`Config`] from
//! TOML or RON files.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ash::vk;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Target Vulkan API version in `major.minor` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
}

impl ApiVersion {
    /// Largest major number `VK_MAKE_API_VERSION` can hold (7 bits)
    pub const MAX_MAJOR: u32 = 0x7F;
    /// Largest minor number `VK_MAKE_API_VERSION` can hold (10 bits)
    pub const MAX_MINOR: u32 = 0x3FF;

    /// Vulkan 1.0
    pub const V1_0: Self = Self::new(1, 0);
    /// Vulkan 1.3
    pub const V1_3: Self = Self::new(1, 3);

    /// Create a version
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Packed version number for `VkApplicationInfo::apiVersion`
    pub fn to_vk(self) -> u32 {
        vk::make_api_version(0, self.major, self.minor, 0)
    }

    /// Unpack major/minor from a packed Vulkan version, dropping the patch level
    pub fn from_vk(packed: u32) -> Self {
        Self::new(vk::api_version_major(packed), vk::api_version_minor(packed))
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::V1_3
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(bad)?;
        let major: u32 = major.parse().map_err(|_| bad())?;
        let minor: u32 = minor.parse().map_err(|_| bad())?;
        if major == 0 || major > Self::MAX_MAJOR || minor > Self::MAX_MINOR {
            return Err(bad());
        }
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(value: ApiVersion) -> Self {
        value.to_string()
    }
}

/// How the device selector chooses between several suitable physical devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceSelectionPolicy {
    /// First suitable device in enumeration order
    #[default]
    FirstSuitable,
    /// Highest device-type score, enumeration order breaks ties
    PreferDiscrete,
}

/// # Shader Configuration
///
/// Locations of compiled SPIR-V blobs. Blobs are read through the platform's
/// file contract when the pipeline is built, never at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
    /// Optional geometry shader SPIR-V file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_shader_path: Option<String>,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
            geometry_shader_path: None,
        }
    }

    /// Add a geometry stage
    #[must_use]
    pub fn with_geometry(mut self, geometry_path: impl Into<String>) -> Self {
        self.geometry_shader_path = Some(geometry_path.into());
        self
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the usual shader output folders so the binary can be launched
    /// from the workspace root or from its own crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "resources/shaders/",
            "./",
        ];

        let resolve = |name: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("{}{name}", shader_dirs[0]))
        };

        Self::new(resolve(base_vertex), resolve(base_fragment))
    }

    /// Reject blank paths; the files themselves are read by the platform at session start
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("vertex", Some(&self.vertex_shader_path)),
            ("fragment", Some(&self.fragment_shader_path)),
            ("geometry", self.geometry_shader_path.as_ref()),
        ];
        for (stage, path) in paths {
            if path.is_some_and(|path| path.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{stage} shader path is empty")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("quad.vert.spv", "quad.frag.spv")
    }
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Request a framebuffer scaled to the monitor's content scale
    pub high_pixel_density: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk_session".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            high_pixel_density: false,
        }
    }
}

impl WindowConfig {
    /// Reject zero-sized windows
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Settings for one graphics session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Application version as (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Requested Vulkan API version
    pub api_version: ApiVersion,
    /// Require the Khronos validation layer
    pub enable_validation: bool,
    /// Attach a debug-utils messenger and label created objects
    pub enable_debug_callback: bool,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Physical device selection policy
    pub device_selection: DeviceSelectionPolicy,
    /// Size in bytes of each per-frame uniform buffer
    pub uniform_buffer_size: u64,
    /// Cull back faces in the graphics pipeline
    pub cull_back_faces: bool,
    /// Clear color of the color attachment
    pub clear_color: [f32; 4],
    /// Compiled shader locations
    pub shaders: ShaderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_name: "vk_session".to_string(),
            application_version: (0, 1, 0),
            api_version: ApiVersion::default(),
            enable_validation: false,
            enable_debug_callback: false,
            max_frames_in_flight: 2,
            device_selection: DeviceSelectionPolicy::default(),
            uniform_buffer_size: 192,
            cull_back_faces: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.trim().is_empty() {
            return Err(ConfigError::Invalid("application name must not be empty".to_string()));
        }
        if !(1..=8).contains(&self.max_frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "max_frames_in_flight must be within 1..=8, got {}",
                self.max_frames_in_flight
            )));
        }
        if self.uniform_buffer_size == 0 {
            return Err(ConfigError::Invalid("uniform_buffer_size must be non-zero".to_string()));
        }
        self.shaders.validate()
    }

    /// Packed application version for `VkApplicationInfo`
    pub fn packed_application_version(&self) -> u32 {
        let (major, minor, patch) = self.application_version;
        vk::make_api_version(0, major, minor, patch)
    }
}

/// Host process behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `env_logger` level: off, error, warn, info, debug or trace
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

impl EngineConfig {
    /// Parsed level filter
    pub fn level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }
}

/// Everything a host binary loads from one configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Host process settings
    pub engine: EngineConfig,
    /// Window settings
    pub window: WindowConfig,
    /// Graphics session settings
    pub session: SessionConfig,
}

impl Config for ApplicationConfig {}
impl Config for SessionConfig {}

impl ApplicationConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.level_filter()?;
        self.window.validate()?;
        self.session.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_parsing() {
        assert_eq!("1.3".parse::<ApiVersion>().unwrap(), ApiVersion::V1_3);
        assert_eq!(" 1.0 ".parse::<ApiVersion>().unwrap(), ApiVersion::V1_0);
        assert_eq!("2.15".parse::<ApiVersion>().unwrap(), ApiVersion::new(2, 15));

        for bad in ["", "1", "1.", ".3", "a.b", "1.3.2", "0.9", "-1.2", "1.1024", "128.0", "200.0"] {
            let err = bad.parse::<ApiVersion>().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidVersion(ref s) if s == bad), "{bad}");
        }
    }

    #[test]
    fn test_api_version_limits_survive_packing() {
        let widest = format!("{}.{}", ApiVersion::MAX_MAJOR, ApiVersion::MAX_MINOR);
        let version = widest.parse::<ApiVersion>().unwrap();
        let packed = version.to_vk();
        assert_eq!(vk::api_version_variant(packed), 0);
        assert_eq!(ApiVersion::from_vk(packed), version);
    }

    #[test]
    fn test_api_version_packing() {
        let packed = ApiVersion::new(1, 2).to_vk();
        assert_eq!(vk::api_version_major(packed), 1);
        assert_eq!(vk::api_version_minor(packed), 2);
        assert_eq!(ApiVersion::from_vk(vk::make_api_version(0, 1, 3, 250)), ApiVersion::V1_3);
        assert_eq!(ApiVersion::new(1, 2).to_string(), "1.2");
    }

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::default().validate().is_ok());

        let mut config = SessionConfig { max_frames_in_flight: 0, ..SessionConfig::default() };
        assert!(config.validate().is_err());
        config.max_frames_in_flight = 9;
        assert!(config.validate().is_err());
        config.max_frames_in_flight = 3;
        config.application_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shader_paths_must_not_be_blank() {
        let shaders = ShaderConfig::new("missing/quad.vert.spv", "missing/quad.frag.spv");
        assert!(shaders.validate().is_ok());

        let config = SessionConfig { shaders: ShaderConfig::new("", "quad.frag.spv"), ..SessionConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("vertex shader path is empty"), "{err}");

        let shaders = ShaderConfig::new("quad.vert.spv", "quad.frag.spv").with_geometry(" ");
        assert!(shaders.validate().is_err());
    }

    #[test]
    fn test_engine_level_filter() {
        let engine = EngineConfig { log_level: "debug".to_string() };
        assert_eq!(engine.level_filter().unwrap(), log::LevelFilter::Debug);
        let engine = EngineConfig { log_level: "loud".to_string() };
        assert!(engine.level_filter().is_err());
    }

    #[test]
    fn test_window_validation() {
        assert!(WindowConfig::default().validate().is_ok());
        let window = WindowConfig { height: 0, ..WindowConfig::default() };
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_version_string() {
        let config = ApplicationConfig::default();
        let text = config.to_text(crate::config::ConfigFormat::Toml).unwrap();
        assert!(text.contains("api_version = \"1.3\""));
        let parsed = ApplicationConfig::from_text(&text, crate::config::ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = "[session]\nenable_validation = true\napi_version = \"1.1\"\n";
        let parsed = ApplicationConfig::from_text(text, crate::config::ConfigFormat::Toml).unwrap();
        assert!(parsed.session.enable_validation);
        assert_eq!(parsed.session.api_version, ApiVersion::new(1, 1));
        assert_eq!(parsed.session.max_frames_in_flight, 2);
        assert_eq!(parsed.window, WindowConfig::default());
    }
}
