//! Core session types shared across subsystems

pub mod config;

pub use config::{
    ApiVersion, ApplicationConfig, DeviceSelectionPolicy, EngineConfig, SessionConfig,
    ShaderConfig, WindowConfig,
};
