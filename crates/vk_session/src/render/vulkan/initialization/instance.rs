//! Capability negotiation and instance creation
//!
//! The instance extension list is the union of what the platform needs for
//! presentation and, when the debug callback is requested, `VK_EXT_debug_utils`.
//! Every requested layer and extension is checked against what the loader
//! enumerates before `vkCreateInstance` is called, so a shortfall fails with a
//! message naming the missing capability.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};

use super::debug::DebugMessenger;
use crate::core::config::ApiVersion;
use crate::foundation::logging::LogSink;
use crate::foundation::tracking::{ResourceKind, ResourceLedger};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::sink_line;

/// Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Everything the negotiator needs to build an instance
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    /// Application name reported to the driver
    pub application_name: String,
    /// Packed application version
    pub application_version: u32,
    /// Requested API version
    pub api_version: ApiVersion,
    /// Require and enable the validation layer
    pub enable_validation: bool,
    /// Enable debug utils and register a messenger
    pub enable_debug_callback: bool,
    /// Extensions the platform needs for presentation
    pub platform_extensions: Vec<String>,
}

impl InstanceRequest {
    /// Instance extensions to enable, platform ones first, without duplicates
    pub fn extension_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.platform_extensions.len() + 1);
        for name in &self.platform_extensions {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        if self.enable_debug_callback {
            let debug_utils = DebugUtils::name().to_string_lossy().into_owned();
            if !names.contains(&debug_utils) {
                names.push(debug_utils);
            }
        }
        names
    }

    /// Instance layers to enable
    pub fn layer_names(&self) -> Vec<String> {
        if self.enable_validation {
            vec![VALIDATION_LAYER.to_string()]
        } else {
            Vec::new()
        }
    }
}

/// First required name missing from the available list
pub fn find_missing<'a>(required: &'a [String], available: &[String]) -> Option<&'a str> {
    required
        .iter()
        .find(|name| !available.contains(name))
        .map(String::as_str)
}

fn c_name(raw: &[c_char]) -> String {
    // Driver-filled fixed arrays are NUL terminated
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned()
}

fn to_cstrings(names: &[String]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| CString::new(name.as_str()).map_err(|_| VulkanError::invalid(format!("name contains NUL: {name:?}"))))
        .collect()
}

/// Loader entry, instance and optional debug messenger
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug_messenger: Option<DebugMessenger>,
    ledger: Arc<ResourceLedger>,
}

impl VulkanInstance {
    /// Load Vulkan, verify the requested capabilities and create the instance
    pub fn new(request: &InstanceRequest, sink: &LogSink, ledger: Arc<ResourceLedger>) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| VulkanError::Loading(e.to_string()))?;

        let available_extensions: Vec<String> = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| c_name(&ext.extension_name))
            .collect();
        sink_line!(sink, "vk: instance extensions ({}):", available_extensions.len());
        for name in &available_extensions {
            sink_line!(sink, "    {name}");
        }

        let extensions = request.extension_names();
        if let Some(missing) = find_missing(&extensions, &available_extensions) {
            return Err(VulkanError::MissingExtension(missing.to_string()));
        }

        let layers = request.layer_names();
        if !layers.is_empty() {
            let available_layers: Vec<String> = unsafe { entry.enumerate_instance_layer_properties() }
                .map_err(VulkanError::Api)?
                .iter()
                .map(|layer| c_name(&layer.layer_name))
                .collect();
            sink_line!(sink, "vk: instance layers ({}):", available_layers.len());
            for name in &available_layers {
                sink_line!(sink, "    {name}");
            }
            if let Some(missing) = find_missing(&layers, &available_layers) {
                return Err(VulkanError::MissingLayer(missing.to_string()));
            }
        }

        let loader_version = unsafe { entry.try_enumerate_instance_version() }
            .map_err(VulkanError::Api)?
            .map_or(ApiVersion::V1_0, ApiVersion::from_vk);
        sink_line!(sink, "vk: requested api {} loader supports {}", request.api_version, loader_version);
        if request.api_version > loader_version {
            log::warn!("Requested Vulkan {} but the loader supports {}", request.api_version, loader_version);
        }

        let app_name = CString::new(request.application_name.as_str())
            .map_err(|_| VulkanError::invalid("application name contains NUL"))?;
        let engine_name = CString::new("vk_session").map_err(|_| VulkanError::invalid("engine name contains NUL"))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(request.application_version)
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(request.api_version.to_vk());

        let extension_cstrings = to_cstrings(&extensions)?;
        let extension_ptrs: Vec<*const c_char> = extension_cstrings.iter().map(|name| name.as_ptr()).collect();
        let layer_cstrings = to_cstrings(&layers)?;
        let layer_ptrs: Vec<*const c_char> = layer_cstrings.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };
        ledger.record_create(ResourceKind::Instance);
        log::info!(
            "Created Vulkan {} instance with {} extension(s) and {} layer(s)",
            request.api_version,
            extensions.len(),
            layers.len()
        );

        let mut this = Self { entry, instance, debug_messenger: None, ledger };

        if request.enable_debug_callback {
            let loader = DebugUtils::new(&this.entry, &this.instance);
            // On failure `this` drops and destroys the instance
            this.debug_messenger = Some(DebugMessenger::new(loader, sink.clone(), Arc::clone(&this.ledger))?);
        }

        Ok(this)
    }

    /// Loader entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance function table
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Debug-utils table when the debug callback is enabled
    pub fn debug_utils(&self) -> Option<&DebugUtils> {
        self.debug_messenger.as_ref().map(DebugMessenger::loader)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        self.debug_messenger = None;
        unsafe {
            self.instance.destroy_instance(None);
        }
        self.ledger.record_destroy(ResourceKind::Instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(platform: &[&str], validation: bool, debug: bool) -> InstanceRequest {
        InstanceRequest {
            application_name: "test".to_string(),
            application_version: 0,
            api_version: ApiVersion::V1_3,
            enable_validation: validation,
            enable_debug_callback: debug,
            platform_extensions: platform.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_extension_list_is_platform_union_debug() {
        let names = request(&["VK_KHR_surface", "VK_KHR_xcb_surface"], false, true).extension_names();
        assert_eq!(names, vec!["VK_KHR_surface", "VK_KHR_xcb_surface", "VK_EXT_debug_utils"]);

        let names = request(&["VK_KHR_surface", "VK_KHR_surface"], false, false).extension_names();
        assert_eq!(names, vec!["VK_KHR_surface"]);

        let names = request(&["VK_EXT_debug_utils"], false, true).extension_names();
        assert_eq!(names, vec!["VK_EXT_debug_utils"]);
    }

    #[test]
    fn test_layers_follow_validation_flag() {
        assert!(request(&[], false, true).layer_names().is_empty());
        assert_eq!(request(&[], true, false).layer_names(), vec![VALIDATION_LAYER]);
    }

    #[test]
    fn test_find_missing_reports_first_absent_name() {
        let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let available = vec!["c".to_string(), "a".to_string()];
        assert_eq!(find_missing(&required, &available), Some("b"));
        assert_eq!(find_missing(&required[..1], &available), None);
        assert_eq!(find_missing(&[], &available), None);
    }
}
