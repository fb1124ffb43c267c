//! Debug-utils messenger and object labels
//!
//! The messenger forwards validation output to the session's [`LogSink`] as
//! well as to the `log` facade. Object names set through [`ObjectNamer`] show
//! up in those messages and in external debuggers.

use std::ffi::{c_void, CStr, CString};
use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::vk;

use crate::foundation::logging::LogSink;
use crate::foundation::tracking::{ResourceKind, ResourceLedger};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Owned `VkDebugUtilsMessengerEXT` bound to a diagnostics sink
pub struct DebugMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
    // Read by the callback through the user-data pointer; boxed so the address
    // stays fixed while the messenger lives.
    _sink: Box<LogSink>,
    ledger: Arc<ResourceLedger>,
}

impl DebugMessenger {
    /// Register a messenger reporting verbose through error severities
    pub fn new(loader: DebugUtils, sink: LogSink, ledger: Arc<ResourceLedger>) -> VulkanResult<Self> {
        let sink = Box::new(sink);
        let user_data = std::ptr::addr_of!(*sink).cast_mut().cast::<c_void>();

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let handle = unsafe {
            loader
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        ledger.record_create(ResourceKind::DebugMessenger);

        Ok(Self { loader, handle, _sink: sink, ledger })
    }

    /// The debug-utils function table
    pub fn loader(&self) -> &DebugUtils {
        &self.loader
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
        self.ledger.record_destroy(ResourceKind::DebugMessenger);
    }
}

/// Short severity label
pub fn severity_label(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &'static str {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        "error"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        "warning"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        "info"
    } else {
        "verbose"
    }
}

/// Comma separated message type labels
pub fn type_label(types: vk::DebugUtilsMessageTypeFlagsEXT) -> String {
    let labels: Vec<&str> = [
        (vk::DebugUtilsMessageTypeFlagsEXT::GENERAL, "general"),
        (vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION, "validation"),
        (vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE, "performance"),
    ]
    .into_iter()
    .filter(|(flag, _)| types.contains(*flag))
    .map(|(_, label)| label)
    .collect();

    if labels.is_empty() {
        "unknown".to_string()
    } else {
        labels.join(",")
    }
}

/// An object referenced by a debug message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedObject {
    /// Object type
    pub object_type: vk::ObjectType,
    /// Raw handle value
    pub handle: u64,
    /// Debug name if one was set
    pub name: Option<String>,
}

/// Render a debug message and the objects it mentions
pub fn format_debug_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    message: &str,
    objects: &[ReportedObject],
) -> String {
    let mut text = format!("vk [{}] [{}] {message}", severity_label(severity), type_label(types));
    for (index, object) in objects.iter().enumerate() {
        text.push_str(&format!(
            "\n    object[{index}] {:?} {:#x} '{}'",
            object.object_type,
            object.handle,
            object.name.as_deref().unwrap_or("")
        ));
    }
    text
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let data = &*callback_data;
    let message = if data.p_message.is_null() {
        "".into()
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    let objects: Vec<ReportedObject> = if data.p_objects.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data.p_objects, data.object_count as usize)
            .iter()
            .map(|object| ReportedObject {
                object_type: object.object_type,
                handle: object.object_handle,
                name: (!object.p_object_name.is_null())
                    .then(|| CStr::from_ptr(object.p_object_name).to_string_lossy().into_owned()),
            })
            .collect()
    };

    let text = format_debug_message(message_severity, message_type, &message, &objects);

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("{text}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("{text}");
    } else {
        log::trace!("{text}");
    }

    if let Some(sink) = user_data.cast::<LogSink>().as_ref() {
        sink.write_str(&text);
    }

    vk::FALSE
}

/// Labels Vulkan objects when debug utils are enabled, otherwise does nothing
#[derive(Clone)]
pub struct ObjectNamer {
    debug_utils: Option<DebugUtils>,
    device: vk::Device,
}

impl ObjectNamer {
    /// A namer that ignores every request
    pub fn disabled() -> Self {
        Self { debug_utils: None, device: vk::Device::null() }
    }

    /// Namer bound to a logical device
    pub fn new(debug_utils: Option<DebugUtils>, device: vk::Device) -> Self {
        Self { debug_utils, device }
    }

    /// Whether names are actually submitted
    pub fn is_enabled(&self) -> bool {
        self.debug_utils.is_some()
    }

    /// Attach a debug name to a handle
    pub fn name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            log::warn!("object name contains a NUL byte: {name:?}");
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(self.device, &info) } {
            log::warn!("naming {:?} '{}' failed: {e}", H::TYPE, name.to_string_lossy());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_labels_pick_highest() {
        assert_eq!(severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), "error");
        assert_eq!(severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), "warning");
        assert_eq!(severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::INFO), "info");
        assert_eq!(severity_label(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), "verbose");
    }

    #[test]
    fn test_type_labels() {
        let types = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
        assert_eq!(type_label(types), "general,performance");
        assert_eq!(type_label(vk::DebugUtilsMessageTypeFlagsEXT::empty()), "unknown");
    }

    #[test]
    fn test_message_lists_named_objects() {
        let objects = [
            ReportedObject { object_type: vk::ObjectType::BUFFER, handle: 0x2a, name: Some("quad vertices".into()) },
            ReportedObject { object_type: vk::ObjectType::DEVICE, handle: 0x10, name: None },
        ];
        let text = format_debug_message(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            "buffer too small",
            &objects,
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "vk [warning] [validation] buffer too small");
        assert_eq!(lines[1], "    object[0] BUFFER 0x2a 'quad vertices'");
        assert_eq!(lines[2], "    object[1] DEVICE 0x10 ''");
    }

    #[test]
    fn test_disabled_namer_is_inert() {
        let namer = ObjectNamer::disabled();
        assert!(!namer.is_enabled());
        namer.name(vk::Buffer::null(), "ignored");
    }
}
