//! Memory type selection

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// First memory type allowed by `allowed_types` whose flags include `required`
///
/// Pure over the device's memory properties, so repeated calls with the same
/// arguments always return the same index.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    allowed_types: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&index| {
            let allowed = allowed_types & (1 << index) != 0;
            allowed && memory_properties.memory_types[index as usize].property_flags.contains(required)
        })
        .ok_or_else(|| VulkanError::NoSuitableMemoryType {
            allowed_types,
            required,
            context: String::new(),
            table: describe_memory_types(memory_properties),
        })
}

/// One entry per memory type: `index:flags@heap`
pub fn describe_memory_types(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> String {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32) as usize;
    let entries: Vec<String> = memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .map(|(index, memory_type)| format!("{index}:{:?}@heap{}", memory_type.property_flags, memory_type.heap_index))
        .collect();
    format!("[{}]", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    fn host() -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    #[test]
    fn test_first_matching_allowed_type() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            host() | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, host()).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host()).unwrap(), 2);
        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::empty()).unwrap(), 0);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let props = properties(&[host(), vk::MemoryPropertyFlags::DEVICE_LOCAL, host()]);
        let first = find_memory_type(&props, 0b101, host()).unwrap();
        for _ in 0..10 {
            assert_eq!(find_memory_type(&props, 0b101, host()).unwrap(), first);
        }
    }

    #[test]
    fn test_no_match_reports_table() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host()]);
        let err = find_memory_type(&props, 0b01, host()).unwrap_err();
        match &err {
            VulkanError::NoSuitableMemoryType { allowed_types, table, .. } => {
                assert_eq!(*allowed_types, 0b01);
                assert!(table.starts_with("[0:"));
                assert!(table.contains("1:"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let message = err
            .with_allocation_context(256, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .to_string();
        assert!(message.contains("for 256 byte"));
        assert!(message.contains("UNIFORM_BUFFER"));
    }

    #[test]
    fn test_ignores_types_beyond_count() {
        let mut props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = host();
        assert!(find_memory_type(&props, u32::MAX, host()).is_err());
    }
}
