//! Input device enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// Source of the device list. Only used to clamp indices and for the
/// human-readable listing; the platform remains the authority.
pub trait DeviceCatalog {
    fn list_devices(&self) -> Vec<DeviceInfo>;
}

/// Map a requested index onto an existing device. Anything out of range
/// falls back to device 0; `None` means there are no devices at all.
pub fn clamp_device_index(requested: i64, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    if requested < 0 || requested as u64 >= count as u64 {
        Some(0)
    } else {
        Some(requested as usize)
    }
}

pub fn describe_devices(devices: &[DeviceInfo]) -> String {
    if devices.is_empty() {
        return "Audio devices: none found".to_string();
    }
    let mut msg = String::from("Audio devices:");
    for device in devices {
        msg.push_str(&format!("\n {}: {}", device.index, device.name));
        if device.is_default {
            msg.push_str(" (default)");
        }
    }
    msg
}

/// Input devices of the default cpal host, in enumeration order.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>, String> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| format!("Failed to enumerate input devices: {}", e))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            DeviceInfo {
                index,
                is_default: Some(&name) == default_name.as_ref(),
                name,
            }
        })
        .collect())
}

/// Input device at `index` in the same order as [`list_input_devices`].
pub fn get_input_device(index: usize) -> Result<cpal::Device, String> {
    let host = cpal::default_host();
    host.input_devices()
        .map_err(|e| format!("Failed to enumerate input devices: {}", e))?
        .nth(index)
        .ok_or_else(|| format!("Input device {} not found", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: usize, name: &str) -> DeviceInfo {
        DeviceInfo {
            index,
            name: name.to_string(),
            is_default: index == 0,
        }
    }

    #[test]
    fn out_of_range_clamps_to_first_device() {
        assert_eq!(clamp_device_index(1, 3), Some(1));
        assert_eq!(clamp_device_index(3, 3), Some(0));
        assert_eq!(clamp_device_index(-1, 3), Some(0));
        assert_eq!(clamp_device_index(0, 0), None);
    }

    #[test]
    fn listing_names_every_device() {
        let listing = describe_devices(&[device(0, "Built-in Mic"), device(1, "USB Interface")]);
        assert_eq!(
            listing,
            "Audio devices:\n 0: Built-in Mic (default)\n 1: USB Interface"
        );
        assert_eq!(describe_devices(&[]), "Audio devices: none found");
    }
}
