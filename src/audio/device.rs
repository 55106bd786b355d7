//! Audio device lookup using cpal

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::DeviceId;
use serde::Serialize;
use std::str::FromStr;

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Input,
    Output,
}

/// A speaker or microphone as listed by the host
#[derive(Debug, Clone, Serialize)]
pub struct AudioDevice {
    /// cpal `DeviceId` in string form; this is what the config stores
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Name shown in logs; prefers the cpal 0.17 description over the deprecated `name()`
pub fn get_device_display_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|_| {
            #[allow(deprecated)]
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        })
}

/// List all devices of one kind
pub fn list_devices(kind: DeviceKind) -> Vec<AudioDevice> {
    let host = cpal::default_host();
    tracing::debug!("CPAL host: {}", host.id().name());

    let default_id = default_device(&host, kind)
        .and_then(|d| d.id().ok())
        .map(|id| id.to_string());

    let devices = match kind {
        DeviceKind::Input => host.input_devices().map(|it| it.collect::<Vec<_>>()),
        DeviceKind::Output => host.output_devices().map(|it| it.collect::<Vec<_>>()),
    };

    devices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|device| {
            let id = device.id().ok()?.to_string();
            Some(AudioDevice {
                is_default: Some(&id) == default_id.as_ref(),
                name: get_device_display_name(&device),
                id,
            })
        })
        .collect()
}

fn default_device(host: &cpal::Host, kind: DeviceKind) -> Option<cpal::Device> {
    match kind {
        DeviceKind::Input => host.default_input_device(),
        DeviceKind::Output => host.default_output_device(),
    }
}

/// Find a device by its stable ID
fn find_device_by_id(id_str: &str) -> Option<cpal::Device> {
    let host = cpal::default_host();
    let device_id = DeviceId::from_str(id_str).ok()?;
    host.device_by_id(&device_id)
}

/// Resolve the configured device, falling back to the system default
pub fn resolve_device(kind: DeviceKind, device_id: Option<&str>) -> Option<cpal::Device> {
    if let Some(id) = device_id {
        if let Some(device) = find_device_by_id(id) {
            tracing::info!(
                "Using configured {:?} device: {}",
                kind,
                get_device_display_name(&device)
            );
            return Some(device);
        }

        let available: Vec<String> = list_devices(kind)
            .iter()
            .map(|d| format!("{} (id: {})", d.name, d.id))
            .collect();
        tracing::warn!(
            "Configured {:?} device '{}' not found. Available devices: [{}]. Falling back to default.",
            kind,
            id,
            available.join(", ")
        );
    }

    let device = default_device(&cpal::default_host(), kind);
    match device {
        Some(ref d) => tracing::info!(
            "Using default {:?} device: '{}'",
            kind,
            get_device_display_name(d)
        ),
        None => tracing::error!("No default {:?} device available!", kind),
    }
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_does_not_panic() {
        // Headless CI machines may have no devices at all
        let _inputs = list_devices(DeviceKind::Input);
        let _outputs = list_devices(DeviceKind::Output);
    }

    #[test]
    fn test_unknown_device_id_falls_back() {
        // Whatever the default is (possibly none), an unknown ID must not be returned
        let resolved = resolve_device(DeviceKind::Output, Some("not-a-real-device"));
        let default = cpal::default_host().default_output_device();
        assert_eq!(resolved.is_some(), default.is_some());
    }

    #[test]
    fn test_device_id_stable_format() {
        for device in list_devices(DeviceKind::Input) {
            assert!(
                DeviceId::from_str(&device.id).is_ok(),
                "Device ID '{}' should be parseable as DeviceId",
                device.id
            );
        }
    }
}
