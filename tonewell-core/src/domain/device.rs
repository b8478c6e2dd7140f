//! Device domain model
//!
//! A device is the hardware a job is rendered on. Every device is its own
//! queue partition and is serviced by exactly one worker.

use serde::Serialize;

/// Roland GS reset, addressed to device 0x10
const GS_RESET: &[u8] = &[
    0xF0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7,
];

/// Hardware a job can be rendered on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Identifier used as the queue partition key
    pub id: &'static str,

    /// Human-readable name used in notifications
    pub name: &'static str,

    /// Sequencer port the device listens on, as `client:port` name prefix
    pub sequencer_port: &'static str,

    /// Audio capture device the device's output is wired to
    pub audio_port: &'static str,

    /// SysEx message that puts the device into its power-on state
    pub reset_sysex: &'static [u8],
}

static DEVICES: &[Device] = &[
    Device {
        id: "sc55mk2",
        name: "Roland SC-55mk2",
        sequencer_port: "U-44:U-44 ZOOM U-44 MIDI I/O Port",
        audio_port: "hw:CARD=U44",
        reset_sysex: GS_RESET,
    },
    Device {
        id: "nullsynth",
        name: "Null Synthesizer",
        sequencer_port: "Midi Through:Midi Through Port-0",
        audio_port: "null",
        reset_sysex: GS_RESET,
    },
];

/// Error returned for a device id that is not known
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device '{0}' unavailable")]
pub struct UnknownDevice(pub String);

impl Device {
    /// Looks up a device by id
    pub fn from_id(id: &str) -> Result<&'static Device, UnknownDevice> {
        DEVICES
            .iter()
            .find(|device| device.id == id)
            .ok_or_else(|| UnknownDevice(id.to_string()))
    }

    /// All known devices
    pub fn all() -> &'static [Device] {
        DEVICES
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_device() {
        let device = Device::from_id("sc55mk2").unwrap();
        assert_eq!(device.name, "Roland SC-55mk2");
        assert_eq!(device.reset_sysex.first(), Some(&0xF0));
        assert_eq!(device.reset_sysex.last(), Some(&0xF7));
    }

    #[test]
    fn test_lookup_unknown_device() {
        assert_eq!(
            Device::from_id("dx7"),
            Err(UnknownDevice("dx7".to_string()))
        );
    }

    #[test]
    fn test_device_ids_are_unique() {
        let mut ids: Vec<_> = Device::all().iter().map(|d| d.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), Device::all().len());
    }
}
