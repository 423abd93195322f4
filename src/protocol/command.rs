use crate::protocol::session::DeviceConfig;

/// The closed set of frames the device accepts. Frames are
/// newline-terminated ASCII on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandFrame {
    ModeConfig(bool),
    ConfigRead,
    ConfigWrite(DeviceConfig),
    BatteryStatus,
    Reset,
}

impl CommandFrame {
    /// The command verb, used in status messages.
    pub fn verb(&self) -> &'static str {
        match self {
            CommandFrame::ModeConfig(_) => "MODE_CONFIG",
            CommandFrame::ConfigRead => "CONFIG_READ",
            CommandFrame::ConfigWrite(_) => "CONFIG_WRITE",
            CommandFrame::BatteryStatus => "BATTERY_STATUS",
            CommandFrame::Reset => "RESET",
        }
    }

    /// Encode the frame including its trailing newline.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let line = match self {
            CommandFrame::ModeConfig(true) => "MODE_CONFIG ON".to_string(),
            CommandFrame::ModeConfig(false) => "MODE_CONFIG OFF".to_string(),
            CommandFrame::ConfigRead => "CONFIG_READ".to_string(),
            CommandFrame::ConfigWrite(config) => {
                format!("CONFIG_WRITE {}", serde_json::to_string(config)?)
            }
            CommandFrame::BatteryStatus => "BATTERY_STATUS".to_string(),
            CommandFrame::Reset => "RESET".to_string(),
        };
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_frames_encode_verbatim() {
        assert_eq!(
            CommandFrame::ModeConfig(true).encode().unwrap(),
            b"MODE_CONFIG ON\n"
        );
        assert_eq!(
            CommandFrame::ModeConfig(false).encode().unwrap(),
            b"MODE_CONFIG OFF\n"
        );
        assert_eq!(CommandFrame::ConfigRead.encode().unwrap(), b"CONFIG_READ\n");
        assert_eq!(
            CommandFrame::BatteryStatus.encode().unwrap(),
            b"BATTERY_STATUS\n"
        );
        assert_eq!(CommandFrame::Reset.encode().unwrap(), b"RESET\n");
    }

    #[test]
    fn config_write_carries_wire_field_names() {
        let frame = CommandFrame::ConfigWrite(DeviceConfig {
            device_id: "d1".into(),
            wifi_ssid: "home".into(),
            wifi_password: "pw".into(),
            audio_format: "mp3".into(),
        });
        let encoded = String::from_utf8(frame.encode().unwrap()).unwrap();
        assert!(encoded.starts_with("CONFIG_WRITE {"));
        assert!(encoded.ends_with("}\n"));
        assert!(encoded.contains(r#""deviceId":"d1""#));
        assert!(encoded.contains(r#""wifi_ssid":"home""#));
        assert!(encoded.contains(r#""wifi_password":"pw""#));
        assert!(encoded.contains(r#""audio_format":"mp3""#));
    }
}
