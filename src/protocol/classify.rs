use serde::Deserialize;

use crate::protocol::{pending::PendingRequests, session::DeviceConfig};

/// One structured observation extracted from a device line. A single line
/// can yield several signals; the rules below are not mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSignal {
    /// A config payload answered the pending read.
    ConfigLoaded(DeviceConfig),
    /// A config payload answered the pending read but did not parse. The
    /// expectation is consumed regardless, so the flag cannot get stuck.
    MalformedConfig(String),
    /// `CONFIG_WRITE: Success` / `CONFIG_WRITE: Error` while a write was
    /// pending.
    WriteAck(bool),
    /// The device announced entering (true) or leaving (false) config mode.
    /// Independent of anything sent locally: the device may switch modes on
    /// its own (physical button, reboot).
    ModeChanged(bool),
    /// A battery telegram carried a percentage.
    Battery(u8),
}

#[derive(Debug, Deserialize)]
struct BatteryTelegram {
    battery_status_percentage: u8,
}

/// Classify one complete line against the response grammar, consuming
/// pending expectations where a rule matches. Every rule is evaluated
/// against the same line.
pub fn classify(line: &str, pending: &mut PendingRequests) -> Vec<DeviceSignal> {
    let mut signals = Vec::new();

    let looks_like_config =
        (line.contains('{') && line.contains('}')) || line.contains("Config loaded:");
    if looks_like_config && pending.take_read() {
        signals.push(parse_config_payload(line));
    }

    if pending.write_pending() {
        if line.contains("CONFIG_WRITE: Success") {
            pending.take_write();
            signals.push(DeviceSignal::WriteAck(true));
        } else if line.contains("CONFIG_WRITE: Error") {
            pending.take_write();
            signals.push(DeviceSignal::WriteAck(false));
        }
    }

    if line.contains("MODE_CONFIG: Starting mode_config") {
        signals.push(DeviceSignal::ModeChanged(true));
    } else if line.contains("MODE_CONFIG: Stopping mode_config") {
        signals.push(DeviceSignal::ModeChanged(false));
    }

    if line.contains("\"battery_status_percentage\":") {
        match extract_json(line).and_then(|json| serde_json::from_str::<BatteryTelegram>(json).ok())
        {
            Some(telegram) => signals.push(DeviceSignal::Battery(telegram.battery_status_percentage)),
            // Best-effort telemetry, a bad telegram is dropped.
            None => log::warn!("unparseable battery telegram: {line}"),
        }
    }

    signals
}

/// The firmware interleaves log noise around the JSON object, so take the
/// substring from the first `{` to the last `}`.
fn extract_json(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    (end >= start).then(|| &line[start..=end])
}

fn parse_config_payload(line: &str) -> DeviceSignal {
    let Some(json) = extract_json(line) else {
        // Matched on "Config loaded:" alone; the payload line never came.
        return DeviceSignal::MalformedConfig("no JSON object in response".into());
    };
    match serde_json::from_str::<DeviceConfig>(json) {
        Ok(config) => DeviceSignal::ConfigLoaded(config),
        Err(err) => DeviceSignal::MalformedConfig(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn pending_read() -> PendingRequests {
        let mut pending = PendingRequests::new();
        pending.expect_read(Instant::now());
        pending
    }

    fn pending_write() -> PendingRequests {
        let mut pending = PendingRequests::new();
        pending.expect_write(Instant::now());
        pending
    }

    #[test]
    fn config_payload_consumes_pending_read() {
        let mut pending = pending_read();
        let line = r#"Config loaded: {"deviceId":"d1","wifi_ssid":"home","wifi_password":"pw","audio_format":"mp3"}"#;
        let signals = classify(line, &mut pending);
        assert_eq!(
            signals,
            vec![DeviceSignal::ConfigLoaded(DeviceConfig {
                device_id: "d1".into(),
                wifi_ssid: "home".into(),
                wifi_password: "pw".into(),
                audio_format: "mp3".into(),
            })]
        );
        assert!(!pending.read_pending());
    }

    #[test]
    fn config_payload_without_pending_read_is_ignored() {
        let mut pending = PendingRequests::new();
        let signals = classify(r#"{"deviceId":"d1"}"#, &mut pending);
        assert!(signals.is_empty());
    }

    #[test]
    fn second_payload_after_resolution_is_ignored() {
        let mut pending = pending_read();
        let line = r#"{"deviceId":"d1","wifi_ssid":"a"}"#;
        assert_eq!(classify(line, &mut pending).len(), 1);
        assert!(classify(line, &mut pending).is_empty());
    }

    #[test]
    fn json_is_extracted_from_surrounding_noise() {
        let mut pending = pending_read();
        let signals = classify(
            r#"noise{"deviceId":"a","wifi_ssid":"b"}trailing"#,
            &mut pending,
        );
        match &signals[..] {
            [DeviceSignal::ConfigLoaded(config)] => {
                assert_eq!(config.device_id, "a");
                assert_eq!(config.wifi_ssid, "b");
                assert_eq!(config.wifi_password, "");
            }
            other => panic!("unexpected signals: {other:?}"),
        }
        assert!(!pending.read_pending());
    }

    #[test]
    fn malformed_payload_still_clears_the_read_flag() {
        let mut pending = pending_read();
        let signals = classify("{not json}", &mut pending);
        assert!(matches!(
            signals[..],
            [DeviceSignal::MalformedConfig(_)]
        ));
        assert!(!pending.read_pending());
    }

    #[test]
    fn config_loaded_marker_without_braces_is_malformed() {
        let mut pending = pending_read();
        let signals = classify("Config loaded: <empty>", &mut pending);
        assert!(matches!(signals[..], [DeviceSignal::MalformedConfig(_)]));
        assert!(!pending.read_pending());
    }

    #[test]
    fn write_ack_success_and_error() {
        let mut pending = pending_write();
        assert_eq!(
            classify("CONFIG_WRITE: Success", &mut pending),
            vec![DeviceSignal::WriteAck(true)]
        );
        assert!(!pending.write_pending());

        let mut pending = pending_write();
        assert_eq!(
            classify("CONFIG_WRITE: Error, flash busy", &mut pending),
            vec![DeviceSignal::WriteAck(false)]
        );
        assert!(!pending.write_pending());
    }

    #[test]
    fn write_ack_without_pending_write_is_ignored() {
        let mut pending = PendingRequests::new();
        assert!(classify("CONFIG_WRITE: Success", &mut pending).is_empty());
    }

    #[test]
    fn mode_notifications_fire_regardless_of_pending_state() {
        let mut pending = PendingRequests::new();
        assert_eq!(
            classify("MODE_CONFIG: Starting mode_config", &mut pending),
            vec![DeviceSignal::ModeChanged(true)]
        );
        assert_eq!(
            classify("I (55) main: MODE_CONFIG: Stopping mode_config", &mut pending),
            vec![DeviceSignal::ModeChanged(false)]
        );
    }

    #[test]
    fn battery_telegram_decodes_independent_of_pending_flags() {
        let mut pending = pending_read();
        // The line carries braces, so it also resolves the pending read;
        // both rules fire on the same line.
        let signals = classify(r#"{"battery_status_percentage": 42}"#, &mut pending);
        assert!(signals.contains(&DeviceSignal::Battery(42)));

        let mut pending = PendingRequests::new();
        let signals = classify(
            r#"BATTERY_STATUS result {"battery_status_percentage": 7}"#,
            &mut pending,
        );
        assert_eq!(signals, vec![DeviceSignal::Battery(7)]);
    }

    #[test]
    fn bad_battery_telegram_is_dropped_silently() {
        let mut pending = PendingRequests::new();
        let signals = classify(r#"{"battery_status_percentage": "low"}"#, &mut pending);
        assert!(signals.is_empty());
    }
}
