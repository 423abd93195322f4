use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::error::SessionError;

/// How long an unconfirmed `MODE_CONFIG ON/OFF` request is kept before the
/// missing device confirmation is reported.
pub const MODE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// One device configuration record as exchanged over the wire.
///
/// Field names follow the firmware's JSON schema verbatim, including the
/// lone camelCase `deviceId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "deviceId", default)]
    pub device_id: String,
    #[serde(default)]
    pub wifi_ssid: String,
    #[serde(default)]
    pub wifi_password: String,
    #[serde(default)]
    pub audio_format: String,
}

impl DeviceConfig {
    /// Reject records the device would not accept. Runs before anything is
    /// written to the wire.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.wifi_ssid.trim().is_empty() {
            return Err(SessionError::Validation("WiFi SSID must not be empty"));
        }
        if self.device_id.trim().is_empty() {
            return Err(SessionError::Validation("device ID must not be empty"));
        }
        Ok(())
    }
}

/// Connection-level state of the one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// State the session worker mutates as commands are sent and device
/// notifications arrive.
///
/// `config_mode_active` is authoritative and only flips on the device's own
/// `Starting/Stopping mode_config` notification. A locally sent
/// `MODE_CONFIG ON/OFF` merely records `mode_request` until the device
/// confirms (or the request times out), so a silently rejected request can
/// never leave the session wrongly believing config mode is on.
#[derive(Debug)]
pub struct Session {
    pub link: LinkState,
    pub closing: bool,
    pub config_mode_active: bool,
    pub editing: bool,
    mode_request: Option<(bool, Instant)>,
}

impl Session {
    /// A session whose port open is in flight.
    pub fn new() -> Self {
        Self {
            link: LinkState::Connecting,
            closing: false,
            config_mode_active: false,
            editing: false,
            mode_request: None,
        }
    }

    pub fn mark_connected(&mut self) {
        self.link = LinkState::Connected;
    }

    #[cfg(test)]
    pub fn connected() -> Self {
        let mut session = Self::new();
        session.mark_connected();
        session
    }

    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Whether a command frame may be sent right now.
    pub fn can_send(&self) -> bool {
        self.is_connected() && !self.closing
    }

    /// Record a locally issued mode change awaiting device confirmation.
    pub fn request_mode(&mut self, active: bool, now: Instant) {
        self.mode_request = Some((active, now + MODE_CONFIRM_TIMEOUT));
    }

    /// Apply a device-confirmed mode notification. Leaving config mode
    /// always exits edit mode as well.
    pub fn confirm_mode(&mut self, active: bool) {
        self.config_mode_active = active;
        if !active {
            self.editing = false;
        }
        // Any confirmation settles the outstanding request, even one for the
        // opposite direction (the device is authoritative).
        self.mode_request = None;
    }

    /// Return the desired mode of a request whose confirmation never came.
    pub fn expire_mode_request(&mut self, now: Instant) -> Option<bool> {
        match self.mode_request {
            Some((active, deadline)) if now >= deadline => {
                self.mode_request = None;
                Some(active)
            }
            _ => None,
        }
    }

    pub fn mode_request_pending(&self) -> bool {
        self.mode_request.is_some()
    }

    /// Enter or leave edit mode. Entering requires a connected session in
    /// confirmed config mode that is not shutting down.
    pub fn set_editing(&mut self, enable: bool) -> Result<(), SessionError> {
        if enable && !(self.can_send() && self.config_mode_active) {
            return Err(SessionError::Validation(
                "editing requires an active config-mode session",
            ));
        }
        self.editing = enable;
        Ok(())
    }

    /// Begin teardown. Returns false when teardown was already in progress.
    pub fn begin_close(&mut self) -> bool {
        if self.closing {
            return false;
        }
        self.closing = true;
        true
    }

    /// Zero every field after teardown completed.
    pub fn reset(&mut self) {
        self.link = LinkState::Disconnected;
        self.closing = false;
        self.config_mode_active = false;
        self.editing = false;
        self.mode_request = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flips_only_on_confirmation() {
        let mut session = Session::connected();
        let now = Instant::now();
        session.request_mode(true, now);
        assert!(!session.config_mode_active);
        assert!(session.mode_request_pending());

        session.confirm_mode(true);
        assert!(session.config_mode_active);
        assert!(!session.mode_request_pending());
    }

    #[test]
    fn unconfirmed_request_expires() {
        let mut session = Session::connected();
        let now = Instant::now();
        session.request_mode(true, now);
        assert_eq!(session.expire_mode_request(now), None);
        assert_eq!(
            session.expire_mode_request(now + MODE_CONFIRM_TIMEOUT),
            Some(true)
        );
        assert!(!session.config_mode_active);
    }

    #[test]
    fn leaving_config_mode_forces_edit_off() {
        let mut session = Session::connected();
        session.confirm_mode(true);
        session.set_editing(true).unwrap();
        session.confirm_mode(false);
        assert!(!session.editing);
    }

    #[test]
    fn editing_rejected_outside_config_mode() {
        let mut session = Session::connected();
        assert!(session.set_editing(true).is_err());

        session.confirm_mode(true);
        session.closing = true;
        assert!(session.set_editing(true).is_err());

        session.closing = false;
        assert!(session.set_editing(true).is_ok());
        // Leaving edit mode is always allowed.
        session.closing = true;
        assert!(session.set_editing(false).is_ok());
    }

    #[test]
    fn close_is_entered_once() {
        let mut session = Session::connected();
        assert!(session.begin_close());
        assert!(!session.begin_close());
        session.reset();
        assert_eq!(session.link, LinkState::Disconnected);
        assert!(!session.closing);
    }

    #[test]
    fn validation_rejects_empty_required_fields() {
        let config = DeviceConfig {
            device_id: "".into(),
            wifi_ssid: "home".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DeviceConfig {
            device_id: "d1".into(),
            wifi_ssid: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DeviceConfig {
            device_id: "d1".into(),
            wifi_ssid: "home".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
