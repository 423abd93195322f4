use crate::protocol::session::DeviceConfig;

/// Severity tag carried by every status event, used by frontends for
/// colouring and progress indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Info,
    Connecting,
    Error,
    Success,
}

impl StatusSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusSeverity::Info => "info",
            StatusSeverity::Connecting => "connecting",
            StatusSeverity::Error => "error",
            StatusSeverity::Success => "success",
        }
    }
}

/// Commands a frontend sends into the session worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Request config-mode enter/exit (`MODE_CONFIG ON/OFF`).
    SetConfigMode(bool),
    /// Request the current configuration (`CONFIG_READ`).
    ReadConfig,
    /// Validate and persist a configuration, then restart the device and
    /// re-enter config mode once it is back up.
    WriteConfig(DeviceConfig),
    /// Enter or leave edit mode. Entering is gated on confirmed config mode.
    ToggleEdit(bool),
    /// Request a device restart (`RESET`).
    Reset,
    /// Begin teardown. Idempotent; a repeated request during teardown only
    /// produces a status message.
    Disconnect,
}

/// Events the session worker sends back to the frontend.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A short human-readable progress or error message.
    Status {
        message: String,
        severity: StatusSeverity,
    },
    /// The link came up or went down.
    ConnectionChanged(bool),
    /// The device confirmed entering or leaving config mode.
    ModeChanged(bool),
    /// A configuration record arrived in answer to a pending read.
    ConfigLoaded(DeviceConfig),
    /// The device acknowledged a configuration write.
    WriteResult(bool),
    /// A battery telegram was decoded.
    BatteryUpdate(u8),
    /// Teardown finished and the worker is about to exit.
    Closed,
}
