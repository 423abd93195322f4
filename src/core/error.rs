use std::{error::Error, fmt, io};

/// Session-level failure taxonomy.
///
/// Malformed single-line payloads and timeouts are reported as status events
/// and never abort the read loop; device-loss failures always route through
/// the one teardown path so session state cannot diverge from the real
/// connection.
#[derive(Debug)]
pub enum SessionError {
    /// A command was issued with no open session.
    NoActiveConnection,
    /// The operator did not name a port, or the named port does not exist.
    PortSelectionCancelled,
    /// The chosen port exists but could not be opened.
    OpenFailure(io::Error),
    /// A response payload that should have parsed did not.
    MalformedResponse(String),
    /// A command frame could not be written. `device_lost` marks failures
    /// that mean the device is gone and the session must be torn down.
    WriteFailure { source: io::Error, device_lost: bool },
    /// A pending request went unanswered past its deadline.
    Timeout(&'static str),
    /// A request was rejected locally before reaching the wire.
    Validation(&'static str),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoActiveConnection => write!(f, "no active serial connection"),
            SessionError::PortSelectionCancelled => write!(f, "no serial port selected"),
            SessionError::OpenFailure(err) => write!(f, "failed to open serial port: {err}"),
            SessionError::MalformedResponse(detail) => {
                write!(f, "device response is not valid JSON: {detail}")
            }
            SessionError::WriteFailure { source, .. } => {
                write!(f, "failed to send command: {source}")
            }
            SessionError::Timeout(what) => write!(f, "no response to {what} within the deadline"),
            SessionError::Validation(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::OpenFailure(err) => Some(err),
            SessionError::WriteFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Whether an I/O error on the serial handle means the device is physically
/// gone (unplugged, re-enumerated) rather than momentarily unresponsive.
pub fn is_device_loss(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_loss_classification() {
        assert!(is_device_loss(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_device_loss(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!is_device_loss(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_device_loss(&io::Error::from(io::ErrorKind::Other)));
    }
}
