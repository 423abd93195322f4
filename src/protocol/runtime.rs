use std::{
    io, thread,
    time::{Duration, Instant},
};

use flume::{Receiver, Sender};

use crate::{
    core::{
        bus::{SessionCommand, SessionEvent, StatusSeverity},
        error::{is_device_loss, SessionError},
    },
    protocol::{
        battery::{BatteryPoller, BATTERY_POLL_INTERVAL},
        classify::{classify, DeviceSignal},
        command::CommandFrame,
        framing::LineFramer,
        pending::PendingRequests,
        session::Session,
    },
};

/// Fixed baud rate of the device's configuration console.
pub const SERIAL_BAUD: u32 = 115_200;

const READ_TIMEOUT: Duration = Duration::from_millis(200);
const TRANSIENT_READ_BACKOFF: Duration = Duration::from_secs(1);
const CLOSE_SETTLE_DELAY: Duration = Duration::from_millis(500);
const DEVICE_RESTART_DELAY: Duration = Duration::from_secs(5);
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Byte-stream seam between the session worker and the serial handle, so
/// tests can drive the worker over an in-memory fake.
pub trait Transport: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

impl<T: io::Read + io::Write + Send> Transport for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(self)
    }
}

/// Why the worker loop ended.
enum CloseReason {
    /// A frontend asked for teardown.
    Requested,
    /// The transport reported end-of-stream.
    EndOfStream,
    /// The device vanished mid-session.
    DeviceLost,
}

/// Handle to one live device session.
///
/// The session runs on a dedicated worker thread that owns the serial handle
/// exclusively; command handling, line classification, battery polling and
/// deadline checks all interleave sequentially inside its loop, so none of
/// the session state needs a lock. Dropping the handle does not tear the
/// session down; send [`SessionCommand::Disconnect`] for that.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub cmd_tx: Sender<SessionCommand>,
    pub evt_rx: Receiver<SessionEvent>,
}

impl SessionHandle {
    /// Open the named port at the fixed baud rate and start the worker.
    pub fn connect(port_name: &str) -> Result<Self, SessionError> {
        if port_name.trim().is_empty() {
            return Err(SessionError::PortSelectionCancelled);
        }
        let port = serialport::new(port_name, SERIAL_BAUD)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|err| {
                let io_err: io::Error = err.into();
                if io_err.kind() == io::ErrorKind::NotFound {
                    SessionError::PortSelectionCancelled
                } else {
                    SessionError::OpenFailure(io_err)
                }
            })?;
        log::info!("serial port {port_name} opened at {SERIAL_BAUD} baud");
        Ok(Self::from_transport(port))
    }

    /// Start the worker over an already-open transport.
    pub fn from_transport<T: Transport + 'static>(io: T) -> Self {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let (evt_tx, evt_rx) = flume::unbounded();
        thread::spawn(move || run_loop(Box::new(io), cmd_rx, evt_tx));
        Self { cmd_tx, evt_rx }
    }

    /// Queue a command for the worker. Fails when the worker already exited.
    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(command)
            .map_err(|_| SessionError::NoActiveConnection)
    }

    /// Request teardown. A no-op once the worker is gone.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Disconnect);
    }
}

struct Worker {
    io: Box<dyn Transport>,
    evt_tx: Sender<SessionEvent>,
    session: Session,
    pending: PendingRequests,
    poller: BatteryPoller,
    /// When set, `MODE_CONFIG ON` is re-sent at this instant; scheduled after
    /// the post-write `RESET` so reads keep flowing during the restart.
    mode_reenable_at: Option<Instant>,
}

fn run_loop(
    io: Box<dyn Transport>,
    cmd_rx: Receiver<SessionCommand>,
    evt_tx: Sender<SessionEvent>,
) {
    let mut worker = Worker {
        io,
        evt_tx,
        session: Session::new(),
        pending: PendingRequests::new(),
        poller: BatteryPoller::new(BATTERY_POLL_INTERVAL),
        mode_reenable_at: None,
    };
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 256];

    worker.session.mark_connected();
    worker.emit(SessionEvent::ConnectionChanged(true));
    worker.status("Connected to serial port", StatusSeverity::Success);
    worker.poller.start(Instant::now());

    'main: loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            if cmd == SessionCommand::Disconnect {
                break 'main;
            }
            if let Err(reason) = worker.handle_command(cmd) {
                worker.close(reason, &cmd_rx);
                return;
            }
        }

        if let Err(reason) = worker.tick_timers(Instant::now()) {
            worker.close(reason, &cmd_rx);
            return;
        }

        match worker.io.read(&mut buf) {
            Ok(0) => {
                log::info!("serial stream ended");
                worker.close(CloseReason::EndOfStream, &cmd_rx);
                return;
            }
            Ok(n) => {
                for line in framer.feed(&buf[..n]) {
                    log::debug!("device line: {line}");
                    for signal in classify(&line, &mut worker.pending) {
                        worker.apply_signal(signal);
                    }
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                thread::sleep(IDLE_SLEEP);
            }
            Err(err) if is_device_loss(&err) => {
                worker.status("Device disconnected", StatusSeverity::Error);
                worker.close(CloseReason::DeviceLost, &cmd_rx);
                return;
            }
            Err(err) => {
                log::warn!("transient read error, retrying: {err}");
                thread::sleep(TRANSIENT_READ_BACKOFF);
            }
        }
    }
    worker.close(CloseReason::Requested, &cmd_rx);
}

impl Worker {
    fn emit(&self, event: SessionEvent) {
        let _ = self.evt_tx.send(event);
    }

    fn status(&self, message: &str, severity: StatusSeverity) {
        self.emit(SessionEvent::Status {
            message: message.to_string(),
            severity,
        });
    }

    fn handle_command(&mut self, cmd: SessionCommand) -> Result<(), CloseReason> {
        match cmd {
            SessionCommand::SetConfigMode(enable) => {
                let message = if enable {
                    "Enabling config mode..."
                } else {
                    "Disabling config mode..."
                };
                self.status(message, StatusSeverity::Connecting);
                escalate(self.dispatch(CommandFrame::ModeConfig(enable), true))?;
            }
            SessionCommand::ReadConfig => {
                self.status("Reading configuration...", StatusSeverity::Connecting);
                escalate(self.dispatch(CommandFrame::ConfigRead, true))?;
            }
            SessionCommand::WriteConfig(config) => {
                if let Err(err) = config.validate() {
                    self.status(&format!("Error: {err}"), StatusSeverity::Error);
                    return Ok(());
                }
                self.status("Saving configuration...", StatusSeverity::Connecting);
                if let Err(err) = self.dispatch(CommandFrame::ConfigWrite(config), false) {
                    // The failure was already surfaced as a status; without a
                    // persisted write there is nothing to restart into.
                    return escalate(Err(err));
                }
                escalate(self.dispatch(CommandFrame::Reset, true))?;
                self.status("Device restarting", StatusSeverity::Success);
                self.mode_reenable_at = Some(Instant::now() + DEVICE_RESTART_DELAY);
            }
            SessionCommand::ToggleEdit(enable) => match self.session.set_editing(enable) {
                Ok(()) => {
                    let message = if enable {
                        "Edit mode enabled"
                    } else {
                        "Edit mode disabled"
                    };
                    self.status(message, StatusSeverity::Info);
                }
                Err(err) => self.status(&format!("Error: {err}"), StatusSeverity::Error),
            },
            SessionCommand::Reset => {
                escalate(self.dispatch(CommandFrame::Reset, true))?;
            }
            // Handled by the loop before this point.
            SessionCommand::Disconnect => {}
        }
        Ok(())
    }

    /// Deadline checks that run every loop turn: expired request
    /// expectations, the unconfirmed mode request, the post-reset mode
    /// re-enable, and the battery poll.
    fn tick_timers(&mut self, now: Instant) -> Result<(), CloseReason> {
        for kind in self.pending.expire(now) {
            let err = SessionError::Timeout(kind.command_name());
            self.status(&format!("Error: {err}"), StatusSeverity::Error);
        }

        if let Some(wanted) = self.session.expire_mode_request(now) {
            let state = if wanted { "entering" } else { "leaving" };
            self.status(
                &format!("Error: device did not confirm {state} config mode"),
                StatusSeverity::Error,
            );
        }

        if self.mode_reenable_at.is_some_and(|at| now >= at) {
            self.mode_reenable_at = None;
            self.status("Re-enabling config mode...", StatusSeverity::Connecting);
            escalate(self.dispatch(CommandFrame::ModeConfig(true), true))?;
        }

        if self.poller.poll_due(now) {
            // Fire-and-forget telemetry: a lost request is tolerated and
            // never ends the session.
            if let Err(err) = self.write_frame(&CommandFrame::BatteryStatus) {
                log::warn!("battery status request failed: {err}");
            }
        }
        Ok(())
    }

    /// Serialize one frame onto the wire, recording the matching pending
    /// expectation and mode request as a side effect of what was sent.
    fn dispatch(&mut self, frame: CommandFrame, announce: bool) -> Result<(), SessionError> {
        if !self.session.can_send() {
            let err = SessionError::NoActiveConnection;
            self.status(&format!("Error: {err}"), StatusSeverity::Error);
            return Err(err);
        }

        let now = Instant::now();
        match &frame {
            CommandFrame::ConfigRead => self.pending.expect_read(now),
            CommandFrame::ConfigWrite(_) => self.pending.expect_write(now),
            _ => {}
        }

        if let Err(err) = self.write_frame(&frame) {
            let device_lost = matches!(&err, SessionError::WriteFailure { device_lost: true, .. });
            self.status(&format!("Error: {err}"), StatusSeverity::Error);
            if device_lost {
                log::error!("device lost while sending {}", frame.verb());
            }
            return Err(err);
        }

        if announce {
            self.status(
                &format!("Command \"{}\" sent", frame.verb()),
                StatusSeverity::Connecting,
            );
        }

        if let CommandFrame::ModeConfig(active) = frame {
            self.session.request_mode(active, now);
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &CommandFrame) -> Result<(), SessionError> {
        let bytes = frame
            .encode()
            .map_err(|_| SessionError::Validation("configuration is not serializable"))?;
        self.io
            .write_all(&bytes)
            .and_then(|()| self.io.flush())
            .map_err(|source| {
                let device_lost = is_device_loss(&source);
                SessionError::WriteFailure {
                    source,
                    device_lost,
                }
            })
    }

    fn apply_signal(&mut self, signal: DeviceSignal) {
        match signal {
            DeviceSignal::ConfigLoaded(config) => {
                self.status("Configuration loaded", StatusSeverity::Success);
                self.emit(SessionEvent::ConfigLoaded(config));
            }
            DeviceSignal::MalformedConfig(detail) => {
                let err = SessionError::MalformedResponse(detail);
                self.status(&format!("Error: {err}"), StatusSeverity::Error);
            }
            DeviceSignal::WriteAck(success) => {
                if success {
                    self.status("Configuration saved", StatusSeverity::Success);
                } else {
                    self.status("Error: device rejected the write", StatusSeverity::Error);
                }
                self.emit(SessionEvent::WriteResult(success));
            }
            DeviceSignal::ModeChanged(active) => {
                self.session.confirm_mode(active);
                if active {
                    self.status("Config mode enabled", StatusSeverity::Success);
                } else {
                    self.status("Config mode disabled", StatusSeverity::Info);
                }
                self.emit(SessionEvent::ModeChanged(active));
            }
            DeviceSignal::Battery(percentage) => {
                self.emit(SessionEvent::BatteryUpdate(percentage));
            }
        }
    }

    /// The single teardown path. Every step is best-effort; the session
    /// always ends fully reset no matter which steps fail.
    fn close(&mut self, reason: CloseReason, cmd_rx: &Receiver<SessionCommand>) {
        if !self.session.begin_close() {
            return;
        }
        self.status("Disconnecting...", StatusSeverity::Connecting);

        // Leave config mode so the device does not sit in it after unplug.
        // Pointless when the device is already gone.
        let leave_config = !matches!(reason, CloseReason::DeviceLost)
            && (self.session.config_mode_active || self.session.mode_request_pending());
        if leave_config {
            match self.write_frame(&CommandFrame::ModeConfig(false)) {
                // Let the firmware process the frame before the port closes.
                Ok(()) => thread::sleep(CLOSE_SETTLE_DELAY),
                Err(err) => log::warn!("failed to leave config mode during teardown: {err}"),
            }
        }

        // Late commands are answered, not executed. A repeated disconnect
        // during teardown is a no-op beyond its status message.
        while let Ok(cmd) = cmd_rx.try_recv() {
            if cmd == SessionCommand::Disconnect {
                self.status("Disconnecting, please wait...", StatusSeverity::Connecting);
            } else {
                self.status(
                    &format!("Error: {}", SessionError::NoActiveConnection),
                    StatusSeverity::Error,
                );
            }
        }

        self.poller.stop();
        self.pending.clear();
        self.session.reset();
        self.status("Disconnected from serial port", StatusSeverity::Info);
        self.emit(SessionEvent::ConnectionChanged(false));
        self.emit(SessionEvent::Closed);
        // The transport (and with it the OS handle) is released when the
        // worker drops.
    }
}

fn escalate(result: Result<(), SessionError>) -> Result<(), CloseReason> {
    match result {
        Err(SessionError::WriteFailure {
            device_lost: true, ..
        }) => Err(CloseReason::DeviceLost),
        // Everything else was already surfaced as a status event.
        _ => Ok(()),
    }
}
