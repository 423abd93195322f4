use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use flume::Receiver;

use crate::{
    core::bus::{SessionCommand, SessionEvent},
    protocol::{runtime::SessionHandle, session::DeviceConfig},
    utils::ports,
};

/// Upper bound for one command/response round trip, including the device's
/// own 5 s response deadline.
const EVENT_WAIT: Duration = Duration::from_secs(10);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

pub fn list_ports() -> Result<()> {
    let ports = ports::enumerate_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for (name, kind) in ports {
        println!("{name}\t{kind}");
    }
    Ok(())
}

pub fn monitor(port: &str) -> Result<()> {
    let handle = SessionHandle::connect(port)?;
    let (stop_tx, stop_rx) = flume::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    println!("Monitoring {port}; press Ctrl-C to disconnect.");
    loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        match handle.evt_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let closed = event == SessionEvent::Closed;
                print_event(&event);
                if closed {
                    return Ok(());
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => bail!("session worker exited"),
        }
    }
    shutdown(&handle);
    Ok(())
}

pub fn read_config(port: &str) -> Result<()> {
    let handle = SessionHandle::connect(port)?;
    let result = run_read(&handle);
    shutdown(&handle);
    let config = result?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn run_read(handle: &SessionHandle) -> Result<DeviceConfig> {
    handle.send(SessionCommand::SetConfigMode(true))?;
    wait_for(&handle.evt_rx, |event| {
        matches!(event, SessionEvent::ModeChanged(true))
    })?;

    handle.send(SessionCommand::ReadConfig)?;
    let event = wait_for(&handle.evt_rx, |event| {
        matches!(event, SessionEvent::ConfigLoaded(_))
    })?;
    match event {
        SessionEvent::ConfigLoaded(config) => Ok(config),
        _ => unreachable!("wait_for matched ConfigLoaded"),
    }
}

pub fn write_config(port: &str, config: DeviceConfig) -> Result<()> {
    config.validate()?;
    let handle = SessionHandle::connect(port)?;
    let result = run_write(&handle, config);
    shutdown(&handle);
    result
}

fn run_write(handle: &SessionHandle, config: DeviceConfig) -> Result<()> {
    handle.send(SessionCommand::SetConfigMode(true))?;
    wait_for(&handle.evt_rx, |event| {
        matches!(event, SessionEvent::ModeChanged(true))
    })?;

    handle.send(SessionCommand::WriteConfig(config))?;
    let event = wait_for(&handle.evt_rx, |event| {
        matches!(event, SessionEvent::WriteResult(_))
    })?;
    if event == SessionEvent::WriteResult(false) {
        bail!("the device rejected the configuration write");
    }
    println!("Configuration saved; the device is restarting.");
    Ok(())
}

pub fn reset(port: &str) -> Result<()> {
    let handle = SessionHandle::connect(port)?;
    let result = (|| {
        handle.send(SessionCommand::Reset)?;
        wait_for(&handle.evt_rx, |event| {
            matches!(event, SessionEvent::Status { message, .. } if message.contains("RESET"))
        })
    })();
    shutdown(&handle);
    result.map(|_| ())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Status { message, severity } => {
            println!("[{}] {message}", severity.as_str())
        }
        SessionEvent::ConnectionChanged(up) => {
            println!("[link] {}", if *up { "connected" } else { "disconnected" })
        }
        SessionEvent::ModeChanged(active) => {
            println!("[mode] config mode {}", if *active { "on" } else { "off" })
        }
        SessionEvent::WriteResult(success) => {
            println!("[write] {}", if *success { "acknowledged" } else { "failed" })
        }
        SessionEvent::BatteryUpdate(percentage) => println!("[battery] {percentage}%"),
        SessionEvent::ConfigLoaded(_) | SessionEvent::Closed => {}
    }
}

/// Print events as they stream by until one matches, or give up after
/// [`EVENT_WAIT`].
fn wait_for(
    rx: &Receiver<SessionEvent>,
    mut matching: impl FnMut(&SessionEvent) -> bool,
) -> Result<SessionEvent> {
    let deadline = Instant::now() + EVENT_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("timed out waiting for the device");
        }
        let event = rx
            .recv_timeout(remaining)
            .map_err(|_| anyhow!("session ended unexpectedly"))?;
        print_event(&event);
        if matching(&event) {
            return Ok(event);
        }
        if event == SessionEvent::Closed {
            bail!("the session closed before the device answered");
        }
    }
}

/// Tear the session down and wait for the worker to confirm.
fn shutdown(handle: &SessionHandle) {
    handle.disconnect();
    let deadline = Instant::now() + SHUTDOWN_WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::warn!("session worker did not confirm shutdown in time");
            return;
        }
        match handle.evt_rx.recv_timeout(remaining) {
            Ok(SessionEvent::Closed) | Err(_) => return,
            Ok(event) => print_event(&event),
        }
    }
}
