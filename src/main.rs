use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgGroup, Command};

use devlink::{cli, DeviceConfig};

fn build_command() -> Command {
    Command::new("devlink")
        .about("Configure ESP32-class audio devices over a serial link")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .global(true)
                .help("Serial port name, e.g. /dev/ttyUSB0 or COM3"),
        )
        .subcommand(Command::new("ports").about("List available serial ports"))
        .subcommand(Command::new("monitor").about("Stream decoded device events until Ctrl-C"))
        .subcommand(Command::new("read").about("Read the current device configuration"))
        .subcommand(
            Command::new("write")
                .about("Write a configuration, then restart the device")
                .arg(Arg::new("device-id").long("device-id").help("Device identifier"))
                .arg(
                    Arg::new("generate-id")
                        .long("generate-id")
                        .action(ArgAction::SetTrue)
                        .help("Generate a fresh UUID as the device identifier"),
                )
                .group(
                    ArgGroup::new("id")
                        .args(["device-id", "generate-id"])
                        .required(true),
                )
                .arg(Arg::new("ssid").long("ssid").required(true).help("WiFi SSID"))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .default_value("")
                        .help("WiFi password"),
                )
                .arg(
                    Arg::new("audio-format")
                        .long("audio-format")
                        .default_value("")
                        .help("Audio format identifier, e.g. mp3"),
                ),
        )
        .subcommand(Command::new("reset").about("Restart the device"))
}

fn main() -> Result<()> {
    env_logger::init();
    let matches = build_command().get_matches();

    let port = matches.get_one::<String>("port").cloned();
    let require_port =
        || port.clone().ok_or_else(|| anyhow!("a serial port is required; pass --port"));

    match matches.subcommand() {
        Some(("ports", _)) => cli::list_ports(),
        Some(("monitor", _)) => cli::monitor(&require_port()?),
        Some(("read", _)) => cli::read_config(&require_port()?),
        Some(("write", sub)) => {
            let device_id = if sub.get_flag("generate-id") {
                let id = uuid::Uuid::new_v4().to_string();
                println!("Generated device ID: {id}");
                id
            } else {
                sub.get_one::<String>("device-id")
                    .cloned()
                    .unwrap_or_default()
            };
            let config = DeviceConfig {
                device_id,
                wifi_ssid: sub.get_one::<String>("ssid").cloned().unwrap_or_default(),
                wifi_password: sub
                    .get_one::<String>("password")
                    .cloned()
                    .unwrap_or_default(),
                audio_format: sub
                    .get_one::<String>("audio-format")
                    .cloned()
                    .unwrap_or_default(),
            };
            cli::write_config(&require_port()?, config)
        }
        Some(("reset", _)) => cli::reset(&require_port()?),
        _ => unreachable!("subcommand is required"),
    }
}
