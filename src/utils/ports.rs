use anyhow::Result;

/// Return a sorted list of available ports as (port_name, port_type_string).
pub fn enumerate_ports() -> Result<Vec<(String, String)>> {
    let mut ports = serialport::available_ports()?;
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    Ok(ports
        .into_iter()
        .map(|p| (p.port_name, describe_port_type(&p.port_type)))
        .collect())
}

fn describe_port_type(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(info) => match (&info.manufacturer, &info.product) {
            (Some(manufacturer), Some(product)) => format!("USB ({manufacturer} {product})"),
            (_, Some(product)) => format!("USB ({product})"),
            _ => format!("USB ({:04x}:{:04x})", info.vid, info.pid),
        },
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::Unknown => "Unknown".to_string(),
    }
}
