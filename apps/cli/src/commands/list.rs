//! 列出当前已接入的设备

use super::{GlobalOptions, open_session, print_json};
use anyhow::Result;
use clap::Args;
use plugwatch_core::DeviceType;
use serde::Serialize;
use std::path::PathBuf;

/// 列表命令参数
#[derive(Args, Debug)]
pub struct ListCommand {
    /// 只列出指定类型（usb / tty）
    #[arg(short = 't', long = "type", value_parser = parse_device_type)]
    pub device_type: Option<DeviceType>,
}

/// 一行输出
#[derive(Debug, Serialize)]
struct ListedDevice {
    path: PathBuf,
    device_type: DeviceType,
    identity: Option<String>,
    port_node: Option<PathBuf>,
}

fn parse_device_type(s: &str) -> Result<DeviceType, String> {
    match s.to_ascii_lowercase().as_str() {
        "usb" => Ok(DeviceType::Usb),
        "tty" => Ok(DeviceType::Tty),
        other => Err(format!("unknown device type '{}', expected usb or tty", other)),
    }
}

impl ListCommand {
    pub fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let session = open_session(options)?;

        let devices: Vec<ListedDevice> = session
            .scan()?
            .into_iter()
            .filter(|entry| self.device_type.is_none_or(|t| t == entry.device_type))
            .map(|entry| ListedDevice {
                identity: session.identity(&entry.path),
                port_node: session.port_node(&entry.path),
                path: entry.path,
                device_type: entry.device_type,
            })
            .collect();

        if options.json {
            return print_json(&devices);
        }

        if devices.is_empty() {
            println!("未发现设备");
            return Ok(());
        }

        for device in &devices {
            println!(
                "{:<4} {:<40} {:<14} {}",
                device.device_type,
                device.identity.as_deref().unwrap_or("-"),
                device
                    .port_node
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                device.path.display()
            );
        }
        println!("共 {} 个设备", devices.len());

        Ok(())
    }
}
