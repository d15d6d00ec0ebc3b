//! 查询 USB 描述符属性

use super::{GlobalOptions, open_session};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// 属性命令参数
#[derive(Args, Debug)]
pub struct PropsCommand {
    /// 设备 syspath（USB 接口或 USB 转串口）
    pub path: PathBuf,
}

impl PropsCommand {
    pub fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let session = open_session(options)?;
        let properties = session.try_usb_properties(&self.path)?;

        if options.json {
            // 保持固定键顺序
            let map: serde_json::Map<String, serde_json::Value> = properties
                .iter()
                .map(|(key, value)| (key.to_string(), value.into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
            return Ok(());
        }

        for (key, value) in properties.iter() {
            println!("{:<20} {}", key, value.unwrap_or(""));
        }
        Ok(())
    }
}
