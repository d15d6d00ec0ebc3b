//! 查询设备标识

use super::{GlobalOptions, open_session, print_json};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// 标识命令参数
#[derive(Args, Debug)]
pub struct IdentityCommand {
    /// 设备 syspath
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
struct IdentityReport {
    path: PathBuf,
    identity: String,
    device_type: Option<plugwatch_core::DeviceType>,
    port_node: Option<PathBuf>,
}

impl IdentityCommand {
    pub fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let session = open_session(options)?;

        let identity = session.try_identity(&self.path)?;
        let report = IdentityReport {
            path: self.path.clone(),
            identity: identity.to_string(),
            device_type: session.device_type(&self.path),
            port_node: session.port_node(&self.path),
        };

        if options.json {
            return print_json(&report);
        }

        println!("{}", report.identity);
        if let Some(device_type) = report.device_type {
            println!("  type: {}", device_type);
        }
        if let Some(port_node) = &report.port_node {
            println!("  port: {}", port_node.display());
        }
        Ok(())
    }
}
