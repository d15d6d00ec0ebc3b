//! # Plugwatch CLI
//!
//! USB / 串口设备发现与热插拔监视的命令行工具。
//!
//! ```bash
//! # 列出当前已接入的设备
//! plugwatch list
//!
//! # 监视热插拔事件（Ctrl+C 退出）
//! plugwatch watch
//!
//! # 查询单个设备
//! plugwatch identity /sys/devices/.../ttyUSB0/tty/ttyUSB0
//! plugwatch props /sys/devices/.../ttyUSB0/tty/ttyUSB0 --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{IdentityCommand, ListCommand, PropsCommand, UnblockTestCommand, WatchCommand};

/// Plugwatch CLI - 设备发现与热插拔监视
#[derive(Parser, Debug)]
#[command(name = "plugwatch")]
#[command(about = "USB and serial device discovery and hot-plug monitoring", long_about = None)]
#[command(version)]
struct Cli {
    /// 会话配置文件（TOML）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 以 JSON 输出
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 列出当前已接入的设备
    List {
        #[command(flatten)]
        args: ListCommand,
    },

    /// 监视热插拔事件
    Watch {
        #[command(flatten)]
        args: WatchCommand,
    },

    /// 查询设备标识
    Identity {
        #[command(flatten)]
        args: IdentityCommand,
    },

    /// 查询 USB 描述符属性
    Props {
        #[command(flatten)]
        args: PropsCommand,
    },

    /// 验证 unblock 能唤醒阻塞中的事件循环
    UnblockTest {
        #[command(flatten)]
        args: UnblockTestCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plugwatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let options = commands::GlobalOptions {
        config: cli.config,
        json: cli.json,
    };

    match cli.command {
        Commands::List { args } => args.execute(&options),
        Commands::Watch { args } => args.execute(&options),
        Commands::Identity { args } => args.execute(&options),
        Commands::Props { args } => args.execute(&options),
        Commands::UnblockTest { args } => args.execute(&options),
    }
}
