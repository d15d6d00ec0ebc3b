//! 命令定义和实现

pub mod identity;
pub mod list;
pub mod props;
pub mod watch;

pub use identity::IdentityCommand;
pub use list::ListCommand;
pub use props::PropsCommand;
pub use unblock_test::UnblockTestCommand;
pub use watch::WatchCommand;

use anyhow::{Context, Result};
use plugwatch_core::{Session, SessionConfig, UdevRegistry};
use std::path::PathBuf;

/// 所有子命令共享的选项
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl GlobalOptions {
    /// 加载会话配置（未指定时使用默认值）
    pub fn session_config(&self) -> Result<SessionConfig> {
        match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("加载配置文件失败: {}", path.display())),
            None => Ok(SessionConfig::default()),
        }
    }
}

/// CLI 只使用 libudev 后端（仅 Linux）
pub type CliSession = Session<UdevRegistry>;

/// 打开 libudev 会话
pub fn open_session(options: &GlobalOptions) -> Result<CliSession> {
    let config = options.session_config()?;
    CliSession::open_udev(config).context("初始化设备会话失败")
}

/// 以 JSON 输出
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_session_config() {
        let options = GlobalOptions::default();
        assert_eq!(options.session_config().unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_session_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "virtual_marker = \"pseudo\"").unwrap();

        let options = GlobalOptions {
            config: Some(file.path().to_path_buf()),
            json: false,
        };
        assert_eq!(options.session_config().unwrap().virtual_marker, "pseudo");
    }

    #[test]
    fn test_missing_config_file() {
        let options = GlobalOptions {
            config: Some(PathBuf::from("/nonexistent/plugwatch.toml")),
            json: false,
        };
        assert!(options.session_config().is_err());
    }
}
