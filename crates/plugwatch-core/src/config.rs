//! 会话配置
//!
//! 默认值与 libudev 参考行为一致，通常不需要修改。启用 `serde` feature 后
//! 可以从 TOML 文件加载：
//!
//! ```toml
//! virtual_marker = "virtual"
//!
//! [scan]
//! initial_capacity = 50
//! growth_increment = 10
//!
//! [[monitor_rules]]
//! subsystem = "tty"
//!
//! [[monitor_rules]]
//! subsystem = "usb"
//! devtype = "usb_interface"
//! ```

use plugwatch_registry::MatchRule;
use plugwatch_types::names::VIRTUAL_MARKER;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[cfg(feature = "serde")]
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[cfg(feature = "serde")]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 配置值无效
    #[error("{0}")]
    Invalid(String),
}

/// 扫描结果存储配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScanConfig {
    /// 初始容量（条目数）
    pub initial_capacity: usize,
    /// 容量用尽时的固定增量（条目数）
    pub growth_increment: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 50,
            growth_increment: 10,
        }
    }
}

/// 会话配置
///
/// # Example
///
/// ```
/// use plugwatch_core::SessionConfig;
///
/// let config = SessionConfig::default();
/// assert_eq!(config.scan.initial_capacity, 50);
/// assert_eq!(config.virtual_marker, "virtual");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    pub scan: ScanConfig,
    /// syspath 中包含该子串的 tty 设备视为虚拟设备，不对外报告
    pub virtual_marker: String,
    /// 等待集合的描述符上限，初始化时描述符 `>=` 此值即失败
    pub max_descriptor: usize,
    /// 监视器过滤规则
    pub monitor_rules: Vec<MatchRule>,
    /// 枚举规则（只使用其中的子系统）
    pub scan_rules: Vec<MatchRule>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            virtual_marker: VIRTUAL_MARKER.to_string(),
            max_descriptor: libc::FD_SETSIZE,
            monitor_rules: MatchRule::defaults(),
            scan_rules: MatchRule::defaults(),
        }
    }
}

impl SessionConfig {
    /// 检查配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.growth_increment == 0 {
            return Err(ConfigError::Invalid(
                "scan.growth_increment must be greater than 0".to_string(),
            ));
        }
        if self.virtual_marker.is_empty() {
            return Err(ConfigError::Invalid("virtual_marker must not be empty".to_string()));
        }
        if self.max_descriptor == 0 {
            return Err(ConfigError::Invalid("max_descriptor must be greater than 0".to_string()));
        }
        if self.monitor_rules.is_empty() {
            return Err(ConfigError::Invalid("monitor_rules must not be empty".to_string()));
        }
        if self.scan_rules.is_empty() {
            return Err(ConfigError::Invalid("scan_rules must not be empty".to_string()));
        }
        Ok(())
    }

    /// 从 TOML 字符串解析（缺省字段使用默认值）
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    #[cfg(feature = "serde")]
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
