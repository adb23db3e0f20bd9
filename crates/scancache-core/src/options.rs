//! 配置（TOML 文件 + 默认值；CLI 参数在外层覆盖）
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine_substring::DEFAULT_MARKER;
use crate::types::SubmitterId;

/// 环境变量：结果库路径
pub const STORE_ENV: &str = "SCANCACHE_STORE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 引擎类型
/// - Substring：占位启发式，大小写不敏感的标记词查找
/// - Signature：基于 TOML 规则文件的字节级正则签名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Substring,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Substring 引擎的标记词
    pub marker: String,
    /// Signature 引擎的规则文件
    pub rules_path: Option<PathBuf>,
    /// 单次扫描时限（毫秒）；None 表示不限
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Substring,
            marker: DEFAULT_MARKER.to_string(),
            rules_path: None,
            timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON Lines 结果库路径；None 表示仅内存
    pub path: Option<PathBuf>,
    /// 存储不可用时的最大尝试次数（含首次）
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: None, retry_attempts: 3, retry_base_delay_ms: 50 }
    }
}

/// 批量提交选项
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    pub submitter_id: Option<SubmitterId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub scan: ScanConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 未配置路径时回退到环境变量 SCANCACHE_STORE
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store
            .path
            .clone()
            .or_else(|| std::env::var_os(STORE_ENV).map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.engine.marker, "virus");
        assert_eq!(cfg.engine.kind, EngineKind::Substring);
        assert_eq!(cfg.store.retry_attempts, 3);
        assert!(cfg.engine.timeout().is_none());
    }

    #[test]
    fn partial_sections() {
        let cfg = Config::from_toml_str(
            r#"
            [engine]
            kind = "signature"
            rules_path = "rules/av.toml"
            timeout_ms = 1500

            [scan]
            threads = 4
            submitter_id = 12
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.kind, EngineKind::Signature);
        assert_eq!(cfg.engine.marker, "virus");
        assert_eq!(cfg.engine.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(cfg.scan.threads, Some(4));
        assert_eq!(cfg.scan.submitter_id, Some(SubmitterId(12)));
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn unknown_engine_kind_is_an_error() {
        let err = Config::from_toml_str("[engine]\nkind = \"sandbox\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/scancache.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
