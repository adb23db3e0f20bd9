//! 公共类型（判定、扫描记录、提交者）
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fingerprint::Fingerprint;

/// 扫描判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Malicious,
}

impl Verdict {
    pub fn is_malicious(self) -> bool {
        matches!(self, Verdict::Malicious)
    }

    /// 新扫描结果的展示文案
    pub fn fresh_message(self) -> &'static str {
        match self {
            Verdict::Malicious => "Virus detected",
            Verdict::Clean => "File is clean",
        }
    }

    /// 命中缓存时的展示文案
    pub fn cached_message(self) -> &'static str {
        match self {
            Verdict::Malicious => "File has already been scanned. Virus detected!!",
            Verdict::Clean => "File has already been scanned. File is clean!!",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clean => f.write_str("clean"),
            Verdict::Malicious => f.write_str("malicious"),
        }
    }
}

/// 单次引擎调用的输出：判定 + 诊断信息（不单独持久化，折叠进 ScanRecord）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub verdict: Verdict,
    /// 产生判定的引擎名
    pub engine: String,
    /// 例如命中的标记/规则与字节偏移
    pub detail: Option<String>,
}

impl Detection {
    pub fn clean(engine: &str) -> Self {
        Self { verdict: Verdict::Clean, engine: engine.to_string(), detail: None }
    }

    pub fn malicious(engine: &str, detail: impl Into<String>) -> Self {
        Self { verdict: Verdict::Malicious, engine: engine.to_string(), detail: Some(detail.into()) }
    }
}

/// 提交者引用（外部身份子系统的不透明外键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmitterId(pub i64);

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 扫描记录：每个指纹恰好一条，写入后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub fingerprint: Fingerprint,
    pub verdict: Verdict,
    /// 仅供参考，不参与身份；同一指纹可能对应多个文件名
    #[serde(default)]
    pub original_name: Option<String>,
    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub submitter_id: Option<SubmitterId>,
    pub engine: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ScanRecord {
    /// 由引擎输出构建新记录（时间戳取当前 UTC）
    pub fn from_detection(
        fingerprint: Fingerprint,
        detection: Detection,
        original_name: Option<String>,
        submitter_id: Option<SubmitterId>,
    ) -> Self {
        Self {
            fingerprint,
            verdict: detection.verdict,
            original_name,
            scanned_at: Utc::now(),
            submitter_id,
            engine: detection.engine,
            detail: detection.detail,
        }
    }
}
