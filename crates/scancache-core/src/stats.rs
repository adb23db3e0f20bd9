//! 统计汇总（由结果库派生）
use serde::{Deserialize, Serialize};

use crate::store::{ResultStore, StoreError};

/// 对外字段名保持兼容：total_files_scanned / total_viruses_detected / cache_size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "total_files_scanned")]
    pub total_scanned: u64,
    #[serde(rename = "total_viruses_detected")]
    pub total_malicious: u64,
    /// 恒等于 total_scanned：每个被扫描过的指纹恰好一条记录
    #[serde(rename = "cache_size")]
    pub cache_entry_count: u64,
}

/// 总数与恶意数取自同一次读取（见 `ResultStore::counts`）
pub fn snapshot(store: &dyn ResultStore) -> Result<StatsSnapshot, StoreError> {
    let (total, malicious) = store.counts()?;
    Ok(StatsSnapshot { total_scanned: total, total_malicious: malicious, cache_entry_count: total })
}
