//! 扫描协调器：指纹 → 查缓存 →（未命中）调用引擎 → 持久化 → 返回
//!
//! 并发模型：
//! - 协调器自身不持有任何锁，引擎调用期间不会阻塞其他指纹；
//! - 同一指纹“查不到 → 插入”之间的竞争交给结果库的原子插入裁决，先提交者胜；
//! - 落败方丢弃本地判定，重新读取胜者记录并以 cache_hit=true 返回。
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::{EngineError, ScanEngine};
use crate::fingerprint::{fingerprint, Fingerprint, FingerprintError};
use crate::store::{ResultStore, StoreError};
use crate::types::{ScanRecord, SubmitterId, Verdict};

#[derive(Error, Debug)]
pub enum ScanError {
    /// 空上传：不进入指纹计算与引擎
    #[error("Empty file uploaded.")]
    EmptyInput,

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// 引擎故障：不写入记录，调用方可重试或告警
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// 存储瞬时故障
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 单次提交的结果
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub fingerprint: Fingerprint,
    pub verdict: Verdict,
    pub cache_hit: bool,
    /// 结果库中该指纹的唯一记录
    pub record: ScanRecord,
}

impl SubmitOutcome {
    pub fn message(&self) -> &'static str {
        if self.cache_hit {
            self.verdict.cached_message()
        } else {
            self.verdict.fresh_message()
        }
    }
}

pub struct ScanCoordinator {
    store: Arc<dyn ResultStore>,
    engine: Arc<dyn ScanEngine>,
    engine_timeout: Option<Duration>,
}

impl ScanCoordinator {
    pub fn new(store: Arc<dyn ResultStore>, engine: Arc<dyn ScanEngine>) -> Self {
        Self { store, engine, engine_timeout: None }
    }

    /// 为每次引擎调用设置截止时间
    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = Some(timeout);
        self
    }

    pub fn submit(
        &self,
        content: &[u8],
        original_name: Option<&str>,
        submitter_id: Option<SubmitterId>,
    ) -> Result<SubmitOutcome, ScanError> {
        if content.is_empty() {
            return Err(ScanError::EmptyInput);
        }
        let fp = fingerprint(content)?;
        let name = original_name.unwrap_or("<unnamed>");

        if let Some(record) = self.store.find(&fp)? {
            info!(file = name, fingerprint = %fp, verdict = %record.verdict, "cache hit");
            return Ok(hit(record));
        }

        let deadline = self.engine_timeout.map(|t| Instant::now() + t);
        let detection = match self.engine.scan(content, deadline) {
            Ok(d) => d,
            Err(e) => {
                error!(file = name, fingerprint = %fp, error = %e, "scan engine failed");
                return Err(e.into());
            }
        };

        let record = ScanRecord::from_detection(
            fp.clone(),
            detection,
            original_name.map(str::to_string),
            submitter_id,
        );
        match self.store.insert(record.clone()) {
            Ok(()) => {
                info!(file = name, fingerprint = %fp, verdict = %record.verdict, engine = %record.engine, "scanned");
                Ok(SubmitOutcome { fingerprint: fp, verdict: record.verdict, cache_hit: false, record })
            }
            Err(StoreError::DuplicateKey(_)) => {
                // 并发提交相同内容且对方先提交：以已存记录为准
                warn!(file = name, fingerprint = %fp, "lost insert race, returning stored verdict");
                match self.store.find(&fp)? {
                    Some(winner) => Ok(hit(winner)),
                    None => Err(StoreError::Unavailable(format!(
                        "record for {fp} reported as duplicate but could not be read back"
                    ))
                    .into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 只读查询
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ScanRecord>, ScanError> {
        Ok(self.store.find(fingerprint)?)
    }
}

fn hit(record: ScanRecord) -> SubmitOutcome {
    SubmitOutcome {
        fingerprint: record.fingerprint.clone(),
        verdict: record.verdict,
        cache_hit: true,
        record,
    }
}
