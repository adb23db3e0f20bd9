//! 扫描引擎抽象（构造时选定实现，调用方不感知具体策略）
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::engine_signature::SignatureEngine;
use crate::engine_substring::SubstringHeuristicEngine;
use crate::options::{EngineConfig, EngineKind};
use crate::types::Detection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 超出调用方给定的截止时间
    #[error("engine {engine} exceeded its deadline after {elapsed:?}")]
    DeadlineExceeded { engine: String, elapsed: Duration },

    /// 引擎内部故障；不得当作 clean 处理
    #[error("engine {engine} failed: {message}")]
    Fault { engine: String, message: String },
}

/// 扫描能力：检查字节内容并给出判定
///
/// - 实现可能很慢（签名库、沙箱、远程 AV），协调器不会在调用期间持有任何锁；
/// - 无法解码的二进制内容按“不匹配”处理，不能报错；
/// - `deadline` 为可选截止时间，慢引擎应在检查点自行放弃。
pub trait ScanEngine: Send + Sync {
    fn name(&self) -> &str;

    fn scan(&self, content: &[u8], deadline: Option<Instant>) -> Result<Detection, EngineError>;
}

/// 检查点：若已过截止时间则返回 DeadlineExceeded
pub(crate) fn check_deadline(engine: &str, started: Instant, deadline: Option<Instant>) -> Result<(), EngineError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(EngineError::DeadlineExceeded {
            engine: engine.to_string(),
            elapsed: started.elapsed(),
        }),
        _ => Ok(()),
    }
}

/// 按配置构建引擎实例
pub fn build_engine(cfg: &EngineConfig) -> anyhow::Result<Arc<dyn ScanEngine>> {
    let engine: Arc<dyn ScanEngine> = match cfg.kind {
        EngineKind::Substring => Arc::new(SubstringHeuristicEngine::new(&cfg.marker)?),
        EngineKind::Signature => {
            let path = cfg
                .rules_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("signature engine requires a rules file"))?;
            Arc::new(SignatureEngine::from_file(path)?)
        }
    };
    Ok(engine)
}
