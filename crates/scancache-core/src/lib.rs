//! 扫描结果缓存与判定流水线
//!
//! 设计要点：
//! - 以内容 SHA-256 指纹去重，相同内容永不重复扫描。
//! - 引擎是可插拔能力（`ScanEngine`），构造时注入，协调器不感知具体策略。
//! - 结果库只追加；并发提交相同内容时由存储层原子插入决定唯一记录，先提交者胜。
//! - 统计由结果库派生，`cache_size` 恒等于 `total_files_scanned`。

mod fingerprint;
mod types;
mod options;
mod rules;
mod engine;
mod engine_substring;
mod engine_signature;
mod store;
mod store_jsonl;
mod store_retry;
mod coordinator;
mod stats;
mod batch;

pub use fingerprint::{fingerprint, Fingerprint, FingerprintError, FINGERPRINT_HEX_LEN};
pub use types::{Detection, ScanRecord, SubmitterId, Verdict};
pub use options::{Config, ConfigError, EngineConfig, EngineKind, ScanConfig, StoreConfig, STORE_ENV};
pub use engine::{build_engine, EngineError, ScanEngine};
pub use engine_substring::{SubstringHeuristicEngine, DEFAULT_MARKER};
pub use engine_signature::SignatureEngine;
pub use store::{open_store, MemoryStore, ResultStore, StoreError};
pub use store_jsonl::JsonlStore;
pub use store_retry::{RetryPolicy, RetryStore};
pub use coordinator::{ScanCoordinator, ScanError, SubmitOutcome};
pub use stats::{snapshot, StatsSnapshot};
pub use batch::{submit_paths_and_write, BatchStats, FailureKind};
