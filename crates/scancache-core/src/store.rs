//! 结果库契约与内存实现
//!
//! 结果库是唯一的共享可变状态，只追加：
//! - 不提供 update/delete，记录写入即不可变；
//! - `insert` 必须是原子的“不存在才插入”，并发写同一指纹时由存储层决定唯一胜者。
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::options::StoreConfig;
use crate::store_jsonl::JsonlStore;
use crate::store_retry::{RetryPolicy, RetryStore};
use crate::types::{ScanRecord, Verdict};

#[derive(Error, Debug)]
pub enum StoreError {
    /// 该指纹已有记录；调用方应视为“已缓存”而非致命错误
    #[error("record for {0} already exists")]
    DuplicateKey(Fingerprint),

    /// 连接失败等瞬时故障
    #[error("result store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record at line {line}: {message}")]
    Corrupt { line: usize, message: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub trait ResultStore: Send + Sync {
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<ScanRecord>, StoreError>;

    /// 已存在同指纹记录时返回 `StoreError::DuplicateKey`
    fn insert(&self, record: ScanRecord) -> Result<(), StoreError>;

    fn count(&self) -> Result<u64, StoreError>;

    fn count_where(&self, verdict: Verdict) -> Result<u64, StoreError>;

    /// 同一时刻的（总数, 恶意数）；实现应在一次读锁内取得，保证恶意数不超过总数
    fn counts(&self) -> Result<(u64, u64), StoreError> {
        let total = self.count()?;
        let malicious = self.count_where(Verdict::Malicious)?;
        Ok((total, malicious.min(total)))
    }
}

/// 进程内结果库：写锁内完成检查与插入
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Fingerprint, ScanRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

impl ResultStore for MemoryStore {
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<ScanRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(fingerprint).cloned())
    }

    fn insert(&self, record: ScanRecord) -> Result<(), StoreError> {
        use std::collections::hash_map::Entry;

        let mut records = self.records.write().map_err(poisoned)?;
        match records.entry(record.fingerprint.clone()) {
            Entry::Occupied(e) => Err(StoreError::DuplicateKey(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            }
        }
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().map_err(poisoned)?.len() as u64)
    }

    fn count_where(&self, verdict: Verdict) -> Result<u64, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.values().filter(|r| r.verdict == verdict).count() as u64)
    }

    fn counts(&self) -> Result<(u64, u64), StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(counts_of(records.values()))
    }
}

pub(crate) fn counts_of<'a>(records: impl Iterator<Item = &'a ScanRecord>) -> (u64, u64) {
    records.fold((0, 0), |(total, malicious), r| {
        (total + 1, malicious + u64::from(r.verdict == Verdict::Malicious))
    })
}

/// 按配置打开结果库：有路径则为 JSON Lines 文件，否则为内存库；统一套上重试适配器
pub fn open_store(cfg: &StoreConfig, path: Option<&Path>) -> Result<Arc<dyn ResultStore>, StoreError> {
    let policy = RetryPolicy {
        max_attempts: cfg.retry_attempts,
        base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
    };
    let store: Arc<dyn ResultStore> = match path {
        Some(p) => Arc::new(RetryStore::new(JsonlStore::open(p)?, policy)),
        None => Arc::new(RetryStore::new(MemoryStore::new(), policy)),
    };
    Ok(store)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::fingerprint::fingerprint;
    use crate::types::{Detection, ScanRecord, Verdict};

    pub(crate) fn record(content: &[u8], verdict: Verdict) -> ScanRecord {
        let detection = match verdict {
            Verdict::Clean => Detection::clean("test"),
            Verdict::Malicious => Detection::malicious("test", "fixture"),
        };
        ScanRecord::from_detection(fingerprint(content).unwrap(), detection, Some("fixture.bin".into()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn insert_then_find() {
        let store = MemoryStore::new();
        let rec = record(b"alpha", Verdict::Clean);
        assert!(store.find(&rec.fingerprint).unwrap().is_none());
        store.insert(rec.clone()).unwrap();
        assert_eq!(store.find(&rec.fingerprint).unwrap(), Some(rec));
    }

    #[test]
    fn duplicate_insert_keeps_first_record() {
        let store = MemoryStore::new();
        let first = record(b"alpha", Verdict::Clean);
        let second = record(b"alpha", Verdict::Malicious);
        store.insert(first.clone()).unwrap();

        let err = store.insert(second).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(ref fp) if *fp == first.fingerprint));
        assert!(!err.is_transient());
        assert_eq!(store.find(&first.fingerprint).unwrap().unwrap().verdict, Verdict::Clean);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn counts_by_verdict() {
        let store = MemoryStore::new();
        store.insert(record(b"a", Verdict::Clean)).unwrap();
        store.insert(record(b"b", Verdict::Malicious)).unwrap();
        store.insert(record(b"c", Verdict::Malicious)).unwrap();
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.count_where(Verdict::Malicious).unwrap(), 2);
        assert_eq!(store.count_where(Verdict::Clean).unwrap(), 1);
        assert_eq!(store.counts().unwrap(), (3, 2));
    }

    #[test]
    fn open_store_with_and_without_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.jsonl");
        let cfg = StoreConfig::default();

        let store = open_store(&cfg, Some(&path)).unwrap();
        store.insert(record(b"persisted", Verdict::Clean)).unwrap();
        drop(store);
        assert_eq!(open_store(&cfg, Some(&path)).unwrap().count().unwrap(), 1);

        assert_eq!(open_store(&cfg, None).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn concurrent_inserts_have_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let store = Arc::clone(&store);
                    let verdict = if i % 2 == 0 { Verdict::Clean } else { Verdict::Malicious };
                    s.spawn(move || store.insert(record(b"same", verdict)).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
        });
        assert_eq!(wins, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
