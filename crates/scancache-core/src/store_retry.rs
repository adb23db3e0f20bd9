//! 存储适配器：对瞬时不可用做指数退避重试
//!
//! 重试放在存储层而非协调器，协调器本身保持确定性。
use std::time::Duration;
use tracing::warn;

use crate::fingerprint::Fingerprint;
use crate::store::{ResultStore, StoreError};
use crate::types::{ScanRecord, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次），至少为 1
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(50) }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        // attempt 从 1 开始：base, 2*base, 4*base ...
        self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

pub struct RetryStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ResultStore> RetryStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &str, mut f: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Err(e) if e.is_transient() && attempt < max => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(op, attempt, max_attempts = max, ?delay, error = %e, "result store unavailable, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<S: ResultStore> ResultStore for RetryStore<S> {
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<ScanRecord>, StoreError> {
        self.run("find", || self.inner.find(fingerprint))
    }

    // DuplicateKey 不是瞬时错误，不会被重试
    fn insert(&self, record: ScanRecord) -> Result<(), StoreError> {
        self.run("insert", || self.inner.insert(record.clone()))
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.run("count", || self.inner.count())
    }

    fn count_where(&self, verdict: Verdict) -> Result<u64, StoreError> {
        self.run("count_where", || self.inner.count_where(verdict))
    }

    fn counts(&self) -> Result<(u64, u64), StoreError> {
        self.run("counts", || self.inner.counts())
    }
}
