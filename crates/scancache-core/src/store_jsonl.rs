//! 持久化结果库：只追加的 JSON Lines 文件 + 内存索引
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::store::{counts_of, poisoned, ResultStore, StoreError};
use crate::types::{ScanRecord, Verdict};

/// 每行一条 ScanRecord。
///
/// 插入时持有追加锁完成“检查 → 追加 → 发布到索引”，
/// 因此记录只有在写入文件之后才对 `find` 可见，同一指纹也只会追加一次。
pub struct JsonlStore {
    path: PathBuf,
    index: RwLock<HashMap<Fingerprint, ScanRecord>>,
    appender: Mutex<Appender<File>>,
}

/// 可回退的追加目标
trait AppendTarget: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// 不带缓冲的追加器，记住最后一条完整记录的结束位置。
///
/// 一行要么完整写入，要么回退到写入前的长度；失败的行不会残留在缓冲里被之后的写入带出。
struct Appender<W> {
    out: W,
    len: u64,
}

impl<W: AppendTarget> Appender<W> {
    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        if let Err(e) = self.out.write_all(line).and_then(|()| self.out.flush()) {
            if let Err(te) = self.out.truncate_to(self.len) {
                // 回退失败时留下的半行由下次打开时的回放丢弃
                warn!(error = %te, len = self.len, "failed to roll back partial record");
            }
            return Err(e);
        }
        self.len += line.len() as u64;
        Ok(())
    }
}

fn unavailable(path: &Path, e: io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", path.display(), e))
}

impl JsonlStore {
    /// 打开（必要时创建）结果库文件，并回放已有记录
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| unavailable(&path, e))?;

        let (index, len) = replay(&path, &file)?;
        debug!(path = %path.display(), records = index.len(), bytes = len, "opened result store");

        Ok(Self {
            path,
            index: RwLock::new(index),
            appender: Mutex::new(Appender { out: file, len }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 回放文件，返回索引与有效内容长度。
///
/// 最后一行若没有换行符，说明上次追加中途失败：丢弃并截断。
/// 中间行解析失败则视为损坏，拒绝打开。
fn replay(path: &Path, file: &File) -> Result<(HashMap<Fingerprint, ScanRecord>, u64), StoreError> {
    let mut index = HashMap::new();
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut offset = 0u64;
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(|e| unavailable(path, e))?;
        if n == 0 {
            break;
        }
        line_no += 1;

        if buf.last() != Some(&b'\n') {
            warn!(path = %path.display(), line = line_no, bytes = n, "discarding torn record at end of store file");
            file.set_len(offset).map_err(|e| unavailable(path, e))?;
            break;
        }
        offset += n as u64;

        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record: ScanRecord = serde_json::from_slice(&buf)
            .map_err(|e| StoreError::Corrupt { line: line_no, message: e.to_string() })?;
        // 文件中若出现重复指纹，以最早的一条为准
        if index.contains_key(&record.fingerprint) {
            warn!(fingerprint = %record.fingerprint, line = line_no, "ignoring duplicate record in store file");
            continue;
        }
        index.insert(record.fingerprint.clone(), record);
    }
    Ok((index, offset))
}

impl ResultStore for JsonlStore {
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<ScanRecord>, StoreError> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.get(fingerprint).cloned())
    }

    fn insert(&self, record: ScanRecord) -> Result<(), StoreError> {
        let mut appender = self.appender.lock().map_err(poisoned)?;
        if self.index.read().map_err(poisoned)?.contains_key(&record.fingerprint) {
            return Err(StoreError::DuplicateKey(record.fingerprint));
        }

        let mut line = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Unavailable(format!("encode record: {e}")))?;
        line.push(b'\n');
        appender.append(&line).map_err(|e| unavailable(&self.path, e))?;

        self.index
            .write()
            .map_err(poisoned)?
            .insert(record.fingerprint.clone(), record);
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.index.read().map_err(poisoned)?.len() as u64)
    }

    fn count_where(&self, verdict: Verdict) -> Result<u64, StoreError> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.values().filter(|r| r.verdict == verdict).count() as u64)
    }

    fn counts(&self) -> Result<(u64, u64), StoreError> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(counts_of(index.values()))
    }
}
