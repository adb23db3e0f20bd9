//! 批量提交与并行调度（文件或目录 → 协调器 → JSON 数组）
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::coordinator::{ScanCoordinator, ScanError, SubmitOutcome};
use crate::options::ScanConfig;
use crate::types::Verdict;

/// 批量统计（便于 CLI 打印）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub files_submitted: usize,
    pub cache_hits: usize,
    pub fresh_scans: usize,
    pub malicious: usize,
    pub failures: usize,
    pub skipped: usize,
}

/// 失败类别，输出为稳定的 snake_case 字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 读取文件失败
    Read,
    EmptyInput,
    InvalidInput,
    Engine,
    Store,
}

impl From<&ScanError> for FailureKind {
    fn from(e: &ScanError) -> Self {
        match e {
            ScanError::EmptyInput => FailureKind::EmptyInput,
            ScanError::Fingerprint(_) => FailureKind::InvalidInput,
            ScanError::Engine(_) => FailureKind::Engine,
            ScanError::Store(_) => FailureKind::Store,
        }
    }
}

/// 输出项（JSON 数组中的单个元素）
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OutputItem<'a> {
    Submitted {
        path: &'a str,
        fingerprint: &'a str,
        verdict: Verdict,
        cache_hit: bool,
        message: &'a str,
    },
    Failed {
        path: &'a str,
        kind: FailureKind,
        error: &'a str,
    },
}

enum FileResult {
    Submitted(SubmitOutcome),
    Failed { kind: FailureKind, message: String },
    Skipped,
}

/// 提交单个文件或整个目录，并将结果以 JSON 数组流式写入 `out`
///
/// 文件按路径排序，输出顺序与线程数无关；`threads > 1` 时并行提交，
/// 由单线程 writer 按序号重排后输出。
pub fn submit_paths_and_write(
    coordinator: &ScanCoordinator,
    input: &Path,
    out: &mut dyn Write,
    opts: &ScanConfig,
) -> Result<BatchStats> {
    let files = collect_files(input)?;
    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    debug!(files = files.len(), threads, "collected input files");

    let mut stats = BatchStats::default();
    if threads > 1 && files.len() > 1 {
        submit_parallel(coordinator, &files, out, opts, threads, &mut stats)?;
        return Ok(stats);
    }

    write!(out, "[")?;
    let mut first = true;
    for path in &files {
        let res = submit_one(coordinator, path, opts);
        emit(out, &mut first, path, res, &mut stats)?;
    }
    write!(out, "]")?;
    Ok(stats)
}

fn collect_files(input: &Path) -> Result<Vec<PathBuf>> {
    let md = std::fs::metadata(input).with_context(|| format!("stat input {}", input.display()))?;
    if md.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(input).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() { files.push(entry.into_path()); }
    }
    files.sort();
    Ok(files)
}

fn submit_one(coordinator: &ScanCoordinator, path: &Path, opts: &ScanConfig) -> FileResult {
    if let Some(max) = opts.max_file_size {
        if let Ok(md) = std::fs::metadata(path) {
            if md.len() > max {
                return FileResult::Skipped;
            }
        }
    }
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) => return FileResult::Failed { kind: FailureKind::Read, message: format!("read failed: {e}") },
    };
    let name = path.file_name().and_then(|s| s.to_str());
    match coordinator.submit(&content, name, opts.submitter_id) {
        Ok(outcome) => FileResult::Submitted(outcome),
        Err(e) => FileResult::Failed { kind: FailureKind::from(&e), message: e.to_string() },
    }
}

fn emit(out: &mut dyn Write, first: &mut bool, path: &Path, res: FileResult, stats: &mut BatchStats) -> Result<()> {
    let path_str = path.to_string_lossy();
    let item = match &res {
        FileResult::Skipped => {
            stats.skipped += 1;
            return Ok(());
        }
        FileResult::Submitted(o) => {
            stats.files_submitted += 1;
            if o.cache_hit { stats.cache_hits += 1 } else { stats.fresh_scans += 1 }
            if o.verdict.is_malicious() { stats.malicious += 1 }
            OutputItem::Submitted {
                path: &path_str,
                fingerprint: o.fingerprint.as_str(),
                verdict: o.verdict,
                cache_hit: o.cache_hit,
                message: o.message(),
            }
        }
        FileResult::Failed { kind, message } => {
            stats.failures += 1;
            OutputItem::Failed { path: &path_str, kind: *kind, error: message }
        }
    };
    if !*first { write!(out, ",")?; } else { *first = false; }
    serde_json::to_writer(&mut *out, &item)?;
    Ok(())
}

/// 并行调度：
/// - Rayon 线程池并行读取并提交
/// - 当前线程作为 writer，按 idx 重排后流式写 JSON
fn submit_parallel(
    coordinator: &ScanCoordinator,
    files: &[PathBuf],
    out: &mut dyn Write,
    opts: &ScanConfig,
    threads: usize,
    stats: &mut BatchStats,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;
    use std::collections::BTreeMap;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build rayon pool")?;

    let (tx, rx) = channel::bounded::<(usize, FileResult)>(256);

    // 闭包按值持有 rx：writer 出错返回时 rx 随之释放，
    // worker 的 send 随即失败，尚未开始的文件不再提交
    std::thread::scope(move |s| -> Result<()> {
        s.spawn(move || {
            let sent = pool.install(|| {
                files.par_iter().enumerate().try_for_each_with(tx, |tx, (idx, path)| {
                    tx.send((idx, submit_one(coordinator, path, opts)))
                })
            });
            if sent.is_err() {
                debug!("output closed, remaining files not submitted");
            }
            // 所有 Sender 在此之后被丢弃，Receiver 收到关闭信号
        });

        write!(out, "[")?;
        let mut first = true;
        let mut next_idx = 0usize;
        let mut pending: BTreeMap<usize, FileResult> = BTreeMap::new();

        while let Ok((idx, res)) = rx.recv() {
            pending.insert(idx, res);
            while let Some(res) = pending.remove(&next_idx) {
                emit(out, &mut first, &files[next_idx], res, stats)?;
                next_idx += 1;
            }
        }
        write!(out, "]")?;
        Ok(())
    })
}
