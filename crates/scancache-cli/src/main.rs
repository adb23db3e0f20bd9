use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scancache_core::{
    build_engine, fingerprint, open_store, snapshot, submit_paths_and_write, Config, EngineKind, Fingerprint,
    ResultStore, ScanCoordinator, SubmitterId,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "scancache", version, about = "Content-addressed scan result cache")]
struct Cli {
    /// 配置文件（TOML）；命令行参数优先
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 结果库文件（JSON Lines）；也可由 SCANCACHE_STORE 指定，缺省为仅内存
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 提交文件或目录，输出判定 JSON 数组
    Scan {
        /// 输入文件或目录
        #[arg(long)]
        input: PathBuf,

        /// 输出文件；缺省写到标准输出
        #[arg(long)]
        output: Option<PathBuf>,

        /// 引擎：substring 或 signature
        #[arg(long, value_parser = ["substring", "signature"])]
        engine: Option<String>,

        /// 签名规则文件（TOML），signature 引擎使用
        #[arg(long)]
        rules: Option<PathBuf>,

        /// substring 引擎的标记词
        #[arg(long)]
        marker: Option<String>,

        /// 线程数（"auto"=CPU 核心数）
        #[arg(long)]
        threads: Option<String>,

        /// 最大文件大小（字节）
        #[arg(long)]
        max_file_size: Option<u64>,

        /// 单次扫描时限（毫秒）
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// 提交者 ID
        #[arg(long)]
        submitter: Option<i64>,
    },
    /// 打印统计信息
    Stats,
    /// 按指纹查询已存记录
    Lookup {
        fingerprint: String,
    },
    /// 计算文件指纹
    Hash {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };
    if cli.store.is_some() {
        cfg.store.path = cli.store.clone();
    }

    match cli.command {
        Commands::Scan { input, output, engine, rules, marker, threads, max_file_size, timeout_ms, submitter } => {
            if let Some(engine) = engine {
                cfg.engine.kind = if engine == "signature" { EngineKind::Signature } else { EngineKind::Substring };
            }
            if rules.is_some() { cfg.engine.rules_path = rules; }
            if let Some(marker) = marker { cfg.engine.marker = marker; }
            if let Some(threads) = threads { cfg.scan.threads = parse_threads(&threads); }
            if max_file_size.is_some() { cfg.scan.max_file_size = max_file_size; }
            if timeout_ms.is_some() { cfg.engine.timeout_ms = timeout_ms; }
            if let Some(id) = submitter { cfg.scan.submitter_id = Some(SubmitterId(id)); }

            run_scan(&cfg, &input, output.as_deref())?;
        }
        Commands::Stats => {
            let store = open_configured_store(&cfg)?;
            let stats = snapshot(store.as_ref()).context("read stats")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Lookup { fingerprint } => {
            let fp = Fingerprint::parse(&fingerprint)?;
            let store = open_configured_store(&cfg)?;
            match store.find(&fp).context("lookup failed")? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    warn!(fingerprint = %fp, "no record for fingerprint");
                    std::process::exit(1);
                }
            }
        }
        Commands::Hash { file } => {
            let content = std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            println!("{}", fingerprint(&content)?);
        }
    }

    Ok(())
}

fn open_configured_store(cfg: &Config) -> Result<Arc<dyn ResultStore>> {
    let path = cfg.store_path();
    if path.is_none() {
        warn!("no store configured, results are kept in memory only");
    }
    open_store(&cfg.store, path.as_deref()).context("open result store")
}

fn run_scan(cfg: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    info!(?input, ?output, engine = ?cfg.engine.kind, "starting scan");

    let store = open_configured_store(cfg)?;
    let engine = build_engine(&cfg.engine).context("build scan engine")?;
    let mut coordinator = ScanCoordinator::new(store, engine);
    if let Some(timeout) = cfg.engine.timeout() {
        coordinator = coordinator.with_engine_timeout(timeout);
    }

    // 以缓冲方式写出，按 JSON 数组流式输出
    let mut out: BufWriter<Box<dyn Write>> = match output {
        Some(path) => BufWriter::new(Box::new(File::create(path).context("create output file")?)),
        None => BufWriter::new(Box::new(std::io::stdout().lock())),
    };
    let stats = submit_paths_and_write(&coordinator, input, &mut out, &cfg.scan).context("scan and write failed")?;
    writeln!(out)?;
    out.flush()?;

    info!(
        files_submitted = stats.files_submitted,
        cache_hits = stats.cache_hits,
        fresh_scans = stats.fresh_scans,
        malicious = stats.malicious,
        failures = stats.failures,
        skipped = stats.skipped,
        "scan finished"
    );
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 日志写到 stderr，避免与 JSON 输出混在一起
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数
fn parse_threads(s: &str) -> Option<usize> {
    if s.eq_ignore_ascii_case("auto") { return None; }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}
