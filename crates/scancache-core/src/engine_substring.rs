//! 子串启发式引擎（占位检测：不区分大小写查找标记词）
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::time::Instant;

use crate::engine::{check_deadline, EngineError, ScanEngine};
use crate::types::Detection;

/// 默认标记词
pub const DEFAULT_MARKER: &str = "virus";

pub struct SubstringHeuristicEngine {
    marker: String,
    ac: AhoCorasick,
}

impl SubstringHeuristicEngine {
    pub fn new(marker: &str) -> anyhow::Result<Self> {
        if marker.is_empty() {
            anyhow::bail!("substring engine marker must not be empty");
        }
        let ac = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostFirst)
            .build([marker])?;
        Ok(Self { marker: marker.to_string(), ac })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl ScanEngine for SubstringHeuristicEngine {
    fn name(&self) -> &str {
        "substring"
    }

    fn scan(&self, content: &[u8], deadline: Option<Instant>) -> Result<Detection, EngineError> {
        let started = Instant::now();
        let text = decode_ignoring_invalid(content);
        check_deadline(self.name(), started, deadline)?;

        match self.ac.find(&text) {
            Some(m) => Ok(Detection::malicious(
                self.name(),
                format!("marker {:?} at decoded offset {}", self.marker, m.start()),
            )),
            None => Ok(Detection::clean(self.name())),
        }
    }
}

/// 丢弃非法 UTF-8 序列，只保留可解码片段（二进制内容因此不会报错）
fn decode_ignoring_invalid(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    for chunk in content.utf8_chunks() {
        out.extend_from_slice(chunk.valid().as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;

    fn verdict(engine: &SubstringHeuristicEngine, content: &[u8]) -> Verdict {
        engine.scan(content, None).unwrap().verdict
    }

    #[test]
    fn clean_and_infected_samples() {
        let engine = SubstringHeuristicEngine::new(DEFAULT_MARKER).unwrap();
        assert_eq!(verdict(&engine, b"This is a clean file"), Verdict::Clean);
        assert_eq!(verdict(&engine, b"This file contains a virus"), Verdict::Malicious);
    }

    #[test]
    fn case_insensitive() {
        let engine = SubstringHeuristicEngine::new(DEFAULT_MARKER).unwrap();
        assert_eq!(verdict(&engine, b"VIRUS"), Verdict::Malicious);
        assert_eq!(verdict(&engine, b"ViRuS payload"), Verdict::Malicious);
    }

    #[test]
    fn binary_content_never_fails() {
        let engine = SubstringHeuristicEngine::new(DEFAULT_MARKER).unwrap();
        let blob: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        assert_eq!(verdict(&engine, &blob), Verdict::Clean);
        assert_eq!(verdict(&engine, b"\xff\xfe\x00virus\x80"), Verdict::Malicious);
    }

    #[test]
    fn invalid_bytes_are_dropped_before_matching() {
        let engine = SubstringHeuristicEngine::new(DEFAULT_MARKER).unwrap();
        // 非法字节被忽略后 "vi" 与 "rus" 相连
        assert_eq!(verdict(&engine, b"vi\xffrus"), Verdict::Malicious);
    }

    #[test]
    fn custom_marker() {
        let engine = SubstringHeuristicEngine::new("eicar").unwrap();
        assert_eq!(engine.marker(), "eicar");
        let det = engine.scan(b"X5O EICAR test", None).unwrap();
        assert_eq!(det.verdict, Verdict::Malicious);
        assert!(det.detail.unwrap().contains("offset 4"));
        assert!(SubstringHeuristicEngine::new("").is_err());
    }

    #[test]
    fn expired_deadline() {
        let engine = SubstringHeuristicEngine::new(DEFAULT_MARKER).unwrap();
        let err = engine.scan(b"anything", Some(Instant::now())).unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
    }
}
