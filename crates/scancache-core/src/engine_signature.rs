//! 签名引擎：TOML 规则编译为 `regex::bytes`，直接在原始字节上匹配
use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::warn;

use crate::engine::{check_deadline, EngineError, ScanEngine};
use crate::rules::{load_rule_specs, parse_rule_specs, RuleSpec};
use crate::types::Detection;

struct CompiledRule {
    label: String,
    re: regex::bytes::Regex,
}

pub struct SignatureEngine {
    rules: Vec<CompiledRule>,
}

impl SignatureEngine {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_specs(&load_rule_specs(path)?))
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        Ok(Self::from_specs(&parse_rule_specs(txt)?))
    }

    /// 无法编译的规则记录告警后跳过
    fn from_specs(specs: &[RuleSpec]) -> Self {
        let mut rules = Vec::with_capacity(specs.len());
        for r in specs {
            match regex::bytes::Regex::new(&r.pat) {
                Ok(re) => rules.push(CompiledRule { label: r.label().to_string(), re }),
                Err(e) => warn!(rule = %r.id, error = %e, "skipping signature rule that does not compile"),
            }
        }
        Self { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl ScanEngine for SignatureEngine {
    fn name(&self) -> &str {
        "signature"
    }

    fn scan(&self, content: &[u8], deadline: Option<Instant>) -> Result<Detection, EngineError> {
        let started = Instant::now();
        for rule in &self.rules {
            // 每条规则之间检查一次截止时间
            check_deadline(self.name(), started, deadline)?;
            if let Some(m) = rule.re.find(content) {
                return Ok(Detection::malicious(
                    self.name(),
                    format!("rule {:?} matched at offset {}", rule.label, m.start()),
                ));
            }
        }
        Ok(Detection::clean(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;

    const RULES: &str = r#"
        [[rules]]
        id = "eicar"
        pattern = "EICAR-STANDARD-ANTIVIRUS-TEST-FILE"

        [[rules]]
        id = "broken"
        pattern = "(unclosed"

        [[rules]]
        id = "elf-miner"
        name = "ELF coin miner"
        regex = "(?-u)\\x7fELF[\\x00-\\xff]*stratum\\+tcp"
    "#;

    #[test]
    fn broken_rules_are_skipped() {
        let engine = SignatureEngine::from_toml_str(RULES).unwrap();
        assert_eq!(engine.rule_count(), 2);
    }

    #[test]
    fn matches_raw_bytes() {
        let engine = SignatureEngine::from_toml_str(RULES).unwrap();
        let mut elf = b"\x7fELF\x02\x01\x01\x00\xff\xfe".to_vec();
        elf.extend_from_slice(b"pool stratum+tcp://x");
        let det = engine.scan(&elf, None).unwrap();
        assert_eq!(det.verdict, Verdict::Malicious);
        assert!(det.detail.unwrap().contains("ELF coin miner"));

        let det = engine.scan(b"X5O!P%@AP EICAR-STANDARD-ANTIVIRUS-TEST-FILE!", None).unwrap();
        assert_eq!(det.verdict, Verdict::Malicious);
    }

    #[test]
    fn no_match_is_clean() {
        let engine = SignatureEngine::from_toml_str(RULES).unwrap();
        let det = engine.scan(b"\x00\x01\x02 plain bytes", None).unwrap();
        assert_eq!(det.verdict, Verdict::Clean);
        assert_eq!(det.engine, "signature");
    }

    #[test]
    fn deadline_checked_between_rules() {
        let engine = SignatureEngine::from_toml_str(RULES).unwrap();
        let err = engine.scan(b"whatever", Some(Instant::now())).unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
    }
}
