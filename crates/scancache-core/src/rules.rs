//! 签名规则文件加载（TOML）
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 单条规则的配置（支持 pattern 或 regex 字段）
#[derive(Debug, Clone, Deserialize)]
struct RuleEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

/// 归一化后的签名规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RuleSpec {
    pub id: String,
    pub name: Option<String>,
    pub pat: String,
}

impl RuleSpec {
    /// 报告中使用的标签：优先 name，否则 id
    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

pub(crate) fn parse_rule_specs(txt: &str) -> Result<Vec<RuleSpec>> {
    let parsed: RuleFile = toml::from_str(txt)?;
    let mut out = Vec::new();

    for e in parsed.rules {
        // 兼容两种字段名：pattern 或 regex
        let pat = match (e.pattern, e.regex) {
            (Some(p), _) => p,
            (None, Some(r)) => r,
            _ => continue,
        };
        out.push(RuleSpec { id: e.id, name: e.name, pat });
    }

    Ok(out)
}

pub(crate) fn load_rule_specs(path: &Path) -> Result<Vec<RuleSpec>> {
    let txt = std::fs::read_to_string(path)
        .with_context(|| format!("read rules file {}", path.display()))?;
    parse_rule_specs(&txt).with_context(|| format!("parse rules file {}", path.display()))
}
