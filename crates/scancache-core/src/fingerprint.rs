//! 内容指纹（SHA-256，小写十六进制）
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// 指纹长度（十六进制字符数，对应 256 位摘要）
pub const FINGERPRINT_HEX_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    /// 空内容不参与哈希，由上游拒绝
    #[error("Empty file uploaded.")]
    EmptyInput,

    #[error("malformed fingerprint {0:?}: expected 64 hex characters")]
    Malformed(String),
}

/// 内容寻址标识：固定宽度的小写十六进制摘要
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 解析外部传入的摘要字符串（允许大写与首尾空白）
    pub fn parse(s: &str) -> Result<Self, FingerprintError> {
        let s = s.trim();
        if s.len() != FINGERPRINT_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FingerprintError::Malformed(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计算内容指纹；纯函数，相同字节永远得到相同摘要
pub fn fingerprint(content: &[u8]) -> Result<Fingerprint, FingerprintError> {
    if content.is_empty() {
        return Err(FingerprintError::EmptyInput);
    }
    let digest = Sha256::digest(content);
    Ok(Fingerprint(format!("{:x}", digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_digest() {
        let fp = fingerprint(b"test content").unwrap();
        assert_eq!(fp.as_str().len(), FINGERPRINT_HEX_LEN);
        assert_eq!(
            fp.as_str(),
            "6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72"
        );
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(fingerprint(b""), Err(FingerprintError::EmptyInput));
    }

    #[test]
    fn parse_normalizes_case() {
        let fp = fingerprint(b"abc").unwrap();
        let upper = fp.as_str().to_ascii_uppercase();
        assert_eq!(Fingerprint::parse(&format!("  {upper}\n")).unwrap(), fp);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Fingerprint::parse("abc").is_err());
        let not_hex = "g".repeat(FINGERPRINT_HEX_LEN);
        assert!(matches!(Fingerprint::parse(&not_hex), Err(FingerprintError::Malformed(_))));
    }

    #[test]
    fn deserialization_validates() {
        let fp = fingerprint(b"abc").unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{fp}\""));
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fp);
        assert!(serde_json::from_str::<Fingerprint>("\"not-a-digest\"").is_err());
    }

    proptest! {
        #[test]
        fn stable_and_lowercase(data in proptest::collection::vec(any::<u8>(), 1..512)) {
            let a = fingerprint(&data).unwrap();
            let b = fingerprint(&data).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert!(a.as_str().bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f')));
            prop_assert_eq!(Fingerprint::parse(a.as_str()).unwrap(), a);
        }

        #[test]
        fn distinct_content_distinct_digest(
            a in proptest::collection::vec(any::<u8>(), 1..128),
            b in proptest::collection::vec(any::<u8>(), 1..128),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        }
    }
}
