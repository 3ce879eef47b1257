use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::error::ParseError;

/// The tag half of a content-addressed digest.
///
/// `b4` and `b5` are module digests (`b5` folds dependency digests in,
/// `b4` covers the manifest only), `o1` is the policy digest, `p1` the
/// plugin digest. All are 32-byte SHA-256 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestType {
    B4,
    B5,
    O1,
    P1,
}

impl DigestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::B4 => "b4",
            Self::B5 => "b5",
            Self::O1 => "o1",
            Self::P1 => "p1",
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        match input {
            "b4" => Ok(Self::B4),
            "b5" => Ok(Self::B5),
            "o1" => Ok(Self::O1),
            "p1" => Ok(Self::P1),
            _ => Err(ParseError::new("digest", input, "unknown digest type")),
        }
    }
}

impl fmt::Display for DigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DIGEST_LEN: usize = 32;

/// A typed content fingerprint. Equality requires the types to agree first;
/// digests of different types are never equal regardless of their bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    digest_type: DigestType,
    value: Bytes,
}

impl Digest {
    pub fn new(digest_type: DigestType, value: impl Into<Bytes>) -> Result<Self, ParseError> {
        let value = value.into();
        if value.len() != DIGEST_LEN {
            return Err(ParseError::new(
                "digest",
                hex::encode(&value),
                format!("expected {DIGEST_LEN} bytes, got {}", value.len()),
            ));
        }
        Ok(Self { digest_type, value })
    }

    /// Parses the canonical `<type>:<hex>` form.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let (type_part, hex_part) = input
            .split_once(':')
            .ok_or_else(|| ParseError::new("digest", input, "missing `:` separator"))?;
        let digest_type = DigestType::parse(type_part)
            .map_err(|e| ParseError::new("digest", input, e.cause))?;
        let value = hex::decode(hex_part)
            .map_err(|e| ParseError::new("digest", input, e.to_string()))?;
        Self::new(digest_type, value).map_err(|e| ParseError::new("digest", input, e.cause))
    }

    pub fn digest_type(&self) -> DigestType {
        self.digest_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest_type, hex::encode(&self.value))
    }
}

impl FromStr for Digest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A digest that may not have been parsed or validated yet.
///
/// Lock files and registry replies carry digests as strings; validation is
/// deferred until something actually needs the value. The first `get` wins
/// and every later caller observes the same parsed value or the same error,
/// also under concurrent first calls.
#[derive(Debug, Clone)]
pub struct LazyDigest {
    inner: Arc<Inner>,
}

#[derive(Debug)]
enum Inner {
    Ready(Digest),
    Deferred {
        raw: String,
        cell: OnceLock<Result<Digest, ParseError>>,
    },
}

impl LazyDigest {
    pub fn ready(digest: Digest) -> Self {
        Self {
            inner: Arc::new(Inner::Ready(digest)),
        }
    }

    pub fn deferred(raw: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner::Deferred {
                raw: raw.into(),
                cell: OnceLock::new(),
            }),
        }
    }

    pub fn get(&self) -> Result<Digest, ParseError> {
        match &*self.inner {
            Inner::Ready(digest) => Ok(digest.clone()),
            Inner::Deferred { raw, cell } => {
                cell.get_or_init(|| Digest::parse(raw)).clone()
            }
        }
    }
}

impl From<Digest> for LazyDigest {
    fn from(digest: Digest) -> Self {
        Self::ready(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(byte: u8) -> Vec<u8> {
        vec![byte; DIGEST_LEN]
    }

    #[test]
    fn display_parse_round_trips() {
        let digest = Digest::new(DigestType::B5, raw(0xab)).unwrap();
        let rendered = digest.to_string();
        assert!(rendered.starts_with("b5:abab"));
        assert_eq!(Digest::parse(&rendered).unwrap(), digest);
    }

    #[test]
    fn cross_type_digests_are_never_equal() {
        let module = Digest::new(DigestType::B5, raw(1)).unwrap();
        let plugin = Digest::new(DigestType::P1, raw(1)).unwrap();
        assert_ne!(module, plugin);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(Digest::new(DigestType::B5, vec![0u8; 4]).is_err());
        assert!(Digest::parse("b5:abcd").is_err());
    }

    #[test]
    fn rejects_unknown_types() {
        let err = Digest::parse(&format!("zz:{}", hex::encode(raw(0)))).unwrap_err();
        assert_eq!(err.kind, "digest");
    }

    #[test]
    fn lazy_digest_memoizes_failures() {
        let lazy = LazyDigest::deferred("b5:not-hex");
        let first = lazy.get().unwrap_err();
        let second = lazy.get().unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn lazy_digest_parses_once() {
        let digest = Digest::new(DigestType::O1, raw(7)).unwrap();
        let lazy = LazyDigest::deferred(digest.to_string());
        assert_eq!(lazy.get().unwrap(), digest);
    }
}
