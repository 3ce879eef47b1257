use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::ParseError;

/// A registry-assigned identifier for one version of an entity.
///
/// Commit ids travel on the wire and in lock files in "dashless" form: the
/// 32 hex characters of the UUID without separators. In-process they are
/// standard UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(Uuid);

impl CommitId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_dashless(input: &str) -> Result<Self, ParseError> {
        if input.len() != 32 || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::new(
                "commit id",
                input,
                "must be exactly 32 hex characters",
            ));
        }
        let mut raw = [0u8; 16];
        hex::decode_to_slice(input, &mut raw)
            .map_err(|e| ParseError::new("commit id", input, e.to_string()))?;
        Ok(Self(Uuid::from_bytes(raw)))
    }

    pub fn to_dashless(self) -> String {
        self.0.simple().to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommitId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ParseError::new("commit id", s, e.to_string()))
    }
}
