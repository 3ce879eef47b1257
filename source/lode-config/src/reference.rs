use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::name::FullName;

/// A [`FullName`] plus an optional ref string, written
/// `registry/owner/name[:ref]`.
///
/// The ref, when present, is interpreted by the registry in precedence
/// order: commit id, VCS commit hash, tag, branch, label, digest. An absent
/// ref means the default label of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    full_name: FullName,
    reference: Option<String>,
}

impl Reference {
    pub fn new(full_name: FullName, reference: Option<String>) -> Self {
        Self {
            full_name,
            reference: reference.filter(|r| !r.is_empty()),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let (name_part, ref_part) = match input.split_once(':') {
            Some((name_part, ref_part)) => {
                if ref_part.is_empty() {
                    return Err(ParseError::new("reference", input, "ref is empty"));
                }
                (name_part, Some(ref_part.to_owned()))
            }
            None => (input, None),
        };
        let full_name = FullName::parse(name_part)
            .map_err(|e| ParseError::new("reference", input, e.cause))?;
        Ok(Self {
            full_name,
            reference: ref_part,
        })
    }

    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    /// The ref string, or `None` for the default label.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Some(r) => write!(f, "{}:{}", self.full_name, r),
            None => write!(f, "{}", self.full_name),
        }
    }
}

impl FromStr for Reference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
