use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// The `registry/owner/name` triple identifying an entity on a registry.
///
/// The registry segment must be a syntactically valid hostname; owner and
/// name are opaque non-empty segments without slashes. Anything beyond that
/// is validated by the registry itself, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullName {
    registry: String,
    owner: String,
    name: String,
}

impl FullName {
    pub fn new(
        registry: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let full_name = Self {
            registry: registry.into(),
            owner: owner.into(),
            name: name.into(),
        };
        full_name.validate()?;
        Ok(full_name)
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut segments = input.split('/');
        let (registry, owner, name) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(registry), Some(owner), Some(name), None) => (registry, owner, name),
            _ => {
                return Err(ParseError::new(
                    "full name",
                    input,
                    "must be of the form registry/owner/name",
                ))
            }
        };
        Self::new(registry, owner, name).map_err(|e| ParseError::new("full name", input, e.cause))
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ParseError> {
        let input = format!("{}/{}/{}", self.registry, self.owner, self.name);
        if !is_valid_hostname(&self.registry) {
            return Err(ParseError::new(
                "full name",
                input,
                "registry is not a valid hostname",
            ));
        }
        if self.owner.is_empty() {
            return Err(ParseError::new("full name", input, "owner is empty"));
        }
        if self.name.is_empty() {
            return Err(ParseError::new("full name", input, "name is empty"));
        }
        if self.owner.contains('/') || self.name.contains('/') {
            return Err(ParseError::new(
                "full name",
                input,
                "owner and name must not contain slashes",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

impl FromStr for FullName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Syntactic DNS-name check. Label content beyond the character set is the
/// registry's concern.
fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}
