use std::fmt;

use crate::commit_id::CommitId;
use crate::digest::{Digest, LazyDigest};
use crate::error::ParseError;
use crate::name::FullName;

/// The canonical pinned reference to one version of an entity: a full name,
/// the commit the registry assigned, and the content digest of that commit.
///
/// Keys are what lock files store. The digest half is lazy so that reading
/// a lock file never fails on a digest the caller does not end up using.
#[derive(Debug, Clone)]
pub struct Key {
    full_name: FullName,
    commit_id: CommitId,
    digest: LazyDigest,
}

impl Key {
    pub fn new(full_name: FullName, commit_id: CommitId, digest: impl Into<LazyDigest>) -> Self {
        Self {
            full_name,
            commit_id,
            digest: digest.into(),
        }
    }

    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    pub fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    /// Forces the digest. The first call parses and validates; the result,
    /// success or failure, is memoized.
    pub fn digest(&self) -> Result<Digest, ParseError> {
        self.digest.get()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.full_name, self.commit_id.to_dashless())
    }
}
