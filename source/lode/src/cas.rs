//! Content-addressed store primitives: blobs, file nodes, manifests, and
//! the digest algebra everything else builds on.

use bytes::Bytes;
use lode_config::digest::{Digest, DigestType};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

/// Hashes raw bytes into a digest of the given type.
pub fn digest_for_bytes(digest_type: DigestType, data: &[u8]) -> Digest {
    let value = Sha256::digest(data);
    // a SHA-256 output always has the right length
    Digest::new(digest_type, value.to_vec()).unwrap_or_else(|_| unreachable!())
}

/// Hashes a set of digests into one.
///
/// The inputs are sorted by their canonical string form first, so the
/// result is deterministic for any input order.
pub fn digest_for_digests(digest_type: DigestType, digests: &[Digest]) -> Digest {
    let mut sorted: Vec<&Digest> = digests.iter().collect();
    sorted.sort_by_key(|d| d.to_string());
    let mut hasher = Sha256::new();
    for digest in sorted {
        hasher.update(digest.value());
    }
    Digest::new(digest_type, hasher.finalize().to_vec()).unwrap_or_else(|_| unreachable!())
}

/// A chunk of content plus its digest.
#[derive(Debug, Clone)]
pub struct Blob {
    digest: Digest,
    data: Bytes,
}

impl Blob {
    pub fn new(digest_type: DigestType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            digest: digest_for_bytes(digest_type, &data),
            data,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// A `(path, digest)` pair inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    path: String,
    digest: Digest,
}

impl FileNode {
    pub fn new(path: impl Into<String>, digest: Digest) -> Result<Self> {
        let path = validate_path(path.into())?;
        Ok(Self { path, digest })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

/// An ordered list of file nodes with a canonical text serialization:
/// `<hex-digest>  <path>\n` per file, sorted by path ascending.
#[derive(Debug, Clone)]
pub struct Manifest {
    file_nodes: Vec<FileNode>,
}

impl Manifest {
    pub fn new(mut file_nodes: Vec<FileNode>) -> Result<Self> {
        file_nodes.sort_by(|a, b| a.path.cmp(&b.path));
        for pair in file_nodes.windows(2) {
            if pair[0].path == pair[1].path {
                return Err(Error::DuplicateEntity {
                    kind: "file path",
                    name: pair[0].path.clone(),
                });
            }
        }
        Ok(Self { file_nodes })
    }

    pub fn file_nodes(&self) -> &[FileNode] {
        &self.file_nodes
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for node in &self.file_nodes {
            out.push_str(&hex::encode(node.digest.value()));
            out.push_str("  ");
            out.push_str(&node.path);
            out.push('\n');
        }
        out
    }

    pub fn digest(&self, digest_type: DigestType) -> Digest {
        digest_for_bytes(digest_type, self.to_text().as_bytes())
    }
}

/// Normal-form check for bucket paths: relative, forward-slash separated,
/// no `.` or `..` segments.
pub fn validate_path(path: String) -> Result<String> {
    if path.is_empty() {
        return Err(Error::system("empty file path"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(Error::System {
            message: format!("file path {path:?} is not a normalized relative path"),
        });
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(Error::System {
            message: format!("file path {path:?} contains invalid segments"),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_for_digests_is_order_independent() {
        let a = digest_for_bytes(DigestType::B5, b"a");
        let b = digest_for_bytes(DigestType::B5, b"b");
        let c = digest_for_bytes(DigestType::B5, b"c");
        let forward = digest_for_digests(DigestType::B5, &[a.clone(), b.clone(), c.clone()]);
        let backward = digest_for_digests(DigestType::B5, &[c, b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn manifest_text_is_sorted_and_line_terminated() {
        let manifest = Manifest::new(vec![
            FileNode::new("b.proto", digest_for_bytes(DigestType::B5, b"b")).unwrap(),
            FileNode::new("a.proto", digest_for_bytes(DigestType::B5, b"a")).unwrap(),
        ])
        .unwrap();
        let text = manifest.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  a.proto"));
        assert!(lines[1].ends_with("  b.proto"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn manifest_rejects_duplicate_paths() {
        let err = Manifest::new(vec![
            FileNode::new("a.proto", digest_for_bytes(DigestType::B5, b"x")).unwrap(),
            FileNode::new("a.proto", digest_for_bytes(DigestType::B5, b"y")).unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { .. }));
    }

    #[test]
    fn manifest_digest_is_stable_for_same_content() {
        let nodes = || {
            vec![
                FileNode::new("a.proto", digest_for_bytes(DigestType::B5, b"a")).unwrap(),
                FileNode::new("b.proto", digest_for_bytes(DigestType::B5, b"b")).unwrap(),
            ]
        };
        let one = Manifest::new(nodes()).unwrap().digest(DigestType::B5);
        let two = Manifest::new(nodes()).unwrap().digest(DigestType::B5);
        assert_eq!(one, two);
    }

    #[test]
    fn blob_pairs_content_with_its_digest() {
        let blob = Blob::new(DigestType::B5, Bytes::from_static(b"content"));
        assert_eq!(blob.digest(), &digest_for_bytes(DigestType::B5, b"content"));
        assert_eq!(blob.data().as_ref(), b"content");
    }

    #[test]
    fn path_validation_rejects_escapes() {
        assert!(validate_path("a/../b".to_owned()).is_err());
        assert!(validate_path("/abs".to_owned()).is_err());
        assert!(validate_path("a\\b".to_owned()).is_err());
        assert!(validate_path("ok/fine.proto".to_owned()).is_ok());
    }
}
