//! Read-only file buckets.
//!
//! A bucket is a flat, forward-slash-keyed view of files. Workspaces read
//! from a filesystem bucket, registry downloads land in memory buckets, and
//! module buckets are prefix views into their workspace bucket.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::error::{Error, Result};

#[async_trait]
pub trait Bucket: Send + Sync {
    async fn read(&self, path: &str) -> Result<Bytes>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// All file paths in the bucket, sorted ascending.
    async fn walk(&self) -> Result<Vec<String>>;
}

/// An immutable in-memory bucket.
#[derive(Debug, Default, Clone)]
pub struct MemoryBucket {
    files: BTreeMap<String, Bytes>,
}

impl MemoryBucket {
    pub fn new(files: impl IntoIterator<Item = (String, Bytes)>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(path, data)| (path.as_str(), data))
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.files.get(path).cloned().ok_or_else(|| Error::NotFound {
            kind: "file path",
            input: path.to_owned(),
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn walk(&self) -> Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// A bucket rooted at a directory on disk.
pub struct FsBucket {
    root: PathBuf,
}

impl FsBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.split('/') {
            full.push(segment);
        }
        full
    }
}

#[async_trait]
impl Bucket for FsBucket {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full = self.resolve(path);
        match fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound {
                kind: "file path",
                input: path.to_owned(),
            }),
            Err(e) => Err(Error::io(format!("failed to read {}", full.display()), e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match fs::metadata(self.resolve(path)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(format!("failed to stat {path}"), e)),
        }
    }

    async fn walk(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Error::io(format!("failed to list {}", dir.display()), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::io(format!("failed to list {}", dir.display()), e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let rel = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Error::io(format!("failed to stat {rel}"), e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), rel));
                } else if file_type.is_file() {
                    paths.push(rel);
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// A view of another bucket under a path prefix.
pub struct PrefixBucket {
    inner: Arc<dyn Bucket>,
    prefix: String,
}

impl PrefixBucket {
    /// `prefix` is `/`-separated and relative; `.` or the empty string mean
    /// the whole inner bucket.
    pub fn new(inner: Arc<dyn Bucket>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix == "." { String::new() } else { prefix };
        Self { inner, prefix }
    }

    fn join(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_owned()
        } else {
            format!("{}/{path}", self.prefix)
        }
    }
}

#[async_trait]
impl Bucket for PrefixBucket {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.inner.read(&self.join(path)).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(&self.join(path)).await
    }

    async fn walk(&self) -> Result<Vec<String>> {
        let all = self.inner.walk().await?;
        if self.prefix.is_empty() {
            return Ok(all);
        }
        let dir_prefix = format!("{}/", self.prefix);
        Ok(all
            .into_iter()
            .filter_map(|path| path.strip_prefix(&dir_prefix).map(str::to_owned))
            .collect())
    }
}
