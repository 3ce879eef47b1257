//! Test doubles shared by the core's unit tests: an in-memory stand-in
//! for the registry-backed module data provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lode_config::{CommitId, Digest, DigestType, FullName, Key};

use crate::bucket::MemoryBucket;
use crate::cas::{digest_for_bytes, digest_for_digests, FileNode, Manifest};
use crate::error::{Error, Result};
use crate::provider::data::ModuleData;
use crate::provider::ModuleDataProvider;

struct BankEntry {
    key: Key,
    files: Vec<(String, Bytes)>,
    deps: Vec<Key>,
    digest: Digest,
}

/// A bank of fake remote modules. Digests are computed with the real
/// algebra so tamper checks pass (or deliberately fail, see
/// [`RemoteModuleBank::tamper`]).
#[derive(Default)]
pub(crate) struct RemoteModuleBank {
    entries: Vec<BankEntry>,
    tampered: Vec<String>,
}

impl RemoteModuleBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a remote module. Its deps must have been added before it.
    pub fn add(&mut self, name: &str, files: &[(&str, &str)], deps: &[&str]) -> Key {
        let files: Vec<(String, Bytes)> = files
            .iter()
            .map(|(path, data)| ((*path).to_owned(), Bytes::copy_from_slice(data.as_bytes())))
            .collect();
        let dep_keys: Vec<Key> = deps.iter().map(|dep| self.key(dep)).collect();

        let nodes: Vec<FileNode> = files
            .iter()
            .map(|(path, data)| {
                FileNode::new(path.clone(), digest_for_bytes(DigestType::B5, data)).unwrap()
            })
            .collect();
        let manifest_digest = Manifest::new(nodes).unwrap().digest(DigestType::B5);
        let mut digests = vec![manifest_digest];
        for dep in &dep_keys {
            digests.push(dep.digest().unwrap());
        }
        let digest = digest_for_digests(DigestType::B5, &digests);

        let key = Key::new(
            FullName::parse(name).unwrap(),
            CommitId::random(),
            digest.clone(),
        );
        self.entries.push(BankEntry {
            key: key.clone(),
            files,
            deps: dep_keys,
            digest,
        });
        key
    }

    /// Makes the named module's served content disagree with its key.
    pub fn tamper(&mut self, name: &str) {
        self.tampered.push(name.to_owned());
    }

    pub fn key(&self, name: &str) -> Key {
        self.entries
            .iter()
            .find(|entry| entry.key.full_name().to_string() == name)
            .map(|entry| entry.key.clone())
            .unwrap_or_else(|| panic!("no bank entry for {name}"))
    }

    pub fn provider(&self) -> Arc<dyn ModuleDataProvider> {
        Arc::new(StaticModuleDataProvider {
            by_name: self
                .entries
                .iter()
                .map(|entry| {
                    let name = entry.key.full_name().to_string();
                    let digest = if self.tampered.contains(&name) {
                        digest_for_bytes(DigestType::B5, b"tampered content")
                    } else {
                        entry.digest.clone()
                    };
                    (
                        name,
                        ModuleData::new(
                            entry.key.clone(),
                            MemoryBucket::new(entry.files.iter().cloned()),
                            entry.deps.clone(),
                            digest,
                        ),
                    )
                })
                .collect(),
        })
    }
}

struct StaticModuleDataProvider {
    by_name: HashMap<String, ModuleData>,
}

#[async_trait]
impl ModuleDataProvider for StaticModuleDataProvider {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<ModuleData>> {
        keys.iter()
            .map(|key| {
                self.by_name
                    .get(&key.full_name().to_string())
                    .cloned()
                    .ok_or_else(|| Error::NotFound {
                        kind: "commit",
                        input: key.to_string(),
                    })
            })
            .collect()
    }
}

/// A provider for sets that must never touch the network.
pub(crate) struct UnreachableDataProvider;

#[async_trait]
impl ModuleDataProvider for UnreachableDataProvider {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<ModuleData>> {
        Err(Error::system(format!(
            "unexpected remote fetch for {} keys",
            keys.len()
        )))
    }
}

pub(crate) fn memory_bucket(files: &[(&str, &str)]) -> Arc<MemoryBucket> {
    Arc::new(MemoryBucket::new(files.iter().map(|(path, data)| {
        ((*path).to_owned(), Bytes::copy_from_slice(data.as_bytes()))
    })))
}
