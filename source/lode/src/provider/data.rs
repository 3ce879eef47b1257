//! Materialized entity content, with tamper-proof digest verification.
//!
//! Every `*Data` pairs the key that requested it with the payload the
//! registry returned and the digest recomputed from that payload. The
//! first access to the payload runs a one-shot comparison of the two
//! digests; a mismatch poisons the data with a tamper error that every
//! later access observes too.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::future::join_all;
use itertools::Itertools as _;
use lode_config::{CommitId, Digest, DigestType, FullName, Key, LazyDigest, Reference};

use crate::bucket::MemoryBucket;
use crate::cas::{digest_for_bytes, digest_for_digests, FileNode, Manifest};
use crate::error::{Error, Result};
use crate::provider::{ModuleDataProvider, PluginDataProvider, PolicyDataProvider};
use crate::registry::types::*;
use crate::registry::{ClientProvider, RegistryClient};

/// One-shot digest comparison shared by every data kind.
#[derive(Debug, Clone)]
struct Verifier {
    key: Key,
    actual: Digest,
    cell: Arc<OnceLock<Result<()>>>,
}

impl Verifier {
    fn new(key: Key, actual: Digest) -> Self {
        Self {
            key,
            actual,
            cell: Arc::new(OnceLock::new()),
        }
    }

    fn verify(&self) -> Result<()> {
        self.cell
            .get_or_init(|| {
                let expected = self.key.digest()?;
                if expected != self.actual {
                    return Err(Error::Tamper {
                        key: self.key.to_string(),
                        expected: expected.to_string(),
                        actual: self.actual.to_string(),
                    });
                }
                Ok(())
            })
            .clone()
    }
}

/// A module key's materialized content: its file bucket and the dependency
/// keys it declared when it was pushed.
#[derive(Debug, Clone)]
pub struct ModuleData {
    bucket: Arc<MemoryBucket>,
    declared_deps: Arc<Vec<Key>>,
    verifier: Verifier,
}

impl ModuleData {
    pub fn new(key: Key, bucket: MemoryBucket, declared_deps: Vec<Key>, actual: Digest) -> Self {
        Self {
            bucket: Arc::new(bucket),
            declared_deps: Arc::new(declared_deps),
            verifier: Verifier::new(key, actual),
        }
    }

    pub fn key(&self) -> &Key {
        &self.verifier.key
    }

    pub fn bucket(&self) -> Result<Arc<MemoryBucket>> {
        self.verifier.verify()?;
        Ok(Arc::clone(&self.bucket))
    }

    pub fn declared_dep_keys(&self) -> Result<&[Key]> {
        self.verifier.verify()?;
        Ok(&self.declared_deps)
    }
}

/// A policy key's materialized YAML document.
#[derive(Debug, Clone)]
pub struct PolicyData {
    doc: Bytes,
    verifier: Verifier,
}

impl PolicyData {
    pub fn new(key: Key, doc: Bytes, actual: Digest) -> Self {
        Self {
            doc,
            verifier: Verifier::new(key, actual),
        }
    }

    pub fn key(&self) -> &Key {
        &self.verifier.key
    }

    pub fn doc(&self) -> Result<Bytes> {
        self.verifier.verify()?;
        Ok(self.doc.clone())
    }

    /// The plugin refs the policy document names.
    pub fn plugin_refs(&self) -> Result<Vec<Reference>> {
        crate::policy::parse_plugin_refs(&self.doc()?)
    }
}

/// A plugin key's materialized Wasm binary (uncompressed).
#[derive(Debug, Clone)]
pub struct PluginData {
    wasm: Bytes,
    verifier: Verifier,
}

impl PluginData {
    pub fn new(key: Key, wasm: Bytes, actual: Digest) -> Self {
        Self {
            wasm,
            verifier: Verifier::new(key, actual),
        }
    }

    pub fn key(&self) -> &Key {
        &self.verifier.key
    }

    pub fn wasm(&self) -> Result<Bytes> {
        self.verifier.verify()?;
        Ok(self.wasm.clone())
    }
}

pub(crate) fn decode_content(data: &str, compression: &str) -> Result<Bytes> {
    let raw = BASE64.decode(data).map_err(|e| Error::Decompress {
        message: e.to_string(),
    })?;
    match compression {
        COMPRESSION_NONE => Ok(Bytes::from(raw)),
        COMPRESSION_ZSTD => zstd::stream::decode_all(raw.as_slice())
            .map(Bytes::from)
            .map_err(|e| Error::Decompress {
                message: e.to_string(),
            }),
        other => Err(Error::UnknownCompression {
            compression: other.to_owned(),
        }),
    }
}

fn dep_key_from_wire(dep: &WireDep) -> Result<Key> {
    Ok(Key::new(
        FullName::parse(&dep.module)?,
        CommitId::from_dashless(&dep.commit)?,
        LazyDigest::deferred(dep.digest.clone()),
    ))
}

/// Checks that every key carries the same digest type and returns it.
fn uniform_digest_type(keys: &[Key]) -> Result<DigestType> {
    let mut digest_type = None;
    for key in keys {
        let dt = key.digest()?.digest_type();
        match digest_type {
            None => digest_type = Some(dt),
            Some(previous) if previous != dt => {
                return Err(Error::UnsupportedDigest {
                    digest_type: dt.to_string(),
                })
            }
            Some(_) => {}
        }
    }
    digest_type.ok_or_else(|| Error::system("no keys supplied"))
}

/// Runs one closure per registry host over index-tagged keys and
/// reassembles the results in input order.
async fn fan_out_by_host<T, F, Fut>(keys: &[Key], call: F) -> Result<Vec<T>>
where
    F: Fn(String, Vec<(usize, Key)>) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<(usize, T)>>>,
{
    let mut by_host: HashMap<String, Vec<(usize, Key)>> = HashMap::new();
    for (index, key) in keys.iter().enumerate() {
        by_host
            .entry(key.full_name().registry().to_owned())
            .or_default()
            .push((index, key.clone()));
    }
    let mut out: Vec<Option<T>> = keys.iter().map(|_| None).collect();
    for result in join_all(by_host.into_iter().map(|(host, entries)| call(host, entries))).await {
        for (index, value) in result? {
            out[index] = Some(value);
        }
    }
    out.into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::system("registry response left keys unmaterialized"))
}

async fn download_for_host(
    client: &RegistryClient,
    kind: &str,
    digest_type: DigestType,
    entries: &[(usize, Key)],
) -> Result<HashMap<String, DownloadResponseValue>> {
    let request = DownloadRequest {
        kind: kind.to_owned(),
        digest_type: digest_type.to_string(),
        values: entries
            .iter()
            .map(|(_, key)| DownloadRequestValue {
                owner: key.full_name().owner().to_owned(),
                name: key.full_name().name().to_owned(),
                commit: key.commit_id().to_dashless(),
            })
            .collect(),
    };
    let response = client.download(&request).await?;
    Ok(response
        .values
        .into_iter()
        .map(|value| (value.commit.clone(), value))
        .collect())
}

/// Materializes module content, falling back to blob fetches when the
/// registry returns file nodes without inline contents.
pub struct RegistryModuleDataProvider {
    clients: Arc<ClientProvider>,
}

impl RegistryModuleDataProvider {
    pub fn new(clients: Arc<ClientProvider>) -> Self {
        Self { clients }
    }

    async fn materialize(
        client: &RegistryClient,
        key: &Key,
        value: DownloadResponseValue,
        digest_type: DigestType,
    ) -> Result<ModuleData> {
        let files: Vec<(String, Bytes)> = if !value.contents.is_empty() {
            value
                .contents
                .iter()
                .map(|content| {
                    Ok((
                        content.path.clone(),
                        decode_content(&content.data, &content.compression)?,
                    ))
                })
                .collect::<Result<_>>()?
        } else {
            Self::fetch_blobs(client, key, &value.file_nodes).await?
        };

        let mut nodes = Vec::with_capacity(files.len());
        for (path, data) in &files {
            nodes.push(FileNode::new(
                path.clone(),
                digest_for_bytes(digest_type, data),
            )?);
        }
        let manifest_digest = Manifest::new(nodes)?.digest(digest_type);

        let declared_deps = value
            .declared_deps
            .iter()
            .map(dep_key_from_wire)
            .collect::<Result<Vec<_>>>()?;

        let actual = match digest_type {
            DigestType::B4 => manifest_digest,
            _ => {
                let mut digests = vec![manifest_digest];
                for dep in &declared_deps {
                    digests.push(dep.digest()?);
                }
                digest_for_digests(digest_type, &digests)
            }
        };

        Ok(ModuleData::new(
            key.clone(),
            MemoryBucket::new(files),
            declared_deps,
            actual,
        ))
    }

    /// Fetches the blobs behind a file-node listing, at most
    /// [`MAX_BLOBS_PER_CALL`] digests per call, chunks issued sequentially.
    async fn fetch_blobs(
        client: &RegistryClient,
        key: &Key,
        file_nodes: &[WireFileNode],
    ) -> Result<Vec<(String, Bytes)>> {
        let wanted: Vec<&str> = file_nodes
            .iter()
            .map(|node| node.digest.as_str())
            .unique()
            .collect();
        let mut blobs: HashMap<String, Bytes> = HashMap::new();
        for chunk in wanted.chunks(MAX_BLOBS_PER_CALL) {
            let response = client
                .get_blobs(&GetBlobsRequest {
                    owner: key.full_name().owner().to_owned(),
                    name: key.full_name().name().to_owned(),
                    digests: chunk.iter().map(|d| (*d).to_owned()).collect(),
                })
                .await?;
            for blob in response.blobs {
                blobs.insert(blob.digest, decode_content(&blob.data, COMPRESSION_NONE)?);
            }
        }
        file_nodes
            .iter()
            .map(|node| {
                let data = blobs.get(&node.digest).cloned().ok_or_else(|| Error::NotFound {
                    kind: "blob",
                    input: node.digest.clone(),
                })?;
                Ok((node.path.clone(), data))
            })
            .collect()
    }
}

#[async_trait]
impl ModuleDataProvider for RegistryModuleDataProvider {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<ModuleData>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let digest_type = uniform_digest_type(keys)?;
        fan_out_by_host(keys, |host, entries| {
            let clients = Arc::clone(&self.clients);
            async move {
                let client = clients.client_for_host(&host)?;
                let mut values = download_for_host(&client, "module", digest_type, &entries).await?;
                let mut datas = Vec::with_capacity(entries.len());
                for (index, key) in entries {
                    let value = values.remove(&key.commit_id().to_dashless()).ok_or_else(|| {
                        Error::NotFound {
                            kind: "commit",
                            input: key.to_string(),
                        }
                    })?;
                    datas.push((
                        index,
                        Self::materialize(&client, &key, value, digest_type).await?,
                    ));
                }
                Ok(datas)
            }
        })
        .await
    }
}

/// Materializes policy documents; the `o1` digest covers the raw bytes.
pub struct RegistryPolicyDataProvider {
    clients: Arc<ClientProvider>,
}

impl RegistryPolicyDataProvider {
    pub fn new(clients: Arc<ClientProvider>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl PolicyDataProvider for RegistryPolicyDataProvider {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<PolicyData>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let digest_type = uniform_digest_type(keys)?;
        if digest_type != DigestType::O1 {
            return Err(Error::UnsupportedDigest {
                digest_type: digest_type.to_string(),
            });
        }
        fan_out_by_host(keys, |host, entries| {
            let clients = Arc::clone(&self.clients);
            async move {
                let client = clients.client_for_host(&host)?;
                let mut values = download_for_host(&client, "policy", digest_type, &entries).await?;
                entries
                    .into_iter()
                    .map(|(index, key)| {
                        let value = values.remove(&key.commit_id().to_dashless()).ok_or_else(
                            || Error::NotFound {
                                kind: "commit",
                                input: key.to_string(),
                            },
                        )?;
                        let doc = single_content(&value, &key)?;
                        let actual = digest_for_bytes(DigestType::O1, &doc);
                        Ok((index, PolicyData::new(key, doc, actual)))
                    })
                    .collect()
            }
        })
        .await
    }
}

/// Materializes plugin binaries; the `p1` digest covers the uncompressed
/// Wasm bytes.
pub struct RegistryPluginDataProvider {
    clients: Arc<ClientProvider>,
}

impl RegistryPluginDataProvider {
    pub fn new(clients: Arc<ClientProvider>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl PluginDataProvider for RegistryPluginDataProvider {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<PluginData>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let digest_type = uniform_digest_type(keys)?;
        if digest_type != DigestType::P1 {
            return Err(Error::UnsupportedDigest {
                digest_type: digest_type.to_string(),
            });
        }
        fan_out_by_host(keys, |host, entries| {
            let clients = Arc::clone(&self.clients);
            async move {
                let client = clients.client_for_host(&host)?;
                let mut values = download_for_host(&client, "plugin", digest_type, &entries).await?;
                entries
                    .into_iter()
                    .map(|(index, key)| {
                        let value = values.remove(&key.commit_id().to_dashless()).ok_or_else(
                            || Error::NotFound {
                                kind: "commit",
                                input: key.to_string(),
                            },
                        )?;
                        let wasm = single_content(&value, &key)?;
                        let actual = digest_for_bytes(DigestType::P1, &wasm);
                        Ok((index, PluginData::new(key, wasm, actual)))
                    })
                    .collect()
            }
        })
        .await
    }
}

fn single_content(value: &DownloadResponseValue, key: &Key) -> Result<Bytes> {
    match value.contents.as_slice() {
        [content] => decode_content(&content.data, &content.compression),
        _ => Err(Error::system(format!(
            "expected exactly one content entry for {key}, got {}",
            value.contents.len()
        ))),
    }
}
