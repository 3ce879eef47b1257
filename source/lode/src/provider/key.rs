use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use lode_config::{CommitId, DigestType, FullName, Key, LazyDigest, Reference};

use crate::error::{Error, Result};
use crate::provider::KeyProvider;
use crate::registry::types::{ResolveCommitsRequest, WireCommit, WireRef};
use crate::registry::ClientProvider;

/// Resolves refs to keys by asking each registry for its own refs in one
/// batched call, concurrently across hosts.
pub struct RegistryKeyProvider {
    clients: Arc<ClientProvider>,
}

impl RegistryKeyProvider {
    pub fn new(clients: Arc<ClientProvider>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl KeyProvider for RegistryKeyProvider {
    async fn keys_for_refs(
        &self,
        refs: &[Reference],
        digest_type: DigestType,
    ) -> Result<Vec<Key>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        for reference in refs {
            if !seen.insert(reference.to_string()) {
                return Err(Error::DuplicateEntity {
                    kind: "ref",
                    name: reference.to_string(),
                });
            }
        }

        // Tag each ref with its input index so per-host completion order
        // cannot reorder the output.
        let mut by_host: HashMap<&str, Vec<(usize, &Reference)>> = HashMap::new();
        for (index, reference) in refs.iter().enumerate() {
            by_host
                .entry(reference.full_name().registry())
                .or_default()
                .push((index, reference));
        }

        let calls = by_host.into_iter().map(|(host, entries)| {
            let clients = Arc::clone(&self.clients);
            async move {
                let client = clients.client_for_host(host)?;
                let request = ResolveCommitsRequest {
                    refs: entries
                        .iter()
                        .map(|(_, reference)| WireRef {
                            owner: reference.full_name().owner().to_owned(),
                            name: reference.full_name().name().to_owned(),
                            reference: reference.reference().map(str::to_owned),
                        })
                        .collect(),
                    digest_type: digest_type.to_string(),
                };
                let response = client.resolve_commits(&request).await?;
                if response.commits.len() != entries.len() {
                    return Err(Error::system(format!(
                        "registry {host} resolved {} of {} refs",
                        response.commits.len(),
                        entries.len()
                    )));
                }
                let mut keys = Vec::with_capacity(entries.len());
                for ((index, _), commit) in entries.into_iter().zip(response.commits) {
                    keys.push((index, key_for_commit(host, commit, digest_type)?));
                }
                Ok::<_, Error>(keys)
            }
        });

        let mut out: Vec<Option<Key>> = refs.iter().map(|_| None).collect();
        for result in join_all(calls).await {
            for (index, key) in result? {
                out[index] = Some(key);
            }
        }
        out.into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::system("registry response left refs unresolved"))
    }
}

pub(crate) fn key_for_commit(
    host: &str,
    commit: WireCommit,
    digest_type: DigestType,
) -> Result<Key> {
    if !commit
        .digest
        .starts_with(&format!("{}:", digest_type.as_str()))
    {
        return Err(Error::UnsupportedDigest {
            digest_type: commit.digest,
        });
    }
    Ok(Key::new(
        FullName::new(host, commit.owner, commit.name)?,
        CommitId::from_dashless(&commit.id)?,
        LazyDigest::deferred(commit.digest),
    ))
}
