//! Read and write of `lode.lock`, the durable projection of a workspace's
//! pinned dependencies.
//!
//! Three versions are recognized. `v1beta1` and `v1` pin modules only and
//! differ in digest type (`b4` vs `b5`); `v2` adds plugin and policy pins
//! plus the policy-name to plugin-keys map. Output is deterministic: the
//! same file content always serializes to the same bytes.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commit_id::CommitId;
use crate::digest::{DigestType, LazyDigest};
use crate::error::ParseError;
use crate::key::Key;
use crate::name::FullName;

pub const LOCK_FILE_NAME: &str = "lode.lock";

/// Every written lock file starts with this line.
pub const LOCK_FILE_HEADER: &str = "# Generated by lode. DO NOT EDIT.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFileVersion {
    V1Beta1,
    V1,
    V2,
}

impl LockFileVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1Beta1 => "v1beta1",
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    pub fn parse(input: &str) -> Result<Self, LockFileError> {
        match input {
            "v1beta1" => Ok(Self::V1Beta1),
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(LockFileError::UnknownVersion {
                version: other.to_owned(),
            }),
        }
    }

    /// The module digest type this version pins.
    pub fn module_digest_type(&self) -> DigestType {
        match self {
            Self::V1Beta1 => DigestType::B4,
            Self::V1 | Self::V2 => DigestType::B5,
        }
    }
}

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LockFileError {
    #[error("unknown lock file version {version:?}")]
    UnknownVersion { version: String },

    #[error("duplicate module {full_name} in lock file")]
    DuplicateModule { full_name: String },

    #[error("lock file entry {full_name} has an empty commit")]
    EmptyCommit { full_name: String },

    #[error("digest type {digest_type} is not valid for a {version} lock file {field} entry")]
    UnsupportedDigest {
        digest_type: String,
        version: &'static str,
        field: &'static str,
    },

    #[error("malformed lock file: {message}")]
    Malformed { message: String },

    #[error("failed to read lock file: {message}")]
    Io { message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// The in-memory representation of a lock file, any version.
#[derive(Debug, Clone)]
pub struct LockFile {
    version: LockFileVersion,
    deps: Vec<Key>,
    plugins: Vec<Key>,
    policies: Vec<Key>,
    policy_plugins: BTreeMap<String, Vec<Key>>,
}

impl LockFile {
    /// Builds a lock file from keys, deduplicating nothing: a duplicate
    /// full name among deps, plugins, or policies is an error. Entries are
    /// sorted by full name ascending so output is deterministic.
    pub fn new(
        version: LockFileVersion,
        deps: Vec<Key>,
        plugins: Vec<Key>,
        policies: Vec<Key>,
        policy_plugins: BTreeMap<String, Vec<Key>>,
    ) -> Result<Self, LockFileError> {
        if version != LockFileVersion::V2
            && (!plugins.is_empty() || !policies.is_empty() || !policy_plugins.is_empty())
        {
            return Err(LockFileError::Malformed {
                message: format!(
                    "{} lock files cannot pin plugins or policies",
                    version.as_str()
                ),
            });
        }
        Ok(Self {
            version,
            deps: sorted_unique(deps)?,
            plugins: sorted_unique(plugins)?,
            policies: sorted_unique(policies)?,
            policy_plugins: policy_plugins
                .into_iter()
                .map(|(name, keys)| Ok((name, sorted_unique(keys)?)))
                .collect::<Result<_, LockFileError>>()?,
        })
    }

    /// Decodes the version header first, then strictly decodes the rest of
    /// the document against that version's shape.
    pub fn read(mut reader: impl Read) -> Result<Self, LockFileError> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| LockFileError::Io {
                message: e.to_string(),
            })?;
        let header: VersionHeader = serde_yaml::from_str(&content).map_err(malformed)?;
        let version = LockFileVersion::parse(&header.version)?;
        match version {
            LockFileVersion::V1Beta1 | LockFileVersion::V1 => {
                let external: ExternalLockFileV1 =
                    serde_yaml::from_str(&content).map_err(malformed)?;
                let mut deps = Vec::with_capacity(external.deps.len());
                for dep in external.deps {
                    let full_name = FullName::new(dep.remote, dep.owner, dep.repository)?;
                    deps.push(key_from_parts(full_name, &dep.commit, dep.digest)?);
                }
                Self::new(version, deps, Vec::new(), Vec::new(), BTreeMap::new())
            }
            LockFileVersion::V2 => {
                let external: ExternalLockFileV2 =
                    serde_yaml::from_str(&content).map_err(malformed)?;
                let mut deps = Vec::with_capacity(external.deps.len());
                for dep in external.deps {
                    let full_name = FullName::parse(&dep.module)?;
                    deps.push(key_from_parts(full_name, &dep.commit, dep.digest)?);
                }
                let mut plugins = Vec::with_capacity(external.plugins.len());
                for dep in external.plugins {
                    let full_name = FullName::parse(&dep.plugin)?;
                    plugins.push(key_from_parts(full_name, &dep.commit, dep.digest)?);
                }
                let mut policies = Vec::with_capacity(external.policies.len());
                for dep in external.policies {
                    let full_name = FullName::parse(&dep.policy)?;
                    policies.push(key_from_parts(full_name, &dep.commit, dep.digest)?);
                }
                let mut policy_plugins = BTreeMap::new();
                for (policy, entries) in external.policy_plugins {
                    FullName::parse(&policy)?;
                    let mut keys = Vec::with_capacity(entries.len());
                    for dep in entries {
                        let full_name = FullName::parse(&dep.plugin)?;
                        keys.push(key_from_parts(full_name, &dep.commit, dep.digest)?);
                    }
                    policy_plugins.insert(policy, keys);
                }
                Self::new(version, deps, plugins, policies, policy_plugins)
            }
        }
    }

    /// Writes the fixed header comment followed by the YAML encoding of the
    /// file's declared version shape. Digests are forced here; an entry
    /// with an unparseable digest fails the write.
    pub fn write(&self, mut writer: impl Write) -> Result<(), LockFileError> {
        let body = match self.version {
            LockFileVersion::V1Beta1 | LockFileVersion::V1 => {
                let external = ExternalLockFileV1 {
                    version: self.version.as_str().to_owned(),
                    deps: self
                        .deps
                        .iter()
                        .map(|key| {
                            Ok(ExternalDepV1 {
                                remote: key.full_name().registry().to_owned(),
                                owner: key.full_name().owner().to_owned(),
                                repository: key.full_name().name().to_owned(),
                                commit: key.commit_id().to_dashless(),
                                digest: self.checked_digest(key, "deps")?,
                            })
                        })
                        .collect::<Result<_, LockFileError>>()?,
                };
                serde_yaml::to_string(&external).map_err(malformed)?
            }
            LockFileVersion::V2 => {
                let external = ExternalLockFileV2 {
                    version: self.version.as_str().to_owned(),
                    deps: self
                        .deps
                        .iter()
                        .map(|key| {
                            Ok(ExternalModuleDepV2 {
                                module: key.full_name().to_string(),
                                commit: key.commit_id().to_dashless(),
                                digest: self.checked_digest(key, "deps")?,
                            })
                        })
                        .collect::<Result<_, LockFileError>>()?,
                    plugins: self
                        .plugins
                        .iter()
                        .map(|key| self.plugin_entry(key))
                        .collect::<Result<_, LockFileError>>()?,
                    policies: self
                        .policies
                        .iter()
                        .map(|key| {
                            Ok(ExternalPolicyDepV2 {
                                policy: key.full_name().to_string(),
                                commit: key.commit_id().to_dashless(),
                                digest: typed_digest(key, DigestType::O1, "policies")?,
                            })
                        })
                        .collect::<Result<_, LockFileError>>()?,
                    policy_plugins: self
                        .policy_plugins
                        .iter()
                        .map(|(policy, keys)| {
                            Ok((
                                policy.clone(),
                                keys.iter()
                                    .map(|key| self.plugin_entry(key))
                                    .collect::<Result<_, LockFileError>>()?,
                            ))
                        })
                        .collect::<Result<_, LockFileError>>()?,
                };
                serde_yaml::to_string(&external).map_err(malformed)?
            }
        };
        writer
            .write_all(LOCK_FILE_HEADER.as_bytes())
            .and_then(|_| writer.write_all(body.as_bytes()))
            .map_err(|e| LockFileError::Io {
                message: e.to_string(),
            })
    }

    fn plugin_entry(&self, key: &Key) -> Result<ExternalPluginDepV2, LockFileError> {
        Ok(ExternalPluginDepV2 {
            plugin: key.full_name().to_string(),
            commit: key.commit_id().to_dashless(),
            digest: typed_digest(key, DigestType::P1, "plugins")?,
        })
    }

    fn checked_digest(&self, key: &Key, field: &'static str) -> Result<String, LockFileError> {
        typed_digest_for_version(key, self.version, field)
    }

    pub fn version(&self) -> LockFileVersion {
        self.version
    }

    /// Pinned module dependency keys, sorted by full name ascending.
    pub fn deps(&self) -> &[Key] {
        &self.deps
    }

    pub fn plugins(&self) -> &[Key] {
        &self.plugins
    }

    pub fn policies(&self) -> &[Key] {
        &self.policies
    }

    pub fn policy_plugins(&self) -> &BTreeMap<String, Vec<Key>> {
        &self.policy_plugins
    }

    /// Forces every lazy digest in the file, surfacing the first failure.
    pub fn validate_digests(&self) -> Result<(), LockFileError> {
        for key in &self.deps {
            typed_digest_for_version(key, self.version, "deps")?;
        }
        for key in &self.plugins {
            typed_digest(key, DigestType::P1, "plugins")?;
        }
        for key in &self.policies {
            typed_digest(key, DigestType::O1, "policies")?;
        }
        for keys in self.policy_plugins.values() {
            for key in keys {
                typed_digest(key, DigestType::P1, "policy-plugins")?;
            }
        }
        Ok(())
    }
}

fn key_from_parts(
    full_name: FullName,
    commit: &str,
    digest: String,
) -> Result<Key, LockFileError> {
    if commit.is_empty() {
        return Err(LockFileError::EmptyCommit {
            full_name: full_name.to_string(),
        });
    }
    let commit_id = CommitId::from_dashless(commit)?;
    Ok(Key::new(full_name, commit_id, LazyDigest::deferred(digest)))
}

fn sorted_unique(mut keys: Vec<Key>) -> Result<Vec<Key>, LockFileError> {
    let mut seen = HashSet::new();
    for key in &keys {
        if !seen.insert(key.full_name().clone()) {
            return Err(LockFileError::DuplicateModule {
                full_name: key.full_name().to_string(),
            });
        }
    }
    keys.sort_by(|a, b| a.full_name().cmp(b.full_name()));
    Ok(keys)
}

fn typed_digest_for_version(
    key: &Key,
    version: LockFileVersion,
    field: &'static str,
) -> Result<String, LockFileError> {
    typed_digest_inner(key, version.module_digest_type(), version.as_str(), field)
}

fn typed_digest(key: &Key, expected: DigestType, field: &'static str) -> Result<String, LockFileError> {
    typed_digest_inner(key, expected, "v2", field)
}

fn typed_digest_inner(
    key: &Key,
    expected: DigestType,
    version: &'static str,
    field: &'static str,
) -> Result<String, LockFileError> {
    let digest = key.digest()?;
    if digest.digest_type() != expected {
        return Err(LockFileError::UnsupportedDigest {
            digest_type: digest.digest_type().to_string(),
            version,
            field,
        });
    }
    Ok(digest.to_string())
}

fn malformed(e: serde_yaml::Error) -> LockFileError {
    LockFileError::Malformed {
        message: e.to_string(),
    }
}

#[derive(Deserialize)]
struct VersionHeader {
    version: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalLockFileV1 {
    version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deps: Vec<ExternalDepV1>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalDepV1 {
    remote: String,
    owner: String,
    repository: String,
    commit: String,
    digest: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalLockFileV2 {
    version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deps: Vec<ExternalModuleDepV2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    plugins: Vec<ExternalPluginDepV2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    policies: Vec<ExternalPolicyDepV2>,
    #[serde(
        rename = "policy-plugins",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    policy_plugins: BTreeMap<String, Vec<ExternalPluginDepV2>>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalModuleDepV2 {
    module: String,
    commit: String,
    digest: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalPluginDepV2 {
    plugin: String,
    commit: String,
    digest: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalPolicyDepV2 {
    policy: String,
    commit: String,
    digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    fn digest(digest_type: DigestType, byte: u8) -> Digest {
        Digest::new(digest_type, vec![byte; 32]).unwrap()
    }

    fn module_key(name: &str, digest_type: DigestType, byte: u8) -> Key {
        Key::new(
            FullName::parse(name).unwrap(),
            CommitId::random(),
            digest(digest_type, byte),
        )
    }

    #[test]
    fn v1_write_read_round_trips() {
        let file = LockFile::new(
            LockFileVersion::V1,
            vec![
                module_key("lode.example.com/acme/money", DigestType::B5, 2),
                module_key("lode.example.com/acme/date", DigestType::B5, 1),
            ],
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap();

        let mut bytes = Vec::new();
        file.write(&mut bytes).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(LOCK_FILE_HEADER));

        let reread = LockFile::read(bytes.as_slice()).unwrap();
        assert_eq!(reread.version(), LockFileVersion::V1);
        // sorted by full name ascending
        assert_eq!(
            reread.deps()[0].full_name().to_string(),
            "lode.example.com/acme/date"
        );
        assert_eq!(reread.deps().len(), 2);

        let mut rewritten = Vec::new();
        reread.write(&mut rewritten).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn v2_round_trips_with_plugins_and_policies() {
        let plugin = module_key("lode.example.com/plugins/timestamps", DigestType::P1, 3);
        let policy = module_key("lode.example.com/policies/strict", DigestType::O1, 4);
        let file = LockFile::new(
            LockFileVersion::V2,
            vec![module_key("lode.example.com/acme/date", DigestType::B5, 1)],
            vec![plugin.clone()],
            vec![policy.clone()],
            BTreeMap::from([(
                policy.full_name().to_string(),
                vec![plugin.clone()],
            )]),
        )
        .unwrap();

        let mut bytes = Vec::new();
        file.write(&mut bytes).unwrap();
        let reread = LockFile::read(bytes.as_slice()).unwrap();

        assert_eq!(reread.plugins().len(), 1);
        assert_eq!(reread.policies().len(), 1);
        let plugins = reread
            .policy_plugins()
            .get("lode.example.com/policies/strict")
            .unwrap();
        assert_eq!(plugins.len(), 1);

        let mut rewritten = Vec::new();
        reread.write(&mut rewritten).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn v1beta1_round_trips_with_b4_digests() {
        let file = LockFile::new(
            LockFileVersion::V1Beta1,
            vec![module_key("lode.example.com/acme/date", DigestType::B4, 9)],
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap();
        let mut bytes = Vec::new();
        file.write(&mut bytes).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("version: v1beta1"));
        assert!(text.contains("digest: b4:"));

        let reread = LockFile::read(bytes.as_slice()).unwrap();
        assert_eq!(reread.version(), LockFileVersion::V1Beta1);
        reread.validate_digests().unwrap();
        let mut rewritten = Vec::new();
        reread.write(&mut rewritten).unwrap();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn duplicate_module_is_an_error() {
        let err = LockFile::new(
            LockFileVersion::V1,
            vec![
                module_key("lode.example.com/acme/date", DigestType::B5, 1),
                module_key("lode.example.com/acme/date", DigestType::B5, 2),
            ],
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LockFileError::DuplicateModule { .. }));
    }

    #[test]
    fn empty_commit_is_an_error() {
        let yaml = "version: v1\ndeps:\n- remote: lode.example.com\n  owner: acme\n  repository: date\n  commit: \"\"\n  digest: b5:00\n";
        let err = LockFile::read(yaml.as_bytes()).unwrap_err();
        assert!(matches!(err, LockFileError::EmptyCommit { .. }));
    }

    #[test]
    fn unknown_version_is_an_error() {
        let err = LockFile::read("version: v3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LockFileError::UnknownVersion { .. }));
    }

    #[test]
    fn digests_are_lazy_until_validated() {
        let yaml = "version: v1\ndeps:\n- remote: lode.example.com\n  owner: acme\n  repository: date\n  commit: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n  digest: b5:garbage\n";
        let file = LockFile::read(yaml.as_bytes()).unwrap();
        // reading succeeded; forcing the digests surfaces the failure
        assert!(file.validate_digests().is_err());
    }

    #[test]
    fn v1beta1_requires_b4_digests() {
        let file = LockFile::new(
            LockFileVersion::V1Beta1,
            vec![module_key("lode.example.com/acme/date", DigestType::B5, 1)],
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap();
        assert!(matches!(
            file.validate_digests().unwrap_err(),
            LockFileError::UnsupportedDigest { .. }
        ));
    }

    #[test]
    fn v1_cannot_pin_plugins() {
        let err = LockFile::new(
            LockFileVersion::V1,
            Vec::new(),
            vec![module_key("lode.example.com/plugins/x", DigestType::P1, 1)],
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LockFileError::Malformed { .. }));
    }

    #[test]
    fn migration_is_read_rebuild_write() {
        let v1 = LockFile::new(
            LockFileVersion::V1,
            vec![module_key("lode.example.com/acme/date", DigestType::B5, 1)],
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap();
        let v2 = LockFile::new(
            LockFileVersion::V2,
            v1.deps().to_vec(),
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        )
        .unwrap();
        let mut bytes = Vec::new();
        v2.write(&mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("version: v2"));
        assert!(text.contains("module: lode.example.com/acme/date"));
    }
}
