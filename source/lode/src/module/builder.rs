//! Accumulates local buckets and remote keys into a [`ModuleSet`].
//!
//! Priority when the same opaque id arrives through more than one source:
//! targets beat non-targets, and within each class bucket-provided beats
//! key-provided. Remote keys that would lose to an already-added local
//! module are never fetched at all.

use std::collections::HashSet;
use std::sync::Arc;

use lode_config::{CommitId, DigestType, FullName, Key};

use super::set::{ModuleSet, SetCore};
use super::{Module, TargetPaths};
use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::provider::ModuleDataProvider;

/// Options for a bucket-sourced module.
#[derive(Default)]
pub struct AddBucketOptions {
    pub full_name: Option<FullName>,
    pub commit_id: Option<CommitId>,
    pub target_paths: Option<TargetPaths>,
}

struct LocalEntry {
    bucket: Arc<dyn Bucket>,
    bucket_id: String,
    is_target: bool,
    options: AddBucketOptions,
}

pub struct ModuleSetBuilder {
    data_provider: Arc<dyn ModuleDataProvider>,
    digest_type: DigestType,
    locals: Vec<LocalEntry>,
    remotes: Vec<(Key, bool)>,
    validate_targets: bool,
}

impl ModuleSetBuilder {
    pub fn new(data_provider: Arc<dyn ModuleDataProvider>, digest_type: DigestType) -> Self {
        Self {
            data_provider,
            digest_type,
            locals: Vec::new(),
            remotes: Vec::new(),
            validate_targets: true,
        }
    }

    /// Skips the target-import validation at build time. Operations that
    /// only read configuration (`update` resolving refs before anything
    /// is pinned) use this; everything else wants the validation.
    pub fn skip_target_validation(&mut self) {
        self.validate_targets = false;
    }

    pub fn add_module_for_bucket(
        &mut self,
        bucket: Arc<dyn Bucket>,
        bucket_id: impl Into<String>,
        is_target: bool,
        options: AddBucketOptions,
    ) -> Result<()> {
        let bucket_id = bucket_id.into();
        if bucket_id.is_empty() {
            return Err(Error::system("bucket id must not be empty"));
        }
        self.locals.push(LocalEntry {
            bucket,
            bucket_id,
            is_target,
            options,
        });
        Ok(())
    }

    /// Adds a remote module by key. Its data is fetched at build time, and
    /// its declared dependencies join the set as non-target key-sourced
    /// modules unless an equivalent key or bucket is already present.
    pub fn add_module_for_key(&mut self, key: Key, is_target: bool) {
        self.remotes.push((key, is_target));
    }

    /// Consumes the builder; a second build is impossible by construction.
    pub async fn build(self) -> Result<ModuleSet> {
        struct Candidate {
            module: Module,
            is_target: bool,
            created_from_bucket: bool,
        }

        let mut candidates = Vec::with_capacity(self.locals.len() + self.remotes.len());
        let mut local_targets: HashSet<String> = HashSet::new();
        let mut known: HashSet<String> = HashSet::new();

        for entry in self.locals {
            let module = Module::new(
                Some(entry.bucket_id),
                entry.options.full_name,
                entry.options.commit_id,
                entry.is_target,
                true,
                entry.options.target_paths,
                self.digest_type,
                entry.bucket,
            )?;
            known.insert(module.opaque_id().to_owned());
            if entry.is_target {
                local_targets.insert(module.opaque_id().to_owned());
            }
            candidates.push(Candidate {
                module,
                is_target: entry.is_target,
                created_from_bucket: true,
            });
        }

        // A remote key survives against a local module of the same name
        // only when the key is a target and the local module is not;
        // everything else resolves in the local's favor without a fetch.
        let mut frontier: Vec<(Key, bool)> = Vec::new();
        let mut pending_names: HashSet<String> = HashSet::new();
        for (key, is_target) in self.remotes {
            let name = key.full_name().to_string();
            let survives = match (known.contains(&name), is_target) {
                (false, _) => pending_names.insert(name),
                (true, true) => !local_targets.contains(&name) && pending_names.insert(name),
                (true, false) => false,
            };
            if survives {
                frontier.push((key, is_target));
            }
        }

        // Fault in remote data level by level so declared dependencies of
        // dependencies land too, each name resolved at most once.
        while !frontier.is_empty() {
            let keys: Vec<Key> = frontier.iter().map(|(key, _)| key.clone()).collect();
            let datas = self.data_provider.datas_for_keys(&keys).await?;
            let mut next = Vec::new();
            for ((key, is_target), data) in frontier.into_iter().zip(datas) {
                let bucket = data.bucket()?;
                for dep in data.declared_dep_keys()? {
                    let name = dep.full_name().to_string();
                    if !known.contains(&name) && pending_names.insert(name) {
                        next.push((dep.clone(), false));
                    }
                }
                let module = Module::new(
                    None,
                    Some(key.full_name().clone()),
                    Some(key.commit_id()),
                    is_target,
                    false,
                    None,
                    self.digest_type,
                    bucket,
                )?;
                candidates.push(Candidate {
                    module,
                    is_target,
                    created_from_bucket: false,
                });
            }
            frontier = next;
        }

        // Priority order: targets first, then bucket-sourced, insertion
        // order as the stable tiebreaker.
        candidates.sort_by_key(|c| (!c.is_target, !c.created_from_bucket));

        let mut seen = HashSet::new();
        let mut modules: Vec<Arc<Module>> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if seen.insert(candidate.module.opaque_id().to_owned()) {
                modules.push(Arc::new(candidate.module));
            }
        }
        modules.sort_by(|a, b| a.opaque_id().cmp(b.opaque_id()));

        let core = SetCore::new(modules)?;
        let set = ModuleSet::from_core(core);

        // Every import reachable from a target resolves to exactly one
        // module; walking deps here also seeds the shared caches.
        if self.validate_targets {
            for module in set.modules() {
                if module.is_target() {
                    module.deps().await?;
                }
            }
        }
        Ok(set)
    }
}
