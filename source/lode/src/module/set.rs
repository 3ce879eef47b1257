//! An immutable, deduplicated collection of modules with shared lookup
//! caches.
//!
//! The two per-set caches (`file path -> owning module` and `file path ->
//! imports`) memoize `Result`s, so a failed lookup is as cached as a
//! successful one. Reads take the read lock; a miss computes outside any
//! lock (the computation does I/O) and then inserts under the write lock,
//! re-checking so the first writer wins and every caller observes one
//! answer.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use lode_config::Digest;
use tokio::sync::OnceCell;

use super::scanner::scan_imports;
use super::Module;
use crate::error::{Error, Result};

pub(crate) struct SetCore {
    modules: Vec<Arc<Module>>,
    by_opaque_id: HashMap<String, usize>,
    by_full_name: HashMap<String, usize>,
    by_bucket_id: HashMap<String, usize>,
    path_to_module: RwLock<HashMap<String, Result<usize>>>,
    path_to_imports: RwLock<HashMap<String, Result<Arc<BTreeSet<String>>>>>,
    by_digest: OnceCell<Result<HashMap<String, usize>>>,
}

impl SetCore {
    pub(crate) fn new(modules: Vec<Arc<Module>>) -> Result<Arc<Self>> {
        let mut by_opaque_id = HashMap::with_capacity(modules.len());
        let mut by_full_name = HashMap::new();
        let mut by_bucket_id = HashMap::new();
        for (index, module) in modules.iter().enumerate() {
            if by_opaque_id
                .insert(module.opaque_id().to_owned(), index)
                .is_some()
            {
                return Err(Error::DuplicateEntity {
                    kind: "module",
                    name: module.opaque_id().to_owned(),
                });
            }
            if let Some(full_name) = module.full_name() {
                if by_full_name.insert(full_name.to_string(), index).is_some() {
                    return Err(Error::DuplicateEntity {
                        kind: "module",
                        name: full_name.to_string(),
                    });
                }
            }
            if let Some(bucket_id) = module.bucket_id() {
                if by_bucket_id.insert(bucket_id.to_owned(), index).is_some() {
                    return Err(Error::DuplicateEntity {
                        kind: "bucket id",
                        name: bucket_id.to_owned(),
                    });
                }
            }
        }
        let core = Arc::new(Self {
            modules,
            by_opaque_id,
            by_full_name,
            by_bucket_id,
            path_to_module: RwLock::new(HashMap::new()),
            path_to_imports: RwLock::new(HashMap::new()),
            by_digest: OnceCell::new(),
        });
        for module in &core.modules {
            module.attach_set(&core);
        }
        Ok(core)
    }

    pub(crate) fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub(crate) fn module_for_opaque_id(&self, opaque_id: &str) -> Result<Arc<Module>> {
        self.by_opaque_id
            .get(opaque_id)
            .map(|&index| Arc::clone(&self.modules[index]))
            .ok_or_else(|| Error::system(format!("module {opaque_id} is not in the set")))
    }

    /// Resolves the unique module owning `path`. The first call scans every
    /// module; the outcome, including "nobody owns it" and "it's
    /// ambiguous", is remembered.
    pub(crate) async fn module_for_file_path(self: &Arc<Self>, path: &str) -> Result<Arc<Module>> {
        if let Some(cached) = self.read_cached_owner(path)? {
            return cached.map(|index| Arc::clone(&self.modules[index]));
        }

        let mut matches = Vec::new();
        for (index, module) in self.modules.iter().enumerate() {
            if module.has_file(path).await? {
                matches.push(index);
            }
        }
        let computed: Result<usize> = match matches.as_slice() {
            [] => Err(Error::NotFound {
                kind: "file path",
                input: path.to_owned(),
            }),
            [index] => Ok(*index),
            many => Err(Error::AmbiguousPath {
                path: path.to_owned(),
                candidates: many
                    .iter()
                    .map(|&index| self.modules[index].opaque_id().to_owned())
                    .collect(),
            }),
        };

        let mut cache = self
            .path_to_module
            .write()
            .map_err(|_| Error::system("path cache lock poisoned"))?;
        let entry = cache.entry(path.to_owned()).or_insert(computed);
        entry.clone().map(|index| Arc::clone(&self.modules[index]))
    }

    fn read_cached_owner(&self, path: &str) -> Result<Option<Result<usize>>> {
        let cache = self
            .path_to_module
            .read()
            .map_err(|_| Error::system("path cache lock poisoned"))?;
        Ok(cache.get(path).cloned())
    }

    /// The import paths of the proto file at `path`, via the single-pass
    /// scanner. Resolving the owning module first enforces that the path
    /// is unambiguous.
    pub(crate) async fn imports_for_file_path(
        self: &Arc<Self>,
        path: &str,
    ) -> Result<Arc<BTreeSet<String>>> {
        {
            let cache = self
                .path_to_imports
                .read()
                .map_err(|_| Error::system("imports cache lock poisoned"))?;
            if let Some(cached) = cache.get(path) {
                return cached.clone();
            }
        }

        let computed = match self.module_for_file_path(path).await {
            Ok(module) => module
                .get_file(path)
                .await
                .map(|data| Arc::new(scan_imports(&data))),
            Err(e) => Err(e),
        };

        let mut cache = self
            .path_to_imports
            .write()
            .map_err(|_| Error::system("imports cache lock poisoned"))?;
        let entry = cache.entry(path.to_owned()).or_insert(computed);
        entry.clone()
    }

    async fn digest_index(&self) -> Result<&HashMap<String, usize>> {
        self.by_digest
            .get_or_init(|| async {
                let mut map = HashMap::with_capacity(self.modules.len());
                for (index, module) in self.modules.iter().enumerate() {
                    map.insert(module.digest().await?.to_string(), index);
                }
                Ok(map)
            })
            .await
            .as_ref()
            .map_err(|e| e.clone())
    }
}

/// The public handle to a set of modules. Cheap to clone; the set and its
/// modules live until the last handle drops.
#[derive(Clone)]
pub struct ModuleSet {
    core: Arc<SetCore>,
}

impl std::fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSet")
            .field("len", &self.core.modules.len())
            .finish_non_exhaustive()
    }
}

impl ModuleSet {
    pub(crate) fn from_core(core: Arc<SetCore>) -> Self {
        Self { core }
    }

    /// All modules, ordered by opaque id ascending.
    pub fn modules(&self) -> &[Arc<Module>] {
        self.core.modules()
    }

    pub fn target_modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.core.modules().iter().filter(|m| m.is_target())
    }

    pub fn module_for_full_name(&self, full_name: &str) -> Option<&Arc<Module>> {
        self.core
            .by_full_name
            .get(full_name)
            .map(|&index| &self.core.modules[index])
    }

    pub fn module_for_opaque_id(&self, opaque_id: &str) -> Option<&Arc<Module>> {
        self.core
            .by_opaque_id
            .get(opaque_id)
            .map(|&index| &self.core.modules[index])
    }

    pub fn module_for_bucket_id(&self, bucket_id: &str) -> Option<&Arc<Module>> {
        self.core
            .by_bucket_id
            .get(bucket_id)
            .map(|&index| &self.core.modules[index])
    }

    /// Looks a module up by its content digest. Forces digest computation
    /// for the whole set on first use.
    pub async fn module_for_digest(&self, digest: &Digest) -> Result<Option<Arc<Module>>> {
        let index = self.core.digest_index().await?;
        Ok(index
            .get(&digest.to_string())
            .map(|&index| Arc::clone(&self.core.modules[index])))
    }

    pub async fn module_for_file_path(&self, path: &str) -> Result<Arc<Module>> {
        self.core.module_for_file_path(path).await
    }

    pub async fn imports_for_file_path(&self, path: &str) -> Result<Arc<BTreeSet<String>>> {
        self.core.imports_for_file_path(path).await
    }
}
