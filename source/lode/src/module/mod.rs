//! Modules: Protobuf schema packages with identity, a classified file
//! view, lazy digests, and lazy dependency computation against the
//! enclosing [`ModuleSet`](set::ModuleSet).

pub mod builder;
pub mod scanner;
pub mod set;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use lode_config::{CommitId, Digest, DigestType, FullName};
use tokio::sync::OnceCell;

use crate::bucket::Bucket;
use crate::cas::{digest_for_bytes, digest_for_digests, FileNode, Manifest};
use crate::error::{Error, Result};
use set::SetCore;

/// Documentation file candidates, in election order: only the first one
/// present in a module becomes its documentation file.
pub const DOC_FILE_PATHS: [&str; 3] = ["lode.md", "README.md", "README.markdown"];

pub const LICENSE_FILE_PATH: &str = "LICENSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Proto,
    Doc,
    License,
}

/// Classifies a path by shape alone. Doc-file election (which of the doc
/// candidates actually counts) happens per module.
pub fn classify_path(path: &str) -> Option<FileType> {
    if path.ends_with(".proto") {
        Some(FileType::Proto)
    } else if path == LICENSE_FILE_PATH {
        Some(FileType::License)
    } else if DOC_FILE_PATHS.contains(&path) {
        Some(FileType::Doc)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    path: String,
    file_type: FileType,
    is_target_file: bool,
}

impl FileInfo {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn is_target_file(&self) -> bool {
        self.is_target_file
    }
}

/// Include/exclude paths within one target module, relative to the module
/// root. A path targets itself and everything under it.
#[derive(Debug, Clone, Default)]
pub struct TargetPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TargetPaths {
    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|t| path_is_within(path, t));
        included && !self.exclude.iter().any(|t| path_is_within(path, t))
    }
}

fn path_is_within(path: &str, target: &str) -> bool {
    path == target
        || target.is_empty()
        || (path.len() > target.len()
            && path.starts_with(target)
            && path.as_bytes()[target.len()] == b'/')
}

/// One dependency edge of a module.
#[derive(Clone)]
pub struct ModuleDep {
    module: Arc<Module>,
    is_direct: bool,
}

impl ModuleDep {
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// True for first-hop dependencies, i.e. those imported directly by
    /// the module's own files.
    pub fn is_direct(&self) -> bool {
        self.is_direct
    }
}

pub struct Module {
    opaque_id: String,
    bucket_id: Option<String>,
    full_name: Option<FullName>,
    commit_id: Option<CommitId>,
    is_target: bool,
    created_from_bucket: bool,
    target_paths: Option<TargetPaths>,
    digest_type: DigestType,
    bucket: Arc<dyn Bucket>,
    set: OnceLock<Weak<SetCore>>,
    file_infos: OnceCell<Result<Arc<Vec<FileInfo>>>>,
    digest: OnceCell<Result<Digest>>,
    deps: OnceCell<Result<Arc<Vec<(String, bool)>>>>,
}

impl Module {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        bucket_id: Option<String>,
        full_name: Option<FullName>,
        commit_id: Option<CommitId>,
        is_target: bool,
        created_from_bucket: bool,
        target_paths: Option<TargetPaths>,
        digest_type: DigestType,
        bucket: Arc<dyn Bucket>,
    ) -> Result<Self> {
        let opaque_id = match (&full_name, &bucket_id) {
            (Some(full_name), _) => full_name.to_string(),
            (None, Some(bucket_id)) => bucket_id.clone(),
            (None, None) => {
                return Err(Error::system(
                    "module construction requires a full name or a bucket id",
                ))
            }
        };
        Ok(Self {
            opaque_id,
            bucket_id,
            full_name,
            commit_id,
            is_target,
            created_from_bucket,
            target_paths,
            digest_type,
            bucket,
            set: OnceLock::new(),
            file_infos: OnceCell::new(),
            digest: OnceCell::new(),
            deps: OnceCell::new(),
        })
    }

    /// Unique within the enclosing set: the full name when present, the
    /// bucket id otherwise.
    pub fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    pub fn bucket_id(&self) -> Option<&str> {
        self.bucket_id.as_deref()
    }

    pub fn full_name(&self) -> Option<&FullName> {
        self.full_name.as_ref()
    }

    pub fn commit_id(&self) -> Option<CommitId> {
        self.commit_id
    }

    /// Whether the current operation acts on this module, as opposed to it
    /// being read only as a dependency.
    pub fn is_target(&self) -> bool {
        self.is_target
    }

    pub fn is_local(&self) -> bool {
        self.created_from_bucket
    }

    pub(crate) fn attach_set(&self, core: &Arc<SetCore>) {
        let _ = self.set.set(Arc::downgrade(core));
    }

    fn set_core(&self) -> Result<Arc<SetCore>> {
        self.set
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::system(format!("module {} has no set", self.opaque_id)))
    }

    pub fn module_set(&self) -> Result<set::ModuleSet> {
        Ok(set::ModuleSet::from_core(self.set_core()?))
    }

    /// The classified file view: `.proto` files, at most one documentation
    /// file, and the license file. Everything else in the bucket (configs,
    /// stray files) is not part of the module.
    pub async fn walk_file_infos(&self) -> Result<Arc<Vec<FileInfo>>> {
        self.file_infos
            .get_or_init(|| async {
                let paths = self.bucket.walk().await?;
                let doc_file = DOC_FILE_PATHS
                    .iter()
                    .find(|candidate| paths.iter().any(|p| p == *candidate))
                    .copied();
                let mut infos = Vec::new();
                for path in paths {
                    let file_type = match classify_path(&path) {
                        Some(FileType::Doc) if Some(path.as_str()) != doc_file => continue,
                        Some(file_type) => file_type,
                        None => continue,
                    };
                    let is_target_file = self.is_target
                        && self
                            .target_paths
                            .as_ref()
                            .map_or(true, |targets| targets.matches(&path));
                    infos.push(FileInfo {
                        path,
                        file_type,
                        is_target_file,
                    });
                }
                Ok(Arc::new(infos))
            })
            .await
            .clone()
    }

    pub async fn stat_file_info(&self, path: &str) -> Result<Option<FileInfo>> {
        let infos = self.walk_file_infos().await?;
        Ok(infos.iter().find(|info| info.path == path).cloned())
    }

    /// Reads a file that is part of the module's file view.
    pub async fn get_file(&self, path: &str) -> Result<Bytes> {
        if self.stat_file_info(path).await?.is_none() {
            return Err(Error::NotFound {
                kind: "file path",
                input: path.to_owned(),
            });
        }
        self.bucket.read(path).await
    }

    pub(crate) async fn has_file(&self, path: &str) -> Result<bool> {
        Ok(self.stat_file_info(path).await?.is_some())
    }

    /// The module's dependencies, direct and transitive, ordered by opaque
    /// id ascending. Computed once; later calls reuse the result.
    pub async fn deps(&self) -> Result<Vec<ModuleDep>> {
        let entries = self
            .deps
            .get_or_init(|| async { self.compute_dep_entries().await.map(Arc::new) })
            .await
            .clone()?;
        let core = self.set_core()?;
        entries
            .iter()
            .map(|(opaque_id, is_direct)| {
                Ok(ModuleDep {
                    module: core.module_for_opaque_id(opaque_id)?,
                    is_direct: *is_direct,
                })
            })
            .collect()
    }

    /// Walks this module's proto files, resolves each import to its owning
    /// module, then breadth-first through those modules' own imports.
    /// First-hop deps are direct and stay direct no matter how often they
    /// reappear deeper in the walk.
    async fn compute_dep_entries(&self) -> Result<Vec<(String, bool)>> {
        let core = self.set_core()?;
        let mut found: BTreeMap<String, bool> = BTreeMap::new();
        let mut queue: VecDeque<Arc<Module>> = VecDeque::new();

        for info in self.walk_file_infos().await?.iter() {
            if info.file_type != FileType::Proto {
                continue;
            }
            for import in core.imports_for_file_path(&info.path).await?.iter() {
                let owner = core.module_for_file_path(import).await?;
                if owner.opaque_id() == self.opaque_id() {
                    continue;
                }
                if !found.contains_key(owner.opaque_id()) {
                    found.insert(owner.opaque_id().to_owned(), true);
                    queue.push_back(owner);
                }
            }
        }

        while let Some(module) = queue.pop_front() {
            for info in module.walk_file_infos().await?.iter() {
                if info.file_type != FileType::Proto {
                    continue;
                }
                for import in core.imports_for_file_path(&info.path).await?.iter() {
                    let owner = core.module_for_file_path(import).await?;
                    if owner.opaque_id() == self.opaque_id() {
                        return Err(Error::ImportCycle {
                            opaque_id: self.opaque_id.clone(),
                        });
                    }
                    if owner.opaque_id() == module.opaque_id() {
                        continue;
                    }
                    if !found.contains_key(owner.opaque_id()) {
                        found.insert(owner.opaque_id().to_owned(), false);
                        queue.push_back(owner);
                    }
                }
            }
        }

        Ok(found.into_iter().collect())
    }

    /// The module's content digest. Names never enter it: only file
    /// contents and dependency digests do.
    ///
    /// Boxed because dependency digests recurse through [`Module::digest`].
    pub fn digest(&self) -> BoxFuture<'_, Result<Digest>> {
        Box::pin(async move {
            self.digest
                .get_or_init(|| async { self.compute_digest().await })
                .await
                .clone()
        })
    }

    async fn compute_digest(&self) -> Result<Digest> {
        let infos = self.walk_file_infos().await?;
        let mut nodes = Vec::with_capacity(infos.len());
        for info in infos.iter() {
            let data = self.bucket.read(&info.path).await?;
            nodes.push(FileNode::new(
                info.path.clone(),
                digest_for_bytes(self.digest_type, &data),
            )?);
        }
        let manifest_digest = Manifest::new(nodes)?.digest(self.digest_type);
        if self.digest_type == DigestType::B4 {
            return Ok(manifest_digest);
        }
        let deps = self.deps().await?;
        let mut digests = Vec::with_capacity(deps.len() + 1);
        digests.push(manifest_digest);
        for dep in &deps {
            digests.push(dep.module().digest().await?);
        }
        Ok(digest_for_digests(self.digest_type, &digests))
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("opaque_id", &self.opaque_id)
            .field("bucket_id", &self.bucket_id)
            .field("is_target", &self.is_target)
            .field("created_from_bucket", &self.created_from_bucket)
            .finish()
    }
}
