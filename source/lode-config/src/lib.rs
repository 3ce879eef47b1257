//! Value types and file formats shared by every layer of lode: entity
//! names and references, commit ids, content digests, dependency keys, the
//! `lode.yaml` / `lode.work.yaml` configuration files, and the `lode.lock`
//! dependency pin file.

pub mod commit_id;
pub mod config_file;
pub mod digest;
pub mod error;
pub mod key;
pub mod lock_file;
pub mod name;
pub mod reference;

pub use commit_id::CommitId;
pub use digest::{Digest, DigestType, LazyDigest};
pub use error::ParseError;
pub use key::Key;
pub use name::FullName;
pub use reference::Reference;
