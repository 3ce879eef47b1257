//! The top-level lock-file transformations: `update`, `prune`, and the
//! `push` pipeline. All three are compositions of workspace state and
//! providers; the durable lock-file write lives in [`lock_write`].

pub mod lock_write;
pub mod prune;
pub mod push;
pub mod update;
