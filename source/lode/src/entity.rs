//! Set machinery shared by plugins and policies.
//!
//! Modules get the richer [`crate::module::set::ModuleSet`]; the simpler
//! entities reuse this generic, deduplicated, opaque-id-ordered
//! collection.

use std::collections::HashMap;
use std::sync::Arc;

use lode_config::FullName;

use crate::error::{Error, Result};

pub trait Entity {
    fn opaque_id(&self) -> &str;
    fn full_name(&self) -> Option<&FullName>;
}

pub struct EntitySet<E> {
    entities: Vec<Arc<E>>,
    by_opaque_id: HashMap<String, usize>,
    by_full_name: HashMap<String, usize>,
}

impl<E> std::fmt::Debug for EntitySet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySet")
            .field("len", &self.entities.len())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> EntitySet<E> {
    pub fn new(kind: &'static str, mut entities: Vec<Arc<E>>) -> Result<Self> {
        entities.sort_by(|a, b| a.opaque_id().cmp(b.opaque_id()));
        let mut by_opaque_id = HashMap::with_capacity(entities.len());
        let mut by_full_name = HashMap::new();
        for (index, entity) in entities.iter().enumerate() {
            if by_opaque_id
                .insert(entity.opaque_id().to_owned(), index)
                .is_some()
            {
                return Err(Error::DuplicateEntity {
                    kind,
                    name: entity.opaque_id().to_owned(),
                });
            }
            if let Some(full_name) = entity.full_name() {
                if by_full_name.insert(full_name.to_string(), index).is_some() {
                    return Err(Error::DuplicateEntity {
                        kind,
                        name: full_name.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            entities,
            by_opaque_id,
            by_full_name,
        })
    }

    /// All entities, ordered by opaque id ascending.
    pub fn entities(&self) -> &[Arc<E>] {
        &self.entities
    }

    pub fn get_for_opaque_id(&self, opaque_id: &str) -> Option<&Arc<E>> {
        self.by_opaque_id
            .get(opaque_id)
            .map(|&index| &self.entities[index])
    }

    pub fn get_for_full_name(&self, full_name: &str) -> Option<&Arc<E>> {
        self.by_full_name
            .get(full_name)
            .map(|&index| &self.entities[index])
    }
}
