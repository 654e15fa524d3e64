//!
//! # Hierarchical Occurrences
//!
//! An [Occurrence] designates one entity *through* a chain of instances:
//! the pair (instance path, entity id). Two occurrences are equal iff both
//! their paths and their entities are equal; a flattened occurrence carries
//! the empty path.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use crate::cell::Cell;
use crate::entity::EntityId;
use crate::error::{DbError, DbResult};
use crate::geom::Transform;

/// # Instance Path
///
/// Instance ids from the top cell downward. Ordered and hashable so
/// occurrence sets iterate deterministically.
#[derive(
    Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Path(pub Vec<EntityId>);
impl Path {
    /// The empty (top-level) path
    pub fn empty() -> Self {
        Self(Vec::new())
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Extend downward by one instance
    pub fn descend(&self, inst: EntityId) -> Self {
        let mut ids = self.0.clone();
        ids.push(inst);
        Self(ids)
    }
    /// The head instance (in the top cell), if any
    pub fn head(&self) -> Option<EntityId> {
        self.0.first().copied()
    }
}

/// # Occurrence
///
/// (instance path, entity) value pair.
#[derive(
    Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Occurrence {
    pub path: Path,
    pub entity: EntityId,
}
impl Occurrence {
    /// Create a top-level (flattened) occurrence of `entity`
    pub fn flat(entity: EntityId) -> Self {
        Self {
            path: Path::empty(),
            entity,
        }
    }
    /// Create an occurrence of `entity` through `path`
    pub fn new(path: Path, entity: EntityId) -> Self {
        Self { path, entity }
    }
}

/// Compose the [Transform]s of every instance along `path`, starting
/// from `cell`. The result maps the deepest cell's coordinates into
/// `cell`'s coordinates.
pub fn path_transform(cell: &Cell, path: &Path) -> DbResult<Transform> {
    let mut transform = Transform::identity();
    let mut current: Option<crate::utils::Ptr<Cell>> = None;
    for inst_id in &path.0 {
        let inst = match &current {
            None => cell
                .instances
                .get(inst_id)
                .ok_or_else(|| DbError::msg("Invalid instance id on path"))?
                .clone(),
            Some(ptr) => {
                let guard = ptr.read()?;
                guard
                    .instances
                    .get(inst_id)
                    .ok_or_else(|| DbError::msg("Invalid instance id on path"))?
                    .clone()
            }
        };
        transform = transform.compose(&inst.transform);
        current = Some(inst.cell.clone());
    }
    Ok(transform)
}
