//!
//! # Tiles & Their Union-Find
//!
//! A [Tile] is the atomic extraction unit: one axis-aligned rectangle on a
//! single basic layer, tagged with the occurrence and net of the component
//! it came from. Tiles double as the nodes of a rank-weighted union-find;
//! the root of each family owns the growing [Equipotential].
//!
//! Tiles are pool-allocated in a [TilePool] and reclaimed in bulk when the
//! extraction run finishes.
//!

// Local Imports
use crate::equi::{EquiId, EquiPool};
use crate::error::{ExtractError, ExtractResult};
use route21db::{BoundBox, Cell, EntityId, LayerKey, Occurrence};

/// Index of a [Tile] inside its [TilePool]
pub type TileId = u32;

/// # Root-Walk Flags
///
/// Options of [TilePool::root]: compress the parent path, fold climbed
/// payloads into the root equipotential, and/or allocate a root
/// equipotential when missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootFlags(pub u32);
impl RootFlags {
    pub const COMPRESS: RootFlags = RootFlags(1 << 0);
    pub const MERGE_EQUI: RootFlags = RootFlags(1 << 1);
    pub const MAKE_LEAF_EQUI: RootFlags = RootFlags(1 << 2);

    pub fn contains(&self, other: RootFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}
impl std::ops::BitOr for RootFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// # Tile
#[derive(Debug, Clone)]
pub struct Tile {
    /// Pool index
    pub id: TileId,
    /// Source occurrence: the component itself, or the representative of an
    /// already-extracted child equipotential
    pub occurrence: Occurrence,
    /// The basic layer this tile conducts on
    pub basic: LayerKey,
    /// Drawn box, in top-cell coordinates
    pub bbox: BoundBox,
    /// Owning net of the source component
    pub net: EntityId,
    /// Whether that net is externally visible
    pub external: bool,
    /// Whether `occurrence` names a child equipotential representative
    pub child_equi: bool,
    /// Union-find parent; roots have none
    parent: Option<TileId>,
    /// Union-by-rank weight; meaningful on roots only
    rank: u32,
    /// Outstanding sweep events referencing this tile
    refcount: u32,
    /// Epoch stamp: folds are skipped when up-to-date
    timestamp: u32,
    /// Occurrence already folded into a root equipotential
    occ_merged: bool,
    /// Reclaimed by the post-merge destruction pass
    dead: bool,
    /// Owned equipotential; roots only
    pub equi: Option<EquiId>,
}
impl Tile {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }
    pub fn is_dead(&self) -> bool {
        self.dead
    }
}

/// # Tile Pool
///
/// Arena of all tiles of one extraction run, plus the union-find epoch
/// counter and the queued-destruction list.
#[derive(Debug, Default)]
pub struct TilePool {
    tiles: Vec<Tile>,
    /// Current union-find epoch
    time: u32,
    /// Non-root tiles queued for reclamation
    queued: Vec<TileId>,
}
impl TilePool {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.tiles.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
    /// Allocate a new [Tile]. Each tile starts with a refcount of two,
    /// one per sweep event. `parent` pre-merges multi-box shapes under
    /// their first tile.
    pub fn create(
        &mut self,
        occurrence: Occurrence,
        basic: LayerKey,
        bbox: BoundBox,
        net: EntityId,
        external: bool,
        child_equi: bool,
        parent: Option<TileId>,
    ) -> TileId {
        let id = self.tiles.len() as TileId;
        self.tiles.push(Tile {
            id,
            occurrence,
            basic,
            bbox,
            net,
            external,
            child_equi,
            parent,
            rank: 0,
            refcount: 2,
            timestamp: 0,
            occ_merged: false,
            dead: false,
            equi: None,
        });
        id
    }
    pub fn get(&self, id: TileId) -> &Tile {
        &self.tiles[id as usize]
    }
    pub fn get_mut(&mut self, id: TileId) -> &mut Tile {
        &mut self.tiles[id as usize]
    }
    /// Iterate all tile ids, ascending
    pub fn ids(&self) -> impl Iterator<Item = TileId> {
        0..self.tiles.len() as TileId
    }
    /// Advance the union-find epoch; folds recorded before this point
    /// are considered stale.
    pub fn time_tick(&mut self) {
        self.time += 1;
    }
    fn is_up_to_date(&self, id: TileId) -> bool {
        self.tiles[id as usize].timestamp >= self.time
    }
    fn sync_time(&mut self, id: TileId) {
        let time = self.time;
        self.tiles[id as usize].timestamp = time;
    }
    /// Drop one sweep-event reference
    pub fn dec_ref(&mut self, id: TileId) {
        let tile = &mut self.tiles[id as usize];
        if tile.refcount > 0 {
            tile.refcount -= 1;
        }
    }

    /// Allocate an [Equipotential] for `id`, seeded with its own payload
    fn new_equipotential(&mut self, id: TileId, equis: &mut EquiPool) -> EquiId {
        let equi = equis.alloc();
        let tile = &mut self.tiles[id as usize];
        tile.equi = Some(equi);
        equis.get_mut(equi).add(
            tile.occurrence.clone(),
            &tile.bbox,
            tile.net,
            tile.external,
            tile.child_equi,
        );
        equi
    }

    /// # Union-Find Root Walk
    ///
    /// Find the root of `id`'s family. Depending on `flags`, also compress
    /// the walked path, fold the walked tiles' payloads into the root's
    /// equipotential, and/or allocate that equipotential when missing.
    ///
    /// A parent chain longer than the pool is a corrupted union-find;
    /// that is a fatal [ExtractError::Bug].
    pub fn root(
        &mut self,
        id: TileId,
        flags: RootFlags,
        equis: &mut EquiPool,
        cell: &Cell,
    ) -> ExtractResult<TileId> {
        if self.tiles[id as usize].is_root() {
            if flags.contains(RootFlags::MAKE_LEAF_EQUI) && self.tiles[id as usize].equi.is_none()
            {
                self.new_equipotential(id, equis);
            }
            return Ok(id);
        }

        // Climb to the root, with a cycle bound
        let mut root = id;
        let mut steps = 0usize;
        while let Some(parent) = self.tiles[root as usize].parent {
            root = parent;
            steps += 1;
            if steps > self.tiles.len() {
                return Err(ExtractError::bug("Cycle in tile parent pointers"));
            }
        }

        if flags.contains(RootFlags::MERGE_EQUI) {
            let root_equi = match self.tiles[root as usize].equi {
                Some(e) => e,
                None => self.new_equipotential(root, equis),
            };
            let mut current = id;
            while current != root {
                if self.is_up_to_date(current) {
                    break;
                }
                if !self.tiles[current as usize].occ_merged {
                    match self.tiles[current as usize].equi {
                        Some(equi) if equi != root_equi => {
                            equis.merge(root_equi, equi, cell)?;
                        }
                        Some(_) => (),
                        None => {
                            let tile = &self.tiles[current as usize];
                            let (occ, bbox) = (tile.occurrence.clone(), tile.bbox);
                            let (net, ext, child) = (tile.net, tile.external, tile.child_equi);
                            equis.get_mut(root_equi).add(occ, &bbox, net, ext, child);
                        }
                    }
                    self.tiles[current as usize].occ_merged = true;
                    self.sync_time(current);
                }
                current = match self.tiles[current as usize].parent {
                    Some(p) => p,
                    None => break,
                };
            }
        }

        if flags.contains(RootFlags::COMPRESS) {
            let mut current = id;
            while current != root {
                let parent = self.tiles[current as usize].parent.unwrap();
                self.tiles[current as usize].parent = Some(root);
                self.queued.push(current);
                current = parent;
            }
        }

        Ok(root)
    }

    /// # Union
    ///
    /// Merge the families of `a` and `b`, attaching the smaller-rank root
    /// under the larger. Returns the surviving root.
    pub fn merge(
        &mut self,
        a: TileId,
        b: TileId,
        equis: &mut EquiPool,
        cell: &Cell,
    ) -> ExtractResult<TileId> {
        let mut root1 = self.root(a, RootFlags::COMPRESS | RootFlags::MERGE_EQUI, equis, cell)?;
        let mut root2 = self.root(b, RootFlags::COMPRESS | RootFlags::MERGE_EQUI, equis, cell)?;
        if root1 == root2 {
            return Ok(root1);
        }
        if self.tiles[root1 as usize].rank < self.tiles[root2 as usize].rank {
            std::mem::swap(&mut root1, &mut root2);
        }
        if self.tiles[root1 as usize].rank == self.tiles[root2 as usize].rank {
            self.tiles[root1 as usize].rank += 1;
        }
        self.tiles[root2 as usize].parent = Some(root1);
        Ok(root1)
    }

    /// Reclaim the tiles queued by compression: no longer roots, their
    /// payloads folded, nothing references them.
    pub fn destroy_queued(&mut self) {
        let queued = std::mem::take(&mut self.queued);
        for id in queued {
            let tile = &mut self.tiles[id as usize];
            if !tile.is_root() && tile.refcount == 0 && tile.occ_merged {
                tile.dead = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route21db::{Cell, DbResult, LayerKey, Occurrence};

    fn pool_with(cell: &mut Cell, n: u32) -> DbResult<TilePool> {
        let net = cell.add_net("n")?;
        let mut pool = TilePool::new();
        for i in 0..n {
            pool.create(
                Occurrence::flat(route21db::EntityId(i as u64 + 1_000_000)),
                LayerKey::default(),
                route21db::BoundBox::new(i as i64 * 10, 0, i as i64 * 10 + 10, 10),
                net,
                false,
                false,
                None,
            );
        }
        Ok(pool)
    }

    #[test]
    fn union_find_families() -> DbResult<()> {
        let mut cell = Cell::new("unit")?;
        let mut pool = pool_with(&mut cell, 4)?;
        let mut equis = EquiPool::new();

        pool.merge(0, 1, &mut equis, &cell).unwrap();
        pool.merge(2, 3, &mut equis, &cell).unwrap();
        let r01 = pool.root(0, RootFlags::default(), &mut equis, &cell).unwrap();
        let r23 = pool.root(2, RootFlags::default(), &mut equis, &cell).unwrap();
        assert_ne!(r01, r23);

        pool.merge(1, 3, &mut equis, &cell).unwrap();
        let r0 = pool.root(0, RootFlags::default(), &mut equis, &cell).unwrap();
        let r3 = pool.root(3, RootFlags::default(), &mut equis, &cell).unwrap();
        assert_eq!(r0, r3);
        Ok(())
    }

    #[test]
    fn merge_equi_folds_every_member() -> DbResult<()> {
        let mut cell = Cell::new("unit")?;
        let mut pool = pool_with(&mut cell, 3)?;
        let mut equis = EquiPool::new();

        pool.merge(0, 1, &mut equis, &cell).unwrap();
        pool.merge(1, 2, &mut equis, &cell).unwrap();
        pool.time_tick();
        for id in pool.ids().collect::<Vec<_>>() {
            pool.root(
                id,
                RootFlags::COMPRESS | RootFlags::MERGE_EQUI | RootFlags::MAKE_LEAF_EQUI,
                &mut equis,
                &cell,
            )
            .unwrap();
        }
        let live: Vec<_> = equis.live().collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].components.len() + live[0].childs.len(), 3);
        Ok(())
    }
}
