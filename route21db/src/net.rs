//!
//! # Nets
//!

// Std-Lib
use std::collections::BTreeSet;

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use crate::entity::{EntityId, Properties};
use crate::error::{DbError, DbResult};

/// # Net Type Enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetType {
    Logical,
    Clock,
    Power,
    Ground,
    Blockage,
    /// The outcome of a power/ground conflict
    Fused,
}
impl Default for NetType {
    fn default() -> Self {
        NetType::Logical
    }
}
impl NetType {
    /// Supply test
    pub fn is_supply(&self) -> bool {
        matches!(self, NetType::Power | NetType::Ground)
    }
}

/// # Net Direction Bit-Set
///
/// Driver/receiver orientation flags, or-combined when nets fuse.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct NetDir(pub u8);
impl NetDir {
    pub const UNDEFINED: NetDir = NetDir(0);
    pub const IN: NetDir = NetDir(0b0001);
    pub const OUT: NetDir = NetDir(0b0010);
    pub const INOUT: NetDir = NetDir(0b0011);
    pub const TRISTATE: NetDir = NetDir(0b0100);
    pub const WIRED_OR: NetDir = NetDir(0b1000);

    pub fn is_undefined(&self) -> bool {
        self.0 == 0
    }
}
impl std::ops::BitOr for NetDir {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for NetDir {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// # Net
///
/// A named equivalence class of components inside one cell. Stores the ids
/// of its components; each component stores its net id back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Net {
    /// Entity Identifier
    pub id: EntityId,
    /// Net Name, unique within the owning cell
    pub name: String,
    /// Net Type
    pub ntype: NetType,
    /// Direction flags
    pub direction: NetDir,
    /// Externally visible (an interface net of the cell)
    pub external: bool,
    /// Alternate names, never colliding with another net's primary name
    pub aliases: BTreeSet<String>,
    /// Component membership, by entity id
    pub components: BTreeSet<EntityId>,
    /// Property attachments
    pub props: Properties,
}
impl Net {
    /// Create a new [Net] named `name`
    pub fn new(name: impl Into<String>) -> DbResult<Self> {
        Ok(Self {
            id: EntityId::alloc()?,
            name: name.into(),
            ntype: NetType::default(),
            direction: NetDir::default(),
            external: false,
            aliases: BTreeSet::new(),
            components: BTreeSet::new(),
            props: Properties::new(),
        })
    }
    /// Absorb `other` into this net: or-merge directions, inherit
    /// external-ness, and keep `other`'s names as aliases.
    /// Component re-homing is the owning cell's business.
    pub fn absorb(&mut self, other: &Net) -> DbResult<()> {
        if other.id == self.id {
            return DbError::fail("Cannot merge a net with itself");
        }
        if other.external && !self.external {
            return DbError::fail(format!(
                "Cannot merge external net \"{}\" into internal \"{}\"",
                other.name, self.name
            ));
        }
        self.direction |= other.direction;
        self.aliases.insert(other.name.clone());
        self.aliases.extend(other.aliases.iter().cloned());
        for comp in &other.components {
            self.components.insert(*comp);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_absorb() -> DbResult<()> {
        let mut a = Net::new("a")?;
        a.external = true;
        a.direction = NetDir::IN;
        let mut b = Net::new("b")?;
        b.direction = NetDir::OUT;
        b.components.insert(EntityId(999));

        a.absorb(&b)?;
        assert_eq!(a.direction, NetDir::INOUT);
        assert!(a.aliases.contains("b"));
        assert!(a.components.contains(&EntityId(999)));

        // External may not fold into internal
        let mut c = Net::new("c")?;
        assert!(c.absorb(&a).is_err());
        Ok(())
    }
}
