//! The closed block model.
//!
//! Block identity is a small closed enumeration (per spec's data model
//! invariant); solidity is a derived predicate rather than stored data, so
//! there is no way for a block's solidity to drift out of sync with its kind.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Block {
    Air = 0,
    Dirt = 1,
    Grass = 2,
    Stone = 3,
    Water = 4,
    Sand = 5,
}

impl Block {
    pub const ALL: [Block; 6] = [Block::Air, Block::Dirt, Block::Grass, Block::Stone, Block::Water, Block::Sand];

    /// Air and water are non-solid; everything else is solid.
    #[must_use]
    pub const fn is_solid(self) -> bool {
        !matches!(self, Block::Air | Block::Water)
    }

    #[must_use]
    pub const fn is_air(self) -> bool {
        matches!(self, Block::Air)
    }

    #[must_use]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Block::Dirt,
            2 => Block::Grass,
            3 => Block::Stone,
            4 => Block::Water,
            5 => Block::Sand,
            _ => Block::Air,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Block::Air => "air",
            Block::Dirt => "dirt",
            Block::Grass => "grass",
            Block::Stone => "stone",
            Block::Water => "water",
            Block::Sand => "sand",
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::Air
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_and_water_are_non_solid() {
        assert!(!Block::Air.is_solid());
        assert!(!Block::Water.is_solid());
        assert!(Block::Stone.is_solid());
        assert!(Block::Dirt.is_solid());
        assert!(Block::Grass.is_solid());
        assert!(Block::Sand.is_solid());
    }

    #[test]
    fn u8_roundtrip_is_total() {
        for b in Block::ALL {
            assert_eq!(Block::from_u8(b.as_u8()), b);
        }
        // Any unmapped value is conservatively treated as air.
        assert_eq!(Block::from_u8(200), Block::Air);
    }
}
