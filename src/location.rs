//! Block store locations.
//!
//! A [`BlockStoreLocation`] serves two purposes:
//!
//! - As a **locator**, it records where a block physically lives. Locators
//!   are always [`BlockStoreLocation::Dir`].
//! - As a **scope**, it expresses where an allocation or eviction request
//!   may be satisfied: a specific directory, any directory of one tier, or
//!   any directory of any tier.
//!
//! ```text
//!   AnyTier
//!     +-- AnyDirInTier { alias: 1 }
//!     |     +-- Dir { alias: 1, level: 0, dir: 0 }
//!     +-- AnyDirInTier { alias: 3 }
//!           +-- Dir { alias: 3, level: 1, dir: 0 }
//!           +-- Dir { alias: 3, level: 1, dir: 1 }
//! ```

use std::fmt;

/// Stable, externally assigned identity of a tier.
pub type TierAlias = u32;

/// Globally unique block identifier.
pub type BlockId = u64;

/// Identifier of a client session owning temp blocks.
pub type SessionId = u64;

/// Physical locator or request scope within the tier hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStoreLocation {
    /// Any directory in any tier.
    AnyTier,

    /// Any directory within the tier with this alias.
    AnyDirInTier {
        /// Tier alias.
        alias: TierAlias,
    },

    /// One specific directory.
    Dir {
        /// Tier alias.
        alias: TierAlias,
        /// Level of the tier (0 is the fastest tier).
        level: u32,
        /// Index of the directory within its tier.
        dir: usize,
    },
}

impl BlockStoreLocation {
    /// Scope matching every directory.
    pub const fn any_tier() -> Self {
        Self::AnyTier
    }

    /// Scope matching every directory of one tier.
    pub const fn any_dir_in_tier(alias: TierAlias) -> Self {
        Self::AnyDirInTier { alias }
    }

    /// Locator for a single directory.
    pub const fn dir(alias: TierAlias, level: u32, dir: usize) -> Self {
        Self::Dir { alias, level, dir }
    }

    /// Tier alias this location is restricted to, if any.
    pub fn tier_alias(&self) -> Option<TierAlias> {
        match self {
            Self::AnyTier => None,
            Self::AnyDirInTier { alias } | Self::Dir { alias, .. } => Some(*alias),
        }
    }

    /// Directory index this location is restricted to, if any.
    pub fn dir_index(&self) -> Option<usize> {
        match self {
            Self::Dir { dir, .. } => Some(*dir),
            _ => None,
        }
    }

    /// True when this location names exactly one directory.
    pub fn is_specific(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }

    /// Whether this location lies within `scope`.
    ///
    /// A directory belongs to itself, to the any-dir scope of its tier and
    /// to the any-tier scope. Tier levels are not compared; a directory is
    /// identified by its alias and index.
    pub fn belongs_to(&self, scope: &BlockStoreLocation) -> bool {
        let tier_in_range = match scope.tier_alias() {
            None => true,
            Some(alias) => self.tier_alias() == Some(alias),
        };
        let dir_in_range = match scope.dir_index() {
            None => true,
            Some(dir) => self.dir_index() == Some(dir),
        };
        tier_in_range && dir_in_range
    }
}

impl fmt::Display for BlockStoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyTier => write!(f, "any tier"),
            Self::AnyDirInTier { alias } => write!(f, "any dir in tier {}", alias),
            Self::Dir { alias, level, dir } => {
                write!(f, "tier {} (level {}) dir {}", alias, level, dir)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let loc = BlockStoreLocation::dir(3, 1, 1);
        assert_eq!(loc.tier_alias(), Some(3));
        assert_eq!(loc.dir_index(), Some(1));
        assert!(loc.is_specific());

        let loc = BlockStoreLocation::any_dir_in_tier(3);
        assert_eq!(loc.tier_alias(), Some(3));
        assert_eq!(loc.dir_index(), None);
        assert!(!loc.is_specific());

        assert_eq!(BlockStoreLocation::any_tier().tier_alias(), None);
    }

    #[test]
    fn test_belongs_to() {
        let dir = BlockStoreLocation::dir(3, 1, 0);

        assert!(dir.belongs_to(&dir));
        assert!(dir.belongs_to(&BlockStoreLocation::any_dir_in_tier(3)));
        assert!(dir.belongs_to(&BlockStoreLocation::any_tier()));

        assert!(!dir.belongs_to(&BlockStoreLocation::dir(3, 1, 1)));
        assert!(!dir.belongs_to(&BlockStoreLocation::dir(1, 0, 0)));
        assert!(!dir.belongs_to(&BlockStoreLocation::any_dir_in_tier(1)));
    }

    #[test]
    fn test_scope_belongs_to() {
        let tier = BlockStoreLocation::any_dir_in_tier(1);
        assert!(tier.belongs_to(&tier));
        assert!(tier.belongs_to(&BlockStoreLocation::any_tier()));
        assert!(!tier.belongs_to(&BlockStoreLocation::dir(1, 0, 0)));

        let any = BlockStoreLocation::any_tier();
        assert!(any.belongs_to(&any));
        assert!(!any.belongs_to(&tier));
    }

    #[test]
    fn test_display() {
        assert_eq!(BlockStoreLocation::any_tier().to_string(), "any tier");
        assert_eq!(
            BlockStoreLocation::any_dir_in_tier(3).to_string(),
            "any dir in tier 3"
        );
        assert_eq!(
            BlockStoreLocation::dir(3, 1, 0).to_string(),
            "tier 3 (level 1) dir 0"
        );
    }
}
