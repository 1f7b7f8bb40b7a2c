//! Shared identifier types

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of a supervised child.
///
/// Small and reusable: the hub hands out the lowest free slot, so an id is
/// only unique among children that are alive at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildId(pub u32);

impl FromStr for ChildId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

impl std::fmt::Display for ChildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
