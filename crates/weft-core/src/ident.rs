// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use std::fmt;

use blake3::Hasher;

/// Canonical 256-bit hash used for rule, platform, and plan identities.
pub type Hash = [u8; 32];

/// Stable arena index of an operator inside a [`crate::Plan`].
///
/// Ids are handed out in ascending order and never reused, so an id that was
/// removed by a splice stays dead for the lifetime of that plan (and of every
/// clone taken from it). A plan hands out at most [`OperatorId::LIMIT`] ids
/// over its lifetime; inserting past that panics instead of reusing an id.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OperatorId(pub(crate) u32);

impl OperatorId {
    /// Number of ids a single plan can hand out.
    pub const LIMIT: u32 = u32::MAX;

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Version tag marking which rewrite pass created an operator.
///
/// Operators of the original plan carry [`Epoch::ORIGIN`]. A rule producing
/// epoch `e` never matches an operator whose epoch is `>= e`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Epoch(u32);

impl Epoch {
    /// Epoch of every operator present in the unrewritten plan.
    pub const ORIGIN: Self = Self(0);

    /// Constructs an epoch from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the following epoch, saturating at `u32::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Whether an operator stamped with `self` may be matched by a rule that
    /// is producing `producing`.
    #[must_use]
    pub const fn is_matchable_by(self, producing: Self) -> bool {
        self.0 < producing.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// Deterministic identifier of a [`crate::PlanTransformation`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleId(pub Hash);

impl RuleId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Deterministic identifier of an execution platform.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PlatformId(pub Hash);

impl PlatformId {
    /// Returns the canonical byte representation of this id.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

/// Produces a stable, domain‑separated rule identifier (prefix `b"rule:"`) using BLAKE3.
pub fn make_rule_id(name: &str) -> RuleId {
    let mut hasher = Hasher::new();
    hasher.update(b"rule:");
    hasher.update(name.as_bytes());
    RuleId(hasher.finalize().into())
}

/// Produces a stable, domain‑separated platform identifier (prefix `b"platform:"`) using BLAKE3.
pub fn make_platform_id(name: &str) -> PlatformId {
    let mut hasher = Hasher::new();
    hasher.update(b"platform:");
    hasher.update(name.as_bytes());
    PlatformId(hasher.finalize().into())
}

/// Target execution platform: a human-readable name plus its derived id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Platform {
    id: PlatformId,
    name: &'static str,
}

impl Platform {
    /// Creates a platform token; the id is derived from `name`.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: make_platform_id(name),
            name,
        }
    }

    /// Returns the platform id.
    #[must_use]
    pub fn id(&self) -> PlatformId {
        self.id
    }

    /// Returns the platform name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_domain_separated() {
        assert_ne!(make_rule_id("local").0, make_platform_id("local").0);
        assert_eq!(make_rule_id("sample"), make_rule_id("sample"));
    }

    #[test]
    fn epoch_matchability_is_strict() {
        let one = Epoch::new(1);
        assert!(Epoch::ORIGIN.is_matchable_by(one));
        assert!(!one.is_matchable_by(one));
        assert!(!one.next().is_matchable_by(one));
        assert_eq!(Epoch::new(u32::MAX).next(), Epoch::new(u32::MAX));
    }
}
