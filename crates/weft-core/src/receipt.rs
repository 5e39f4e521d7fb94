// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Apply receipts: which matches were rewritten and which were skipped.
//!
//! A receipt lists one entry per match in matcher order. Entries are the
//! audit trail for an application; [`ApplyReceipt::digest`] commits to the
//! rule, the matched operators, and each outcome so two runs can be compared
//! without diffing plans.
use blake3::Hasher;

use crate::error::UnsupportedVariantError;
use crate::ident::{Epoch, Hash, OperatorId, RuleId};

/// Per-match outcomes of one [`crate::PlanTransformation::apply`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReceipt {
    rule_id: RuleId,
    epoch: Epoch,
    entries: Vec<ApplyReceiptEntry>,
}

impl ApplyReceipt {
    pub(crate) fn new(rule_id: RuleId, epoch: Epoch, entries: Vec<ApplyReceiptEntry>) -> Self {
        Self {
            rule_id,
            epoch,
            entries,
        }
    }

    /// Rule that produced this receipt.
    #[must_use]
    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    /// Epoch stamped on inserted operators.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Entries in matcher order.
    #[must_use]
    pub fn entries(&self) -> &[ApplyReceiptEntry] {
        &self.entries
    }

    /// Number of matches that were rewritten.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.disposition, Disposition::Applied { .. }))
            .count()
    }

    /// Entries that were skipped.
    pub fn skipped(&self) -> impl Iterator<Item = &ApplyReceiptEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.disposition, Disposition::Skipped(_)))
    }

    /// Whether the plan was left unchanged.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied_count() == 0
    }

    /// Canonical digest of the receipt.
    ///
    /// Skip reasons are folded in by category only, so rewording an
    /// [`UnsupportedVariantError`] does not change the digest.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(b"apply-receipt:v1");
        hasher.update(self.rule_id.as_bytes());
        hasher.update(&self.epoch.value().to_le_bytes());
        hasher.update(&(self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            hasher.update(&(entry.matched.len() as u64).to_le_bytes());
            for id in &entry.matched {
                hasher.update(&(id.index() as u64).to_le_bytes());
            }
            match &entry.disposition {
                Disposition::Applied { inserted } => {
                    hasher.update(&[1]);
                    hasher.update(&(inserted.len() as u64).to_le_bytes());
                    for id in inserted {
                        hasher.update(&(id.index() as u64).to_le_bytes());
                    }
                }
                Disposition::Skipped(SkipReason::Unsupported(_)) => {
                    hasher.update(&[2]);
                }
                Disposition::Skipped(SkipReason::Stale) => {
                    hasher.update(&[3]);
                }
            }
        }
        hasher.finalize().into()
    }
}

/// One match and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReceiptEntry {
    /// Matched operators in pattern declaration order.
    pub matched: Vec<OperatorId>,
    /// Outcome.
    pub disposition: Disposition,
}

/// Outcome of a single match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The match was replaced.
    Applied {
        /// Ids of the replacement operators, in insertion order.
        inserted: Vec<OperatorId>,
    },
    /// The match was left in place.
    Skipped(SkipReason),
}

/// Why a match was left in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The factory has no implementation for this variant.
    Unsupported(UnsupportedVariantError),
    /// An earlier replacement in the same application consumed or rewired
    /// part of the match.
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::make_rule_id;

    fn entries() -> Vec<ApplyReceiptEntry> {
        vec![
            ApplyReceiptEntry {
                matched: vec![OperatorId(1)],
                disposition: Disposition::Applied {
                    inserted: vec![OperatorId(4)],
                },
            },
            ApplyReceiptEntry {
                matched: vec![OperatorId(2)],
                disposition: Disposition::Skipped(SkipReason::Unsupported(
                    UnsupportedVariantError::new("sample", "bernoulli", "local"),
                )),
            },
        ]
    }

    #[test]
    fn counts_and_digest_are_stable() {
        let rule = make_rule_id("receipt-test");
        let a = ApplyReceipt::new(rule, Epoch::new(1), entries());
        let b = ApplyReceipt::new(rule, Epoch::new(1), entries());
        assert_eq!(a.applied_count(), 1);
        assert_eq!(a.skipped().count(), 1);
        assert!(!a.is_noop());
        assert_eq!(a.digest(), b.digest());
        let other_epoch = ApplyReceipt::new(rule, Epoch::new(2), entries());
        assert_ne!(a.digest(), other_epoch.digest());
    }

    #[test]
    fn skip_reason_wording_does_not_change_digest() {
        let rule = make_rule_id("receipt-test");
        let mut reworded = entries();
        reworded[1].disposition = Disposition::Skipped(SkipReason::Unsupported(
            UnsupportedVariantError::new("sample", "BERNOULLI", "local"),
        ));
        assert_eq!(
            ApplyReceipt::new(rule, Epoch::new(1), entries()).digest(),
            ApplyReceipt::new(rule, Epoch::new(1), reworded).digest()
        );
    }
}
