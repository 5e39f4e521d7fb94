// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Breadth-first variant enumeration.
//!
//! Round `e` applies every enabled rule, each on its own copy, to every
//! variant first reached in round `e - 1`, stamping epoch `e`. New variants
//! are kept when their [`PlanDigest`] has not been seen before.
//!
//! With more than one worker, the variants of a round are claimed from an
//! atomic counter by scoped threads. Each worker owns the copies it rewrites
//! and only reads the shared frontier. Results are merged by frontier index,
//! so the outcome is identical to the serial run.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashSet;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::digest::PlanDigest;
use crate::error::MatchInvariantViolation;
use crate::ident::{Epoch, PlatformId, RuleId};
use crate::plan::Plan;
use crate::receipt::ApplyReceipt;
use crate::transformation::PlanTransformation;

/// One rule application on the path from the original plan to a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    /// Rule name.
    pub rule: &'static str,
    /// Rule id.
    pub rule_id: RuleId,
    /// Epoch stamped by the application.
    pub epoch: Epoch,
    /// Number of matches replaced.
    pub applied: usize,
}

/// A distinct plan reached during enumeration.
#[derive(Debug, Clone)]
pub struct PlanVariant {
    plan: Plan,
    digest: PlanDigest,
    platforms: BTreeSet<PlatformId>,
    parent: Option<usize>,
    lineage: Vec<RuleApplication>,
}

impl PlanVariant {
    fn new(
        plan: Plan,
        digest: PlanDigest,
        parent: Option<usize>,
        lineage: Vec<RuleApplication>,
    ) -> Self {
        Self {
            platforms: plan.platforms(),
            plan,
            digest,
            parent,
            lineage,
        }
    }

    /// The rewritten plan.
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Consumes the variant, returning its plan.
    #[must_use]
    pub fn into_plan(self) -> Plan {
        self.plan
    }

    /// Structural digest.
    #[must_use]
    pub fn digest(&self) -> PlanDigest {
        self.digest
    }

    /// Platforms targeted by the variant's execution operators.
    #[must_use]
    pub fn platforms(&self) -> &BTreeSet<PlatformId> {
        &self.platforms
    }

    /// Index of the variant this one was derived from; `None` for the original.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Rule applications leading here from the original, oldest first.
    #[must_use]
    pub fn lineage(&self) -> &[RuleApplication] {
        &self.lineage
    }

    /// Whether every operator is an execution operator.
    #[must_use]
    pub fn is_fully_specialized(&self) -> bool {
        self.plan.is_fully_specialized()
    }
}

/// Result of [`crate::RewriteEngine::enumerate`].
#[derive(Debug, Clone)]
pub struct Enumeration {
    variants: Vec<PlanVariant>,
    violations: Vec<MatchInvariantViolation>,
    truncated: bool,
}

impl Enumeration {
    /// Variants in discovery order; index 0 is the original plan.
    #[must_use]
    pub fn variants(&self) -> &[PlanVariant] {
        &self.variants
    }

    /// Consumes the enumeration, returning its variants.
    #[must_use]
    pub fn into_variants(self) -> Vec<PlanVariant> {
        self.variants
    }

    /// Variants without logical operators left.
    pub fn fully_specialized(&self) -> impl Iterator<Item = &PlanVariant> {
        self.variants.iter().filter(|v| v.is_fully_specialized())
    }

    /// Rule applications aborted by a boundary violation.
    #[must_use]
    pub fn violations(&self) -> &[MatchInvariantViolation] {
        &self.violations
    }

    /// Whether `max_variants` cut the search short.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of variants, the original included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Always `false`: the original plan is variant 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

struct Candidate {
    plan: Plan,
    digest: PlanDigest,
    application: RuleApplication,
}

type Expansion = Result<Option<Candidate>, MatchInvariantViolation>;

fn expand(plan: &Plan, rules: &[&PlanTransformation], epoch: Epoch) -> Vec<Expansion> {
    rules
        .iter()
        .map(|rule| {
            let rewritten = rule.apply_to_copy(plan, epoch)?;
            Ok(rewritten.map(|(plan, receipt): (Plan, ApplyReceipt)| Candidate {
                digest: PlanDigest::of(&plan),
                plan,
                application: RuleApplication {
                    rule: rule.name(),
                    rule_id: rule.id(),
                    epoch,
                    applied: receipt.applied_count(),
                },
            }))
        })
        .collect()
}

fn expand_round(
    variants: &[PlanVariant],
    frontier: &[usize],
    rules: &[&PlanTransformation],
    epoch: Epoch,
    workers: usize,
) -> Vec<Vec<Expansion>> {
    let workers = workers.clamp(1, frontier.len().max(1));
    if workers == 1 {
        return frontier
            .iter()
            .map(|&idx| expand(&variants[idx].plan, rules, epoch))
            .collect();
    }

    let next = AtomicUsize::new(0);
    let mut claimed: Vec<(usize, Vec<Expansion>)> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let next = &next;
                s.spawn(move || {
                    let mut out = Vec::new();
                    loop {
                        let slot = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&idx) = frontier.get(slot) else {
                            break;
                        };
                        out.push((slot, expand(&variants[idx].plan, rules, epoch)));
                    }
                    out
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(out) => out,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    });
    claimed.sort_unstable_by_key(|(slot, _)| *slot);
    claimed.into_iter().map(|(_, expansions)| expansions).collect()
}

pub(crate) fn enumerate(
    plan: &Plan,
    rules: &[&PlanTransformation],
    config: &EngineConfig,
) -> Enumeration {
    let root = PlanVariant::new(plan.clone(), PlanDigest::of(plan), None, Vec::new());
    let mut seen: FxHashSet<PlanDigest> = FxHashSet::default();
    seen.insert(root.digest);
    let mut variants = vec![root];
    let mut violations = Vec::new();
    let mut truncated = false;
    let mut frontier = vec![0usize];

    'rounds: for round in 1..=config.max_epoch {
        if frontier.is_empty() {
            break;
        }
        let epoch = Epoch::new(round);
        let expansions = expand_round(&variants, &frontier, rules, epoch, config.workers);
        let mut next_frontier = Vec::new();
        for (&parent, outcomes) in frontier.iter().zip(expansions) {
            for outcome in outcomes {
                let candidate = match outcome {
                    Ok(Some(candidate)) => candidate,
                    Ok(None) => continue,
                    Err(violation) => {
                        error!(%violation, "rule application aborted during enumeration");
                        violations.push(violation);
                        continue;
                    }
                };
                if !seen.insert(candidate.digest) {
                    continue;
                }
                if variants.len() >= config.max_variants {
                    truncated = true;
                    break 'rounds;
                }
                let mut lineage = variants[parent].lineage.clone();
                lineage.push(candidate.application);
                variants.push(PlanVariant::new(
                    candidate.plan,
                    candidate.digest,
                    Some(parent),
                    lineage,
                ));
                next_frontier.push(variants.len() - 1);
            }
        }
        debug!(round, discovered = next_frontier.len(), "enumeration round finished");
        frontier = next_frontier;
    }

    info!(
        variants = variants.len(),
        violations = violations.len(),
        truncated,
        "enumeration finished"
    );
    Enumeration {
        variants,
        violations,
        truncated,
    }
}
