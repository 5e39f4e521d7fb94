// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rewrite rules: pattern + replacement factory + target platform.
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, error, instrument, warn};

use crate::error::{ConfigurationError, MatchInvariantViolation};
use crate::factory::{MatchedSubplan, ReplacementSubplanFactory};
use crate::ident::{make_rule_id, Epoch, OperatorId, Platform, RuleId};
use crate::matcher::{Match, Matcher};
use crate::pattern::SubplanPattern;
use crate::plan::Plan;
use crate::receipt::{ApplyReceipt, ApplyReceiptEntry, Disposition, SkipReason};

/// A rewrite rule. Built once at registration and read-only afterwards.
#[derive(Debug, Clone)]
pub struct PlanTransformation {
    id: RuleId,
    name: &'static str,
    pattern: Arc<SubplanPattern>,
    factory: ReplacementSubplanFactory,
    platform: Platform,
}

impl PlanTransformation {
    /// Binds `pattern` and `factory` into a rule targeting `platform`.
    ///
    /// # Errors
    /// [`ConfigurationError::SingleOperatorFactoryOnSubplan`] when a
    /// single-operator factory is paired with a multi-node pattern.
    pub fn new(
        name: &'static str,
        pattern: SubplanPattern,
        factory: ReplacementSubplanFactory,
        platform: Platform,
    ) -> Result<Self, ConfigurationError> {
        if factory.is_single_operator() && !pattern.is_singleton() {
            return Err(ConfigurationError::SingleOperatorFactoryOnSubplan {
                rule: name.to_owned(),
                nodes: pattern.nodes().len(),
            });
        }
        Ok(Self {
            id: make_rule_id(name),
            name,
            pattern: Arc::new(pattern),
            factory,
            platform,
        })
    }

    /// Deterministic rule id derived from the name.
    #[must_use]
    pub fn id(&self) -> RuleId {
        self.id
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Matched pattern.
    #[must_use]
    pub fn pattern(&self) -> &SubplanPattern {
        &self.pattern
    }

    /// Replacement factory.
    #[must_use]
    pub fn factory(&self) -> &ReplacementSubplanFactory {
        &self.factory
    }

    /// Target platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Matches of this rule in `plan` when producing `epoch`.
    #[must_use]
    pub fn find_matches(&self, plan: &Plan, epoch: Epoch) -> Vec<Match> {
        self.pattern.find_matches(plan, epoch)
    }

    /// Rewrites every match in `plan`, stamping replacements with `epoch`.
    ///
    /// Matches are processed in matcher order on a staging copy. A match that
    /// shares an operator with an already-replaced one is skipped as stale;
    /// a factory refusal skips only that match. When nothing matches, `plan`
    /// is not touched.
    ///
    /// # Errors
    /// [`MatchInvariantViolation`] when a replacement disagrees with its
    /// match boundary. `plan` is then left exactly as it was passed in.
    #[instrument(level = "debug", skip_all, fields(rule = self.name, epoch = epoch.value()))]
    pub fn apply(
        &self,
        plan: &mut Plan,
        epoch: Epoch,
    ) -> Result<ApplyReceipt, MatchInvariantViolation> {
        let matches = self.find_matches(plan, epoch);
        if matches.is_empty() {
            debug!("no matches");
            return Ok(ApplyReceipt::new(self.id, epoch, Vec::new()));
        }
        let mut staging = plan.clone();
        let receipt = self.rewrite(&mut staging, &matches, epoch)?;
        if !receipt.is_noop() {
            *plan = staging;
        }
        Ok(receipt)
    }

    /// Like [`Self::apply`] but leaves `plan` alone and returns the rewritten
    /// copy, or `None` when no match was replaced.
    ///
    /// # Errors
    /// [`MatchInvariantViolation`], as for [`Self::apply`].
    pub fn apply_to_copy(
        &self,
        plan: &Plan,
        epoch: Epoch,
    ) -> Result<Option<(Plan, ApplyReceipt)>, MatchInvariantViolation> {
        let matches = self.find_matches(plan, epoch);
        if matches.is_empty() {
            return Ok(None);
        }
        let mut staging = plan.clone();
        let receipt = self.rewrite(&mut staging, &matches, epoch)?;
        Ok((!receipt.is_noop()).then_some((staging, receipt)))
    }

    fn rewrite(
        &self,
        staging: &mut Plan,
        matches: &[Match],
        epoch: Epoch,
    ) -> Result<ApplyReceipt, MatchInvariantViolation> {
        let matcher = Matcher::new(&self.pattern);
        let mut consumed: FxHashSet<OperatorId> = FxHashSet::default();
        let mut entries = Vec::with_capacity(matches.len());

        for m in matches {
            let matched: Vec<OperatorId> = m.operators().collect();
            let stale = ApplyReceiptEntry {
                matched: matched.clone(),
                disposition: Disposition::Skipped(SkipReason::Stale),
            };
            if matched.iter().any(|id| consumed.contains(id)) {
                debug!(?matched, "skipping stale match");
                entries.push(stale);
                continue;
            }
            let Some(boundary) = matcher.boundary(staging.view(), m) else {
                entries.push(stale);
                continue;
            };

            let outcome = {
                let Some(subplan) =
                    MatchedSubplan::resolve(staging.view(), &self.pattern, m, &boundary)
                else {
                    entries.push(stale);
                    continue;
                };
                self.factory
                    .create_replacement(&subplan, epoch)
                    .map(|replacement| (replacement, subplan.input_types(), subplan.output_types()))
            };

            match outcome {
                Err(unsupported) => {
                    warn!(?matched, %unsupported, "skipping unsupported variant");
                    entries.push(ApplyReceiptEntry {
                        matched,
                        disposition: Disposition::Skipped(SkipReason::Unsupported(unsupported)),
                    });
                }
                Ok((replacement, inputs, outputs)) => {
                    if let Err(mismatch) = replacement.check_boundary(&inputs, &outputs) {
                        error!(?matched, %mismatch, "replacement violates match boundary");
                        return Err(MatchInvariantViolation {
                            rule: self.name.to_owned(),
                            rule_id: self.id,
                            matched,
                            mismatch,
                        });
                    }
                    let inserted = staging.splice(
                        &matched,
                        &boundary.inputs,
                        &boundary.outputs,
                        replacement,
                        epoch,
                    );
                    debug!(?matched, ?inserted, "spliced replacement");
                    consumed.extend(matched.iter().copied());
                    entries.push(ApplyReceiptEntry {
                        matched,
                        disposition: Disposition::Applied { inserted },
                    });
                }
            }
        }
        Ok(ApplyReceipt::new(self.id, epoch, entries))
    }
}
