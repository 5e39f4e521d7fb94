// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rule registry and the plan-wide rewrite entry points.
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::{load_engine_config, ConfigError, ConfigStore, EngineConfig};
use crate::enumerate::{self, Enumeration};
use crate::error::{ConfigurationError, MatchInvariantViolation};
use crate::ident::{Epoch, Platform, RuleId};
use crate::mapping::Mapping;
use crate::plan::Plan;
use crate::receipt::ApplyReceipt;
use crate::transformation::PlanTransformation;

/// Errors raised by [`RewriteEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// A mapping with this name is already registered.
    #[error("duplicate mapping: {0}")]
    DuplicateMapping(&'static str),
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of [`RewriteEngine::register_mapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRegistration {
    /// Mapping name.
    pub mapping: &'static str,
    /// Ids of the rules that were registered, in mapping order.
    pub registered: Vec<RuleId>,
    /// Rules that were rejected, in mapping order.
    pub rejected: Vec<ConfigurationError>,
}

impl MappingRegistration {
    /// Whether every rule of the mapping was registered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug)]
struct RegisteredMapping {
    name: &'static str,
    platform: Platform,
}

/// Holds the registered rules and runs them over plans.
#[derive(Debug)]
pub struct RewriteEngine {
    config: EngineConfig,
    mappings: Vec<RegisteredMapping>,
    rules: Vec<PlanTransformation>,
    rules_by_name: FxHashMap<&'static str, usize>,
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            mappings: Vec::new(),
            rules: Vec::new(),
            rules_by_name: FxHashMap::default(),
        }
    }
}

impl RewriteEngine {
    /// Creates an engine with `config`.
    ///
    /// # Errors
    /// [`EngineError::Config`] when `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Creates an engine with the configuration found in `store`.
    ///
    /// # Errors
    /// [`EngineError::Config`] when loading or validation fails.
    pub fn from_store<S>(store: &S) -> Result<Self, EngineError>
    where
        S: ConfigStore + ?Sized,
    {
        Self::new(load_engine_config(store)?)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers the rules of `mapping`.
    ///
    /// Rules that fail to build or reuse a registered rule name are rejected
    /// individually and reported in the returned [`MappingRegistration`].
    ///
    /// # Errors
    /// [`EngineError::DuplicateMapping`] when a mapping with the same name is
    /// already registered; nothing is registered in that case.
    #[instrument(skip_all, fields(mapping = mapping.name()))]
    pub fn register_mapping<M>(&mut self, mapping: &M) -> Result<MappingRegistration, EngineError>
    where
        M: Mapping + ?Sized,
    {
        let name = mapping.name();
        if self.mappings.iter().any(|m| m.name == name) {
            return Err(EngineError::DuplicateMapping(name));
        }
        let mut registration = MappingRegistration {
            mapping: name,
            registered: Vec::new(),
            rejected: Vec::new(),
        };
        for built in mapping.transformations() {
            let rule = match built {
                Ok(rule) if self.rules_by_name.contains_key(rule.name()) => {
                    Err(ConfigurationError::DuplicateRule {
                        rule: rule.name().to_owned(),
                    })
                }
                other => other,
            };
            match rule {
                Ok(rule) => {
                    registration.registered.push(rule.id());
                    self.rules_by_name.insert(rule.name(), self.rules.len());
                    self.rules.push(rule);
                }
                Err(err) => {
                    warn!(%err, "rejecting rule");
                    registration.rejected.push(err);
                }
            }
        }
        self.mappings.push(RegisteredMapping {
            name,
            platform: mapping.platform(),
        });
        info!(
            registered = registration.registered.len(),
            rejected = registration.rejected.len(),
            "mapping registered"
        );
        Ok(registration)
    }

    /// All registered rules, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[PlanTransformation] {
        &self.rules
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&PlanTransformation> {
        self.rules_by_name.get(name).map(|&idx| &self.rules[idx])
    }

    /// Platforms of the registered mappings, in registration order.
    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.mappings.iter().map(|m| m.platform)
    }

    /// Rules whose target platform is enabled, in registration order.
    #[must_use]
    pub fn enabled_transformations(&self) -> Vec<&PlanTransformation> {
        self.rules
            .iter()
            .filter(|rule| self.config.is_platform_enabled(rule.platform().name()))
            .collect()
    }

    /// Applies every enabled rule once, in registration order, to `plan`,
    /// each producing `epoch`.
    ///
    /// # Errors
    /// Stops at the first [`MatchInvariantViolation`]; rules applied before it
    /// keep their effect.
    pub fn apply_all(
        &self,
        plan: &mut Plan,
        epoch: Epoch,
    ) -> Result<Vec<ApplyReceipt>, MatchInvariantViolation> {
        self.enabled_transformations()
            .into_iter()
            .map(|rule| rule.apply(plan, epoch))
            .collect()
    }

    /// Enumerates the distinct variants of `plan` reachable with epochs
    /// `1..=max_epoch`. See [`Enumeration`].
    #[instrument(skip_all, fields(operators = plan.len()))]
    pub fn enumerate(&self, plan: &Plan) -> Enumeration {
        let rules = self.enabled_transformations();
        enumerate::enumerate(plan, &rules, &self.config)
    }
}
