//! Contract factory — builds validated DRAFT contracts with the default
//! permission bundle of each contract type.

use chrono::{DateTime, Duration, Utc};
use covenant_config::ContractDefaults;
use covenant_core::error::ValidationError;
use covenant_core::{
    AbstractionLevel, BoundaryMode, Clock, ContractScope, ContractState, ContractType,
    GeneralizationRules, LearningContract, MemoryPermissions, RecallRules, RetentionPolicy,
    SystemClock,
};
use std::sync::Arc;

use crate::validator::ContractValidator;

/// Where a contract applies. Empty lists are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSpec {
    pub domains: Vec<String>,
    pub contexts: Vec<String>,
    pub tools: Vec<String>,
}

impl ScopeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Overrides applied on top of a contract type's default bundle.
/// `None` keeps the default.
#[derive(Debug, Clone, Default)]
pub struct ContractOptions {
    pub classification_cap: Option<u8>,
    pub retention: Option<RetentionPolicy>,
    pub retention_until: Option<DateTime<Utc>>,
    pub max_abstraction: Option<AbstractionLevel>,
    pub transferable: Option<bool>,
    pub generalization_conditions: Option<Vec<String>>,
    pub requires_owner: Option<bool>,
    pub boundary_mode_min: Option<BoundaryMode>,
    pub revocable: Option<bool>,
}

/// Builds DRAFT contracts and runs them through the validator.
pub struct ContractFactory {
    defaults: ContractDefaults,
    clock: Arc<dyn Clock>,
}

impl ContractFactory {
    pub fn new(defaults: ContractDefaults) -> Self {
        Self {
            defaults,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build a validated DRAFT of `contract_type`.
    pub fn build(
        &self,
        contract_type: ContractType,
        created_by: &str,
        scope: ScopeSpec,
        options: ContractOptions,
    ) -> Result<LearningContract, ValidationError> {
        let now = self.clock.now();
        let mut contract = self.default_bundle(contract_type, created_by, now);

        contract.scope.domains.extend(scope.domains);
        contract.scope.contexts.extend(scope.contexts);
        contract.scope.tools.extend(scope.tools);

        let perms = &mut contract.memory_permissions;
        if let Some(cap) = options.classification_cap {
            perms.classification_cap = cap;
        }
        if let Some(retention) = options.retention {
            perms.retention = retention;
            if retention != RetentionPolicy::Timebound {
                perms.retention_until = None;
            }
        }
        if let Some(until) = options.retention_until {
            perms.retention_until = Some(until);
        }
        if let Some(level) = options.max_abstraction {
            contract.scope.max_abstraction = level;
        }
        if let Some(transferable) = options.transferable {
            contract.scope.transferable = transferable;
        }
        if let Some(conditions) = options.generalization_conditions {
            contract.generalization_rules.conditions = conditions;
        }
        if let Some(requires_owner) = options.requires_owner {
            contract.recall_rules.requires_owner = requires_owner;
        }
        if let Some(mode) = options.boundary_mode_min {
            contract.recall_rules.boundary_mode_min = mode;
        }
        if let Some(revocable) = options.revocable {
            contract.revocable = revocable;
        }

        ContractValidator::validate(&contract)?;
        tracing::debug!(
            contract = %contract.contract_id,
            contract_type = %contract_type,
            "Built draft contract"
        );
        Ok(contract)
    }

    pub fn observation(&self, created_by: &str, scope: ScopeSpec) -> Result<LearningContract, ValidationError> {
        self.build(ContractType::Observation, created_by, scope, ContractOptions::default())
    }

    pub fn episodic(&self, created_by: &str, scope: ScopeSpec) -> Result<LearningContract, ValidationError> {
        self.build(ContractType::Episodic, created_by, scope, ContractOptions::default())
    }

    pub fn procedural(&self, created_by: &str, scope: ScopeSpec) -> Result<LearningContract, ValidationError> {
        self.build(ContractType::Procedural, created_by, scope, ContractOptions::default())
    }

    pub fn strategic(&self, created_by: &str, scope: ScopeSpec) -> Result<LearningContract, ValidationError> {
        self.build(ContractType::Strategic, created_by, scope, ContractOptions::default())
    }

    pub fn prohibited(&self, created_by: &str, scope: ScopeSpec) -> Result<LearningContract, ValidationError> {
        self.build(ContractType::Prohibited, created_by, scope, ContractOptions::default())
    }

    /// The default permission bundle of each contract type.
    fn default_bundle(
        &self,
        contract_type: ContractType,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> LearningContract {
        let d = &self.defaults;
        let (may_store, cap, retention, generalize, max_abstraction, requires_owner, boundary) =
            match contract_type {
                ContractType::Observation => (
                    false,
                    0,
                    RetentionPolicy::Session,
                    false,
                    AbstractionLevel::Raw,
                    false,
                    BoundaryMode::Normal,
                ),
                ContractType::Episodic => (
                    true,
                    d.episodic_classification_cap,
                    RetentionPolicy::Timebound,
                    false,
                    AbstractionLevel::Raw,
                    true,
                    BoundaryMode::Normal,
                ),
                ContractType::Procedural => (
                    true,
                    d.procedural_classification_cap,
                    RetentionPolicy::Permanent,
                    true,
                    AbstractionLevel::Heuristic,
                    false,
                    BoundaryMode::Normal,
                ),
                ContractType::Strategic => (
                    true,
                    d.strategic_classification_cap,
                    RetentionPolicy::Permanent,
                    true,
                    AbstractionLevel::Strategy,
                    true,
                    BoundaryMode::Trusted,
                ),
                ContractType::Prohibited => (
                    false,
                    0,
                    RetentionPolicy::Session,
                    false,
                    AbstractionLevel::Raw,
                    true,
                    BoundaryMode::Restricted,
                ),
            };

        let retention_until = (retention == RetentionPolicy::Timebound)
            .then(|| now + Duration::days(i64::from(d.episodic_retention_days)));
        let conditions = match contract_type {
            ContractType::Procedural => vec!["derived patterns must cite source memories".into()],
            ContractType::Strategic => vec!["strategies must remain within contract domains".into()],
            _ => Vec::new(),
        };

        LearningContract {
            contract_id: new_contract_id(),
            contract_type,
            state: ContractState::Draft,
            scope: ContractScope {
                max_abstraction,
                ..ContractScope::unrestricted()
            },
            memory_permissions: MemoryPermissions {
                may_store,
                classification_cap: cap,
                retention,
                retention_until,
            },
            generalization_rules: GeneralizationRules {
                allowed: generalize,
                conditions,
            },
            recall_rules: RecallRules {
                requires_owner,
                boundary_mode_min: boundary,
            },
            revocable: true,
            created_by: created_by.to_string(),
            created_at: now,
            amended_from: None,
            amended_to: None,
        }
    }
}

impl Default for ContractFactory {
    fn default() -> Self {
        Self::new(ContractDefaults::default())
    }
}

/// Generate a fresh contract id.
pub(crate) fn new_contract_id() -> String {
    format!("lc_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::ManualClock;

    #[test]
    fn every_type_builds_a_valid_draft() {
        let factory = ContractFactory::default();
        for ty in ContractType::ALL {
            let c = factory
                .build(ty, "alice", ScopeSpec::new(), ContractOptions::default())
                .unwrap();
            assert_eq!(c.state, ContractState::Draft);
            assert_eq!(c.contract_type, ty);
            assert!(c.contract_id.starts_with("lc_"));
            assert!(c.revocable);
            assert!(!c.scope.transferable);
        }
    }

    #[test]
    fn non_learning_types_never_store() {
        let factory = ContractFactory::default();
        for c in [
            factory.observation("alice", ScopeSpec::new()).unwrap(),
            factory.prohibited("alice", ScopeSpec::new()).unwrap(),
        ] {
            assert!(!c.memory_permissions.may_store);
            assert!(!c.generalization_rules.allowed);
            assert_eq!(c.memory_permissions.retention_until, None);
        }
    }

    #[test]
    fn episodic_is_timebound_from_clock() {
        let start = Utc::now();
        let factory = ContractFactory::default().with_clock(Arc::new(ManualClock::new(start)));
        let c = factory
            .episodic("alice", ScopeSpec::new().domains(["coding"]))
            .unwrap();
        assert_eq!(c.memory_permissions.retention, RetentionPolicy::Timebound);
        assert_eq!(c.memory_permissions.retention_until, Some(start + Duration::days(30)));
        assert_eq!(c.memory_permissions.classification_cap, 3);
        assert!(c.scope.covers_domain("coding"));
        assert!(!c.scope.covers_domain("finance"));
    }

    #[test]
    fn config_defaults_drive_bundles() {
        let defaults = ContractDefaults {
            strategic_classification_cap: 5,
            episodic_retention_days: 1,
            ..ContractDefaults::default()
        };
        let factory = ContractFactory::new(defaults);
        let s = factory.strategic("alice", ScopeSpec::new()).unwrap();
        assert_eq!(s.memory_permissions.classification_cap, 5);
        assert_eq!(s.recall_rules.boundary_mode_min, BoundaryMode::Trusted);
        assert_eq!(s.scope.max_abstraction, AbstractionLevel::Strategy);
    }

    #[test]
    fn options_override_defaults() {
        let factory = ContractFactory::default();
        let c = factory
            .build(
                ContractType::Episodic,
                "alice",
                ScopeSpec::new().tools(["editor"]),
                ContractOptions {
                    classification_cap: Some(1),
                    retention: Some(RetentionPolicy::Permanent),
                    transferable: Some(true),
                    revocable: Some(false),
                    ..ContractOptions::default()
                },
            )
            .unwrap();
        assert_eq!(c.memory_permissions.classification_cap, 1);
        assert_eq!(c.memory_permissions.retention, RetentionPolicy::Permanent);
        assert_eq!(c.memory_permissions.retention_until, None);
        assert!(c.scope.transferable);
        assert!(!c.revocable);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let factory = ContractFactory::default();
        let err = factory
            .build(
                ContractType::Procedural,
                "alice",
                ScopeSpec::new(),
                ContractOptions {
                    classification_cap: Some(7),
                    ..ContractOptions::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.contract_type, ContractType::Procedural);

        assert!(factory.episodic("", ScopeSpec::new()).is_err());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_contract_id(), new_contract_id());
    }
}
