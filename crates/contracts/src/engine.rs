//! Contract enforcement engine.
//!
//! Four side-effect-free checks answer whether an agent may store, abstract,
//! recall or export under a contract. A denial is an ordinary
//! [`EnforcementResult`] carrying a stable reason string, never an error.
//! The engine never writes to the audit log; callers record decisions with
//! [`EnforcementResult::audit_event`].

use covenant_core::{
    AbstractionLevel, BoundaryMode, ContractState, ContractType, LearningContract,
};
use covenant_security::{AuditEvent, AuditEventType, AuditOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stable denial reasons and warnings, suitable for audit and display.
pub mod reasons {
    use covenant_core::{AbstractionLevel, BoundaryMode, ContractState};

    pub const OBSERVATION_ONLY: &str = "observation-only contract: memory storage is not permitted";
    pub const PROHIBITED: &str = "prohibited contract: learning is forbidden in this scope";
    pub const STORAGE_NOT_PERMITTED: &str = "contract does not permit memory storage";
    pub const GENERALIZATION_NOT_ALLOWED: &str = "contract does not permit generalization beyond raw memories";
    pub const REVOKED: &str = "contract revoked: memories are inaccessible";
    pub const EXPIRED: &str = "contract expired: memories are frozen";
    pub const OWNER_NOT_PRESENT: &str = "recall requires verified owner presence";
    pub const NOT_TRANSFERABLE: &str = "contract scope is not transferable";
    pub const OWNER_APPROVAL_PENDING: &str = "owner approval is still pending";

    pub fn not_active(state: ContractState) -> String {
        format!("contract is {state}: memory creation requires ACTIVE")
    }

    pub fn classification_exceeds(classification: u8, cap: u8) -> String {
        format!("classification {classification} exceeds contract cap {cap}")
    }

    pub fn out_of_scope(kind: &str, value: &str) -> String {
        format!("{kind} '{value}' is outside contract scope")
    }

    pub fn abstraction_exceeds(target: AbstractionLevel, max: AbstractionLevel) -> String {
        format!("abstraction {target} exceeds contract maximum {max}")
    }

    pub fn recall_state(state: ContractState) -> String {
        format!("contract is {state}: recall requires ACTIVE or AMENDED")
    }

    pub fn export_state(state: ContractState) -> String {
        format!("contract is {state}: export requires ACTIVE or AMENDED")
    }

    pub fn boundary_too_low(current: BoundaryMode, min: BoundaryMode) -> String {
        format!("boundary mode {current} is below required {min}")
    }
}

/// Runtime context for a single enforcement decision.
#[derive(Debug, Clone, Copy)]
pub struct EnforcementContext<'a> {
    pub contract: &'a LearningContract,
    pub boundary_mode: BoundaryMode,
    pub domain: Option<&'a str>,
    pub context: Option<&'a str>,
    pub tool: Option<&'a str>,
    /// The caller verified the owner is present.
    pub owner_present: bool,
    /// The owner has been asked but has not yet answered.
    pub owner_approval_pending: bool,
}

impl<'a> EnforcementContext<'a> {
    pub fn new(contract: &'a LearningContract, boundary_mode: BoundaryMode) -> Self {
        Self {
            contract,
            boundary_mode,
            domain: None,
            context: None,
            tool: None,
            owner_present: false,
            owner_approval_pending: false,
        }
    }

    pub fn domain(mut self, domain: &'a str) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn context(mut self, context: &'a str) -> Self {
        self.context = Some(context);
        self
    }

    pub fn tool(mut self, tool: &'a str) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn owner_present(mut self, present: bool) -> Self {
        self.owner_present = present;
        self
    }

    pub fn owner_approval_pending(mut self, pending: bool) -> Self {
        self.owner_approval_pending = pending;
        self
    }
}

/// Which check produced a result, with its operation-specific parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum EnforcementCheck {
    MemoryCreation { classification: u8 },
    Abstraction { target: AbstractionLevel },
    Recall,
    Export,
}

impl EnforcementCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementCheck::MemoryCreation { .. } => "memory_creation",
            EnforcementCheck::Abstraction { .. } => "abstraction",
            EnforcementCheck::Recall => "recall",
            EnforcementCheck::Export => "export",
        }
    }
}

/// The outcome of one enforcement check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementResult {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnforcementResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            warnings: Vec::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// The audit event recording this decision. Denials carry
    /// [`AuditOutcome::Denied`] so they surface as violations.
    pub fn audit_event(
        &self,
        ctx: &EnforcementContext<'_>,
        check: EnforcementCheck,
        actor: &str,
    ) -> AuditEvent {
        let outcome = if self.allowed {
            AuditOutcome::Success
        } else {
            AuditOutcome::Denied
        };
        let mut event = AuditEvent::new(AuditEventType::EnforcementCheck, actor)
            .contract(ctx.contract.contract_id.clone())
            .outcome(outcome)
            .detail("check", check)
            .detail("allowed", self.allowed)
            .detail("contract_state", ctx.contract.state)
            .detail("boundary_mode", ctx.boundary_mode);

        if let Some(reason) = &self.reason {
            event = event.detail("reason", reason);
        }
        if !self.warnings.is_empty() {
            event = event.detail("warnings", &self.warnings);
        }
        for (key, value) in [
            ("domain", ctx.domain),
            ("context", ctx.context),
            ("tool", ctx.tool),
        ] {
            if let Some(value) = value {
                event = event.detail(key, value);
            }
        }
        event
    }
}

/// The stateless policy evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnforcementEngine;

impl EnforcementEngine {
    pub fn new() -> Self {
        Self
    }

    /// May a memory of `classification` be stored under this contract?
    pub fn check_memory_creation(
        &self,
        ctx: &EnforcementContext<'_>,
        classification: u8,
    ) -> EnforcementResult {
        let result = Self::memory_creation(ctx, classification);
        Self::trace(ctx, EnforcementCheck::MemoryCreation { classification }, &result);
        result
    }

    /// May learned material be generalized to `target`?
    pub fn check_abstraction(
        &self,
        ctx: &EnforcementContext<'_>,
        target: AbstractionLevel,
    ) -> EnforcementResult {
        let scope = &ctx.contract.scope;
        let result = if target > scope.max_abstraction {
            EnforcementResult::deny(reasons::abstraction_exceeds(target, scope.max_abstraction))
        } else if !ctx.contract.generalization_rules.allowed && target > AbstractionLevel::Raw {
            EnforcementResult::deny(reasons::GENERALIZATION_NOT_ALLOWED)
        } else {
            EnforcementResult::allow()
        };
        Self::trace(ctx, EnforcementCheck::Abstraction { target }, &result);
        result
    }

    /// May memories under this contract be recalled now?
    pub fn check_recall(&self, ctx: &EnforcementContext<'_>) -> EnforcementResult {
        let result = Self::recall(ctx);
        Self::trace(ctx, EnforcementCheck::Recall, &result);
        result
    }

    /// May memories under this contract leave the agent?
    pub fn check_export(&self, ctx: &EnforcementContext<'_>) -> EnforcementResult {
        let contract = ctx.contract;
        let result = if !contract.scope.transferable {
            EnforcementResult::deny(reasons::NOT_TRANSFERABLE)
        } else if !matches!(contract.state, ContractState::Active | ContractState::Amended) {
            EnforcementResult::deny(reasons::export_state(contract.state))
        } else {
            EnforcementResult::allow()
        };
        Self::trace(ctx, EnforcementCheck::Export, &result);
        result
    }

    fn memory_creation(ctx: &EnforcementContext<'_>, classification: u8) -> EnforcementResult {
        let contract = ctx.contract;
        let perms = &contract.memory_permissions;

        if contract.state != ContractState::Active {
            return EnforcementResult::deny(reasons::not_active(contract.state));
        }
        match contract.contract_type {
            ContractType::Observation => return EnforcementResult::deny(reasons::OBSERVATION_ONLY),
            ContractType::Prohibited => return EnforcementResult::deny(reasons::PROHIBITED),
            _ => {}
        }
        if !perms.may_store {
            return EnforcementResult::deny(reasons::STORAGE_NOT_PERMITTED);
        }
        if classification > perms.classification_cap {
            return EnforcementResult::deny(reasons::classification_exceeds(
                classification,
                perms.classification_cap,
            ));
        }
        if let Some(denied) = Self::scope_violation(ctx, true) {
            return denied;
        }

        let mut result = EnforcementResult::allow();
        let min = contract.recall_rules.boundary_mode_min;
        if ctx.boundary_mode < min {
            result = result.with_warning(reasons::boundary_too_low(ctx.boundary_mode, min));
        }
        result
    }

    fn recall(ctx: &EnforcementContext<'_>) -> EnforcementResult {
        let contract = ctx.contract;
        match contract.state {
            ContractState::Revoked => return EnforcementResult::deny(reasons::REVOKED),
            ContractState::Expired => return EnforcementResult::deny(reasons::EXPIRED),
            ContractState::Active | ContractState::Amended => {}
            other => return EnforcementResult::deny(reasons::recall_state(other)),
        }

        let min = contract.recall_rules.boundary_mode_min;
        if ctx.boundary_mode < min {
            return EnforcementResult::deny(reasons::boundary_too_low(ctx.boundary_mode, min));
        }
        if let Some(denied) = Self::scope_violation(ctx, false) {
            return denied;
        }
        if contract.recall_rules.requires_owner && !ctx.owner_present {
            return EnforcementResult::deny(reasons::OWNER_NOT_PRESENT);
        }

        let mut result = EnforcementResult::allow();
        if ctx.owner_approval_pending {
            result = result.with_warning(reasons::OWNER_APPROVAL_PENDING);
        }
        result
    }

    /// First supplied domain/context (and tool, when `include_tool`) that
    /// falls outside a non-empty scope set.
    fn scope_violation(ctx: &EnforcementContext<'_>, include_tool: bool) -> Option<EnforcementResult> {
        let scope = &ctx.contract.scope;
        if let Some(domain) = ctx.domain.filter(|d| !scope.covers_domain(d)) {
            return Some(EnforcementResult::deny(reasons::out_of_scope("domain", domain)));
        }
        if let Some(context) = ctx.context.filter(|c| !scope.covers_context(c)) {
            return Some(EnforcementResult::deny(reasons::out_of_scope("context", context)));
        }
        if include_tool {
            if let Some(tool) = ctx.tool.filter(|t| !scope.covers_tool(t)) {
                return Some(EnforcementResult::deny(reasons::out_of_scope("tool", tool)));
            }
        }
        None
    }

    fn trace(ctx: &EnforcementContext<'_>, check: EnforcementCheck, result: &EnforcementResult) {
        if result.allowed {
            debug!(
                contract = %ctx.contract.contract_id,
                check = check.as_str(),
                warnings = result.warnings.len(),
                "Enforcement check allowed"
            );
        } else {
            warn!(
                contract = %ctx.contract.contract_id,
                check = check.as_str(),
                reason = result.reason.as_deref().unwrap_or_default(),
                "Enforcement check denied"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{ContractFactory, ContractOptions, ScopeSpec};
    use covenant_security::AuditLogger;

    fn active(contract: LearningContract) -> LearningContract {
        contract.with_state(ContractState::Active)
    }

    fn episodic_coding() -> LearningContract {
        active(
            ContractFactory::default()
                .episodic("alice", ScopeSpec::new().domains(["coding"]))
                .unwrap(),
        )
    }

    #[test]
    fn episodic_classification_cap_scenario() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();
        let ctx = EnforcementContext::new(&c, BoundaryMode::Normal).domain("coding");

        assert!(engine.check_memory_creation(&ctx, 2).allowed);
        let denied = engine.check_memory_creation(&ctx, 4);
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("classification 4 exceeds contract cap 3"));
    }

    #[test]
    fn observation_contract_never_stores() {
        let engine = EnforcementEngine::new();
        let c = active(ContractFactory::default().observation("alice", ScopeSpec::new()).unwrap());
        let ctx = EnforcementContext::new(&c, BoundaryMode::Privileged);
        for classification in 0..=5 {
            let result = engine.check_memory_creation(&ctx, classification);
            assert!(!result.allowed);
            assert!(result.reason.unwrap().contains("observation-only"));
        }
    }

    #[test]
    fn prohibited_and_inactive_contracts_deny_creation() {
        let engine = EnforcementEngine::new();
        let p = active(ContractFactory::default().prohibited("alice", ScopeSpec::new()).unwrap());
        let r = engine.check_memory_creation(&EnforcementContext::new(&p, BoundaryMode::Normal), 0);
        assert_eq!(r.reason.as_deref(), Some(reasons::PROHIBITED));

        let draft = ContractFactory::default().episodic("alice", ScopeSpec::new()).unwrap();
        let r = engine.check_memory_creation(&EnforcementContext::new(&draft, BoundaryMode::Normal), 0);
        assert_eq!(r.reason, Some(reasons::not_active(ContractState::Draft)));
    }

    #[test]
    fn out_of_scope_domain_context_and_tool_are_denied() {
        let engine = EnforcementEngine::new();
        let c = active(
            ContractFactory::default()
                .episodic(
                    "alice",
                    ScopeSpec::new().domains(["coding"]).contexts(["work"]).tools(["editor"]),
                )
                .unwrap(),
        );
        let base = EnforcementContext::new(&c, BoundaryMode::Normal);

        let r = engine.check_memory_creation(&base.domain("finance"), 1);
        assert_eq!(r.reason, Some(reasons::out_of_scope("domain", "finance")));
        let r = engine.check_memory_creation(&base.context("home"), 1);
        assert_eq!(r.reason, Some(reasons::out_of_scope("context", "home")));
        let r = engine.check_memory_creation(&base.tool("shell"), 1);
        assert_eq!(r.reason, Some(reasons::out_of_scope("tool", "shell")));

        // Unsupplied fields are not checked
        assert!(engine.check_memory_creation(&base, 1).allowed);
    }

    #[test]
    fn low_boundary_warns_on_creation() {
        let engine = EnforcementEngine::new();
        let c = active(ContractFactory::default().strategic("alice", ScopeSpec::new()).unwrap());
        let r = engine.check_memory_creation(&EnforcementContext::new(&c, BoundaryMode::Normal), 1);
        assert!(r.allowed);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("below required TRUSTED"));
    }

    #[test]
    fn abstraction_respects_max_and_generalization() {
        let engine = EnforcementEngine::new();
        let procedural = active(ContractFactory::default().procedural("alice", ScopeSpec::new()).unwrap());
        let ctx = EnforcementContext::new(&procedural, BoundaryMode::Normal);
        assert!(engine.check_abstraction(&ctx, AbstractionLevel::Heuristic).allowed);
        let r = engine.check_abstraction(&ctx, AbstractionLevel::Strategy);
        assert!(r.reason.unwrap().contains("exceeds contract maximum"));

        // Generalization forbidden: only RAW passes
        let mut c = procedural.clone();
        c.generalization_rules.allowed = false;
        let ctx = EnforcementContext::new(&c, BoundaryMode::Normal);
        assert!(engine.check_abstraction(&ctx, AbstractionLevel::Raw).allowed);
        let r = engine.check_abstraction(&ctx, AbstractionLevel::Pattern);
        assert_eq!(r.reason.as_deref(), Some(reasons::GENERALIZATION_NOT_ALLOWED));
    }

    #[test]
    fn recall_reasons_distinguish_states() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();

        let revoked = c.with_state(ContractState::Revoked);
        let r = engine.check_recall(&EnforcementContext::new(&revoked, BoundaryMode::Privileged));
        assert!(r.reason.unwrap().contains("revoked"));

        let expired = c.with_state(ContractState::Expired);
        let r = engine.check_recall(&EnforcementContext::new(&expired, BoundaryMode::Privileged));
        assert!(r.reason.unwrap().contains("frozen"));

        let review = c.with_state(ContractState::Review);
        let r = engine.check_recall(&EnforcementContext::new(&review, BoundaryMode::Privileged));
        assert_eq!(r.reason, Some(reasons::recall_state(ContractState::Review)));
    }

    #[test]
    fn recall_gates_on_boundary_scope_and_owner() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();

        let r = engine.check_recall(&EnforcementContext::new(&c, BoundaryMode::Restricted).owner_present(true));
        assert!(r.reason.unwrap().contains("below required"));

        let r = engine.check_recall(
            &EnforcementContext::new(&c, BoundaryMode::Normal).domain("finance").owner_present(true),
        );
        assert!(r.reason.unwrap().contains("outside contract scope"));

        let r = engine.check_recall(&EnforcementContext::new(&c, BoundaryMode::Normal));
        assert_eq!(r.reason.as_deref(), Some(reasons::OWNER_NOT_PRESENT));

        let r = engine.check_recall(
            &EnforcementContext::new(&c, BoundaryMode::Normal)
                .owner_present(true)
                .owner_approval_pending(true),
        );
        assert!(r.allowed);
        assert_eq!(r.warnings, vec![reasons::OWNER_APPROVAL_PENDING.to_string()]);

        let amended = c.with_state(ContractState::Amended);
        assert!(engine
            .check_recall(&EnforcementContext::new(&amended, BoundaryMode::Normal).owner_present(true))
            .allowed);
    }

    #[test]
    fn export_requires_transferable_and_live_state() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();
        let r = engine.check_export(&EnforcementContext::new(&c, BoundaryMode::Normal));
        assert_eq!(r.reason.as_deref(), Some(reasons::NOT_TRANSFERABLE));

        let transferable = active(
            ContractFactory::default()
                .build(
                    ContractType::Procedural,
                    "alice",
                    ScopeSpec::new(),
                    ContractOptions {
                        transferable: Some(true),
                        ..ContractOptions::default()
                    },
                )
                .unwrap(),
        );
        assert!(engine.check_export(&EnforcementContext::new(&transferable, BoundaryMode::Normal)).allowed);

        let revoked = transferable.with_state(ContractState::Revoked);
        let r = engine.check_export(&EnforcementContext::new(&revoked, BoundaryMode::Normal));
        assert_eq!(r.reason, Some(reasons::export_state(ContractState::Revoked)));
    }

    #[test]
    fn checks_are_idempotent_and_do_not_mutate() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();
        let before = c.clone();
        let ctx = EnforcementContext::new(&c, BoundaryMode::Normal).domain("coding");

        for _ in 0..3 {
            assert_eq!(engine.check_memory_creation(&ctx, 4), engine.check_memory_creation(&ctx, 4));
            assert_eq!(engine.check_recall(&ctx), engine.check_recall(&ctx));
            assert_eq!(engine.check_export(&ctx), engine.check_export(&ctx));
            assert_eq!(
                engine.check_abstraction(&ctx, AbstractionLevel::Pattern),
                engine.check_abstraction(&ctx, AbstractionLevel::Pattern)
            );
        }
        assert_eq!(c, before);
    }

    #[test]
    fn denials_audit_as_violations() {
        let engine = EnforcementEngine::new();
        let c = episodic_coding();
        let ctx = EnforcementContext::new(&c, BoundaryMode::Normal).domain("coding");
        let audit = AuditLogger::new();

        let check = EnforcementCheck::MemoryCreation { classification: 4 };
        let denied = engine.check_memory_creation(&ctx, 4);
        let entry = audit.append(denied.audit_event(&ctx, check, "agent"));
        assert_eq!(entry.outcome, AuditOutcome::Denied);
        assert_eq!(entry.details["reason"], "classification 4 exceeds contract cap 3");
        assert_eq!(entry.details["domain"], "coding");

        let allowed = engine.check_memory_creation(&ctx, 1);
        audit.append(allowed.audit_event(&ctx, EnforcementCheck::MemoryCreation { classification: 1 }, "agent"));

        let violations = audit.get_violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entry_id, entry.entry_id);
    }
}
