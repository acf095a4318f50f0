//! Freeze, tombstone and deep purge.
//!
//! Every operation here is a pure computation over caller-supplied memory
//! references followed by one audit append. Nothing mutates the references;
//! the returned [`ForgettingResult`] tells the memory store what to apply.

use chrono::{DateTime, Utc};
use covenant_core::error::{ForgettingError, PurgeTokenError};
use covenant_core::{
    Clock, ContractEvent, ContractState, EventBus, HeuristicReference, LearningContract,
    MemoryReference, SystemClock,
};
use covenant_security::{AuditEvent, AuditEventType, AuditLogger, AuditOutcome, PurgeSigner};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::derivation::DerivationGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForgettingAction {
    Frozen,
    Tombstoned,
    Purged,
}

impl ForgettingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForgettingAction::Frozen => "frozen",
            ForgettingAction::Tombstoned => "tombstoned",
            ForgettingAction::Purged => "purged",
        }
    }
}

impl std::fmt::Display for ForgettingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the memory store must apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgettingResult {
    pub action: ForgettingAction,
    /// Memories stored directly under the contract.
    pub affected_memories: Vec<String>,
    /// Memories transitively derived from the direct set, under any contract.
    pub affected_derived: Vec<String>,
    /// The audit record of the operation survives it.
    pub audit_preserved: bool,
    pub timestamp: DateTime<Utc>,
}

/// The owner's signed consent to a deep purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConfirmation {
    pub owner: String,
    pub confirmation_token: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of [`MemoryForgetting::is_memory_accessible`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheck {
    pub accessible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The three-tier forgetting protocol.
pub struct MemoryForgetting {
    audit: Arc<AuditLogger>,
    signer: Arc<PurgeSigner>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for MemoryForgetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryForgetting")
            .field("signer", &self.signer)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl MemoryForgetting {
    pub fn new(audit: Arc<AuditLogger>, signer: Arc<PurgeSigner>) -> Self {
        Self {
            audit,
            signer,
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Freeze an EXPIRED contract's own memories. Derived memories are left
    /// alone.
    pub fn freeze_memories(
        &self,
        contract: &LearningContract,
        memories: &[MemoryReference],
        actor: &str,
    ) -> Result<ForgettingResult, ForgettingError> {
        require_state(contract, "freeze", &[ContractState::Expired])?;
        let direct = direct_ids(contract, memories);
        Ok(self.record(contract, ForgettingAction::Frozen, direct, Vec::new(), actor, |e| e))
    }

    /// Tombstone a REVOKED contract's memories and flag everything derived
    /// from them.
    pub fn tombstone_memories(
        &self,
        contract: &LearningContract,
        memories: &[MemoryReference],
        actor: &str,
    ) -> Result<ForgettingResult, ForgettingError> {
        require_state(contract, "tombstone", &[ContractState::Revoked])?;
        let (direct, derived) = cascade(contract, memories);
        Ok(self.record(contract, ForgettingAction::Tombstoned, direct, derived, actor, |e| e))
    }

    /// Irreversibly destroy a contract's memories and everything derived
    /// from them. Checks, failing fast in this order: contract state, owner,
    /// token format, token signature, confirmation freshness.
    pub fn deep_purge(
        &self,
        contract: &LearningContract,
        memories: &[MemoryReference],
        confirmation: &OwnerConfirmation,
    ) -> Result<ForgettingResult, ForgettingError> {
        require_state(
            contract,
            "purge",
            &[ContractState::Revoked, ContractState::Expired],
        )?;

        if let Err(e) = self.verify_confirmation(contract, confirmation) {
            warn!(
                contract = %contract.contract_id,
                owner = %confirmation.owner,
                error = %e,
                "Deep purge refused"
            );
            self.audit.append(
                AuditEvent::new(AuditEventType::ViolationDetected, &confirmation.owner)
                    .contract(contract.contract_id.clone())
                    .outcome(AuditOutcome::Denied)
                    .detail("operation", "deep_purge")
                    .detail("reason", e.to_string()),
            );
            return Err(e);
        }

        let (direct, derived) = cascade(contract, memories);
        Ok(self.record(
            contract,
            ForgettingAction::Purged,
            direct,
            derived,
            &confirmation.owner,
            |event| event.detail("owner_confirmation", confirmation),
        ))
    }

    /// Heuristics generalized from any of `memory_ids`. Logged only when
    /// something is invalidated.
    pub fn invalidate_heuristics(
        &self,
        memory_ids: &[String],
        heuristics: &[HeuristicReference],
        actor: &str,
    ) -> Vec<String> {
        let forgotten: HashSet<&str> = memory_ids.iter().map(String::as_str).collect();
        let invalidated: Vec<String> = heuristics
            .iter()
            .filter(|h| h.derived_from.iter().any(|m| forgotten.contains(m.as_str())))
            .map(|h| h.heuristic_id.clone())
            .collect();

        if !invalidated.is_empty() {
            self.audit.append(
                AuditEvent::new(AuditEventType::HeuristicsInvalidated, actor)
                    .detail("heuristics", &invalidated)
                    .detail("source_memories", memory_ids),
            );
            info!(count = invalidated.len(), "Heuristics invalidated");
        }
        invalidated
    }

    /// Whether `memory` may be read under `contract` right now.
    pub fn is_memory_accessible(&self, _memory: &MemoryReference, contract: &LearningContract) -> AccessCheck {
        let reason = match contract.state {
            ContractState::Active => {
                return AccessCheck {
                    accessible: true,
                    reason: None,
                }
            }
            ContractState::Expired => "contract expired: memory is frozen".to_string(),
            ContractState::Revoked => "contract revoked: memory is tombstoned".to_string(),
            other => format!("contract is {other}: memory is not accessible"),
        };
        AccessCheck {
            accessible: false,
            reason: Some(reason),
        }
    }

    /// Issue a purge token for the owner to sign off on.
    pub fn generate_purge_token(&self, contract_id: &str, owner: &str) -> String {
        self.signer.generate(contract_id, owner).to_string()
    }

    fn verify_confirmation(
        &self,
        contract: &LearningContract,
        confirmation: &OwnerConfirmation,
    ) -> Result<(), ForgettingError> {
        if confirmation.owner != contract.created_by {
            return Err(ForgettingError::OwnerMismatch {
                contract_id: contract.contract_id.clone(),
                expected: contract.created_by.clone(),
                provided: confirmation.owner.clone(),
            });
        }
        let token = self.signer.verify(
            &confirmation.confirmation_token,
            &contract.contract_id,
            &confirmation.owner,
        )?;
        if confirmation.timestamp < token.issued_at {
            return Err(PurgeTokenError::StaleConfirmation.into());
        }
        Ok(())
    }

    fn record(
        &self,
        contract: &LearningContract,
        action: ForgettingAction,
        affected_memories: Vec<String>,
        affected_derived: Vec<String>,
        actor: &str,
        extra: impl FnOnce(AuditEvent) -> AuditEvent,
    ) -> ForgettingResult {
        let event = AuditEvent::new(AuditEventType::MemoryForgotten, actor)
            .contract(contract.contract_id.clone())
            .detail("action", action)
            .detail("contract_state", contract.state)
            .detail("affected_memories", &affected_memories)
            .detail("affected_derived", &affected_derived);
        let entry = self.audit.append(extra(event));

        info!(
            contract = %contract.contract_id,
            action = %action,
            direct = affected_memories.len(),
            derived = affected_derived.len(),
            "Memories {}",
            action
        );
        if let Some(bus) = &self.events {
            bus.publish(ContractEvent::MemoriesForgotten {
                contract_id: contract.contract_id.clone(),
                action: action.as_str().to_string(),
                affected: affected_memories.len() + affected_derived.len(),
                timestamp: entry.timestamp,
            });
        }

        ForgettingResult {
            action,
            affected_memories,
            affected_derived,
            audit_preserved: true,
            timestamp: entry.timestamp,
        }
    }
}

fn require_state(
    contract: &LearningContract,
    operation: &str,
    allowed: &[ContractState],
) -> Result<(), ForgettingError> {
    if allowed.contains(&contract.state) {
        return Ok(());
    }
    let required = allowed
        .iter()
        .map(ContractState::as_str)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(ForgettingError::WrongState {
        operation: operation.to_string(),
        contract_id: contract.contract_id.clone(),
        actual: contract.state,
        required,
    })
}

fn direct_ids(contract: &LearningContract, memories: &[MemoryReference]) -> Vec<String> {
    memories
        .iter()
        .filter(|m| m.contract_id == contract.contract_id)
        .map(|m| m.memory_id.clone())
        .collect()
}

/// Direct memories of the contract, then everything derived from them.
fn cascade(contract: &LearningContract, memories: &[MemoryReference]) -> (Vec<String>, Vec<String>) {
    let direct = direct_ids(contract, memories);
    let derived =
        DerivationGraph::from_references(memories).descendants_of(direct.iter().map(String::as_str));
    (direct, derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use covenant_core::{
        ContractScope, ContractType, GeneralizationRules, ManualClock, MemoryPermissions,
        RecallRules, RetentionPolicy, BoundaryMode,
    };

    fn contract(state: ContractState) -> LearningContract {
        LearningContract {
            contract_id: "lc_1".into(),
            contract_type: ContractType::Episodic,
            state,
            scope: ContractScope::unrestricted(),
            memory_permissions: MemoryPermissions {
                may_store: true,
                classification_cap: 3,
                retention: RetentionPolicy::Permanent,
                retention_until: None,
            },
            generalization_rules: GeneralizationRules::default(),
            recall_rules: RecallRules {
                requires_owner: false,
                boundary_mode_min: BoundaryMode::Normal,
            },
            revocable: true,
            created_by: "alice".into(),
            created_at: Utc::now(),
            amended_from: None,
            amended_to: None,
        }
    }

    fn memories() -> Vec<MemoryReference> {
        vec![
            MemoryReference::direct("A", "lc_1", 1),
            MemoryReference::derived("B", "lc_2", 1, ["A"]),
            MemoryReference::derived("C", "lc_3", 2, ["B"]),
            MemoryReference::direct("X", "lc_9", 1),
        ]
    }

    fn forgetting() -> (MemoryForgetting, Arc<AuditLogger>) {
        let audit = Arc::new(AuditLogger::new());
        let signer = Arc::new(PurgeSigner::new(b"test-secret"));
        (MemoryForgetting::new(audit.clone(), signer), audit)
    }

    fn confirmation(f: &MemoryForgetting, owner: &str) -> OwnerConfirmation {
        OwnerConfirmation {
            owner: owner.into(),
            confirmation_token: f.generate_purge_token("lc_1", owner),
            timestamp: Utc::now() + Duration::seconds(1),
        }
    }

    #[test]
    fn tombstone_cascades_across_contracts() {
        let (f, audit) = forgetting();
        let result = f
            .tombstone_memories(&contract(ContractState::Revoked), &memories(), "alice")
            .unwrap();

        assert_eq!(result.action, ForgettingAction::Tombstoned);
        assert_eq!(result.affected_memories, vec!["A".to_string()]);
        assert!(result.affected_derived.contains(&"B".to_string()));
        assert!(result.affected_derived.contains(&"C".to_string()));
        assert!(!result.affected_derived.contains(&"X".to_string()));

        let entry = audit.export().pop().unwrap();
        assert_eq!(entry.event_type, AuditEventType::MemoryForgotten);
        assert_eq!(entry.details["action"], "tombstoned");
        assert_eq!(result.timestamp, entry.timestamp);
    }

    #[test]
    fn tombstone_survives_cyclic_references() {
        let (f, _) = forgetting();
        let memories = vec![
            MemoryReference::derived("A", "lc_1", 1, ["C"]),
            MemoryReference::derived("B", "lc_2", 1, ["A"]),
            MemoryReference::derived("C", "lc_2", 1, ["B"]),
        ];
        let result = f
            .tombstone_memories(&contract(ContractState::Revoked), &memories, "alice")
            .unwrap();
        assert_eq!(result.affected_memories, vec!["A".to_string()]);
        assert_eq!(result.affected_derived, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn freeze_does_not_cascade() {
        let (f, audit) = forgetting();
        let result = f
            .freeze_memories(&contract(ContractState::Expired), &memories(), "system")
            .unwrap();
        assert_eq!(result.action, ForgettingAction::Frozen);
        assert_eq!(result.affected_memories, vec!["A".to_string()]);
        assert!(result.affected_derived.is_empty());
        assert!(result.audit_preserved);
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn operations_require_their_state() {
        let (f, audit) = forgetting();
        let revoked = contract(ContractState::Revoked);
        let err = f.freeze_memories(&revoked, &memories(), "alice").unwrap_err();
        assert!(matches!(
            err,
            ForgettingError::WrongState { actual: ContractState::Revoked, .. }
        ));

        let expired = contract(ContractState::Expired);
        assert!(f.tombstone_memories(&expired, &memories(), "alice").is_err());

        let active = contract(ContractState::Active);
        let c = confirmation(&f, "alice");
        match f.deep_purge(&active, &memories(), &c) {
            Err(ForgettingError::WrongState { required, .. }) => {
                assert_eq!(required, "REVOKED or EXPIRED");
            }
            other => panic!("expected wrong state, got {other:?}"),
        }
        assert!(audit.is_empty());
    }

    #[test]
    fn deep_purge_embeds_confirmation() {
        let (f, audit) = forgetting();
        let c = confirmation(&f, "alice");
        let result = f
            .deep_purge(&contract(ContractState::Revoked), &memories(), &c)
            .unwrap();
        assert_eq!(result.action, ForgettingAction::Purged);
        assert!(result.audit_preserved);
        assert_eq!(result.affected_derived.len(), 2);

        let entry = audit.export().pop().unwrap();
        assert_eq!(entry.details["action"], "purged");
        assert_eq!(entry.details["owner_confirmation"]["owner"], "alice");
        assert_eq!(
            entry.details["owner_confirmation"]["confirmation_token"],
            c.confirmation_token.as_str()
        );

        // Also legal once expired
        assert!(f.deep_purge(&contract(ContractState::Expired), &memories(), &c).is_ok());
    }

    #[test]
    fn deep_purge_rejects_wrong_owner_first() {
        let (f, audit) = forgetting();
        let mut c = confirmation(&f, "mallory");
        c.confirmation_token = "garbage".into();
        let err = f
            .deep_purge(&contract(ContractState::Revoked), &memories(), &c)
            .unwrap_err();
        assert!(matches!(err, ForgettingError::OwnerMismatch { .. }));
        assert_eq!(audit.get_violations().len(), 1);
    }

    #[test]
    fn deep_purge_token_errors() {
        let (f, _) = forgetting();
        let revoked = contract(ContractState::Revoked);

        let mut c = confirmation(&f, "alice");
        c.confirmation_token = "only.two".into();
        assert!(matches!(
            f.deep_purge(&revoked, &memories(), &c),
            Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::BadFormat))
        ));

        let c = confirmation(&f, "alice");
        let sig_start = c.confirmation_token.rfind('.').unwrap() + 1;
        for i in sig_start..c.confirmation_token.len() {
            let mut bytes = c.confirmation_token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'a' { b'b' } else { b'a' };
            let altered = OwnerConfirmation {
                confirmation_token: String::from_utf8(bytes).unwrap(),
                ..c.clone()
            };
            assert!(matches!(
                f.deep_purge(&revoked, &memories(), &altered),
                Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::BadSignature))
            ));
        }

        // Same bytes, upper-case spelling
        let (head, signature) = c.confirmation_token.split_at(sig_start);
        let shouted = OwnerConfirmation {
            confirmation_token: format!("{head}{}", signature.to_ascii_uppercase()),
            ..c.clone()
        };
        if shouted.confirmation_token != c.confirmation_token {
            assert!(matches!(
                f.deep_purge(&revoked, &memories(), &shouted),
                Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::BadSignature))
            ));
        }

        // Leading zero on the timestamp
        let mut fields: Vec<&str> = c.confirmation_token.split('.').collect();
        let padded = format!("0{}", fields[1]);
        fields[1] = &padded;
        let reformatted = OwnerConfirmation {
            confirmation_token: fields.join("."),
            ..c.clone()
        };
        assert!(matches!(
            f.deep_purge(&revoked, &memories(), &reformatted),
            Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::BadFormat))
        ));

        // Token for a different contract
        let foreign = OwnerConfirmation {
            confirmation_token: f.generate_purge_token("lc_other", "alice"),
            ..c.clone()
        };
        assert!(matches!(
            f.deep_purge(&revoked, &memories(), &foreign),
            Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::BadSignature))
        ));
    }

    #[test]
    fn confirmation_before_token_is_stale() {
        let start = Utc::now();
        let audit = Arc::new(AuditLogger::new());
        let signer = PurgeSigner::new(b"test-secret").with_clock(Arc::new(ManualClock::new(start)));
        let f = MemoryForgetting::new(audit, Arc::new(signer));

        let stale = OwnerConfirmation {
            owner: "alice".into(),
            confirmation_token: f.generate_purge_token("lc_1", "alice"),
            timestamp: start - Duration::seconds(5),
        };
        assert!(matches!(
            f.deep_purge(&contract(ContractState::Revoked), &memories(), &stale),
            Err(ForgettingError::InvalidPurgeToken(PurgeTokenError::StaleConfirmation))
        ));
    }

    #[test]
    fn purge_tokens_are_fresh() {
        let (f, _) = forgetting();
        assert_ne!(
            f.generate_purge_token("lc_1", "alice"),
            f.generate_purge_token("lc_1", "alice")
        );
    }

    #[test]
    fn heuristics_invalidated_only_when_intersecting() {
        let (f, audit) = forgetting();
        let heuristics = vec![
            HeuristicReference {
                heuristic_id: "h1".into(),
                derived_from: vec!["A".into(), "Z".into()],
            },
            HeuristicReference {
                heuristic_id: "h2".into(),
                derived_from: vec!["Y".into()],
            },
        ];

        assert!(f.invalidate_heuristics(&["Q".into()], &heuristics, "system").is_empty());
        assert!(audit.is_empty());

        let hit = f.invalidate_heuristics(&["A".into(), "B".into()], &heuristics, "system");
        assert_eq!(hit, vec!["h1".to_string()]);
        assert_eq!(audit.len(), 1);
        assert_eq!(
            audit.export()[0].event_type,
            AuditEventType::HeuristicsInvalidated
        );
    }

    #[test]
    fn accessibility_by_state() {
        let (f, _) = forgetting();
        let memory = MemoryReference::direct("A", "lc_1", 1);

        assert!(f.is_memory_accessible(&memory, &contract(ContractState::Active)).accessible);

        let expired = f.is_memory_accessible(&memory, &contract(ContractState::Expired));
        assert!(!expired.accessible);
        assert!(expired.reason.unwrap().contains("frozen"));

        let revoked = f.is_memory_accessible(&memory, &contract(ContractState::Revoked));
        assert!(revoked.reason.unwrap().contains("tombstoned"));

        let draft = f.is_memory_accessible(&memory, &contract(ContractState::Draft));
        assert_eq!(draft.reason.as_deref(), Some("contract is DRAFT: memory is not accessible"));
    }

    #[tokio::test]
    async fn forgetting_publishes_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let (f, _) = forgetting();
        let f = f.with_events(bus);

        f.tombstone_memories(&contract(ContractState::Revoked), &memories(), "alice")
            .unwrap();
        match &*rx.recv().await.unwrap() {
            ContractEvent::MemoriesForgotten { action, affected, .. } => {
                assert_eq!(action, "tombstoned");
                assert_eq!(*affected, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
