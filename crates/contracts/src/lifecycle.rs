//! Lifecycle manager — the contract state machine.
//!
//! Every successful operation persists the new contract state, appends
//! exactly one audit entry and then publishes a [`ContractEvent`]. The three
//! steps run under a per-contract lock, so two transitions on the same
//! contract never interleave. Persistence happens first: a failed save
//! leaves neither a state change nor an audit record behind.

use covenant_core::error::LifecycleError;
use covenant_core::{
    Clock, ContractEvent, ContractFilter, ContractScope, ContractState, ContractStore, EventBus,
    GeneralizationRules, LearningContract, MemoryPermissions, RecallRules, RetentionPolicy,
    SystemClock,
};
use covenant_security::{AuditEvent, AuditEventType, AuditLogger};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::factory::new_contract_id;
use crate::transitions::{next_state, LifecycleEvent};
use crate::validator::ContractValidator;

/// Administrative path for revoking contracts marked non-revocable.
pub trait RevocationOverride: Send + Sync {
    /// Whether `actor` may revoke `contract` despite `revocable = false`.
    fn authorize(&self, contract: &LearningContract, actor: &str, justification: &str) -> bool;
}

/// Fields an amendment replaces. `None` carries the original value forward.
#[derive(Debug, Clone, Default)]
pub struct ContractChanges {
    pub scope: Option<ContractScope>,
    pub memory_permissions: Option<MemoryPermissions>,
    pub generalization_rules: Option<GeneralizationRules>,
    pub recall_rules: Option<RecallRules>,
    pub revocable: Option<bool>,
}

impl ContractChanges {
    /// Names of the fields this amendment replaces.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("scope", self.scope.is_some()),
            ("memory_permissions", self.memory_permissions.is_some()),
            ("generalization_rules", self.generalization_rules.is_some()),
            ("recall_rules", self.recall_rules.is_some()),
            ("revocable", self.revocable.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

/// Result of [`LifecycleManager::amend`].
#[derive(Debug, Clone, PartialEq)]
pub struct AmendmentOutcome {
    /// The original contract, now AMENDED.
    pub original: LearningContract,
    /// The successor DRAFT.
    pub draft: LearningContract,
}

/// Drives contracts through the lifecycle.
pub struct LifecycleManager {
    store: Arc<dyn ContractStore>,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
    override_hook: Option<Arc<dyn RevocationOverride>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("store", &self.store.name())
            .field("audit_entries", &self.audit.len())
            .field("events", &self.events.is_some())
            .field("override_hook", &self.override_hook.is_some())
            .finish()
    }
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn ContractStore>, audit: Arc<AuditLogger>) -> Self {
        Self {
            store,
            audit,
            clock: Arc::new(SystemClock),
            events: None,
            override_hook: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish a [`ContractEvent`] on `bus` after every successful operation.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Install the administrative revocation override.
    pub fn with_override(mut self, hook: Arc<dyn RevocationOverride>) -> Self {
        self.override_hook = Some(hook);
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn store(&self) -> &Arc<dyn ContractStore> {
        &self.store
    }

    /// Validate and persist a new DRAFT.
    pub fn create(
        &self,
        draft: LearningContract,
        actor: &str,
    ) -> Result<LearningContract, LifecycleError> {
        let held = self.lock_for(&draft.contract_id);
        let _guard = held.lock();

        if draft.state != ContractState::Draft {
            return Err(LifecycleError::InvalidStateTransition {
                contract_id: draft.contract_id.clone(),
                from: draft.state,
                event: "create".into(),
            });
        }
        ContractValidator::validate(&draft)?;
        if self.store.get(&draft.contract_id)?.is_some() {
            return Err(LifecycleError::DuplicateContract(draft.contract_id.clone()));
        }

        self.store.save(&draft)?;
        let mut event = AuditEvent::new(AuditEventType::ContractCreated, actor)
            .contract(draft.contract_id.clone())
            .detail("contract_type", draft.contract_type)
            .detail("created_by", &draft.created_by);
        event.new_state = Some(ContractState::Draft);
        self.audit.append(event);

        info!(
            contract = %draft.contract_id,
            contract_type = %draft.contract_type,
            actor,
            "Contract created"
        );
        self.publish(ContractEvent::Created {
            contract_id: draft.contract_id.clone(),
            contract_type: draft.contract_type,
            actor: actor.to_string(),
            timestamp: self.clock.now(),
        });
        Ok(draft)
    }

    /// DRAFT → REVIEW. Only the creator may submit.
    pub fn submit_for_review(
        &self,
        contract_id: &str,
        actor: &str,
    ) -> Result<LearningContract, LifecycleError> {
        self.with_contract(contract_id, |contract| {
            let to = Self::legal(contract, LifecycleEvent::SubmitForReview)?;
            if contract.created_by != actor {
                return Err(LifecycleError::NotCreator {
                    contract_id: contract_id.to_string(),
                    creator: contract.created_by.clone(),
                    actor: actor.to_string(),
                    action: LifecycleEvent::SubmitForReview.as_str().to_string(),
                });
            }
            self.commit(contract, to, LifecycleEvent::SubmitForReview, actor, |event| event)
        })
    }

    /// REVIEW → ACTIVE.
    pub fn activate(&self, contract_id: &str, actor: &str) -> Result<LearningContract, LifecycleError> {
        self.with_contract(contract_id, |contract| {
            let to = Self::legal(contract, LifecycleEvent::Activate)?;
            self.commit(contract, to, LifecycleEvent::Activate, actor, |event| event)
        })
    }

    /// Any non-terminal state → REVOKED. Blocked when `revocable = false`.
    pub fn revoke(&self, contract_id: &str, actor: &str) -> Result<LearningContract, LifecycleError> {
        self.with_contract(contract_id, |contract| {
            let to = Self::legal(contract, LifecycleEvent::Revoke)?;
            if !contract.revocable {
                warn!(contract = contract_id, actor, "Revocation refused: contract is not revocable");
                return Err(LifecycleError::ContractNotRevocable(contract_id.to_string()));
            }
            self.commit(contract, to, LifecycleEvent::Revoke, actor, |event| event)
        })
    }

    /// Revoke through the administrative override. A non-revocable contract
    /// is revoked only if the installed [`RevocationOverride`] authorizes it.
    pub fn admin_revoke(
        &self,
        contract_id: &str,
        actor: &str,
        justification: &str,
    ) -> Result<LearningContract, LifecycleError> {
        self.with_contract(contract_id, |contract| {
            let to = Self::legal(contract, LifecycleEvent::Revoke)?;
            let overridden = !contract.revocable;
            if overridden {
                let authorized = self
                    .override_hook
                    .as_ref()
                    .is_some_and(|hook| hook.authorize(contract, actor, justification));
                if !authorized {
                    warn!(contract = contract_id, actor, "Administrative revocation not authorized");
                    return Err(LifecycleError::ContractNotRevocable(contract_id.to_string()));
                }
                warn!(contract = contract_id, actor, justification, "Revocation override applied");
            }
            self.commit(contract, to, LifecycleEvent::Revoke, actor, |event| {
                event
                    .detail("override", overridden)
                    .detail("justification", justification)
            })
        })
    }

    /// ACTIVE → EXPIRED, only once a TIMEBOUND retention window has closed.
    /// An already-EXPIRED contract fails rather than re-emitting.
    pub fn expire(&self, contract_id: &str, actor: &str) -> Result<LearningContract, LifecycleError> {
        self.with_contract(contract_id, |contract| {
            let to = Self::legal(contract, LifecycleEvent::Expire)?;
            let perms = &contract.memory_permissions;
            if perms.retention != RetentionPolicy::Timebound {
                return Err(LifecycleError::NotExpirable {
                    contract_id: contract_id.to_string(),
                    reason: format!("retention is {}, not TIMEBOUND", perms.retention),
                });
            }
            let now = self.clock.now();
            if !contract.retention_elapsed(now) {
                let until = perms
                    .retention_until
                    .map(|u| u.to_rfc3339())
                    .unwrap_or_else(|| "unset".into());
                return Err(LifecycleError::NotExpirable {
                    contract_id: contract_id.to_string(),
                    reason: format!("retention runs until {until}"),
                });
            }
            self.commit(contract, to, LifecycleEvent::Expire, actor, |event| {
                event.detail("retention_until", perms.retention_until)
            })
        })
    }

    /// Expire every ACTIVE contract whose retention window has closed.
    /// Returns the ids expired, each with its own audit entry.
    pub fn expire_due(&self, actor: &str) -> Result<Vec<String>, LifecycleError> {
        let now = self.clock.now();
        let due: Vec<String> = self
            .store
            .query(&ContractFilter::new().with_state(ContractState::Active))?
            .into_iter()
            .filter(|c| c.retention_elapsed(now))
            .map(|c| c.contract_id)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for contract_id in due {
            match self.expire(&contract_id, actor) {
                Ok(_) => expired.push(contract_id),
                // Moved on concurrently (revoked, amended) since the query
                Err(
                    e @ (LifecycleError::InvalidStateTransition { .. }
                    | LifecycleError::NotExpirable { .. }),
                ) => {
                    debug!(contract = %contract_id, error = %e, "Skipping contract in expiry sweep");
                }
                Err(e) => return Err(e),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expiry sweep complete");
        }
        Ok(expired)
    }

    /// ACTIVE → AMENDED, spawning a linked DRAFT with `changes` merged over
    /// the original's fields.
    pub fn amend(
        &self,
        contract_id: &str,
        changes: ContractChanges,
        actor: &str,
    ) -> Result<AmendmentOutcome, LifecycleError> {
        let held = self.lock_for(contract_id);
        let _guard = held.lock();

        let original = self.load(contract_id)?;
        let to = Self::legal(&original, LifecycleEvent::Amend)?;
        let changed = changes.changed_fields();

        let draft = LearningContract {
            contract_id: new_contract_id(),
            state: ContractState::Draft,
            scope: changes.scope.unwrap_or_else(|| original.scope.clone()),
            memory_permissions: changes
                .memory_permissions
                .unwrap_or_else(|| original.memory_permissions.clone()),
            generalization_rules: changes
                .generalization_rules
                .unwrap_or_else(|| original.generalization_rules.clone()),
            recall_rules: changes.recall_rules.unwrap_or_else(|| original.recall_rules.clone()),
            revocable: changes.revocable.unwrap_or(original.revocable),
            created_at: self.clock.now(),
            amended_from: Some(original.contract_id.clone()),
            amended_to: None,
            ..original.clone()
        };
        ContractValidator::validate(&draft)?;

        let mut amended = original.with_state(to);
        amended.amended_to = Some(draft.contract_id.clone());

        // The original goes first: if the draft save then fails, restoring
        // the original leaves no trace, whereas a saved draft cannot be removed.
        self.store.save(&amended)?;
        if let Err(e) = self.store.save(&draft) {
            if let Err(restore) = self.store.save(&original) {
                error!(
                    contract = contract_id,
                    error = %restore,
                    "Failed to restore contract after aborted amendment"
                );
            }
            return Err(e.into());
        }
        self.audit.append(
            AuditEvent::new(LifecycleEvent::Amend.audit_event_type(), actor)
                .contract(contract_id)
                .transition(original.state, to)
                .detail("amended_to", &draft.contract_id)
                .detail("changed_fields", &changed),
        );

        info!(
            contract = contract_id,
            draft = %draft.contract_id,
            actor,
            "Contract amended"
        );
        self.publish(ContractEvent::Amended {
            original_id: contract_id.to_string(),
            draft_id: draft.contract_id.clone(),
            actor: actor.to_string(),
            timestamp: self.clock.now(),
        });

        Ok(AmendmentOutcome {
            original: amended,
            draft,
        })
    }

    /// Fetch a contract, failing if it does not exist.
    pub fn get(&self, contract_id: &str) -> Result<LearningContract, LifecycleError> {
        self.load(contract_id)
    }

    pub fn list(&self, filter: &ContractFilter) -> Result<Vec<LearningContract>, LifecycleError> {
        Ok(self.store.query(filter)?)
    }

    fn load(&self, contract_id: &str) -> Result<LearningContract, LifecycleError> {
        self.store
            .get(contract_id)?
            .ok_or_else(|| LifecycleError::ContractNotFound(contract_id.to_string()))
    }

    fn lock_for(&self, contract_id: &str) -> ContractLock<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(contract_id.to_string())
            .or_default()
            .clone();
        ContractLock {
            locks: &self.locks,
            contract_id: contract_id.to_string(),
            lock,
        }
    }

    /// Run `op` on the current stored contract under its lock.
    fn with_contract<T>(
        &self,
        contract_id: &str,
        op: impl FnOnce(&LearningContract) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let held = self.lock_for(contract_id);
        let _guard = held.lock();
        let contract = self.load(contract_id)?;
        op(&contract)
    }

    fn legal(contract: &LearningContract, event: LifecycleEvent) -> Result<ContractState, LifecycleError> {
        next_state(contract.state, event).ok_or_else(|| LifecycleError::InvalidStateTransition {
            contract_id: contract.contract_id.clone(),
            from: contract.state,
            event: event.as_str().to_string(),
        })
    }

    /// Persist `contract` in state `to`, append its audit entry, publish.
    fn commit(
        &self,
        contract: &LearningContract,
        to: ContractState,
        event: LifecycleEvent,
        actor: &str,
        details: impl FnOnce(AuditEvent) -> AuditEvent,
    ) -> Result<LearningContract, LifecycleError> {
        let updated = contract.with_state(to);
        self.store.save(&updated)?;

        let audit_event = AuditEvent::new(event.audit_event_type(), actor)
            .contract(contract.contract_id.clone())
            .transition(contract.state, to);
        self.audit.append(details(audit_event));

        info!(
            contract = %contract.contract_id,
            from = %contract.state,
            to = %to,
            actor,
            "Contract {}",
            event
        );
        self.publish(ContractEvent::Transitioned {
            contract_id: contract.contract_id.clone(),
            from: contract.state,
            to,
            actor: actor.to_string(),
            timestamp: self.clock.now(),
        });
        Ok(updated)
    }

    fn publish(&self, event: ContractEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// A claim on one contract's lock. Dropping the last claim removes the
/// entry from the lock table, so the table only holds contracts in use.
struct ContractLock<'a> {
    locks: &'a Mutex<HashMap<String, Arc<Mutex<()>>>>,
    contract_id: String,
    lock: Arc<Mutex<()>>,
}

impl ContractLock<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ContractLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here: nobody else holds or awaits it.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.contract_id);
        }
    }
}
