//! Audit logging — append-only, hash-chained contract event log.
//!
//! Every lifecycle transition, recorded enforcement decision and forgetting
//! action becomes exactly one [`AuditEntry`]. Each entry commits to its
//! predecessor: `hash = SHA-256(previous_hash ‖ canonical(payload))`, starting
//! from [`GENESIS_HASH`]. Recomputing the chain detects any edit, removal or
//! reordering of stored entries.

use chrono::{DateTime, Utc};
use covenant_core::error::AuditError;
use covenant_core::{Clock, ContractState, SystemClock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{error, warn};

use crate::sink::AuditSink;

/// Hash the first entry chains from.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Types of auditable contract events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ContractCreated,
    ContractSubmitted,
    ContractActivated,
    ContractRevoked,
    ContractExpired,
    ContractAmended,
    /// An enforcement decision recorded by the caller
    EnforcementCheck,
    /// Memories were frozen, tombstoned or purged
    MemoryForgotten,
    HeuristicsInvalidated,
    /// A policy violation detected outside the enforcement checks
    ViolationDetected,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::ContractCreated => "contract_created",
            AuditEventType::ContractSubmitted => "contract_submitted",
            AuditEventType::ContractActivated => "contract_activated",
            AuditEventType::ContractRevoked => "contract_revoked",
            AuditEventType::ContractExpired => "contract_expired",
            AuditEventType::ContractAmended => "contract_amended",
            AuditEventType::EnforcementCheck => "enforcement_check",
            AuditEventType::MemoryForgotten => "memory_forgotten",
            AuditEventType::HeuristicsInvalidated => "heuristics_invalidated",
            AuditEventType::ViolationDetected => "violation_detected",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// An event waiting to be appended. The logger assigns id, chain pointer,
/// timestamp and hash.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub actor: String,
    pub contract_id: Option<String>,
    pub outcome: AuditOutcome,
    pub old_state: Option<ContractState>,
    pub new_state: Option<ContractState>,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, actor: impl Into<String>) -> Self {
        Self {
            event_type,
            actor: actor.into(),
            contract_id: None,
            outcome: AuditOutcome::Success,
            old_state: None,
            new_state: None,
            details: BTreeMap::new(),
        }
    }

    pub fn contract(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }

    pub fn transition(mut self, from: ContractState, to: ContractState) -> Self {
        self.old_state = Some(from);
        self.new_state = Some(to);
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Attach a detail value. Values that fail to serialize are skipped.
    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }
}

/// A single, immutable, chained audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub entry_id: String,
    /// `None` only for the first entry.
    pub previous_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    pub actor: String,
    pub event_type: AuditEventType,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<ContractState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<ContractState>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

impl AuditEntry {
    pub fn is_violation(&self) -> bool {
        self.outcome == AuditOutcome::Denied || self.event_type == AuditEventType::ViolationDetected
    }
}

/// The hashed part of an entry: every field except `hash`, in a fixed order.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    sequence: u64,
    entry_id: &'a str,
    previous_entry_id: Option<&'a str>,
    contract_id: Option<&'a str>,
    actor: &'a str,
    event_type: AuditEventType,
    outcome: AuditOutcome,
    old_state: Option<ContractState>,
    new_state: Option<ContractState>,
    details: &'a BTreeMap<String, serde_json::Value>,
    timestamp: String,
}

fn compute_hash(previous_hash: &str, entry: &AuditEntry) -> String {
    let payload = CanonicalPayload {
        sequence: entry.sequence,
        entry_id: &entry.entry_id,
        previous_entry_id: entry.previous_entry_id.as_deref(),
        contract_id: entry.contract_id.as_deref(),
        actor: &entry.actor,
        event_type: entry.event_type,
        outcome: entry.outcome,
        old_state: entry.old_state,
        new_state: entry.new_state,
        details: &entry.details,
        timestamp: entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
    };
    // Serializing a struct of strings, enums and a JSON map cannot fail.
    let canonical = serde_json::to_vec(&payload).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

/// Walk `entries` from genesis, recomputing every hash and chain pointer.
///
/// Returns the number of verified entries, or the id of the first entry
/// that does not reproduce.
pub fn verify_entries(entries: &[AuditEntry]) -> Result<usize, AuditError> {
    let mut previous_hash = GENESIS_HASH.to_string();
    let mut previous_id: Option<&str> = None;

    for (index, entry) in entries.iter().enumerate() {
        if entry.sequence != index as u64 {
            return Err(AuditError::ChainIntegrityViolation {
                entry_id: entry.entry_id.clone(),
                reason: format!("sequence {} found at position {index}", entry.sequence),
            });
        }
        if entry.previous_entry_id.as_deref() != previous_id {
            return Err(AuditError::ChainIntegrityViolation {
                entry_id: entry.entry_id.clone(),
                reason: format!(
                    "broken chain link (expected previous {:?}, found {:?})",
                    previous_id, entry.previous_entry_id
                ),
            });
        }
        let expected = compute_hash(&previous_hash, entry);
        if expected != entry.hash {
            return Err(AuditError::ChainIntegrityViolation {
                entry_id: entry.entry_id.clone(),
                reason: "stored hash does not match recomputed hash".into(),
            });
        }
        previous_hash = expected;
        previous_id = Some(&entry.entry_id);
    }

    Ok(entries.len())
}

/// Hash-chained audit logger.
///
/// Appends are serialized through a single write lock, so the chain has one
/// total order and no two entries share a predecessor. Reads take the read
/// lock and see a consistent prefix of the chain.
pub struct AuditLogger {
    chain: RwLock<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
    /// Per-sink backlog, indexed like `sinks`. A sink with a backlog gets
    /// new entries queued behind it so it always receives chain order.
    undelivered: Mutex<Vec<VecDeque<AuditEntry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.len())
            .field("sink_count", &self.sinks.len())
            .field("undelivered", &self.undelivered_count())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        let backlogs = sinks.iter().map(|_| VecDeque::new()).collect();
        Self {
            chain: RwLock::new(Vec::new()),
            sinks,
            undelivered: Mutex::new(backlogs),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for entry timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Rebuild a logger from a persisted chain. Refuses a chain that does
    /// not verify. Restored entries are not re-sent to sinks.
    pub fn restore(
        entries: Vec<AuditEntry>,
        sinks: Vec<Box<dyn AuditSink>>,
    ) -> Result<Self, AuditError> {
        if let Err(e) = verify_entries(&entries) {
            error!(error = %e, "Refusing to restore a tampered audit chain");
            return Err(e);
        }
        let logger = Self::with_sinks(sinks);
        *logger.chain.write().unwrap_or_else(PoisonError::into_inner) = entries;
        Ok(logger)
    }

    /// Append an event, returning the stored entry.
    ///
    /// Never fails: a sink that rejects the entry does not block the append.
    /// The entry is buffered for [`retry_undelivered`](Self::retry_undelivered)
    /// and the failure is logged.
    pub fn append(&self, event: AuditEvent) -> AuditEntry {
        let mut chain = self.chain.write().unwrap_or_else(PoisonError::into_inner);

        let (previous_hash, previous_entry_id) = match chain.last() {
            Some(last) => (last.hash.clone(), Some(last.entry_id.clone())),
            None => (GENESIS_HASH.to_string(), None),
        };

        let mut entry = AuditEntry {
            sequence: chain.len() as u64,
            entry_id: uuid::Uuid::new_v4().to_string(),
            previous_entry_id,
            contract_id: event.contract_id,
            actor: event.actor,
            event_type: event.event_type,
            outcome: event.outcome,
            old_state: event.old_state,
            new_state: event.new_state,
            details: event.details,
            timestamp: self.clock.now(),
            hash: String::new(),
        };
        entry.hash = compute_hash(&previous_hash, &entry);
        chain.push(entry.clone());

        // Still under the write lock so sinks observe chain order.
        let mut backlogs = self.undelivered.lock().unwrap_or_else(PoisonError::into_inner);
        for (sink, backlog) in self.sinks.iter().zip(backlogs.iter_mut()) {
            if !backlog.is_empty() {
                backlog.push_back(entry.clone());
                continue;
            }
            if let Err(e) = sink.record(&entry) {
                warn!(
                    sink = sink.name(),
                    entry_id = %entry.entry_id,
                    error = %e,
                    "Audit sink rejected entry; buffered for retry"
                );
                backlog.push_back(entry.clone());
            }
        }

        entry
    }

    /// Re-send buffered entries, oldest first, to the sinks that rejected
    /// them. A sink stops at its first failure. Returns how many remain
    /// undelivered.
    pub fn retry_undelivered(&self) -> usize {
        let mut backlogs = self.undelivered.lock().unwrap_or_else(PoisonError::into_inner);
        for (sink, backlog) in self.sinks.iter().zip(backlogs.iter_mut()) {
            while let Some(entry) = backlog.front() {
                if let Err(e) = sink.record(entry) {
                    warn!(sink = sink.name(), error = %e, "Audit sink still rejecting entries");
                    break;
                }
                backlog.pop_front();
            }
        }
        let remaining: usize = backlogs.iter().map(VecDeque::len).sum();
        if remaining > 0 {
            warn!(remaining, "Audit entries still undelivered after retry");
        }
        remaining
    }

    /// Number of entries waiting for redelivery.
    pub fn undelivered_count(&self) -> usize {
        self.undelivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(VecDeque::len)
            .sum()
    }

    /// Recompute the whole chain from genesis.
    ///
    /// A failure is a security event: it is logged at error level and
    /// returned with the id of the first entry that does not reproduce.
    pub fn verify(&self) -> Result<usize, AuditError> {
        let chain = self.chain.read().unwrap_or_else(PoisonError::into_inner);
        verify_entries(&chain).inspect_err(|e| {
            error!(error = %e, "AUDIT CHAIN INTEGRITY VIOLATION");
        })
    }

    /// An ordered snapshot of the whole log.
    pub fn export(&self) -> Vec<AuditEntry> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All entries concerning one contract, in chain order.
    pub fn get_contract_history(&self, contract_id: &str) -> Vec<AuditEntry> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.contract_id.as_deref() == Some(contract_id))
            .cloned()
            .collect()
    }

    /// Denied decisions and detected violations, in chain order.
    pub fn get_violations(&self) -> Vec<AuditEntry> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_violation())
            .cloned()
            .collect()
    }

    /// Hash of the newest entry, or the genesis hash when empty.
    pub fn head_hash(&self) -> String {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Count of stored entries.
    pub fn len(&self) -> usize {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::ManualClock;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn transition(contract_id: &str, from: ContractState, to: ContractState) -> AuditEvent {
        AuditEvent::new(AuditEventType::ContractActivated, "alice")
            .contract(contract_id)
            .transition(from, to)
    }

    fn logger_with(n: usize) -> AuditLogger {
        let logger = AuditLogger::new();
        for i in 0..n {
            logger.append(
                AuditEvent::new(AuditEventType::ContractCreated, "alice")
                    .contract(format!("lc_{i}"))
                    .detail("index", i),
            );
        }
        logger
    }

    #[test]
    fn first_entry_chains_from_genesis() {
        let logger = AuditLogger::new();
        let entry = logger.append(transition("lc_1", ContractState::Review, ContractState::Active));
        assert_eq!(entry.sequence, 0);
        assert!(entry.previous_entry_id.is_none());
        assert_eq!(entry.hash.len(), 64);
        assert_ne!(entry.hash, GENESIS_HASH);
        assert_eq!(logger.head_hash(), entry.hash);
    }

    #[test]
    fn entries_link_to_predecessor() {
        let logger = logger_with(3);
        let entries = logger.export();
        assert_eq!(entries[1].previous_entry_id.as_deref(), Some(entries[0].entry_id.as_str()));
        assert_eq!(entries[2].previous_entry_id.as_deref(), Some(entries[1].entry_id.as_str()));
        assert_eq!(entries[2].sequence, 2);
    }

    #[test]
    fn verify_succeeds_after_appends() {
        let logger = logger_with(25);
        assert_eq!(logger.verify().unwrap(), 25);
        assert_eq!(AuditLogger::new().verify().unwrap(), 0);
    }

    #[test]
    fn tampered_payload_fails_at_that_entry() {
        let logger = logger_with(5);
        let target = logger.export()[2].entry_id.clone();

        logger.chain.write().unwrap()[2].actor = "mallory".into();

        match logger.verify() {
            Err(AuditError::ChainIntegrityViolation { entry_id, .. }) => {
                assert_eq!(entry_id, target)
            }
            other => panic!("expected integrity violation, got {other:?}"),
        }
    }

    #[test]
    fn tampered_details_in_export_detected() {
        let logger = logger_with(4);
        let mut snapshot = logger.export();
        snapshot[3]
            .details
            .insert("index".into(), serde_json::json!(99));

        let err = verify_entries(&snapshot).unwrap_err();
        assert!(matches!(
            err,
            AuditError::ChainIntegrityViolation { ref entry_id, .. } if *entry_id == snapshot[3].entry_id
        ));
        // The live log is unaffected by edits to a snapshot.
        assert!(logger.verify().is_ok());
    }

    #[test]
    fn removed_entry_detected() {
        let logger = logger_with(4);
        let mut snapshot = logger.export();
        let removed_successor = snapshot[2].entry_id.clone();
        snapshot.remove(1);

        match verify_entries(&snapshot) {
            Err(AuditError::ChainIntegrityViolation { entry_id, .. }) => {
                assert_eq!(entry_id, removed_successor)
            }
            other => panic!("expected integrity violation, got {other:?}"),
        }
    }

    #[test]
    fn contract_history_filters_by_contract() {
        let logger = AuditLogger::new();
        logger.append(transition("lc_a", ContractState::Draft, ContractState::Review));
        logger.append(transition("lc_b", ContractState::Draft, ContractState::Review));
        logger.append(transition("lc_a", ContractState::Review, ContractState::Active));

        let history = logger.get_contract_history("lc_a");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].new_state, Some(ContractState::Active));
        assert!(logger.get_contract_history("lc_missing").is_empty());
    }

    #[test]
    fn violations_include_denials_and_detected_violations() {
        let logger = AuditLogger::new();
        logger.append(AuditEvent::new(AuditEventType::EnforcementCheck, "agent").contract("lc_1"));
        logger.append(
            AuditEvent::new(AuditEventType::EnforcementCheck, "agent")
                .contract("lc_1")
                .outcome(AuditOutcome::Denied)
                .detail("reason", "classification 4 exceeds contract cap 3"),
        );
        logger.append(AuditEvent::new(AuditEventType::ViolationDetected, "agent"));

        let violations = logger.get_violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].outcome, AuditOutcome::Denied);
        assert_eq!(violations[1].event_type, AuditEventType::ViolationDetected);
    }

    #[test]
    fn timestamps_come_from_injected_clock() {
        let start = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let logger = AuditLogger::new().with_clock(clock.clone());
        let entry = logger.append(AuditEvent::new(AuditEventType::ContractCreated, "alice"));
        assert_eq!(entry.timestamp, start);
    }

    #[test]
    fn restore_accepts_valid_and_rejects_tampered_chain() {
        let original = logger_with(3);
        let entries = original.export();

        let restored = AuditLogger::restore(entries.clone(), Vec::new()).unwrap();
        assert_eq!(restored.len(), 3);
        let next = restored.append(AuditEvent::new(AuditEventType::ContractCreated, "bob"));
        assert_eq!(next.previous_entry_id.as_deref(), Some(entries[2].entry_id.as_str()));
        assert!(restored.verify().is_ok());

        let mut tampered = entries;
        tampered[0].actor = "mallory".into();
        assert!(AuditLogger::restore(tampered, Vec::new()).is_err());
    }

    #[test]
    fn concurrent_appends_form_one_chain() {
        let logger = Arc::new(AuditLogger::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        logger.append(
                            AuditEvent::new(AuditEventType::EnforcementCheck, format!("t{t}"))
                                .detail("i", i),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(logger.verify().unwrap(), 400);

        let entries = logger.export();
        let mut predecessors: Vec<_> = entries.iter().filter_map(|e| e.previous_entry_id.clone()).collect();
        predecessors.sort();
        predecessors.dedup();
        assert_eq!(predecessors.len(), 399);
    }

    struct FlakySink {
        healthy: Arc<AtomicBool>,
        received: Arc<Mutex<Vec<String>>>,
    }

    impl AuditSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(AuditError::SinkFailed {
                    sink: "flaky".into(),
                    reason: "offline".into(),
                });
            }
            self.received.lock().unwrap().push(entry.entry_id.clone());
            Ok(())
        }
    }

    #[test]
    fn failing_sink_does_not_block_append_and_is_retried() {
        let healthy = Arc::new(AtomicBool::new(false));
        let received = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![Box::new(FlakySink {
            healthy: healthy.clone(),
            received: received.clone(),
        })]);

        let entry = logger.append(AuditEvent::new(AuditEventType::ContractCreated, "alice"));
        assert_eq!(logger.len(), 1);
        assert_eq!(logger.undelivered_count(), 1);
        assert!(received.lock().unwrap().is_empty());

        assert_eq!(logger.retry_undelivered(), 1);

        healthy.store(true, Ordering::SeqCst);
        assert_eq!(logger.retry_undelivered(), 0);
        assert_eq!(*received.lock().unwrap(), vec![entry.entry_id]);
    }

    /// Rejects exactly one call, the `fail_on`-th (0-based).
    struct FailOnceSink {
        calls: AtomicUsize,
        fail_on: usize,
        received: Arc<Mutex<Vec<AuditEntry>>>,
    }

    impl AuditSink for FailOnceSink {
        fn name(&self) -> &str {
            "fail_once"
        }

        fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(AuditError::SinkFailed {
                    sink: "fail_once".into(),
                    reason: "transient".into(),
                });
            }
            self.received.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[test]
    fn transient_sink_failure_keeps_delivery_in_chain_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![Box::new(FailOnceSink {
            calls: AtomicUsize::new(0),
            fail_on: 1,
            received: received.clone(),
        })]);

        for _ in 0..3 {
            logger.append(AuditEvent::new(AuditEventType::ContractCreated, "alice"));
        }
        // Entry 1 failed, so entry 2 waits behind it
        assert_eq!(logger.undelivered_count(), 2);
        assert_eq!(received.lock().unwrap().len(), 1);

        assert_eq!(logger.retry_undelivered(), 0);
        logger.append(AuditEvent::new(AuditEventType::ContractRevoked, "alice"));

        let delivered = received.lock().unwrap().clone();
        let sequences: Vec<u64> = delivered.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(verify_entries(&delivered).unwrap(), 4);
    }

    #[test]
    fn healthy_sink_is_unaffected_by_another_sinks_backlog() {
        let healthy = Arc::new(AtomicBool::new(false));
        let flaky_received = Arc::new(Mutex::new(Vec::new()));
        let steady_received = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![
            Box::new(FlakySink {
                healthy: healthy.clone(),
                received: flaky_received.clone(),
            }),
            Box::new(FlakySink {
                healthy: Arc::new(AtomicBool::new(true)),
                received: steady_received.clone(),
            }),
        ]);

        logger.append(AuditEvent::new(AuditEventType::ContractCreated, "alice"));
        logger.append(AuditEvent::new(AuditEventType::ContractSubmitted, "alice"));
        assert_eq!(steady_received.lock().unwrap().len(), 2);
        assert_eq!(logger.undelivered_count(), 2);

        healthy.store(true, Ordering::SeqCst);
        assert_eq!(logger.retry_undelivered(), 0);
        assert_eq!(*flaky_received.lock().unwrap(), *steady_received.lock().unwrap());
    }

    #[test]
    fn audit_entry_serialization() {
        let logger = AuditLogger::new();
        let entry = logger.append(
            transition("lc_9", ContractState::Review, ContractState::Active).detail("note", "ok"),
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"contract_activated\""));
        assert!(json.contains("\"ACTIVE\""));
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
        assert!(verify_entries(&[back]).is_ok());
    }

    #[test]
    fn debug_format() {
        let logger = AuditLogger::new();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("AuditLogger"));
        assert!(debug_str.contains("entry_count"));
    }
}
