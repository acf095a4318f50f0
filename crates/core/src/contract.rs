//! Learning contract data model.
//!
//! A [`LearningContract`] is immutable by convention: lifecycle operations
//! produce an updated copy and persist it, they never edit a shared value in
//! place. Closed value sets (types, states, abstraction levels, boundary
//! modes) are enums with explicit ordinal tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Contract identifier.
pub type ContractId = String;

/// Highest sensitivity tier a contract can permit (0 ephemeral .. 5 maximum).
pub const MAX_CLASSIFICATION: u8 = 5;

/// What kind of learning a contract grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    /// Watch only; nothing may be stored.
    Observation,
    /// Store specific episodes, no generalization.
    Episodic,
    /// Derive reusable procedures and heuristics.
    Procedural,
    /// Derive long-horizon strategy.
    Strategic,
    /// Explicitly forbid learning in a scope.
    Prohibited,
}

impl ContractType {
    pub const ALL: [ContractType; 5] = [
        ContractType::Observation,
        ContractType::Episodic,
        ContractType::Procedural,
        ContractType::Strategic,
        ContractType::Prohibited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Observation => "OBSERVATION",
            ContractType::Episodic => "EPISODIC",
            ContractType::Procedural => "PROCEDURAL",
            ContractType::Strategic => "STRATEGIC",
            ContractType::Prohibited => "PROHIBITED",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown contract type '{s}'"))
    }
}

/// Lifecycle state of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractState {
    Draft,
    Review,
    Active,
    Expired,
    Revoked,
    Amended,
}

impl ContractState {
    pub const ALL: [ContractState; 6] = [
        ContractState::Draft,
        ContractState::Review,
        ContractState::Active,
        ContractState::Expired,
        ContractState::Revoked,
        ContractState::Amended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractState::Draft => "DRAFT",
            ContractState::Review => "REVIEW",
            ContractState::Active => "ACTIVE",
            ContractState::Expired => "EXPIRED",
            ContractState::Revoked => "REVOKED",
            ContractState::Amended => "AMENDED",
        }
    }

    /// No lifecycle edge leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractState::Expired | ContractState::Revoked | ContractState::Amended
        )
    }
}

impl fmt::Display for ContractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractState::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown contract state '{s}'"))
    }
}

/// How far learned material may be generalized, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbstractionLevel {
    Raw,
    Pattern,
    Heuristic,
    Strategy,
}

impl AbstractionLevel {
    pub fn ordinal(&self) -> u8 {
        match self {
            AbstractionLevel::Raw => 0,
            AbstractionLevel::Pattern => 1,
            AbstractionLevel::Heuristic => 2,
            AbstractionLevel::Strategy => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(AbstractionLevel::Raw),
            1 => Some(AbstractionLevel::Pattern),
            2 => Some(AbstractionLevel::Heuristic),
            3 => Some(AbstractionLevel::Strategy),
            _ => None,
        }
    }
}

impl PartialOrd for AbstractionLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AbstractionLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for AbstractionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbstractionLevel::Raw => "RAW",
            AbstractionLevel::Pattern => "PATTERN",
            AbstractionLevel::Heuristic => "HEURISTIC",
            AbstractionLevel::Strategy => "STRATEGY",
        };
        f.write_str(s)
    }
}

impl FromStr for AbstractionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_ordinal(n).ok_or_else(|| format!("abstraction level {n} out of range"));
        }
        match s.to_ascii_uppercase().as_str() {
            "RAW" => Ok(AbstractionLevel::Raw),
            "PATTERN" => Ok(AbstractionLevel::Pattern),
            "HEURISTIC" => Ok(AbstractionLevel::Heuristic),
            "STRATEGY" => Ok(AbstractionLevel::Strategy),
            _ => Err(format!("unknown abstraction level '{s}'")),
        }
    }
}

/// Externally driven security posture, compared by a fixed total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryMode {
    Restricted,
    Normal,
    Trusted,
    Privileged,
}

impl BoundaryMode {
    /// The ordinal table. This is the only place boundary modes are ranked;
    /// adding an intermediate mode means renumbering here and nowhere else.
    pub fn ordinal(&self) -> u8 {
        match self {
            BoundaryMode::Restricted => 0,
            BoundaryMode::Normal => 1,
            BoundaryMode::Trusted => 2,
            BoundaryMode::Privileged => 3,
        }
    }
}

impl PartialOrd for BoundaryMode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundaryMode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoundaryMode::Restricted => "RESTRICTED",
            BoundaryMode::Normal => "NORMAL",
            BoundaryMode::Trusted => "TRUSTED",
            BoundaryMode::Privileged => "PRIVILEGED",
        };
        f.write_str(s)
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RESTRICTED" => Ok(BoundaryMode::Restricted),
            "NORMAL" => Ok(BoundaryMode::Normal),
            "TRUSTED" => Ok(BoundaryMode::Trusted),
            "PRIVILEGED" => Ok(BoundaryMode::Privileged),
            _ => Err(format!("unknown boundary mode '{s}'")),
        }
    }
}

/// How long stored memories may be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionPolicy {
    Session,
    Timebound,
    Permanent,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetentionPolicy::Session => "SESSION",
            RetentionPolicy::Timebound => "TIMEBOUND",
            RetentionPolicy::Permanent => "PERMANENT",
        };
        f.write_str(s)
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SESSION" => Ok(RetentionPolicy::Session),
            "TIMEBOUND" => Ok(RetentionPolicy::Timebound),
            "PERMANENT" => Ok(RetentionPolicy::Permanent),
            _ => Err(format!("unknown retention policy '{s}'")),
        }
    }
}

/// Where a contract applies. An empty set is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractScope {
    #[serde(default)]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub contexts: BTreeSet<String>,
    #[serde(default)]
    pub tools: BTreeSet<String>,
    pub max_abstraction: AbstractionLevel,
    #[serde(default)]
    pub transferable: bool,
}

impl ContractScope {
    /// A wildcard scope that allows no generalization and no transfer.
    pub fn unrestricted() -> Self {
        Self {
            domains: BTreeSet::new(),
            contexts: BTreeSet::new(),
            tools: BTreeSet::new(),
            max_abstraction: AbstractionLevel::Raw,
            transferable: false,
        }
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn covers_domain(&self, domain: &str) -> bool {
        self.domains.is_empty() || self.domains.contains(domain)
    }

    pub fn covers_context(&self, context: &str) -> bool {
        self.contexts.is_empty() || self.contexts.contains(context)
    }

    pub fn covers_tool(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.contains(tool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPermissions {
    pub may_store: bool,
    /// Highest classification (0..=5) the contract may store.
    pub classification_cap: u8,
    pub retention: RetentionPolicy,
    /// Required iff `retention` is [`RetentionPolicy::Timebound`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralizationRules {
    pub allowed: bool,
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallRules {
    pub requires_owner: bool,
    pub boundary_mode_min: BoundaryMode,
}

/// An explicit, revocable agreement bounding what an agent may learn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningContract {
    pub contract_id: ContractId,
    pub contract_type: ContractType,
    pub state: ContractState,
    pub scope: ContractScope,
    pub memory_permissions: MemoryPermissions,
    pub generalization_rules: GeneralizationRules,
    pub recall_rules: RecallRules,
    pub revocable: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amended_from: Option<ContractId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amended_to: Option<ContractId>,
}

impl LearningContract {
    pub fn is_active(&self) -> bool {
        self.state == ContractState::Active
    }

    /// Whether a TIMEBOUND retention window has closed at `now`.
    /// Always `false` for SESSION and PERMANENT retention.
    pub fn retention_elapsed(&self, now: DateTime<Utc>) -> bool {
        match (
            self.memory_permissions.retention,
            self.memory_permissions.retention_until,
        ) {
            (RetentionPolicy::Timebound, Some(until)) => until <= now,
            _ => false,
        }
    }

    /// Copy of this contract in a new state.
    pub fn with_state(&self, state: ContractState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}
