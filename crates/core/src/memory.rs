//! Memory references — read-only views of records held by the external
//! memory store.
//!
//! This core never mutates memories. It reads references, computes which
//! ones an operation affects, and hands the result back to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single memory as seen by the authorization core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReference {
    pub memory_id: String,
    /// The contract under which this memory was created.
    pub contract_id: String,
    pub created_at: DateTime<Utc>,
    pub classification: u8,
    #[serde(default)]
    pub is_derived: bool,
    /// Parents in the derivation DAG.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<String>,
}

impl MemoryReference {
    /// A directly-stored (non-derived) memory.
    pub fn direct(
        memory_id: impl Into<String>,
        contract_id: impl Into<String>,
        classification: u8,
    ) -> Self {
        Self {
            memory_id: memory_id.into(),
            contract_id: contract_id.into(),
            created_at: Utc::now(),
            classification,
            is_derived: false,
            derived_from: Vec::new(),
        }
    }

    /// A memory synthesized from one or more parents.
    pub fn derived<I, S>(
        memory_id: impl Into<String>,
        contract_id: impl Into<String>,
        classification: u8,
        parents: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            memory_id: memory_id.into(),
            contract_id: contract_id.into(),
            created_at: Utc::now(),
            classification,
            is_derived: true,
            derived_from: parents.into_iter().map(Into::into).collect(),
        }
    }
}

/// A learned heuristic and the memories it was generalized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicReference {
    pub heuristic_id: String,
    #[serde(default)]
    pub derived_from: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_constructor_marks_parents() {
        let m = MemoryReference::derived("m2", "lc_1", 2, ["m1"]);
        assert!(m.is_derived);
        assert_eq!(m.derived_from, vec!["m1".to_string()]);

        let d = MemoryReference::direct("m1", "lc_1", 1);
        assert!(!d.is_derived);
        assert!(d.derived_from.is_empty());
    }

    #[test]
    fn reference_deserializes_without_optional_fields() {
        let json = r#"{
            "memory_id": "m9",
            "contract_id": "lc_9",
            "created_at": "2026-01-01T00:00:00Z",
            "classification": 4
        }"#;
        let m: MemoryReference = serde_json::from_str(json).unwrap();
        assert_eq!(m.classification, 4);
        assert!(!m.is_derived);
        assert!(m.derived_from.is_empty());
    }
}
