//! Structural validation of draft contracts.
//!
//! The validator collects every problem rather than stopping at the first,
//! so a rejected draft reports all of what needs fixing at once.

use covenant_core::error::ValidationError;
use covenant_core::{ContractType, LearningContract, RetentionPolicy, MAX_CLASSIFICATION};
use std::collections::BTreeSet;

/// Rejects malformed contracts.
pub struct ContractValidator;

impl ContractValidator {
    /// Validate a contract, failing with every problem found.
    pub fn validate(contract: &LearningContract) -> Result<(), ValidationError> {
        let errors = Self::problems(contract);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                contract_id: contract.contract_id.clone(),
                contract_type: contract.contract_type,
                errors,
            })
        }
    }

    /// Every structural problem with `contract`, in a stable order.
    pub fn problems(contract: &LearningContract) -> Vec<String> {
        let mut errors = Vec::new();
        let perms = &contract.memory_permissions;

        if contract.contract_id.trim().is_empty() {
            errors.push("contract_id must not be empty".to_string());
        }
        if contract.created_by.trim().is_empty() {
            errors.push("created_by must not be empty".to_string());
        }

        if perms.classification_cap > MAX_CLASSIFICATION {
            errors.push(format!(
                "classification_cap {} exceeds maximum {MAX_CLASSIFICATION}",
                perms.classification_cap
            ));
        }

        // Non-learning contract types
        if matches!(
            contract.contract_type,
            ContractType::Observation | ContractType::Prohibited
        ) {
            if perms.may_store {
                errors.push(format!(
                    "{} contracts must not permit storage",
                    contract.contract_type
                ));
            }
            if contract.generalization_rules.allowed {
                errors.push(format!(
                    "{} contracts must not permit generalization",
                    contract.contract_type
                ));
            }
        }

        match (perms.retention, perms.retention_until) {
            (RetentionPolicy::Timebound, None) => {
                errors.push("TIMEBOUND retention requires retention_until".to_string());
            }
            (RetentionPolicy::Timebound, Some(until)) if until <= contract.created_at => {
                errors.push("retention_until must be after created_at".to_string());
            }
            (policy, Some(_)) if policy != RetentionPolicy::Timebound => {
                errors.push(format!("{policy} retention must not carry retention_until"));
            }
            _ => {}
        }

        blank_entries("domains", &contract.scope.domains, &mut errors);
        blank_entries("contexts", &contract.scope.contexts, &mut errors);
        blank_entries("tools", &contract.scope.tools, &mut errors);

        if contract.amended_from.as_deref() == Some(contract.contract_id.as_str()) {
            errors.push("a contract cannot amend itself".to_string());
        }

        errors
    }
}

fn blank_entries(field: &str, entries: &BTreeSet<String>, errors: &mut Vec<String>) {
    if entries.iter().any(|e| e.trim().is_empty()) {
        errors.push(format!("scope.{field} contains a blank entry"));
    }
}
