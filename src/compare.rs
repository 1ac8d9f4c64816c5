use std::collections::BTreeSet;

use serde::Serialize;

use crate::normalize::{CanonicalAssignment, LegacyPair};

/// A canonical assignment missing competency, preference order, or both
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteAssignment {
    pub assignment_id: String,
    pub machine_id: String,
    pub missing_competency: bool,
    pub missing_order: bool,
}

/// Verdict for one employee's legacy and canonical machine sets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Comparison {
    pub coincide: bool,
    /// Machines present in legacy slots with no canonical assignment, sorted
    pub only_in_legacy: Vec<String>,
    /// Machines with a canonical assignment but no legacy slot, sorted
    pub only_in_canonical: Vec<String>,
    pub incomplete: Vec<IncompleteAssignment>,
}

impl Comparison {
    pub fn has_quality_issues(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

/// Compare machine sets ignoring order and repetition.
///
/// Both sides are reduced to sorted sets of machine ids before comparing,
/// so any permutation or duplication of either input gives the same verdict.
/// The incompleteness check runs independently of the equality check.
pub fn compare(legacy: &[LegacyPair], canonical: &[CanonicalAssignment]) -> Comparison {
    let legacy_set: BTreeSet<&str> = legacy.iter().map(|p| p.machine_id.as_str()).collect();
    let canonical_set: BTreeSet<&str> = canonical.iter().map(|a| a.machine_id.as_str()).collect();

    let only_in_legacy: Vec<String> = legacy_set
        .difference(&canonical_set)
        .map(|m| m.to_string())
        .collect();
    let only_in_canonical: Vec<String> = canonical_set
        .difference(&legacy_set)
        .map(|m| m.to_string())
        .collect();

    let mut incomplete: Vec<IncompleteAssignment> = canonical
        .iter()
        .filter(|a| a.competency.is_none() || a.preference_order.is_none())
        .map(|a| IncompleteAssignment {
            assignment_id: a.id.clone(),
            machine_id: a.machine_id.clone(),
            missing_competency: a.competency.is_none(),
            missing_order: a.preference_order.is_none(),
        })
        .collect();
    incomplete.sort_by(|a, b| {
        (a.machine_id.as_str(), a.assignment_id.as_str())
            .cmp(&(b.machine_id.as_str(), b.assignment_id.as_str()))
    });

    Comparison {
        coincide: only_in_legacy.is_empty() && only_in_canonical.is_empty(),
        only_in_legacy,
        only_in_canonical,
        incomplete,
    }
}
