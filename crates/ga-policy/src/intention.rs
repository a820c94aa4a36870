// intention.rs — Who asked for the action.
//
// Intention is reported to the reviewer; it never lowers the review level.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profile::Provenance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intention {
    /// A human asked for this action directly.
    Explicit,
    /// The action follows from a task the user gave, via tool output.
    TaskDerived,
    /// The model decided on its own.
    Autonomous,
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intention::Explicit => "explicit",
            Intention::TaskDerived => "task-derived",
            Intention::Autonomous => "autonomous",
        };
        f.write_str(name)
    }
}

/// Derive intention from provenance; the most explicit source wins.
pub fn classify_intention(provenance: &[Provenance]) -> Intention {
    if provenance
        .iter()
        .any(|p| matches!(p, Provenance::LocalUser | Provenance::WebRemoteUser))
    {
        Intention::Explicit
    } else if provenance.contains(&Provenance::ToolOutput) {
        Intention::TaskDerived
    } else {
        Intention::Autonomous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_explicit_source_wins() {
        assert_eq!(
            classify_intention(&[Provenance::ModelSuggestion, Provenance::LocalUser]),
            Intention::Explicit
        );
        assert_eq!(
            classify_intention(&[Provenance::WebRemoteUser]),
            Intention::Explicit
        );
        assert_eq!(
            classify_intention(&[Provenance::ToolOutput, Provenance::WebContent]),
            Intention::TaskDerived
        );
        assert_eq!(
            classify_intention(&[Provenance::ModelSuggestion]),
            Intention::Autonomous
        );
        assert_eq!(classify_intention(&[]), Intention::Autonomous);
    }

    #[test]
    fn serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Intention::TaskDerived).unwrap(),
            "\"task-derived\""
        );
    }
}
