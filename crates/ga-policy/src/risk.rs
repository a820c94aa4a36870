// risk.rs — Outcome × domain → how much human involvement an action needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SecurityProfile;
use crate::domain::Domain;
use crate::intention::Intention;
use crate::outcome::Outcome;

/// What the human has to do before an action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDecision {
    /// Run it and record it.
    Log,
    /// Ask for a click.
    Confirm,
    /// Ask for a click and the approval PIN.
    Pin,
}

impl RiskDecision {
    fn escalate(self) -> Self {
        match self {
            RiskDecision::Log => RiskDecision::Confirm,
            RiskDecision::Confirm | RiskDecision::Pin => RiskDecision::Pin,
        }
    }

    fn relax(self) -> Self {
        match self {
            RiskDecision::Pin => RiskDecision::Confirm,
            RiskDecision::Confirm | RiskDecision::Log => RiskDecision::Log,
        }
    }
}

impl fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskDecision::Log => "log",
            RiskDecision::Confirm => "confirm",
            RiskDecision::Pin => "pin",
        };
        f.write_str(name)
    }
}

/// Classifier results the risk table is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub outcome: Outcome,
    pub intention: Intention,
    pub domain: Domain,
    /// True when every operation is a local read. Network operations are
    /// never read-only: a request can carry workspace data off the machine.
    pub read_only: bool,
}

/// The risk table, parameterized by security profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskEngine {
    profile: SecurityProfile,
}

impl RiskEngine {
    pub fn new(profile: SecurityProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> SecurityProfile {
        self.profile
    }

    pub fn evaluate(&self, factors: &RiskFactors) -> RiskDecision {
        let base = balanced(factors);
        // Intention is informational; it never enters the table.
        match self.profile {
            SecurityProfile::Balanced => base,
            SecurityProfile::Strict => base.escalate(),
            SecurityProfile::Permissive if factors.domain == Domain::System => RiskDecision::Pin,
            SecurityProfile::Permissive => base.relax(),
        }
    }
}

fn balanced(factors: &RiskFactors) -> RiskDecision {
    use Domain::*;
    match (factors.domain, factors.outcome) {
        (System, _) => RiskDecision::Pin,
        (Untrusted | Trusted, Outcome::Irreversible) => RiskDecision::Pin,
        (Untrusted | Trusted, Outcome::Reversible) => RiskDecision::Confirm,
        (Workspace | Localhost, Outcome::Irreversible) => RiskDecision::Confirm,
        (Workspace | Localhost, Outcome::Reversible) => {
            if factors.read_only {
                RiskDecision::Log
            } else {
                RiskDecision::Confirm
            }
        }
    }
}
