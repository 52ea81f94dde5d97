//! Engine configuration.

use posledger_inventory::{ReferenceThenHeuristic, StrictReference, TransferMatcher};
use serde::{Deserialize, Serialize};

use crate::ledger::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Which transfer pairing strategy the engine uses.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMatching {
    #[default]
    ReferenceThenHeuristic,
    Strict,
}

impl TransferMatching {
    pub fn matcher(self) -> Box<dyn TransferMatcher> {
        match self {
            TransferMatching::ReferenceThenHeuristic => Box::new(ReferenceThenHeuristic),
            TransferMatching::Strict => Box::new(StrictReference),
        }
    }
}

impl core::str::FromStr for TransferMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference_then_heuristic" | "heuristic" => Ok(Self::ReferenceThenHeuristic),
            "strict" | "strict_reference" => Ok(Self::Strict),
            other => Err(format!("unknown transfer matching strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub transfer_matching: TransferMatching,
    /// How often a command is re-decided after losing a stream race.
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            transfer_matching: TransferMatching::default(),
            conflict_retries: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_parses_known_names() {
        assert_eq!("strict".parse::<TransferMatching>(), Ok(TransferMatching::Strict));
        assert_eq!(
            "Reference_Then_Heuristic".parse::<TransferMatching>(),
            Ok(TransferMatching::ReferenceThenHeuristic)
        );
        assert!("fuzzy".parse::<TransferMatching>().is_err());
        assert_eq!(TransferMatching::Strict.matcher().name(), "strict_reference");
    }
}
