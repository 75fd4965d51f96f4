//! Attack Feasibility Score (AFS) rating.
//!
//! Five attacker-effort sub-factors are summed into an overall rating. A high
//! sum means a hard attack, so the feasibility bucket runs the opposite way:
//! 25 is "Very Low" feasibility and 0 is "Very High".

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::types::Complexity;
use crate::error::{EngineError, EngineResult};
use crate::graph::StepRules;

pub const MAX_SUB_FACTOR: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeasibilityLevel {
    #[serde(rename = "Very Low")]
    VeryLow,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl FeasibilityLevel {
    pub fn from_overall(overall: u32) -> Self {
        if overall >= 25 {
            FeasibilityLevel::VeryLow
        } else if overall >= 20 {
            FeasibilityLevel::Low
        } else if overall >= 14 {
            FeasibilityLevel::Medium
        } else if overall >= 1 {
            FeasibilityLevel::High
        } else {
            FeasibilityLevel::VeryHigh
        }
    }

    /// Likelihood level (1-5) used by the risk matrix.
    pub fn likelihood_level(&self) -> u8 {
        match self {
            FeasibilityLevel::VeryLow => 1,
            FeasibilityLevel::Low => 2,
            FeasibilityLevel::Medium => 3,
            FeasibilityLevel::High => 4,
            FeasibilityLevel::VeryHigh => 5,
        }
    }
}

impl fmt::Display for FeasibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeasibilityLevel::VeryLow => write!(f, "Very Low"),
            FeasibilityLevel::Low => write!(f, "Low"),
            FeasibilityLevel::Medium => write!(f, "Medium"),
            FeasibilityLevel::High => write!(f, "High"),
            FeasibilityLevel::VeryHigh => write!(f, "Very High"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibilityRating {
    pub elapsed_time: u8,
    pub specialist_expertise: u8,
    pub knowledge_of_target: u8,
    pub window_of_opportunity: u8,
    pub equipment: u8,
    pub overall_rating: u32,
}

/// Facts about a generated path that feed the derived rating.
#[derive(Debug, Clone, Default)]
pub struct PathEffort<'a> {
    pub hop_count: usize,
    pub complexity: Option<Complexity>,
    pub trust_increases: usize,
    pub required_assumptions: &'a [String],
    pub vulnerability_discounted: bool,
}

impl FeasibilityRating {
    /// Analyst-supplied rating. Each sub-factor must be within 0..=5.
    pub fn new(
        elapsed_time: u8,
        specialist_expertise: u8,
        knowledge_of_target: u8,
        window_of_opportunity: u8,
        equipment: u8,
    ) -> EngineResult<Self> {
        let factors = [
            ("elapsed_time", elapsed_time),
            ("specialist_expertise", specialist_expertise),
            ("knowledge_of_target", knowledge_of_target),
            ("window_of_opportunity", window_of_opportunity),
            ("equipment", equipment),
        ];
        for (field, value) in factors {
            if value > MAX_SUB_FACTOR {
                return Err(EngineError::validation(
                    field,
                    format!("must be within 0..={}, got {}", MAX_SUB_FACTOR, value),
                ));
            }
        }
        Ok(Self::from_factors(
            elapsed_time,
            specialist_expertise,
            knowledge_of_target,
            window_of_opportunity,
            equipment,
        ))
    }

    fn from_factors(
        elapsed_time: u8,
        specialist_expertise: u8,
        knowledge_of_target: u8,
        window_of_opportunity: u8,
        equipment: u8,
    ) -> Self {
        let overall_rating = [
            elapsed_time,
            specialist_expertise,
            knowledge_of_target,
            window_of_opportunity,
            equipment,
        ]
        .iter()
        .map(|v| *v as u32)
        .sum();

        FeasibilityRating {
            elapsed_time,
            specialist_expertise,
            knowledge_of_target,
            window_of_opportunity,
            equipment,
            overall_rating,
        }
    }

    /// Derive sub-factors from the shape of a generated path.
    pub fn for_path(effort: &PathEffort<'_>, rules: &StepRules) -> Self {
        let clamp = |v: usize| v.min(MAX_SUB_FACTOR as usize) as u8;

        let elapsed_time = clamp(effort.hop_count);
        let specialist_expertise = match effort.complexity {
            Some(Complexity::Low) | None => 1,
            Some(Complexity::Medium) => 3,
            Some(Complexity::High) => 5,
        };
        let knowledge_of_target = clamp(1 + effort.trust_increases);

        let mut window_of_opportunity = 0u8;
        let mut equipment = 0u8;
        for assumption in effort.required_assumptions {
            let cost = rules.effort_for(assumption);
            window_of_opportunity = window_of_opportunity.max(cost.window_of_opportunity);
            equipment = equipment.max(cost.equipment);
        }
        if effort.vulnerability_discounted {
            equipment = equipment.saturating_add(1);
        }

        Self::from_factors(
            elapsed_time,
            specialist_expertise,
            knowledge_of_target,
            window_of_opportunity.min(MAX_SUB_FACTOR),
            equipment.min(MAX_SUB_FACTOR),
        )
    }

    pub fn level(&self) -> FeasibilityLevel {
        FeasibilityLevel::from_overall(self.overall_rating)
    }
}
