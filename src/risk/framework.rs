use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactDefinition {
    /// safety, financial, operational, privacy
    pub category: String,
    pub level: u8,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodDefinition {
    pub level: u8,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMatrixCell {
    pub impact: u8,
    pub likelihood: u8,
    pub risk_level: RiskLevel,
    pub numerical_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThreshold {
    pub risk_level: RiskLevel,
    pub max_acceptable_score: u32,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub approver_roles: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Caller-supplied framework content for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub impact_definitions: Vec<ImpactDefinition>,
    pub likelihood_definitions: Vec<LikelihoodDefinition>,
    #[serde(default)]
    pub risk_matrix: Vec<RiskMatrixCell>,
    pub risk_thresholds: Vec<RiskThreshold>,
    #[serde(default = "default_true")]
    pub fallback_to_default_rule: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFramework {
    pub id: String,
    pub version: u32,
    pub is_active: bool,
    #[serde(flatten)]
    pub definition: FrameworkDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Score and level produced when the matrix has no cell for a pair.
pub fn default_rule(impact: u8, likelihood: u8) -> (u32, RiskLevel) {
    let score = impact as u32 * likelihood as u32;
    let level = if score >= 15 {
        RiskLevel::Critical
    } else if score >= 10 {
        RiskLevel::High
    } else if score >= 5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    (score, level)
}

fn contiguous_levels(levels: &HashSet<u8>) -> Option<u8> {
    let max = levels.iter().copied().max()?;
    if (1..=max).all(|l| levels.contains(&l)) && !levels.contains(&0) {
        Some(max)
    } else {
        None
    }
}

impl FrameworkDefinition {
    pub fn impact_range(&self) -> u8 {
        self.impact_definitions.iter().map(|d| d.level).max().unwrap_or(0)
    }

    pub fn likelihood_range(&self) -> u8 {
        self.likelihood_definitions.iter().map(|d| d.level).max().unwrap_or(0)
    }

    pub fn cell(&self, impact: u8, likelihood: u8) -> Option<&RiskMatrixCell> {
        self.risk_matrix
            .iter()
            .find(|c| c.impact == impact && c.likelihood == likelihood)
    }

    pub fn threshold(&self, level: RiskLevel) -> Option<&RiskThreshold> {
        self.risk_thresholds.iter().find(|t| t.risk_level == level)
    }

    /// Checks run whenever a framework is stored or activated.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidFramework(msg));

        if self.name.trim().is_empty() {
            return invalid("name must not be empty".to_string());
        }

        let impact_levels: HashSet<u8> = self.impact_definitions.iter().map(|d| d.level).collect();
        let impact_max = match contiguous_levels(&impact_levels) {
            Some(max) => max,
            None => return invalid("impact levels must be declared contiguously from 1".to_string()),
        };
        let likelihood_levels: HashSet<u8> =
            self.likelihood_definitions.iter().map(|d| d.level).collect();
        let likelihood_max = match contiguous_levels(&likelihood_levels) {
            Some(max) => max,
            None => {
                return invalid("likelihood levels must be declared contiguously from 1".to_string())
            }
        };

        let mut cells = HashSet::new();
        for cell in &self.risk_matrix {
            if cell.impact == 0 || cell.impact > impact_max || cell.likelihood == 0 || cell.likelihood > likelihood_max {
                return invalid(format!(
                    "cell ({}, {}) is outside the declared {}x{} range",
                    cell.impact, cell.likelihood, impact_max, likelihood_max
                ));
            }
            if !cells.insert((cell.impact, cell.likelihood)) {
                return invalid(format!(
                    "duplicate cell ({}, {})",
                    cell.impact, cell.likelihood
                ));
            }
        }

        if !self.fallback_to_default_rule {
            for impact in 1..=impact_max {
                for likelihood in 1..=likelihood_max {
                    if !cells.contains(&(impact, likelihood)) {
                        return invalid(format!(
                            "missing cell ({}, {}) and no default rule",
                            impact, likelihood
                        ));
                    }
                }
            }
        }

        let mut previous: Option<(RiskLevel, u32)> = None;
        for level in RiskLevel::ALL {
            let matching: Vec<_> = self
                .risk_thresholds
                .iter()
                .filter(|t| t.risk_level == level)
                .collect();
            let threshold = match matching.as_slice() {
                [single] => *single,
                [] => return invalid(format!("missing threshold for {}", level)),
                _ => return invalid(format!("duplicate threshold for {}", level)),
            };
            if let Some((prev_level, prev_score)) = previous {
                if threshold.max_acceptable_score <= prev_score {
                    return invalid(format!(
                        "threshold for {} ({}) must exceed {} ({})",
                        level, threshold.max_acceptable_score, prev_level, prev_score
                    ));
                }
            }
            previous = Some((level, threshold.max_acceptable_score));
        }

        Ok(())
    }

    /// ISO 21434 style 5x5 framework with every cell generated by the default rule.
    pub fn builtin() -> Self {
        let impact_labels = ["Negligible", "Minor", "Moderate", "Major", "Severe"];
        let likelihood_labels = ["Very Low", "Low", "Medium", "High", "Very High"];

        let impact_definitions = ["safety", "financial", "operational", "privacy"]
            .iter()
            .flat_map(|category| {
                impact_labels.iter().enumerate().map(move |(i, label)| ImpactDefinition {
                    category: category.to_string(),
                    level: (i + 1) as u8,
                    label: label.to_string(),
                    description: String::new(),
                })
            })
            .collect();

        let likelihood_definitions = likelihood_labels
            .iter()
            .enumerate()
            .map(|(i, label)| LikelihoodDefinition {
                level: (i + 1) as u8,
                label: label.to_string(),
                description: String::new(),
            })
            .collect();

        let mut risk_matrix = Vec::with_capacity(25);
        for impact in 1..=5u8 {
            for likelihood in 1..=5u8 {
                let (numerical_score, risk_level) = default_rule(impact, likelihood);
                risk_matrix.push(RiskMatrixCell {
                    impact,
                    likelihood,
                    risk_level,
                    numerical_score,
                });
            }
        }

        fn threshold(risk_level: RiskLevel, max_acceptable_score: u32, roles: &[&str]) -> RiskThreshold {
            RiskThreshold {
                risk_level,
                max_acceptable_score,
                requires_approval: !roles.is_empty(),
                approver_roles: roles.iter().map(|r| r.to_string()).collect(),
            }
        }

        FrameworkDefinition {
            name: "ISO 21434 default".to_string(),
            description: "5x5 impact x likelihood matrix, score = impact x likelihood".to_string(),
            impact_definitions,
            likelihood_definitions,
            risk_matrix,
            risk_thresholds: vec![
                threshold(RiskLevel::Low, 4, &[]),
                threshold(RiskLevel::Medium, 9, &["risk_owner"]),
                threshold(RiskLevel::High, 14, &["risk_owner", "security_manager"]),
                threshold(RiskLevel::Critical, 25, &["security_manager", "ciso"]),
            ],
            fallback_to_default_rule: true,
        }
    }
}

impl RiskFramework {
    pub fn new(id: String, definition: FrameworkDefinition) -> Self {
        let now = Utc::now();
        RiskFramework {
            id,
            version: 1,
            is_active: false,
            definition,
            created_at: now,
            updated_at: now,
        }
    }

    /// The built-in framework, used before any framework has been stored.
    pub fn builtin() -> Self {
        let mut framework = Self::new("builtin-iso21434".to_string(), FrameworkDefinition::builtin());
        framework.is_active = true;
        framework
    }
}
