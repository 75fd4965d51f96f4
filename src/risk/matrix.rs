use serde::{Deserialize, Serialize};

use crate::analysis::types::{AttackChain, AttackPath};
use crate::risk::framework::{default_rule, RiskFramework, RiskLevel};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 5;

/// Outcome of looking up an (impact, likelihood) pair in a risk framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub framework_id: String,
    pub framework_version: u32,
    pub impact_level: u8,
    pub likelihood_level: u8,
    pub numerical_score: u32,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub approver_roles: Vec<String>,
    pub default_rule_applied: bool,
}

pub struct RiskMatrixEngine;

impl RiskMatrixEngine {
    /// Levels are clamped to the ranges the framework declares.
    pub fn evaluate(framework: &RiskFramework, impact: u8, likelihood: u8) -> RiskAssessment {
        let definition = &framework.definition;
        let impact_level = impact.clamp(MIN_LEVEL, definition.impact_range().max(MIN_LEVEL));
        let likelihood_level =
            likelihood.clamp(MIN_LEVEL, definition.likelihood_range().max(MIN_LEVEL));

        let (numerical_score, risk_level, default_rule_applied) =
            match definition.cell(impact_level, likelihood_level) {
                Some(cell) => (cell.numerical_score, cell.risk_level, false),
                None => {
                    log::warn!(
                        "Framework {} has no cell for ({}, {}), applying default rule",
                        framework.id,
                        impact_level,
                        likelihood_level
                    );
                    let (score, level) = default_rule(impact_level, likelihood_level);
                    (score, level, true)
                }
            };

        let (requires_approval, approver_roles) = match definition.threshold(risk_level) {
            Some(threshold) => (threshold.requires_approval, threshold.approver_roles.clone()),
            None => {
                log::warn!(
                    "Framework {} has no threshold for {}, approval not required",
                    framework.id,
                    risk_level
                );
                (false, Vec::new())
            }
        };

        RiskAssessment {
            framework_id: framework.id.clone(),
            framework_version: framework.version,
            impact_level,
            likelihood_level,
            numerical_score,
            risk_level,
            requires_approval,
            approver_roles,
            default_rule_applied,
        }
    }

    /// Map a 0-10 damage severity onto the 1-5 impact scale.
    pub fn impact_level(impact: f64) -> u8 {
        let level = (impact.clamp(0.0, 10.0) / 2.0).ceil() as u8;
        level.clamp(MIN_LEVEL, MAX_LEVEL)
    }

    pub fn assess_path(framework: &RiskFramework, path: &AttackPath) -> RiskAssessment {
        Self::evaluate(
            framework,
            Self::impact_level(path.impact),
            path.feasibility_level.likelihood_level(),
        )
    }

    /// Worst case across members: highest impact and the easiest route.
    pub fn assess_chain(framework: &RiskFramework, chain: &AttackChain) -> RiskAssessment {
        let impact = chain
            .paths
            .iter()
            .map(|p| Self::impact_level(p.impact))
            .max()
            .unwrap_or(MIN_LEVEL);
        Self::evaluate(framework, impact, chain.feasibility_level.likelihood_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::framework::{FrameworkDefinition, RiskMatrixCell};

    fn sparse_framework() -> RiskFramework {
        let mut definition = FrameworkDefinition::builtin();
        definition.risk_matrix.clear();
        RiskFramework::new("sparse".to_string(), definition)
    }

    #[test]
    fn test_default_rule_when_cell_missing() {
        let framework = sparse_framework();

        let top = RiskMatrixEngine::evaluate(&framework, 5, 5);
        assert_eq!(top.numerical_score, 25);
        assert_eq!(top.risk_level, RiskLevel::Critical);
        assert!(top.default_rule_applied);
        assert!(top.requires_approval);
        assert_eq!(top.approver_roles, vec!["security_manager".to_string(), "ciso".to_string()]);

        let bottom = RiskMatrixEngine::evaluate(&framework, 1, 1);
        assert_eq!(bottom.numerical_score, 1);
        assert_eq!(bottom.risk_level, RiskLevel::Low);
        assert!(!bottom.requires_approval);

        let boundary = RiskMatrixEngine::evaluate(&framework, 3, 2);
        assert_eq!(boundary.numerical_score, 6);
        assert_eq!(boundary.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_configured_cell_overrides_default() {
        let mut framework = sparse_framework();
        framework.definition.risk_matrix.push(RiskMatrixCell {
            impact: 3,
            likelihood: 2,
            risk_level: RiskLevel::High,
            numerical_score: 12,
        });

        let assessment = RiskMatrixEngine::evaluate(&framework, 3, 2);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.numerical_score, 12);
        assert!(!assessment.default_rule_applied);
        assert_eq!(assessment.approver_roles.len(), 2);
    }

    #[test]
    fn test_levels_are_clamped() {
        let framework = RiskFramework::builtin();
        let assessment = RiskMatrixEngine::evaluate(&framework, 0, 9);
        assert_eq!(assessment.impact_level, 1);
        assert_eq!(assessment.likelihood_level, 5);
        assert_eq!(assessment.numerical_score, 5);
    }

    #[test]
    fn test_levels_are_clamped_to_declared_ranges() {
        let mut definition = FrameworkDefinition::builtin();
        definition.name = "3x3".to_string();
        definition.impact_definitions.retain(|d| d.level <= 3);
        definition.likelihood_definitions.retain(|d| d.level <= 3);
        definition.risk_matrix.retain(|c| c.impact <= 3 && c.likelihood <= 3);
        definition.fallback_to_default_rule = false;
        definition.validate().unwrap();
        let framework = RiskFramework::new("small".to_string(), definition);

        let assessment = RiskMatrixEngine::evaluate(&framework, 5, 4);
        assert_eq!(assessment.impact_level, 3);
        assert_eq!(assessment.likelihood_level, 3);
        assert_eq!(assessment.numerical_score, 9);
        assert!(!assessment.default_rule_applied);
    }

    #[test]
    fn test_missing_threshold_does_not_require_approval() {
        let mut framework = RiskFramework::builtin();
        framework.definition.risk_thresholds.clear();
        let assessment = RiskMatrixEngine::evaluate(&framework, 5, 5);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(!assessment.requires_approval);
    }

    #[test]
    fn test_impact_level_mapping() {
        assert_eq!(RiskMatrixEngine::impact_level(0.0), 1);
        assert_eq!(RiskMatrixEngine::impact_level(2.0), 1);
        assert_eq!(RiskMatrixEngine::impact_level(2.1), 2);
        assert_eq!(RiskMatrixEngine::impact_level(9.0), 5);
        assert_eq!(RiskMatrixEngine::impact_level(10.0), 5);
    }
}
