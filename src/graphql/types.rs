use async_graphql::{InputObject, SimpleObject};
use crate::analysis::{AttackChain, AttackPath, AttackStep, Page};
use crate::risk::{RiskAssessment, RiskFramework};

// GraphQL Types

#[derive(SimpleObject, Clone)]
pub struct RiskAssessmentType {
    pub framework_id: String,
    pub framework_version: i32,
    pub impact_level: i32,
    pub likelihood_level: i32,
    pub numerical_score: i32,
    pub risk_level: String,
    pub requires_approval: bool,
    pub approver_roles: Vec<String>,
    pub default_rule_applied: bool,
}

impl From<RiskAssessment> for RiskAssessmentType {
    fn from(risk: RiskAssessment) -> Self {
        RiskAssessmentType {
            framework_id: risk.framework_id,
            framework_version: risk.framework_version as i32,
            impact_level: risk.impact_level as i32,
            likelihood_level: risk.likelihood_level as i32,
            numerical_score: risk.numerical_score as i32,
            risk_level: risk.risk_level.to_string(),
            requires_approval: risk.requires_approval,
            approver_roles: risk.approver_roles,
            default_rule_applied: risk.default_rule_applied,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AttackStepType {
    pub step_id: String,
    pub component_id: String,
    pub step_type: String,
    pub order: i32,
    pub access_point: String,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub vulnerability_ids: Vec<String>,
    pub threat_ids: Vec<String>,
    pub probability: f64,
}

impl From<AttackStep> for AttackStepType {
    fn from(step: AttackStep) -> Self {
        AttackStepType {
            step_id: step.step_id,
            component_id: step.component_id,
            step_type: step.step_type.to_string(),
            order: step.order as i32,
            access_point: step.access_point,
            description: step.description,
            prerequisites: step.prerequisites,
            vulnerability_ids: step.vulnerability_ids,
            threat_ids: step.threat_ids,
            probability: step.probability,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AttackPathType {
    pub path_id: String,
    pub name: String,
    pub path_type: String,
    pub complexity: String,
    pub entry_point_id: String,
    pub target_id: String,
    pub success_likelihood: f64,
    pub impact: f64,
    pub risk_score: f64,
    pub hop_count: i32,
    pub required_assumptions: Vec<String>,
    pub feasibility_rating: i32,
    pub feasibility_level: String,
    pub risk: Option<RiskAssessmentType>,
    pub steps: Vec<AttackStepType>,
}

impl From<AttackPath> for AttackPathType {
    fn from(path: AttackPath) -> Self {
        AttackPathType {
            path_id: path.path_id,
            name: path.name,
            path_type: path.path_type.to_string(),
            complexity: path.complexity.to_string(),
            entry_point_id: path.entry_point_id,
            target_id: path.target_id,
            success_likelihood: path.success_likelihood,
            impact: path.impact,
            risk_score: path.risk_score,
            hop_count: path.hop_count as i32,
            required_assumptions: path.required_assumptions,
            feasibility_rating: path.feasibility.overall_rating as i32,
            feasibility_level: path.feasibility_level.to_string(),
            risk: path.risk.map(RiskAssessmentType::from),
            steps: path.steps.into_iter().map(AttackStepType::from).collect(),
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AttackChainType {
    pub chain_id: String,
    pub name: String,
    pub entry_point_id: String,
    pub final_target_id: String,
    pub total_steps: i32,
    pub complexity: String,
    pub risk_score: f64,
    pub success_likelihood: f64,
    pub feasibility_level: String,
    pub risk: Option<RiskAssessmentType>,
    pub paths: Vec<AttackPathType>,
}

impl From<AttackChain> for AttackChainType {
    fn from(chain: AttackChain) -> Self {
        AttackChainType {
            chain_id: chain.chain_id,
            name: chain.name,
            entry_point_id: chain.entry_point_id,
            final_target_id: chain.final_target_id,
            total_steps: chain.total_steps as i32,
            complexity: chain.complexity.to_string(),
            risk_score: chain.risk_score,
            success_likelihood: chain.success_likelihood,
            feasibility_level: chain.feasibility_level.to_string(),
            risk: chain.risk.map(RiskAssessmentType::from),
            paths: chain.paths.into_iter().map(AttackPathType::from).collect(),
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AttackPathPage {
    pub items: Vec<AttackPathType>,
    pub total: i32,
    pub skip: i32,
    pub limit: i32,
}

impl From<Page<AttackPath>> for AttackPathPage {
    fn from(page: Page<AttackPath>) -> Self {
        AttackPathPage {
            items: page.items.into_iter().map(AttackPathType::from).collect(),
            total: page.total as i32,
            skip: page.skip as i32,
            limit: page.limit as i32,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AttackChainPage {
    pub items: Vec<AttackChainType>,
    pub total: i32,
    pub skip: i32,
    pub limit: i32,
}

impl From<Page<AttackChain>> for AttackChainPage {
    fn from(page: Page<AttackChain>) -> Self {
        AttackChainPage {
            items: page.items.into_iter().map(AttackChainType::from).collect(),
            total: page.total as i32,
            skip: page.skip as i32,
            limit: page.limit as i32,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct RiskThresholdType {
    pub risk_level: String,
    pub max_acceptable_score: i32,
    pub requires_approval: bool,
    pub approver_roles: Vec<String>,
}

#[derive(SimpleObject, Clone)]
pub struct RiskFrameworkType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: i32,
    pub is_active: bool,
    pub fallback_to_default_rule: bool,
    pub matrix_cells: i32,
    pub risk_thresholds: Vec<RiskThresholdType>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RiskFramework> for RiskFrameworkType {
    fn from(framework: RiskFramework) -> Self {
        let definition = framework.definition;
        RiskFrameworkType {
            id: framework.id,
            name: definition.name,
            description: definition.description,
            version: framework.version as i32,
            is_active: framework.is_active,
            fallback_to_default_rule: definition.fallback_to_default_rule,
            matrix_cells: definition.risk_matrix.len() as i32,
            risk_thresholds: definition
                .risk_thresholds
                .into_iter()
                .map(|t| RiskThresholdType {
                    risk_level: t.risk_level.to_string(),
                    max_acceptable_score: t.max_acceptable_score as i32,
                    requires_approval: t.requires_approval,
                    approver_roles: t.approver_roles,
                })
                .collect(),
            created_at: framework.created_at.to_rfc3339(),
            updated_at: framework.updated_at.to_rfc3339(),
        }
    }
}

#[derive(InputObject)]
pub struct PageInput {
    pub analysis_id: Option<String>,
    pub skip: Option<i32>,
    pub limit: Option<i32>,
}

impl PageInput {
    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0).max(0) as usize
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit.map(|l| l.max(0) as usize)
    }
}
