use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::analysis::feasibility::{FeasibilityLevel, FeasibilityRating};
use crate::error::{EngineError, EngineResult};
use crate::risk::RiskAssessment;

pub const DEFAULT_MAX_DEPTH: i64 = 5;

/// Fixed kill-chain taxonomy used to label attack steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KillChainStage {
    #[serde(rename = "Reconnaissance")]
    Reconnaissance,
    #[serde(rename = "Initial Access")]
    InitialAccess,
    #[serde(rename = "Execution")]
    Execution,
    #[serde(rename = "Persistence")]
    Persistence,
    #[serde(rename = "Privilege Escalation")]
    PrivilegeEscalation,
    #[serde(rename = "Defense Evasion")]
    DefenseEvasion,
    #[serde(rename = "Credential Access")]
    CredentialAccess,
    #[serde(rename = "Discovery")]
    Discovery,
    #[serde(rename = "Lateral Movement")]
    LateralMovement,
    #[serde(rename = "Collection")]
    Collection,
    #[serde(rename = "Exfiltration")]
    Exfiltration,
    #[serde(rename = "Impact")]
    Impact,
}

impl fmt::Display for KillChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KillChainStage::Reconnaissance => "Reconnaissance",
            KillChainStage::InitialAccess => "Initial Access",
            KillChainStage::Execution => "Execution",
            KillChainStage::Persistence => "Persistence",
            KillChainStage::PrivilegeEscalation => "Privilege Escalation",
            KillChainStage::DefenseEvasion => "Defense Evasion",
            KillChainStage::CredentialAccess => "Credential Access",
            KillChainStage::Discovery => "Discovery",
            KillChainStage::LateralMovement => "Lateral Movement",
            KillChainStage::Collection => "Collection",
            KillChainStage::Exfiltration => "Exfiltration",
            KillChainStage::Impact => "Impact",
        };
        write!(f, "{}", name)
    }
}

/// STRIDE threat category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Spoofing,
    Tampering,
    Repudiation,
    InformationDisclosure,
    DenialOfService,
    ElevationOfPrivilege,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Direct,
    MultiStep,
    Lateral,
    PrivilegeEscalation,
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathType::Direct => write!(f, "direct"),
            PathType::MultiStep => write!(f, "multi_step"),
            PathType::Lateral => write!(f, "lateral"),
            PathType::PrivilegeEscalation => write!(f, "privilege_escalation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// low: at most 2 hops and no assumptions; medium: at most 4 hops or a
    /// single assumption; high otherwise.
    pub fn classify(hop_count: usize, assumption_count: usize) -> Self {
        if hop_count <= 2 && assumption_count == 0 {
            Complexity::Low
        } else if hop_count <= 4 || assumption_count == 1 {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub interface_type: String,
    /// Reachable from outside the analysed system
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub requires_assumption: Option<String>,
}

impl AccessPoint {
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub component_type: String,
    pub trust_zone: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    /// Known vulnerabilities affecting this component
    #[serde(default)]
    pub vulnerability_ids: Vec<String>,
}

impl Component {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Lowercased interface types, declared access points first.
    pub fn interface_types(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut types = Vec::new();
        let declared = self
            .access_points
            .iter()
            .map(|ap| ap.interface_type.as_str())
            .chain(self.interfaces.iter().map(|i| i.as_str()));
        for interface in declared {
            let key = interface.trim().to_lowercase();
            if !key.is_empty() && seen.insert(key.clone()) {
                types.push(key);
            }
        }
        types
    }

    pub fn access_point_for(&self, interface_type: &str) -> Option<&AccessPoint> {
        self.access_points
            .iter()
            .find(|ap| ap.interface_type.eq_ignore_ascii_case(interface_type))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub id: String,
    #[serde(rename = "type")]
    pub assumption_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    #[serde(rename = "type")]
    pub constraint_type: String,
    #[serde(default)]
    pub description: String,
}

impl Constraint {
    /// `exclude_physical_access` excludes the `physical_access` assumption.
    pub fn excluded_assumption(&self) -> Option<&str> {
        self.constraint_type
            .strip_prefix("exclude_")
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatScenario {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub threat_type: ThreatType,
    pub likelihood: f64,
}

/// Consequence record for a compromised component, supplied by the asset store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageScenario {
    pub id: String,
    pub component_id: String,
    #[serde(default)]
    pub name: String,
    /// 0 to 10
    pub severity: f64,
}

fn default_max_depth() -> i64 {
    DEFAULT_MAX_DEPTH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPathRequest {
    pub primary_component_id: String,
    pub component_ids: Vec<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub entry_point_ids: Vec<String>,
    #[serde(default)]
    pub target_ids: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<Assumption>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub threat_scenarios: Vec<ThreatScenario>,
    #[serde(default)]
    pub vulnerability_ids: Vec<String>,
    #[serde(default)]
    pub damage_scenarios: Vec<DamageScenario>,
    #[serde(default)]
    pub include_chains: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
}

impl AttackPathRequest {
    /// Structural checks performed before any graph is built.
    pub fn validate(&self) -> EngineResult<()> {
        if self.component_ids.is_empty() {
            return Err(EngineError::validation(
                "component_ids",
                "at least one component is required",
            ));
        }
        if self.max_depth <= 0 {
            return Err(EngineError::validation(
                "max_depth",
                format!("must be positive, got {}", self.max_depth),
            ));
        }

        let mut seen = HashSet::new();
        for id in &self.component_ids {
            if !seen.insert(id.as_str()) {
                return Err(EngineError::validation(
                    "component_ids",
                    format!("duplicate component id {}", id),
                ));
            }
            if !self.components.iter().any(|c| &c.id == id) {
                return Err(EngineError::validation(
                    "components",
                    format!("no component record supplied for {}", id),
                ));
            }
        }

        if !seen.contains(self.primary_component_id.as_str()) {
            return Err(EngineError::validation(
                "primary_component_id",
                format!("{} is not in component_ids", self.primary_component_id),
            ));
        }

        for scenario in &self.threat_scenarios {
            if !(0.0..=1.0).contains(&scenario.likelihood) {
                return Err(EngineError::validation(
                    "threat_scenarios",
                    format!(
                        "likelihood of {} must be within 0..=1, got {}",
                        scenario.id, scenario.likelihood
                    ),
                ));
            }
        }

        for damage in &self.damage_scenarios {
            if !(0.0..=10.0).contains(&damage.severity) {
                return Err(EngineError::validation(
                    "damage_scenarios",
                    format!(
                        "severity of {} must be within 0..=10, got {}",
                        damage.id, damage.severity
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Components in `component_ids` order.
    pub fn selected_components(&self) -> Vec<&Component> {
        self.component_ids
            .iter()
            .filter_map(|id| self.components.iter().find(|c| &c.id == id))
            .collect()
    }

    /// Assumption types left after constraints have been applied.
    pub fn effective_assumptions(&self) -> HashSet<String> {
        let excluded = self.excluded_assumptions();
        self.assumptions
            .iter()
            .map(|a| a.assumption_type.clone())
            .filter(|t| !excluded.contains(t))
            .collect()
    }

    pub fn excluded_assumptions(&self) -> HashSet<String> {
        self.constraints
            .iter()
            .filter_map(|c| c.excluded_assumption())
            .map(|s| s.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackStep {
    pub step_id: String,
    pub component_id: String,
    pub step_type: KillChainStage,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub vulnerability_ids: Vec<String>,
    pub threat_ids: Vec<String>,
    /// 1-based, strictly increasing within a path
    pub order: u32,
    pub access_point: String,
    pub requires_assumption: Option<String>,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPath {
    pub path_id: String,
    pub name: String,
    pub path_type: PathType,
    pub complexity: Complexity,
    pub entry_point_id: String,
    pub target_id: String,
    pub success_likelihood: f64,
    pub impact: f64,
    pub risk_score: f64,
    pub hop_count: usize,
    pub required_assumptions: Vec<String>,
    pub steps: Vec<AttackStep>,
    pub feasibility: FeasibilityRating,
    pub feasibility_level: FeasibilityLevel,
    pub risk: Option<RiskAssessment>,
}

impl AttackPath {
    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.component_id.as_str())
    }

    /// Components strictly between the entry component and the target component.
    pub fn intermediate_steps(&self) -> &[AttackStep] {
        if self.steps.len() <= 2 {
            &[]
        } else {
            &self.steps[1..self.steps.len() - 1]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackChain {
    pub chain_id: String,
    pub name: String,
    pub paths: Vec<AttackPath>,
    pub entry_point_id: String,
    pub final_target_id: String,
    pub total_steps: usize,
    pub complexity: Complexity,
    pub risk_score: f64,
    pub success_likelihood: f64,
    pub feasibility_level: FeasibilityLevel,
    pub risk: Option<RiskAssessment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub paths: Vec<AttackPath>,
    pub chains: Vec<AttackChain>,
    pub total_paths: usize,
    pub total_chains: usize,
    pub framework_id: String,
    pub framework_version: u32,
    pub created_at: DateTime<Utc>,
}

/// One page of a lookup listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str) -> Component {
        Component {
            id: id.to_string(),
            name: String::new(),
            component_type: "ecu".to_string(),
            trust_zone: "Trusted".to_string(),
            interfaces: vec!["CAN".to_string()],
            access_points: vec![],
            vulnerability_ids: vec![],
        }
    }

    fn request() -> AttackPathRequest {
        AttackPathRequest {
            primary_component_id: "ECU-1".to_string(),
            component_ids: vec!["ECU-1".to_string(), "ECU-2".to_string()],
            components: vec![component("ECU-1"), component("ECU-2")],
            entry_point_ids: vec![],
            target_ids: vec![],
            assumptions: vec![],
            constraints: vec![],
            threat_scenarios: vec![],
            vulnerability_ids: vec![],
            damage_scenarios: vec![],
            include_chains: false,
            max_depth: 5,
        }
    }

    #[test]
    fn test_complexity_classification() {
        assert_eq!(Complexity::classify(1, 0), Complexity::Low);
        assert_eq!(Complexity::classify(2, 0), Complexity::Low);
        assert_eq!(Complexity::classify(3, 0), Complexity::Medium);
        assert_eq!(Complexity::classify(1, 1), Complexity::Medium);
        assert_eq!(Complexity::classify(7, 1), Complexity::Medium);
        assert_eq!(Complexity::classify(4, 2), Complexity::Medium);
        assert_eq!(Complexity::classify(5, 2), Complexity::High);
    }

    #[test]
    fn test_validate_rejects_empty_components() {
        let mut req = request();
        req.component_ids.clear();
        match req.validate() {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "component_ids"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_non_positive_depth() {
        let mut req = request();
        req.max_depth = 0;
        match req.validate() {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "max_depth"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_unknown_primary() {
        let mut req = request();
        req.primary_component_id = "GW-9".to_string();
        assert!(matches!(
            req.validate(),
            Err(EngineError::Validation { ref field, .. }) if field == "primary_component_id"
        ));
    }

    #[test]
    fn test_constraints_remove_assumptions() {
        let mut req = request();
        req.assumptions.push(Assumption {
            id: "A1".to_string(),
            assumption_type: "physical_access".to_string(),
            description: String::new(),
        });
        req.assumptions.push(Assumption {
            id: "A2".to_string(),
            assumption_type: "local_network_access".to_string(),
            description: String::new(),
        });
        req.constraints.push(Constraint {
            id: "C1".to_string(),
            constraint_type: "exclude_physical_access".to_string(),
            description: String::new(),
        });

        let effective = req.effective_assumptions();
        assert!(!effective.contains("physical_access"));
        assert!(effective.contains("local_network_access"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "primary_component_id": "ECU-1",
            "component_ids": ["ECU-1"],
            "components": [{"id": "ECU-1", "type": "ecu", "trust_zone": "Critical"}]
        }"#;
        let req: AttackPathRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.max_depth, DEFAULT_MAX_DEPTH);
        assert!(!req.include_chains);
        assert_eq!(req.components[0].component_type, "ecu");
    }

    #[test]
    fn test_stage_serializes_with_display_name() {
        let json = serde_json::to_string(&KillChainStage::PrivilegeEscalation).unwrap();
        assert_eq!(json, "\"Privilege Escalation\"");
    }
}
