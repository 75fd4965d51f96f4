use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::analysis::types::{Component, KillChainStage, ThreatType};

/// Built-in rules, used when no rules file is configured or found.
pub static DEFAULT_STEP_RULES: Lazy<StepRules> = Lazy::new(StepRules::builtin);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustZone {
    pub name: String,
    /// Higher rank means more trusted
    pub rank: u8,
}

/// Traversal permitted between two trust zones regardless of shared interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneTransition {
    pub from_zone: String,
    pub to_zone: String,
    #[serde(default)]
    pub requires_assumption: Option<String>,
}

/// Maps a hop to a kill-chain stage. Missing fields act as wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRule {
    #[serde(default)]
    pub from_zone: Option<String>,
    #[serde(default)]
    pub to_zone: Option<String>,
    #[serde(default)]
    pub component_type: Option<String>,
    pub step_type: KillChainStage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssumptionEffort {
    #[serde(default)]
    pub window_of_opportunity: u8,
    #[serde(default)]
    pub equipment: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRules {
    pub zones: Vec<TrustZone>,
    #[serde(default)]
    pub zone_transitions: Vec<ZoneTransition>,
    #[serde(default)]
    pub stage_rules: Vec<StageRule>,
    #[serde(default)]
    pub base_probabilities: HashMap<KillChainStage, f64>,
    #[serde(default = "default_base_probability")]
    pub default_base_probability: f64,
    #[serde(default)]
    pub threat_stages: HashMap<ThreatType, Vec<KillChainStage>>,
    #[serde(default = "default_threat_boost")]
    pub threat_boost: f64,
    #[serde(default = "default_vulnerability_discount")]
    pub vulnerability_discount: f64,
    #[serde(default)]
    pub assumption_effort: HashMap<String, AssumptionEffort>,
}

fn default_base_probability() -> f64 {
    0.6
}

fn default_threat_boost() -> f64 {
    0.5
}

fn default_vulnerability_discount() -> f64 {
    0.5
}

fn zone_matches(pattern: &Option<String>, zone: &str) -> bool {
    match pattern {
        Some(p) => p == "*" || p.eq_ignore_ascii_case(zone),
        None => true,
    }
}

impl StepRules {
    fn builtin() -> Self {
        use KillChainStage::*;

        let zones = [("Untrusted", 0), ("Boundary", 1), ("Trusted", 2), ("Critical", 3)]
            .iter()
            .map(|(name, rank)| TrustZone {
                name: name.to_string(),
                rank: *rank,
            })
            .collect();

        let zone_transitions = vec![
            ZoneTransition {
                from_zone: "Untrusted".to_string(),
                to_zone: "Boundary".to_string(),
                requires_assumption: Some("local_network_access".to_string()),
            },
            ZoneTransition {
                from_zone: "Boundary".to_string(),
                to_zone: "Critical".to_string(),
                requires_assumption: Some("physical_access".to_string()),
            },
        ];

        let stage_rules = vec![
            StageRule {
                from_zone: None,
                to_zone: None,
                component_type: Some("bus".to_string()),
                step_type: LateralMovement,
            },
            StageRule {
                from_zone: None,
                to_zone: None,
                component_type: Some("gateway".to_string()),
                step_type: DefenseEvasion,
            },
            StageRule {
                from_zone: None,
                to_zone: None,
                component_type: Some("hsm".to_string()),
                step_type: CredentialAccess,
            },
        ];

        let base_probabilities = [
            (Reconnaissance, 0.9),
            (InitialAccess, 0.8),
            (Execution, 0.7),
            (Persistence, 0.6),
            (PrivilegeEscalation, 0.5),
            (DefenseEvasion, 0.6),
            (CredentialAccess, 0.5),
            (Discovery, 0.8),
            (LateralMovement, 0.6),
            (Collection, 0.7),
            (Exfiltration, 0.6),
            (Impact, 0.7),
        ]
        .into_iter()
        .collect();

        let threat_stages = [
            (ThreatType::Spoofing, vec![InitialAccess, LateralMovement]),
            (ThreatType::Tampering, vec![Execution, Persistence, Impact]),
            (ThreatType::Repudiation, vec![DefenseEvasion]),
            (
                ThreatType::InformationDisclosure,
                vec![Discovery, CredentialAccess, Collection, Exfiltration],
            ),
            (ThreatType::DenialOfService, vec![Impact]),
            (ThreatType::ElevationOfPrivilege, vec![PrivilegeEscalation]),
        ]
        .into_iter()
        .collect();

        let assumption_effort = [
            ("physical_access", 4, 3),
            ("local_network_access", 2, 1),
            ("insider_access", 1, 0),
        ]
        .iter()
        .map(|(name, window, equipment)| {
            (
                name.to_string(),
                AssumptionEffort {
                    window_of_opportunity: *window,
                    equipment: *equipment,
                },
            )
        })
        .collect();

        StepRules {
            zones,
            zone_transitions,
            stage_rules,
            base_probabilities,
            default_base_probability: default_base_probability(),
            threat_stages,
            threat_boost: default_threat_boost(),
            vulnerability_discount: default_vulnerability_discount(),
            assumption_effort,
        }
    }

    pub fn zone_rank(&self, zone: &str) -> Option<u8> {
        self.zones
            .iter()
            .find(|z| z.name.eq_ignore_ascii_case(zone))
            .map(|z| z.rank)
    }

    pub fn lowest_rank(&self) -> u8 {
        self.zones.iter().map(|z| z.rank).min().unwrap_or(0)
    }

    pub fn transitions_between(&self, from_zone: &str, to_zone: &str) -> Vec<&ZoneTransition> {
        self.zone_transitions
            .iter()
            .filter(|t| t.from_zone.eq_ignore_ascii_case(from_zone) && t.to_zone.eq_ignore_ascii_case(to_zone))
            .collect()
    }

    /// Candidate stage for a hop from `from` into `to`. A hop into a higher
    /// trust rank is always privilege escalation. Other hops take the first
    /// matching mapping entry, then fall back to the rank comparison.
    pub fn stage_for(&self, from: &Component, from_rank: u8, to: &Component, to_rank: u8) -> KillChainStage {
        if to_rank > from_rank {
            return KillChainStage::PrivilegeEscalation;
        }

        let mapped = self.stage_rules.iter().find(|rule| {
            zone_matches(&rule.from_zone, &from.trust_zone)
                && zone_matches(&rule.to_zone, &to.trust_zone)
                && match &rule.component_type {
                    Some(t) => t == "*" || t.eq_ignore_ascii_case(&to.component_type),
                    None => true,
                }
        });

        if let Some(rule) = mapped {
            return rule.step_type;
        }

        if to_rank == from_rank {
            KillChainStage::LateralMovement
        } else {
            KillChainStage::Execution
        }
    }

    pub fn base_probability(&self, stage: KillChainStage) -> f64 {
        self.base_probabilities
            .get(&stage)
            .copied()
            .unwrap_or(self.default_base_probability)
    }

    pub fn threat_matches(&self, threat_type: ThreatType, stage: KillChainStage) -> bool {
        self.threat_stages
            .get(&threat_type)
            .map(|stages| stages.contains(&stage))
            .unwrap_or(false)
    }

    pub fn effort_for(&self, assumption: &str) -> AssumptionEffort {
        self.assumption_effort
            .get(assumption)
            .copied()
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(anyhow::anyhow!("step rules declare no trust zones"));
        }
        let probabilities = self
            .base_probabilities
            .iter()
            .map(|(stage, p)| (stage.to_string(), *p))
            .chain(std::iter::once(("default".to_string(), self.default_base_probability)));
        for (stage, p) in probabilities {
            if !(p > 0.0 && p <= 1.0) {
                return Err(anyhow::anyhow!("base probability for {} must be within (0, 1], got {}", stage, p));
            }
        }
        for (name, value) in [("threat_boost", self.threat_boost), ("vulnerability_discount", self.vulnerability_discount)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow::anyhow!("{} must be within 0..=1, got {}", name, value));
            }
        }
        Ok(())
    }
}

pub struct StepRuleLoader;

impl StepRuleLoader {
    /// Load rules from a specific file
    pub fn load_from_file(path: &Path) -> Result<StepRules> {
        let content = fs::read_to_string(path)?;
        let rules: StepRules = serde_json::from_str(&content)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load from `path` when it exists, otherwise fall back to the built-in rules.
    pub fn load_or_default(path: Option<&Path>) -> Result<StepRules> {
        match path {
            Some(p) if p.exists() => {
                log::info!("Loading step rules from {}", p.display());
                Self::load_from_file(p)
            }
            Some(p) => {
                log::warn!("Step rules file {} not found, using built-in rules", p.display());
                Ok(DEFAULT_STEP_RULES.clone())
            }
            None => Ok(DEFAULT_STEP_RULES.clone()),
        }
    }
}
