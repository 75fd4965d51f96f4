use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::analysis::cancel::CancellationToken;
use crate::analysis::feasibility::{FeasibilityRating, PathEffort};
use crate::analysis::types::{
    AttackPath, AttackPathRequest, AttackStep, Complexity, KillChainStage, PathType,
};
use crate::error::EngineResult;
use crate::graph::{AttackGraph, Channel, Endpoint, StepRules};

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub max_depth: usize,
    pub max_paths_per_pair: usize,
    pub default_impact: f64,
}

/// A partial route: `channels[i]` leads from `nodes[i]` into `nodes[i + 1]`.
#[derive(Debug, Clone)]
struct Route<'g> {
    nodes: Vec<usize>,
    channels: Vec<&'g Channel>,
}

impl<'g> Route<'g> {
    fn start(node: usize) -> Self {
        Route {
            nodes: vec![node],
            channels: Vec::new(),
        }
    }

    fn last(&self) -> usize {
        self.nodes[self.nodes.len() - 1]
    }

    fn hops(&self) -> usize {
        self.channels.len()
    }

    fn extend(&self, node: usize, channel: &'g Channel) -> Self {
        let mut next = self.clone();
        next.nodes.push(node);
        next.channels.push(channel);
        next
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Enumerates simple attack paths between resolved entry/target pairs.
pub struct PathGenerator<'a> {
    graph: &'a AttackGraph,
    rules: &'a StepRules,
    request: &'a AttackPathRequest,
    settings: SearchSettings,
    allowed: HashSet<String>,
    excluded: HashSet<String>,
    known_vulnerabilities: HashSet<&'a str>,
    impacts: HashMap<&'a str, f64>,
}

impl<'a> PathGenerator<'a> {
    pub fn new(
        graph: &'a AttackGraph,
        rules: &'a StepRules,
        request: &'a AttackPathRequest,
        settings: SearchSettings,
    ) -> Self {
        let mut impacts: HashMap<&str, f64> = HashMap::new();
        for damage in &request.damage_scenarios {
            let entry = impacts.entry(damage.component_id.as_str()).or_insert(0.0);
            *entry = entry.max(damage.severity);
        }

        PathGenerator {
            graph,
            rules,
            request,
            settings,
            allowed: request.effective_assumptions(),
            excluded: request.excluded_assumptions(),
            known_vulnerabilities: request.vulnerability_ids.iter().map(|v| v.as_str()).collect(),
            impacts,
        }
    }

    /// A requirement-free channel is always usable; a gated one needs its
    /// assumption present and not excluded by a constraint.
    pub fn is_usable(&self, requirement: Option<&str>) -> bool {
        match requirement {
            None => true,
            Some(assumption) => {
                !self.excluded.contains(assumption) && self.allowed.contains(assumption)
            }
        }
    }

    /// Breadth-first enumeration of simple paths from `entry` to `target`.
    pub fn generate_pair(
        &self,
        entry: &Endpoint,
        target: &Endpoint,
        token: &CancellationToken,
    ) -> EngineResult<Vec<AttackPath>> {
        token.check()?;

        let ingress_requirement = entry
            .access_point
            .as_ref()
            .and_then(|ap| ap.requires_assumption.as_deref());
        if !self.is_usable(ingress_requirement) {
            log::debug!(
                "Entry point {} requires {:?}, which is unavailable",
                entry.id,
                ingress_requirement
            );
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut expansions = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back(Route::start(entry.node));

        while let Some(route) = queue.pop_front() {
            token.check()?;
            expansions += 1;

            let last = route.last();
            if last == target.node {
                found.push(self.build_path(entry, target, &route));
                if found.len() >= self.settings.max_paths_per_pair {
                    log::warn!(
                        "Path cap of {} reached for {} -> {}",
                        self.settings.max_paths_per_pair,
                        entry.id,
                        target.id
                    );
                    break;
                }
                continue;
            }
            if route.hops() >= self.settings.max_depth {
                continue;
            }

            for edge in self.graph.edges(last) {
                if route.nodes.contains(&edge.target) {
                    continue;
                }
                let usable = edge
                    .channels
                    .iter()
                    .find(|c| self.is_usable(c.requires_assumption.as_deref()));
                if let Some(channel) = usable {
                    queue.push_back(route.extend(edge.target, channel));
                }
            }
        }

        log::debug!(
            "{} -> {}: {} path(s) after {} expansion(s)",
            entry.id,
            target.id,
            found.len(),
            expansions
        );
        Ok(found)
    }

    fn build_path(&self, entry: &Endpoint, target: &Endpoint, route: &Route<'_>) -> AttackPath {
        let hop_count = route.hops();
        let mut steps = Vec::with_capacity(route.nodes.len());
        let mut required = BTreeSet::new();
        let mut success_likelihood = 1.0;
        let mut trust_increases = 0;
        let mut trust_drops = 0;
        let mut lateral = false;
        let mut discounted = false;

        for (i, &node) in route.nodes.iter().enumerate() {
            let component = self.graph.component(node);
            let mut prerequisites = Vec::new();

            let (stage, access_point, requires) = if i == 0 {
                let label = entry
                    .access_point
                    .as_ref()
                    .map(|ap| ap.label().to_string())
                    .unwrap_or_else(|| component.id.clone());
                let requires = entry
                    .access_point
                    .as_ref()
                    .and_then(|ap| ap.requires_assumption.clone());
                (KillChainStage::InitialAccess, label, requires)
            } else {
                let previous = route.nodes[i - 1];
                let channel = route.channels[i - 1];
                if self.graph.rank(node) > self.graph.rank(previous) {
                    trust_increases += 1;
                } else if self.graph.rank(node) < self.graph.rank(previous) {
                    trust_drops += 1;
                }
                if self.graph.same_zone(previous, node) {
                    lateral = true;
                }
                prerequisites.push(format!(
                    "foothold on {}",
                    self.graph.component(previous).id
                ));
                let stage = if i == route.nodes.len() - 1 {
                    KillChainStage::Impact
                } else {
                    channel.candidate_stage
                };
                (stage, channel.access_point.clone(), channel.requires_assumption.clone())
            };

            if let Some(assumption) = &requires {
                prerequisites.insert(0, assumption.clone());
                required.insert(assumption.clone());
            }

            let mut probability = self.rules.base_probability(stage);

            let matching: Vec<_> = self
                .request
                .threat_scenarios
                .iter()
                .filter(|t| self.rules.threat_matches(t.threat_type, stage))
                .collect();
            let strongest = matching.iter().map(|t| t.likelihood).fold(0.0, f64::max);
            probability = 1.0 - (1.0 - probability) * (1.0 - strongest * self.rules.threat_boost);

            let vulnerability_ids: Vec<String> = component
                .vulnerability_ids
                .iter()
                .filter(|v| self.known_vulnerabilities.contains(v.as_str()))
                .cloned()
                .collect();
            if !component.vulnerability_ids.is_empty() && vulnerability_ids.is_empty() {
                probability *= self.rules.vulnerability_discount;
                discounted = true;
            }

            success_likelihood *= probability;

            steps.push(AttackStep {
                step_id: Uuid::new_v4().to_string(),
                component_id: component.id.clone(),
                step_type: stage,
                description: format!("{} on {} via {}", stage, component.display_name(), access_point),
                prerequisites,
                vulnerability_ids,
                threat_ids: matching.iter().map(|t| t.id.clone()).collect(),
                order: (i + 1) as u32,
                access_point,
                requires_assumption: requires,
                probability: round_to(probability, 4),
            });
        }

        let required_assumptions: Vec<String> = required.into_iter().collect();
        let complexity = Complexity::classify(hop_count, required_assumptions.len());

        // Dropping trust without escalating counts as lateral spread
        let path_type = if hop_count <= 1 {
            PathType::Direct
        } else if steps
            .iter()
            .any(|s| s.step_type == KillChainStage::PrivilegeEscalation)
        {
            PathType::PrivilegeEscalation
        } else if lateral || trust_drops > 0 {
            PathType::Lateral
        } else {
            PathType::MultiStep
        };

        let target_component = self.graph.component(target.node);
        let impact = self
            .impacts
            .get(target_component.id.as_str())
            .copied()
            .unwrap_or(self.settings.default_impact)
            .clamp(0.0, 10.0);
        let success_likelihood = round_to(success_likelihood.clamp(0.0, 1.0), 4);
        let risk_score = round_to(success_likelihood * impact, 1).clamp(0.0, 10.0);

        let feasibility = FeasibilityRating::for_path(
            &PathEffort {
                hop_count,
                complexity: Some(complexity),
                trust_increases,
                required_assumptions: &required_assumptions,
                vulnerability_discounted: discounted,
            },
            self.rules,
        );

        AttackPath {
            path_id: Uuid::new_v4().to_string(),
            name: format!(
                "{} -> {} ({} hop{})",
                entry.id,
                target.id,
                hop_count,
                if hop_count == 1 { "" } else { "s" }
            ),
            path_type,
            complexity,
            entry_point_id: entry.id.clone(),
            target_id: target.id.clone(),
            success_likelihood,
            impact,
            risk_score,
            hop_count,
            required_assumptions,
            steps,
            feasibility_level: feasibility.level(),
            feasibility,
            risk: None,
        }
    }
}
