use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::types::{AccessPoint, AttackPathRequest, Component, KillChainStage};
use crate::error::{EngineError, EngineResult};
use crate::graph::rules::StepRules;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    SharedInterface, // Both ends declare the interface type
    ZoneAdjacency,   // Permitted by a trust-zone transition rule
}

/// One way of moving from a component into a neighbour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub access_point: String,
    pub requires_assumption: Option<String>,
    pub candidate_stage: KillChainStage,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub target: usize,
    /// Ordered: shared interfaces first, then zone rules
    pub channels: Vec<Channel>,
}

/// A requested entry point or target resolved onto a graph node.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub node: usize,
    pub access_point: Option<AccessPoint>,
}

#[derive(Debug, Clone)]
pub struct AttackGraph {
    components: Vec<Component>,
    ranks: Vec<u8>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<GraphEdge>>,
    pub entries: Vec<Endpoint>,
    pub targets: Vec<Endpoint>,
}

pub struct GraphBuilder<'a> {
    rules: &'a StepRules,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(rules: &'a StepRules) -> Self {
        GraphBuilder { rules }
    }

    /// Build the adjacency model for a request and resolve its entry points and targets.
    pub fn build(&self, request: &AttackPathRequest) -> EngineResult<AttackGraph> {
        let components: Vec<Component> = request
            .selected_components()
            .into_iter()
            .cloned()
            .collect();

        let index: HashMap<String, usize> = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let lowest = self.rules.lowest_rank();
        let ranks: Vec<u8> = components
            .iter()
            .map(|c| match self.rules.zone_rank(&c.trust_zone) {
                Some(rank) => rank,
                None => {
                    log::warn!(
                        "Unknown trust zone '{}' on component {}, treating as least trusted",
                        c.trust_zone,
                        c.id
                    );
                    lowest
                }
            })
            .collect();

        let interface_types: Vec<Vec<String>> =
            components.iter().map(|c| c.interface_types()).collect();

        let mut adjacency = Vec::with_capacity(components.len());
        for (from_idx, from) in components.iter().enumerate() {
            let mut edges = Vec::new();
            for (to_idx, to) in components.iter().enumerate() {
                if from_idx == to_idx {
                    continue;
                }
                let stage = self.rules.stage_for(from, ranks[from_idx], to, ranks[to_idx]);
                let mut channels = Vec::new();

                // Shared interfaces, in the order the destination declares them
                for interface in &interface_types[to_idx] {
                    if !interface_types[from_idx].contains(interface) {
                        continue;
                    }
                    let (label, requires) = match to.access_point_for(interface) {
                        Some(ap) => (ap.label().to_string(), ap.requires_assumption.clone()),
                        None => (interface.clone(), None),
                    };
                    channels.push(Channel {
                        kind: ChannelKind::SharedInterface,
                        access_point: label,
                        requires_assumption: requires,
                        candidate_stage: stage,
                    });
                }

                for transition in self.rules.transitions_between(&from.trust_zone, &to.trust_zone) {
                    channels.push(Channel {
                        kind: ChannelKind::ZoneAdjacency,
                        access_point: format!("zone:{}->{}", transition.from_zone, transition.to_zone),
                        requires_assumption: transition.requires_assumption.clone(),
                        candidate_stage: stage,
                    });
                }

                if !channels.is_empty() {
                    edges.push(GraphEdge {
                        target: to_idx,
                        channels,
                    });
                }
            }
            adjacency.push(edges);
        }

        let mut graph = AttackGraph {
            components,
            ranks,
            index,
            adjacency,
            entries: Vec::new(),
            targets: Vec::new(),
        };

        graph.entries = if request.entry_point_ids.is_empty() {
            graph.default_entries()
        } else {
            request
                .entry_point_ids
                .iter()
                .map(|id| graph.resolve_endpoint(id, "entry_point_ids"))
                .collect::<EngineResult<Vec<_>>>()?
        };

        graph.targets = if request.target_ids.is_empty() {
            vec![graph.resolve_endpoint(&request.primary_component_id, "primary_component_id")?]
        } else {
            request
                .target_ids
                .iter()
                .map(|id| graph.resolve_endpoint(id, "target_ids"))
                .collect::<EngineResult<Vec<_>>>()?
        };

        Ok(graph)
    }
}

impl AttackGraph {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component(&self, node: usize) -> &Component {
        &self.components[node]
    }

    pub fn rank(&self, node: usize) -> u8 {
        self.ranks[node]
    }

    pub fn node_of(&self, component_id: &str) -> Option<usize> {
        self.index.get(component_id).copied()
    }

    pub fn edges(&self, node: usize) -> &[GraphEdge] {
        &self.adjacency[node]
    }

    pub fn same_zone(&self, a: usize, b: usize) -> bool {
        self.components[a]
            .trust_zone
            .eq_ignore_ascii_case(&self.components[b].trust_zone)
    }

    /// Resolve a component id or an access-point id of a graph component.
    pub fn resolve_endpoint(&self, id: &str, field: &str) -> EngineResult<Endpoint> {
        if let Some(&node) = self.index.get(id) {
            return Ok(Endpoint {
                id: id.to_string(),
                node,
                access_point: None,
            });
        }

        for (node, component) in self.components.iter().enumerate() {
            if let Some(ap) = component.access_points.iter().find(|ap| ap.id == id) {
                return Ok(Endpoint {
                    id: id.to_string(),
                    node,
                    access_point: Some(ap.clone()),
                });
            }
        }

        Err(EngineError::validation(
            field,
            format!("{} does not reference a component in component_ids", id),
        ))
    }

    /// External access points, or the least trusted components when none are declared.
    fn default_entries(&self) -> Vec<Endpoint> {
        let external: Vec<Endpoint> = self
            .components
            .iter()
            .enumerate()
            .flat_map(|(node, c)| {
                c.access_points
                    .iter()
                    .filter(|ap| ap.external)
                    .map(move |ap| Endpoint {
                        id: ap.id.clone(),
                        node,
                        access_point: Some(ap.clone()),
                    })
            })
            .collect();

        if !external.is_empty() {
            return external;
        }

        let lowest = self.ranks.iter().copied().min().unwrap_or(0);
        self.components
            .iter()
            .enumerate()
            .filter(|(node, _)| self.ranks[*node] == lowest)
            .map(|(node, c)| Endpoint {
                id: c.id.clone(),
                node,
                access_point: None,
            })
            .collect()
    }
}
