use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::analysis::paths::round_to;
use crate::analysis::types::{AttackChain, AttackPath, Complexity};
use crate::analysis::feasibility::FeasibilityLevel;

/// Groups attack paths that share an entry point, a target, or an
/// intermediate component into composite attack chains.
pub struct ChainAggregator;

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        DisjointSet {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index stays the root so group order follows path order
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

/// Most common value, ties broken by the lexicographically smallest.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(v, _)| v.to_string()).unwrap_or_default()
}

impl ChainAggregator {
    /// Only groups of two or more paths form a chain.
    pub fn aggregate(paths: &[AttackPath]) -> Vec<AttackChain> {
        let mut sets = DisjointSet::new(paths.len());
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (i, path) in paths.iter().enumerate() {
            let keys = std::iter::once(format!("entry:{}", path.entry_point_id))
                .chain(std::iter::once(format!("target:{}", path.target_id)))
                .chain(
                    path.intermediate_steps()
                        .iter()
                        .map(|s| format!("via:{}", s.component_id)),
                );
            for key in keys {
                match first_seen.get(&key) {
                    Some(&other) => sets.union(other, i),
                    None => {
                        first_seen.insert(key, i);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..paths.len() {
            let root = sets.find(i);
            groups.entry(root).or_default().push(i);
        }

        groups
            .into_values()
            .filter(|members| members.len() >= 2)
            .map(|members| {
                let member_paths: Vec<AttackPath> =
                    members.iter().map(|&i| paths[i].clone()).collect();
                Self::build_chain(member_paths)
            })
            .collect()
    }

    fn build_chain(paths: Vec<AttackPath>) -> AttackChain {
        let entry_point_id = most_common(paths.iter().map(|p| p.entry_point_id.as_str()));
        let final_target_id = most_common(paths.iter().map(|p| p.target_id.as_str()));

        // Shared hops are counted once per member path
        let total_steps = paths.iter().map(|p| p.steps.len()).sum();
        let complexity = paths
            .iter()
            .map(|p| p.complexity)
            .max()
            .unwrap_or(Complexity::Low);
        let risk_score = paths.iter().map(|p| p.risk_score).fold(0.0, f64::max);
        let failure: f64 = paths
            .iter()
            .map(|p| 1.0 - p.success_likelihood)
            .product();
        let feasibility_level = paths
            .iter()
            .map(|p| p.feasibility_level)
            .max()
            .unwrap_or(FeasibilityLevel::VeryLow);

        AttackChain {
            chain_id: Uuid::new_v4().to_string(),
            name: format!(
                "{} -> {} ({} paths)",
                entry_point_id,
                final_target_id,
                paths.len()
            ),
            entry_point_id,
            final_target_id,
            total_steps,
            complexity,
            risk_score,
            success_likelihood: round_to(1.0 - failure, 4),
            feasibility_level,
            paths,
            risk: None,
        }
    }
}
