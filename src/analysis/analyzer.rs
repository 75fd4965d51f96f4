use chrono::Utc;
use rayon::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::analysis::cancel::CancellationToken;
use crate::analysis::chains::ChainAggregator;
use crate::analysis::paths::{PathGenerator, SearchSettings};
use crate::analysis::types::{AnalysisResult, AttackPath, AttackPathRequest};
use crate::config::AnalysisConfig;
use crate::error::EngineResult;
use crate::graph::{Endpoint, GraphBuilder, StepRules};
use crate::risk::{RiskFramework, RiskMatrixEngine};

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub max_parallelism: usize,
    pub max_paths_per_pair: usize,
    pub default_impact: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for AnalysisSettings {
    fn from(config: &AnalysisConfig) -> Self {
        AnalysisSettings {
            max_parallelism: config.max_parallelism.max(1),
            max_paths_per_pair: config.max_paths_per_pair.max(1),
            default_impact: config.default_impact,
        }
    }
}

/// Runs one analysis: graph, paths, chains, then risk scoring.
#[derive(Clone)]
pub struct AttackPathAnalyzer {
    rules: Arc<StepRules>,
    settings: AnalysisSettings,
}

impl AttackPathAnalyzer {
    pub fn new(rules: Arc<StepRules>, settings: AnalysisSettings) -> Self {
        AttackPathAnalyzer { rules, settings }
    }

    /// Synchronous and free of side effects. Any cancellation discards all partial work.
    pub fn analyze(
        &self,
        request: &AttackPathRequest,
        framework: &RiskFramework,
        token: &CancellationToken,
    ) -> EngineResult<AnalysisResult> {
        request.validate()?;
        token.check()?;

        let graph = GraphBuilder::new(&self.rules).build(request)?;
        let pairs: Vec<(&Endpoint, &Endpoint)> = graph
            .entries
            .iter()
            .flat_map(|entry| graph.targets.iter().map(move |target| (entry, target)))
            .collect();

        log::info!(
            "Analyzing {} component(s), {} entry/target pair(s), max depth {}",
            graph.len(),
            pairs.len(),
            request.max_depth
        );

        let generator = PathGenerator::new(
            &graph,
            &self.rules,
            request,
            SearchSettings {
                max_depth: request.max_depth as usize,
                max_paths_per_pair: self.settings.max_paths_per_pair,
                default_impact: self.settings.default_impact,
            },
        );

        let per_pair = self.run_pairs(&generator, &pairs, token)?;
        let mut paths: Vec<AttackPath> = per_pair.into_iter().flatten().collect();
        // Stable: discovery order is kept within a pair
        paths.sort_by(|a, b| {
            a.entry_point_id
                .cmp(&b.entry_point_id)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });

        for path in &mut paths {
            path.risk = Some(RiskMatrixEngine::assess_path(framework, path));
        }

        let mut chains = if request.include_chains {
            ChainAggregator::aggregate(&paths)
        } else {
            Vec::new()
        };
        for chain in &mut chains {
            chain.risk = Some(RiskMatrixEngine::assess_chain(framework, chain));
        }

        token.check()?;

        let result = AnalysisResult {
            analysis_id: Uuid::new_v4().to_string(),
            total_paths: paths.len(),
            total_chains: chains.len(),
            paths,
            chains,
            framework_id: framework.id.clone(),
            framework_version: framework.version,
            created_at: Utc::now(),
        };

        log::info!(
            "Analysis {} complete: {} path(s), {} chain(s)",
            result.analysis_id,
            result.total_paths,
            result.total_chains
        );
        Ok(result)
    }

    fn run_pairs(
        &self,
        generator: &PathGenerator<'_>,
        pairs: &[(&Endpoint, &Endpoint)],
        token: &CancellationToken,
    ) -> EngineResult<Vec<Vec<AttackPath>>> {
        if pairs.len() <= 1 || self.settings.max_parallelism <= 1 {
            return pairs
                .iter()
                .map(|(entry, target)| generator.generate_pair(entry, target, token))
                .collect();
        }

        let threads = self.settings.max_parallelism.min(pairs.len());
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| {
                pairs
                    .par_iter()
                    .map(|(entry, target)| generator.generate_pair(entry, target, token))
                    .collect()
            }),
            Err(e) => {
                log::warn!("Failed to build worker pool ({}), searching sequentially", e);
                pairs
                    .iter()
                    .map(|(entry, target)| generator.generate_pair(entry, target, token))
                    .collect()
            }
        }
    }
}
