use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::analysis::analyzer::AttackPathAnalyzer;
use crate::analysis::cancel::CancellationToken;
use crate::analysis::types::{AnalysisResult, AttackChain, AttackPath, AttackPathRequest, Page};
use crate::error::{EngineError, EngineResult};
use crate::risk::FrameworkRegistry;
use crate::storage::AnalysisRepository;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// SHA-256 of the request's JSON form, hex encoded.
pub fn request_fingerprint(request_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT)
}

/// Runs analyses against the active framework and serves stored results.
#[derive(Clone)]
pub struct AnalysisService {
    analyzer: AttackPathAnalyzer,
    repo: AnalysisRepository,
    frameworks: FrameworkRegistry,
    timeout: Duration,
}

impl AnalysisService {
    pub fn new(
        analyzer: AttackPathAnalyzer,
        repo: AnalysisRepository,
        frameworks: FrameworkRegistry,
        timeout: Duration,
    ) -> Self {
        AnalysisService {
            analyzer,
            repo,
            frameworks,
            timeout,
        }
    }

    pub fn frameworks(&self) -> &FrameworkRegistry {
        &self.frameworks
    }

    /// A fresh token carrying the configured timeout.
    pub fn new_token(&self) -> CancellationToken {
        CancellationToken::with_timeout(self.timeout)
    }

    pub fn analyze(&self, request: &AttackPathRequest) -> EngineResult<AnalysisResult> {
        self.analyze_with_token(request, &self.new_token())
    }

    /// Nothing is persisted unless the whole run succeeds.
    pub fn analyze_with_token(
        &self,
        request: &AttackPathRequest,
        token: &CancellationToken,
    ) -> EngineResult<AnalysisResult> {
        let framework = self.frameworks.active();
        let result = self.analyzer.analyze(request, &framework, token)?;

        let request_json = serde_json::to_string(request).map_err(anyhow::Error::from)?;
        let fingerprint = request_fingerprint(&request_json);
        let previous = self.repo.find_by_fingerprint(&fingerprint)?;
        if let Some(last) = previous.last() {
            log::info!(
                "Analysis {} repeats an identical request ({} earlier run(s), latest {})",
                result.analysis_id,
                previous.len(),
                last
            );
        }

        self.repo.store_result(&result, &fingerprint, &request_json)?;
        Ok(result)
    }

    pub fn get_paths(
        &self,
        analysis_id: Option<&str>,
        skip: usize,
        limit: Option<usize>,
    ) -> EngineResult<Page<AttackPath>> {
        self.ensure_analysis(analysis_id)?;
        let limit = page_limit(limit);
        let (items, total) = self.repo.list_paths(analysis_id, skip, limit)?;
        Ok(Page {
            items,
            total,
            skip,
            limit,
        })
    }

    pub fn get_chains(
        &self,
        analysis_id: Option<&str>,
        skip: usize,
        limit: Option<usize>,
    ) -> EngineResult<Page<AttackChain>> {
        self.ensure_analysis(analysis_id)?;
        let limit = page_limit(limit);
        let (items, total) = self.repo.list_chains(analysis_id, skip, limit)?;
        Ok(Page {
            items,
            total,
            skip,
            limit,
        })
    }

    pub fn get_path(&self, path_id: &str) -> EngineResult<AttackPath> {
        self.repo
            .get_path(path_id)?
            .ok_or_else(|| EngineError::not_found("attack path", path_id))
    }

    pub fn get_chain(&self, chain_id: &str) -> EngineResult<AttackChain> {
        self.repo
            .get_chain(chain_id)?
            .ok_or_else(|| EngineError::not_found("attack chain", chain_id))
    }

    fn ensure_analysis(&self, analysis_id: Option<&str>) -> EngineResult<()> {
        match analysis_id {
            Some(id) if self.repo.get_analysis(id)?.is_none() => {
                Err(EngineError::not_found("analysis", id))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalysisSettings;
    use crate::analysis::types::Component;
    use crate::graph::DEFAULT_STEP_RULES;
    use crate::risk::FrameworkDefinition;
    use crate::storage::{Database, FrameworkRepository};
    use std::sync::Arc;

    fn service() -> AnalysisService {
        let db = Database::in_memory().unwrap();
        let frameworks = FrameworkRegistry::new(
            FrameworkRepository::new(db.clone()),
            FrameworkDefinition::builtin(),
        )
        .unwrap();
        AnalysisService::new(
            AttackPathAnalyzer::new(Arc::new(DEFAULT_STEP_RULES.clone()), AnalysisSettings::default()),
            AnalysisRepository::new(db),
            frameworks,
            Duration::from_secs(30),
        )
    }

    fn request() -> AttackPathRequest {
        let components: Vec<Component> = [("A", "Boundary"), ("B", "Boundary"), ("T", "Trusted")]
            .iter()
            .map(|(id, zone)| Component {
                id: id.to_string(),
                name: String::new(),
                component_type: "ecu".to_string(),
                trust_zone: zone.to_string(),
                interfaces: vec!["CAN".to_string()],
                access_points: vec![],
                vulnerability_ids: vec![],
            })
            .collect();
        AttackPathRequest {
            primary_component_id: "T".to_string(),
            component_ids: components.iter().map(|c| c.id.clone()).collect(),
            components,
            entry_point_ids: vec!["A".to_string(), "B".to_string()],
            target_ids: vec![],
            assumptions: vec![],
            constraints: vec![],
            threat_scenarios: vec![],
            vulnerability_ids: vec![],
            damage_scenarios: vec![],
            include_chains: true,
            max_depth: 4,
        }
    }

    #[test]
    fn test_results_are_persisted_and_retrievable() {
        let service = service();
        let result = service.analyze(&request()).unwrap();
        assert!(result.total_paths > 0);

        let page = service
            .get_paths(Some(result.analysis_id.as_str()), 0, None)
            .unwrap();
        assert_eq!(page.total, result.total_paths);
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);

        let first = &result.paths[0];
        assert_eq!(service.get_path(&first.path_id).unwrap(), *first);

        let chains = service.get_chains(Some(result.analysis_id.as_str()), 0, Some(5000)).unwrap();
        assert_eq!(chains.limit, MAX_PAGE_LIMIT);
        assert_eq!(chains.total, result.total_chains);
        let chain = &result.chains[0];
        assert_eq!(service.get_chain(&chain.chain_id).unwrap().paths.len(), chain.paths.len());
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let service = service();
        assert!(service.get_path("nope").unwrap_err().is_not_found());
        assert!(service.get_chain("nope").unwrap_err().is_not_found());
        assert!(service.get_paths(Some("nope"), 0, None).unwrap_err().is_not_found());
        assert_eq!(service.get_paths(None, 0, None).unwrap().total, 0);
    }

    #[test]
    fn test_cancelled_analysis_is_not_persisted() {
        let service = service();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            service.analyze_with_token(&request(), &token),
            Err(EngineError::Cancelled { .. })
        ));
        assert_eq!(service.get_paths(None, 0, None).unwrap().total, 0);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let json = serde_json::to_string(&request()).unwrap();
        assert_eq!(request_fingerprint(&json), request_fingerprint(&json));
        assert_eq!(request_fingerprint(&json).len(), 64);
        assert_ne!(request_fingerprint(&json), request_fingerprint("{}"));
    }
}
