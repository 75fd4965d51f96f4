pub mod analyzer;
pub mod cancel;
pub mod chains;
pub mod feasibility;
pub mod paths;
pub mod service;
pub mod types;

pub use analyzer::{AnalysisSettings, AttackPathAnalyzer};
pub use cancel::CancellationToken;
pub use chains::ChainAggregator;
pub use feasibility::{FeasibilityLevel, FeasibilityRating, PathEffort};
pub use paths::{PathGenerator, SearchSettings};
pub use service::{request_fingerprint, AnalysisService, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use types::{
    AccessPoint, AnalysisResult, Assumption, AttackChain, AttackPath, AttackPathRequest,
    AttackStep, Complexity, Component, Constraint, DamageScenario, KillChainStage, Page, PathType,
    ThreatScenario, ThreatType,
};
