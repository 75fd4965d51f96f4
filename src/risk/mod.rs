pub mod framework;
pub mod matrix;
pub mod registry;

pub use framework::{
    default_rule, FrameworkDefinition, ImpactDefinition, LikelihoodDefinition, RiskFramework,
    RiskLevel, RiskMatrixCell, RiskThreshold,
};
pub use matrix::{RiskAssessment, RiskMatrixEngine};
pub use registry::{FrameworkLoader, FrameworkRegistry};
