pub mod graph;
pub mod rules;

pub use graph::{AttackGraph, Channel, ChannelKind, Endpoint, GraphBuilder, GraphEdge};
pub use rules::{AssumptionEffort, StageRule, StepRuleLoader, StepRules, TrustZone, ZoneTransition, DEFAULT_STEP_RULES};
