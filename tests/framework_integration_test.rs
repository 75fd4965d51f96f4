use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tara_engine::analysis::{
    AnalysisService, AnalysisSettings, AttackPathAnalyzer, AttackPathRequest, Component,
};
use tara_engine::config::DatabaseConfig;
use tara_engine::graph::DEFAULT_STEP_RULES;
use tara_engine::risk::{FrameworkDefinition, FrameworkRegistry, RiskLevel, RiskMatrixEngine};
use tara_engine::storage::{AnalysisRepository, Database, FrameworkRepository};
use tara_engine::EngineError;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Database {
    let path = dir.path().join("data").join("tara.db");
    Database::new(&DatabaseConfig {
        database_path: path.to_string_lossy().to_string(),
    })
    .unwrap()
}

fn registry(db: &Database) -> FrameworkRegistry {
    FrameworkRegistry::new(FrameworkRepository::new(db.clone()), FrameworkDefinition::builtin()).unwrap()
}

fn named(name: &str) -> FrameworkDefinition {
    let mut definition = FrameworkDefinition::builtin();
    definition.name = name.to_string();
    definition
}

fn active_count(registry: &FrameworkRegistry) -> usize {
    registry.list().unwrap().iter().filter(|f| f.is_active).count()
}

#[test]
fn test_active_framework_survives_restart() {
    let dir = TempDir::new().unwrap();

    let first_id = {
        let db = open(&dir);
        let registry = registry(&db);
        let created = registry.create(named("fleet policy"), true).unwrap();
        assert_eq!(registry.active().id, created.id);
        created.id
    };

    let db = open(&dir);
    let registry = registry(&db);
    assert_eq!(registry.list().unwrap().len(), 2);
    assert_eq!(registry.active().id, first_id);
    assert_eq!(registry.active().definition.name, "fleet policy");
    assert_eq!(active_count(&registry), 1);
}

#[test]
fn test_exactly_one_framework_is_active() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let registry = registry(&db);

    let ids: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|name| registry.create(named(name), false).unwrap().id)
        .collect();
    assert_eq!(active_count(&registry), 1);

    for id in &ids {
        registry.set_active(id).unwrap();
        assert_eq!(active_count(&registry), 1);
        assert_eq!(registry.active().id, *id);
        assert!(registry.get(id).unwrap().is_active);
    }

    assert!(registry.set_active("missing").unwrap_err().is_not_found());
    assert_eq!(registry.active().id, ids[2]);
}

#[test]
fn test_concurrent_activation_leaves_one_active() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let registry = registry(&db);

    let ids: Vec<String> = (0..4)
        .map(|i| registry.create(named(&format!("policy {}", i)), false).unwrap().id)
        .collect();

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    registry.set_active(&id).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let active: Vec<_> = registry
        .list()
        .unwrap()
        .into_iter()
        .filter(|f| f.is_active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, registry.active().id);
}

#[test]
fn test_active_framework_cannot_be_deleted() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let registry = registry(&db);

    let active_id = registry.active().id.clone();
    assert!(matches!(
        registry.delete(&active_id),
        Err(EngineError::FrameworkConflict(_))
    ));

    let other = registry.create(named("spare"), false).unwrap();
    registry.delete(&other.id).unwrap();
    assert!(registry.get(&other.id).unwrap_err().is_not_found());
}

#[test]
fn test_updating_active_framework_changes_new_assessments() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let registry = registry(&db);

    let before = registry.active();
    assert_eq!(RiskMatrixEngine::evaluate(&before, 3, 3).risk_level, RiskLevel::Medium);

    let mut definition = before.definition.clone();
    for cell in definition.risk_matrix.iter_mut() {
        if cell.impact == 3 && cell.likelihood == 3 {
            cell.risk_level = RiskLevel::High;
        }
    }
    let updated = registry.update(&before.id, definition).unwrap();
    assert_eq!(updated.version, before.version + 1);

    let after = registry.active();
    assert_eq!(after.version, updated.version);
    assert_eq!(RiskMatrixEngine::evaluate(&after, 3, 3).risk_level, RiskLevel::High);
    // Snapshots taken earlier are unaffected
    assert_eq!(RiskMatrixEngine::evaluate(&before, 3, 3).risk_level, RiskLevel::Medium);
}

#[test]
fn test_analysis_records_the_framework_it_used() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir);
    let registry = registry(&db);
    let service = AnalysisService::new(
        AttackPathAnalyzer::new(Arc::new(DEFAULT_STEP_RULES.clone()), AnalysisSettings::default()),
        AnalysisRepository::new(db.clone()),
        registry.clone(),
        Duration::from_secs(30),
    );

    let components: Vec<Component> = [("GW", "Boundary"), ("ECU", "Trusted")]
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
    let request = AttackPathRequest {
        primary_component_id: "ECU".to_string(),
        component_ids: components.iter().map(|c| c.id.clone()).collect(),
        components,
        entry_point_ids: vec!["GW".to_string()],
        target_ids: vec![],
        assumptions: vec![],
        constraints: vec![],
        threat_scenarios: vec![],
        vulnerability_ids: vec![],
        damage_scenarios: vec![],
        include_chains: false,
        max_depth: 3,
    };

    let first = service.analyze(&request).unwrap();
    let replacement = registry.create(named("replacement"), true).unwrap();
    let second = service.analyze(&request).unwrap();

    assert_ne!(first.framework_id, replacement.id);
    assert_eq!(second.framework_id, replacement.id);
    let stored = service.get_path(&second.paths[0].path_id).unwrap();
    assert_eq!(stored.risk.unwrap().framework_id, replacement.id);
}
