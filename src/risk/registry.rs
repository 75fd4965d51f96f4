use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::risk::framework::{FrameworkDefinition, RiskFramework};
use crate::storage::FrameworkRepository;

/// Stored risk frameworks plus an in-memory snapshot of the active one.
///
/// Analyses read the snapshot once at start. Every write takes the snapshot's
/// write guard first, so the stored active flag and the snapshot change together.
#[derive(Clone)]
pub struct FrameworkRegistry {
    repo: FrameworkRepository,
    active: Arc<RwLock<Arc<RiskFramework>>>,
}

impl FrameworkRegistry {
    /// Load the active framework, seeding the store when it is empty.
    pub fn new(repo: FrameworkRepository, seed: FrameworkDefinition) -> EngineResult<Self> {
        let active = match repo.get_active()? {
            Some(active) => active,
            None if repo.count()? == 0 => {
                seed.validate()?;
                let mut framework = RiskFramework::new(Uuid::new_v4().to_string(), seed);
                framework.is_active = true;
                repo.insert(&framework)?;
                log::info!(
                    "Seeded risk framework '{}' ({})",
                    framework.definition.name,
                    framework.id
                );
                framework
            }
            None => {
                let first = repo
                    .list()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| EngineError::not_found("risk framework", "active"))?;
                log::warn!("No active risk framework stored, activating {}", first.id);
                repo.set_active(&first.id)?;
                RiskFramework {
                    is_active: true,
                    ..first
                }
            }
        };

        log::info!(
            "Active risk framework: '{}' v{} ({})",
            active.definition.name,
            active.version,
            active.id
        );

        Ok(FrameworkRegistry {
            repo,
            active: Arc::new(RwLock::new(Arc::new(active))),
        })
    }

    /// Immutable snapshot of the active framework.
    pub fn active(&self) -> Arc<RiskFramework> {
        self.active.read().unwrap().clone()
    }

    pub fn list(&self) -> EngineResult<Vec<RiskFramework>> {
        Ok(self.repo.list()?)
    }

    pub fn get(&self, id: &str) -> EngineResult<RiskFramework> {
        self.repo
            .get(id)?
            .ok_or_else(|| EngineError::not_found("risk framework", id))
    }

    pub fn create(&self, definition: FrameworkDefinition, activate: bool) -> EngineResult<RiskFramework> {
        definition.validate()?;
        let framework = RiskFramework::new(Uuid::new_v4().to_string(), definition);
        self.repo.insert(&framework)?;
        log::info!("Created risk framework {} ('{}')", framework.id, framework.definition.name);

        if activate {
            self.set_active(&framework.id)
        } else {
            Ok(framework)
        }
    }

    /// Replace a framework's definition and bump its version.
    pub fn update(&self, id: &str, definition: FrameworkDefinition) -> EngineResult<RiskFramework> {
        definition.validate()?;

        let mut active = self.active.write().unwrap();
        let mut framework = self.get(id)?;
        framework.definition = definition;
        framework.version += 1;
        framework.updated_at = Utc::now();

        if !self.repo.update(&framework)? {
            return Err(EngineError::not_found("risk framework", id));
        }
        if framework.is_active {
            *active = Arc::new(framework.clone());
        }

        log::info!("Updated risk framework {} to v{}", framework.id, framework.version);
        Ok(framework)
    }

    pub fn delete(&self, id: &str) -> EngineResult<()> {
        let active = self.active.write().unwrap();
        if active.id == id {
            return Err(EngineError::FrameworkConflict(format!(
                "{} is the active framework; activate another one first",
                id
            )));
        }

        if !self.repo.delete(id)? {
            return Err(EngineError::not_found("risk framework", id));
        }
        log::info!("Deleted risk framework {}", id);
        Ok(())
    }

    /// Make `id` the only active framework and swap the snapshot.
    pub fn set_active(&self, id: &str) -> EngineResult<RiskFramework> {
        let mut active = self.active.write().unwrap();

        let mut framework = self.get(id)?;
        framework.definition.validate()?;

        if !self.repo.set_active(id)? {
            return Err(EngineError::not_found("risk framework", id));
        }
        framework.is_active = true;
        *active = Arc::new(framework.clone());

        log::info!(
            "Activated risk framework '{}' v{} ({})",
            framework.definition.name,
            framework.version,
            framework.id
        );
        Ok(framework)
    }
}

/// Reads seed framework definitions from YAML.
pub struct FrameworkLoader;

impl FrameworkLoader {
    pub fn load_from_file(path: &Path) -> Result<FrameworkDefinition> {
        let content = fs::read_to_string(path)?;
        let definition: FrameworkDefinition = serde_yaml::from_str(&content)?;
        Ok(definition)
    }

    /// Load from `path` when it exists, otherwise use the built-in definition.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<FrameworkDefinition> {
        match path {
            Some(p) if p.exists() => {
                log::info!("Loading risk framework seed from {}", p.display());
                Self::load_from_file(p)
            }
            Some(p) => {
                log::warn!("Risk framework seed {} not found, using built-in framework", p.display());
                Ok(FrameworkDefinition::builtin())
            }
            None => Ok(FrameworkDefinition::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn registry() -> FrameworkRegistry {
        let repo = FrameworkRepository::new(Database::in_memory().unwrap());
        FrameworkRegistry::new(repo, FrameworkDefinition::builtin()).unwrap()
    }

    fn named(name: &str) -> FrameworkDefinition {
        let mut definition = FrameworkDefinition::builtin();
        definition.name = name.to_string();
        definition
    }

    #[test]
    fn test_empty_store_is_seeded_and_active() {
        let registry = registry();
        let frameworks = registry.list().unwrap();
        assert_eq!(frameworks.len(), 1);
        assert!(frameworks[0].is_active);
        assert_eq!(registry.active().id, frameworks[0].id);
    }

    #[test]
    fn test_set_active_swaps_snapshot() {
        let registry = registry();
        let seeded = registry.active().id.clone();
        let second = registry.create(named("second"), false).unwrap();
        assert_eq!(registry.active().id, seeded);

        registry.set_active(&second.id).unwrap();
        assert_eq!(registry.active().id, second.id);

        let active: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .filter(|f| f.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }

    #[test]
    fn test_invalid_definition_is_rejected() {
        let registry = registry();
        let mut definition = named("broken");
        definition.risk_thresholds.clear();
        assert!(matches!(
            registry.create(definition, true),
            Err(EngineError::InvalidFramework(_))
        ));
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_active_is_a_conflict() {
        let registry = registry();
        let active = registry.active().id.clone();
        assert!(matches!(
            registry.delete(&active),
            Err(EngineError::FrameworkConflict(_))
        ));

        let other = registry.create(named("other"), false).unwrap();
        registry.delete(&other.id).unwrap();
        assert!(registry.get(&other.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_active_refreshes_snapshot() {
        let registry = registry();
        let id = registry.active().id.clone();
        let updated = registry.update(&id, named("renamed")).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(registry.active().version, 2);
        assert_eq!(registry.active().definition.name, "renamed");
    }

    #[test]
    fn test_unknown_framework_is_not_found() {
        let registry = registry();
        assert!(registry.set_active("missing").unwrap_err().is_not_found());
        assert!(registry.update("missing", named("x")).unwrap_err().is_not_found());
        assert!(registry.delete("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_load_seed_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
name: Two level
impact_definitions:
  - {{ category: safety, level: 1, label: Minor }}
  - {{ category: safety, level: 2, label: Severe }}
likelihood_definitions:
  - {{ level: 1, label: Unlikely }}
  - {{ level: 2, label: Likely }}
risk_thresholds:
  - {{ risk_level: low, max_acceptable_score: 1 }}
  - {{ risk_level: medium, max_acceptable_score: 2 }}
  - {{ risk_level: high, max_acceptable_score: 3 }}
  - {{ risk_level: critical, max_acceptable_score: 4, requires_approval: true, approver_roles: [ciso] }}
"#
        )
        .unwrap();

        let definition = FrameworkLoader::load_from_file(file.path()).unwrap();
        assert_eq!(definition.name, "Two level");
        assert!(definition.fallback_to_default_rule);
        assert!(definition.risk_matrix.is_empty());
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_missing_seed_falls_back_to_builtin() {
        let definition =
            FrameworkLoader::load_or_builtin(Some(Path::new("does/not/exist.yaml"))).unwrap();
        assert_eq!(definition, FrameworkDefinition::builtin());
    }
}
