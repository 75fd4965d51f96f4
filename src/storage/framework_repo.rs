use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use crate::risk::framework::{FrameworkDefinition, RiskFramework};
use crate::storage::Database;

struct FrameworkRow {
    id: String,
    version: u32,
    is_active: bool,
    definition: String,
    created_at: String,
    updated_at: String,
}

impl FrameworkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FrameworkRow {
            id: row.get(0)?,
            version: row.get(1)?,
            is_active: row.get::<_, i64>(2)? != 0,
            definition: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_framework(self) -> Result<RiskFramework> {
        let definition: FrameworkDefinition = serde_json::from_str(&self.definition)
            .with_context(|| format!("corrupt definition for framework {}", self.id))?;
        Ok(RiskFramework {
            id: self.id,
            version: self.version,
            is_active: self.is_active,
            definition,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

const SELECT_COLUMNS: &str =
    "SELECT id, version, is_active, definition, created_at, updated_at FROM risk_frameworks";

#[derive(Clone)]
pub struct FrameworkRepository {
    db: Database,
}

impl FrameworkRepository {
    pub fn new(db: Database) -> Self {
        FrameworkRepository { db }
    }

    pub fn insert(&self, framework: &RiskFramework) -> Result<()> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        conn.execute(
            "INSERT INTO risk_frameworks (
                id, name, version, is_active, definition, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                framework.id,
                framework.definition.name,
                framework.version,
                framework.is_active as i64,
                serde_json::to_string(&framework.definition)?,
                framework.created_at.to_rfc3339(),
                framework.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Rewrite the definition and version. The active flag is left untouched.
    pub fn update(&self, framework: &RiskFramework) -> Result<bool> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE risk_frameworks
             SET name = ?2, version = ?3, definition = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                framework.id,
                framework.definition.name,
                framework.version,
                serde_json::to_string(&framework.definition)?,
                framework.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(changed > 0)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let changed = conn.execute("DELETE FROM risk_frameworks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: &str) -> Result<Option<RiskFramework>> {
        let row = {
            let conn = self.db.get_connection();
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    params![id],
                    FrameworkRow::from_row,
                )
                .optional()?;
            row
        };

        row.map(FrameworkRow::into_framework).transpose()
    }

    pub fn get_active(&self) -> Result<Option<RiskFramework>> {
        let row = {
            let conn = self.db.get_connection();
            let conn = conn.lock().unwrap();
            let row = conn
                .query_row(
                    &format!("{} WHERE is_active = 1 ORDER BY updated_at DESC LIMIT 1", SELECT_COLUMNS),
                    [],
                    FrameworkRow::from_row,
                )
                .optional()?;
            row
        };

        row.map(FrameworkRow::into_framework).transpose()
    }

    pub fn list(&self) -> Result<Vec<RiskFramework>> {
        let rows = {
            let conn = self.db.get_connection();
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(&format!("{} ORDER BY created_at, name", SELECT_COLUMNS))?;
            let rows = stmt
                .query_map([], FrameworkRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(FrameworkRow::into_framework).collect()
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM risk_frameworks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Deactivate every framework and activate `id` in one transaction.
    /// Returns false, with nothing changed, when `id` does not exist.
    pub fn set_active(&self, id: &str) -> Result<bool> {
        let conn = self.db.get_connection();
        let mut conn = conn.lock().unwrap();
        let tx = conn.transaction()?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE risk_frameworks SET is_active = 0, updated_at = ?1 WHERE is_active = 1 AND id != ?2",
            params![now, id],
        )?;
        let activated = tx.execute(
            "UPDATE risk_frameworks SET is_active = 1, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;

        if activated == 0 {
            tx.rollback()?;
            return Ok(false);
        }
        tx.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framework(id: &str) -> RiskFramework {
        let mut definition = FrameworkDefinition::builtin();
        definition.name = format!("Framework {}", id);
        RiskFramework::new(id.to_string(), definition)
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let repo = FrameworkRepository::new(Database::in_memory().unwrap());
        let original = framework("F1");
        repo.insert(&original).unwrap();

        let stored = repo.get("F1").unwrap().unwrap();
        assert_eq!(stored.definition, original.definition);
        assert_eq!(stored.version, 1);
        assert!(!stored.is_active);
        assert!(repo.get("F2").unwrap().is_none());
    }

    #[test]
    fn test_set_active_is_exclusive() {
        let repo = FrameworkRepository::new(Database::in_memory().unwrap());
        for id in ["F1", "F2", "F3"] {
            repo.insert(&framework(id)).unwrap();
        }

        assert!(repo.set_active("F1").unwrap());
        assert!(repo.set_active("F3").unwrap());
        assert_eq!(repo.list().unwrap().iter().filter(|f| f.is_active).count(), 1);
        assert_eq!(repo.get_active().unwrap().unwrap().id, "F3");

        // Unknown id leaves the current selection in place
        assert!(!repo.set_active("missing").unwrap());
        assert_eq!(repo.get_active().unwrap().unwrap().id, "F3");
    }

    #[test]
    fn test_update_and_delete() {
        let repo = FrameworkRepository::new(Database::in_memory().unwrap());
        let mut fw = framework("F1");
        repo.insert(&fw).unwrap();

        fw.version = 2;
        fw.definition.description = "revised".to_string();
        assert!(repo.update(&fw).unwrap());
        let stored = repo.get("F1").unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.definition.description, "revised");

        assert!(repo.delete("F1").unwrap());
        assert!(!repo.delete("F1").unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }
}
