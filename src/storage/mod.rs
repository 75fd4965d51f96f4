use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use crate::config::DatabaseConfig;

pub mod analysis_repo;
pub mod framework_repo;
pub use analysis_repo::{AnalysisRepository, StoredAnalysis};
pub use framework_repo::FrameworkRepository;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        // Ensure data directory exists
        if let Some(parent) = Path::new(&config.database_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.database_path)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and one-off tools.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        // One row per successful analysis run
        conn.execute(
            "CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                framework_id TEXT NOT NULL,
                framework_version INTEGER NOT NULL,
                total_paths INTEGER NOT NULL,
                total_chains INTEGER NOT NULL,
                request TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Attack paths, stored as JSON documents
        conn.execute(
            "CREATE TABLE IF NOT EXISTS attack_paths (
                id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                entry_point_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                risk_score REAL NOT NULL,
                document TEXT NOT NULL,
                FOREIGN KEY (analysis_id) REFERENCES analyses(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS attack_chains (
                id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                entry_point_id TEXT NOT NULL,
                final_target_id TEXT NOT NULL,
                risk_score REAL NOT NULL,
                document TEXT NOT NULL,
                FOREIGN KEY (analysis_id) REFERENCES analyses(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Risk frameworks: metadata columns plus the definition as JSON
        conn.execute(
            "CREATE TABLE IF NOT EXISTS risk_frameworks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_analyses_fingerprint ON analyses(fingerprint)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attack_paths_analysis ON attack_paths(analysis_id, position)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_attack_chains_analysis ON attack_chains(analysis_id, position)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_risk_frameworks_active ON risk_frameworks(is_active)",
            [],
        )?;

        Ok(())
    }

    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let config = DatabaseConfig {
            database_path: db_path.to_str().unwrap().to_string(),
        };

        let db = Database::new(&config).unwrap();
        assert!(db_path.exists());

        let conn = db.get_connection();
        let conn = conn.lock().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('analyses', 'attack_paths', 'attack_chains', 'risk_frameworks')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_schema_init_is_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            database_path: temp_dir.path().join("test.db").to_str().unwrap().to_string(),
        };
        Database::new(&config).unwrap();
        assert!(Database::new(&config).is_ok());
    }
}
