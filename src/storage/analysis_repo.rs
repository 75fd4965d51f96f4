use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use crate::analysis::types::{AnalysisResult, AttackChain, AttackPath};
use crate::storage::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: String,
    pub fingerprint: String,
    pub framework_id: String,
    pub framework_version: u32,
    pub total_paths: usize,
    pub total_chains: usize,
    pub created_at: String,
}

/// Persists analysis results. Paths and chains are kept as JSON documents
/// alongside the columns used for lookup and ordering.
#[derive(Clone)]
pub struct AnalysisRepository {
    db: Database,
}

impl AnalysisRepository {
    pub fn new(db: Database) -> Self {
        AnalysisRepository { db }
    }

    /// Store a complete result atomically.
    pub fn store_result(
        &self,
        result: &AnalysisResult,
        fingerprint: &str,
        request_json: &str,
    ) -> Result<()> {
        let conn = self.db.get_connection();
        let mut conn = conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO analyses (
                id, fingerprint, framework_id, framework_version,
                total_paths, total_chains, request, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.analysis_id,
                fingerprint,
                result.framework_id,
                result.framework_version,
                result.total_paths as i64,
                result.total_chains as i64,
                request_json,
                result.created_at.to_rfc3339(),
            ],
        )?;

        for (position, path) in result.paths.iter().enumerate() {
            tx.execute(
                "INSERT INTO attack_paths (
                    id, analysis_id, position, entry_point_id, target_id, risk_score, document
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    path.path_id,
                    result.analysis_id,
                    position as i64,
                    path.entry_point_id,
                    path.target_id,
                    path.risk_score,
                    serde_json::to_string(path)?,
                ],
            )?;
        }

        for (position, chain) in result.chains.iter().enumerate() {
            tx.execute(
                "INSERT INTO attack_chains (
                    id, analysis_id, position, entry_point_id, final_target_id, risk_score, document
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    chain.chain_id,
                    result.analysis_id,
                    position as i64,
                    chain.entry_point_id,
                    chain.final_target_id,
                    chain.risk_score,
                    serde_json::to_string(chain)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_analysis(&self, analysis_id: &str) -> Result<Option<StoredAnalysis>> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let analysis = conn
            .query_row(
                "SELECT id, fingerprint, framework_id, framework_version,
                        total_paths, total_chains, created_at
                 FROM analyses WHERE id = ?1",
                params![analysis_id],
                |row| {
                    Ok(StoredAnalysis {
                        id: row.get(0)?,
                        fingerprint: row.get(1)?,
                        framework_id: row.get(2)?,
                        framework_version: row.get(3)?,
                        total_paths: row.get::<_, i64>(4)? as usize,
                        total_chains: row.get::<_, i64>(5)? as usize,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?;

        Ok(analysis)
    }

    /// Earlier analyses of an identical request, oldest first.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<String>> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id FROM analyses WHERE fingerprint = ?1 ORDER BY created_at, rowid",
        )?;
        let ids = stmt
            .query_map(params![fingerprint], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    pub fn list_paths(
        &self,
        analysis_id: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<AttackPath>, usize)> {
        let (documents, total) = self.list_documents("attack_paths", analysis_id, skip, limit)?;
        let paths = documents
            .iter()
            .map(|d| serde_json::from_str(d))
            .collect::<Result<Vec<AttackPath>, _>>()?;
        Ok((paths, total))
    }

    pub fn list_chains(
        &self,
        analysis_id: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<AttackChain>, usize)> {
        let (documents, total) = self.list_documents("attack_chains", analysis_id, skip, limit)?;
        let chains = documents
            .iter()
            .map(|d| serde_json::from_str(d))
            .collect::<Result<Vec<AttackChain>, _>>()?;
        Ok((chains, total))
    }

    pub fn get_path(&self, path_id: &str) -> Result<Option<AttackPath>> {
        match self.get_document("attack_paths", path_id)? {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    pub fn get_chain(&self, chain_id: &str) -> Result<Option<AttackChain>> {
        match self.get_document("attack_chains", chain_id)? {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    // `table` is always one of the two fixed table names above
    fn list_documents(
        &self,
        table: &str,
        analysis_id: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<String>, usize)> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE (?1 IS NULL OR analysis_id = ?1)",
                table
            ),
            params![analysis_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT d.document
             FROM {} d
             INNER JOIN analyses a ON d.analysis_id = a.id
             WHERE (?1 IS NULL OR d.analysis_id = ?1)
             ORDER BY a.created_at, a.rowid, d.position
             LIMIT ?2 OFFSET ?3",
            table
        ))?;
        // Saturate rather than wrap; a negative OFFSET reads as zero
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);
        let documents = stmt
            .query_map(params![analysis_id, limit, skip], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok((documents, total as usize))
    }

    fn get_document(&self, table: &str, id: &str) -> Result<Option<String>> {
        let conn = self.db.get_connection();
        let conn = conn.lock().unwrap();

        let document = conn
            .query_row(
                &format!("SELECT document FROM {} WHERE id = ?1", table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(document)
    }
}
