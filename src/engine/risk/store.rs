//! Verification Store
//!
//! Keyed persistence for KYC verification records, injected into the risk service

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

use super::scoring::{KycSubject, RiskAssessment, RiskStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create store pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// A persisted verification. The raw ID number is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub country: String,
    pub id_number_hash: String,
    pub score: u8,
    pub status: RiskStatus,
    pub created_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(subject: &KycSubject, assessment: &RiskAssessment, user_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            country: subject.country.trim().to_ascii_uppercase(),
            id_number_hash: hash_id_number(&subject.id_number),
            score: assessment.score,
            status: assessment.status,
            created_at: Utc::now(),
        }
    }
}

fn hash_id_number(id_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id_number.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub trait VerificationStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<VerificationRecord>, StoreError>;

    /// Insert or replace by id
    fn put(&self, record: &VerificationRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, VerificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VerificationStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<VerificationRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: &VerificationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        Ok(records.remove(id).is_some())
    }
}

/// SQLite store with connection pooling
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kyc_verifications (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                country TEXT NOT NULL,
                id_number_hash TEXT NOT NULL,
                score INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

fn parse_status(id: &str, status: &str) -> Result<RiskStatus, StoreError> {
    match status {
        "approved" => Ok(RiskStatus::Approved),
        "review" => Ok(RiskStatus::Review),
        "rejected" => Ok(RiskStatus::Rejected),
        other => Err(StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("unknown status `{}`", other),
        }),
    }
}

impl VerificationStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<VerificationRecord>, StoreError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, country, id_number_hash, score, status, created_at
                 FROM kyc_verifications WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, user_id, country, id_number_hash, score, status, created_at)) = row else {
            return Ok(None);
        };

        let score = u8::try_from(score)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| StoreError::Corrupt {
                id: id.clone(),
                reason: format!("score {} out of range", score),
            })?;
        let status = parse_status(&id, &status)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Corrupt {
                id: id.clone(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(Some(VerificationRecord {
            id,
            user_id,
            country,
            id_number_hash,
            score,
            status,
            created_at,
        }))
    }

    fn put(&self, record: &VerificationRecord) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO kyc_verifications
                (id, user_id, country, id_number_hash, score, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.user_id,
                record.country,
                record.id_number_hash,
                record.score as i64,
                record.status.as_str(),
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let affected = conn.execute("DELETE FROM kyc_verifications WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}
