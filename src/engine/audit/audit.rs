//! Immutable Audit Log
//!
//! Append-only, line-delimited JSON audit log of action outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Current audit log format version
pub const AUDIT_VERSION: u32 = 1;

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Format version for compatibility
    pub version: u32,

    /// Caller the action is attributed to
    pub user_id: Option<String>,

    /// Action performed
    pub action: String,

    pub timestamp: DateTime<Utc>,

    /// SHA-256 hex digest of the serialized action result
    pub result_hash: String,

    /// Whether post-validation found the result compliant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliant: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(action: &str, user_id: Option<&str>, result: &serde_json::Value) -> Self {
        Self {
            version: AUDIT_VERSION,
            user_id: user_id.map(str::to_string),
            action: action.to_string(),
            timestamp: Utc::now(),
            result_hash: Self::digest(result),
            compliant: None,
            metadata: None,
        }
    }

    pub fn with_compliance(mut self, compliant: bool) -> Self {
        self.compliant = Some(compliant);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// SHA-256 hex digest over the key-sorted serialization of `result`
    pub fn digest(result: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical(result).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

// serde_json may be built with `preserve_order`, so sort keys explicitly
fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}

/// The audit log manager
pub struct AuditLog {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Open (or create) the audit log inside `audit_dir`
    pub fn new(audit_dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(audit_dir)?;

        Ok(Self {
            log_path: audit_dir.join("audit.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append a record to the audit log
    pub fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Query all records
    pub fn query_all(&self) -> std::io::Result<Vec<AuditRecord>> {
        if !self.log_path.exists() {
            return Ok(vec![]);
        }

        let file = fs::File::open(&self.log_path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: AuditRecord = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

            // Version compatibility - older records are readable
            if record.version <= AUDIT_VERSION {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Query records for one action
    pub fn query_by_action(&self, action: &str) -> std::io::Result<Vec<AuditRecord>> {
        Ok(self
            .query_all()?
            .into_iter()
            .filter(|r| r.action == action)
            .collect())
    }

    /// Query records attributed to one user
    pub fn query_by_user(&self, user_id: &str) -> std::io::Result<Vec<AuditRecord>> {
        Ok(self
            .query_all()?
            .into_iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .collect())
    }

    /// Get record count
    pub fn count(&self) -> std::io::Result<usize> {
        if !self.log_path.exists() {
            return Ok(0);
        }

        let file = fs::File::open(&self.log_path)?;
        let reader = BufReader::new(file);
        let mut count = 0;
        for line in reader.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}
