//! Role-Based Access Control (RBAC) Permission Table
//!
//! Version-safe table format mapping permission keys to the roles allowed to use them

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Current permission table schema version
pub const POLICY_VERSION: u32 = 1;

/// File name of the table override inside the `access` directory
pub const POLICY_FILE: &str = "permissions.json";

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid permission table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Permission table version {found} is newer than supported {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Invalid permission key: {0}")]
    InvalidKey(String),
}

/// Caller roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(alias = "educator")]
    Instructor,
    Student,
    Guest,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Instructor, Role::Student, Role::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "instructor" | "educator" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            "guest" => Ok(Role::Guest),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Permission keys used by the platform services
pub mod permissions {
    pub const COURSES_READ: &str = "courses:read";
    pub const COURSES_WRITE: &str = "courses:write";
    pub const COURSES_DELETE: &str = "courses:delete";

    pub const ENROLLMENTS_CREATE: &str = "enrollments:create";
    pub const ENROLLMENTS_READ: &str = "enrollments:read";

    pub const ASSESSMENTS_WRITE: &str = "assessments:write";
    pub const ASSESSMENTS_SUBMIT: &str = "assessments:submit";
    pub const GRADES_READ: &str = "grades:read";
    pub const GRADES_WRITE: &str = "grades:write";
    pub const CREDENTIALS_ISSUE: &str = "credentials:issue";

    pub const USERS_READ: &str = "users:read";
    pub const USERS_MANAGE: &str = "users:manage";

    pub const CONSTITUTION_VALIDATE: &str = "constitution:validate";
    pub const KYC_SUBMIT: &str = "kyc:submit";
    pub const KYC_REVIEW: &str = "kyc:review";
    pub const AUDIT_READ: &str = "audit:read";

    pub const SYSTEM_CONFIGURE: &str = "system:configure";
    pub const SYSTEM_MONITOR: &str = "system:monitor";
}

/// The permission table document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionTable {
    /// Schema version for compatibility
    pub version: u32,

    /// Permission key -> roles allowed to use it
    pub permissions: BTreeMap<String, BTreeSet<Role>>,
}

impl Default for PermissionTable {
    fn default() -> Self {
        use permissions::*;
        use Role::*;

        let entries: &[(&str, &[Role])] = &[
            (COURSES_READ, &[Admin, Instructor, Student, Guest]),
            (COURSES_WRITE, &[Admin, Instructor]),
            (COURSES_DELETE, &[Admin]),
            (ENROLLMENTS_CREATE, &[Admin, Student]),
            (ENROLLMENTS_READ, &[Admin, Instructor, Student]),
            (ASSESSMENTS_WRITE, &[Admin, Instructor]),
            (ASSESSMENTS_SUBMIT, &[Student]),
            (GRADES_READ, &[Admin, Instructor, Student]),
            (GRADES_WRITE, &[Admin, Instructor]),
            (CREDENTIALS_ISSUE, &[Admin, Instructor]),
            (USERS_READ, &[Admin, Instructor]),
            (USERS_MANAGE, &[Admin]),
            (CONSTITUTION_VALIDATE, &[Admin, Instructor, Student]),
            (KYC_SUBMIT, &[Admin, Instructor, Student]),
            (KYC_REVIEW, &[Admin]),
            (AUDIT_READ, &[Admin]),
            (SYSTEM_CONFIGURE, &[Admin]),
            (SYSTEM_MONITOR, &[Admin]),
        ];

        let mut table = Self::empty();
        for (permission, roles) in entries {
            table
                .permissions
                .insert(permission.to_string(), roles.iter().copied().collect());
        }
        table
    }
}

impl PermissionTable {
    pub fn empty() -> Self {
        Self {
            version: POLICY_VERSION,
            permissions: BTreeMap::new(),
        }
    }

    /// Load the table override from `<dir>/access/permissions.json`, falling back to the built-in table
    pub fn load(project_dir: &Path) -> Result<Self, PolicyError> {
        let policy_path = project_dir.join("access").join(POLICY_FILE);

        if !policy_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&policy_path)?;
        let table: PermissionTable = serde_json::from_str(&content)?;

        if table.version > POLICY_VERSION {
            return Err(PolicyError::UnsupportedVersion {
                found: table.version,
                supported: POLICY_VERSION,
            });
        }

        if let Some(bad) = table.permissions.keys().find(|k| !is_valid_key(k)) {
            return Err(PolicyError::InvalidKey(bad.clone()));
        }

        Ok(table)
    }

    /// Save the table to `<dir>/access/permissions.json`
    pub fn save(&self, project_dir: &Path) -> Result<(), PolicyError> {
        let access_dir = project_dir.join("access");
        fs::create_dir_all(&access_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(access_dir.join(POLICY_FILE), content)?;
        Ok(())
    }

    /// Roles allowed to use a permission, `None` if the key is not in the table
    pub fn allowed_roles(&self, permission: &str) -> Option<&BTreeSet<Role>> {
        self.permissions.get(permission)
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.contains_key(permission)
    }

    /// Check if a role may use a permission. Unknown keys deny every role.
    pub fn has_permission(&self, role: Role, permission: &str) -> bool {
        self.allowed_roles(permission)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// All permission keys granted to a role
    pub fn permissions_for(&self, role: Role) -> Vec<&str> {
        self.permissions
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

/// `resource:action`, both halves non-empty
fn is_valid_key(key: &str) -> bool {
    match key.split_once(':') {
        Some((resource, action)) => {
            !resource.is_empty() && !action.is_empty() && !action.contains(':')
        }
        None => false,
    }
}
