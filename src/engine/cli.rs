//! Covenant CLI Module
//! Command-line interface for gate, rule and risk operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatter;

#[derive(Parser, Debug)]
#[command(name = "covenant")]
#[command(author = "Covenant Team")]
#[command(version)]
#[command(about = "Role gating, constitutional validation and KYC risk scoring", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config and permission table into the project directory
    Init {
        /// Service name
        #[arg(short, long)]
        name: String,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Start the gated API server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Check whether a role holds a permission
    Check {
        /// Role name (admin, instructor, student, guest)
        #[arg(short, long)]
        role: String,

        /// Permission string, e.g. courses:write
        #[arg(long)]
        permission: String,
    },

    /// Print the permission table
    Permissions {
        /// Only list the permissions of this role
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Run constitutional validation for an action
    Validate {
        /// Action name, e.g. enrollment:create
        #[arg(short, long)]
        action: String,

        /// Context (or result, with --post) as a JSON object
        #[arg(short, long, default_value = "{}")]
        context: String,

        /// Run post-validation and append the audit record
        #[arg(long)]
        post: bool,

        /// Acting user id
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Score a KYC subject without persisting it
    Risk {
        /// ISO 3166-1 alpha-2 country code
        #[arg(short, long)]
        country: String,

        /// Identity document number
        #[arg(short, long)]
        id_number: String,
    },

    /// Query the audit log
    Audit {
        /// Filter by user id
        #[arg(short, long)]
        user: Option<String>,

        /// Filter by action
        #[arg(short, long)]
        action: Option<String>,

        /// Show only the newest N records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show metrics and the health report
    Health,
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
