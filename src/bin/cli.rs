//! Covenant CLI - Main entry point for CLI binary
//!
//! This binary provides the `covenant` tool for checking roles, running
//! constitutional validation, scoring KYC subjects and serving the gated API.

use anyhow::{bail, Context as _};
use clap::Parser;
use covenant_lib::engine::{
    api::{create_router, ApiState},
    audit::{AuditLog, AuditRecord},
    cli::{
        formatter::{health_label, short_hash, status_label, verdict, CliFormatter},
        Cli, Commands, OutputFormat,
    },
    config::{Config, ConfigError},
    constitution::{ConstitutionalValidator, Context},
    observability::{HealthReporter, Metrics},
    rbac::{PermissionTable, Role},
    risk::{KycSubject, RiskScorer},
    telemetry::init_tracing,
};
use serde_json::json;
use std::path::Path;

fn main() {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::Serve { .. }) {
        init_tracing("info,tower_http=debug");
    } else {
        init_tracing("warn");
    }

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name, force } => {
            cmd_init(&project_dir, &name, force, json_output)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&project_dir, host, port)?;
        }
        Commands::Check { role, permission } => {
            cmd_check(&project_dir, &role, &permission, json_output)?;
        }
        Commands::Permissions { role } => {
            cmd_permissions(&project_dir, role.as_deref(), json_output)?;
        }
        Commands::Validate {
            action,
            context,
            post,
            user,
        } => {
            cmd_validate(&project_dir, &action, &context, post, user.as_deref(), json_output)?;
        }
        Commands::Risk { country, id_number } => {
            cmd_risk(&project_dir, country, id_number, json_output)?;
        }
        Commands::Audit {
            user,
            action,
            limit,
        } => {
            cmd_audit(&project_dir, user.as_deref(), action.as_deref(), limit, json_output)?;
        }
        Commands::Health => {
            cmd_health(&project_dir, json_output)?;
        }
    }

    Ok(())
}

/// Project config, or the defaults when the directory was never initialized
fn load_config(project_dir: &Path) -> anyhow::Result<Config> {
    match Config::load(project_dir) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(path)) => {
            tracing::info!(path = %path.display(), "No config found, using defaults");
            Ok(Config::default_for_service("covenant"))
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_init(project_dir: &Path, name: &str, force: bool, json: bool) -> anyhow::Result<()> {
    if Config::load(project_dir).is_ok() && !force {
        bail!(
            "Project already initialized: {} (use --force to overwrite)",
            project_dir.display()
        );
    }

    std::fs::create_dir_all(project_dir)
        .with_context(|| format!("creating {}", project_dir.display()))?;

    let config = Config::default_for_service(name);
    config.save(project_dir)?;
    PermissionTable::default().save(project_dir)?;

    std::fs::create_dir_all(project_dir.join(&config.audit.dir))?;
    std::fs::create_dir_all(project_dir.join(".covenant"))?;

    let gitignore = "# Covenant\ndata/*.db\ndata/*.db-*\n.covenant/\n*.log\n";
    std::fs::write(project_dir.join(".gitignore"), gitignore)?;

    if json {
        println!(
            "{}",
            json!({
                "success": true,
                "project_dir": project_dir.display().to_string(),
                "name": name,
                "service_id": config.service.id,
            })
        );
    } else {
        CliFormatter::success(&format!("Initialized covenant service: {}", name));
        CliFormatter::kv("Directory", &project_dir.display().to_string());
        CliFormatter::kv("Service ID", &config.service.id);
        CliFormatter::blank();
        CliFormatter::info("Start the API with `covenant serve`");
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(project_dir: &Path, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(project_dir)?;
    let state = ApiState::from_config(project_dir, &config)?;
    let metrics = state.metrics.clone();
    let app = create_router(state);

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.api.host.clone()),
        port.unwrap_or(config.api.port)
    );

    CliFormatter::header("Covenant API Server");
    CliFormatter::kv("Service", &config.service.name);
    CliFormatter::kv("Listening", &format!("http://{}", addr));
    CliFormatter::kv("OpenAPI", &format!("http://{}/api/openapi.json", addr));
    CliFormatter::info("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    metrics.save(project_dir)?;
    tracing::info!("Metrics saved, server stopped");

    Ok(())
}

fn cmd_check(project_dir: &Path, role: &str, permission: &str, json: bool) -> anyhow::Result<()> {
    let role: Role = role.parse()?;
    let table = PermissionTable::load(project_dir)?;

    let known = table.contains(permission);
    let allowed = table.has_permission(role, permission);

    if json {
        println!(
            "{}",
            json!({
                "role": role,
                "permission": permission,
                "allowed": allowed,
                "known": known,
            })
        );
    } else {
        CliFormatter::kv(&format!("{} → {}", role, permission), &verdict(allowed));
        if !known {
            CliFormatter::warning(&format!("`{}` is not in the permission table", permission));
        }
    }

    Ok(())
}

fn cmd_permissions(project_dir: &Path, role: Option<&str>, json: bool) -> anyhow::Result<()> {
    let table = PermissionTable::load(project_dir)?;

    if let Some(role) = role {
        let role: Role = role.parse()?;
        let permissions = table.permissions_for(role);

        if json {
            println!("{}", json!({ "role": role, "permissions": permissions }));
        } else {
            CliFormatter::header(&format!("Permissions for {}", role));
            for permission in permissions {
                CliFormatter::item(permission);
            }
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    CliFormatter::header(&format!("Permission table (v{})", table.version));
    CliFormatter::table_header(&["permission", "roles"]);
    for (permission, roles) in &table.permissions {
        let roles = roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ");
        CliFormatter::table_row(&[permission.as_str(), roles.as_str()]);
    }

    Ok(())
}

fn cmd_validate(
    project_dir: &Path,
    action: &str,
    context: &str,
    post: bool,
    user: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let context: Context = serde_json::from_str(context).context("context must be a JSON object")?;
    let validator = ConstitutionalValidator::with_default_rules();

    if post {
        let config = load_config(project_dir)?;
        let outcome = validator.validate_post(action, &context, user);

        let audit = AuditLog::new(&project_dir.join(&config.audit.dir))?;
        audit.append(&outcome.audit_record)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_findings(outcome.compliant, &outcome.violations, &outcome.warnings, &outcome.faults);
            CliFormatter::kv("Result hash", short_hash(&outcome.audit_record.result_hash));
            CliFormatter::kv("Audit log", &audit.path().display().to_string());
        }
        return Ok(());
    }

    let result = validator.validate_pre(action, &context, user);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_findings(result.valid, &result.violations, &result.warnings, &result.faults);
    }

    Ok(())
}

fn print_findings(valid: bool, violations: &[String], warnings: &[String], faults: &[String]) {
    if valid {
        CliFormatter::success("Action complies with the constitution");
    } else {
        CliFormatter::error("Action violates the constitution");
    }
    for violation in violations {
        CliFormatter::item(violation);
    }
    for warning in warnings {
        CliFormatter::warning(warning);
    }
    if !faults.is_empty() {
        CliFormatter::warning(&format!("Rules faulted: {}", faults.join(", ")));
    }
}

fn cmd_risk(project_dir: &Path, country: String, id_number: String, json: bool) -> anyhow::Result<()> {
    let config = load_config(project_dir)?;
    let scorer = RiskScorer::new(config.risk);
    let assessment = scorer.assess(&KycSubject { country, id_number });

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        CliFormatter::header("KYC risk assessment");
        CliFormatter::kv("Score", &assessment.score.to_string());
        CliFormatter::kv("Status", &status_label(assessment.status));
        CliFormatter::divider();
        CliFormatter::kv("Country penalty", &assessment.country_penalty.to_string());
        CliFormatter::kv("ID penalty", &assessment.id_penalty.to_string());
        CliFormatter::kv("Variance", &assessment.variance.to_string());
    }

    Ok(())
}

fn cmd_audit(
    project_dir: &Path,
    user: Option<&str>,
    action: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(project_dir)?;
    let audit = AuditLog::new(&project_dir.join(&config.audit.dir))?;

    let mut records: Vec<AuditRecord> = audit
        .query_all()?
        .into_iter()
        .filter(|r| user.map_or(true, |u| r.user_id.as_deref() == Some(u)))
        .filter(|r| action.map_or(true, |a| r.action == a))
        .collect();

    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        CliFormatter::info("No audit records");
        return Ok(());
    }

    CliFormatter::header(&format!("Audit log ({} records)", records.len()));
    CliFormatter::table_header(&["timestamp", "action", "user", "compliant", "hash"]);
    for record in &records {
        let timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let compliant = record.compliant.map_or("-".to_string(), |c| c.to_string());
        CliFormatter::table_row(&[
            timestamp.as_str(),
            record.action.as_str(),
            record.user_id.as_deref().unwrap_or("-"),
            compliant.as_str(),
            short_hash(&record.result_hash),
        ]);
    }

    Ok(())
}

fn cmd_health(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let metrics = Metrics::load(project_dir)?;
    let report = HealthReporter::new().generate(&metrics);

    if json {
        println!("{}", json!({ "metrics": metrics, "health": report }));
        return Ok(());
    }

    CliFormatter::header("Covenant health");
    CliFormatter::kv("Overall", &health_label(report.overall_status));
    for (i, check) in report.checks.iter().enumerate() {
        CliFormatter::numbered_item(
            i + 1,
            &format!("{} [{}] {}", check.name, health_label(check.status), check.message),
        );
    }
    for warning in &report.warnings {
        CliFormatter::warning(warning);
    }

    CliFormatter::divider();
    let gate = &metrics.gate;
    let decisions = gate.allowed + gate.unauthenticated + gate.forbidden;
    CliFormatter::kv("Gate decisions", &decisions.to_string());
    CliFormatter::kv("Rule evaluations", &metrics.rules.evaluations.to_string());
    CliFormatter::kv("KYC verifications", &metrics.risk.total.to_string());

    Ok(())
}
