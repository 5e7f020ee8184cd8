//! permigrate command-line front end
//!
//! - `migrate`: run the engine against a tenant snapshot (offline replay)
//! - `remap`: translate one path from a source root to a destination root
//! - `diff`: list source groups missing on the destination

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use permigrate_core::{
    diff_groups, discover_groups, read_associated, Confirmation, ConfirmationRequest, GroupFilter,
    InMemoryTenant, MigrationConfig, MigrationEngine, RemoteAccess,
};
use permigrate_model::{AuditLog, RemapRule, Remapped};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn build_cli() -> Command {
    let tenant = Arg::new("tenant")
        .long("tenant")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Tenant snapshot (JSON)");
    let source = Arg::new("source")
        .long("source")
        .required(true)
        .help("Source root URL");
    let dest = Arg::new("dest")
        .long("dest")
        .required(true)
        .help("Destination root URL");

    Command::new("permigrate")
        .version(permigrate_core::VERSION)
        .about("Access-control migration between site hierarchies")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format (filter with RUST_LOG)"),
        )
        .subcommand(
            Command::new("migrate")
                .about("Migrate groups, memberships, and broken inheritance")
                .arg(tenant.clone())
                .arg(source.clone())
                .arg(dest.clone())
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Read and decide only; suppress every mutation"),
                )
                .arg(
                    Arg::new("exclude")
                        .long("exclude")
                        .action(ArgAction::Append)
                        .help("Container title to leave out of remediation (repeatable)"),
                )
                .arg(
                    Arg::new("no-subsites")
                        .long("no-subsites")
                        .action(ArgAction::SetTrue)
                        .help("Migrate the root pair only"),
                )
                .arg(
                    Arg::new("interactive")
                        .long("interactive")
                        .action(ArgAction::SetTrue)
                        .help("Ask before each node pair and container"),
                )
                .arg(
                    Arg::new("audit-out")
                        .long("audit-out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write audit records as JSON lines"),
                )
                .arg(
                    Arg::new("snapshot-out")
                        .long("snapshot-out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the resulting tenant snapshot"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("remap")
                .about("Remap a path from the source root to the destination root")
                .arg(Arg::new("path").required(true).help("Path to remap"))
                .arg(
                    Arg::new("source-root")
                        .long("source-root")
                        .required(true)
                        .help("Source root"),
                )
                .arg(
                    Arg::new("dest-root")
                        .long("dest-root")
                        .required(true)
                        .help("Destination root"),
                ),
        )
        .subcommand(
            Command::new("diff")
                .about("List source groups missing on the destination")
                .arg(tenant)
                .arg(source)
                .arg(dest),
        )
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Asks on stdin; anything but `y`/`yes` declines
struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        eprint!("{request} [y/N] ");
        std::io::stderr().flush().ok();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn load_tenant(path: &Path) -> Result<InMemoryTenant> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading tenant snapshot {}", path.display()))?;
    InMemoryTenant::from_json(&json)
        .with_context(|| format!("parsing tenant snapshot {}", path.display()))
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .with_context(|| format!("missing --{name}"))
}

fn migrate_config(args: &ArgMatches) -> Result<MigrationConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    if args.get_flag("dry-run") {
        config.dry_run = true;
    }
    if args.get_flag("no-subsites") {
        config.include_subsites = false;
    }
    if let Some(titles) = args.get_many::<String>("exclude") {
        config.excluded_containers.extend(titles.cloned());
    }
    config.validate()?;
    Ok(config)
}

/// Write `--audit-out` and `--snapshot-out` when requested
fn write_outputs(args: &ArgMatches, audit: &AuditLog, tenant: &InMemoryTenant) -> Result<()> {
    if let Some(path) = args.get_one::<PathBuf>("audit-out") {
        std::fs::write(path, audit.to_json_lines()?)
            .with_context(|| format!("writing audit log {}", path.display()))?;
    }
    if let Some(path) = args.get_one::<PathBuf>("snapshot-out") {
        std::fs::write(path, tenant.to_json()?)
            .with_context(|| format!("writing tenant snapshot {}", path.display()))?;
    }
    Ok(())
}

async fn run_migrate(args: &ArgMatches) -> Result<ExitCode> {
    let tenant_path = args
        .get_one::<PathBuf>("tenant")
        .context("missing --tenant")?;
    let tenant = load_tenant(tenant_path)?;
    let config = migrate_config(args)?;

    let mut engine = MigrationEngine::new(Arc::new(tenant.clone()), config);
    if args.get_flag("interactive") {
        engine = engine.with_confirmation(Arc::new(StdinConfirmation));
    }

    let report = match engine
        .run(required(args, "source")?, required(args, "dest")?)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            if let Some(audit) = e.audit() {
                write_outputs(args, audit, &tenant)?;
            }
            return Err(e.into());
        }
    };
    write_outputs(args, &report.audit, &tenant)?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let counts = report.counts();
        let mode = if report.dry_run { " (dry run)" } else { "" };
        println!("Run {}{mode}", report.run_id);
        for node in &report.nodes {
            println!(
                "  {} -> {}: {} of {} group(s) created, {} container(s) remediated",
                node.source,
                node.dest,
                node.groups_created,
                node.groups_requested,
                node.containers_applied
            );
        }
        for url in &report.unmatched_subsites {
            println!("  unmatched subsite: {url}");
        }
        println!(
            "Outcomes ({} total): {} success, {} failed, {} skipped, {} warning",
            counts.total(),
            counts.success,
            counts.failed,
            counts.skipped,
            counts.warning
        );
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn remap_line(path: &str, source_root: &str, dest_root: &str) -> (String, bool) {
    match RemapRule::new(source_root, dest_root).remap(path) {
        Remapped::Mapped(p) => (p, true),
        Remapped::Unmapped(p) => (p, false),
    }
}

fn run_remap(args: &ArgMatches) -> Result<ExitCode> {
    let (path, mapped) = remap_line(
        required(args, "path")?,
        required(args, "source-root")?,
        required(args, "dest-root")?,
    );
    println!("{path}");
    if !mapped {
        eprintln!("path is outside the source root; left unchanged");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_diff(args: &ArgMatches) -> Result<ExitCode> {
    let tenant_path = args
        .get_one::<PathBuf>("tenant")
        .context("missing --tenant")?;
    let tenant = load_tenant(tenant_path)?;
    let config = MigrationConfig::default();
    let throttle = config.throttle();
    let filter = GroupFilter::new(config.extra_system_group_prefixes.clone());

    let source = tenant.connect(required(args, "source")?).await?;
    let dest = tenant.connect(required(args, "dest")?).await?;
    let source_groups = discover_groups(source.as_ref(), &filter, &throttle).await?;
    let dest_groups = discover_groups(dest.as_ref(), &filter, &throttle).await?;
    let associated = read_associated(source.as_ref(), &throttle).await?;

    for title in diff_groups(&source_groups, &dest_groups, &associated) {
        println!("{title}");
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = build_cli().get_matches();
    let log_format = matches
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_tracing(log_format);

    match matches.subcommand() {
        Some(("migrate", args)) => run_migrate(args).await,
        Some(("remap", args)) => run_remap(args),
        Some(("diff", args)) => run_diff(args).await,
        _ => Ok(ExitCode::SUCCESS),
    }
}
