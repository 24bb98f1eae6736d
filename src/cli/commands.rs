//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, instrument};

use crate::application::services::{DiagramReport, DiagramRequest};
use crate::cli::args::{Cli, Commands, ConfigCommands, PlotArgs};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{expand_path, global_config_path, Settings};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

/// Run the parsed command line.
pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Plot(args)) => cmd_plot(cli.config.as_deref(), args),
        Some(Commands::Config { command }) => cmd_config(cli.config.as_deref(), command),
        Some(Commands::Completion { shell }) => cmd_completion(*shell),
        None => cmd_plot(cli.config.as_deref(), &cli.plot),
    }
}

/// Connection and output parameters after merging flags over settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotPlan {
    pub apic: String,
    pub user: String,
    pub password: String,
    pub request: DiagramRequest,
}

/// Merge CLI flags over loaded settings. Flags win; missing credentials are a usage error.
pub fn plan_plot(settings: &mut Settings, args: &PlotArgs) -> CliResult<PlotPlan> {
    if let Some(secs) = args.timeout {
        settings.timeout_secs = secs;
    }
    let apic = args
        .apic
        .clone()
        .or_else(|| settings.apic.clone())
        .ok_or_else(|| usage("APIC URL required: set -a/--apic, ACIPLOT_APIC or 'apic'"))?;
    let user = args
        .user
        .clone()
        .or_else(|| settings.user.clone())
        .ok_or_else(|| usage("APIC user required: set -u/--user, ACIPLOT_USER or 'user'"))?;
    let password = args
        .password
        .clone()
        .ok_or_else(|| usage("APIC password required: use -p/--password or ACIPLOT_PASSWORD"))?;

    let destination = args
        .output
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(|| settings.output.clone());

    Ok(PlotPlan {
        apic,
        user,
        password,
        request: DiagramRequest {
            tenant: args.tenant.clone(),
            destination,
            engine: args.engine.unwrap_or(settings.engine),
        },
    })
}

fn usage(message: &str) -> CliError {
    CliError::Usage(message.to_string())
}

#[instrument(skip(args))]
fn cmd_plot(config: Option<&Path>, args: &PlotArgs) -> CliResult<()> {
    let mut settings = Settings::load(config)?;
    let plan = plan_plot(&mut settings, args)?;
    debug!("cmd_plot: {:?}", plan.request);

    let container = ServiceContainer::new(settings);
    let source = container.apic_session(container.apic_config(
        &plan.apic,
        &plan.user,
        &plan.password,
    ))?;
    let service = container.diagram_service(source);

    output::action("Connecting", &plan.apic);
    let report = service.run(&plan.request)?;
    print_report(&report, args.verbose);
    Ok(())
}

fn print_report(report: &DiagramReport, verbose: bool) {
    for tenant in &report.tenants {
        output::action("Processed tenant", tenant);
    }
    for warning in &report.warnings {
        output::warning(warning);
    }
    if verbose {
        output::info(&report.dot);
    }
    let stats = &report.stats;
    output::success(&format!(
        "Wrote {} with {}",
        report.destination.display(),
        report.engine
    ));
    output::detail(&format!(
        "{} tenants, {} nodes, {} edges, {} clusters, {} anchors, {} warnings",
        stats.tenants,
        stats.nodes,
        stats.edges,
        stats.clusters,
        stats.anchors,
        report.warnings.len()
    ));
}

fn cmd_config(config: Option<&Path>, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(config)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let path = config_file_path(config)?;
            let state = if path.exists() { "exists" } else { "not created" };
            output::info(&format!("{} ({})", path.display(), state));
        }
        ConfigCommands::Init { force } => {
            let path = config_file_path(config)?;
            write_template(&path, *force)?;
            output::success(&format!("Created {}", path.display()));
        }
    }
    Ok(())
}

fn config_file_path(config: Option<&Path>) -> CliResult<PathBuf> {
    config
        .map(Path::to_path_buf)
        .or_else(global_config_path)
        .ok_or_else(|| CliError::Usage("cannot determine config directory, use --config".into()))
}

/// Write the commented template, refusing to overwrite unless `force`.
pub fn write_template(path: &Path, force: bool) -> CliResult<()> {
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
    }
    std::fs::write(path, Settings::template())
        .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
    Ok(())
}

fn cmd_completion(shell: Shell) -> CliResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
