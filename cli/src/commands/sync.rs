use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::info;

use mealprep_core::agent::{
    AgentError, AgentHandle, AgentStatus, EnrichmentAgent, EnrichmentReport, SyncAgent,
    SyncCommand, SyncReport,
};
use mealprep_core::remote::Credentials;

use super::App;
use super::helpers::print_json;

pub(crate) struct SyncArgs {
    pub push: bool,
    pub no_enrich: bool,
    pub force: bool,
    pub offline: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct AgentOutcome<T> {
    status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> AgentOutcome<T> {
    fn from_result(result: Result<T, AgentError>) -> Self {
        let status = AgentStatus::of(&result);
        match result {
            Ok(report) => Self {
                status,
                report: Some(report),
                error: None,
            },
            Err(e) => Self {
                status,
                report: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn succeeded(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

#[derive(Serialize)]
struct SyncOutput {
    sync: AgentOutcome<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enrichment: Option<AgentOutcome<EnrichmentReport>>,
    stored_recipes: usize,
}

/// Start a sync (and, on pull, an enrichment agent alongside it) and wait
/// for both to finish.
pub(crate) fn cmd_sync(app: &App, credentials: Credentials, args: &SyncArgs) -> Result<()> {
    let command = if args.push {
        SyncCommand::Push
    } else {
        SyncCommand::Pull
    };

    // Fallible setup runs before the sync thread starts.
    let enrichment = if command == SyncCommand::Pull && !args.no_enrich {
        let agent = EnrichmentAgent::new(
            &app.surface,
            Arc::clone(&app.store),
            app.lookup(args.offline)?,
            args.force,
        )
        .with_poll_interval(app.config.enrich_interval);
        Some(agent)
    } else {
        None
    };
    let remote = app.remote()?;

    let sync = SyncAgent::new(&app.surface, Arc::clone(&app.store), remote, credentials, command)
        .spawn()?;

    let enrich = match enrichment.map(EnrichmentAgent::spawn).transpose() {
        Ok(handle) => handle,
        Err(e) => {
            // Let the pull finish before reporting.
            let _ = sync.join();
            return Err(e.into());
        }
    };

    if !args.json {
        eprintln!("Syncing ({command})...");
    }
    let sync = AgentOutcome::from_result(sync.join());
    let enrichment = enrich.map(|handle| AgentOutcome::from_result(handle.join()));
    let output = SyncOutput {
        sync,
        enrichment,
        stored_recipes: app.store.count()?,
    };

    if args.json {
        print_json(&output)?;
    } else {
        print_sync_output(&output);
    }

    if let Some(error) = &output.sync.error {
        bail!("Sync failed: {error}");
    }
    if let Some(error) = output.enrichment.as_ref().and_then(|e| e.error.as_ref()) {
        bail!("Enrichment failed: {error}");
    }
    Ok(())
}

fn print_sync_output(output: &SyncOutput) {
    if let Some(report) = &output.sync.report {
        match report.command {
            SyncCommand::Pull => println!(
                "Pulled {} of {} recipes ({} skipped, {} failed to store)",
                report.stored, report.total, report.skipped, report.failed
            ),
            SyncCommand::Push => println!(
                "Pushed {} recipes ({} unchanged, {} failed)",
                report.pushed, report.unchanged, report.failed
            ),
        }
    }
    if let Some(enrichment) = &output.enrichment {
        if let Some(report) = &enrichment.report {
            print_enrichment(report);
        }
    }
    println!("{} recipes in the local store", output.stored_recipes);
}

fn print_enrichment(report: &EnrichmentReport) {
    println!(
        "Enriched {} recipes over {} passes ({} failed, {} without any match); ingredients: {} found, {} unresolved, {} sub-recipes",
        report.enriched,
        report.passes,
        report.failed,
        report.unresolved,
        report.ingredients_found,
        report.ingredients_missing,
        report.sub_recipes
    );
}

/// One enrichment run with no sync in flight: a single pass.
pub(crate) fn cmd_enrich(app: &App, force: bool, offline: bool, json: bool) -> Result<()> {
    let agent = EnrichmentAgent::new(
        &app.surface,
        Arc::clone(&app.store),
        app.lookup(offline)?,
        force,
    );
    let outcome = AgentOutcome::from_result(agent.run());
    if json {
        print_json(&outcome)?;
    } else if let Some(report) = &outcome.report {
        print_enrichment(report);
    }
    if !outcome.succeeded() {
        bail!(
            "Enrichment failed: {}",
            outcome.error.unwrap_or_else(|| outcome.status.to_string())
        );
    }
    Ok(())
}

pub(crate) fn cmd_test_connection(app: &App, credentials: Credentials, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct ConnectionOutput {
        status: AgentStatus,
        recipes: Option<usize>,
        error: Option<String>,
    }

    let agent = SyncAgent::new(
        &app.surface,
        Arc::clone(&app.store),
        app.remote()?,
        credentials,
        SyncCommand::Pull,
    );
    let result = agent.test_connection();
    let output = ConnectionOutput {
        status: AgentStatus::of(&result),
        recipes: result.as_ref().ok().copied(),
        error: result.as_ref().err().map(ToString::to_string),
    };

    if json {
        print_json(&output)?;
    } else if let Some(count) = output.recipes {
        println!("Connected: {count} recipes available");
    }
    match result {
        Ok(count) => {
            info!(recipes = count, "test connection succeeded");
            Ok(())
        }
        Err(e) => bail!("Connection failed: {e}"),
    }
}

/// Block on an already spawned sync and report its outcome, for commands
/// that must see a finished sync before reading the store.
pub(crate) fn wait_for_sync(handle: AgentHandle<SyncReport>) -> Result<SyncReport> {
    let name = handle.name();
    match handle.join() {
        Ok(report) => Ok(report),
        Err(e) => bail!("{name} agent failed: {e}"),
    }
}
