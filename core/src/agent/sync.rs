use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{AgentError, AgentHandle};
use crate::models::Recipe;
use crate::remote::{Credentials, RecipeRemote, encode_payload};
use crate::store::Store;
use crate::surface::{Flag, FlagGuard, SharedSurface};

const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCommand {
    /// Remote index and details into the local store.
    Pull,
    /// Locally modified records back to the remote.
    Push,
}

impl FromStr for SyncCommand {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pull" => Ok(Self::Pull),
            "push" => Ok(Self::Push),
            other => Err(AgentError::InvalidParams(format!(
                "unknown sync command '{other}', expected pull or push"
            ))),
        }
    }
}

impl fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "pull",
            Self::Push => "push",
        })
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub command: SyncCommand,
    /// Index entries (pull) or stored records (push) considered.
    pub total: usize,
    pub stored: usize,
    /// Pull: detail fetches that failed.
    pub skipped: usize,
    pub pushed: usize,
    /// Push: records with no local changes.
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncReport {
    fn new(command: SyncCommand, total: usize) -> Self {
        Self {
            command,
            total,
            stored: 0,
            skipped: 0,
            pushed: 0,
            unchanged: 0,
            failed: 0,
        }
    }
}

/// A pull fails only when store failures outnumber successful stores.
fn pull_succeeded(report: &SyncReport) -> bool {
    report.failed <= report.stored
}

/// Brings the store and the remote recipe service into line, one pass per run.
pub struct SyncAgent {
    surface: Weak<SharedSurface>,
    store: Arc<Store>,
    remote: Arc<dyn RecipeRemote>,
    credentials: Option<Credentials>,
    command: Result<SyncCommand, String>,
}

impl SyncAgent {
    /// Credentials with a blank username are dropped here and reported as
    /// `InvalidParams` when the agent runs.
    pub fn new(
        surface: &Arc<SharedSurface>,
        store: Arc<Store>,
        remote: Arc<dyn RecipeRemote>,
        credentials: Credentials,
        command: SyncCommand,
    ) -> Self {
        Self {
            surface: Arc::downgrade(surface),
            store,
            remote,
            credentials: credentials.is_valid().then_some(credentials),
            command: Ok(command),
        }
    }

    /// Replace the command from its text form. Unparseable text is kept and
    /// rejected when the agent runs.
    #[must_use]
    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.parse().map_err(|_| command.to_string());
        self
    }

    fn params(&self) -> Result<(&Credentials, SyncCommand), AgentError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AgentError::InvalidParams("missing or empty username".into()))?;
        let command = self
            .command
            .clone()
            .map_err(|raw| AgentError::InvalidParams(format!("unknown sync command '{raw}'")))?;
        Ok((credentials, command))
    }

    /// One index fetch with the configured credentials. Returns the number of
    /// recipes the remote lists; never touches the store.
    pub fn test_connection(&self) -> Result<usize, AgentError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AgentError::InvalidParams("missing or empty username".into()))?;
        let index = self
            .remote
            .fetch_index(credentials)
            .map_err(|e| AgentError::RequestFailed(format!("{e:#}")))?;
        info!(recipes = index.len(), "connection ok");
        Ok(index.len())
    }

    /// Run one pass on the calling thread.
    pub fn run(&self) -> Result<SyncReport, AgentError> {
        let surface = self.surface.upgrade().ok_or(AgentError::InvalidSurface)?;
        let _busy = FlagGuard::raise(&surface, Flag::SyncRunning);
        self.execute()
    }

    /// Run one pass on a new thread. `sync_running` is already set when this
    /// returns, so an enrichment agent started afterwards sees the sync.
    pub fn spawn(self) -> Result<AgentHandle<SyncReport>, AgentError> {
        let Some(surface) = self.surface.upgrade() else {
            return AgentHandle::spawn("sync", || Err(AgentError::InvalidSurface));
        };
        surface.set(Flag::SyncRunning, true);
        let worker = Arc::clone(&surface);
        let spawned = AgentHandle::spawn("sync", move || {
            let _busy = FlagGuard::raise(&worker, Flag::SyncRunning);
            self.execute()
        });
        if spawned.is_err() {
            surface.set(Flag::SyncRunning, false);
        }
        spawned
    }

    fn execute(&self) -> Result<SyncReport, AgentError> {
        let (credentials, command) = self.params()?;
        info!(%command, "sync started");
        let result = match command {
            SyncCommand::Pull => self.pull(credentials),
            SyncCommand::Push => self.push(credentials),
        };
        match &result {
            Ok(report) => info!(
                %command,
                total = report.total,
                stored = report.stored,
                pushed = report.pushed,
                skipped = report.skipped,
                failed = report.failed,
                "sync finished"
            ),
            Err(e) => warn!(%command, error = %e, "sync failed"),
        }
        result
    }

    fn pull(&self, credentials: &Credentials) -> Result<SyncReport, AgentError> {
        let index = self
            .remote
            .fetch_index(credentials)
            .map_err(|e| AgentError::RequestFailed(format!("failed to fetch recipe index: {e:#}")))?;
        let mut report = SyncReport::new(SyncCommand::Pull, index.len());

        for (i, entry) in index.iter().enumerate() {
            match self.remote.fetch_recipe(credentials, &entry.uid) {
                Ok(recipe) => {
                    let recipe = prepare_pulled(recipe, &entry.uid);
                    match self.store.upsert(&recipe) {
                        Ok(outcome) => {
                            debug!(uid = %entry.uid, ?outcome, "stored recipe");
                            report.stored += 1;
                        }
                        Err(e) => {
                            warn!(uid = %entry.uid, error = %e, "failed to store recipe");
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(uid = %entry.uid, error = %format!("{e:#}"), "skipping recipe");
                    report.skipped += 1;
                }
            }
            let done = i + 1;
            if done % PROGRESS_EVERY == 0 || done == report.total {
                info!(current = done, total = report.total, "pull progress");
            }
        }

        if pull_succeeded(&report) {
            Ok(report)
        } else {
            Err(AgentError::RequestFailed(format!(
                "{} of {} recipes could not be stored",
                report.failed, report.total
            )))
        }
    }

    fn push(&self, credentials: &Credentials) -> Result<SyncReport, AgentError> {
        let uids = self
            .store
            .list_uids()
            .map_err(|e| AgentError::RequestFailed(format!("failed to list local recipes: {e}")))?;
        let mut report = SyncReport::new(SyncCommand::Push, uids.len());

        for uid in &uids {
            let mut recipe = match self.store.read(uid) {
                Ok(Some(recipe)) if recipe.is_modified => recipe,
                Ok(_) => {
                    report.unchanged += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%uid, error = %e, "failed to read recipe");
                    report.failed += 1;
                    continue;
                }
            };
            match self.push_one(credentials, &mut recipe) {
                Ok(()) => {
                    debug!(%uid, hash = %recipe.content_hash, "pushed recipe");
                    report.pushed += 1;
                }
                Err(e) => {
                    warn!(%uid, error = %format!("{e:#}"), "failed to push recipe");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn push_one(&self, credentials: &Credentials, recipe: &mut Recipe) -> anyhow::Result<()> {
        recipe.refresh_hash()?;
        let payload = encode_payload(recipe)?;
        self.remote
            .push_recipe(credentials, &recipe.uid, payload)?;
        recipe.is_modified = false;
        self.store.upsert(recipe)?;
        Ok(())
    }
}

/// A pulled record reflects the remote exactly, so it starts unmodified.
/// Records already carrying the signature were enriched on an earlier push.
fn prepare_pulled(mut recipe: Recipe, index_uid: &str) -> Recipe {
    if recipe.uid.is_empty() {
        index_uid.clone_into(&mut recipe.uid);
    }
    recipe.is_modified = false;
    recipe.has_nutrition_info = recipe.notes.contains(crate::models::NUTRITION_SIGNATURE);
    recipe
}
