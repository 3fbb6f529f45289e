use std::ops::AddAssign;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{AgentError, AgentHandle};
use crate::nutrition::{NutritionLookup, enrich_record};
use crate::store::{Store, StoreError};
use crate::surface::{Flag, FlagGuard, SharedSurface};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

// Sleep granularity while waiting out the poll interval.
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub passes: usize,
    pub scanned: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Recipes left untouched because no ingredient line resolved.
    pub unresolved: usize,
    pub ingredients_found: usize,
    pub ingredients_missing: usize,
    pub sub_recipes: usize,
}

impl AddAssign for EnrichmentReport {
    fn add_assign(&mut self, rhs: Self) {
        self.passes += rhs.passes;
        self.scanned += rhs.scanned;
        self.enriched += rhs.enriched;
        self.failed += rhs.failed;
        self.unresolved += rhs.unresolved;
        self.ingredients_found += rhs.ingredients_found;
        self.ingredients_missing += rhs.ingredients_missing;
        self.sub_recipes += rhs.sub_recipes;
    }
}

/// Fills in nutrition data for stored recipes while a sync is running, then
/// once more after it finishes.
pub struct EnrichmentAgent {
    surface: Weak<SharedSurface>,
    store: Arc<Store>,
    lookup: Arc<dyn NutritionLookup>,
    force_update: bool,
    poll_interval: Duration,
}

impl EnrichmentAgent {
    /// With `force_update` every recipe is recomputed, but only in the final
    /// pass; while the sync runs the agent just waits.
    pub fn new(
        surface: &Arc<SharedSurface>,
        store: Arc<Store>,
        lookup: Arc<dyn NutritionLookup>,
        force_update: bool,
    ) -> Self {
        Self {
            surface: Arc::downgrade(surface),
            store,
            lookup,
            force_update,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn run(&self) -> Result<EnrichmentReport, AgentError> {
        let surface = self.surface.upgrade().ok_or(AgentError::InvalidSurface)?;
        let _running = FlagGuard::raise(&surface, Flag::EnrichmentRunning);
        self.execute(&surface)
    }

    pub fn spawn(self) -> Result<AgentHandle<EnrichmentReport>, AgentError> {
        let Some(surface) = self.surface.upgrade() else {
            return AgentHandle::spawn("enrichment", || Err(AgentError::InvalidSurface));
        };
        surface.set(Flag::EnrichmentRunning, true);
        let worker = Arc::clone(&surface);
        let spawned = AgentHandle::spawn("enrichment", move || {
            let _running = FlagGuard::raise(&worker, Flag::EnrichmentRunning);
            self.execute(&worker)
        });
        if spawned.is_err() {
            surface.set(Flag::EnrichmentRunning, false);
        }
        spawned
    }

    fn execute(&self, surface: &SharedSurface) -> Result<EnrichmentReport, AgentError> {
        info!(force = self.force_update, "enrichment started");
        let mut total = EnrichmentReport::default();

        while surface.get(Flag::SyncRunning) {
            if !self.force_update {
                match self.pass() {
                    Ok(report) => total += report,
                    Err(e) => warn!(error = %e, "enrichment pass failed, retrying later"),
                }
            }
            self.wait_while_syncing(surface);
        }

        total += self.pass()?;
        info!(
            passes = total.passes,
            enriched = total.enriched,
            failed = total.failed,
            "enrichment finished"
        );
        Ok(total)
    }

    /// Sleep up to one poll interval, returning early once the sync is done.
    fn wait_while_syncing(&self, surface: &SharedSurface) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            let now = Instant::now();
            if now >= deadline || !surface.get(Flag::SyncRunning) {
                return;
            }
            thread::sleep(TICK.min(deadline - now));
        }
    }

    /// One scan over every stored recipe.
    fn pass(&self) -> Result<EnrichmentReport, StoreError> {
        let uids = self.store.list_uids()?;
        let mut report = EnrichmentReport {
            passes: 1,
            ..EnrichmentReport::default()
        };

        for uid in &uids {
            report.scanned += 1;
            let mut recipe = match self.store.read(uid) {
                Ok(Some(recipe)) => recipe,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%uid, error = %e, "failed to read recipe");
                    report.failed += 1;
                    continue;
                }
            };
            if recipe.has_nutrition_info && !self.force_update {
                continue;
            }

            let tally = match enrich_record(&mut recipe, &*self.lookup) {
                Ok(tally) => tally,
                Err(e) => {
                    warn!(%uid, error = %format!("{e:#}"), "nutrition lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            if tally.resolved() == 0 {
                debug!(%uid, missing = tally.missing, "no ingredient resolved, leaving recipe");
                report.unresolved += 1;
                continue;
            }
            if let Err(e) = self.store.upsert(&recipe) {
                warn!(%uid, error = %e, "failed to save nutrition info");
                report.failed += 1;
                continue;
            }

            debug!(%uid, found = tally.found, missing = tally.missing, "enriched recipe");
            report.enriched += 1;
            report.ingredients_found += tally.found;
            report.ingredients_missing += tally.missing;
            report.sub_recipes += tally.sub_recipes;
        }

        info!(scanned = report.scanned, enriched = report.enriched, "enrichment pass");
        Ok(report)
    }
}
