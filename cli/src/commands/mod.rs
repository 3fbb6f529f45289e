mod helpers;
mod plan;
mod recipes;
mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use crate::config::Config;
use crate::openfoodfacts::OpenFoodFactsClient;
use crate::recipe_service::RecipeServiceClient;
use mealprep_core::nutrition::{NoLookup, NutritionLookup};
use mealprep_core::remote::RecipeRemote;
use mealprep_core::store::Store;
use mealprep_core::surface::SharedSurface;

pub(crate) use plan::{PlanArgs, cmd_plan};
pub(crate) use recipes::{cmd_recipes_list, cmd_recipes_show};
pub(crate) use sync::{SyncArgs, cmd_enrich, cmd_sync, cmd_test_connection};

/// Everything a command needs, built once in `main`.
pub(crate) struct App {
    pub config: Config,
    pub store: Arc<Store>,
    pub surface: Arc<SharedSurface>,
    pub rt: Handle,
}

impl App {
    pub fn open(config: Config, rt: Handle) -> Result<Self> {
        let store = Store::open(config.db_path.clone())
            .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?;
        Ok(Self {
            config,
            store: Arc::new(store),
            surface: Arc::new(SharedSurface::new()),
            rt,
        })
    }

    pub fn remote(&self) -> Result<Arc<dyn RecipeRemote>> {
        let client = RecipeServiceClient::new(&self.config.api_base, self.rt.clone())?;
        Ok(Arc::new(client))
    }

    /// `OpenFoodFacts` lookups, or none at all when `offline`.
    pub fn lookup(&self, offline: bool) -> Result<Arc<dyn NutritionLookup>> {
        if offline {
            return Ok(Arc::new(NoLookup));
        }
        Ok(Arc::new(OpenFoodFactsClient::new(self.rt.clone())?))
    }
}
