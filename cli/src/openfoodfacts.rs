use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use mealprep_core::ingredient::parse_ingredient;
use mealprep_core::nutrition::{NutritionFacts, NutritionLookup};
use mealprep_core::openfoodfacts::{SearchResponse, first_match};

const SEARCH_URL: &str = "https://world.openfoodfacts.org/cgi/search.pl";

/// Ingredient nutrition from the `OpenFoodFacts` product search.
pub struct OpenFoodFactsClient {
    client: reqwest::Client,
    rt: Handle,
    // Per-100 g facts by search term; `None` records a miss.
    cache: Mutex<HashMap<String, Option<NutritionFacts>>>,
}

impl OpenFoodFactsClient {
    pub fn new(rt: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "mealprep/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Nutrition for 100 g of the best match for `query`.
    pub async fn search_async(&self, query: &str) -> Result<Option<NutritionFacts>> {
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("search_terms", query), ("json", "1"), ("page_size", "5")])
            .send()
            .await
            .context("Failed to reach OpenFoodFacts API")?
            .error_for_status()
            .context("OpenFoodFacts search failed")?;

        let data: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse OpenFoodFacts search response")?;

        Ok(first_match(data, 100.0))
    }

    fn per_100g(&self, name: &str) -> Result<Option<NutritionFacts>> {
        let key = name.to_lowercase();
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(*hit);
        }
        let facts = self.rt.block_on(self.search_async(name))?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, facts);
        Ok(facts)
    }
}

impl NutritionLookup for OpenFoodFactsClient {
    fn lookup(&self, line: &str) -> Result<Option<NutritionFacts>> {
        let parsed = parse_ingredient(line);
        if parsed.name.is_empty() {
            return Ok(None);
        }
        let facts = self.per_100g(&parsed.name)?;
        Ok(facts.map(|f| f.scaled(parsed.grams / 100.0)))
    }
}
