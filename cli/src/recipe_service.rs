use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use tokio::runtime::Handle;

use mealprep_core::models::Recipe;
use mealprep_core::remote::{
    Credentials, Envelope, IndexEntry, RecipeRemote, index_url, recipe_url,
};

/// HTTP client for the remote recipe service, authenticated per request
/// with Basic auth.
pub struct RecipeServiceClient {
    client: reqwest::Client,
    base: String,
    rt: Handle,
}

impl RecipeServiceClient {
    pub fn new(base: &str, rt: Handle) -> Result<Self> {
        reqwest::Url::parse(base).with_context(|| format!("Invalid recipe service URL '{base}'"))?;
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "mealprep/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base: base.to_string(),
            rt,
        })
    }

    pub async fn fetch_index_async(&self, credentials: &Credentials) -> Result<Vec<IndexEntry>> {
        let url = index_url(&self.base);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .context("Failed to reach recipe service")?
            .error_for_status()
            .context("Recipe index request failed")?;

        let data: Envelope<Vec<IndexEntry>> = resp
            .json()
            .await
            .context("Failed to parse recipe index")?;
        Ok(data.result)
    }

    pub async fn fetch_recipe_async(&self, credentials: &Credentials, uid: &str) -> Result<Recipe> {
        let url = recipe_url(&self.base, uid);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .with_context(|| format!("Failed to reach recipe service for {uid}"))?
            .error_for_status()
            .with_context(|| format!("Recipe request failed for {uid}"))?;

        let data: Envelope<Recipe> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse recipe {uid}"))?;
        Ok(data.result)
    }

    pub async fn push_recipe_async(
        &self,
        credentials: &Credentials,
        uid: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let url = recipe_url(&self.base, uid);
        let part = Part::bytes(payload).file_name("data");
        let form = Form::new().part("data", part);
        self.client
            .post(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to reach recipe service for {uid}"))?
            .error_for_status()
            .with_context(|| format!("Upload rejected for {uid}"))?;
        Ok(())
    }
}

impl RecipeRemote for RecipeServiceClient {
    fn fetch_index(&self, credentials: &Credentials) -> Result<Vec<IndexEntry>> {
        self.rt.block_on(self.fetch_index_async(credentials))
    }

    fn fetch_recipe(&self, credentials: &Credentials, uid: &str) -> Result<Recipe> {
        self.rt.block_on(self.fetch_recipe_async(credentials, uid))
    }

    fn push_recipe(&self, credentials: &Credentials, uid: &str, payload: Vec<u8>) -> Result<()> {
        self.rt.block_on(self.push_recipe_async(credentials, uid, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "hits the recipe service; needs MEALPREP_USERNAME and MEALPREP_PASSWORD"]
    fn test_fetch_index_with_real_account() {
        let username = std::env::var("MEALPREP_USERNAME").unwrap();
        let password = std::env::var("MEALPREP_PASSWORD").unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let client =
            RecipeServiceClient::new(crate::config::DEFAULT_API_BASE, rt.handle().clone()).unwrap();
        let index = client
            .fetch_index(&Credentials::new(username, password))
            .unwrap();
        assert!(index.iter().all(|e| !e.uid.is_empty()));
    }

    #[test]
    #[ignore = "hits the recipe service"]
    fn test_bad_credentials_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let client =
            RecipeServiceClient::new(crate::config::DEFAULT_API_BASE, rt.handle().clone()).unwrap();
        let result = client.fetch_index(&Credentials::new("nobody@example.com", "wrong"));
        assert!(result.is_err());
    }
}
