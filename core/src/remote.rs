use std::fmt;
use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::models::Recipe;

/// One row of the remote recipe index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub uid: String,
    #[serde(default)]
    pub hash: String,
}

/// Every response from the recipe service wraps its payload in `result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub result: T,
}

/// Username and password for the recipe service, passed through unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A blank username can never authenticate.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The remote recipe service.
///
/// The CLI implements this over HTTP. Calls are synchronous and are made from
/// agent threads; an implementation backed by async I/O blocks on its own
/// runtime handle.
pub trait RecipeRemote: Send + Sync {
    fn fetch_index(&self, credentials: &Credentials) -> Result<Vec<IndexEntry>>;
    fn fetch_recipe(&self, credentials: &Credentials, uid: &str) -> Result<Recipe>;
    /// Upload one record. `payload` is the output of [`encode_payload`].
    fn push_recipe(&self, credentials: &Credentials, uid: &str, payload: Vec<u8>) -> Result<()>;
}

/// Index endpoint under `base`.
#[must_use]
pub fn index_url(base: &str) -> String {
    format!("{}/sync/recipes", base.trim_end_matches('/'))
}

/// Detail endpoint for one recipe. The service expects the trailing slash.
#[must_use]
pub fn recipe_url(base: &str, uid: &str) -> String {
    format!("{}/sync/recipe/{uid}/", base.trim_end_matches('/'))
}

/// Gzip of the record's canonical JSON, as the upload endpoint expects.
pub fn encode_payload(recipe: &Recipe) -> Result<Vec<u8>> {
    let json = recipe
        .canonical_json()
        .context("failed to serialize recipe")?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    Ok(encoder.finish()?)
}

pub fn decode_payload(payload: &[u8]) -> Result<Recipe> {
    let json = gunzip(payload).context("payload is not gzip")?;
    serde_json::from_str(&json).context("payload is not a recipe")
}

fn gunzip(payload: &[u8]) -> io::Result<String> {
    let mut json = String::new();
    GzDecoder::new(payload).read_to_string(&mut json)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_recipe;

    #[test]
    fn test_urls() {
        assert_eq!(
            index_url("https://example.com/api/v1/"),
            "https://example.com/api/v1/sync/recipes"
        );
        assert_eq!(
            recipe_url("https://example.com/api/v1", "ABC-1"),
            "https://example.com/api/v1/sync/recipe/ABC-1/"
        );
    }

    #[test]
    fn test_payload_is_gzipped_canonical_json() {
        let mut recipe = sample_recipe("A1");
        recipe.refresh_hash().unwrap();
        recipe.is_modified = true;

        let payload = encode_payload(&recipe).unwrap();
        assert_eq!(&payload[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&payload).unwrap(), recipe.canonical_json().unwrap());

        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded.content_hash, recipe.content_hash);
        assert!(!decoded.is_modified);
    }

    #[test]
    fn test_decode_rejects_plain_json() {
        assert!(decode_payload(br#"{"uid":"A1"}"#).is_err());
    }

    #[test]
    fn test_envelope_decodes_index() {
        let body = r#"{"result":[{"uid":"A","hash":"h1"},{"uid":"B","hash":"h2"}]}"#;
        let envelope: Envelope<Vec<IndexEntry>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.result.len(), 2);
        assert_eq!(envelope.result[1].uid, "B");
    }

    #[test]
    fn test_credentials_validity_and_redaction() {
        assert!(Credentials::new("me@example.com", "pw").is_valid());
        assert!(!Credentials::new("  ", "pw").is_valid());
        let debug = format!("{:?}", Credentials::new("me", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
