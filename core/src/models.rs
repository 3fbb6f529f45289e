use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::ser::{Formatter, Serializer};
use sha2::{Digest, Sha256};

/// Marker appended to a recipe's notes once nutrition data has been generated for it.
pub const NUTRITION_SIGNATURE: &str = "Nutrition information generated by mealprep";

/// Wire name of the content hash field. It is carried in payloads but never hashed.
const HASH_FIELD: &str = "hash";

fn null_as_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A recipe as known to the remote recipe service, plus two local-only flags.
///
/// Field names match the service's JSON. `has_nutrition_info` and `is_modified`
/// are never serialized, so they take no part in payloads or the content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    #[serde(deserialize_with = "null_as_default")]
    pub uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub rating: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub photo_hash: String,
    #[serde(deserialize_with = "null_as_default")]
    pub on_favorites: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub photo: String,
    #[serde(deserialize_with = "null_as_default")]
    pub scale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ingredients: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_pinned: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_time: String,
    #[serde(rename = "hash", deserialize_with = "null_as_default")]
    pub content_hash: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub difficulty: String,
    #[serde(deserialize_with = "null_as_default")]
    pub on_grocery_list: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub in_trash: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub directions: String,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    pub photo_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub cook_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub notes: String,
    pub photo_large: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub prep_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub servings: String,
    #[serde(deserialize_with = "null_as_default")]
    pub nutritional_info: String,

    // --- Local metadata ---
    #[serde(skip)]
    pub has_nutrition_info: bool,
    #[serde(skip)]
    pub is_modified: bool,
}

/// JSON formatting that matches the recipe service's own canonical form:
/// `", "` and `": "` separators, everything outside printable ASCII escaped
/// as `\uXXXX` (surrogate pairs above the BMP).
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if (' '..='~').contains(&c) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

fn to_canonical_bytes(value: &impl Serialize) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    value.serialize(&mut Serializer::with_formatter(&mut out, CanonicalFormatter))?;
    Ok(out)
}

impl Recipe {
    /// Every wire field keyed by name, in sorted key order.
    fn sorted_fields(&self) -> serde_json::Result<BTreeMap<String, Value>> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    /// Every wire field with keys sorted lexicographically, in canonical formatting.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        let bytes = to_canonical_bytes(&self.sorted_fields()?)?;
        // The formatter emits ASCII only.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// SHA-256 hex digest of the canonical JSON with the hash field removed.
    pub fn compute_hash(&self) -> serde_json::Result<String> {
        let mut fields = self.sorted_fields()?;
        fields.remove(HASH_FIELD);
        let bytes = to_canonical_bytes(&fields)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Recompute and store the content hash.
    pub fn refresh_hash(&mut self) -> serde_json::Result<()> {
        self.content_hash = self.compute_hash()?;
        Ok(())
    }

    /// Append the nutrition signature to the notes unless it is already there.
    /// Returns `true` when the notes changed.
    pub fn stamp_signature(&mut self) -> bool {
        if self.notes.contains(NUTRITION_SIGNATURE) {
            return false;
        }
        if !self.notes.is_empty() && !self.notes.ends_with('\n') {
            self.notes.push('\n');
        }
        self.notes.push_str(NUTRITION_SIGNATURE);
        true
    }

    /// Number of servings the recipe yields, read from the leading integer of
    /// the free-text `servings` field ("4 servings", "6-8"). Defaults to 1.
    #[must_use]
    pub fn servings_count(&self) -> u32 {
        let digits: String = self
            .servings
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        match digits.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => 1,
        }
    }

    /// Non-blank ingredient lines, trimmed.
    pub fn ingredient_lines(&self) -> impl Iterator<Item = &str> {
        self.ingredients
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Short label used in diagnostics and plan output.
    #[must_use]
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("<{}>", self.uid)
        } else {
            format!("{} <{}>", self.name, self.uid)
        }
    }
}
