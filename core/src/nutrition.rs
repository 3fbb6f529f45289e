use std::fmt::Write as _;
use std::ops::AddAssign;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Recipe;

static SUB_RECIPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[recipe:([\w\s-]+)\]").expect("valid sub-recipe pattern"));

/// Totals for one ingredient, one recipe, or one serving.
///
/// Energy is in kcal, sodium/potassium/cholesterol/calcium/iron in mg, the
/// rest in grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: f64,
    pub carbohydrates: f64,
    pub protein: f64,
    pub fat: f64,
    pub saturated_fat: f64,
    pub cholesterol: f64,
    pub sodium: f64,
    pub potassium: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub calcium: f64,
    pub iron: f64,
}

impl NutritionFacts {
    fn rows(&self) -> [(&'static str, f64, &'static str); 12] {
        [
            ("Calories", self.calories, "kcal"),
            ("Carbohydrates", self.carbohydrates, "g"),
            ("Protein", self.protein, "g"),
            ("Fat", self.fat, "g"),
            ("Saturated Fat", self.saturated_fat, "g"),
            ("Cholesterol", self.cholesterol, "mg"),
            ("Sodium", self.sodium, "mg"),
            ("Potassium", self.potassium, "mg"),
            ("Fiber", self.fiber, "g"),
            ("Sugar", self.sugar, "g"),
            ("Calcium", self.calcium, "mg"),
            ("Iron", self.iron, "mg"),
        ]
    }

    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            carbohydrates: self.carbohydrates * factor,
            protein: self.protein * factor,
            fat: self.fat * factor,
            saturated_fat: self.saturated_fat * factor,
            cholesterol: self.cholesterol * factor,
            sodium: self.sodium * factor,
            potassium: self.potassium * factor,
            fiber: self.fiber * factor,
            sugar: self.sugar * factor,
            calcium: self.calcium * factor,
            iron: self.iron * factor,
        }
    }

    /// Per-serving text stored in a recipe's `nutritional_info`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::from("Per serving:");
        for (label, value, unit) in self.rows() {
            let _ = write!(out, "\n{label}: {value:.1} {unit}");
        }
        out
    }
}

impl AddAssign for NutritionFacts {
    fn add_assign(&mut self, rhs: Self) {
        self.calories += rhs.calories;
        self.carbohydrates += rhs.carbohydrates;
        self.protein += rhs.protein;
        self.fat += rhs.fat;
        self.saturated_fat += rhs.saturated_fat;
        self.cholesterol += rhs.cholesterol;
        self.sodium += rhs.sodium;
        self.potassium += rhs.potassium;
        self.fiber += rhs.fiber;
        self.sugar += rhs.sugar;
        self.calcium += rhs.calcium;
        self.iron += rhs.iron;
    }
}

/// Resolves one ingredient line to its nutrition.
///
/// `Ok(None)` means the line could not be resolved; `Err` means the lookup
/// itself failed and the recipe should be retried on a later pass.
pub trait NutritionLookup: Send + Sync {
    fn lookup(&self, line: &str) -> Result<Option<NutritionFacts>>;
}

/// Leaves every line unresolved. Used when no lookup is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl NutritionLookup for NoLookup {
    fn lookup(&self, _line: &str) -> Result<Option<NutritionFacts>> {
        Ok(None)
    }
}

/// The referenced recipe's name in a `[recipe:<name>]` line.
#[must_use]
pub fn sub_recipe_reference(line: &str) -> Option<&str> {
    SUB_RECIPE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Per-recipe ingredient counts from one enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngredientTally {
    pub found: usize,
    pub missing: usize,
    pub sub_recipes: usize,
}

impl IngredientTally {
    /// Lines the lookup itself resolved, not counting sub-recipe references.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.found - self.sub_recipes
    }
}

/// Section headers like "For the sauce:" carry no ingredient.
fn is_section_header(line: &str) -> bool {
    line.ends_with(':')
}

/// Compute per-serving nutrition for `recipe` and write it into the record:
/// `nutritional_info` gets the summary, the notes get the signature, and both
/// `has_nutrition_info` and `is_modified` are set.
///
/// Sub-recipe references count as found without a lookup. A failing lookup
/// aborts before the record is touched, and so does a run in which the lookup
/// resolved no line at all.
pub fn enrich_record(recipe: &mut Recipe, lookup: &dyn NutritionLookup) -> Result<IngredientTally> {
    let mut tally = IngredientTally::default();
    let mut totals = NutritionFacts::default();

    for line in recipe.ingredient_lines() {
        if is_section_header(line) {
            continue;
        }
        if sub_recipe_reference(line).is_some() {
            tally.sub_recipes += 1;
            tally.found += 1;
            continue;
        }
        match lookup.lookup(line)? {
            Some(facts) => {
                totals += facts;
                tally.found += 1;
            }
            None => tally.missing += 1,
        }
    }

    if tally.resolved() == 0 {
        return Ok(tally);
    }

    let per_serving = totals.scaled(1.0 / f64::from(recipe.servings_count()));
    recipe.nutritional_info = per_serving.summary();
    recipe.stamp_signature();
    recipe.has_nutrition_info = true;
    recipe.is_modified = true;
    Ok(tally)
}
