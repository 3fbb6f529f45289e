use serde::Deserialize;

use crate::nutrition::NutritionFacts;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub products: Vec<ProductData>,
}

#[derive(Debug, Deserialize)]
pub struct ProductData {
    pub product_name: Option<String>,
    pub nutriments: Option<Nutriments>,
}

/// Per-100 g values. OpenFoodFacts reports minerals and cholesterol in grams.
#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Nutriments {
    #[serde(rename = "energy-kcal_100g")]
    pub energy_kcal_100g: Option<f64>,
    pub carbohydrates_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    #[serde(rename = "saturated-fat_100g")]
    pub saturated_fat_100g: Option<f64>,
    pub cholesterol_100g: Option<f64>,
    pub sodium_100g: Option<f64>,
    pub potassium_100g: Option<f64>,
    pub fiber_100g: Option<f64>,
    pub sugars_100g: Option<f64>,
    pub calcium_100g: Option<f64>,
    pub iron_100g: Option<f64>,
}

const MG_PER_G: f64 = 1000.0;

/// Nutrition for `grams` of the product. `None` when the product has no
/// energy value, since such entries are usually incomplete.
#[must_use]
pub fn product_to_facts(p: ProductData, grams: f64) -> Option<NutritionFacts> {
    let n = p.nutriments?;
    let calories = n.energy_kcal_100g?;
    let or0 = |v: Option<f64>| v.unwrap_or_default();

    let per_100g = NutritionFacts {
        calories,
        carbohydrates: or0(n.carbohydrates_100g),
        protein: or0(n.proteins_100g),
        fat: or0(n.fat_100g),
        saturated_fat: or0(n.saturated_fat_100g),
        cholesterol: or0(n.cholesterol_100g) * MG_PER_G,
        sodium: or0(n.sodium_100g) * MG_PER_G,
        potassium: or0(n.potassium_100g) * MG_PER_G,
        fiber: or0(n.fiber_100g),
        sugar: or0(n.sugars_100g),
        calcium: or0(n.calcium_100g) * MG_PER_G,
        iron: or0(n.iron_100g) * MG_PER_G,
    };
    Some(per_100g.scaled(grams / 100.0))
}

/// The first product in a search that yields usable facts.
#[must_use]
pub fn first_match(response: SearchResponse, grams: f64) -> Option<NutritionFacts> {
    response
        .products
        .into_iter()
        .find_map(|p| product_to_facts(p, grams))
}
