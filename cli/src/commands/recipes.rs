use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealprep_core::models::Recipe;
use mealprep_core::store::Store;

use super::helpers::{json_error, print_json, truncate, yes_no};

#[derive(Tabled)]
struct RecipeRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Rating")]
    rating: i64,
    #[tabled(rename = "Servings")]
    servings: u32,
    #[tabled(rename = "Categories")]
    categories: String,
    #[tabled(rename = "Nutrition")]
    nutrition: &'static str,
    #[tabled(rename = "Modified")]
    modified: &'static str,
}

impl From<&Recipe> for RecipeRow {
    fn from(r: &Recipe) -> Self {
        Self {
            uid: truncate(&r.uid, 14),
            name: truncate(&r.name, 35),
            rating: r.rating,
            servings: r.servings_count(),
            categories: truncate(&r.categories.join(", "), 25),
            nutrition: yes_no(r.has_nutrition_info),
            modified: yes_no(r.is_modified),
        }
    }
}

fn load_all(store: &Store) -> Result<Vec<Recipe>> {
    let mut recipes = Vec::new();
    for uid in store.list_uids()? {
        if let Some(recipe) = store.read(&uid)? {
            recipes.push(recipe);
        }
    }
    Ok(recipes)
}

pub(crate) fn cmd_recipes_list(store: &Store, json: bool) -> Result<()> {
    let recipes = load_all(store)?;

    if json {
        return print_json(&recipes);
    }
    if recipes.is_empty() {
        println!("No recipes stored. Run `mealprep sync` first.");
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes.iter().map(RecipeRow::from).collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipes_show(store: &Store, uid: &str, json: bool) -> Result<()> {
    let Some(recipe) = store.read(uid)? else {
        if json {
            println!("{}", json_error(&format!("No recipe with uid '{uid}'")));
        } else {
            eprintln!("No recipe with uid '{uid}'");
        }
        process::exit(2);
    };

    if json {
        return print_json(&recipe);
    }

    println!("{}", recipe.label());
    if !recipe.categories.is_empty() {
        println!("Categories: {}", recipe.categories.join(", "));
    }
    if !recipe.servings.is_empty() {
        println!("Servings: {}", recipe.servings);
    }
    for (label, value) in [
        ("Prep", &recipe.prep_time),
        ("Cook", &recipe.cook_time),
        ("Total", &recipe.total_time),
    ] {
        if !value.is_empty() {
            println!("{label} time: {value}");
        }
    }
    println!("\nIngredients:");
    for line in recipe.ingredient_lines() {
        println!("  - {line}");
    }
    if !recipe.directions.is_empty() {
        println!("\nDirections:\n{}", recipe.directions);
    }
    if !recipe.nutritional_info.is_empty() {
        println!("\n{}", recipe.nutritional_info);
    }
    println!(
        "\nNutrition computed: {}  Local changes: {}",
        yes_no(recipe.has_nutrition_info),
        yes_no(recipe.is_modified)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_all_in_uid_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("m.db")).unwrap();
        for uid in ["b", "a"] {
            store
                .upsert(&Recipe {
                    uid: uid.to_string(),
                    ..Recipe::default()
                })
                .unwrap();
        }
        let uids: Vec<String> = load_all(&store).unwrap().into_iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec!["a", "b"]);
    }

    #[test]
    fn test_row_flags() {
        let recipe = Recipe {
            uid: "X".to_string(),
            name: "Soup".to_string(),
            servings: "6 bowls".to_string(),
            has_nutrition_info: true,
            ..Recipe::default()
        };
        let row = RecipeRow::from(&recipe);
        assert_eq!(row.servings, 6);
        assert_eq!(row.nutrition, "yes");
        assert_eq!(row.modified, "no");
    }
}
