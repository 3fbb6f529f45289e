use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Recipe;
use crate::plan::{Day, MEALS, Meal, MealPlan};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("'{0}' is not a day in the current plan")]
    UnknownDay(String),

    #[error("'{0}' is not a meal slot (breakfast, lunch, dinner, snack, dessert)")]
    UnknownMeal(String),

    #[error("no recipes in the store to choose from")]
    EmptyStore,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Build a plan from `start` through `end`, filling every slot with a recipe
/// drawn uniformly at random with replacement.
///
/// An unknown or absent `start` means Monday and an unknown or absent `end`
/// means Sunday. An `end` before `start` clamps to `start`. An empty store
/// leaves every slot empty.
pub fn build_plan(
    store: &Store,
    start: Option<&str>,
    end: Option<&str>,
    rng: &mut impl Rng,
) -> Result<MealPlan, ScheduleError> {
    let start_day = start.and_then(Day::parse).unwrap_or(Day::Monday);
    let end_day = end.and_then(Day::parse).unwrap_or(Day::Sunday);
    let mut plan = MealPlan::new(start_day, end_day);

    let uids = store.list_uids()?;
    if uids.is_empty() {
        debug!("store is empty, plan left unfilled");
        return Ok(plan);
    }

    let days: Vec<Day> = plan.days().collect();
    for day in days {
        for meal in MEALS {
            let recipe = draw(store, &uids, rng)?;
            if let Some(slots) = plan.day_mut(day) {
                slots.set(meal, recipe);
            }
        }
    }
    debug!(days = plan.len(), pool = uids.len(), "built meal plan");
    Ok(plan)
}

/// Replace one slot of `plan`. With `recipe` set it is assigned as-is,
/// otherwise a recipe is drawn at random from the store.
///
/// An unknown day or meal leaves `plan` untouched and returns an error.
pub fn update_meal(
    store: &Store,
    plan: &mut MealPlan,
    day_key: &str,
    meal_key: &str,
    recipe: Option<Recipe>,
    rng: &mut impl Rng,
) -> Result<(), ScheduleError> {
    let Some(day) = Day::parse(day_key).filter(|d| plan.day(*d).is_some()) else {
        warn!(day = day_key, "meal update skipped: day not in plan");
        return Err(ScheduleError::UnknownDay(day_key.to_string()));
    };
    let Some(meal) = Meal::parse(meal_key) else {
        warn!(meal = meal_key, "meal update skipped: unknown meal");
        return Err(ScheduleError::UnknownMeal(meal_key.to_string()));
    };

    let recipe = match recipe {
        Some(recipe) => Some(recipe),
        None => {
            let uids = store.list_uids()?;
            if uids.is_empty() {
                return Err(ScheduleError::EmptyStore);
            }
            draw(store, &uids, rng)?
        }
    };

    if let Some(slots) = plan.day_mut(day) {
        debug!(%day, %meal, uid = recipe.as_ref().map(|r| r.uid.as_str()), "meal updated");
        slots.set(meal, recipe);
    }
    Ok(())
}

fn draw(store: &Store, uids: &[String], rng: &mut impl Rng) -> Result<Option<Recipe>, StoreError> {
    match uids.choose(rng) {
        Some(uid) => store.read(uid),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::test_support::{sample_recipe, temp_store};

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_build_plan_fills_requested_days() {
        let (_dir, store) = temp_store();
        for uid in ["A", "B", "C"] {
            store.upsert(&sample_recipe(uid)).unwrap();
        }
        let plan = build_plan(&store, Some("monday"), Some("wednesday"), &mut seeded()).unwrap();

        let days: Vec<Day> = plan.days().collect();
        assert_eq!(days, vec![Day::Monday, Day::Tuesday, Day::Wednesday]);
        for (_, slots) in plan.iter() {
            for (_, recipe) in slots.iter() {
                let uid = &recipe.unwrap().uid;
                assert!(["A", "B", "C"].contains(&uid.as_str()));
            }
        }
    }

    #[test]
    fn test_build_plan_empty_store_leaves_slots_empty() {
        let (_dir, store) = temp_store();
        let plan = build_plan(&store, Some("monday"), Some("wednesday"), &mut seeded()).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|(_, slots)| slots.is_empty()));
    }

    #[test]
    fn test_build_plan_end_before_start() {
        let (_dir, store) = temp_store();
        let plan = build_plan(&store, Some("wednesday"), Some("monday"), &mut seeded()).unwrap();
        assert_eq!(plan.days().collect::<Vec<_>>(), vec![Day::Wednesday]);
    }

    #[test]
    fn test_build_plan_defaults() {
        let (_dir, store) = temp_store();
        let plan = build_plan(&store, Some("someday"), None, &mut seeded()).unwrap();
        assert_eq!(plan.len(), 7);
        let plan = build_plan(&store, Some("Fri"), Some("nope"), &mut seeded()).unwrap();
        assert_eq!(
            plan.days().collect::<Vec<_>>(),
            vec![Day::Friday, Day::Saturday, Day::Sunday]
        );
    }

    #[test]
    fn test_update_meal_unknown_day_is_noop() {
        let (_dir, store) = temp_store();
        store.upsert(&sample_recipe("A")).unwrap();
        let mut plan = build_plan(&store, None, None, &mut seeded()).unwrap();
        let before = plan.clone();

        let result = update_meal(&store, &mut plan, "funday", "lunch", None, &mut seeded());
        assert!(matches!(result, Err(ScheduleError::UnknownDay(_))));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_update_meal_day_outside_plan() {
        let (_dir, store) = temp_store();
        let mut plan = MealPlan::new(Day::Monday, Day::Tuesday);
        let result = update_meal(
            &store,
            &mut plan,
            "friday",
            "lunch",
            Some(sample_recipe("A")),
            &mut seeded(),
        );
        assert!(matches!(result, Err(ScheduleError::UnknownDay(_))));
    }

    #[test]
    fn test_update_meal_unknown_meal_is_noop() {
        let (_dir, store) = temp_store();
        let mut plan = MealPlan::new(Day::Monday, Day::Monday);
        let result = update_meal(
            &store,
            &mut plan,
            "monday",
            "brunch",
            Some(sample_recipe("A")),
            &mut seeded(),
        );
        assert!(matches!(result, Err(ScheduleError::UnknownMeal(_))));
        assert!(plan.day(Day::Monday).unwrap().is_empty());
    }

    #[test]
    fn test_update_meal_explicit_recipe() {
        let (_dir, store) = temp_store();
        let mut plan = MealPlan::new(Day::Monday, Day::Monday);
        update_meal(
            &store,
            &mut plan,
            "Mon",
            "Dessert",
            Some(sample_recipe("PIE")),
            &mut seeded(),
        )
        .unwrap();
        let slot = plan.day(Day::Monday).unwrap().get(Meal::Dessert).unwrap();
        assert_eq!(slot.uid, "PIE");
    }

    #[test]
    fn test_update_meal_random_draw() {
        let (_dir, store) = temp_store();
        store.upsert(&sample_recipe("ONLY")).unwrap();
        let mut plan = MealPlan::new(Day::Sunday, Day::Sunday);
        update_meal(&store, &mut plan, "sunday", "snack", None, &mut seeded()).unwrap();
        let slot = plan.day(Day::Sunday).unwrap().get(Meal::Snack).unwrap();
        assert_eq!(slot.uid, "ONLY");
    }

    #[test]
    fn test_update_meal_empty_store() {
        let (_dir, store) = temp_store();
        let mut plan = MealPlan::new(Day::Sunday, Day::Sunday);
        let result = update_meal(&store, &mut plan, "sunday", "snack", None, &mut seeded());
        assert!(matches!(result, Err(ScheduleError::EmptyStore)));
        assert!(plan.day(Day::Sunday).unwrap().is_empty());
    }
}
