use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use tracing::debug;

use mealprep_core::agent::{SyncAgent, SyncCommand};
use mealprep_core::plan::{Day, MealPlan};
use mealprep_core::remote::Credentials;
use mealprep_core::scheduler::{build_plan, update_meal};

use super::App;
use super::helpers::{json_error, parse_assignment, parse_slot, print_json};
use super::sync::wait_for_sync;

pub(crate) struct PlanArgs {
    pub start: Option<String>,
    pub end: Option<String>,
    pub from_today: bool,
    pub reroll: Vec<String>,
    pub set: Vec<String>,
    pub json: bool,
}

/// Build a plan, apply any per-meal updates, and print it. With credentials a
/// pull runs first and the plan is drawn from the synced store.
pub(crate) fn cmd_plan(app: &App, sync: Option<Credentials>, args: PlanArgs) -> Result<()> {
    // Validate slot arguments before any network or store work.
    let rerolls = args
        .reroll
        .iter()
        .map(|s| parse_slot(s))
        .collect::<Result<Vec<_>>>()?;
    let assignments = args
        .set
        .iter()
        .map(|s| parse_assignment(s))
        .collect::<Result<Vec<_>>>()?;

    if let Some(credentials) = sync {
        let handle = SyncAgent::new(
            &app.surface,
            Arc::clone(&app.store),
            app.remote()?,
            credentials,
            SyncCommand::Pull,
        )
        .spawn()?;
        if !args.json {
            eprintln!("Waiting for sync to finish...");
        }
        let report = wait_for_sync(handle)?;
        debug!(stored = report.stored, "sync finished before planning");
    }

    let start = if args.from_today {
        Some(Day::from(Local::now().weekday()).name().to_string())
    } else {
        args.start
    };

    let mut rng = rand::rng();
    let plan = build_plan(&app.store, start.as_deref(), args.end.as_deref(), &mut rng)?;
    app.surface.install_plan(plan);

    for (day, meal) in rerolls {
        edit_plan(app, |plan| {
            update_meal(&app.store, plan, day.name(), meal.name(), None, &mut rng)
                .with_context(|| format!("Could not reroll {day}:{meal}"))
        })?;
    }

    for ((day, meal), uid) in assignments {
        let Some(recipe) = app.store.read(&uid)? else {
            let message = format!("No recipe with uid '{uid}'");
            if args.json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
            process::exit(2);
        };
        edit_plan(app, |plan| {
            update_meal(&app.store, plan, day.name(), meal.name(), Some(recipe), &mut rng)
                .with_context(|| format!("Could not set {day}:{meal}"))
        })?;
    }

    let plan = app.surface.plan().context("No meal plan was built")?;
    if args.json {
        print_json(&plan)?;
    } else {
        print!("{plan}");
    }
    Ok(())
}

/// Take the plan off the surface, edit it without holding the surface lock,
/// and put it back whether or not the edit succeeded.
fn edit_plan(app: &App, edit: impl FnOnce(&mut MealPlan) -> Result<()>) -> Result<()> {
    let mut plan = app.surface.take_plan().context("No meal plan was built")?;
    let result = edit(&mut plan);
    app.surface.install_plan(plan);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use mealprep_core::models::Recipe;
    use mealprep_core::plan::Meal;

    fn test_app(dir: &tempfile::TempDir) -> App {
        let config = Config {
            db_path: dir.path().join("mealprep.db"),
            api_base: "http://127.0.0.1:9".to_string(),
            enrich_interval: std::time::Duration::from_millis(10),
        };
        // None of these tests reach the network, so the runtime can go away.
        let rt = tokio::runtime::Runtime::new().unwrap();
        App::open(config, rt.handle().clone()).unwrap()
    }

    fn recipe(uid: &str, name: &str) -> Recipe {
        Recipe {
            uid: uid.to_string(),
            name: name.to_string(),
            ..Recipe::default()
        }
    }

    #[test]
    fn test_plan_with_reroll_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        app.store.upsert(&recipe("A", "Pancakes")).unwrap();
        app.store.upsert(&recipe("B", "Tacos")).unwrap();

        cmd_plan(
            &app,
            None,
            PlanArgs {
                start: Some("mon".to_string()),
                end: Some("tue".to_string()),
                from_today: false,
                reroll: vec!["mon:lunch".to_string()],
                set: vec!["tue:dinner=B".to_string()],
                json: true,
            },
        )
        .unwrap();

        let plan = app.surface.plan().unwrap();
        assert_eq!(plan.len(), 2);
        let dinner = plan.day(Day::Tuesday).unwrap().get(Meal::Dinner).unwrap();
        assert_eq!(dinner.name, "Tacos");
        assert!(plan.day(Day::Monday).unwrap().get(Meal::Lunch).is_some());
    }

    #[test]
    fn test_plan_rejects_bad_slot_before_building() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let result = cmd_plan(
            &app,
            None,
            PlanArgs {
                start: None,
                end: None,
                from_today: false,
                reroll: vec!["funday:lunch".to_string()],
                set: Vec::new(),
                json: false,
            },
        );
        assert!(result.is_err());
        assert!(app.surface.plan().is_none());
    }

    #[test]
    fn test_reroll_on_empty_store_keeps_plan() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let result = cmd_plan(
            &app,
            None,
            PlanArgs {
                start: Some("sat".to_string()),
                end: None,
                from_today: false,
                reroll: vec!["sat:snack".to_string()],
                set: Vec::new(),
                json: false,
            },
        );
        assert!(result.is_err());
        let plan = app.surface.plan().unwrap();
        assert_eq!(plan.days().collect::<Vec<_>>(), vec![Day::Saturday, Day::Sunday]);
    }
}
