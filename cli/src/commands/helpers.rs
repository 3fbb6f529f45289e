use anyhow::{Context, Result, bail};
use serde::Serialize;

use mealprep_core::plan::{Day, Meal};

/// Parse a slot reference like "tue:dinner".
pub(crate) fn parse_slot(s: &str) -> Result<(Day, Meal)> {
    let (day, meal) = s
        .split_once(':')
        .with_context(|| format!("Invalid slot '{s}'. Use format 'day:meal' (e.g. 'tue:dinner')"))?;
    let day = Day::parse(day).with_context(|| {
        format!("Invalid day '{day}'. Use monday-sunday or mon-sun")
    })?;
    let meal = Meal::parse(meal).with_context(|| {
        format!("Invalid meal '{meal}'. Must be one of: breakfast, lunch, dinner, snack, dessert")
    })?;
    Ok((day, meal))
}

/// Parse an assignment like "tue:dinner=ABC-123" into a slot and a recipe uid.
pub(crate) fn parse_assignment(s: &str) -> Result<((Day, Meal), String)> {
    let (slot, uid) = s
        .split_once('=')
        .with_context(|| format!("Invalid assignment '{s}'. Use format 'day:meal=uid'"))?;
    let uid = uid.trim();
    if uid.is_empty() {
        bail!("Missing recipe uid in '{s}'");
    }
    Ok((parse_slot(slot)?, uid.to_string()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}
