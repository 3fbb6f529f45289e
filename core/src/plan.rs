use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::models::Recipe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// Canonical Monday-first ordering of the week.
pub const DAYS_OF_WEEK: [Day; 7] = [
    Day::Monday,
    Day::Tuesday,
    Day::Wednesday,
    Day::Thursday,
    Day::Friday,
    Day::Saturday,
    Day::Sunday,
];

impl Day {
    /// Case-insensitive match on the full name or its three-letter abbreviation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "monday" | "mon" => Some(Self::Monday),
            "tuesday" | "tue" => Some(Self::Tuesday),
            "wednesday" | "wed" => Some(Self::Wednesday),
            "thursday" | "thu" => Some(Self::Thursday),
            "friday" | "fri" => Some(Self::Friday),
            "saturday" | "sat" => Some(Self::Saturday),
            "sunday" | "sun" => Some(Self::Sunday),
            _ => None,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

impl From<chrono::Weekday> for Day {
    fn from(day: chrono::Weekday) -> Self {
        DAYS_OF_WEEK[day.num_days_from_monday() as usize]
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Meal {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

pub const MEALS: [Meal; 5] = [
    Meal::Breakfast,
    Meal::Lunch,
    Meal::Dinner,
    Meal::Snack,
    Meal::Dessert,
];

impl Meal {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "dinner" => Some(Self::Dinner),
            "snack" => Some(Self::Snack),
            "dessert" => Some(Self::Dessert),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
            Self::Dessert => "dessert",
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// One day's five meal slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayPlan {
    slots: [Option<Recipe>; 5],
}

impl DayPlan {
    #[must_use]
    pub fn get(&self, meal: Meal) -> Option<&Recipe> {
        self.slots[meal as usize].as_ref()
    }

    pub fn set(&mut self, meal: Meal, recipe: Option<Recipe>) {
        self.slots[meal as usize] = recipe;
    }

    /// Slots in breakfast..dessert order.
    pub fn iter(&self) -> impl Iterator<Item = (Meal, Option<&Recipe>)> {
        MEALS.iter().map(|&meal| (meal, self.get(meal)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// A contiguous run of days, Monday-first, each with a [`DayPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealPlan {
    days: BTreeMap<Day, DayPlan>,
}

impl MealPlan {
    /// Empty slots for every day from `start` to `end` inclusive. An `end`
    /// before `start` yields just `start`.
    #[must_use]
    pub fn new(start: Day, end: Day) -> Self {
        let end = end.max(start);
        let days = DAYS_OF_WEEK[start.index()..=end.index()]
            .iter()
            .map(|&day| (day, DayPlan::default()))
            .collect();
        Self { days }
    }

    pub fn days(&self) -> impl Iterator<Item = Day> + '_ {
        self.days.keys().copied()
    }

    #[must_use]
    pub fn day(&self, day: Day) -> Option<&DayPlan> {
        self.days.get(&day)
    }

    pub fn day_mut(&mut self, day: Day) -> Option<&mut DayPlan> {
        self.days.get_mut(&day)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Day, &DayPlan)> {
        self.days.iter().map(|(&day, plan)| (day, plan))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.days.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl fmt::Display for MealPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (day, plan) in self.iter() {
            writeln!(f, "{day}:")?;
            for (meal, recipe) in plan.iter() {
                let name = recipe.map_or("-", |r| r.name.as_str());
                writeln!(f, "    {meal:<9} {name}")?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SlotRef<'a> {
    uid: &'a str,
    name: &'a str,
}

struct DayRef<'a>(&'a DayPlan);

impl Serialize for DayRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(MEALS.len()))?;
        for (meal, recipe) in self.0.iter() {
            let slot = recipe.map(|r| SlotRef {
                uid: &r.uid,
                name: &r.name,
            });
            map.serialize_entry(meal.name(), &slot)?;
        }
        map.end()
    }
}

// Slots serialize as `{uid, name}` or null rather than the full record.
impl Serialize for MealPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (day, plan) in self.iter() {
            map.serialize_entry(day.name(), &DayRef(plan))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_recipe;

    #[test]
    fn test_day_parse() {
        assert_eq!(Day::parse("Monday"), Some(Day::Monday));
        assert_eq!(Day::parse("WED"), Some(Day::Wednesday));
        assert_eq!(Day::parse(" sun "), Some(Day::Sunday));
        assert_eq!(Day::parse("funday"), None);
        assert_eq!(Day::parse(""), None);
    }

    #[test]
    fn test_day_from_chrono() {
        assert_eq!(Day::from(chrono::Weekday::Mon), Day::Monday);
        assert_eq!(Day::from(chrono::Weekday::Sun), Day::Sunday);
    }

    #[test]
    fn test_meal_parse() {
        assert_eq!(Meal::parse("Dessert"), Some(Meal::Dessert));
        assert_eq!(Meal::parse("brunch"), None);
    }

    #[test]
    fn test_new_plan_range() {
        let plan = MealPlan::new(Day::Tuesday, Day::Thursday);
        let days: Vec<Day> = plan.days().collect();
        assert_eq!(days, vec![Day::Tuesday, Day::Wednesday, Day::Thursday]);
        assert!(plan.iter().all(|(_, d)| d.is_empty()));
    }

    #[test]
    fn test_new_plan_end_before_start_clamps() {
        let plan = MealPlan::new(Day::Friday, Day::Monday);
        assert_eq!(plan.days().collect::<Vec<_>>(), vec![Day::Friday]);
    }

    #[test]
    fn test_display_and_json() {
        let mut plan = MealPlan::new(Day::Monday, Day::Monday);
        plan.day_mut(Day::Monday)
            .unwrap()
            .set(Meal::Dinner, Some(sample_recipe("A1")));

        let text = plan.to_string();
        assert!(text.starts_with("monday:\n"));
        assert!(text.contains("dinner    Weeknight Chili"));
        assert!(text.contains("breakfast -"));

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["monday"]["dinner"]["uid"], "A1");
        assert!(json["monday"]["lunch"].is_null());
    }
}
