//! Food diary: per-day meal logs with running totals.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use nutri_api::models::{DailyLog, MealItem};

use crate::editor::meal_totals;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodDiary {
    logs: BTreeMap<NaiveDate, DailyLog>,
}

impl FoodDiary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `meal` to the log for `date`, creating the log if needed.
    pub fn log_meal(&mut self, date: NaiveDate, meal: MealItem) -> &DailyLog {
        let log = self.entry(date);
        log.meals.push(meal);
        refresh_totals(log);
        log
    }

    /// Remove a meal from whichever day holds it.
    pub fn remove_meal(&mut self, meal_id: &str) -> Option<MealItem> {
        self.logs.values_mut().find_map(|log| {
            let index = log.meals.iter().position(|m| m.id == meal_id)?;
            let removed = log.meals.remove(index);
            refresh_totals(log);
            Some(removed)
        })
    }

    /// Add `ml` of water to the log for `date`.
    pub fn add_water(&mut self, date: NaiveDate, ml: f64) -> &DailyLog {
        let log = self.entry(date);
        log.water_intake = (log.water_intake + ml).max(0.0);
        log
    }

    pub fn log_for(&self, date: NaiveDate) -> Option<&DailyLog> {
        self.logs.get(&date)
    }

    /// Logs, oldest day first.
    pub fn logs(&self) -> impl Iterator<Item = &DailyLog> {
        self.logs.values()
    }

    /// Every logged meal, newest day first and latest entry first within a day.
    pub fn recent_meals(&self) -> Vec<&MealItem> {
        self.logs
            .values()
            .rev()
            .flat_map(|log| log.meals.iter().rev())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.values().all(|log| log.meals.is_empty())
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }

    fn entry(&mut self, date: NaiveDate) -> &mut DailyLog {
        self.logs.entry(date).or_insert_with(|| DailyLog {
            date: date.format("%Y-%m-%d").to_string(),
            ..DailyLog::default()
        })
    }
}

fn refresh_totals(log: &mut DailyLog) {
    let (calories, macros) = meal_totals(&log.meals);
    log.total_calories = calories;
    log.total_macros = macros;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_api::models::MacroBreakdown;
    use nutri_test_utils::meal;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn logging_updates_totals() {
        let mut diary = FoodDiary::new();
        diary.log_meal(day(5), meal("a", 300.0, MacroBreakdown::new(10.0, 40.0, 5.0)));
        let log = diary.log_meal(day(5), meal("b", 200.0, MacroBreakdown::new(5.0, 20.0, 8.0)));

        assert_eq!(log.date, "2026-01-05");
        assert_eq!(log.total_calories, 500.0);
        assert_eq!(log.total_macros, MacroBreakdown::new(15.0, 60.0, 13.0));
    }

    #[test]
    fn remove_meal_recomputes_its_day() {
        let mut diary = FoodDiary::new();
        diary.log_meal(day(5), meal("a", 300.0, MacroBreakdown::ZERO));
        diary.log_meal(day(6), meal("b", 200.0, MacroBreakdown::ZERO));

        let removed = diary.remove_meal("a").unwrap();
        assert_eq!(removed.id, "a");
        assert_eq!(diary.log_for(day(5)).unwrap().total_calories, 0.0);
        assert_eq!(diary.log_for(day(6)).unwrap().total_calories, 200.0);
        assert!(diary.remove_meal("a").is_none());
    }

    #[test]
    fn water_accumulates_and_never_goes_negative() {
        let mut diary = FoodDiary::new();
        diary.add_water(day(5), 250.0);
        assert_eq!(diary.add_water(day(5), 500.0).water_intake, 750.0);
        assert_eq!(diary.add_water(day(5), -1000.0).water_intake, 0.0);
    }

    #[test]
    fn recent_meals_newest_first() {
        let mut diary = FoodDiary::new();
        diary.log_meal(day(6), meal("late-1", 1.0, MacroBreakdown::ZERO));
        diary.log_meal(day(5), meal("early", 1.0, MacroBreakdown::ZERO));
        diary.log_meal(day(6), meal("late-2", 1.0, MacroBreakdown::ZERO));

        let ids: Vec<_> = diary.recent_meals().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["late-2", "late-1", "early"]);
    }
}
