//! Weekly plan editing with aggregate recomputation.
//!
//! Every edit produces a new [`WeeklyPlan`] whose day totals and week
//! averages already agree with its meals:
//!
//! - `day.dailyCalories` / `day.dailyMacros` are exact sums of the day's meals.
//! - `averageCalories` / `averageMacros` are the rounded mean over the days.
//!
//! Edits go meal -> day -> week, in that order, because each step reads the
//! previous one's output.

use std::fmt;

use nutri_api::models::{DayPlan, MacroBreakdown, MealItem, WeeklyPlan};

const SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("day index {day} out of range (plan has {days} days)")]
    DayOutOfRange { day: usize, days: usize },

    #[error("meal index {meal} out of range for day {day} ({meals} meals)")]
    MealOutOfRange { day: usize, meal: usize, meals: usize },

    #[error("no meal with id {0:?} in plan")]
    MealNotFound(String),
}

// ---------------------------------------------------------------------------
// Recomputation
// ---------------------------------------------------------------------------

/// Calorie and macro sums over a set of meals.
pub fn meal_totals(meals: &[MealItem]) -> (f64, MacroBreakdown) {
    let calories: f64 = meals.iter().map(|m| m.calories).sum();
    let macros: MacroBreakdown = meals.iter().map(|m| &m.macros).sum();
    (calories, macros)
}

fn with_day_totals(day: DayPlan) -> DayPlan {
    let (daily_calories, daily_macros) = meal_totals(&day.meals);
    DayPlan {
        daily_calories,
        daily_macros,
        ..day
    }
}

/// Recompute week averages from the (already current) day totals.
fn with_week_averages(plan: WeeklyPlan) -> WeeklyPlan {
    let count = plan.days.len();
    let (average_calories, average_macros) = if count == 0 {
        (0.0, MacroBreakdown::ZERO)
    } else {
        let calories: f64 = plan.days.iter().map(|d| d.daily_calories).sum();
        let macros: MacroBreakdown = plan.days.iter().map(|d| &d.daily_macros).sum();
        ((calories / count as f64).round(), macros.rounded_mean(count))
    };
    WeeklyPlan {
        average_calories,
        average_macros,
        ..plan
    }
}

/// Normalize every day total and the week averages.
///
/// Applied to freshly generated plans so the invariants hold before the
/// first edit.
pub fn recompute_aggregates(plan: &WeeklyPlan) -> WeeklyPlan {
    let days = plan.days.iter().cloned().map(with_day_totals).collect();
    with_week_averages(WeeklyPlan {
        id: plan.id.clone(),
        days,
        average_calories: plan.average_calories,
        average_macros: plan.average_macros,
        recommendations: plan.recommendations.clone(),
        generated_at: plan.generated_at.clone(),
    })
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Replace one meal and recompute the affected day and the week.
///
/// The replacement keeps the original meal's id and is stamped
/// `isEdited = true`. The input plan is left untouched.
pub fn apply_meal_edit(
    plan: &WeeklyPlan,
    day_index: usize,
    meal_index: usize,
    updated: MealItem,
) -> Result<WeeklyPlan, EditError> {
    let day = plan.days.get(day_index).ok_or(EditError::DayOutOfRange {
        day: day_index,
        days: plan.days.len(),
    })?;
    let original = day.meals.get(meal_index).ok_or(EditError::MealOutOfRange {
        day: day_index,
        meal: meal_index,
        meals: day.meals.len(),
    })?;

    let replacement = MealItem {
        id: original.id.clone(),
        is_edited: true,
        ..updated
    };

    let meals = day
        .meals
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if i == meal_index {
                replacement.clone()
            } else {
                m.clone()
            }
        })
        .collect();
    let edited_day = with_day_totals(DayPlan {
        day: day.day.clone(),
        meals,
        daily_calories: day.daily_calories,
        daily_macros: day.daily_macros,
    });

    let mut days = plan.days.clone();
    days[day_index] = edited_day;

    Ok(with_week_averages(WeeklyPlan {
        id: plan.id.clone(),
        days,
        average_calories: plan.average_calories,
        average_macros: plan.average_macros,
        recommendations: plan.recommendations.clone(),
        generated_at: plan.generated_at.clone(),
    }))
}

/// `(day_index, meal_index)` of the meal with `meal_id`.
pub fn locate_meal(plan: &WeeklyPlan, meal_id: &str) -> Option<(usize, usize)> {
    plan.days.iter().enumerate().find_map(|(d, day)| {
        day.meals
            .iter()
            .position(|m| m.id == meal_id)
            .map(|m| (d, m))
    })
}

/// [`apply_meal_edit`] addressed by the meal's stable id.
pub fn apply_meal_edit_by_id(
    plan: &WeeklyPlan,
    meal_id: &str,
    updated: MealItem,
) -> Result<WeeklyPlan, EditError> {
    let (day, meal) =
        locate_meal(plan, meal_id).ok_or_else(|| EditError::MealNotFound(meal_id.to_owned()))?;
    apply_meal_edit(plan, day, meal, updated)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Where an aggregate disagreed with its constituents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateScope {
    Day(usize),
    Week,
}

impl fmt::Display for AggregateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(i) => write!(f, "day {i}"),
            Self::Week => f.write_str("week"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{scope} {field}: stored {stored}, expected {expected}")]
pub struct AggregateMismatch {
    pub scope: AggregateScope,
    pub field: &'static str,
    pub stored: f64,
    pub expected: f64,
}

fn check_field(
    scope: AggregateScope,
    field: &'static str,
    stored: f64,
    expected: f64,
) -> Result<(), AggregateMismatch> {
    if (stored - expected).abs() <= SUM_TOLERANCE {
        Ok(())
    } else {
        Err(AggregateMismatch {
            scope,
            field,
            stored,
            expected,
        })
    }
}

fn check_macros(
    scope: AggregateScope,
    stored: MacroBreakdown,
    expected: MacroBreakdown,
) -> Result<(), AggregateMismatch> {
    check_field(scope, "protein", stored.protein, expected.protein)?;
    check_field(scope, "carbs", stored.carbs, expected.carbs)?;
    check_field(scope, "fats", stored.fats, expected.fats)
}

/// Report the first aggregate that does not match its meals or days.
pub fn check_aggregates(plan: &WeeklyPlan) -> Result<(), AggregateMismatch> {
    for (i, day) in plan.days.iter().enumerate() {
        let scope = AggregateScope::Day(i);
        let (calories, macros) = meal_totals(&day.meals);
        check_field(scope, "calories", day.daily_calories, calories)?;
        check_macros(scope, day.daily_macros, macros)?;
    }

    let expected = with_week_averages(WeeklyPlan {
        days: plan.days.clone(),
        ..WeeklyPlan::default()
    });
    check_field(
        AggregateScope::Week,
        "calories",
        plan.average_calories,
        expected.average_calories,
    )?;
    check_macros(AggregateScope::Week, plan.average_macros, expected.average_macros)
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// Owns the current plan and applies edits one at a time.
///
/// Edits take `&mut self`, so two edits can never race on the aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyPlanEditor {
    plan: WeeklyPlan,
}

impl WeeklyPlanEditor {
    /// Take ownership of `plan`, normalizing its aggregates.
    pub fn new(plan: WeeklyPlan) -> Self {
        Self {
            plan: recompute_aggregates(&plan),
        }
    }

    pub fn plan(&self) -> &WeeklyPlan {
        &self.plan
    }

    pub fn into_plan(self) -> WeeklyPlan {
        self.plan
    }

    pub fn edit_meal(
        &mut self,
        day_index: usize,
        meal_index: usize,
        updated: MealItem,
    ) -> Result<&WeeklyPlan, EditError> {
        self.plan = apply_meal_edit(&self.plan, day_index, meal_index, updated)?;
        tracing::debug!(
            plan_id = %self.plan.id,
            day = day_index,
            meal = meal_index,
            average_calories = self.plan.average_calories,
            "meal edited"
        );
        Ok(&self.plan)
    }

    pub fn edit_meal_by_id(
        &mut self,
        meal_id: &str,
        updated: MealItem,
    ) -> Result<&WeeklyPlan, EditError> {
        let (day, meal) = locate_meal(&self.plan, meal_id)
            .ok_or_else(|| EditError::MealNotFound(meal_id.to_owned()))?;
        self.edit_meal(day, meal, updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_test_utils::{meal, uniform_week};

    fn replacement(calories: f64) -> MealItem {
        MealItem {
            name: "Big lunch".into(),
            ..meal("ignored-id", calories, MacroBreakdown::new(40.0, 30.0, 10.0))
        }
    }

    #[test]
    fn uniform_week_is_consistent() {
        assert_eq!(check_aggregates(&uniform_week("w")), Ok(()));
    }

    #[test]
    fn edit_recomputes_day_and_week() {
        let plan = uniform_week("w");
        let edited = apply_meal_edit(&plan, 0, 0, replacement(500.0)).unwrap();

        assert_eq!(edited.days[0].daily_calories, 2214.0);
        assert_eq!(edited.days[0].daily_macros, MacroBreakdown::new(160.0, 210.0, 70.0));
        // round((2214 + 6 * 2000) / 7) = round(2030.57)
        assert_eq!(edited.average_calories, 2031.0);
        assert_eq!(edited.average_macros.protein, 143.0);
        assert_eq!(check_aggregates(&edited), Ok(()));

        // Untouched days keep their totals.
        for day in &edited.days[1..] {
            assert_eq!(day.daily_calories, 2000.0);
        }
    }

    #[test]
    fn edit_keeps_meal_id_and_marks_edited() {
        let plan = uniform_week("w");
        let edited = apply_meal_edit(&plan, 2, 3, replacement(300.0)).unwrap();
        let meal = &edited.days[2].meals[3];
        assert_eq!(meal.id, "d2-m3");
        assert_eq!(meal.name, "Big lunch");
        assert!(meal.is_edited);
    }

    #[test]
    fn edit_does_not_touch_input() {
        let plan = uniform_week("w");
        let before = plan.clone();
        let _ = apply_meal_edit(&plan, 0, 0, replacement(900.0)).unwrap();
        assert_eq!(plan, before);
    }

    #[test]
    fn same_edit_twice_is_idempotent() {
        let plan = uniform_week("w");
        let once = apply_meal_edit(&plan, 4, 1, replacement(512.5)).unwrap();
        let twice = apply_meal_edit(&once, 4, 1, replacement(512.5)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn invariants_hold_after_any_single_edit() {
        let plan = uniform_week("w");
        for d in 0..plan.days.len() {
            for m in 0..plan.days[d].meals.len() {
                let kcal = 100.0 + (d * 37 + m * 11) as f64;
                let edited = apply_meal_edit(&plan, d, m, replacement(kcal)).unwrap();
                assert_eq!(check_aggregates(&edited), Ok(()), "edit at ({d}, {m})");
            }
        }
    }

    #[test]
    fn out_of_range_indices_are_errors() {
        let plan = uniform_week("w");
        assert_eq!(
            apply_meal_edit(&plan, 7, 0, replacement(1.0)),
            Err(EditError::DayOutOfRange { day: 7, days: 7 })
        );
        assert_eq!(
            apply_meal_edit(&plan, 0, 9, replacement(1.0)),
            Err(EditError::MealOutOfRange {
                day: 0,
                meal: 9,
                meals: 7
            })
        );
    }

    #[test]
    fn edit_by_id_locates_meal() {
        let plan = uniform_week("w");
        assert_eq!(locate_meal(&plan, "d5-m6"), Some((5, 6)));
        let edited = apply_meal_edit_by_id(&plan, "d5-m6", replacement(385.0)).unwrap();
        assert_eq!(edited.days[5].daily_calories, 2100.0);

        assert_eq!(
            apply_meal_edit_by_id(&plan, "nope", replacement(1.0)),
            Err(EditError::MealNotFound("nope".into()))
        );
    }

    #[test]
    fn recompute_fixes_stale_aggregates() {
        let mut plan = uniform_week("w");
        plan.days[3].daily_calories = 1.0;
        plan.average_calories = 42.0;
        let err = check_aggregates(&plan).unwrap_err();
        assert_eq!(err.scope, AggregateScope::Day(3));
        assert_eq!(err.field, "calories");

        let fixed = recompute_aggregates(&plan);
        assert_eq!(check_aggregates(&fixed), Ok(()));
        assert_eq!(fixed.average_calories, 2000.0);
    }

    #[test]
    fn empty_plan_has_zero_averages() {
        let plan = recompute_aggregates(&WeeklyPlan::default());
        assert_eq!(plan.average_calories, 0.0);
        assert_eq!(plan.average_macros, MacroBreakdown::ZERO);
    }

    #[test]
    fn editor_serializes_edits() {
        let mut editor = WeeklyPlanEditor::new(uniform_week("w"));
        editor.edit_meal(0, 0, replacement(500.0)).unwrap();
        editor.edit_meal_by_id("d1-m0", replacement(500.0)).unwrap();

        let plan = editor.into_plan();
        assert_eq!(plan.days[0].daily_calories, 2214.0);
        assert_eq!(plan.days[1].daily_calories, 2214.0);
        // round((2 * 2214 + 5 * 2000) / 7) = round(2061.14)
        assert_eq!(plan.average_calories, 2061.0);
    }
}
