//! Meal commands: `nutri analyze-meal` and `nutri edit-meal`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use nutri_api::models::{Language, MealItem, UserProfile, WeeklyPlan};
use nutri_api::{MealAnalysisClient, MealLogClient};
use nutri_core::analysis::{EstimateSource, MealEstimate, estimate_meal};
use nutri_core::editor::WeeklyPlanEditor;

use crate::generate_cmd::render_plan_summary;
use crate::profile_cmds::write_json;

/// Which meal of the plan to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MealSelector {
    Position { day: usize, meal: usize },
    Id(String),
}

impl MealSelector {
    /// Build a selector from the command-line flags.
    pub fn from_args(
        day: Option<usize>,
        meal: Option<usize>,
        meal_id: Option<String>,
    ) -> Result<Self> {
        match (day, meal, meal_id) {
            (None, None, Some(id)) => Ok(Self::Id(id)),
            (Some(day), Some(meal), None) => Ok(Self::Position { day, meal }),
            _ => bail!("select a meal with either --meal-id or both --day and --meal"),
        }
    }
}

pub fn render_estimate(estimate: &MealEstimate) -> String {
    let meal = &estimate.meal;
    let source = match estimate.source {
        EstimateSource::Remote => "analysis service",
        EstimateSource::Heuristic => "local estimate",
    };
    format!(
        "{} ({source})\n  {:.0} kcal  P {:.0}g  C {:.0}g  F {:.0}g\n",
        meal.name, meal.calories, meal.macros.protein, meal.macros.carbs, meal.macros.fats
    )
}

/// Run `nutri analyze-meal`. With `log_for`, the estimate is also saved to
/// that profile's food log.
pub async fn run_analyze_meal<C>(
    client: &C,
    text: &str,
    language: Language,
    log_for: Option<&str>,
) -> Result<MealItem>
where
    C: MealAnalysisClient + MealLogClient,
{
    let estimate = estimate_meal(client, text, language).await?;
    print!("{}", render_estimate(&estimate));

    if let Some(profile_id) = log_for {
        client
            .log_meal(profile_id, &estimate.meal)
            .await
            .context("meal estimated but could not be logged")?;
        println!("Logged to profile {profile_id}.");
    }
    Ok(estimate.meal)
}

/// Replace one meal of a saved plan with an estimate of `text`.
///
/// The edited plan is written to `output`, or back to `plan_file`.
pub async fn run_edit_meal(
    client: &dyn MealAnalysisClient,
    plan_file: &Path,
    selector: MealSelector,
    text: &str,
    language: Language,
    output: Option<&Path>,
) -> Result<WeeklyPlan> {
    let contents = std::fs::read_to_string(plan_file)
        .with_context(|| format!("failed to read plan file: {}", plan_file.display()))?;
    let plan: WeeklyPlan = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse plan JSON from {}", plan_file.display()))?;

    let estimate = estimate_meal(client, text, language).await?;
    print!("{}", render_estimate(&estimate));

    let mut editor = WeeklyPlanEditor::new(plan);
    match selector {
        MealSelector::Position { day, meal } => editor.edit_meal(day, meal, estimate.meal)?,
        MealSelector::Id(id) => editor.edit_meal_by_id(&id, estimate.meal)?,
    };
    let edited = editor.into_plan();

    print!(
        "{}",
        render_plan_summary(&UserProfile::default(), &edited, Some("Updated plan"))
    );

    let target = output.unwrap_or(plan_file);
    write_json(target, &edited)?;
    println!("Plan written to {}", target.display());
    Ok(edited)
}
