//! Free-text meal estimation with a local fallback.
//!
//! The remote analysis collaborator is preferred. When it fails, the meal is
//! estimated from the number of items in the description so the edit or
//! diary flow can continue.

use chrono::Utc;
use uuid::Uuid;

use nutri_api::MealAnalysisClient;
use nutri_api::models::{Language, MacroBreakdown, MealItem};

/// Calories assumed per item by the local estimate.
pub const HEURISTIC_KCAL_PER_ITEM: f64 = 250.0;

// Energy split by macro, and kcal per gram.
const PROTEIN_SHARE: f64 = 0.20;
const CARBS_SHARE: f64 = 0.50;
const FATS_SHARE: f64 = 0.30;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

const MAX_NAME_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    Remote,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MealEstimate {
    pub meal: MealItem,
    pub source: EstimateSource,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("meal description is empty")]
pub struct EmptyMealText;

/// Estimate a meal from its description.
///
/// The returned meal always has an id and a timestamp.
pub async fn estimate_meal(
    client: &dyn MealAnalysisClient,
    text: &str,
    language: Language,
) -> Result<MealEstimate, EmptyMealText> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EmptyMealText);
    }

    match client.analyze_meal(text, language).await {
        Ok(meal) if !meal.name.trim().is_empty() => Ok(MealEstimate {
            meal: complete(meal),
            source: EstimateSource::Remote,
        }),
        Ok(_) => {
            tracing::warn!("meal analysis returned no name, using local estimate");
            Ok(heuristic(text))
        }
        Err(e) => {
            tracing::warn!(error = %e, "meal analysis failed, using local estimate");
            Ok(heuristic(text))
        }
    }
}

fn complete(mut meal: MealItem) -> MealItem {
    if meal.id.is_empty() {
        meal.id = Uuid::new_v4().to_string();
    }
    if meal.timestamp.is_empty() {
        meal.timestamp = Utc::now().to_rfc3339();
    }
    meal
}

/// Number of items in a description like `"eggs, toast + coffee and juice"`.
pub fn count_items(text: &str) -> usize {
    text.to_lowercase()
        .split(['+', ','])
        .flat_map(|part| part.split(" and "))
        .filter(|item| !item.trim().is_empty())
        .count()
        .max(1)
}

/// Local estimate: a fixed energy per item split 20/50/30 by energy.
pub fn heuristic_macros(calories: f64) -> MacroBreakdown {
    MacroBreakdown::new(
        (calories * PROTEIN_SHARE / KCAL_PER_G_PROTEIN).round(),
        (calories * CARBS_SHARE / KCAL_PER_G_CARBS).round(),
        (calories * FATS_SHARE / KCAL_PER_G_FAT).round(),
    )
}

fn heuristic(text: &str) -> MealEstimate {
    let items = count_items(text);
    let calories = HEURISTIC_KCAL_PER_ITEM * items as f64;
    let name: String = text.chars().take(MAX_NAME_CHARS).collect();

    MealEstimate {
        meal: complete(MealItem {
            name,
            description: Some(format!("Estimated locally from {items} item(s)")),
            calories,
            macros: heuristic_macros(calories),
            ..MealItem::default()
        }),
        source: EstimateSource::Heuristic,
    }
}
