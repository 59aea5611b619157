use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Profile enums
// ---------------------------------------------------------------------------

/// Interface and generation language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Pt,
    Es,
    Zh,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::En => "en",
            Self::Pt => "pt",
            Self::Es => "es",
            Self::Zh => "zh",
        };
        f.write_str(s)
    }
}

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "pt" => Ok(Self::Pt),
            "es" => Ok(Self::Es),
            "zh" => Ok(Self::Zh),
            other => Err(LanguageParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Language`] string.
#[derive(Debug, Clone)]
pub struct LanguageParseError(pub String);

impl fmt::Display for LanguageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid language: {:?}", self.0)
    }
}

impl std::error::Error for LanguageParseError {}

/// Which intake flow produced the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingMode {
    #[default]
    Express,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

impl FromStr for Gender {
    type Err = GenderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(GenderParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Gender`] string.
#[derive(Debug, Clone)]
pub struct GenderParseError(pub String);

impl fmt::Display for GenderParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid gender: {:?} (expected male, female, or other)", self.0)
    }
}

impl std::error::Error for GenderParseError {}

// ---------------------------------------------------------------------------

/// Self-reported physical activity level.
///
/// Labels the client does not recognise deserialize to
/// [`ActivityLevel::Unrecognized`] instead of failing the whole profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityLevel {
    #[serde(rename = "Sedentary")]
    Sedentary,
    #[serde(rename = "Lightly Active")]
    Light,
    #[serde(rename = "Moderately Active")]
    Moderate,
    #[serde(rename = "Very Active")]
    Very,
    #[serde(rename = "Extra Active")]
    Extra,
    #[serde(other)]
    Unrecognized,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sedentary => "Sedentary",
            Self::Light => "Lightly Active",
            Self::Moderate => "Moderately Active",
            Self::Very => "Very Active",
            Self::Extra => "Extra Active",
            Self::Unrecognized => "Unrecognized",
        };
        f.write_str(s)
    }
}

impl FromStr for ActivityLevel {
    type Err = ActivityLevelParseError;

    /// Accepts both the wire labels and the short CLI names
    /// (`sedentary`, `light`, `moderate`, `very`, `extra`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sedentary" => Ok(Self::Sedentary),
            "light" | "lightly active" => Ok(Self::Light),
            "moderate" | "moderately active" => Ok(Self::Moderate),
            "very" | "very active" => Ok(Self::Very),
            "extra" | "extra active" => Ok(Self::Extra),
            _ => Err(ActivityLevelParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ActivityLevel`] string.
#[derive(Debug, Clone)]
pub struct ActivityLevelParseError(pub String);

impl fmt::Display for ActivityLevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid activity level: {:?} (expected sedentary, light, moderate, very, or extra)",
            self.0
        )
    }
}

impl std::error::Error for ActivityLevelParseError {}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellnessLevel {
    Poor,
    Average,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookingTime {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietaryPreference {
    Omnivore,
    Vegetarian,
    Vegan,
    Pescatarian,
    Keto,
    Paleo,
    Mediterranean,
    LowCarb,
    PlantBased,
    Dash,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryGoal {
    Loss,
    #[default]
    Maintain,
    Gain,
    Longevity,
    Performance,
}

// ---------------------------------------------------------------------------
// Profile sections
// ---------------------------------------------------------------------------

/// Body measurements. Zero means "not provided yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Biometrics {
    pub age: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    /// Height in centimetres.
    pub height: f64,
    /// Weight in kilograms.
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waist_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hip_circumference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_fat_percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClinicalData {
    pub medical_conditions: Vec<String>,
    pub medications: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_labs: Option<String>,
    pub family_history: Vec<String>,
    pub mental_health: Vec<String>,
    pub physical_limitations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifestyleData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<ActivityLevel>,
    /// Sessions per week.
    pub exercise_frequency: u32,
    pub exercise_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_quality: Option<WellnessLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bed_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<StressLevel>,
    pub smoking: bool,
    pub alcohol_intake: String,
    pub caffeine_intake: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutineData {
    pub meals_per_day: u32,
    pub preferred_meal_times: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<CookingTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_preference: Option<DietaryPreference>,
    pub allergies: Vec<String>,
    pub intolerances: Vec<String>,
    pub dislikes: Vec<String>,
    pub favorites: Vec<String>,
    pub cultural_restrictions: Vec<String>,
    /// Diet archetype keys (e.g. `mediterranean`, `halal`, `ramadan`).
    pub dietary_profiles: Vec<String>,
    pub regional_styles: Vec<String>,
    pub spiritual_practices: Vec<String>,
    pub ritual_calendar: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_narrative: Option<String>,
    pub taboos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fasting_window: Option<String>,
    pub social_context: String,
}

/// One entry of the user's ranked goal list (priority 1 is highest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalsData {
    pub primary: PrimaryGoal,
    pub prioritized_goals: Vec<GoalItem>,
    pub secondary: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
}

/// Granular consent flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConsent {
    pub data_processing: bool,
    pub analytics: bool,
    pub camera: bool,
    pub notifications: bool,
}

/// A single consent flag, used by settings toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentKind {
    DataProcessing,
    Analytics,
    Camera,
    Notifications,
}

impl UserConsent {
    pub fn set(&mut self, kind: ConsentKind, granted: bool) {
        match kind {
            ConsentKind::DataProcessing => self.data_processing = granted,
            ConsentKind::Analytics => self.analytics = granted,
            ConsentKind::Camera => self.camera = granted,
            ConsentKind::Notifications => self.notifications = granted,
        }
    }
}

/// The complete intake record for one user.
///
/// `id` is assigned once and never changes across edits; history lookups
/// are keyed by it. `bmr`/`tdee` are present once onboarding completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub onboarding_mode: OnboardingMode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub biometrics: Biometrics,
    #[serde(default)]
    pub clinical: ClinicalData,
    #[serde(default)]
    pub lifestyle: LifestyleData,
    #[serde(default)]
    pub routine: RoutineData,
    #[serde(default)]
    pub goals: GoalsData,
    #[serde(default)]
    pub consent: UserConsent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdee: Option<f64>,
}

// ---------------------------------------------------------------------------
// Plan entities
// ---------------------------------------------------------------------------

/// Macronutrients in grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroBreakdown {
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
}

impl MacroBreakdown {
    pub const ZERO: Self = Self {
        protein: 0.0,
        carbs: 0.0,
        fats: 0.0,
    };

    pub fn new(protein: f64, carbs: f64, fats: f64) -> Self {
        Self {
            protein,
            carbs,
            fats,
        }
    }

    /// Component-wise division, each component rounded to the nearest gram.
    pub fn rounded_mean(self, count: usize) -> Self {
        if count == 0 {
            return Self::ZERO;
        }
        let n = count as f64;
        Self {
            protein: (self.protein / n).round(),
            carbs: (self.carbs / n).round(),
            fats: (self.fats / n).round(),
        }
    }
}

impl Add for MacroBreakdown {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fats: self.fats + rhs.fats,
        }
    }
}

impl Sum for MacroBreakdown {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a MacroBreakdown> for MacroBreakdown {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// A single meal. `id` persists across edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealItem {
    /// Empty when the meal came back from analysis and has not been placed yet.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub calories: f64,
    pub macros: MacroBreakdown,
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_edited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub day: String,
    #[serde(default)]
    pub meals: Vec<MealItem>,
    #[serde(default)]
    pub daily_calories: f64,
    #[serde(default)]
    pub daily_macros: MacroBreakdown,
}

/// A seven-day plan with aggregate calorie and macro figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPlan {
    pub id: String,
    #[serde(default)]
    pub days: Vec<DayPlan>,
    #[serde(default)]
    pub average_calories: f64,
    #[serde(default)]
    pub average_macros: MacroBreakdown,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub generated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicronutrientAnalysis {
    pub deficiencies: Vec<String>,
    pub adequacies: Vec<String>,
    pub notes: String,
}

/// Clinical analysis paired 1:1 with the plan generated in the same cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalReport {
    pub id: String,
    #[serde(default)]
    pub generated_at: String,
    /// 0-100.
    #[serde(default)]
    pub overall_score: f64,
    /// Projected change in kg/week (negative means loss).
    #[serde(default)]
    pub weight_projection: f64,
    #[serde(default)]
    pub daily_deficit: f64,
    #[serde(default)]
    pub micronutrient_analysis: MicronutrientAnalysis,
    #[serde(default)]
    pub behavioral_insights: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// One day of the food diary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub meals: Vec<MealItem>,
    #[serde(default)]
    pub total_calories: f64,
    #[serde(default)]
    pub total_macros: MacroBreakdown,
    /// Millilitres.
    #[serde(default)]
    pub water_intake: f64,
}

// ---------------------------------------------------------------------------
// Generation task envelopes
// ---------------------------------------------------------------------------

/// Status of a background generation task as reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Queued,
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether the task has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    /// Whether the task ended without producing a result.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure | Self::Revoked)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Retry => "retry",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Revoked => "revoked",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "pending" => Ok(Self::Pending),
            "started" => Ok(Self::Started),
            "retry" => Ok(Self::Retry),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "revoked" => Ok(Self::Revoked),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

/// Body of `POST /api/agents/plan`.
#[derive(Debug, Serialize)]
pub struct PlanRequest<'a> {
    pub profile: &'a UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<&'a str>,
}

/// Response of both plan submission and task status reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTaskResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<WeeklyPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_report: Option<ClinicalReport>,
}

// ---------------------------------------------------------------------------
// History envelopes
// ---------------------------------------------------------------------------

/// `{plan}` wrapper returned by the plan history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub plan: WeeklyPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// `{report}` wrapper returned by the report history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub report: ClinicalReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Body of `POST /api/analysis/meal`.
#[derive(Debug, Serialize)]
pub struct MealAnalysisRequest<'a> {
    pub text: &'a str,
    pub language: Language,
}

/// Body of `POST /api/profiles/{id}/logs`.
#[derive(Debug, Serialize)]
pub struct MealLogRequest<'a> {
    pub entry: &'a MealItem,
}
