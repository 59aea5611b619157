//! Application state holder.
//!
//! [`AppShell`] wires profile save -> plan generation -> dashboard data, owns
//! the tab state machine, delegates edits to the plan editor, and queues
//! notifications for the presentation layer to drain.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;

use nutri_api::models::{
    ClinicalReport, ConsentKind, Language, MealItem, UserProfile, WeeklyPlan,
};
use nutri_api::{GenerationClient, MealLogClient};

use crate::diary::FoodDiary;
use crate::editor::{EditError, WeeklyPlanEditor};
use crate::history::{PlanHistory, PlanHistoryStore};
use crate::orchestrator::{GenerationOutcome, OrchestratorConfig, PlanGenerator};
use crate::profile;

// ---------------------------------------------------------------------------
// Tabs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Setup,
    HealthStats,
    WeeklyPlan,
    Diary,
    Settings,
}

/// Swipe navigation order. `Setup` sits before the first entry.
const SWIPE_ORDER: [Tab; 4] = [Tab::HealthStats, Tab::WeeklyPlan, Tab::Diary, Tab::Settings];

impl Tab {
    fn swipe_position(self) -> Option<usize> {
        SWIPE_ORDER.iter().position(|t| *t == self)
    }

    /// Tab reached by swiping left (forward).
    pub fn next(self) -> Self {
        match self.swipe_position() {
            None => SWIPE_ORDER[0],
            Some(i) => SWIPE_ORDER.get(i + 1).copied().unwrap_or(self),
        }
    }

    /// Tab reached by swiping right (back).
    pub fn previous(self) -> Self {
        match self.swipe_position() {
            Some(i) if i > 0 => SWIPE_ORDER[i - 1],
            _ => self,
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::HealthStats => "health-stats",
            Self::WeeklyPlan => "weekly-plan",
            Self::Diary => "diary",
            Self::Settings => "settings",
        };
        f.write_str(s)
    }
}

impl FromStr for Tab {
    type Err = TabParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Self::Setup),
            "health-stats" => Ok(Self::HealthStats),
            "weekly-plan" => Ok(Self::WeeklyPlan),
            "diary" => Ok(Self::Diary),
            "settings" => Ok(Self::Settings),
            other => Err(TabParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Tab`] string.
#[derive(Debug, Clone)]
pub struct TabParseError(pub String);

impl fmt::Display for TabParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid tab: {:?}", self.0)
    }
}

impl std::error::Error for TabParseError {}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Achievement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Only achievements carry a title.
    pub title: Option<String>,
    pub message: String,
}

impl Notification {
    fn toast(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            message: message.into(),
        }
    }

    fn achievement(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Achievement,
            title: Some(title.into()),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything the dashboard renders.
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub profile: Option<UserProfile>,
    pub plan: Option<WeeklyPlanEditor>,
    pub clinical_report: Option<ClinicalReport>,
    pub history: PlanHistory,
    pub diary: FoodDiary,
}

impl DashboardData {
    pub fn weekly_plan(&self) -> Option<&WeeklyPlan> {
        self.plan.as_ref().map(WeeklyPlanEditor::plan)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShellError {
    #[error("no weekly plan to edit")]
    NoPlan,

    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Holds `is_generating` up for as long as it lives, including when the
/// owning future is dropped mid-generation.
struct GeneratingFlag<'a>(&'a mut bool);

impl<'a> GeneratingFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for GeneratingFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

pub struct AppShell {
    generator: PlanGenerator,
    history_store: PlanHistoryStore,
    meal_log: Arc<dyn MealLogClient>,
    language: Language,
    active_tab: Tab,
    is_onboarding: bool,
    is_generating: bool,
    data: DashboardData,
    notifications: VecDeque<Notification>,
}

impl fmt::Debug for AppShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppShell")
            .field("language", &self.language)
            .field("active_tab", &self.active_tab)
            .field("is_onboarding", &self.is_onboarding)
            .field("is_generating", &self.is_generating)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl AppShell {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        meal_log: Arc<dyn MealLogClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            generator: PlanGenerator::with_config(Arc::clone(&client), config),
            history_store: PlanHistoryStore::new(client),
            meal_log,
            language: Language::default(),
            active_tab: Tab::Setup,
            is_onboarding: true,
            is_generating: false,
            data: DashboardData::default(),
            notifications: VecDeque::new(),
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn is_onboarding(&self) -> bool {
        self.is_onboarding
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn data(&self) -> &DashboardData {
        &self.data
    }

    /// TDEE minus the current plan's average intake.
    pub fn daily_deficit(&self) -> Option<f64> {
        let profile = self.data.profile.as_ref()?;
        let plan = self.data.weekly_plan()?;
        profile::daily_deficit(profile, plan)
    }

    /// Take every queued notification, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    // -- navigation ---------------------------------------------------------

    fn navigation_locked(&self) -> bool {
        self.is_onboarding || self.is_generating
    }

    /// Switch tabs directly. Ignored until onboarding completes.
    pub fn select_tab(&mut self, tab: Tab) -> bool {
        if self.navigation_locked() {
            return false;
        }
        self.active_tab = tab;
        true
    }

    pub fn swipe_left(&mut self) -> Tab {
        if !self.navigation_locked() {
            self.active_tab = self.active_tab.next();
        }
        self.active_tab
    }

    pub fn swipe_right(&mut self) -> Tab {
        if !self.navigation_locked() {
            self.active_tab = self.active_tab.previous();
        }
        self.active_tab
    }

    // -- flows --------------------------------------------------------------

    /// Save the profile and generate its first (or a fresh) plan.
    ///
    /// On success the dashboard is replaced and the shell lands on
    /// `HealthStats`. On failure the previous data is kept and an error is
    /// queued. Returns whether a plan was produced.
    pub async fn save_profile(&mut self, profile: UserProfile) -> bool {
        let profile = UserProfile {
            language: self.language,
            ..profile
        };

        let outcome = {
            let _generating = GeneratingFlag::raise(&mut self.is_generating);
            self.generator.generate(&profile).await
        };

        match outcome {
            GenerationOutcome::Completed(generated) => {
                tracing::info!(
                    profile_id = %profile.id,
                    task_id = %generated.task_id,
                    resolved_via = %generated.resolved_via,
                    "plan ready"
                );
                self.data.profile = Some(profile);
                self.data.plan = Some(WeeklyPlanEditor::new(generated.weekly_plan));
                self.data.clinical_report = generated.clinical_report;
                self.is_onboarding = false;
                self.active_tab = Tab::HealthStats;
                self.notify(Notification::achievement(
                    "Protocol Initiated",
                    "Your first clinical plan is ready.",
                ));
                true
            }
            failed => {
                let message = failed
                    .failure_message()
                    .unwrap_or("Failed to generate plan. Please try again.");
                self.notify(Notification::toast(NotificationKind::Error, message));
                false
            }
        }
    }

    /// Replace one meal in the current plan.
    pub fn edit_meal(
        &mut self,
        day_index: usize,
        meal_index: usize,
        updated: MealItem,
    ) -> Result<&WeeklyPlan, ShellError> {
        let editor = self.data.plan.as_mut().ok_or(ShellError::NoPlan)?;
        editor.edit_meal(day_index, meal_index, updated)?;
        self.notify(Notification::toast(
            NotificationKind::Success,
            "Weekly protocol updated",
        ));
        self.data.weekly_plan().ok_or(ShellError::NoPlan)
    }

    pub fn edit_meal_by_id(
        &mut self,
        meal_id: &str,
        updated: MealItem,
    ) -> Result<&WeeklyPlan, ShellError> {
        let editor = self.data.plan.as_mut().ok_or(ShellError::NoPlan)?;
        editor.edit_meal_by_id(meal_id, updated)?;
        self.notify(Notification::toast(
            NotificationKind::Success,
            "Weekly protocol updated",
        ));
        self.data.weekly_plan().ok_or(ShellError::NoPlan)
    }

    /// Reload history for the current profile. Either both lists load or
    /// both are cleared.
    pub async fn load_history(&mut self) -> bool {
        let Some(profile_id) = self.data.profile.as_ref().map(|p| p.id.clone()) else {
            return false;
        };

        match self.history_store.load(&profile_id).await {
            Ok(mut history) => {
                history.sort_newest_first();
                self.data.history = history;
                true
            }
            Err(_) => {
                self.data.history = PlanHistory::default();
                self.notify(Notification::toast(
                    NotificationKind::Error,
                    "Failed to load history",
                ));
                false
            }
        }
    }

    /// Record a meal locally, then persist it.
    ///
    /// A persistence failure keeps the local entry and queues an error.
    pub async fn log_meal(&mut self, date: NaiveDate, meal: MealItem) -> bool {
        self.data.diary.log_meal(date, meal.clone());

        let Some(profile_id) = self.data.profile.as_ref().map(|p| p.id.clone()) else {
            return true;
        };
        match self.meal_log.log_meal(&profile_id, &meal).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(profile_id = %profile_id, meal_id = %meal.id, error = %e, "meal not persisted");
                self.notify(Notification::toast(
                    NotificationKind::Error,
                    "Meal saved on this device but could not be synced",
                ));
                false
            }
        }
    }

    pub fn remove_meal(&mut self, meal_id: &str) -> Option<MealItem> {
        self.data.diary.remove_meal(meal_id)
    }

    /// Toggle a consent flag on the current profile. The profile id is kept.
    pub fn set_consent(&mut self, kind: ConsentKind, granted: bool) -> bool {
        match self.data.profile.as_mut() {
            Some(profile) => {
                profile.consent.set(kind, granted);
                true
            }
            None => false,
        }
    }

    /// Discard the profile and everything derived from it and return to
    /// onboarding.
    pub fn reset_account(&mut self) {
        self.data = DashboardData::default();
        self.is_onboarding = true;
        self.active_tab = Tab::Setup;
        self.notify(Notification::toast(
            NotificationKind::Info,
            "Account reset successfully",
        ));
    }
}
