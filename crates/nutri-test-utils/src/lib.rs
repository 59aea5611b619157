//! Shared test utilities for nutri integration tests.
//!
//! Provides data fixtures and [`ScriptedClient`], an in-memory
//! [`GenerationClient`] whose responses are scripted per test and whose
//! calls are counted so tests can assert on exactly what the code under
//! test did.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use nutri_api::models::{
    ActivityLevel, Biometrics, ClinicalReport, DayPlan, Gender, Language, LifestyleData,
    MacroBreakdown, MealItem, MicronutrientAnalysis, PlanTaskResponse, TaskStatus, UserConsent,
    UserProfile, WeeklyPlan,
};
use nutri_api::{
    AgentEvent, ClientError, EventBus, GenerationClient, MealAnalysisClient, MealLogClient,
    Subscription,
};

pub const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// ===========================================================================
// Fixtures
// ===========================================================================

/// A complete profile: 30-year-old male, 180 cm, 80 kg, moderately active.
/// BMR 1780, TDEE 2759.
pub fn sample_profile() -> UserProfile {
    UserProfile {
        id: "profile-1".to_owned(),
        language: Language::En,
        name: "Ana".to_owned(),
        biometrics: Biometrics {
            age: 30,
            gender: Some(Gender::Male),
            height: 180.0,
            weight: 80.0,
            ..Biometrics::default()
        },
        lifestyle: LifestyleData {
            activity_level: Some(ActivityLevel::Moderate),
            ..LifestyleData::default()
        },
        consent: UserConsent {
            data_processing: true,
            ..UserConsent::default()
        },
        bmr: Some(1780.0),
        tdee: Some(2759.0),
        ..UserProfile::default()
    }
}

pub fn meal(id: &str, calories: f64, macros: MacroBreakdown) -> MealItem {
    MealItem {
        id: id.to_owned(),
        name: format!("Meal {id}"),
        description: None,
        calories,
        macros,
        timestamp: "2026-01-05T08:00:00Z".to_owned(),
        is_edited: false,
    }
}

/// Seven days of seven meals each, 2000 kcal and 140/210/70 g per day.
///
/// Meal calories are `[286, 286, 286, 286, 286, 285, 285]`; meal ids are
/// `d{day}-m{meal}`.
pub fn uniform_week(id: &str) -> WeeklyPlan {
    const MEAL_CALORIES: [f64; 7] = [286.0, 286.0, 286.0, 286.0, 286.0, 285.0, 285.0];
    let per_meal = MacroBreakdown::new(20.0, 30.0, 10.0);

    let days = DAY_NAMES
        .iter()
        .enumerate()
        .map(|(d, name)| DayPlan {
            day: (*name).to_owned(),
            meals: MEAL_CALORIES
                .iter()
                .enumerate()
                .map(|(m, kcal)| meal(&format!("d{d}-m{m}"), *kcal, per_meal))
                .collect(),
            daily_calories: 2000.0,
            daily_macros: MacroBreakdown::new(140.0, 210.0, 70.0),
        })
        .collect();

    WeeklyPlan {
        id: id.to_owned(),
        days,
        average_calories: 2000.0,
        average_macros: MacroBreakdown::new(140.0, 210.0, 70.0),
        recommendations: vec!["Keep protein steady across meals".to_owned()],
        generated_at: "2026-01-05T08:00:00Z".to_owned(),
    }
}

pub fn sample_report(id: &str) -> ClinicalReport {
    ClinicalReport {
        id: id.to_owned(),
        generated_at: "2026-01-05T08:00:00Z".to_owned(),
        overall_score: 78.0,
        weight_projection: -0.5,
        daily_deficit: 759.0,
        micronutrient_analysis: MicronutrientAnalysis {
            deficiencies: vec!["Vitamin D".to_owned()],
            adequacies: vec!["Iron".to_owned()],
            notes: "Increase sun exposure".to_owned(),
        },
        behavioral_insights: vec!["Late dinners".to_owned()],
        risks: Vec::new(),
    }
}

pub fn task(task_id: &str, status: TaskStatus) -> PlanTaskResponse {
    PlanTaskResponse {
        task_id: task_id.to_owned(),
        status,
        ..PlanTaskResponse::default()
    }
}

// ===========================================================================
// ScriptedClient
// ===========================================================================

/// In-memory client with scripted responses.
///
/// - `enqueue` returns the scripted task (default `T1`, `queued`) and can
///   publish an event on the detached bus right after submission.
/// - `get_status` pops scripted responses in order, repeating the last one
///   once the script runs out (default: `pending`).
/// - `fetch_latest_plan` pops scripted values in order, repeating the last.
pub struct ScriptedClient {
    bus: EventBus,
    script: Mutex<Script>,
    logged: Mutex<Vec<(String, MealItem)>>,
    correlation_ids: Mutex<Vec<Option<String>>>,
    pub enqueue_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub latest_plan_calls: AtomicUsize,
    pub latest_report_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub analysis_calls: AtomicUsize,
}

struct Script {
    enqueue: Result<PlanTaskResponse, ClientError>,
    on_enqueue: Vec<AgentEvent>,
    statuses: VecDeque<Result<PlanTaskResponse, ClientError>>,
    on_status: Vec<(usize, AgentEvent)>,
    latest_plans: VecDeque<Option<WeeklyPlan>>,
    latest_report: Option<ClinicalReport>,
    plans: Result<Vec<WeeklyPlan>, ClientError>,
    reports: Result<Vec<ClinicalReport>, ClientError>,
    analysis: Result<MealItem, ClientError>,
    log_result: Result<(), ClientError>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            bus: EventBus::detached(),
            script: Mutex::new(Script {
                enqueue: Ok(task("T1", TaskStatus::Queued)),
                on_enqueue: Vec::new(),
                statuses: VecDeque::new(),
                on_status: Vec::new(),
                latest_plans: VecDeque::new(),
                latest_report: None,
                plans: Ok(Vec::new()),
                reports: Ok(Vec::new()),
                analysis: Err(ClientError::MealAnalysis("not scripted".to_owned())),
                log_result: Ok(()),
            }),
            logged: Mutex::new(Vec::new()),
            correlation_ids: Mutex::new(Vec::new()),
            enqueue_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            latest_plan_calls: AtomicUsize::new(0),
            latest_report_calls: AtomicUsize::new(0),
            history_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            analysis_calls: AtomicUsize::new(0),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- scripting ----------------------------------------------------------

    pub fn with_enqueue(self, response: PlanTaskResponse) -> Self {
        self.script().enqueue = Ok(response);
        self
    }

    pub fn failing_enqueue(self, message: &str) -> Self {
        self.script().enqueue = Err(ClientError::Submission(message.to_owned()));
        self
    }

    /// Publish `event` on the bus right after a successful enqueue.
    pub fn emit_on_enqueue(self, event: AgentEvent) -> Self {
        self.script().on_enqueue.push(event);
        self
    }

    /// Publish `event` when the `call`-th status poll (1-based) happens.
    pub fn emit_on_status_call(self, call: usize, event: AgentEvent) -> Self {
        self.script().on_status.push((call, event));
        self
    }

    pub fn with_status(self, response: PlanTaskResponse) -> Self {
        self.script().statuses.push_back(Ok(response));
        self
    }

    pub fn with_status_error(self, message: &str) -> Self {
        let task_id = self.task_id();
        self.script().statuses.push_back(Err(ClientError::StatusFetch {
            task_id,
            message: message.to_owned(),
        }));
        self
    }

    pub fn with_latest_plan(self, plan: Option<WeeklyPlan>) -> Self {
        self.script().latest_plans.push_back(plan);
        self
    }

    pub fn with_latest_report(self, report: Option<ClinicalReport>) -> Self {
        self.script().latest_report = report;
        self
    }

    pub fn with_history(self, plans: Vec<WeeklyPlan>, reports: Vec<ClinicalReport>) -> Self {
        {
            let mut script = self.script();
            script.plans = Ok(plans);
            script.reports = Ok(reports);
        }
        self
    }

    pub fn failing_reports(self, message: &str) -> Self {
        self.script().reports = Err(ClientError::history("reports", "profile-1", message));
        self
    }

    pub fn with_analysis(self, meal: MealItem) -> Self {
        self.script().analysis = Ok(meal);
        self
    }

    pub fn failing_log(self, message: &str) -> Self {
        self.script().log_result = Err(ClientError::MealLog {
            profile_id: "profile-1".to_owned(),
            message: message.to_owned(),
        });
        self
    }

    // -- inspection ---------------------------------------------------------

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn task_id(&self) -> String {
        match &self.script().enqueue {
            Ok(task) => task.task_id.clone(),
            Err(_) => "T1".to_owned(),
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn logged_meals(&self) -> Vec<(String, MealItem)> {
        self.logged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Correlation ids passed to each `enqueue` call.
    pub fn correlation_ids(&self) -> Vec<Option<String>> {
        self.correlation_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn enqueue(
        &self,
        _profile: &UserProfile,
        correlation_id: Option<&str>,
    ) -> Result<PlanTaskResponse, ClientError> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        self.correlation_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(correlation_id.map(str::to_owned));

        let (result, events) = {
            let script = self.script();
            (script.enqueue.clone(), script.on_enqueue.clone())
        };
        if result.is_ok() {
            for event in events {
                self.bus.publish(event.to_frame());
            }
        }
        result
    }

    async fn get_status(&self, _task_id: &str) -> Result<PlanTaskResponse, ClientError> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (result, events) = {
            let mut script = self.script();
            let result = if script.statuses.len() > 1 {
                script.statuses.pop_front()
            } else {
                script.statuses.front().cloned()
            };
            let events: Vec<AgentEvent> = script
                .on_status
                .iter()
                .filter(|(at, _)| *at == call)
                .map(|(_, e)| e.clone())
                .collect();
            let fallback = match &script.enqueue {
                Ok(t) => t.task_id.clone(),
                Err(_) => "T1".to_owned(),
            };
            (
                result.unwrap_or_else(|| Ok(task(&fallback, TaskStatus::Pending))),
                events,
            )
        };
        for event in events {
            self.bus.publish(event.to_frame());
        }
        result
    }

    async fn fetch_latest_plan(
        &self,
        _profile_id: &str,
    ) -> Result<Option<WeeklyPlan>, ClientError> {
        self.latest_plan_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        let plan = if script.latest_plans.len() > 1 {
            script.latest_plans.pop_front().flatten()
        } else {
            script.latest_plans.front().cloned().flatten()
        };
        Ok(plan)
    }

    async fn fetch_latest_report(
        &self,
        _profile_id: &str,
    ) -> Result<Option<ClinicalReport>, ClientError> {
        self.latest_report_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.script().latest_report.clone())
    }

    async fn fetch_plans(&self, _profile_id: &str) -> Result<Vec<WeeklyPlan>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.script().plans.clone()
    }

    async fn fetch_reports(&self, _profile_id: &str) -> Result<Vec<ClinicalReport>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.script().reports.clone()
    }

    fn subscribe_events(&self) -> Subscription {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.bus.subscribe()
    }
}

#[async_trait]
impl MealAnalysisClient for ScriptedClient {
    async fn analyze_meal(&self, _text: &str, _language: Language) -> Result<MealItem, ClientError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        self.script().analysis.clone()
    }
}

#[async_trait]
impl MealLogClient for ScriptedClient {
    async fn log_meal(&self, profile_id: &str, meal: &MealItem) -> Result<(), ClientError> {
        let result = self.script().log_result.clone();
        if result.is_ok() {
            self.logged
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((profile_id.to_owned(), meal.clone()));
        }
        result
    }
}
