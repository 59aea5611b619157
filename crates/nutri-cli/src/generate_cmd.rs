//! `nutri generate` and `nutri status`: submit a profile and follow the task.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};

use nutri_api::GenerationClient;
use nutri_api::models::{ClinicalReport, UserProfile, WeeklyPlan};
use nutri_core::editor::recompute_aggregates;
use nutri_core::profile::daily_deficit;
use nutri_core::{GenerationOutcome, OrchestratorConfig, PlanGenerator};

use crate::profile_cmds::{load_profile, write_json};

/// Run `nutri generate`.
pub async fn run_generate(
    client: Arc<dyn GenerationClient>,
    config: OrchestratorConfig,
    profile_file: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let profile = load_profile(profile_file)?;
    let plan = generate_plan(client, config, &profile).await?;

    print!("{}", render_plan_summary(&profile, &plan, None));

    if let Some(path) = output {
        write_json(path, &plan)?;
        println!("Plan written to {}", path.display());
    }
    Ok(())
}

/// Generate and normalize a plan, turning every failed outcome into an error.
pub async fn generate_plan(
    client: Arc<dyn GenerationClient>,
    config: OrchestratorConfig,
    profile: &UserProfile,
) -> Result<WeeklyPlan> {
    println!(
        "Generating plan for {} (up to {} status checks)...",
        profile.name, config.max_attempts
    );
    let generator = PlanGenerator::with_config(client, config);
    let outcome = generator.generate(profile).await;
    let message = outcome.failure_message().unwrap_or_default();

    match outcome {
        GenerationOutcome::Completed(generated) => {
            println!(
                "Task {} resolved via {}.",
                generated.task_id, generated.resolved_via
            );
            if let Some(report) = &generated.clinical_report {
                print!("{}", render_report(report));
            }
            Ok(recompute_aggregates(&generated.weekly_plan))
        }
        GenerationOutcome::SubmissionFailed { reason } => bail!("{message} ({reason})"),
        GenerationOutcome::TaskFailed { task_id, status } => {
            bail!("{message} (task {task_id} ended as {status})")
        }
        GenerationOutcome::MissingPlan { task_id } => {
            bail!("{message} (task {task_id} finished without a plan)")
        }
        GenerationOutcome::TimedOut { task_id, attempts } => {
            bail!("{message} (task {task_id} unresolved after {attempts} checks)")
        }
    }
}

/// Per-day calories and macros plus the weekly average.
pub fn render_plan_summary(
    profile: &UserProfile,
    plan: &WeeklyPlan,
    heading: Option<&str>,
) -> String {
    let mut out = format!("{} ({})\n", heading.unwrap_or("Weekly plan"), plan.id);
    for day in &plan.days {
        out.push_str(&format!(
            "  {:<10} {:>6.0} kcal  P {:>4.0}g  C {:>4.0}g  F {:>4.0}g  ({} meals)\n",
            day.day,
            day.daily_calories,
            day.daily_macros.protein,
            day.daily_macros.carbs,
            day.daily_macros.fats,
            day.meals.len(),
        ));
    }
    out.push_str(&format!(
        "  {:<10} {:>6.0} kcal  P {:>4.0}g  C {:>4.0}g  F {:>4.0}g\n",
        "average",
        plan.average_calories,
        plan.average_macros.protein,
        plan.average_macros.carbs,
        plan.average_macros.fats,
    ));
    if let Some(deficit) = daily_deficit(profile, plan) {
        out.push_str(&format!("Daily deficit: {deficit:.0} kcal\n"));
    }
    out
}

fn render_report(report: &ClinicalReport) -> String {
    let mut out = format!(
        "Clinical report {}: score {:.0}, projected weight {:.1} kg\n",
        report.id, report.overall_score, report.weight_projection
    );
    for risk in &report.risks {
        out.push_str(&format!("  risk: {risk}\n"));
    }
    out
}

/// Run `nutri status`.
pub async fn run_status(client: &dyn GenerationClient, task_id: &str) -> Result<()> {
    let task = client.get_status(task_id).await?;

    println!("Task: {}", task.task_id);
    println!("Status: {}", task.status);
    if let Some(corr) = &task.correlation_id {
        println!("Correlation: {corr}");
    }
    match &task.plan {
        Some(plan) => println!("Plan: {} ({:.0} kcal/day)", plan.id, plan.average_calories),
        None => println!("Plan: not attached"),
    }
    if let Some(report) = &task.clinical_report {
        println!("Report: {}", report.id);
    }
    Ok(())
}
