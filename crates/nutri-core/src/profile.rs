//! Profile assembly and energy baselines.
//!
//! BMR uses the Mifflin-St Jeor equation; TDEE scales it by an activity
//! multiplier. Both are pure and are recomputed whenever biometrics or the
//! activity level change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nutri_api::models::{
    ActivityLevel, Biometrics, ClinicalData, Gender, GoalsData, Language, LifestyleData,
    OnboardingMode, RoutineData, UserConsent, UserProfile, WeeklyPlan,
};

/// Derived energy figures in kcal/day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBaseline {
    pub bmr: f64,
    pub tdee: f64,
}

pub fn activity_multiplier(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Very => 1.725,
        ActivityLevel::Extra => 1.9,
        ActivityLevel::Unrecognized => 1.2,
    }
}

/// Compute BMR and TDEE.
///
/// Returns `None` unless weight, height and age are positive and both the
/// gender and activity level are set. BMR is rounded for storage; TDEE is
/// derived from the unrounded BMR and then rounded.
pub fn compute_energy_baseline(
    biometrics: &Biometrics,
    activity: Option<ActivityLevel>,
) -> Option<EnergyBaseline> {
    let gender = biometrics.gender?;
    let activity = activity?;
    if !(biometrics.weight > 0.0) || !(biometrics.height > 0.0) || biometrics.age == 0 {
        return None;
    }

    let offset = if gender == Gender::Male { 5.0 } else { -161.0 };
    let bmr = 10.0 * biometrics.weight + 6.25 * biometrics.height
        - 5.0 * f64::from(biometrics.age)
        + offset;

    Some(EnergyBaseline {
        bmr: bmr.round(),
        tdee: (bmr * activity_multiplier(activity)).round(),
    })
}

/// `tdee - plan.averageCalories`, or `None` before the profile has a TDEE.
pub fn daily_deficit(profile: &UserProfile, plan: &WeeklyPlan) -> Option<f64> {
    profile.tdee.map(|tdee| tdee - plan.average_calories)
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Everything collected by the intake flow, before derivation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileIntake {
    /// Present when re-running setup for an existing profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub language: Language,
    pub onboarding_mode: OnboardingMode,
    pub name: String,
    pub biometrics: Biometrics,
    pub clinical: ClinicalData,
    pub lifestyle: LifestyleData,
    pub routine: RoutineData,
    pub goals: GoalsData,
    pub consent: UserConsent,
}

impl From<UserProfile> for ProfileIntake {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: Some(profile.id),
            language: profile.language,
            onboarding_mode: profile.onboarding_mode,
            name: profile.name,
            biometrics: profile.biometrics,
            clinical: profile.clinical,
            lifestyle: profile.lifestyle,
            routine: profile.routine,
            goals: profile.goals,
            consent: profile.consent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("consent to data processing is required")]
    ConsentRequired,
}

/// Validate an intake and produce a complete profile with `bmr`/`tdee`.
///
/// An existing id is kept; otherwise a fresh UUID is assigned.
pub fn assemble_profile(intake: ProfileIntake) -> Result<UserProfile, ProfileError> {
    if intake.name.trim().is_empty() {
        return Err(ProfileError::MissingField("name"));
    }
    if intake.biometrics.age == 0 {
        return Err(ProfileError::MissingField("biometrics.age"));
    }
    if !(intake.biometrics.height > 0.0) {
        return Err(ProfileError::MissingField("biometrics.height"));
    }
    if !(intake.biometrics.weight > 0.0) {
        return Err(ProfileError::MissingField("biometrics.weight"));
    }
    if intake.biometrics.gender.is_none() {
        return Err(ProfileError::MissingField("biometrics.gender"));
    }
    if intake.lifestyle.activity_level.is_none() {
        return Err(ProfileError::MissingField("lifestyle.activityLevel"));
    }
    if !intake.consent.data_processing {
        return Err(ProfileError::ConsentRequired);
    }

    let baseline = compute_energy_baseline(&intake.biometrics, intake.lifestyle.activity_level)
        .ok_or(ProfileError::MissingField("biometrics"))?;

    let id = intake
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(UserProfile {
        id,
        language: intake.language,
        onboarding_mode: intake.onboarding_mode,
        name: intake.name.trim().to_owned(),
        biometrics: intake.biometrics,
        clinical: intake.clinical,
        lifestyle: intake.lifestyle,
        routine: intake.routine,
        goals: intake.goals,
        consent: intake.consent,
        bmr: Some(baseline.bmr),
        tdee: Some(baseline.tdee),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn biometrics(gender: Gender) -> Biometrics {
        Biometrics {
            age: 30,
            gender: Some(gender),
            height: 180.0,
            weight: 80.0,
            ..Biometrics::default()
        }
    }

    fn intake() -> ProfileIntake {
        ProfileIntake {
            name: "Ana".into(),
            biometrics: biometrics(Gender::Male),
            lifestyle: LifestyleData {
                activity_level: Some(ActivityLevel::Moderate),
                ..LifestyleData::default()
            },
            consent: UserConsent {
                data_processing: true,
                ..UserConsent::default()
            },
            ..ProfileIntake::default()
        }
    }

    #[test]
    fn male_baseline() {
        let b = compute_energy_baseline(&biometrics(Gender::Male), Some(ActivityLevel::Moderate))
            .unwrap();
        // 800 + 1125 - 150 + 5
        assert_eq!(b.bmr, 1780.0);
        assert_eq!(b.tdee, 2759.0);
    }

    #[test]
    fn female_and_other_use_lower_offset() {
        let f = compute_energy_baseline(&biometrics(Gender::Female), Some(ActivityLevel::Sedentary))
            .unwrap();
        assert_eq!(f.bmr, 1614.0);
        assert_eq!(f.tdee, (1614.0_f64 * 1.2).round());

        let o = compute_energy_baseline(&biometrics(Gender::Other), Some(ActivityLevel::Sedentary))
            .unwrap();
        assert_eq!(o, f);
    }

    #[test]
    fn tdee_uses_unrounded_bmr() {
        // bmr = 10*70.5 + 6.25*165.3 - 5*41 - 161 = 1372.125
        let b = Biometrics {
            age: 41,
            gender: Some(Gender::Female),
            height: 165.3,
            weight: 70.5,
            ..Biometrics::default()
        };
        let out = compute_energy_baseline(&b, Some(ActivityLevel::Extra)).unwrap();
        assert_eq!(out.bmr, 1372.0);
        assert_eq!(out.tdee, (1372.125_f64 * 1.9).round());
    }

    #[test]
    fn unrecognized_activity_defaults_to_sedentary_multiplier() {
        let b = biometrics(Gender::Male);
        let unknown = compute_energy_baseline(&b, Some(ActivityLevel::Unrecognized)).unwrap();
        let sedentary = compute_energy_baseline(&b, Some(ActivityLevel::Sedentary)).unwrap();
        assert_eq!(unknown, sedentary);
    }

    #[test]
    fn incomplete_inputs_yield_none() {
        let mut b = biometrics(Gender::Male);
        assert!(compute_energy_baseline(&b, None).is_none());

        b.weight = 0.0;
        assert!(compute_energy_baseline(&b, Some(ActivityLevel::Light)).is_none());

        let mut b = biometrics(Gender::Male);
        b.gender = None;
        assert!(compute_energy_baseline(&b, Some(ActivityLevel::Light)).is_none());

        let mut b = biometrics(Gender::Male);
        b.age = 0;
        assert!(compute_energy_baseline(&b, Some(ActivityLevel::Light)).is_none());
    }

    #[test]
    fn assemble_assigns_id_and_baseline() {
        let profile = assemble_profile(intake()).unwrap();
        assert!(Uuid::parse_str(&profile.id).is_ok());
        assert_eq!(profile.bmr, Some(1780.0));
        assert_eq!(profile.tdee, Some(2759.0));
    }

    #[test]
    fn assemble_keeps_existing_id() {
        let mut i = intake();
        i.id = Some("existing-7".into());
        let profile = assemble_profile(i).unwrap();
        assert_eq!(profile.id, "existing-7");

        // Re-running setup from the saved profile keeps the same id.
        let rerun = assemble_profile(ProfileIntake::from(profile.clone())).unwrap();
        assert_eq!(rerun.id, profile.id);
    }

    #[test]
    fn assemble_rejects_missing_fields() {
        let mut i = intake();
        i.name = "  ".into();
        assert_eq!(assemble_profile(i), Err(ProfileError::MissingField("name")));

        let mut i = intake();
        i.biometrics.height = 0.0;
        assert_eq!(
            assemble_profile(i),
            Err(ProfileError::MissingField("biometrics.height"))
        );

        let mut i = intake();
        i.consent.data_processing = false;
        assert_eq!(assemble_profile(i), Err(ProfileError::ConsentRequired));
    }

    #[test]
    fn deficit_against_plan_average() {
        let profile = assemble_profile(intake()).unwrap();
        let plan = WeeklyPlan {
            average_calories: 2000.0,
            ..WeeklyPlan::default()
        };
        assert_eq!(daily_deficit(&profile, &plan), Some(759.0));

        let no_tdee = UserProfile::default();
        assert_eq!(daily_deficit(&no_tdee, &plan), None);
    }
}
