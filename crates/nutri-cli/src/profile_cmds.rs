//! Profile files: loading intake/profile JSON and the `nutri baseline` command.

use std::path::Path;

use anyhow::{Context, Result};

use nutri_api::models::UserProfile;
use nutri_core::profile::{ProfileIntake, assemble_profile};

/// Read a profile or intake JSON file and produce a complete profile.
///
/// A previously saved profile keeps its id; `bmr`/`tdee` are always
/// recomputed from the biometrics in the file.
pub fn load_profile(path: &Path) -> Result<UserProfile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile file: {}", path.display()))?;
    let intake: ProfileIntake = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse profile JSON from {}", path.display()))?;
    let profile = assemble_profile(intake)
        .with_context(|| format!("incomplete profile in {}", path.display()))?;
    Ok(profile)
}

/// Write `value` as pretty JSON.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    std::fs::write(path, contents + "\n")
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn render_baseline(profile: &UserProfile) -> String {
    let mut out = format!("Profile: {} ({})\n", profile.name, profile.id);
    if let Some(level) = profile.lifestyle.activity_level {
        out.push_str(&format!("Activity: {level}\n"));
    }
    if let Some(bmr) = profile.bmr {
        out.push_str(&format!("BMR:  {bmr:.0} kcal/day\n"));
    }
    if let Some(tdee) = profile.tdee {
        out.push_str(&format!("TDEE: {tdee:.0} kcal/day\n"));
    }
    out
}

/// Run `nutri baseline`: derive energy figures and optionally save the
/// completed profile.
pub fn run_baseline(file: &Path, output: Option<&Path>) -> Result<()> {
    let profile = load_profile(file)?;
    print!("{}", render_baseline(&profile));

    if let Some(path) = output {
        write_json(path, &profile)?;
        println!("Profile written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutri_test_utils::sample_profile;

    fn intake_json() -> serde_json::Value {
        serde_json::json!({
            "name": "Ana",
            "biometrics": { "age": 30, "gender": "Male", "height": 180, "weight": 80 },
            "lifestyle": { "activityLevel": "Moderately Active" },
            "consent": { "dataProcessing": true }
        })
    }

    #[test]
    fn intake_file_gets_id_and_baseline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("intake.json");
        std::fs::write(&path, intake_json().to_string()).unwrap();

        let profile = load_profile(&path).unwrap();
        assert!(!profile.id.is_empty());
        assert_eq!(profile.bmr, Some(1780.0));
        assert_eq!(profile.tdee, Some(2759.0));

        let text = render_baseline(&profile);
        assert!(text.contains("BMR:  1780 kcal/day"), "{text}");
        assert!(text.contains("TDEE: 2759 kcal/day"), "{text}");
    }

    #[test]
    fn saved_profile_keeps_its_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("profile.json");
        write_json(&path, &sample_profile()).unwrap();

        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.id, "profile-1");
    }

    #[test]
    fn missing_consent_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("intake.json");
        let mut intake = intake_json();
        intake["consent"]["dataProcessing"] = false.into();
        std::fs::write(&path, intake.to_string()).unwrap();

        let err = load_profile(&path).unwrap_err();
        assert!(format!("{err:#}").contains("consent"), "{err:#}");
    }
}
