//! Deterministic macro-target calculator (Mifflin-St Jeor).
//!
//! Every function here is pure. Identical inputs always give identical
//! outputs, so a locally computed row can stand in for a server answer.

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{
    ActivityLevel, GoalType, MacroPlan, MacroSplit, MacroTargets, Sex, TargetSource, UserProfile,
};

/// kcal stored in one kg of body fat.
pub const KCAL_PER_KG: f64 = 7700.0;
pub const MIN_TARGET_CALORIES: i64 = 1200;
const MIN_PROTEIN_SHARE: f64 = 0.10;
const FLOOR_FAT_SHARE: f64 = 0.25;
const FIBER_G_PER_1000_KCAL: f64 = 14.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MacroInputs {
    pub sex: Sex,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age_years: u32,
    pub activity_level: ActivityLevel,
    pub goal_type: GoalType,
    pub goal_rate_kg_per_week: f64,
    pub macro_plan: MacroPlan,
    pub custom_split: Option<MacroSplit>,
}

impl MacroInputs {
    /// Build calculator inputs from a stored profile, naming every missing body metric.
    pub fn from_profile(profile: &UserProfile, today: NaiveDate) -> Result<Self> {
        let age = profile.age_on(today);
        let mut missing = Vec::new();
        if profile.sex.is_none() {
            missing.push("sex");
        }
        if age.is_none() {
            missing.push("birth date");
        }
        if profile.height_cm.is_none() {
            missing.push("height");
        }
        if profile.current_weight_kg.is_none() {
            missing.push("current weight");
        }
        let (Some(sex), Some(age_years), Some(height_cm), Some(weight_kg)) =
            (profile.sex, age, profile.height_cm, profile.current_weight_kg)
        else {
            bail!("Profile is missing {}", missing.join(", "));
        };
        Ok(Self {
            sex,
            weight_kg,
            height_cm,
            age_years,
            activity_level: profile.activity_level,
            goal_type: profile.goal_type,
            goal_rate_kg_per_week: profile.goal_rate_kg_per_week,
            macro_plan: profile.macro_plan,
            custom_split: profile.custom_split,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalculatedTargets {
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub fiber_g: f64,
    pub bmr: i64,
    pub tdee: i64,
    /// Signed daily adjustment applied to TDEE. Negative for a cut.
    pub deficit_or_surplus: i64,
}

impl CalculatedTargets {
    #[must_use]
    pub fn into_row(self, user_id: &str, calculated_at: DateTime<Utc>) -> MacroTargets {
        MacroTargets {
            user_id: user_id.to_string(),
            calories: self.calories,
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fat_g: self.fat_g,
            fiber_g: Some(self.fiber_g),
            bmr: Some(self.bmr),
            tdee: Some(self.tdee),
            source: TargetSource::Local,
            calculated_at,
        }
    }
}

/// Outcome of the goal-rate guardrail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalCheck {
    Accept,
    Warn(String),
    Reject(String),
}

impl GoalCheck {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, GoalCheck::Reject(_))
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            GoalCheck::Accept => None,
            GoalCheck::Warn(msg) | GoalCheck::Reject(msg) => Some(msg),
        }
    }
}

#[must_use]
pub fn activity_multiplier(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Active => 1.725,
        ActivityLevel::VeryActive => 1.9,
    }
}

#[must_use]
pub fn calculate_bmr(sex: Sex, weight_kg: f64, height_cm: f64, age_years: u32) -> i64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    let bmr = match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    };
    bmr.round() as i64
}

#[must_use]
pub fn calculate_tdee(bmr: i64, level: ActivityLevel) -> i64 {
    (bmr as f64 * activity_multiplier(level)).round() as i64
}

/// Returns `(target_calories, deficit_or_surplus)`. The adjustment is the
/// requested one; a cut clamped at the calorie floor still reports its full deficit.
#[must_use]
pub fn target_calories(tdee: i64, goal: GoalType, rate_kg_per_week: f64) -> (i64, i64) {
    let daily_adjustment = (KCAL_PER_KG / 7.0 * rate_kg_per_week).round() as i64;
    match goal {
        GoalType::Maintain => (tdee, 0),
        GoalType::Cut => {
            let target = (tdee - daily_adjustment).max(MIN_TARGET_CALORIES);
            (target, -daily_adjustment)
        }
        GoalType::Bulk => {
            let surplus = (daily_adjustment as f64 * 0.5).round() as i64;
            (tdee + surplus, surplus)
        }
    }
}

/// Rescale a split so it sums to exactly 100. All-zero input becomes an even split.
#[must_use]
pub fn normalize_percents(protein: f64, carbs: f64, fat: f64) -> MacroSplit {
    let sum = protein + carbs + fat;
    if sum <= 0.0 {
        let third = 100.0 / 3.0;
        return MacroSplit::new(third, third, third);
    }
    if (sum - 100.0).abs() < f64::EPSILON {
        return MacroSplit::new(protein, carbs, fat);
    }
    let scale = 100.0 / sum;
    MacroSplit::new(protein * scale, carbs * scale, fat * scale)
}

/// Per-macro calories after the minimum-protein rule.
///
/// Returns `(protein_kcal, carbs_kcal, fat_kcal)`. When protein is under 10%
/// of the target it is raised to that floor, fat becomes a quarter of what is
/// left, and carbs take the remainder, so the three always sum to `target`.
#[must_use]
pub fn apply_protein_floor(target: f64, protein: f64, carbs: f64, fat: f64) -> (f64, f64, f64) {
    let floor = target * MIN_PROTEIN_SHARE;
    if protein >= floor {
        return (protein, carbs, fat);
    }
    let remaining = target - floor;
    let fat = (remaining * FLOOR_FAT_SHARE).min(remaining);
    (floor, remaining - fat, fat)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[must_use]
pub fn calculate(inputs: &MacroInputs) -> CalculatedTargets {
    let bmr = calculate_bmr(
        inputs.sex,
        inputs.weight_kg,
        inputs.height_cm,
        inputs.age_years,
    );
    let tdee = calculate_tdee(bmr, inputs.activity_level);
    let (calories, deficit_or_surplus) =
        target_calories(tdee, inputs.goal_type, inputs.goal_rate_kg_per_week);

    let raw = match (inputs.macro_plan.fixed_split(), inputs.custom_split) {
        (Some(fixed), _) => fixed,
        (None, Some(custom)) => custom,
        // Custom plan without stored percentages.
        (None, None) => MacroPlan::Balanced
            .fixed_split()
            .unwrap_or(MacroSplit::new(30.0, 40.0, 30.0)),
    };
    let split = normalize_percents(raw.protein_pct, raw.carbs_pct, raw.fat_pct);

    let target = calories as f64;
    let mut protein_kcal = target * split.protein_pct / 100.0;
    let mut carbs_kcal = target * split.carbs_pct / 100.0;
    let mut fat_kcal = target * split.fat_pct / 100.0;
    if inputs.macro_plan != MacroPlan::Custom {
        (protein_kcal, carbs_kcal, fat_kcal) =
            apply_protein_floor(target, protein_kcal, carbs_kcal, fat_kcal);
    }

    CalculatedTargets {
        calories,
        protein_g: round1(protein_kcal / 4.0),
        carbs_g: round1(carbs_kcal / 4.0),
        fat_g: round1(fat_kcal / 9.0),
        fiber_g: round1(target / 1000.0 * FIBER_G_PER_1000_KCAL),
        bmr,
        tdee,
        deficit_or_surplus,
    }
}

/// Guardrail for a goal change: maintain needs rate 0, cut caps at 1.0 kg/week
/// (warning above 0.75), bulk caps at 0.5 kg/week (warning above 0.25).
#[must_use]
pub fn validate_goal_rate(goal: GoalType, rate_kg_per_week: f64) -> GoalCheck {
    if goal == GoalType::Maintain {
        if rate_kg_per_week != 0.0 {
            return GoalCheck::Reject("Rate should be 0 for maintenance goal".to_string());
        }
        return GoalCheck::Accept;
    }
    if rate_kg_per_week < 0.0 {
        return GoalCheck::Reject("Rate must be positive".to_string());
    }
    match goal {
        GoalType::Cut if rate_kg_per_week > 1.0 => GoalCheck::Reject(
            "Losing more than 1kg/week is not recommended for health".to_string(),
        ),
        GoalType::Cut if rate_kg_per_week > 0.75 => GoalCheck::Warn(
            "This is an aggressive deficit. Consider 0.5kg/week for sustainability".to_string(),
        ),
        GoalType::Bulk if rate_kg_per_week > 0.5 => GoalCheck::Reject(
            "Gaining more than 0.5kg/week will likely result in excess fat gain".to_string(),
        ),
        GoalType::Bulk if rate_kg_per_week > 0.25 => GoalCheck::Warn(
            "Consider a slower bulk (0.25kg/week) to minimize fat gain".to_string(),
        ),
        _ => GoalCheck::Accept,
    }
}

/// Locally computed targets for `profile`, with its manual overrides applied.
pub fn targets_for_profile(
    profile: &UserProfile,
    today: NaiveDate,
    calculated_at: DateTime<Utc>,
) -> Result<MacroTargets> {
    let inputs = MacroInputs::from_profile(profile, today)?;
    Ok(calculate(&inputs)
        .into_row(&profile.user_id, calculated_at)
        .with_overrides(&profile.overrides))
}

#[must_use]
pub fn estimate_weeks_to_goal(current_kg: f64, target_kg: f64, rate_kg_per_week: f64) -> Option<i64> {
    if rate_kg_per_week <= 0.0 {
        return None;
    }
    Some(((current_kg - target_kg).abs() / rate_kg_per_week).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    fn male_80() -> MacroInputs {
        MacroInputs {
            sex: Sex::Male,
            weight_kg: 80.0,
            height_cm: 180.0,
            age_years: 30,
            activity_level: ActivityLevel::Moderate,
            goal_type: GoalType::Maintain,
            goal_rate_kg_per_week: 0.0,
            macro_plan: MacroPlan::Balanced,
            custom_split: None,
        }
    }

    #[test]
    fn test_bmr_male_and_female() {
        assert_eq!(calculate_bmr(Sex::Male, 80.0, 180.0, 30), 1780);
        assert_eq!(calculate_bmr(Sex::Female, 65.0, 165.0, 28), 1380);
    }

    #[test]
    fn test_tdee_multipliers() {
        assert_eq!(calculate_tdee(1800, ActivityLevel::Sedentary), 2160);
        assert_eq!(calculate_tdee(1800, ActivityLevel::Active), 3105);
        assert_eq!(calculate_tdee(1780, ActivityLevel::Moderate), 2759);
    }

    #[test]
    fn test_target_calories_by_goal() {
        assert_eq!(target_calories(2500, GoalType::Maintain, 0.0), (2500, 0));
        assert_eq!(target_calories(2500, GoalType::Cut, 0.5), (1950, -550));
        assert_eq!(target_calories(2500, GoalType::Bulk, 0.5), (2775, 275));
    }

    #[test]
    fn test_cut_never_drops_below_floor() {
        for rate in [1.0, 2.0, 5.0, 50.0] {
            let (target, _) = target_calories(1500, GoalType::Cut, rate);
            assert_eq!(target, MIN_TARGET_CALORIES);
        }
        assert_eq!(target_calories(1500, GoalType::Cut, 1.0), (1200, -1100));
        let mut inputs = male_80();
        inputs.goal_type = GoalType::Cut;
        inputs.goal_rate_kg_per_week = 10.0;
        assert_eq!(calculate(&inputs).calories, 1200);
    }

    #[test]
    fn test_calculate_is_deterministic() {
        let first = calculate(&male_80());
        assert_eq!(first.bmr, 1780);
        assert_eq!(first.tdee, 2759);
        assert_eq!(first.calories, 2759);
        assert_eq!(first.deficit_or_surplus, 0);
        assert!(close(first.protein_g, 206.9));
        assert!(close(first.carbs_g, 275.9));
        assert!(close(first.fat_g, 92.0));
        assert!(close(first.fiber_g, 38.6));
        for _ in 0..10 {
            assert_eq!(calculate(&male_80()), first);
        }
    }

    #[test]
    fn test_normalize_percents_rescales() {
        let split = normalize_percents(50.0, 30.0, 30.0);
        assert!(close(split.protein_pct, 45.45));
        assert!(close(split.carbs_pct, 27.27));
        assert!(close(split.fat_pct, 27.27));
        assert!(close(split.sum(), 100.0));

        let exact = normalize_percents(40.0, 35.0, 25.0);
        assert_eq!(exact, MacroSplit::new(40.0, 35.0, 25.0));

        let even = normalize_percents(0.0, 0.0, 0.0);
        assert!(close(even.protein_pct, 33.33));
    }

    #[test]
    fn test_custom_split_is_normalized_before_use() {
        let mut inputs = male_80();
        inputs.macro_plan = MacroPlan::Custom;
        inputs.custom_split = Some(MacroSplit::new(50.0, 30.0, 30.0));
        let targets = calculate(&inputs);
        // 2759 * 45.45% / 4
        assert!(close(targets.protein_g, 313.5));
        let kcal = targets.protein_g * 4.0 + targets.carbs_g * 4.0 + targets.fat_g * 9.0;
        assert!((kcal - 2759.0).abs() < 1.0);
    }

    #[test]
    fn test_protein_floor_redistributes() {
        let (protein, carbs, fat) = apply_protein_floor(2000.0, 100.0, 1300.0, 600.0);
        assert!(close(protein, 200.0));
        assert!(close(fat, 450.0));
        assert!(close(carbs, 1350.0));
        assert!(close(protein + carbs + fat, 2000.0));

        let untouched = apply_protein_floor(2000.0, 600.0, 800.0, 600.0);
        assert_eq!(untouched, (600.0, 800.0, 600.0));
    }

    #[test]
    fn test_custom_plan_skips_protein_floor() {
        let mut inputs = male_80();
        inputs.macro_plan = MacroPlan::Custom;
        inputs.custom_split = Some(MacroSplit::new(5.0, 65.0, 30.0));
        let targets = calculate(&inputs);
        // 5% of 2759 kcal / 4
        assert!(close(targets.protein_g, 34.5));
    }

    #[test]
    fn test_fixed_plan_ignores_custom_split() {
        let mut inputs = male_80();
        inputs.macro_plan = MacroPlan::Keto;
        inputs.custom_split = Some(MacroSplit::new(60.0, 20.0, 20.0));
        let targets = calculate(&inputs);
        // 25% of 2759 kcal / 4
        assert!(close(targets.protein_g, 172.4));
        assert!(close(targets.carbs_g, 34.5));
    }

    #[test]
    fn test_guardrail_boundaries() {
        assert_eq!(validate_goal_rate(GoalType::Maintain, 0.0), GoalCheck::Accept);
        assert!(!validate_goal_rate(GoalType::Maintain, 0.5).is_accepted());
        assert_eq!(validate_goal_rate(GoalType::Cut, 0.5), GoalCheck::Accept);
        assert_eq!(validate_goal_rate(GoalType::Cut, 0.75), GoalCheck::Accept);
        let warn = validate_goal_rate(GoalType::Cut, 0.8);
        assert!(matches!(warn, GoalCheck::Warn(_)));
        assert!(warn.message().unwrap().to_lowercase().contains("aggressive"));
        assert_eq!(validate_goal_rate(GoalType::Cut, 1.0), warn);
        assert!(matches!(validate_goal_rate(GoalType::Cut, 1.2), GoalCheck::Reject(_)));
        assert_eq!(validate_goal_rate(GoalType::Bulk, 0.25), GoalCheck::Accept);
        assert!(matches!(validate_goal_rate(GoalType::Bulk, 0.3), GoalCheck::Warn(_)));
        assert!(matches!(validate_goal_rate(GoalType::Bulk, 0.6), GoalCheck::Reject(_)));
        assert_eq!(
            validate_goal_rate(GoalType::Bulk, -0.1),
            GoalCheck::Reject("Rate must be positive".to_string())
        );
    }

    #[test]
    fn test_estimate_weeks_to_goal() {
        assert_eq!(estimate_weeks_to_goal(90.0, 80.0, 0.5), Some(20));
        assert_eq!(estimate_weeks_to_goal(70.0, 75.0, 0.25), Some(20));
        assert_eq!(estimate_weeks_to_goal(90.0, 80.0, 0.0), None);
        assert_eq!(estimate_weeks_to_goal(90.0, 80.0, -1.0), None);
    }

    #[test]
    fn test_from_profile_reports_missing_metrics() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut profile = UserProfile::new("u1");
        profile.height_cm = Some(180.0);
        let err = MacroInputs::from_profile(&profile, today).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sex"));
        assert!(msg.contains("birth date"));
        assert!(msg.contains("current weight"));
        assert!(!msg.contains("height"));

        profile.sex = Some(Sex::Male);
        profile.birth_date = NaiveDate::from_ymd_opt(1995, 6, 1);
        profile.current_weight_kg = Some(80.0);
        let inputs = MacroInputs::from_profile(&profile, today).unwrap();
        assert_eq!(inputs.age_years, 30);
        assert_eq!(inputs.macro_plan, MacroPlan::Balanced);
    }

    #[test]
    fn test_targets_for_profile_applies_overrides() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut profile = UserProfile::new("u1");
        profile.sex = Some(Sex::Female);
        profile.birth_date = NaiveDate::from_ymd_opt(1990, 1, 1);
        profile.height_cm = Some(165.0);
        profile.current_weight_kg = Some(60.0);
        profile.overrides.protein_g = Some(150.0);
        let at = Utc::now();

        let row = targets_for_profile(&profile, today, at).unwrap();
        let plain = calculate(&MacroInputs::from_profile(&profile, today).unwrap());
        assert_eq!(row.source, TargetSource::Local);
        assert_eq!(row.calories, plain.calories);
        assert!((row.protein_g - 150.0).abs() < f64::EPSILON);
        assert!((row.fat_g - plain.fat_g).abs() < f64::EPSILON);
        assert_eq!(row.calculated_at, at);
    }
}
