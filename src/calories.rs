use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Energy stored in one kilogram of body fat.
pub const KCAL_PER_KG_FAT: f64 = 7200.0;
/// Rough maintenance intake per kilogram of body weight.
pub const MAINTENANCE_KCAL_PER_KG: f64 = 30.0;
/// Placeholder guess for a single item in the meal log.
pub const KCAL_PER_FOOD_ITEM: u32 = 400;
/// Separator used between items of the meal log (full-width comma).
pub const FOOD_SEPARATOR: char = '，';

pub const MIN_WEIGHT_KG: u32 = 30;
pub const MAX_WEIGHT_KG: u32 = 150;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalorieError {
    #[error("deadline {deadline} is not after today ({today})")]
    DeadlineNotInFuture { deadline: NaiveDate, today: NaiveDate },
    #[error("weight {0} kg is outside 30..=150 kg")]
    WeightOutOfRange(u32),
    #[error("unknown exercise level: {0}")]
    UnknownExercise(String),
}

/// Daily intake that reaches `goal_kg` from `weight_kg` by `deadline`.
///
/// Returns [`CalorieError::DeadlineNotInFuture`] unless the deadline is at
/// least one calendar day after `today`. Rounds half to even.
pub fn target_calories(
    weight_kg: f64,
    goal_kg: f64,
    deadline: NaiveDate,
    today: NaiveDate,
) -> Result<i64, CalorieError> {
    let days = (deadline - today).num_days();
    if days <= 0 {
        return Err(CalorieError::DeadlineNotInFuture { deadline, today });
    }

    let deficit_per_day = (weight_kg - goal_kg) * KCAL_PER_KG_FAT / days as f64;
    let maintenance = weight_kg * MAINTENANCE_KCAL_PER_KG;
    Ok((maintenance - deficit_per_day).round_ties_even() as i64)
}

/// Naive intake estimate: every non-empty item in the log counts as 400 kcal.
pub fn estimate_food_calories(meal_log: &str) -> u32 {
    let items = meal_log
        .split(FOOD_SEPARATOR)
        .filter(|item| !item.trim().is_empty())
        .count() as u32;
    items * KCAL_PER_FOOD_ITEM
}

pub fn check_weight(kg: u32) -> Result<u32, CalorieError> {
    if (MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&kg) {
        Ok(kg)
    } else {
        Err(CalorieError::WeightOutOfRange(kg))
    }
}

/// How much the user moved today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseLevel {
    #[default]
    Low,
    Normal,
    High,
}

impl ExerciseLevel {
    pub const ALL: [ExerciseLevel; 3] = [Self::Low, Self::Normal, Self::High];

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "少ない",
            Self::Normal => "普通",
            Self::High => "多い",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn adjustment(self) -> i64 {
        match self {
            Self::Low => -100,
            Self::Normal => 0,
            Self::High => 150,
        }
    }

    pub fn adjust(self, target_kcal: i64) -> i64 {
        target_kcal + self.adjustment()
    }
}

impl fmt::Display for ExerciseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExerciseLevel {
    type Err = CalorieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.label() == s || level.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| CalorieError::UnknownExercise(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn test_target_eight_weeks_out() {
        let deadline = today() + Duration::days(56);
        assert_eq!(target_calories(60.0, 55.0, deadline, today()), Ok(1157));
    }

    #[test]
    fn test_target_matches_formula() {
        for (w, g, d) in [(80.0, 70.0, 100), (55.0, 55.0, 3), (45.0, 50.0, 30), (120.0, 90.0, 365)] {
            let deadline = today() + Duration::days(d);
            let expected = (w * 30.0 - (w - g) * 7200.0 / d as f64).round_ties_even() as i64;
            assert_eq!(target_calories(w, g, deadline, today()), Ok(expected));
        }
    }

    #[test]
    fn test_deadline_today_is_invalid() {
        let err = target_calories(60.0, 55.0, today(), today()).unwrap_err();
        assert!(matches!(err, CalorieError::DeadlineNotInFuture { .. }));
    }

    #[test]
    fn test_deadline_in_past_is_invalid_regardless_of_weights() {
        let past = today() - Duration::days(3);
        assert!(target_calories(100.0, 40.0, past, today()).is_err());
        assert!(target_calories(40.0, 100.0, past, today()).is_err());
    }

    #[test]
    fn test_rounds_half_to_even() {
        // 7200 / 14400 days leaves a .5 fraction per kg
        let deadline = today() + Duration::days(14400);
        assert_eq!(target_calories(60.0, 59.0, deadline, today()), Ok(1800));
        assert_eq!(target_calories(60.0, 57.0, deadline, today()), Ok(1798));
    }

    #[test]
    fn test_estimate_counts_items() {
        assert_eq!(estimate_food_calories("トースト，ラーメン，唐揚げ定食"), 1200);
        assert_eq!(estimate_food_calories("おにぎり"), 400);
    }

    #[test]
    fn test_estimate_empty_is_zero() {
        assert_eq!(estimate_food_calories(""), 0);
        assert_eq!(estimate_food_calories("  "), 0);
    }

    #[test]
    fn test_estimate_ignores_ascii_commas_and_blank_items() {
        assert_eq!(estimate_food_calories("toast, eggs"), 400);
        assert_eq!(estimate_food_calories("パン，，サラダ，"), 800);
    }

    #[test]
    fn test_exercise_adjustment() {
        assert_eq!(ExerciseLevel::Low.adjust(1157), 1057);
        assert_eq!(ExerciseLevel::Normal.adjust(1157), 1157);
        assert_eq!(ExerciseLevel::High.adjust(1157), 1307);
    }

    #[test]
    fn test_exercise_parse() {
        assert_eq!("多い".parse::<ExerciseLevel>(), Ok(ExerciseLevel::High));
        assert_eq!("Normal".parse::<ExerciseLevel>(), Ok(ExerciseLevel::Normal));
        assert!("lots".parse::<ExerciseLevel>().is_err());
    }

    #[test]
    fn test_check_weight_bounds() {
        assert_eq!(check_weight(30), Ok(30));
        assert_eq!(check_weight(150), Ok(150));
        assert_eq!(check_weight(29), Err(CalorieError::WeightOutOfRange(29)));
    }
}
