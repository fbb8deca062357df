use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack", "other"];

pub const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGoal {
    pub id: i64,
    pub user_id: i64,
    pub protein_goal: i64,
    pub carbs_goal: i64,
    pub fat_goal: i64,
    #[serde(skip_deserializing)]
    pub calories_goal: i64,
}

impl UserGoal {
    #[must_use]
    pub fn from_db(
        id: i64,
        user_id: i64,
        protein_goal: i64,
        carbs_goal: i64,
        fat_goal: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            protein_goal,
            carbs_goal,
            fat_goal,
            calories_goal: protein_goal * 4 + carbs_goal * 4 + fat_goal * 9,
        }
    }

    /// The goals as a macro/calorie bundle, for progress arithmetic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_totals(&self) -> MacroTotals {
        MacroTotals {
            protein: self.protein_goal as f64,
            carbs: self.carbs_goal as f64,
            fat: self.fat_goal as f64,
            calories: self.calories_goal as f64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserGoal {
    pub protein_goal: i64,
    pub carbs_goal: i64,
    pub fat_goal: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserGoal {
    pub protein_goal: Option<i64>,
    pub carbs_goal: Option<i64>,
    pub fat_goal: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
    pub meal_type: String,
    #[serde(rename = "isAIGenerated")]
    pub is_ai_generated: bool,
    pub is_favorite: bool,
    pub created_at: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeal {
    pub name: String,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    /// Derived from the macros when absent.
    #[serde(default)]
    pub calories: Option<f64>,
    pub meal_type: String,
    #[serde(default, rename = "isAIGenerated")]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeal {
    pub name: Option<String>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub calories: Option<f64>,
    pub meal_type: Option<String>,
    pub is_favorite: Option<bool>,
    /// Absent keeps the current image, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
}

// Wraps any present value, `null` included, so it can be told apart from a
// missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl UpdateMeal {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.protein.is_none()
            && self.carbs.is_none()
            && self.fat.is_none()
            && self.calories.is_none()
            && self.meal_type.is_none()
            && self.is_favorite.is_none()
            && self.image_url.is_none()
    }
}

/// One consumed meal inside a daily log. Macro values are already scaled by
/// `servings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealEntry {
    pub meal_id: i64,
    pub time: String,
    #[serde(default = "default_servings")]
    pub servings: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
}

fn default_servings() -> f64 {
    1.0
}

impl MealEntry {
    #[must_use]
    pub fn from_meal(meal: &Meal, time: &str, servings: f64) -> Self {
        Self {
            meal_id: meal.id,
            time: time.to_string(),
            servings,
            protein: meal.protein * servings,
            carbs: meal.carbs * servings,
            fat: meal.fat * servings,
            calories: meal.calories * servings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub id: i64,
    pub user_id: i64,
    pub date: String,
    pub meal_entries: Vec<MealEntry>,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub total_calories: f64,
}

impl DailyLog {
    #[must_use]
    pub fn totals(&self) -> MacroTotals {
        MacroTotals {
            protein: self.total_protein,
            carbs: self.total_carbs,
            fat: self.total_fat,
            calories: self.total_calories,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
}

impl MacroTotals {
    #[must_use]
    pub fn from_entries(entries: &[MealEntry]) -> Self {
        entries.iter().fold(Self::default(), |acc, e| Self {
            protein: acc.protein + e.protein,
            carbs: acc.carbs + e.carbs,
            fat: acc.fat + e.fat,
            calories: acc.calories + e.calories,
        })
    }

    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self {
            protein: self.protein + other.protein,
            carbs: self.carbs + other.carbs,
            fat: self.fat + other.fat,
            calories: self.calories + other.calories,
        }
    }

    /// Per-field `max(0, self - consumed)`.
    #[must_use]
    pub fn remaining_after(self, consumed: Self) -> Self {
        Self {
            protein: remaining(self.protein, consumed.protein),
            carbs: remaining(self.carbs, consumed.carbs),
            fat: remaining(self.fat, consumed.fat),
            calories: remaining(self.calories, consumed.calories),
        }
    }
}

/// Target macros passed along with an AI meal request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroNeeds {
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMealResult {
    pub name: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
    pub meal_type: String,
}

/// Which step of the generation chain produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Gemini,
    Fallback,
}

impl AiProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "fallback" => Ok(Self::Fallback),
            _ => bail!("Unknown AI provider '{s}'"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMealRequest {
    pub id: i64,
    pub user_id: i64,
    pub prompt: String,
    pub result: Option<AiMealResult>,
    pub provider: AiProvider,
    pub created_at: String,
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MacroPercent {
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
    pub calories: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<UserGoal>,
    pub consumed: MacroTotals,
    pub remaining: MacroTotals,
    pub percent: MacroPercent,
}

impl GoalProgress {
    #[must_use]
    pub fn compute(date: &str, goals: Option<UserGoal>, consumed: MacroTotals) -> Self {
        let target = goals.as_ref().map(UserGoal::as_totals).unwrap_or_default();
        Self {
            date: date.to_string(),
            remaining: target.remaining_after(consumed),
            percent: MacroPercent {
                protein: progress_percent(consumed.protein, target.protein),
                carbs: progress_percent(consumed.carbs, target.carbs),
                fat: progress_percent(consumed.fat, target.fat),
                calories: progress_percent(consumed.calories, target.calories),
            },
            goals,
            consumed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTotals {
    pub date: String,
    pub logged: bool,
    #[serde(flatten)]
    pub totals: MacroTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub start_date: String,
    pub end_date: String,
    pub days: Vec<DayTotals>,
    pub logged_days: usize,
    pub average: MacroTotals,
    pub total_calories: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calorie_goal: Option<f64>,
    pub goal_percent: i64,
}

impl WeeklyStats {
    /// Averages only count days that have a log; the range goal is the daily
    /// calorie goal times the number of days in the range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(days: Vec<DayTotals>, goals: Option<&UserGoal>) -> Self {
        let start_date = days.first().map(|d| d.date.clone()).unwrap_or_default();
        let end_date = days.last().map(|d| d.date.clone()).unwrap_or_default();
        let logged: Vec<&DayTotals> = days.iter().filter(|d| d.logged).collect();
        let logged_days = logged.len();
        let sum = logged
            .iter()
            .fold(MacroTotals::default(), |acc, d| acc.add(d.totals));
        let n = logged_days.max(1) as f64;
        let average = MacroTotals {
            protein: (sum.protein / n).round(),
            carbs: (sum.carbs / n).round(),
            fat: (sum.fat / n).round(),
            calories: (sum.calories / n).round(),
        };
        let calorie_goal = goals.map(|g| g.calories_goal as f64 * days.len() as f64);
        let goal_percent = match calorie_goal {
            Some(goal) if goal > 0.0 => (sum.calories / goal * 100.0).round() as i64,
            _ => 0,
        };
        Self {
            start_date,
            end_date,
            days,
            logged_days,
            average,
            total_calories: sum.calories,
            calorie_goal,
            goal_percent,
        }
    }
}

// --- Arithmetic helpers ---

#[must_use]
pub fn calories_from_macros(protein: f64, carbs: f64, fat: f64) -> f64 {
    protein * 4.0 + carbs * 4.0 + fat * 9.0
}

#[must_use]
pub fn remaining(goal: f64, consumed: f64) -> f64 {
    (goal - consumed).max(0.0)
}

/// Rounded percentage of `goal` reached, capped at 100. A zero goal reads as 0%.
#[must_use]
pub fn progress_percent(consumed: f64, goal: f64) -> i64 {
    if goal > 0.0 {
        ((consumed / goal * 100.0).round() as i64).clamp(0, 100)
    } else {
        0
    }
}

// --- Validation ---

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.trim().to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

/// Lenient mapping for meal types coming from model output or legacy data.
#[must_use]
pub fn normalize_meal_type(meal: &str) -> String {
    let normalized = match meal.trim().to_lowercase().as_str() {
        "breakfast" | "desayuno" => "breakfast",
        "lunch" | "almuerzo" | "comida" => "lunch",
        "dinner" | "supper" | "cena" => "dinner",
        "snack" | "snacks" | "merienda" => "snack",
        _ => "other",
    };
    normalized.to_string()
}

fn check_macro(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail!("{name} must be a non-negative number");
    }
    Ok(())
}

pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    if meal.name.trim().is_empty() {
        bail!("Meal name must not be empty");
    }
    check_macro("protein", meal.protein)?;
    check_macro("carbs", meal.carbs)?;
    check_macro("fat", meal.fat)?;
    if let Some(calories) = meal.calories {
        check_macro("calories", calories)?;
    }
    validate_meal_type(&meal.meal_type)?;
    Ok(())
}

pub fn validate_meal_update(update: &UpdateMeal) -> Result<()> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            bail!("Meal name must not be empty");
        }
    }
    for (name, value) in [
        ("protein", update.protein),
        ("carbs", update.carbs),
        ("fat", update.fat),
        ("calories", update.calories),
    ] {
        if let Some(v) = value {
            check_macro(name, v)?;
        }
    }
    if let Some(meal_type) = &update.meal_type {
        validate_meal_type(meal_type)?;
    }
    Ok(())
}

pub fn validate_macro_needs(needs: &MacroNeeds) -> Result<()> {
    check_macro("protein", needs.protein)?;
    check_macro("carbs", needs.carbs)?;
    check_macro("fat", needs.fat)
}

pub fn validate_meal_entry(entry: &MealEntry) -> Result<()> {
    parse_entry_time(&entry.time)?;
    if !entry.servings.is_finite() || entry.servings <= 0.0 {
        bail!("servings must be greater than 0");
    }
    check_macro("protein", entry.protein)?;
    check_macro("carbs", entry.carbs)?;
    check_macro("fat", entry.fat)?;
    check_macro("calories", entry.calories)?;
    Ok(())
}

pub fn validate_goal(protein: i64, carbs: i64, fat: i64) -> Result<()> {
    if protein < 0 || carbs < 0 || fat < 0 {
        bail!("Macro goals must be non-negative");
    }
    Ok(())
}

/// Log dates are stored as `YYYY-MM-DD` text and range queries compare them
/// as strings, so only four-digit years are accepted.
pub fn parse_log_date(date: &str) -> Result<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}'. Use YYYY-MM-DD"))?;
    if !(1..=9999).contains(&parsed.year()) {
        bail!("Invalid date '{date}'. Year must be between 1 and 9999");
    }
    Ok(parsed)
}

pub fn parse_entry_time(time: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .with_context(|| format!("Invalid time '{time}'. Use HH:MM"))
}

/// Returns the trimmed username.
pub fn validate_credentials(username: &str, password: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        bail!("Username must not be empty");
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        bail!("Username must be at most {MAX_USERNAME_LEN} characters");
    }
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(username.to_string())
}
