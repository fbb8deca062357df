use std::path::Path;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use tracing::debug;

use crate::auth::{generate_session_token, hash_session_token, session_expiry};
use crate::db::Database;
use crate::models::{
    AiMealRequest, AiMealResult, AiProvider, DailyLog, DayTotals, GoalProgress, Meal, MealEntry,
    User, WeeklyStats, validate_credentials, validate_meal_entry,
};

/// Longest range `weekly_stats` accepts.
pub const MAX_STATS_DAYS: u32 = 366;

/// Outcome of turning a stored AI suggestion into a meal.
#[derive(Debug)]
pub enum SaveAiMeal {
    Saved(Meal),
    NotFound,
    AlreadySaved,
    NoResult,
}

/// Multi-step operations over the store. The server and the CLI both go
/// through this instead of sequencing `Database` calls themselves.
pub struct MacroService {
    db: Database,
}

impl MacroService {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Users & sessions ---

    /// `None` when the username is already taken. The password must already
    /// be hashed; hashing is slow and callers keep it outside any lock.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<Option<User>> {
        let username = validate_credentials(username, password_hash)?;
        if self.db.get_user_by_username(&username)?.is_some() {
            return Ok(None);
        }
        self.db.create_user(&username, password_hash).map(Some)
    }

    pub fn user_by_name(&self, username: &str) -> Result<Option<User>> {
        self.db.get_user_by_username(username.trim())
    }

    /// Returns the raw token for the client.
    pub fn start_session(&self, user_id: i64) -> Result<String> {
        let token = generate_session_token();
        self.db.create_session(
            &hash_session_token(&token),
            user_id,
            session_expiry(Utc::now()),
        )?;
        Ok(token)
    }

    pub fn session_user(&self, token: &str) -> Result<Option<User>> {
        self.db
            .get_session_user(&hash_session_token(token), Utc::now())
    }

    pub fn end_session(&self, token: &str) -> Result<bool> {
        self.db.delete_session(&hash_session_token(token))
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.db.purge_expired_sessions(Utc::now())
    }

    // --- Logging meals ---

    /// Add `meal_id` to the log for `date`, creating the log if needed. The
    /// entry's macros are the meal's scaled by `servings`. `None` when the meal
    /// does not exist for this user.
    pub fn log_meal(
        &self,
        user_id: i64,
        meal_id: i64,
        date: NaiveDate,
        time: &str,
        servings: f64,
    ) -> Result<Option<DailyLog>> {
        let Some(meal) = self.db.get_meal(user_id, meal_id)? else {
            return Ok(None);
        };
        let entry = MealEntry::from_meal(&meal, time, servings);
        validate_meal_entry(&entry)?;

        let log = match self.db.get_daily_log(user_id, date)? {
            Some(log) => log,
            None => self.db.create_daily_log(user_id, date, &[])?,
        };
        self.db.add_meal_to_daily_log(user_id, log.id, entry)
    }

    /// Remove the entry at `index` from the log for `date`.
    pub fn unlog_meal(
        &self,
        user_id: i64,
        date: NaiveDate,
        index: usize,
    ) -> Result<Option<DailyLog>> {
        let Some(log) = self.db.get_daily_log(user_id, date)? else {
            return Ok(None);
        };
        self.db.remove_meal_from_daily_log(user_id, log.id, index)
    }

    // --- Progress ---

    pub fn goal_progress(&self, user_id: i64, date: NaiveDate) -> Result<GoalProgress> {
        let goals = self.db.get_user_goals(user_id)?;
        let consumed = self
            .db
            .get_daily_log(user_id, date)?
            .map(|log| log.totals())
            .unwrap_or_default();
        Ok(GoalProgress::compute(
            &date.format("%Y-%m-%d").to_string(),
            goals,
            consumed,
        ))
    }

    /// Totals for the `days` days ending at `end` (inclusive). Days without a
    /// log appear with zero totals.
    pub fn weekly_stats(&self, user_id: i64, end: NaiveDate, days: u32) -> Result<WeeklyStats> {
        if days == 0 || days > MAX_STATS_DAYS {
            bail!("days must be between 1 and {MAX_STATS_DAYS}");
        }
        let Some(start) = end.checked_sub_signed(Duration::days(i64::from(days) - 1)) else {
            bail!("date range before {end} is out of bounds");
        };
        let logs = self.db.get_daily_logs_by_date_range(user_id, start, end)?;

        let per_day: Vec<DayTotals> = start
            .iter_days()
            .take(days as usize)
            .map(|day| {
                let date = day.format("%Y-%m-%d").to_string();
                let log = logs.iter().find(|l| l.date == date);
                DayTotals {
                    logged: log.is_some(),
                    totals: log.map(DailyLog::totals).unwrap_or_default(),
                    date,
                }
            })
            .collect();

        let goals = self.db.get_user_goals(user_id)?;
        Ok(WeeklyStats::compute(per_day, goals.as_ref()))
    }

    // --- AI meals ---

    pub fn record_ai_meal(
        &self,
        user_id: i64,
        prompt: &str,
        result: &AiMealResult,
        provider: AiProvider,
    ) -> Result<AiMealRequest> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            bail!("Prompt must not be empty");
        }
        self.db
            .create_ai_meal_request(user_id, prompt, Some(result), provider)
    }

    pub fn save_ai_meal(&self, user_id: i64, request_id: i64) -> Result<SaveAiMeal> {
        let Some(request) = self.db.get_ai_meal_request(user_id, request_id)? else {
            return Ok(SaveAiMeal::NotFound);
        };
        if request.saved {
            return Ok(SaveAiMeal::AlreadySaved);
        }
        if request.result.is_none() {
            return Ok(SaveAiMeal::NoResult);
        }
        let meal = self.db.save_ai_meal_request_as_meal(user_id, request_id)?;
        debug!(request_id, meal_id = meal.id, "Saved AI meal");
        Ok(SaveAiMeal::Saved(meal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MacroTotals, NewMeal, NewUserGoal};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn setup() -> (MacroService, User) {
        let svc = MacroService::new_in_memory().unwrap();
        let user = svc.create_user("alice", "hash").unwrap().unwrap();
        (svc, user)
    }

    fn add_meal(svc: &MacroService, user: &User, name: &str, p: f64, c: f64, f: f64) -> Meal {
        svc.db()
            .create_meal(
                user.id,
                &NewMeal {
                    name: name.to_string(),
                    protein: p,
                    carbs: c,
                    fat: f,
                    calories: None,
                    meal_type: "lunch".to_string(),
                    is_ai_generated: false,
                    is_favorite: false,
                    image_url: None,
                },
            )
            .unwrap()
    }

    fn sample_result() -> AiMealResult {
        AiMealResult {
            name: "Lentil soup".to_string(),
            description: String::new(),
            ingredients: vec!["lentils".to_string()],
            protein: 20.0,
            carbs: 40.0,
            fat: 5.0,
            calories: 285.0,
            meal_type: "dinner".to_string(),
        }
    }

    #[test]
    fn test_create_user_reports_duplicates() {
        let (svc, _) = setup();
        assert!(svc.create_user("alice", "hash").unwrap().is_none());
        assert!(svc.create_user("  ", "hash").is_err());
    }

    #[test]
    fn test_session_lifecycle() {
        let (svc, user) = setup();
        let token = svc.start_session(user.id).unwrap();
        assert_eq!(svc.session_user(&token).unwrap().unwrap().id, user.id);
        assert!(svc.session_user("bogus").unwrap().is_none());
        assert!(svc.end_session(&token).unwrap());
        assert!(svc.session_user(&token).unwrap().is_none());
    }

    #[test]
    fn test_log_meal_creates_log_once() {
        let (svc, user) = setup();
        let meal = add_meal(&svc, &user, "Chicken", 30.0, 0.0, 5.0);
        let day = date("2024-06-15");

        let log = svc.log_meal(user.id, meal.id, day, "12:30", 1.0).unwrap().unwrap();
        assert_eq!(log.meal_entries.len(), 1);
        let log2 = svc.log_meal(user.id, meal.id, day, "19:00", 2.0).unwrap().unwrap();
        assert_eq!(log2.id, log.id);
        assert_eq!(log2.meal_entries.len(), 2);
        // 30 + 60 protein
        assert!((log2.total_protein - 90.0).abs() < 0.01);
        assert!((log2.total_calories - (165.0 * 3.0)).abs() < 0.01);
    }

    #[test]
    fn test_log_meal_unknown_meal() {
        let (svc, user) = setup();
        assert!(
            svc.log_meal(user.id, 99, date("2024-06-15"), "12:00", 1.0)
                .unwrap()
                .is_none()
        );
        // no empty log left behind
        assert!(svc.db().get_daily_log(user.id, date("2024-06-15")).unwrap().is_none());
    }

    #[test]
    fn test_log_meal_validates_entry() {
        let (svc, user) = setup();
        let meal = add_meal(&svc, &user, "Chicken", 30.0, 0.0, 5.0);
        assert!(svc.log_meal(user.id, meal.id, date("2024-06-15"), "noon", 1.0).is_err());
        assert!(svc.log_meal(user.id, meal.id, date("2024-06-15"), "12:00", 0.0).is_err());
    }

    #[test]
    fn test_unlog_meal() {
        let (svc, user) = setup();
        let meal = add_meal(&svc, &user, "Chicken", 30.0, 0.0, 5.0);
        let day = date("2024-06-15");
        svc.log_meal(user.id, meal.id, day, "12:30", 1.0).unwrap();
        let log = svc.unlog_meal(user.id, day, 0).unwrap().unwrap();
        assert!(log.meal_entries.is_empty());
        assert!(log.total_calories.abs() < f64::EPSILON);
        assert!(svc.unlog_meal(user.id, day, 0).unwrap().is_none());
        assert!(svc.unlog_meal(user.id, date("2024-01-01"), 0).unwrap().is_none());
    }

    #[test]
    fn test_goal_progress() {
        let (svc, user) = setup();
        svc.db()
            .upsert_user_goals(
                user.id,
                &NewUserGoal {
                    protein_goal: 100,
                    carbs_goal: 200,
                    fat_goal: 50,
                },
            )
            .unwrap();
        let meal = add_meal(&svc, &user, "Chicken", 30.0, 0.0, 5.0);
        let day = date("2024-06-15");
        svc.log_meal(user.id, meal.id, day, "12:30", 1.0).unwrap();

        let progress = svc.goal_progress(user.id, day).unwrap();
        assert_eq!(progress.date, "2024-06-15");
        assert!((progress.remaining.protein - 70.0).abs() < 0.01);
        assert_eq!(progress.percent.protein, 30);
        assert_eq!(progress.percent.fat, 10);

        let empty = svc.goal_progress(user.id, date("2024-06-16")).unwrap();
        assert_eq!(empty.consumed, MacroTotals::default());
        assert_eq!(empty.percent.protein, 0);
    }

    #[test]
    fn test_weekly_stats_zero_fills() {
        let (svc, user) = setup();
        let meal = add_meal(&svc, &user, "Chicken", 30.0, 0.0, 5.0);
        svc.log_meal(user.id, meal.id, date("2024-06-10"), "12:00", 1.0).unwrap();
        svc.log_meal(user.id, meal.id, date("2024-06-14"), "12:00", 1.0).unwrap();
        // outside the window
        svc.log_meal(user.id, meal.id, date("2024-06-01"), "12:00", 1.0).unwrap();

        let stats = svc.weekly_stats(user.id, date("2024-06-16"), 7).unwrap();
        assert_eq!(stats.days.len(), 7);
        assert_eq!(stats.start_date, "2024-06-10");
        assert_eq!(stats.end_date, "2024-06-16");
        assert_eq!(stats.logged_days, 2);
        assert!(stats.days[0].logged);
        assert!(!stats.days[1].logged);
        assert!((stats.total_calories - 330.0).abs() < 0.01);
        assert!((stats.average.calories - 165.0).abs() < 0.01);
        assert!(stats.calorie_goal.is_none());
    }

    #[test]
    fn test_weekly_stats_rejects_bad_range() {
        let (svc, user) = setup();
        assert!(svc.weekly_stats(user.id, date("2024-06-16"), 0).is_err());
        assert!(svc.weekly_stats(user.id, date("2024-06-16"), 1000).is_err());
    }

    #[test]
    fn test_weekly_stats_range_before_min_date() {
        let (svc, user) = setup();
        let end = NaiveDate::MIN + Duration::days(2);
        assert!(svc.weekly_stats(user.id, end, 7).is_err());
        let stats = svc.weekly_stats(user.id, end, 3).unwrap();
        assert_eq!(stats.days.len(), 3);
    }

    #[test]
    fn test_record_ai_meal_requires_prompt() {
        let (svc, user) = setup();
        assert!(
            svc.record_ai_meal(user.id, "  ", &sample_result(), AiProvider::Fallback)
                .is_err()
        );
        let req = svc
            .record_ai_meal(user.id, " soup ", &sample_result(), AiProvider::Gemini)
            .unwrap();
        assert_eq!(req.prompt, "soup");
        assert_eq!(req.provider, AiProvider::Gemini);
    }

    #[test]
    fn test_save_ai_meal_outcomes() {
        let (svc, user) = setup();
        assert!(matches!(
            svc.save_ai_meal(user.id, 1).unwrap(),
            SaveAiMeal::NotFound
        ));

        let req = svc
            .record_ai_meal(user.id, "soup", &sample_result(), AiProvider::OpenAi)
            .unwrap();
        let SaveAiMeal::Saved(meal) = svc.save_ai_meal(user.id, req.id).unwrap() else {
            panic!("expected a saved meal");
        };
        assert!(meal.is_ai_generated);
        assert_eq!(meal.name, "Lentil soup");
        assert!(matches!(
            svc.save_ai_meal(user.id, req.id).unwrap(),
            SaveAiMeal::AlreadySaved
        ));

        let empty = svc
            .db()
            .create_ai_meal_request(user.id, "x", None, AiProvider::Fallback)
            .unwrap();
        assert!(matches!(
            svc.save_ai_meal(user.id, empty.id).unwrap(),
            SaveAiMeal::NoResult
        ));
    }
}
