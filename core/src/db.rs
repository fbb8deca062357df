use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::models::{
    AiMealRequest, AiMealResult, AiProvider, DailyLog, MacroTotals, Meal, MealEntry, NewMeal,
    NewUserGoal, UpdateMeal, UpdateUserGoal, User, UserGoal, calories_from_macros,
    validate_meal_type,
};

pub struct Database {
    conn: Connection,
}

const USER_COLUMNS: &str = "id, username, password_hash, created_at";
const MEAL_COLUMNS: &str = "id, user_id, name, protein, carbs, fat, calories, meal_type,
     is_ai_generated, is_favorite, created_at, image_url";
const LOG_COLUMNS: &str = "id, user_id, date, meal_entries, total_protein, total_carbs,
     total_fat, total_calories";
const AI_REQUEST_COLUMNS: &str = "id, user_id, prompt, result, provider, created_at, saved";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_goals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                    protein_goal INTEGER NOT NULL,
                    carbs_goal INTEGER NOT NULL,
                    fat_goal INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    protein REAL NOT NULL,
                    carbs REAL NOT NULL,
                    fat REAL NOT NULL,
                    calories REAL NOT NULL,
                    meal_type TEXT NOT NULL,
                    is_ai_generated INTEGER NOT NULL DEFAULT 0,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    image_url TEXT
                );

                CREATE TABLE IF NOT EXISTS daily_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    meal_entries TEXT NOT NULL DEFAULT '[]',
                    total_protein REAL NOT NULL DEFAULT 0,
                    total_carbs REAL NOT NULL DEFAULT 0,
                    total_fat REAL NOT NULL DEFAULT 0,
                    total_calories REAL NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS ai_meal_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    prompt TEXT NOT NULL,
                    result TEXT,
                    provider TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    saved INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meals_user ON meals(user_id);
                CREATE INDEX IF NOT EXISTS idx_daily_logs_user_date ON daily_logs(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_ai_requests_user ON ai_meal_requests(user_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

                PRAGMA user_version = 1;",
            )?;
            debug!("Migrated database schema to version 1");
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn goal_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserGoal> {
        Ok(UserGoal::from_db(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            protein: row.get(3)?,
            carbs: row.get(4)?,
            fat: row.get(5)?,
            calories: row.get(6)?,
            meal_type: row.get(7)?,
            is_ai_generated: row.get(8)?,
            is_favorite: row.get(9)?,
            created_at: row.get(10)?,
            image_url: row.get(11)?,
        })
    }

    fn json_column<T: serde::de::DeserializeOwned>(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn daily_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailyLog> {
        Ok(DailyLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: row.get(2)?,
            meal_entries: Self::json_column(row, 3)?,
            total_protein: row.get(4)?,
            total_carbs: row.get(5)?,
            total_fat: row.get(6)?,
            total_calories: row.get(7)?,
        })
    }

    fn ai_request_from_row(row: &rusqlite::Row) -> rusqlite::Result<AiMealRequest> {
        let result: Option<AiMealResult> = match row.get::<_, Option<String>>(3)? {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };
        let provider: String = row.get(4)?;
        let provider = AiProvider::parse(&provider).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(AiMealRequest {
            id: row.get(0)?,
            user_id: row.get(1)?,
            prompt: row.get(2)?,
            result,
            provider,
            created_at: row.get(5)?,
            saved: row.get(6)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        if self.get_user_by_username(username)?.is_some() {
            bail!("Username '{username}' already exists");
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User vanished after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .optional()?)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                Self::user_from_row,
            )
            .optional()?)
    }

    // --- Goals ---

    pub fn get_user_goals(&self, user_id: i64) -> Result<Option<UserGoal>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, protein_goal, carbs_goal, fat_goal
                 FROM user_goals WHERE user_id = ?1",
                params![user_id],
                Self::goal_from_row,
            )
            .optional()?)
    }

    /// Create or replace the user's goals. Returns `(goal, created)`.
    pub fn upsert_user_goals(&self, user_id: i64, goal: &NewUserGoal) -> Result<(UserGoal, bool)> {
        let created = self.get_user_goals(user_id)?.is_none();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_goals (user_id, protein_goal, carbs_goal, fat_goal, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                protein_goal = excluded.protein_goal,
                carbs_goal = excluded.carbs_goal,
                fat_goal = excluded.fat_goal,
                updated_at = excluded.updated_at",
            params![
                user_id,
                goal.protein_goal,
                goal.carbs_goal,
                goal.fat_goal,
                now
            ],
        )?;
        let stored = self
            .get_user_goals(user_id)?
            .context("Goals vanished after upsert")?;
        Ok((stored, created))
    }

    pub fn update_user_goals(
        &self,
        user_id: i64,
        update: &UpdateUserGoal,
    ) -> Result<Option<UserGoal>> {
        let Some(current) = self.get_user_goals(user_id)? else {
            return Ok(None);
        };
        let merged = NewUserGoal {
            protein_goal: update.protein_goal.unwrap_or(current.protein_goal),
            carbs_goal: update.carbs_goal.unwrap_or(current.carbs_goal),
            fat_goal: update.fat_goal.unwrap_or(current.fat_goal),
        };
        let (goal, _) = self.upsert_user_goals(user_id, &merged)?;
        Ok(Some(goal))
    }

    // --- Meals ---

    pub fn create_meal(&self, user_id: i64, meal: &NewMeal) -> Result<Meal> {
        let meal_type = validate_meal_type(&meal.meal_type)?;
        let calories = meal
            .calories
            .unwrap_or_else(|| calories_from_macros(meal.protein, meal.carbs, meal.fat));
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meals (user_id, name, protein, carbs, fat, calories, meal_type,
                                is_ai_generated, is_favorite, created_at, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user_id,
                meal.name.trim(),
                meal.protein,
                meal.carbs,
                meal.fat,
                calories,
                meal_type,
                meal.is_ai_generated,
                meal.is_favorite,
                now,
                meal.image_url,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_meal(user_id, id)?
            .context("Meal vanished after insert")
    }

    pub fn get_meal(&self, user_id: i64, id: i64) -> Result<Option<Meal>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                Self::meal_from_row,
            )
            .optional()?)
    }

    pub fn get_meals_by_user(&self, user_id: i64) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1 ORDER BY id"
        ))?;
        let meals = stmt
            .query_map(params![user_id], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn get_favorite_meals(&self, user_id: i64) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1 AND is_favorite = 1 ORDER BY id"
        ))?;
        let meals = stmt
            .query_map(params![user_id], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Case-insensitive substring match on the meal name.
    pub fn search_meals(&self, user_id: i64, query: &str) -> Result<Vec<Meal>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals
             WHERE user_id = ?1 AND lower(name) LIKE ?2
             ORDER BY id"
        ))?;
        let meals = stmt
            .query_map(params![user_id, pattern], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn update_meal(&self, user_id: i64, id: i64, update: &UpdateMeal) -> Result<Option<Meal>> {
        let Some(current) = self.get_meal(user_id, id)? else {
            return Ok(None);
        };
        let meal_type = match &update.meal_type {
            Some(t) => validate_meal_type(t)?,
            None => current.meal_type,
        };
        let name = update
            .name
            .as_deref()
            .map_or(current.name, |n| n.trim().to_string());
        let image_url = update.image_url.clone().unwrap_or(current.image_url);
        self.conn.execute(
            "UPDATE meals SET name = ?1, protein = ?2, carbs = ?3, fat = ?4, calories = ?5,
                              meal_type = ?6, is_favorite = ?7, image_url = ?8
             WHERE id = ?9 AND user_id = ?10",
            params![
                name,
                update.protein.unwrap_or(current.protein),
                update.carbs.unwrap_or(current.carbs),
                update.fat.unwrap_or(current.fat),
                update.calories.unwrap_or(current.calories),
                meal_type,
                update.is_favorite.unwrap_or(current.is_favorite),
                image_url,
                id,
                user_id,
            ],
        )?;
        self.get_meal(user_id, id)
    }

    pub fn delete_meal(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM meals WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn toggle_favorite(&self, user_id: i64, id: i64) -> Result<Option<Meal>> {
        let rows = self.conn.execute(
            "UPDATE meals SET is_favorite = NOT is_favorite WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_meal(user_id, id)
    }

    // --- Daily logs ---

    pub fn get_daily_log(&self, user_id: i64, date: NaiveDate) -> Result<Option<DailyLog>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM daily_logs WHERE user_id = ?1 AND date = ?2"),
                params![user_id, date_str],
                Self::daily_log_from_row,
            )
            .optional()?)
    }

    pub fn get_daily_log_by_id(&self, user_id: i64, id: i64) -> Result<Option<DailyLog>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM daily_logs WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                Self::daily_log_from_row,
            )
            .optional()?)
    }

    /// Logs between `start` and `end`, both inclusive, ordered by date.
    pub fn get_daily_logs_by_date_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLog>> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM daily_logs
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date"
        ))?;
        let logs = stmt
            .query_map(params![user_id, start, end], Self::daily_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn create_daily_log(
        &self,
        user_id: i64,
        date: NaiveDate,
        entries: &[MealEntry],
    ) -> Result<DailyLog> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO daily_logs (user_id, date, updated_at) VALUES (?1, ?2, ?3)",
            params![user_id, date_str, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.write_entries(user_id, id, entries)
    }

    /// Replace the log's entries. Totals are recomputed from the new list.
    pub fn update_daily_log(
        &self,
        user_id: i64,
        id: i64,
        entries: &[MealEntry],
    ) -> Result<Option<DailyLog>> {
        if self.get_daily_log_by_id(user_id, id)?.is_none() {
            return Ok(None);
        }
        self.write_entries(user_id, id, entries).map(Some)
    }

    /// Create the log for `date` or replace the entries of the existing one.
    /// Returns `(log, created)`.
    pub fn upsert_daily_log(
        &self,
        user_id: i64,
        date: NaiveDate,
        entries: &[MealEntry],
    ) -> Result<(DailyLog, bool)> {
        match self.get_daily_log(user_id, date)? {
            Some(existing) => Ok((self.write_entries(user_id, existing.id, entries)?, false)),
            None => Ok((self.create_daily_log(user_id, date, entries)?, true)),
        }
    }

    pub fn add_meal_to_daily_log(
        &self,
        user_id: i64,
        id: i64,
        entry: MealEntry,
    ) -> Result<Option<DailyLog>> {
        let Some(mut log) = self.get_daily_log_by_id(user_id, id)? else {
            return Ok(None);
        };
        log.meal_entries.push(entry);
        self.write_entries(user_id, id, &log.meal_entries).map(Some)
    }

    /// Returns `None` when the log is unknown or `index` is out of range.
    pub fn remove_meal_from_daily_log(
        &self,
        user_id: i64,
        id: i64,
        index: usize,
    ) -> Result<Option<DailyLog>> {
        let Some(mut log) = self.get_daily_log_by_id(user_id, id)? else {
            return Ok(None);
        };
        if index >= log.meal_entries.len() {
            return Ok(None);
        }
        log.meal_entries.remove(index);
        self.write_entries(user_id, id, &log.meal_entries).map(Some)
    }

    // Every entry-list mutation goes through here so the cached totals always
    // match the entries.
    fn write_entries(&self, user_id: i64, id: i64, entries: &[MealEntry]) -> Result<DailyLog> {
        let totals = MacroTotals::from_entries(entries);
        let json = serde_json::to_string(entries).context("failed to encode meal entries")?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE daily_logs SET meal_entries = ?1, total_protein = ?2, total_carbs = ?3,
                                   total_fat = ?4, total_calories = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![
                json,
                totals.protein,
                totals.carbs,
                totals.fat,
                totals.calories,
                now,
                id,
                user_id,
            ],
        )?;
        self.get_daily_log_by_id(user_id, id)?
            .context("Daily log not found")
    }

    // --- AI meal requests ---

    pub fn create_ai_meal_request(
        &self,
        user_id: i64,
        prompt: &str,
        result: Option<&AiMealResult>,
        provider: AiProvider,
    ) -> Result<AiMealRequest> {
        let now = Local::now().to_rfc3339();
        let result_json = result
            .map(serde_json::to_string)
            .transpose()
            .context("failed to encode AI meal result")?;
        self.conn.execute(
            "INSERT INTO ai_meal_requests (user_id, prompt, result, provider, created_at, saved)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![user_id, prompt, result_json, provider.as_str(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ai_meal_request(user_id, id)?
            .context("AI meal request vanished after insert")
    }

    pub fn get_ai_meal_request(&self, user_id: i64, id: i64) -> Result<Option<AiMealRequest>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {AI_REQUEST_COLUMNS} FROM ai_meal_requests
                     WHERE id = ?1 AND user_id = ?2"
                ),
                params![id, user_id],
                Self::ai_request_from_row,
            )
            .optional()?)
    }

    /// Newest first.
    pub fn get_ai_meal_requests_by_user(&self, user_id: i64) -> Result<Vec<AiMealRequest>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AI_REQUEST_COLUMNS} FROM ai_meal_requests
             WHERE user_id = ?1 ORDER BY id DESC"
        ))?;
        let requests = stmt
            .query_map(params![user_id], Self::ai_request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    pub fn mark_ai_meal_request_saved(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE ai_meal_requests SET saved = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    /// Turn the request's result into a meal and flag the request as saved,
    /// atomically. Fails if the request is unknown, already saved, or has no result.
    pub fn save_ai_meal_request_as_meal(&self, user_id: i64, id: i64) -> Result<Meal> {
        let request = self
            .get_ai_meal_request(user_id, id)?
            .context("AI meal request not found")?;
        if request.saved {
            bail!("AI meal request {id} is already saved");
        }
        let Some(result) = request.result else {
            bail!("AI meal request {id} has no result to save");
        };

        let tx = self.conn.unchecked_transaction()?;
        let meal = self.create_meal(
            user_id,
            &NewMeal {
                name: result.name,
                protein: result.protein,
                carbs: result.carbs,
                fat: result.fat,
                calories: Some(result.calories),
                meal_type: result.meal_type,
                is_ai_generated: true,
                is_favorite: false,
                image_url: None,
            },
        )?;
        self.mark_ai_meal_request_saved(user_id, id)?;
        tx.commit()?;
        Ok(meal)
    }

    // --- Sessions ---

    pub fn create_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now, expires_at.timestamp()],
        )?;
        Ok(())
    }

    /// The user owning an unexpired session.
    pub fn get_session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.password_hash, u.created_at
                 FROM sessions s
                 JOIN users u ON s.user_id = u.id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2",
                params![token_hash, now.timestamp()],
                Self::user_from_row,
            )
            .optional()?)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;
        Ok(rows)
    }

    // --- Demo data ---

    /// Seed the `demo`/`demo` account with goals, a few favorite meals and a
    /// log for today. Does nothing beyond returning the user if it already exists.
    pub fn seed_demo(&self) -> Result<User> {
        if let Some(existing) = self.get_user_by_username("demo")? {
            return Ok(existing);
        }
        let hash = crate::auth::hash_password("demo")?;
        let user = self.create_user("demo", &hash)?;
        self.upsert_user_goals(
            user.id,
            &NewUserGoal {
                protein_goal: 160,
                carbs_goal: 240,
                fat_goal: 53,
            },
        )?;

        let seeds = [
            ("Oatmeal with fruit and yogurt", 15.0, 45.0, 8.0, 312.0, "breakfast"),
            ("Grilled chicken salad", 35.0, 20.0, 12.0, 328.0, "lunch"),
            ("Protein shake", 25.0, 15.0, 2.0, 178.0, "snack"),
            ("Mixed green salad", 12.0, 10.0, 5.0, 133.0, "dinner"),
        ];
        let mut meals = Vec::with_capacity(seeds.len());
        for (name, protein, carbs, fat, calories, meal_type) in seeds {
            meals.push(self.create_meal(
                user.id,
                &NewMeal {
                    name: name.to_string(),
                    protein,
                    carbs,
                    fat,
                    calories: Some(calories),
                    meal_type: meal_type.to_string(),
                    is_ai_generated: false,
                    is_favorite: true,
                    image_url: None,
                },
            )?);
        }

        let entries: Vec<MealEntry> = meals
            .iter()
            .zip(["08:30", "13:00", "16:30"])
            .map(|(meal, time)| MealEntry::from_meal(meal, time, 1.0))
            .collect();
        self.upsert_daily_log(user.id, Local::now().date_naive(), &entries)?;

        info!(user_id = user.id, meals = meals.len(), "Seeded demo account");
        Ok(user)
    }
}
