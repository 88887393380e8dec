use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use crate::aggregate;
use crate::analyzer::{MealAnalyzer, MealInput};
use crate::clock::Clock;
use crate::error::IngestionError;
use crate::goals::compute_targets;
use crate::models::{
    Dashboard, DailySummary, FoodEntry, GoalTargets, HistoryDay, MealFields, MealSlot, Profile,
    WaterEntry, WeightEntry, validate_water_volume, validate_weight,
};
use crate::pipeline::{self, SessionContext};
use crate::store::UserStore;
use crate::user::{UserDirectory, UserId};

const USERS_FILE: &str = "users.json";
const USERS_DIR: &str = "users";

/// Entry point for every front end: owns the data root, the user directory and the clock.
///
/// Calls are synchronous. Callers running inside an async runtime should invoke
/// AI-dependent methods from a blocking thread.
pub struct NutritionService {
    root: PathBuf,
    users: UserDirectory,
    clock: Arc<dyn Clock>,
}

impl NutritionService {
    pub fn new(data_dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let users_root = data_dir.join(USERS_DIR);
        fs::create_dir_all(&users_root)
            .with_context(|| format!("Failed to create data directory: {}", users_root.display()))?;
        debug!(data_dir = %data_dir.display(), "nutrition service ready");
        Ok(Self {
            users: UserDirectory::new(data_dir.join(USERS_FILE)),
            root: data_dir.to_path_buf(),
            clock,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // --- Users ---

    pub fn register_user(&self, display_name: &str) -> Result<UserId> {
        self.users.register(display_name)
    }

    #[must_use]
    pub fn list_users(&self) -> Vec<String> {
        self.users.list()
    }

    /// Open a user's store. The user must already be registered or be registrable.
    pub fn store(&self, user: &UserId) -> Result<UserStore> {
        UserStore::open(&self.root.join(USERS_DIR), user.clone())
    }

    // --- Profile ---

    pub fn get_profile(&self, user: &UserId) -> Result<Profile> {
        Ok(self.store(user)?.load_profile())
    }

    pub fn save_profile(&self, user: &UserId, profile: &Profile) -> Result<()> {
        self.store(user)?.save_profile(profile)
    }

    /// Targets recomputed from the current profile.
    pub fn get_targets(&self, user: &UserId) -> Result<GoalTargets> {
        Ok(compute_targets(&self.get_profile(user)?))
    }

    // --- Meals ---

    pub fn log_meal(
        &self,
        analyzer: &dyn MealAnalyzer,
        session: &mut SessionContext,
        input: &MealInput,
    ) -> Result<FoodEntry, IngestionError> {
        let store = self
            .store(session.user_id())
            .map_err(IngestionError::Storage)?;
        pipeline::log_meal(&store, analyzer, self.clock.as_ref(), session, input)
    }

    /// The AI half of [`log_meal`](Self::log_meal). Reads and writes nothing.
    pub fn analyze_meal(
        &self,
        analyzer: &dyn MealAnalyzer,
        user: &UserId,
        input: &MealInput,
    ) -> Result<MealFields, IngestionError> {
        pipeline::analyze_meal(analyzer, user, input)
    }

    /// The storage half of [`log_meal`](Self::log_meal): stamp and append analyzed fields.
    pub fn record_analyzed_meal(
        &self,
        session: &mut SessionContext,
        fields: MealFields,
    ) -> Result<FoodEntry, IngestionError> {
        let store = self
            .store(session.user_id())
            .map_err(IngestionError::Storage)?;
        pipeline::record_meal(&store, self.clock.as_ref(), session, fields)
    }

    pub fn log_manual_meal(
        &self,
        session: &mut SessionContext,
        fields: MealFields,
        slot: Option<MealSlot>,
    ) -> Result<FoodEntry> {
        let store = self.store(session.user_id())?;
        pipeline::log_manual(&store, self.clock.as_ref(), session, fields, slot)
    }

    /// Remove the last meal logged on `date` (default today).
    pub fn undo_last_meal(&self, user: &UserId, date: Option<NaiveDate>) -> Result<Option<FoodEntry>> {
        let date = date.unwrap_or_else(|| self.today());
        self.store(user)?.remove_last_food_entry(date)
    }

    pub fn list_food(&self, user: &UserId, date: Option<NaiveDate>) -> Result<Vec<FoodEntry>> {
        Ok(self.store(user)?.list_food(date))
    }

    // --- Water ---

    pub fn log_water(
        &self,
        user: &UserId,
        volume_ml: f64,
        date: Option<NaiveDate>,
    ) -> Result<WaterEntry> {
        validate_water_volume(volume_ml)?;
        let entry = WaterEntry {
            date: date.unwrap_or_else(|| self.today()),
            volume_ml,
        };
        self.store(user)?.append_water(&entry)?;
        Ok(entry)
    }

    pub fn water_total(&self, user: &UserId, date: NaiveDate) -> Result<f64> {
        Ok(aggregate::water_total(&self.store(user)?, date))
    }

    // --- Weight ---

    pub fn log_weight(
        &self,
        user: &UserId,
        weight_kg: f64,
        date: Option<NaiveDate>,
    ) -> Result<WeightEntry> {
        validate_weight(weight_kg)?;
        let entry = WeightEntry {
            date: date.unwrap_or_else(|| self.today()),
            weight_kg,
        };
        self.store(user)?.upsert_weight(&entry)?;
        Ok(entry)
    }

    pub fn weight_history(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<WeightEntry>> {
        Ok(self.store(user)?.weight_history(limit))
    }

    pub fn current_weight(&self, user: &UserId) -> Result<f64> {
        Ok(aggregate::current_weight(&self.store(user)?))
    }

    // --- Aggregates ---

    pub fn get_daily_summary(&self, user: &UserId, date: NaiveDate) -> Result<DailySummary> {
        Ok(aggregate::daily_summary(&self.store(user)?, date))
    }

    pub fn get_dashboard(&self, session: &SessionContext, date: NaiveDate) -> Result<Dashboard> {
        Ok(aggregate::dashboard(
            &self.store(session.user_id())?,
            date,
            session.burned_kcal(),
        ))
    }

    /// Totals for the last `days` days, ending today.
    pub fn get_history(&self, user: &UserId, days: u32) -> Result<Vec<HistoryDay>> {
        Ok(aggregate::history(&self.store(user)?, self.today(), days))
    }

    pub fn get_logging_streak(&self, user: &UserId) -> Result<i64> {
        Ok(aggregate::logging_streak(&self.store(user)?, self.today()))
    }
}
