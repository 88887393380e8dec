//! Per-user, file-backed storage.
//!
//! Each user owns one directory holding `profile.json` plus one CSV log per entry type.
//! Every mutation is a read-modify-write of the whole file followed by an atomic, fsynced
//! replace, so a write that returned `Ok` survives a crash. Two processes writing the same
//! user's log concurrently can still lose an update.

use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{FoodEntry, Profile, WaterEntry, WeightEntry};
use crate::user::UserId;

const PROFILE_FILE: &str = "profile.json";

/// A row type stored in its own CSV log.
pub trait LogRow: Serialize + DeserializeOwned {
    const FILE: &'static str;
    const COLUMNS: &'static [&'static str];
}

impl LogRow for FoodEntry {
    const FILE: &'static str = "food.csv";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "time",
        "meal_slot",
        "name",
        "calories",
        "protein_g",
        "carbs_g",
        "fat_g",
    ];
}

impl LogRow for WaterEntry {
    const FILE: &'static str = "water.csv";
    const COLUMNS: &'static [&'static str] = &["date", "volume_ml"];
}

impl LogRow for WeightEntry {
    const FILE: &'static str = "weight.csv";
    const COLUMNS: &'static [&'static str] = &["date", "weight_kg"];
}

/// Write `bytes` to a sibling temp file, fsync it, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create temp file: {}", tmp.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace file: {}", path.display()))?;

    #[cfg(unix)]
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .with_context(|| format!("Failed to sync directory: {}", parent.display()))?;

    Ok(())
}

/// Copy a damaged file next to itself before it gets rewritten.
pub(crate) fn back_up_damaged(path: &Path) -> Result<PathBuf> {
    let backup = PathBuf::from(format!(
        "{}.corrupt-{}",
        path.display(),
        chrono::Utc::now().timestamp()
    ));
    fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up damaged file: {}", path.display()))?;
    warn!(
        path = %path.display(),
        backup = %backup.display(),
        "damaged file backed up before rewrite"
    );
    Ok(backup)
}

struct LogRead<T> {
    rows: Vec<T>,
    skipped: usize,
}

struct CsvLog<T> {
    path: PathBuf,
    _row: PhantomData<T>,
}

impl<T: LogRow> CsvLog<T> {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(T::FILE),
            _row: PhantomData,
        }
    }

    fn read(&self) -> Result<LogRead<T>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(LogRead {
                    rows: Vec::new(),
                    skipped: 0,
                });
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open log: {}", self.path.display()));
            }
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut rows = Vec::new();
        let mut skipped = 0;
        for (line, record) in rdr.deserialize::<T>().enumerate() {
            match record {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        row = line + 2,
                        error = %e,
                        "skipping unreadable log row"
                    );
                }
            }
        }
        Ok(LogRead { rows, skipped })
    }

    /// Rows for display. Never fails; unreadable files read as empty.
    fn rows(&self) -> Vec<T> {
        match self.read() {
            Ok(read) => read.rows,
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "log unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Rows to be modified and written back. A damaged file is backed up first so the
    /// rewrite does not silently drop what could not be parsed.
    fn rows_for_write(&self) -> Result<Vec<T>> {
        match self.read() {
            Ok(read) if read.skipped == 0 => Ok(read.rows),
            Ok(read) => {
                back_up_damaged(&self.path)?;
                Ok(read.rows)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "log unreadable before write");
                if self.path.exists() {
                    back_up_damaged(&self.path)?;
                }
                Ok(Vec::new())
            }
        }
    }

    fn rewrite(&self, rows: &[T]) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        wtr.write_record(T::COLUMNS)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to encode log: {e}"))?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), rows = rows.len(), "log rewritten");
        Ok(())
    }
}

/// Storage for a single user. The only component that mutates a user's data.
pub struct UserStore {
    user_id: UserId,
    dir: PathBuf,
    food: CsvLog<FoodEntry>,
    water: CsvLog<WaterEntry>,
    weight: CsvLog<WeightEntry>,
}

impl UserStore {
    /// Open (creating if needed) the namespace for `user_id` under `root`.
    pub fn open(root: &Path, user_id: UserId) -> Result<Self> {
        let dir = root.join(user_id.as_str());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create user directory: {}", dir.display()))?;
        Ok(Self {
            food: CsvLog::new(&dir),
            water: CsvLog::new(&dir),
            weight: CsvLog::new(&dir),
            user_id,
            dir,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // --- Profile ---

    /// The stored profile, or defaults when it is missing or unreadable. Fields absent from
    /// the stored JSON take their default values.
    #[must_use]
    pub fn load_profile(&self) -> Profile {
        let path = self.dir.join(PROFILE_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "profile is corrupt, using defaults");
                Profile::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Profile::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read profile, using defaults");
                Profile::default()
            }
        }
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        let json = serde_json::to_vec_pretty(profile).context("Failed to encode profile")?;
        write_atomic(&self.dir.join(PROFILE_FILE), &json)?;
        debug!(user_id = %self.user_id, "profile saved");
        Ok(())
    }

    // --- Food ---

    /// Food entries in insertion order, optionally restricted to one date.
    #[must_use]
    pub fn list_food(&self, date: Option<NaiveDate>) -> Vec<FoodEntry> {
        let mut rows = self.food.rows();
        if let Some(date) = date {
            rows.retain(|e| e.date == date);
        }
        rows
    }

    pub fn append_food(&self, entry: &FoodEntry) -> Result<()> {
        let mut rows = self.food.rows_for_write()?;
        rows.push(entry.clone());
        self.food.rewrite(&rows)
    }

    /// Remove the most recently appended entry for `date`. Returns the removed entry, or
    /// `None` (without touching the file) when that date has no entries.
    pub fn remove_last_food_entry(&self, date: NaiveDate) -> Result<Option<FoodEntry>> {
        let mut rows = self.food.rows_for_write()?;
        let Some(idx) = rows.iter().rposition(|e| e.date == date) else {
            return Ok(None);
        };
        let removed = rows.remove(idx);
        self.food.rewrite(&rows)?;
        Ok(Some(removed))
    }

    // --- Water ---

    #[must_use]
    pub fn list_water(&self, date: Option<NaiveDate>) -> Vec<WaterEntry> {
        let mut rows = self.water.rows();
        if let Some(date) = date {
            rows.retain(|e| e.date == date);
        }
        rows
    }

    pub fn append_water(&self, entry: &WaterEntry) -> Result<()> {
        let mut rows = self.water.rows_for_write()?;
        rows.push(entry.clone());
        self.water.rewrite(&rows)
    }

    // --- Weight ---

    /// Weight entries as stored (at most one per date).
    #[must_use]
    pub fn list_weight(&self) -> Vec<WeightEntry> {
        self.weight.rows()
    }

    /// Insert a weight entry, replacing any existing entry for the same date.
    pub fn upsert_weight(&self, entry: &WeightEntry) -> Result<()> {
        let mut rows = self.weight.rows_for_write()?;
        rows.retain(|e| e.date != entry.date);
        rows.push(entry.clone());
        self.weight.rewrite(&rows)
    }

    /// Weight entries newest first, optionally limited to the `limit` most recent.
    #[must_use]
    pub fn weight_history(&self, limit: Option<usize>) -> Vec<WeightEntry> {
        let mut rows = self.list_weight();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(n) = limit {
            rows.truncate(n);
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goal, MealSlot};
    use chrono::NaiveTime;

    fn open_store(root: &Path) -> UserStore {
        UserStore::open(root, UserId::from_display_name("Test User").unwrap()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn food(day: NaiveDate, name: &str, calories: f64) -> FoodEntry {
        FoodEntry {
            date: day,
            time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            meal_slot: MealSlot::Lunch,
            name: name.to_string(),
            calories,
            protein_g: 10.0,
            carbs_g: 20.0,
            fat_g: 5.0,
        }
    }

    #[test]
    fn test_missing_logs_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(store.list_food(None).is_empty());
        assert!(store.list_water(None).is_empty());
        assert!(store.list_weight().is_empty());
    }

    #[test]
    fn test_profile_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert_eq!(store.load_profile(), Profile::default());
    }

    #[test]
    fn test_profile_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let profile = Profile {
            weight_kg: 72.0,
            goal: Goal::Cut,
            ..Profile::default()
        };
        store.save_profile(&profile).unwrap();
        assert_eq!(store.load_profile(), profile);
    }

    #[test]
    fn test_profile_save_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let profile = Profile {
            weight_kg: 0.0,
            ..Profile::default()
        };
        assert!(store.save_profile(&profile).is_err());
        assert!(!store.dir().join(PROFILE_FILE).exists());
    }

    #[test]
    fn test_corrupt_profile_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        fs::write(store.dir().join(PROFILE_FILE), b"{\"weight_kg\": ").unwrap();
        assert_eq!(store.load_profile(), Profile::default());
    }

    #[test]
    fn test_append_and_list_food_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.append_food(&food(date(2024, 1, 1), "Eggs", 150.0)).unwrap();
        store.append_food(&food(date(2024, 1, 2), "Rice", 200.0)).unwrap();
        store.append_food(&food(date(2024, 1, 1), "Soup", 120.0)).unwrap();

        assert_eq!(store.list_food(None).len(), 3);
        let day = store.list_food(Some(date(2024, 1, 1)));
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].name, "Eggs");
        assert_eq!(day[1].name, "Soup");
    }

    #[test]
    fn test_food_log_has_exact_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.append_food(&food(date(2024, 1, 1), "Eggs", 150.0)).unwrap();

        let raw = fs::read_to_string(store.dir().join("food.csv")).unwrap();
        let mut lines = raw.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,time,meal_slot,name,calories,protein_g,carbs_g,fat_g"
        );
        assert_eq!(lines.next().unwrap(), "2024-01-01,12:30,Lunch,Eggs,150.0,10.0,20.0,5.0");
    }

    #[test]
    fn test_name_with_comma_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .append_food(&food(date(2024, 1, 1), "Chicken, rice and \"sauce\"", 600.0))
            .unwrap();
        assert_eq!(
            store.list_food(None)[0].name,
            "Chicken, rice and \"sauce\""
        );
    }

    #[test]
    fn test_remove_last_food_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.append_food(&food(date(2024, 1, 1), "Eggs", 150.0)).unwrap();
        store.append_food(&food(date(2024, 1, 1), "Toast", 90.0)).unwrap();
        store.append_food(&food(date(2024, 1, 2), "Rice", 200.0)).unwrap();

        let removed = store.remove_last_food_entry(date(2024, 1, 1)).unwrap();
        assert_eq!(removed.unwrap().name, "Toast");

        let names: Vec<String> = store.list_food(None).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Eggs".to_string(), "Rice".to_string()]);
    }

    #[test]
    fn test_remove_last_food_entry_on_empty_date_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.append_food(&food(date(2024, 1, 2), "Rice", 200.0)).unwrap();

        let removed = store.remove_last_food_entry(date(2024, 1, 1)).unwrap();
        assert!(removed.is_none());
        assert_eq!(store.list_food(None).len(), 1);

        // No file at all is fine too
        let other = UserStore::open(dir.path(), UserId::from_display_name("Nobody").unwrap())
            .unwrap();
        assert!(other.remove_last_food_entry(date(2024, 1, 1)).unwrap().is_none());
    }

    #[test]
    fn test_water_entries_are_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let day = date(2024, 3, 1);
        store
            .append_water(&WaterEntry {
                date: day,
                volume_ml: 250.0,
            })
            .unwrap();
        store
            .append_water(&WaterEntry {
                date: day,
                volume_ml: 500.0,
            })
            .unwrap();
        assert_eq!(store.list_water(Some(day)).len(), 2);
    }

    #[test]
    fn test_upsert_weight_replaces_same_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for (day, kg) in [
            (date(2024, 1, 1), 80.0),
            (date(2024, 1, 1), 81.0),
            (date(2024, 1, 2), 82.0),
        ] {
            store
                .upsert_weight(&WeightEntry {
                    date: day,
                    weight_kg: kg,
                })
                .unwrap();
        }

        let rows = store.list_weight();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(2024, 1, 1));
        assert!((rows[0].weight_kg - 81.0).abs() < f64::EPSILON);
        assert_eq!(rows[1].date, date(2024, 1, 2));
        assert!((rows[1].weight_kg - 82.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weight_history_newest_first_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for day in [3, 1, 5, 2, 4] {
            store
                .upsert_weight(&WeightEntry {
                    date: date(2025, 1, day),
                    weight_kg: 80.0,
                })
                .unwrap();
        }
        let history = store.weight_history(Some(3));
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].date, date(2025, 1, 5));
        assert_eq!(history[2].date, date(2025, 1, 3));
    }

    #[test]
    fn test_damaged_rows_skipped_on_read_and_backed_up_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        fs::write(
            store.dir().join("water.csv"),
            "date,volume_ml\n2024-01-01,250\nnot-a-date,abc\n2024-01-01,300\n",
        )
        .unwrap();

        assert_eq!(store.list_water(None).len(), 2);

        store
            .append_water(&WaterEntry {
                date: date(2024, 1, 2),
                volume_ml: 100.0,
            })
            .unwrap();

        assert_eq!(store.list_water(None).len(), 3);
        let backups = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("water.csv.corrupt-"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let alice =
            UserStore::open(dir.path(), UserId::from_display_name("Alice").unwrap()).unwrap();
        let bob = UserStore::open(dir.path(), UserId::from_display_name("Bob").unwrap()).unwrap();
        alice.append_food(&food(date(2024, 1, 1), "Eggs", 150.0)).unwrap();
        assert_eq!(alice.list_food(None).len(), 1);
        assert!(bob.list_food(None).is_empty());
    }
}
