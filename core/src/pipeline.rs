//! Meal ingestion: describe → analyze → extract → stamp → append.

use anyhow::{Result, bail};
use chrono::Timelike;
use tracing::{debug, info, warn};

use crate::analyzer::{MealAnalyzer, MealInput, MealRequest};
use crate::clock::Clock;
use crate::error::IngestionError;
use crate::extract::extract_meal;
use crate::models::{FoodEntry, MealFields, MealSlot, validate_meal_fields};
use crate::store::UserStore;
use crate::user::UserId;

/// Per-session state that is never persisted.
///
/// The store is the source of truth for everything logged; this only carries counters the
/// user builds up during one sitting, like burned calories from a workout tracker.
#[derive(Debug, Clone)]
pub struct SessionContext {
    user_id: UserId,
    burned_kcal: i64,
    meals_logged: u32,
    last_entry: Option<FoodEntry>,
}

impl SessionContext {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            burned_kcal: 0,
            meals_logged: 0,
            last_entry: None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn burned_kcal(&self) -> i64 {
        self.burned_kcal
    }

    /// Add burned calories and return the new session total.
    pub fn add_burn(&mut self, kcal: i64) -> Result<i64> {
        if kcal <= 0 {
            bail!("Burned calories must be greater than 0");
        }
        self.burned_kcal = self.burned_kcal.saturating_add(kcal);
        Ok(self.burned_kcal)
    }

    pub fn reset_burn(&mut self) {
        self.burned_kcal = 0;
    }

    #[must_use]
    pub fn meals_logged(&self) -> u32 {
        self.meals_logged
    }

    #[must_use]
    pub fn last_entry(&self) -> Option<&FoodEntry> {
        self.last_entry.as_ref()
    }

    fn record(&mut self, entry: &FoodEntry) {
        self.meals_logged += 1;
        self.last_entry = Some(entry.clone());
    }
}

/// Ask the AI service about a meal and recover its nutrition fields.
///
/// Touches no store, so callers can run it without holding any per-user lock.
pub fn analyze_meal(
    analyzer: &dyn MealAnalyzer,
    user_id: &UserId,
    input: &MealInput,
) -> Result<MealFields, IngestionError> {
    let request = MealRequest::build(input);
    debug!(
        user_id = %user_id,
        has_image = request.image.is_some(),
        "requesting meal analysis"
    );

    let reply = analyzer.analyze(&request).inspect_err(|e| {
        warn!(user_id = %user_id, error = %e, "meal analysis failed");
    })?;

    Ok(extract_meal(&reply).inspect_err(|_| {
        warn!(
            user_id = %user_id,
            reply_len = reply.len(),
            "could not extract a meal from the AI reply"
        );
    })?)
}

/// Stamp analyzed fields with the clock and append them to the user's food log.
pub fn record_meal(
    store: &UserStore,
    clock: &dyn Clock,
    session: &mut SessionContext,
    fields: MealFields,
) -> Result<FoodEntry, IngestionError> {
    check_session(store, session)?;
    let entry = stamp(fields, clock, None);
    store.append_food(&entry).map_err(IngestionError::Storage)?;
    session.record(&entry);

    info!(
        user_id = %store.user_id(),
        name = %entry.name,
        calories = entry.calories,
        meal_slot = %entry.meal_slot,
        "meal logged"
    );
    Ok(entry)
}

/// Analyze a meal with the AI service and append the result to the user's food log.
///
/// Nothing is written unless a complete entry has been produced.
pub fn log_meal(
    store: &UserStore,
    analyzer: &dyn MealAnalyzer,
    clock: &dyn Clock,
    session: &mut SessionContext,
    input: &MealInput,
) -> Result<FoodEntry, IngestionError> {
    check_session(store, session)?;
    let fields = analyze_meal(analyzer, store.user_id(), input)?;
    record_meal(store, clock, session, fields)
}

/// Append a meal the user entered by hand, stamped the same way as analyzed meals.
/// `slot` overrides the hour-of-day classification.
pub fn log_manual(
    store: &UserStore,
    clock: &dyn Clock,
    session: &mut SessionContext,
    fields: MealFields,
    slot: Option<MealSlot>,
) -> Result<FoodEntry> {
    check_session(store, session)?;
    validate_meal_fields(&fields)?;
    let entry = stamp(fields, clock, slot);
    store.append_food(&entry)?;
    session.record(&entry);
    info!(user_id = %store.user_id(), name = %entry.name, "manual meal logged");
    Ok(entry)
}

fn stamp(fields: MealFields, clock: &dyn Clock, slot: Option<MealSlot>) -> FoodEntry {
    let now = clock.now();
    let time = now
        .time()
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or_else(|| now.time());
    let meal_slot = slot.unwrap_or_else(|| MealSlot::from_hour(now.hour()));
    fields.into_entry(now.date_naive(), time, meal_slot)
}

fn check_session(store: &UserStore, session: &SessionContext) -> Result<(), IngestionError> {
    if store.user_id() == session.user_id() {
        return Ok(());
    }
    warn!(
        store = %store.user_id(),
        session = %session.user_id(),
        "refusing write: session context belongs to a different user"
    );
    Err(IngestionError::WrongUser {
        session: session.user_id().clone(),
        store: store.user_id().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::error::ServiceError;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Mutex;

    struct MockAnalyzer {
        reply: Result<String, ServiceError>,
        seen: Mutex<Vec<MealRequest>>,
    }

    impl MockAnalyzer {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: ServiceError) -> Self {
            Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MealAnalyzer for MockAnalyzer {
        fn analyze(&self, request: &MealRequest) -> Result<String, ServiceError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn clock_at(h: u32, m: u32) -> FrozenClock {
        FrozenClock::at(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(h, m, 42).unwrap(),
            1,
        )
        .unwrap()
    }

    fn setup() -> (tempfile::TempDir, UserStore, SessionContext) {
        let dir = tempfile::tempdir().unwrap();
        let id = UserId::from_display_name("Alice").unwrap();
        let store = UserStore::open(dir.path(), id.clone()).unwrap();
        (dir, store, SessionContext::new(id))
    }

    #[test]
    fn test_log_meal_appends_stamped_entry() {
        let (_dir, store, mut session) = setup();
        let analyzer = MockAnalyzer::replying(
            "```json\n{\"name\": \"Omelette\", \"calories\": 320, \"protein\": 22, \"carbs\": 3, \"fat\": 24}\n```",
        );

        let entry = log_meal(
            &store,
            &analyzer,
            &clock_at(8, 15),
            &mut session,
            &MealInput::Text("three egg omelette".to_string()),
        )
        .unwrap();

        assert_eq!(entry.name, "Omelette");
        assert_eq!(entry.meal_slot, MealSlot::Breakfast);
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(entry.time, NaiveTime::from_hms_opt(8, 15, 0).unwrap());
        assert_eq!(store.list_food(None), vec![entry.clone()]);
        assert_eq!(session.meals_logged(), 1);
        assert_eq!(session.last_entry(), Some(&entry));

        let seen = analyzer.seen.lock().unwrap();
        assert_eq!(seen[0].description.as_deref(), Some("three egg omelette"));
    }

    #[test]
    fn test_meal_slot_follows_hour() {
        let (_dir, store, mut session) = setup();
        let analyzer = MockAnalyzer::replying(r#"{"name": "Food", "calories": 100}"#);
        let input = MealInput::Text("food".to_string());

        for (hour, slot) in [
            (4, MealSlot::Dinner),
            (5, MealSlot::Breakfast),
            (10, MealSlot::Lunch),
            (14, MealSlot::Snack),
            (18, MealSlot::Dinner),
        ] {
            let entry =
                log_meal(&store, &analyzer, &clock_at(hour, 0), &mut session, &input).unwrap();
            assert_eq!(entry.meal_slot, slot, "hour {hour}");
        }
    }

    #[test]
    fn test_service_failure_leaves_log_untouched() {
        let (_dir, store, mut session) = setup();
        let analyzer = MockAnalyzer::failing(ServiceError::Timeout);

        let err = log_meal(
            &store,
            &analyzer,
            &clock_at(12, 0),
            &mut session,
            &MealInput::Text("pasta".to_string()),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            IngestionError::ServiceUnavailable(ServiceError::Timeout)
        ));
        assert!(store.list_food(None).is_empty());
        assert_eq!(session.meals_logged(), 0);
    }

    #[test]
    fn test_unparseable_reply_leaves_log_untouched() {
        let (_dir, store, mut session) = setup();
        let analyzer = MockAnalyzer::replying("Sorry, I can't see any food in this picture.");

        let err = log_meal(
            &store,
            &analyzer,
            &clock_at(12, 0),
            &mut session,
            &MealInput::Text("???".to_string()),
        )
        .unwrap_err();

        assert!(matches!(err, IngestionError::InvalidResponse(_)));
        assert!(store.list_food(None).is_empty());
    }

    #[test]
    fn test_log_manual_with_slot_override() {
        let (_dir, store, mut session) = setup();
        let fields = MealFields {
            name: "Protein bar".to_string(),
            calories: 210.0,
            protein_g: 20.0,
            carbs_g: 22.0,
            fat_g: 7.0,
        };
        let entry = log_manual(
            &store,
            &clock_at(21, 5),
            &mut session,
            fields,
            Some(MealSlot::Other),
        )
        .unwrap();
        assert_eq!(entry.meal_slot, MealSlot::Other);
        assert_eq!(store.list_food(None).len(), 1);
    }

    #[test]
    fn test_log_manual_rejects_negative_values() {
        let (_dir, store, mut session) = setup();
        let fields = MealFields {
            name: "Broken".to_string(),
            calories: -5.0,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
        };
        assert!(log_manual(&store, &clock_at(12, 0), &mut session, fields, None).is_err());
        assert!(store.list_food(None).is_empty());
    }

    #[test]
    fn test_session_for_other_user_cannot_write() {
        let (_dir, store, _) = setup();
        let mut bob = SessionContext::new(UserId::from_display_name("Bob").unwrap());
        let analyzer = MockAnalyzer::replying(r#"{"name": "Soup", "calories": 180}"#);

        let err = log_meal(
            &store,
            &analyzer,
            &clock_at(12, 0),
            &mut bob,
            &MealInput::Text("soup".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, IngestionError::WrongUser { .. }));
        assert!(analyzer.seen.lock().unwrap().is_empty());

        let fields = MealFields {
            name: "Soup".to_string(),
            calories: 180.0,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
        };
        assert!(log_manual(&store, &clock_at(12, 0), &mut bob, fields, None).is_err());
        assert!(store.list_food(None).is_empty());
        assert_eq!(bob.meals_logged(), 0);
    }

    #[test]
    fn test_analyze_then_record() {
        let (_dir, store, mut session) = setup();
        let analyzer = MockAnalyzer::replying(r#"{"name": "Salad", "calories": 240, "fat": 12}"#);

        let fields = analyze_meal(
            &analyzer,
            session.user_id(),
            &MealInput::Text("salad".to_string()),
        )
        .unwrap();
        assert_eq!(fields.name, "Salad");
        assert!(store.list_food(None).is_empty());

        let entry = record_meal(&store, &clock_at(13, 10), &mut session, fields).unwrap();
        assert_eq!(entry.meal_slot, MealSlot::Lunch);
        assert_eq!(store.list_food(None), vec![entry]);
        assert_eq!(session.meals_logged(), 1);
    }

    #[test]
    fn test_session_burn_counter() {
        let mut session = SessionContext::new(UserId::from_display_name("Bob").unwrap());
        assert_eq!(session.add_burn(150).unwrap(), 150);
        assert_eq!(session.add_burn(50).unwrap(), 200);
        assert!(session.add_burn(0).is_err());
        session.reset_burn();
        assert_eq!(session.burned_kcal(), 0);
    }
}
