//! Per-weekday slot table and its `time_slots.json` file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Weekday;
use tracing::{error, info, warn};
use ytpub_models::{parse_weekday, weekday_name, ModelResult, TimeSlot};

use crate::error::SchedulerResult;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Slots per weekday, each list kept sorted by priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    days: HashMap<Weekday, Vec<TimeSlot>>,
}

impl Default for SlotTable {
    fn default() -> Self {
        // Hours are static and in range
        Self::builtin().unwrap_or_else(|_| Self { days: HashMap::new() })
    }
}

impl SlotTable {
    pub fn new(days: HashMap<Weekday, Vec<TimeSlot>>) -> Self {
        let mut table = Self { days };
        for slots in table.days.values_mut() {
            slots.sort_by_key(|s| s.priority());
        }
        table
    }

    /// Weekday evenings, lunch and mornings; extended weekend windows.
    fn builtin() -> ModelResult<Self> {
        let weekday = vec![
            TimeSlot::hours(18, 21, 1)?,
            TimeSlot::hours(12, 14, 2)?,
            TimeSlot::hours(8, 10, 3)?,
        ];
        let friday = vec![
            TimeSlot::hours(18, 21, 1)?,
            TimeSlot::hours(12, 14, 2)?,
            TimeSlot::hours(15, 17, 2)?,
        ];
        let weekend = vec![
            TimeSlot::hours(10, 12, 1)?,
            TimeSlot::hours(14, 18, 1)?,
            TimeSlot::hours(20, 22, 2)?,
        ];

        let mut days = HashMap::new();
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu] {
            days.insert(day, weekday.clone());
        }
        days.insert(Weekday::Fri, friday);
        days.insert(Weekday::Sat, weekend.clone());
        days.insert(Weekday::Sun, weekend);
        Ok(Self::new(days))
    }

    pub fn slots_for(&self, day: Weekday) -> &[TimeSlot] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(Vec::is_empty)
    }

    /// Read the table, writing the built-in one when the file does not exist.
    ///
    /// An unreadable file yields the built-in table without touching the file.
    pub fn load_or_init(path: &Path) -> Self {
        if !path.exists() {
            let table = Self::default();
            match table.save(path) {
                Ok(()) => info!(path = %path.display(), "Default time slots written"),
                Err(e) => error!(path = %path.display(), "Failed to write time slots: {}", e),
            }
            return table;
        }

        match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                error!(path = %path.display(), "Failed to load time slots, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> SchedulerResult<Self> {
        let raw = std::fs::read(path)?;
        let parsed: BTreeMap<String, Vec<TimeSlot>> = serde_json::from_slice(&raw)?;
        let mut days = HashMap::new();
        for (name, slots) in parsed {
            match parse_weekday(&name) {
                Some(day) => {
                    days.insert(day, slots);
                }
                None => warn!(day = %name, "Ignoring slots for unknown weekday"),
            }
        }
        Ok(Self::new(days))
    }

    pub fn save(&self, path: &Path) -> SchedulerResult<()> {
        let data: BTreeMap<&str, &[TimeSlot]> = WEEK
            .iter()
            .filter_map(|day| self.days.get(day).map(|slots| (weekday_name(*day), slots.as_slice())))
            .collect();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&data)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = SlotTable::default();
        let monday = table.slots_for(Weekday::Mon);
        assert_eq!(monday.len(), 3);
        assert_eq!(monday[0].to_string(), "18:00-21:00 (p1)");
        assert_eq!(monday[2].priority(), 3);

        let friday: Vec<String> = table.slots_for(Weekday::Fri).iter().map(ToString::to_string).collect();
        assert_eq!(friday, vec!["18:00-21:00 (p1)", "12:00-14:00 (p2)", "15:00-17:00 (p2)"]);
        assert_eq!(table.slots_for(Weekday::Sun)[1].to_string(), "14:00-18:00 (p1)");
    }

    #[test]
    fn test_slots_sorted_by_priority_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_slots.json");
        std::fs::write(
            &path,
            r#"{"monday": [
                {"start_hour": 8, "start_minute": 0, "end_hour": 9, "end_minute": 0, "priority": 3},
                {"start_hour": 19, "start_minute": 30, "end_hour": 20, "end_minute": 0, "priority": 1}
            ], "someday": []}"#,
        )
        .unwrap();

        let table = SlotTable::load(&path).unwrap();
        assert_eq!(table.slots_for(Weekday::Mon)[0].priority(), 1);
        assert!(table.slots_for(Weekday::Tue).is_empty());
    }

    #[test]
    fn test_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_slots.json");
        let table = SlotTable::load_or_init(&path);
        assert!(path.exists());
        assert_eq!(SlotTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_invalid_hours_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("time_slots.json");
        std::fs::write(&path, r#"{"monday": [{"start_hour": 25, "end_hour": 2}]}"#).unwrap();

        assert!(SlotTable::load(&path).is_err());
        assert_eq!(SlotTable::load_or_init(&path), SlotTable::default());
    }
}
