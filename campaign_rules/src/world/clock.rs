//! World time tracking.

use serde::{Deserialize, Serialize};

/// Seasons of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    #[default]
    Spring,
    Summer,
    Autumn,
    Winter,
}

/// Day or night, as encounter tables see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Day,
    Night,
}

/// Which part of the day an encounter entry may fire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    #[default]
    Any,
    Day,
    Night,
}

impl TimeWindow {
    pub fn admits(&self, time_of_day: TimeOfDay) -> bool {
        match self {
            TimeWindow::Any => true,
            TimeWindow::Day => time_of_day == TimeOfDay::Day,
            TimeWindow::Night => time_of_day == TimeOfDay::Night,
        }
    }
}

/// The world clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldClock {
    pub day: u32,
    pub hour: u8,
    pub minute: u8,
    pub season: Season,
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new(1, 8, 0)
    }
}

impl WorldClock {
    /// Create a clock; the season follows from the day.
    pub fn new(day: u32, hour: u8, minute: u8) -> Self {
        Self {
            day,
            hour: hour % 24,
            minute: minute % 60,
            season: season_for_day(day),
        }
    }

    /// Check if it's currently night.
    pub fn is_night(&self) -> bool {
        self.hour < 6 || self.hour >= 20
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        if self.is_night() {
            TimeOfDay::Night
        } else {
            TimeOfDay::Day
        }
    }

    /// Minutes since day 0, 00:00.
    pub fn total_minutes(&self) -> u64 {
        (self.day as u64 * 24 + self.hour as u64) * 60 + self.minute as u64
    }

    /// Advance time by given minutes.
    pub fn advance(&mut self, minutes: u32) {
        let total_minutes = self.minute as u64 + minutes as u64;
        self.minute = (total_minutes % 60) as u8;

        let total_hours = self.hour as u64 + total_minutes / 60;
        self.hour = (total_hours % 24) as u8;

        let days_passed = u32::try_from(total_hours / 24).unwrap_or(u32::MAX);
        self.day = self.day.saturating_add(days_passed);
        self.season = season_for_day(self.day);
    }
}

/// Seasons turn every 90 days.
fn season_for_day(day: u32) -> Season {
    match day % 360 {
        0..=89 => Season::Spring,
        90..=179 => Season::Summer,
        180..=269 => Season::Autumn,
        _ => Season::Winter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_time_is_night() {
        let mut clock = WorldClock::default();

        clock.hour = 14;
        assert!(!clock.is_night());
        assert_eq!(clock.time_of_day(), TimeOfDay::Day);

        clock.hour = 22;
        assert!(clock.is_night());

        clock.hour = 4;
        assert_eq!(clock.time_of_day(), TimeOfDay::Night);
    }

    #[test]
    fn test_advance_time() {
        let mut clock = WorldClock::new(1, 23, 30);

        clock.advance(60);

        assert_eq!(clock.hour, 0);
        assert_eq!(clock.minute, 30);
        assert_eq!(clock.day, 2);
    }

    #[test]
    fn test_advance_by_largest_step() {
        let mut clock = WorldClock::new(0, 23, 59);
        let before = clock.total_minutes();

        clock.advance(30);
        clock.advance(u32::MAX);

        assert_eq!(clock.total_minutes(), before + 30 + u32::MAX as u64);
        assert_eq!((clock.day, clock.hour, clock.minute), (2_982_617, 4, 44));
    }

    #[test]
    fn test_seasons_turn() {
        let mut clock = WorldClock::new(89, 12, 0);
        assert_eq!(clock.season, Season::Spring);
        clock.advance(24 * 60);
        assert_eq!(clock.season, Season::Summer);
    }

    #[test]
    fn test_time_window() {
        assert!(TimeWindow::Any.admits(TimeOfDay::Night));
        assert!(TimeWindow::Day.admits(TimeOfDay::Day));
        assert!(!TimeWindow::Day.admits(TimeOfDay::Night));
    }
}
