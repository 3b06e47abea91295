//! Calendar domain logic for the guardian's episode view.
//!
//! Lays out a month grid (padding days first, Sunday = 0) and attaches each
//! meltdown episode to the day it started on.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use shared::{CalendarDayType, EpisodeCalendarDay, EpisodeCalendarMonth, MeltdownEvent, User};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::child_service::ChildService;
use crate::domain::errors::{GuardianError, Result};
use crate::storage::repositories::{TelemetryRepository, TimeWindow};

/// Calendar service that handles all calendar-related business logic
#[derive(Clone)]
pub struct CalendarService {
    children: ChildService,
    telemetry: TelemetryRepository,
}

impl CalendarService {
    pub fn new(children: ChildService, telemetry: TelemetryRepository) -> Self {
        Self { children, telemetry }
    }

    /// Month view of a child's episodes
    pub async fn episode_month(&self, guardian: &User, child_id: &str, month: u32, year: u32) -> Result<EpisodeCalendarMonth> {
        let (start, next) = month_bounds(month, year)
            .ok_or_else(|| GuardianError::Validation(format!("invalid month {}/{}", month, year)))?;
        self.children.owned_profile(guardian, child_id).await?;

        let window = TimeWindow::new(
            Some(Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap_or_default())),
            Some(Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0).unwrap_or_default()) - chrono::Duration::nanoseconds(1)),
        );
        let episodes = self.telemetry.meltdowns_in(&guardian.user_id, child_id, window).await?;
        info!("🗓️ {} episodes for child {} in {}/{}", episodes.len(), child_id, month, year);

        Ok(generate_episode_month(month, year, episodes))
    }
}

/// Build the month grid from episodes; episodes outside the month are ignored
pub fn generate_episode_month(month: u32, year: u32, episodes: Vec<MeltdownEvent>) -> EpisodeCalendarMonth {
    let days_in_month = days_in_month(month, year);
    let first_day = first_day_of_month(month, year);
    debug!("Calendar {}/{}: {} days, first weekday {}", month, year, days_in_month, first_day);

    let mut by_day: HashMap<u32, Vec<MeltdownEvent>> = HashMap::new();
    for episode in episodes {
        let date = episode.start_time.date_naive();
        if date.month() == month && date.year() == year as i32 {
            by_day.entry(date.day()).or_default().push(episode);
        }
    }

    let mut days = Vec::with_capacity((first_day + days_in_month) as usize);
    for _ in 0..first_day {
        days.push(EpisodeCalendarDay {
            day: 0,
            day_type: CalendarDayType::PaddingBefore,
            episodes: Vec::new(),
        });
    }
    for day in 1..=days_in_month {
        let mut episodes = by_day.remove(&day).unwrap_or_default();
        episodes.sort_by_key(|e| e.start_time);
        days.push(EpisodeCalendarDay {
            day,
            day_type: CalendarDayType::MonthDay,
            episodes,
        });
    }

    EpisodeCalendarMonth {
        month,
        year,
        days,
        first_day_of_week: first_day,
    }
}

/// Get the number of days in a given month and year
pub fn days_in_month(month: u32, year: u32) -> u32 {
    match month {
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

pub fn is_leap_year(year: u32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Get the first day of month (0 = Sunday, 1 = Monday, etc.)
pub fn first_day_of_month(month: u32, year: u32) -> u32 {
    NaiveDate::from_ymd_opt(year as i32, month, 1)
        .map(|date| date.weekday().num_days_from_sunday())
        .unwrap_or(0)
}

fn month_bounds(month: u32, year: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year as i32, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year as i32 + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year as i32, month + 1, 1)?
    };
    Some((start, next))
}
