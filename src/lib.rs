#[macro_use]
extern crate lazy_static;

pub mod attribution;
pub mod classify;
pub mod compare;
pub mod config;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod report;
pub mod source;
pub mod stats;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use log::info;

pub use crate::config::Settings;
pub use crate::error::{Error, Result};

use crate::compare::Comparison;
use crate::parser::LogEvent;
use crate::stats::{Summary, WindowStats};

/// Everything a run needs besides the settings file.
#[derive(Debug, Clone)]
pub struct Options {
    pub hours: i64,
    pub max_items: usize,
    pub compare_previous: bool,
    pub json: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub logs: Vec<PathBuf>,
    pub now: DateTime<Utc>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            hours: 24,
            max_items: 20,
            compare_previous: false,
            json: None,
            config: None,
            logs: Vec::new(),
            now: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub current: Summary,
    pub comparison: Option<Comparison>,
}

/// Sort events by time and fold them into the current window and, when
/// `compare_previous` is set, the window of equal length before it.
pub fn analyze(
    mut events: Vec<LogEvent>,
    settings: &Settings,
    now: DateTime<Utc>,
    hours: i64,
    max_items: usize,
    compare_previous: bool,
) -> Result<Analysis> {
    let (start, previous_start) = window_starts(now, hours, compare_previous)?;
    events.sort_by_key(|event| event.timestamp);

    let mut current = WindowStats::new(settings, start, now);
    let mut previous = previous_start.map(|previous_start| WindowStats::new(settings, previous_start, start));

    for event in &events {
        if current.contains(event.timestamp) {
            current.record(event);
        } else if let Some(previous) = previous.as_mut() {
            if previous.contains(event.timestamp) {
                previous.record(event);
            }
        }
    }

    let current = current.summarize(max_items);
    let comparison = previous.map(|previous| compare::compare(&current, &previous.summarize(max_items)));
    Ok(Analysis { current, comparison })
}

/// Start of the current window and, if wanted, of the previous one.
fn window_starts(
    now: DateTime<Utc>,
    hours: i64,
    compare_previous: bool,
) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    if hours <= 0 {
        return Err(Error::InvalidArgument(format!("--hours must be positive, got {}", hours)));
    }
    let out_of_range = || Error::InvalidArgument(format!("--hours {} reaches past the earliest representable time", hours));
    let length = Duration::try_hours(hours).ok_or_else(out_of_range)?;
    let start = now.checked_sub_signed(length).ok_or_else(out_of_range)?;
    let previous_start = if compare_previous {
        Some(start.checked_sub_signed(length).ok_or_else(out_of_range)?)
    } else {
        None
    };
    Ok((start, previous_start))
}

pub fn run(options: &Options) -> Result<()> {
    window_starts(options.now, options.hours, options.compare_previous)?;
    if options.max_items == 0 {
        return Err(Error::InvalidArgument("--max-items must be positive".to_string()));
    }

    let mut settings = match &options.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if !options.logs.is_empty() {
        settings.log_files = options.logs.clone();
    }

    let paths: Vec<PathBuf> = settings
        .log_files
        .iter()
        .flat_map(|base| source::expand_rotations(base, settings.rotated_generations))
        .collect();
    let events = source::load_events(&paths, settings.workers);
    info!("parsed {} events from {} candidate files", events.len(), paths.len());

    let analysis = analyze(
        events,
        &settings,
        options.now,
        options.hours,
        options.max_items,
        options.compare_previous,
    )?;
    report::print_report(&analysis);

    if let Some(path) = &options.json {
        report::write_json(path, &analysis)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn windows_are_adjacent() {
        let (start, previous) = window_starts(now(), 24, true).unwrap();
        assert_eq!(now() - Duration::hours(24), start);
        assert_eq!(Some(now() - Duration::hours(48)), previous);
        assert_eq!(None, window_starts(now(), 24, false).unwrap().1);
    }

    #[test]
    fn unrepresentable_windows_are_errors() {
        match window_starts(now(), 3_000_000_000, false) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        // fits once, but not twice
        match window_starts(now(), 2_000_000_000, true) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(window_starts(now(), 2_000_000_000, false).is_ok());
        assert!(window_starts(now(), i64::MAX, false).is_err());
        assert!(window_starts(now(), -1, false).is_err());
    }
}
