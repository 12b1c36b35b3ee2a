use std::collections::BTreeMap;

use serde::Serialize;

use crate::stats::{round2, Scalars, Summary};

/// Metrics reported in the window comparison, in console order.
pub const COMPARED_METRICS: &[&str] = &[
    "total_requests",
    "unique_ips",
    "clean_requests",
    "content_requests",
    "suspicious_requests",
    "known_bot_requests",
    "organic_referrals",
    "organic_non_bot_referrals",
    "external_referrals",
    "crosspromo_campaign_hits",
    "crosspromo_non_bot_hits",
    "crosspromo_high_confidence_non_bot_hits",
    "internal_crossproperty_referrals",
    "internal_crossproperty_non_bot_referrals",
    "clean_404",
    "suspicious_404",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowBounds {
    pub start: String,
    pub end: String,
    pub hours: i64,
}

impl WindowBounds {
    fn of(scalars: &Scalars) -> WindowBounds {
        WindowBounds {
            start: scalars.window_start.clone(),
            end: scalars.window_end.clone(),
            hours: scalars.window_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub current: u64,
    pub previous: u64,
    pub delta: i64,
    pub pct_change: Option<f64>,
}

impl Delta {
    pub fn between(current: u64, previous: u64) -> Delta {
        Delta {
            current,
            previous,
            delta: current as i64 - previous as i64,
            pct_change: pct_change(current, previous),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub current_window: WindowBounds,
    pub previous_window: WindowBounds,
    pub deltas: BTreeMap<String, Delta>,
}

/// Percentage change from `previous` to `current`.
///
/// Undefined when both are zero; growth from zero is reported as 100%.
pub fn pct_change(current: u64, previous: u64) -> Option<f64> {
    match (previous, current) {
        (0, 0) => None,
        (0, _) => Some(100.0),
        (prev, cur) => Some(round2((cur as f64 - prev as f64) * 100.0 / prev as f64)),
    }
}

pub fn compare(current: &Summary, previous: &Summary) -> Comparison {
    let deltas = COMPARED_METRICS
        .iter()
        .map(|name| {
            let cur = current.scalars.counter(name).unwrap_or(0);
            let prev = previous.scalars.counter(name).unwrap_or(0);
            (name.to_string(), Delta::between(cur, prev))
        })
        .collect();

    Comparison {
        current_window: WindowBounds::of(&current.scalars),
        previous_window: WindowBounds::of(&previous.scalars),
        deltas,
    }
}
