use chrono::{DateTime, Utc};
use regex::Regex;

use crate::normalize::split_target;

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One access-log line after parsing and request normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub status: u16,
    pub path: String,
    pub query: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

/// Parse a combined-log line. Anything that does not fit the grammar,
/// including an unparsable timestamp, yields `None`.
pub fn parse_line(line: &str) -> Option<LogEvent> {
    lazy_static! {
        static ref RE: Regex = Regex::new(
            r#"^(\S+) \S+ \S+ \[([^\]]+)\] "((?:[^"\\]|\\.)*)" (\d{3}) (\S+) "((?:[^"\\]|\\.)*)" "((?:[^"\\]|\\.)*)""#
        )
        .unwrap();
    }
    let captures = RE.captures(line.trim_end())?;

    let timestamp = DateTime::parse_from_str(&captures[2], TIMESTAMP_FORMAT)
        .ok()?
        .with_timezone(&Utc);

    let mut request = captures[3].split_whitespace();
    let _method = request.next()?;
    let target = request.next()?;
    let (path, query) = split_target(target);

    Some(LogEvent {
        timestamp,
        ip: captures[1].to_string(),
        status: captures[4].parse().ok()?,
        path,
        query,
        referrer: optional_field(&captures[6]),
        user_agent: optional_field(&captures[7]),
    })
}

fn optional_field(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value.to_string())
    }
}
