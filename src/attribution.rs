//! Campaign attribution.
//!
//! A campaign-tagged landing is attributed to a source page with one of four
//! confidence tiers: the same-site referrer header, a `utm_content` value the
//! client's own recent browsing corroborates, a `utm_content` value nothing
//! corroborates, or nothing at all. Independently each hit gets an automation
//! verdict so the human-only view can be derived.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Deserialize;
use url::form_urlencoded;

use crate::classify::{self, Section};
use crate::config::Settings;
use crate::normalize::{normalize_path, strip_www, url_host, url_path};
use crate::parser::LogEvent;

const SPOOFED_IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1";

const DATACENTER_PREFIXES: &[&str] = &[
    "43.128.", "43.129.", "43.130.", "43.131.", "43.133.", "43.134.", "43.135.", "43.152.",
    "43.153.", "43.155.", "43.156.", "43.157.", "43.159.", "49.51.", "101.32.", "101.33.",
    "119.28.", "129.226.", "150.109.", "162.62.", "170.106.",
];

/// Who is behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Automation {
    Human,
    KnownBot,
    SuspectedAutomation,
}

impl Automation {
    pub fn is_human(self) -> bool {
        self == Automation::Human
    }
}

/// Narrow automation heuristic: a known-bot user agent, or the conjunction of
/// no referrer, a spoofed user agent and a datacenter address.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutomationRule {
    pub spoofed_user_agents: Vec<String>,
    pub datacenter_prefixes: Vec<String>,
    pub extra_bot_tokens: Vec<String>,
}

impl Default for AutomationRule {
    fn default() -> Self {
        AutomationRule {
            spoofed_user_agents: vec![SPOOFED_IPHONE_UA.to_string()],
            datacenter_prefixes: DATACENTER_PREFIXES.iter().map(|p| p.to_string()).collect(),
            extra_bot_tokens: Vec::new(),
        }
    }
}

impl AutomationRule {
    pub fn is_bot(&self, user_agent: &str) -> bool {
        if classify::is_known_bot(user_agent) {
            return true;
        }
        let lower = user_agent.to_ascii_lowercase();
        self.extra_bot_tokens
            .iter()
            .any(|token| !token.is_empty() && lower.contains(&token.to_ascii_lowercase()))
    }

    pub fn classify(&self, ip: &str, user_agent: Option<&str>, referrer: Option<&str>) -> Automation {
        let user_agent = match user_agent {
            Some(ua) => ua,
            None => return Automation::Human,
        };
        if self.is_bot(user_agent) {
            return Automation::KnownBot;
        }
        let spoofed = self.spoofed_user_agents.iter().any(|ua| ua == user_agent);
        let datacenter = self.datacenter_prefixes.iter().any(|prefix| ip.starts_with(prefix.as_str()));
        if referrer.is_none() && spoofed && datacenter {
            Automation::SuspectedAutomation
        } else {
            Automation::Human
        }
    }
}

/// Per-run visitor identity: IP plus normalized user agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    ip: String,
    user_agent: Option<String>,
}

impl ClientKey {
    pub fn new(ip: &str, user_agent: Option<&str>) -> ClientKey {
        ClientKey {
            ip: ip.to_string(),
            user_agent: user_agent
                .map(|ua| ua.trim().to_ascii_lowercase())
                .filter(|ua| !ua.is_empty()),
        }
    }
}

/// Bounded, time-limited memory of the page views each client made.
#[derive(Debug)]
pub struct RecentPaths {
    horizon: Duration,
    cap: usize,
    clients: HashMap<ClientKey, VecDeque<(DateTime<Utc>, String)>>,
}

impl RecentPaths {
    pub fn new(horizon: Duration, cap: usize) -> RecentPaths {
        RecentPaths {
            horizon,
            cap: cap.max(1),
            clients: HashMap::new(),
        }
    }

    pub fn remember(&mut self, key: &ClientKey, at: DateTime<Utc>, path: &str) {
        let horizon = self.horizon;
        let cap = self.cap;
        let queue = self.clients.entry(key.clone()).or_insert_with(VecDeque::new);
        evict(queue, at, horizon);
        queue.push_back((at, path.to_string()));
        while queue.len() > cap {
            queue.pop_front();
        }
    }

    /// First candidate the client viewed within the horizon before `at`.
    pub fn find_recent(&mut self, key: &ClientKey, at: DateTime<Utc>, candidates: &[String]) -> Option<String> {
        let queue = self.clients.get_mut(key)?;
        evict(queue, at, self.horizon);
        if queue.is_empty() {
            self.clients.remove(key);
            return None;
        }
        candidates
            .iter()
            .find(|candidate| queue.iter().any(|(_, path)| path == *candidate))
            .cloned()
    }

    #[cfg(test)]
    fn history_len(&self, key: &ClientKey) -> usize {
        self.clients.get(key).map_or(0, VecDeque::len)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

fn evict(queue: &mut VecDeque<(DateTime<Utc>, String)>, at: DateTime<Utc>, horizon: Duration) {
    while let Some((seen, _)) = queue.front() {
        if at.signed_duration_since(*seen) > horizon {
            queue.pop_front();
        } else {
            break;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    DirectReferrer,
    ParameterVerified,
    ParameterUnverified,
    Unattributed,
}

impl Tier {
    pub fn is_high_confidence(self) -> bool {
        match self {
            Tier::DirectReferrer | Tier::ParameterVerified => true,
            Tier::ParameterUnverified | Tier::Unattributed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub tier: Tier,
    pub source: Option<String>,
    pub automation: Automation,
}

/// The internal promotion campaign and the site it runs on.
#[derive(Debug, Clone)]
pub struct Campaign {
    name: String,
    site_domain: String,
    redirect_prefix: String,
    automation: AutomationRule,
}

impl Campaign {
    pub fn new(settings: &Settings) -> Campaign {
        Campaign {
            name: settings.campaign.clone(),
            site_domain: strip_www(&settings.site_domain.to_ascii_lowercase()).to_string(),
            redirect_prefix: normalize_path(&settings.redirect_prefix),
            automation: settings.automation.clone(),
        }
    }

    pub fn automation(&self) -> &AutomationRule {
        &self.automation
    }

    pub fn is_redirect_hop(&self, path: &str) -> bool {
        path == self.redirect_prefix
            || (path.starts_with(&self.redirect_prefix)
                && path[self.redirect_prefix.len()..].starts_with('/'))
    }

    pub fn carries_marker(&self, query: &str) -> bool {
        form_urlencoded::parse(query.as_bytes()).any(|(key, value)| key == "utm_campaign" && value == self.name)
    }

    /// A landing that carries the campaign marker and is not the bounce itself.
    pub fn is_tagged(&self, path: &str, query: &str) -> bool {
        !self.is_redirect_hop(path) && self.carries_marker(query)
    }

    pub fn is_same_site(&self, url: &str) -> bool {
        url_host(url).map_or(false, |host| host == self.site_domain)
    }

    /// Normalized path of a same-site referrer.
    pub fn same_site_path(&self, referrer: &str) -> Option<String> {
        if self.is_same_site(referrer) {
            url_path(referrer)
        } else {
            None
        }
    }

    pub fn attribute(&self, event: &LogEvent, key: &ClientKey, history: &mut RecentPaths) -> Attribution {
        let automation = self.automation.classify(
            &event.ip,
            event.user_agent.as_deref(),
            event.referrer.as_deref(),
        );

        if let Some(source) = event.referrer.as_deref().and_then(|r| self.same_site_path(r)) {
            return Attribution {
                tier: Tier::DirectReferrer,
                source: Some(source),
                automation,
            };
        }

        let candidates = self.content_sources(&event.query);
        if candidates.is_empty() {
            return Attribution {
                tier: Tier::Unattributed,
                source: None,
                automation,
            };
        }

        match history.find_recent(key, event.timestamp, &candidates) {
            Some(source) => Attribution {
                tier: Tier::ParameterVerified,
                source: Some(source),
                automation,
            },
            None => Attribution {
                tier: Tier::ParameterUnverified,
                source: candidates.into_iter().next(),
                automation,
            },
        }
    }

    /// Source paths recoverable from the `utm_content` values, deduplicated.
    pub fn content_sources(&self, query: &str) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key != "utm_content" {
                continue;
            }
            if let Some(path) = interpret_content_value(&value, &self.site_domain) {
                if !sources.contains(&path) {
                    sources.push(path);
                }
            }
        }
        sources
    }
}

/// Interpret one `utm_content` value as a source path: a same-site URL, a
/// path, a section keyword, or a bare blog slug, in that order.
pub fn interpret_content_value(value: &str, site_domain: &str) -> Option<String> {
    lazy_static! {
        static ref SLUG: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    }
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.contains("://") {
        let host = url_host(value)?;
        if host != strip_www(&site_domain.to_ascii_lowercase()) {
            return None;
        }
        return url_path(value);
    }

    if value.starts_with('/') {
        let path = value.split(|c: char| c == '?' || c == '#').next().unwrap_or("");
        return Some(normalize_path(path));
    }

    if let Some(path) = keyword_path(&value.to_ascii_lowercase()) {
        return Some(path);
    }

    if SLUG.is_match(value) {
        return Some(format!("/blog/{}", value));
    }
    None
}

fn keyword_path(keyword: &str) -> Option<String> {
    match keyword {
        "home" | "homepage" | "index" => Some("/".to_string()),
        other => Section::all()
            .into_iter()
            .find(|section| section.as_str() == other)
            .and_then(Section::root),
    }
}

/// Short label for a source page: its last segment, `home` for the root.
pub fn source_slug(path: Option<&str>) -> String {
    let path = match path {
        Some(path) => path,
        None => return "unknown".to_string(),
    };
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return "home".to_string();
    }
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed).to_ascii_lowercase();
    match last.strip_suffix(".html") {
        Some(stem) => stem.to_string(),
        None => last,
    }
}
