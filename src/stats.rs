//! Per-window aggregation.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::attribution::{source_slug, Attribution, Automation, Campaign, ClientKey, RecentPaths, Tier};
use crate::classify::{classify_section, detect_engine, is_asset, is_suspicious, suspicious_label, Section};
use crate::config::Settings;
use crate::normalize::url_host;
use crate::parser::LogEvent;

const NO_USER_AGENT: &str = "(none)";

/// Occurrence counts by key.
#[derive(Debug, Default, Clone)]
pub struct Tally {
    counts: HashMap<String, u64>,
}

impl Tally {
    pub fn bump<K: Into<String>>(&mut self, key: K) {
        *self.counts.entry(key.into()).or_insert(0) += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The `n` largest entries, ties broken by key.
    pub fn top(&self, n: usize) -> Vec<(String, u64)> {
        let mut rows: Vec<(String, u64)> = self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        rows
    }
}

#[derive(Debug, Default)]
struct OrganicTallies {
    referrals: u64,
    engines: Tally,
    pages: Tally,
    sections: Tally,
    engine_sections: Tally,
}

impl OrganicTallies {
    fn record(&mut self, engine: &str, path: &str, section: Section) {
        self.referrals += 1;
        self.engines.bump(engine);
        self.pages.bump(path);
        self.sections.bump(section.as_str());
        self.engine_sections.bump(format!("{}->{}", engine, section));
    }
}

#[derive(Debug, Default)]
struct CampaignTallies {
    hits: u64,
    tiers: HashMap<Tier, u64>,
    landing_pages: Tally,
    sources: Tally,
    target_sections: Tally,
    source_target_pairs: Tally,
    source_target_sections: Tally,
}

impl CampaignTallies {
    fn record(&mut self, path: &str, target: Section, attribution: &Attribution) {
        self.hits += 1;
        *self.tiers.entry(attribution.tier).or_insert(0) += 1;
        self.landing_pages.bump(path);
        self.target_sections.bump(target.as_str());

        let source = attribution.source.as_deref();
        self.sources.bump(source.unwrap_or("unknown"));
        self.source_target_pairs
            .bump(format!("{} -> {}", source.unwrap_or("unknown"), path));
        self.source_target_sections
            .bump(format!("{}->{}", source_slug(source), target));
    }

    fn tier(&self, tier: Tier) -> u64 {
        self.tiers.get(&tier).copied().unwrap_or(0)
    }

    fn high_confidence(&self) -> u64 {
        self.tiers
            .iter()
            .filter(|(tier, _)| tier.is_high_confidence())
            .map(|(_, count)| count)
            .sum()
    }
}

#[derive(Debug, Default)]
struct CrossPropertyTallies {
    referrals: u64,
    sections: Tally,
    paths: Tally,
    targets: Tally,
}

impl CrossPropertyTallies {
    fn record(&mut self, source_path: &str, source: Section, target_path: &str, target: Section) {
        self.referrals += 1;
        self.sections.bump(format!("{}->{}", source, target));
        self.paths.bump(format!("{} -> {}", source_path, target_path));
        self.targets.bump(target.as_str());
    }
}

/// Counters for one analysis window. Mutated only through [`WindowStats::record`].
#[derive(Debug)]
pub struct WindowStats {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    campaign: Campaign,
    history: RecentPaths,

    total_requests: u64,
    ips: HashSet<String>,
    clean_requests: u64,
    clean_ips: HashSet<String>,
    suspicious_requests: u64,
    suspicious_ips: HashSet<String>,
    content_requests: u64,
    content_ips: HashSet<String>,
    asset_requests: u64,
    known_bot_requests: u64,

    statuses: Tally,
    pages: Tally,
    content_sections: Tally,
    organic: OrganicTallies,
    organic_human: OrganicTallies,
    external_referrals: u64,
    external_referrers: Tally,
    clean_404: Tally,
    suspicious_404: Tally,
    suspicious_paths: Tally,
    suspicious_signatures: Tally,
    bot_user_agents: Tally,

    crosspromo: CampaignTallies,
    crosspromo_human: CampaignTallies,
    crosspromo_known_bot_user_agents: Tally,
    crosspromo_suspected_user_agents: Tally,
    crosspromo_redirect_hops: u64,

    crossproperty: CrossPropertyTallies,
    crossproperty_human: CrossPropertyTallies,
}

impl WindowStats {
    /// Stats for events in `(start, end]`.
    pub fn new(settings: &Settings, start: DateTime<Utc>, end: DateTime<Utc>) -> WindowStats {
        WindowStats {
            start,
            end,
            campaign: Campaign::new(settings),
            history: RecentPaths::new(Duration::minutes(settings.lookback_minutes), settings.history_cap),
            total_requests: 0,
            ips: HashSet::new(),
            clean_requests: 0,
            clean_ips: HashSet::new(),
            suspicious_requests: 0,
            suspicious_ips: HashSet::new(),
            content_requests: 0,
            content_ips: HashSet::new(),
            asset_requests: 0,
            known_bot_requests: 0,
            statuses: Tally::default(),
            pages: Tally::default(),
            content_sections: Tally::default(),
            organic: OrganicTallies::default(),
            organic_human: OrganicTallies::default(),
            external_referrals: 0,
            external_referrers: Tally::default(),
            clean_404: Tally::default(),
            suspicious_404: Tally::default(),
            suspicious_paths: Tally::default(),
            suspicious_signatures: Tally::default(),
            bot_user_agents: Tally::default(),
            crosspromo: CampaignTallies::default(),
            crosspromo_human: CampaignTallies::default(),
            crosspromo_known_bot_user_agents: Tally::default(),
            crosspromo_suspected_user_agents: Tally::default(),
            crosspromo_redirect_hops: 0,
            crossproperty: CrossPropertyTallies::default(),
            crossproperty_human: CrossPropertyTallies::default(),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start < at && at <= self.end
    }

    /// Fold one event in. Events must arrive in timestamp order.
    pub fn record(&mut self, event: &LogEvent) {
        let path = event.path.as_str();
        let user_agent = event.user_agent.as_deref();
        let automation = self
            .campaign
            .automation()
            .classify(&event.ip, user_agent, event.referrer.as_deref());

        self.total_requests += 1;
        self.ips.insert(event.ip.clone());
        self.statuses.bump(event.status.to_string());
        if automation == Automation::KnownBot {
            self.known_bot_requests += 1;
            self.bot_user_agents.bump(user_agent.unwrap_or(NO_USER_AGENT));
        }

        // Every tagged landing is a campaign hit, including probes and errors
        // from clients replaying campaign URLs.
        let key = ClientKey::new(&event.ip, user_agent);
        if self.campaign.is_tagged(path, &event.query) {
            let attribution = self.campaign.attribute(event, &key, &mut self.history);
            self.record_campaign_hit(path, classify_section(path), user_agent, &attribution);
        }

        if is_suspicious(path) {
            self.suspicious_requests += 1;
            self.suspicious_ips.insert(event.ip.clone());
            self.suspicious_paths.bump(path);
            if let Some(label) = suspicious_label(path) {
                self.suspicious_signatures.bump(label);
            }
            if event.status == 404 {
                self.suspicious_404.bump(path);
            }
            return;
        }

        self.clean_requests += 1;
        self.clean_ips.insert(event.ip.clone());
        if event.status == 404 {
            self.clean_404.bump(path);
        }
        if is_asset(path) {
            self.asset_requests += 1;
            return;
        }
        if self.campaign.is_redirect_hop(path) {
            if self.campaign.carries_marker(&event.query) {
                self.crosspromo_redirect_hops += 1;
            }
            return;
        }
        if event.status >= 400 {
            return;
        }

        self.content_requests += 1;
        self.content_ips.insert(event.ip.clone());
        self.pages.bump(path);
        let section = classify_section(path);
        self.content_sections.bump(section.as_str());

        if let Some(referrer) = event.referrer.as_deref() {
            self.record_referrer(referrer, path, section, automation);
        }

        self.history.remember(&key, event.timestamp, path);
    }

    fn record_referrer(&mut self, referrer: &str, path: &str, section: Section, automation: Automation) {
        match self.campaign.same_site_path(referrer) {
            Some(source_path) => {
                let source = classify_section(&source_path);
                if source != section {
                    self.crossproperty.record(&source_path, source, path, section);
                    if automation.is_human() {
                        self.crossproperty_human.record(&source_path, source, path, section);
                    }
                }
            }
            None => {
                self.external_referrals += 1;
                self.external_referrers
                    .bump(url_host(referrer).unwrap_or_else(|| referrer.to_string()));
                if let Some(engine) = detect_engine(referrer) {
                    self.organic.record(engine, path, section);
                    if automation.is_human() {
                        self.organic_human.record(engine, path, section);
                    }
                }
            }
        }
    }

    fn record_campaign_hit(
        &mut self,
        path: &str,
        section: Section,
        user_agent: Option<&str>,
        attribution: &Attribution,
    ) {
        self.crosspromo.record(path, section, attribution);
        match attribution.automation {
            Automation::Human => self.crosspromo_human.record(path, section, attribution),
            Automation::KnownBot => self
                .crosspromo_known_bot_user_agents
                .bump(user_agent.unwrap_or(NO_USER_AGENT)),
            Automation::SuspectedAutomation => self
                .crosspromo_suspected_user_agents
                .bump(user_agent.unwrap_or(NO_USER_AGENT)),
        }
    }

    /// Derive ratios and top-K lists. Does not touch the counters.
    pub fn summarize(&self, max_items: usize) -> Summary {
        let mut per_section = BTreeMap::new();
        for section in Section::all() {
            let name = section.as_str();
            per_section.insert(format!("content_{}_requests", name), self.content_sections.get(name));
            per_section.insert(
                format!("organic_non_bot_{}_referrals", name),
                self.organic_human.sections.get(name),
            );
            per_section.insert(
                format!("crosspromo_non_bot_hits_to_{}", name),
                self.crosspromo_human.target_sections.get(name),
            );
            per_section.insert(
                format!("internal_crossproperty_high_confidence_non_bot_referrals_to_{}", name),
                self.crossproperty_human.targets.get(name),
            );
        }

        let hits = self.crosspromo.hits;
        let scalars = Scalars {
            generated_at: timestamp(self.end),
            window_hours: (self.end - self.start).num_hours(),
            window_start: timestamp(self.start),
            window_end: timestamp(self.end),
            total_requests: self.total_requests,
            unique_ips: self.ips.len() as u64,
            clean_requests: self.clean_requests,
            clean_unique_ips: self.clean_ips.len() as u64,
            suspicious_requests: self.suspicious_requests,
            suspicious_unique_ips: self.suspicious_ips.len() as u64,
            content_requests: self.content_requests,
            content_unique_ips: self.content_ips.len() as u64,
            asset_requests: self.asset_requests,
            known_bot_requests: self.known_bot_requests,
            suspicious_pct: pct(self.suspicious_requests, self.total_requests),
            content_pct: pct(self.content_requests, self.total_requests),
            known_bot_pct: pct(self.known_bot_requests, self.total_requests),
            clean_404: self.clean_404.total(),
            suspicious_404: self.suspicious_404.total(),
            organic_referrals: self.organic.referrals,
            organic_non_bot_referrals: self.organic_human.referrals,
            organic_pct_of_content: pct(self.organic.referrals, self.content_requests),
            external_referrals: self.external_referrals,
            crosspromo_campaign_hits: hits,
            crosspromo_non_bot_hits: self.crosspromo_human.hits,
            crosspromo_known_bot_hits: self.crosspromo_known_bot_user_agents.total(),
            crosspromo_suspected_automation_hits: self.crosspromo_suspected_user_agents.total(),
            crosspromo_redirect_hops: self.crosspromo_redirect_hops,
            crosspromo_direct_referrer_hits: self.crosspromo.tier(Tier::DirectReferrer),
            crosspromo_param_verified_hits: self.crosspromo.tier(Tier::ParameterVerified),
            crosspromo_param_unverified_hits: self.crosspromo.tier(Tier::ParameterUnverified),
            crosspromo_unattributed_hits: self.crosspromo.tier(Tier::Unattributed),
            crosspromo_non_bot_direct_referrer_hits: self.crosspromo_human.tier(Tier::DirectReferrer),
            crosspromo_non_bot_param_verified_hits: self.crosspromo_human.tier(Tier::ParameterVerified),
            crosspromo_non_bot_param_unverified_hits: self.crosspromo_human.tier(Tier::ParameterUnverified),
            crosspromo_non_bot_unattributed_hits: self.crosspromo_human.tier(Tier::Unattributed),
            crosspromo_high_confidence_hits: self.crosspromo.high_confidence(),
            crosspromo_high_confidence_non_bot_hits: self.crosspromo_human.high_confidence(),
            crosspromo_non_bot_pct: pct(self.crosspromo_human.hits, hits),
            crosspromo_direct_referrer_pct: pct(self.crosspromo.tier(Tier::DirectReferrer), hits),
            crosspromo_param_verified_pct: pct(self.crosspromo.tier(Tier::ParameterVerified), hits),
            crosspromo_param_unverified_pct: pct(self.crosspromo.tier(Tier::ParameterUnverified), hits),
            crosspromo_unattributed_pct: pct(self.crosspromo.tier(Tier::Unattributed), hits),
            crosspromo_high_confidence_pct: pct(self.crosspromo.high_confidence(), hits),
            internal_crossproperty_referrals: self.crossproperty.referrals,
            internal_crossproperty_non_bot_referrals: self.crossproperty_human.referrals,
            tracked_clients: self.history.client_count() as u64,
            per_section,
        };

        let n = max_items;
        let list = |name, title, field, tally: &Tally| TopList {
            name,
            title,
            field,
            rows: tally.top(n),
        };
        let lists = vec![
            list("top_status_codes", "Status codes", "status", &self.statuses),
            list("top_pages", "Top pages", "path", &self.pages),
            list("content_sections", "Content by section", "section", &self.content_sections),
            list("organic_engines", "Organic search engines", "engine", &self.organic.engines),
            list("organic_non_bot_engines", "Organic search engines (non-bot)", "engine", &self.organic_human.engines),
            list("top_organic_pages", "Organic landing pages", "path", &self.organic.pages),
            list("top_organic_non_bot_pages", "Organic landing pages (non-bot)", "path", &self.organic_human.pages),
            list("organic_sections", "Organic landings by section", "section", &self.organic.sections),
            list("organic_non_bot_sections", "Organic landings by section (non-bot)", "section", &self.organic_human.sections),
            list("organic_engine_sections", "Organic engine -> section", "pair", &self.organic.engine_sections),
            list("top_external_referrers", "External referrers", "referrer", &self.external_referrers),
            list("crosspromo_campaign_landing_pages", "Campaign landing pages", "path", &self.crosspromo.landing_pages),
            list("crosspromo_non_bot_campaign_landing_pages", "Campaign landing pages (non-bot)", "path", &self.crosspromo_human.landing_pages),
            list("crosspromo_campaign_sources", "Campaign sources", "path", &self.crosspromo.sources),
            list("crosspromo_non_bot_campaign_sources", "Campaign sources (non-bot)", "path", &self.crosspromo_human.sources),
            list("crosspromo_campaign_target_sections", "Campaign target sections", "section", &self.crosspromo.target_sections),
            list("crosspromo_non_bot_campaign_target_sections", "Campaign target sections (non-bot)", "section", &self.crosspromo_human.target_sections),
            list("crosspromo_campaign_source_target_pairs", "Campaign source -> target pages", "pair", &self.crosspromo.source_target_pairs),
            list("crosspromo_non_bot_campaign_source_target_pairs", "Campaign source -> target pages (non-bot)", "pair", &self.crosspromo_human.source_target_pairs),
            list("crosspromo_campaign_source_target_sections", "Campaign source -> target sections", "pair", &self.crosspromo.source_target_sections),
            list("crosspromo_non_bot_campaign_source_target_sections", "Campaign source -> target sections (non-bot)", "pair", &self.crosspromo_human.source_target_sections),
            list("crosspromo_known_bot_user_agents", "Campaign known-bot user agents", "user_agent", &self.crosspromo_known_bot_user_agents),
            list("crosspromo_suspected_automation_user_agents", "Campaign suspected-automation user agents", "user_agent", &self.crosspromo_suspected_user_agents),
            list("top_bot_user_agents", "Known-bot user agents (all traffic)", "user_agent", &self.bot_user_agents),
            list("internal_crossproperty_sections", "Cross-property referrals by section", "pair", &self.crossproperty.sections),
            list("internal_crossproperty_non_bot_sections", "Cross-property referrals by section (non-bot)", "pair", &self.crossproperty_human.sections),
            list("internal_crossproperty_paths", "Cross-property referrals by path", "pair", &self.crossproperty.paths),
            list("internal_crossproperty_non_bot_paths", "Cross-property referrals by path (non-bot)", "pair", &self.crossproperty_human.paths),
            list("top_404_pages", "404 pages (clean)", "path", &self.clean_404),
            list("top_suspicious_404_pages", "404 pages (suspicious)", "path", &self.suspicious_404),
            list("top_suspicious_paths", "Suspicious paths", "path", &self.suspicious_paths),
            list("suspicious_signatures", "Suspicious probe signatures", "signature", &self.suspicious_signatures),
        ];

        Summary { scalars, lists }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Percentage of `part` in `whole`, two decimals, 0 for an empty whole.
pub fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scalar counters and ratios of one window, as emitted under `summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scalars {
    pub generated_at: String,
    pub window_hours: i64,
    pub window_start: String,
    pub window_end: String,
    pub total_requests: u64,
    pub unique_ips: u64,
    pub clean_requests: u64,
    pub clean_unique_ips: u64,
    pub suspicious_requests: u64,
    pub suspicious_unique_ips: u64,
    pub content_requests: u64,
    pub content_unique_ips: u64,
    pub asset_requests: u64,
    pub known_bot_requests: u64,
    pub suspicious_pct: f64,
    pub content_pct: f64,
    pub known_bot_pct: f64,
    pub clean_404: u64,
    pub suspicious_404: u64,
    pub organic_referrals: u64,
    pub organic_non_bot_referrals: u64,
    pub organic_pct_of_content: f64,
    pub external_referrals: u64,
    pub crosspromo_campaign_hits: u64,
    pub crosspromo_non_bot_hits: u64,
    pub crosspromo_known_bot_hits: u64,
    pub crosspromo_suspected_automation_hits: u64,
    pub crosspromo_redirect_hops: u64,
    pub crosspromo_direct_referrer_hits: u64,
    pub crosspromo_param_verified_hits: u64,
    pub crosspromo_param_unverified_hits: u64,
    pub crosspromo_unattributed_hits: u64,
    pub crosspromo_non_bot_direct_referrer_hits: u64,
    pub crosspromo_non_bot_param_verified_hits: u64,
    pub crosspromo_non_bot_param_unverified_hits: u64,
    pub crosspromo_non_bot_unattributed_hits: u64,
    pub crosspromo_high_confidence_hits: u64,
    pub crosspromo_high_confidence_non_bot_hits: u64,
    pub crosspromo_non_bot_pct: f64,
    pub crosspromo_direct_referrer_pct: f64,
    pub crosspromo_param_verified_pct: f64,
    pub crosspromo_param_unverified_pct: f64,
    pub crosspromo_unattributed_pct: f64,
    pub crosspromo_high_confidence_pct: f64,
    pub internal_crossproperty_referrals: u64,
    pub internal_crossproperty_non_bot_referrals: u64,
    pub tracked_clients: u64,
    #[serde(flatten)]
    pub per_section: BTreeMap<String, u64>,
}

impl Scalars {
    /// Counter value by its JSON name, for the metrics the comparator tracks.
    pub fn counter(&self, name: &str) -> Option<u64> {
        let value = match name {
            "total_requests" => self.total_requests,
            "unique_ips" => self.unique_ips,
            "clean_requests" => self.clean_requests,
            "content_requests" => self.content_requests,
            "suspicious_requests" => self.suspicious_requests,
            "known_bot_requests" => self.known_bot_requests,
            "organic_referrals" => self.organic_referrals,
            "organic_non_bot_referrals" => self.organic_non_bot_referrals,
            "external_referrals" => self.external_referrals,
            "crosspromo_campaign_hits" => self.crosspromo_campaign_hits,
            "crosspromo_non_bot_hits" => self.crosspromo_non_bot_hits,
            "crosspromo_high_confidence_non_bot_hits" => self.crosspromo_high_confidence_non_bot_hits,
            "internal_crossproperty_referrals" => self.internal_crossproperty_referrals,
            "internal_crossproperty_non_bot_referrals" => self.internal_crossproperty_non_bot_referrals,
            "clean_404" => self.clean_404,
            "suspicious_404" => self.suspicious_404,
            other => return self.per_section.get(other).copied(),
        };
        Some(value)
    }
}

/// One top-K list; rows serialize as `{<field>: key, "count": n}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopList {
    pub name: &'static str,
    pub title: &'static str,
    pub field: &'static str,
    pub rows: Vec<(String, u64)>,
}

impl Serialize for TopList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for (key, count) in &self.rows {
            seq.serialize_element(&Row {
                field: self.field,
                key,
                count: *count,
            })?;
        }
        seq.end()
    }
}

struct Row<'a> {
    field: &'static str,
    key: &'a str,
    count: u64,
}

impl<'a> Serialize for Row<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.field, self.key)?;
        map.serialize_entry("count", &self.count)?;
        map.end()
    }
}

/// Finalized view of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub scalars: Scalars,
    pub lists: Vec<TopList>,
}

impl Summary {
    pub fn list(&self, name: &str) -> Option<&TopList> {
        self.lists.iter().find(|list| list.name == name)
    }

    /// Count for `key` in the named list, 0 when absent.
    pub fn count(&self, name: &str, key: &str) -> u64 {
        self.list(name)
            .and_then(|list| list.rows.iter().find(|(k, _)| k == key))
            .map_or(0, |(_, count)| *count)
    }
}
