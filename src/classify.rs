//! Pure classifiers over normalized paths, user agents and referrers.

use std::fmt;

use regex::{Regex, RegexSet};

use crate::normalize::url_host;

const ASSET_SUFFIXES: &[&str] = &[
    ".css", ".js", ".mjs", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".avif",
    ".ico", ".bmp", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".mp4", ".webm", ".mp3", ".pdf",
    ".webmanifest",
];

const ROOT_FILES: &[&str] = &[
    "/favicon.ico",
    "/robots.txt",
    "/sitemap.xml",
    "/manifest.json",
    "/site.webmanifest",
    "/ads.txt",
    "/humans.txt",
    "/browserconfig.xml",
    "/apple-touch-icon.png",
    "/apple-touch-icon-precomposed.png",
];

const ASSET_PREFIXES: &[&str] = &[
    "/assets/", "/static/", "/images/", "/img/", "/css/", "/js/", "/fonts/", "/og/",
];

/// Exploit-probe signatures, matched case-insensitively against the path.
const SUSPICIOUS_PATTERNS: &[(&str, &str)] = &[
    (r"/wp-(admin|login|content|includes|json)", "wordpress"),
    (r"/xmlrpc\.php", "wordpress"),
    (r"\.php\d?$", "php-probe"),
    (r"/\.env", "env-file"),
    (r"/\.(git|svn|hg|aws|ssh|docker)(/|$)", "vcs-or-secret-dir"),
    (r"/(config|settings|credentials|secrets)\.(json|ya?ml|php|ini|bak)$", "config-file"),
    (r"\.(bak|old|orig|swp|sql|sqlite|tar\.gz|zip)$", "backup-file"),
    (r"/vendor/(phpunit|composer)", "vendor-library"),
    (r"/(phpmyadmin|pma|myadmin|adminer)(/|$|\.php)", "db-admin"),
    (r"/cgi-bin/", "cgi"),
    (r"/(boaform|hnap1|goform|setup\.cgi)", "router-exploit"),
    (r"/actuator(/|$)", "spring-actuator"),
    (r"/(solr|druid|jenkins|manager/html|console)(/|$)", "admin-console"),
    (r"/(owa|ecp|autodiscover)(/|$)", "exchange"),
    (r"/(remote/login|global-protect|dana-na|\+cscoe\+)", "vpn-appliance"),
    (r"/(eval-stdin|webshell|shell\.(jsp|aspx?))", "shell-probe"),
    (r"\.\./", "path-traversal"),
];

/// User-agent substrings that mark automated clients, compared lowercased.
/// Bare `bot` is matched separately by `BOT_WORD`.
const BOT_TOKENS: &[&str] = &[
    "crawler", "spider", "crawl", "slurp", "scan", "fetcher", "preview",
    "headlesschrome", "phantomjs", "puppeteer", "playwright", "selenium", "lighthouse",
    "python-requests", "python-urllib", "aiohttp", "httpx", "curl/", "wget/", "go-http-client",
    "java/", "okhttp", "libwww-perl", "scrapy", "axios/", "node-fetch", "facebookexternalhit",
    "zgrab", "masscan", "nmap",
];

lazy_static! {
    // `googlebot/2.1`, `petalbot;`, `duckduckbot-https`, `(compatible; bot)`,
    // but not a device name such as `CUBOT X19`.
    static ref BOT_WORD: Regex = Regex::new(r"(?i)(bot([/;).+-]|$)|\bbot\b)").unwrap();
    static ref SUSPICIOUS_SET: RegexSet = RegexSet::new(
        SUSPICIOUS_PATTERNS
            .iter()
            .map(|(pattern, _)| format!("(?i){}", pattern))
    )
    .unwrap();
    static ref ENGINES: Vec<(&'static str, Regex)> = vec![
        ("google", Regex::new(r"(^|\.)google\.[a-z.]+$").unwrap()),
        ("bing", Regex::new(r"(^|\.)bing\.com$").unwrap()),
        ("duckduckgo", Regex::new(r"(^|\.)duckduckgo\.com$").unwrap()),
        ("yahoo", Regex::new(r"(^|\.)yahoo\.(com|co\.[a-z]+|[a-z]{2})$").unwrap()),
        ("ecosia", Regex::new(r"(^|\.)ecosia\.org$").unwrap()),
        ("qwant", Regex::new(r"(^|\.)qwant\.com$").unwrap()),
        ("aol", Regex::new(r"(^|\.)aol\.com$").unwrap()),
        ("brave", Regex::new(r"(^|\.)search\.brave\.com$").unwrap()),
        ("yandex", Regex::new(r"(^|\.)yandex\.[a-z.]+$").unwrap()),
    ];
}

/// The product verticals, each mounted at `/<slug>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kit {
    Date,
    Budget,
    Health,
    Sleep,
    Focus,
    Ops,
    Study,
    Career,
    Housing,
    Tax,
}

impl Kit {
    pub const ALL: [Kit; 10] = [
        Kit::Date,
        Kit::Budget,
        Kit::Health,
        Kit::Sleep,
        Kit::Focus,
        Kit::Ops,
        Kit::Study,
        Kit::Career,
        Kit::Housing,
        Kit::Tax,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Kit::Date => "datekit",
            Kit::Budget => "budgetkit",
            Kit::Health => "healthkit",
            Kit::Sleep => "sleepkit",
            Kit::Focus => "focuskit",
            Kit::Ops => "opskit",
            Kit::Study => "studykit",
            Kit::Career => "careerkit",
            Kit::Housing => "housingkit",
            Kit::Tax => "taxkit",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Kit> {
        Kit::ALL.iter().copied().find(|kit| kit.slug() == slug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Homepage,
    Blog,
    Tools,
    Cheatsheets,
    Kit(Kit),
    Other,
}

impl Section {
    /// Every section, in report order.
    pub fn all() -> Vec<Section> {
        let mut sections = vec![Section::Homepage, Section::Blog, Section::Tools, Section::Cheatsheets];
        sections.extend(Kit::ALL.iter().map(|kit| Section::Kit(*kit)));
        sections.push(Section::Other);
        sections
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Section::Homepage => "homepage",
            Section::Blog => "blog",
            Section::Tools => "tools",
            Section::Cheatsheets => "cheatsheets",
            Section::Kit(kit) => kit.slug(),
            Section::Other => "other",
        }
    }

    /// URL prefix the section is mounted at.
    pub fn root(self) -> Option<String> {
        match self {
            Section::Homepage => Some("/".to_string()),
            Section::Other => None,
            other => Some(format!("/{}", other.as_str())),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_asset(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    ROOT_FILES.contains(&lower.as_str())
        || ASSET_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        || ASSET_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

pub fn is_suspicious(path: &str) -> bool {
    SUSPICIOUS_SET.is_match(path)
}

/// Label of the first probe signature matching `path`.
pub fn suspicious_label(path: &str) -> Option<&'static str> {
    SUSPICIOUS_SET
        .matches(path)
        .iter()
        .next()
        .map(|idx| SUSPICIOUS_PATTERNS[idx].1)
}

pub fn is_known_bot(user_agent: &str) -> bool {
    if BOT_WORD.is_match(user_agent) {
        return true;
    }
    let lower = user_agent.to_ascii_lowercase();
    BOT_TOKENS.iter().any(|token| lower.contains(token))
}

/// Name of the search engine the referrer points at, if any.
pub fn detect_engine(referrer: &str) -> Option<&'static str> {
    let host = url_host(referrer)?;
    ENGINES
        .iter()
        .find(|(_, pattern)| pattern.is_match(&host))
        .map(|(name, _)| *name)
}

/// Section of a normalized path by longest matching prefix.
pub fn classify_section(path: &str) -> Section {
    if path == "/" {
        return Section::Homepage;
    }
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    let first = first.strip_suffix(".html").unwrap_or(first);
    match first {
        "blog" => Section::Blog,
        "tools" => Section::Tools,
        "cheatsheets" => Section::Cheatsheets,
        "index" => Section::Homepage,
        other => Kit::from_slug(other).map_or(Section::Other, Section::Kit),
    }
}
