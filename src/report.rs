use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::compare::COMPARED_METRICS;
use crate::error::{Error, Result};
use crate::stats::TopList;
use crate::Analysis;

const SUMMARY_LINES: &[(&str, &str)] = &[
    ("Total requests", "total_requests"),
    ("Unique IPs", "unique_ips"),
    ("Clean requests", "clean_requests"),
    ("Suspicious requests", "suspicious_requests"),
    ("Content requests", "content_requests"),
    ("Asset requests", "asset_requests"),
    ("Known-bot requests", "known_bot_requests"),
    ("Clean 404s", "clean_404"),
    ("Suspicious 404s", "suspicious_404"),
    ("Organic referrals", "organic_referrals"),
    ("Organic referrals (non-bot)", "organic_non_bot_referrals"),
    ("External referrals", "external_referrals"),
    ("Campaign hits", "crosspromo_campaign_hits"),
    ("Campaign hits (non-bot)", "crosspromo_non_bot_hits"),
    ("Campaign hits (known bot)", "crosspromo_known_bot_hits"),
    ("Campaign hits (suspected automation)", "crosspromo_suspected_automation_hits"),
    ("Campaign redirect hops", "crosspromo_redirect_hops"),
    ("Attributed by referrer", "crosspromo_direct_referrer_hits"),
    ("Attributed by parameter, verified", "crosspromo_param_verified_hits"),
    ("Attributed by parameter, unverified", "crosspromo_param_unverified_hits"),
    ("Unattributed", "crosspromo_unattributed_hits"),
    ("Cross-property referrals", "internal_crossproperty_referrals"),
    ("Cross-property referrals (non-bot)", "internal_crossproperty_non_bot_referrals"),
];

/// Render the console report.
pub fn render(analysis: &Analysis) -> String {
    let summary = &analysis.current;
    let s = &summary.scalars;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "=== TRAFFIC SUMMARY ({}h, {} .. {}) ===",
        s.window_hours, s.window_start, s.window_end
    );
    let json = serde_json::to_value(s).unwrap_or(Value::Null);
    for (label, field) in SUMMARY_LINES {
        let value = json.get(*field).cloned().unwrap_or(Value::Null);
        let _ = writeln!(out, "  {:<40} {}", label, value);
    }
    let _ = writeln!(
        out,
        "  {:<40} {:.2}% suspicious, {:.2}% content, {:.2}% known bots",
        "Shares", s.suspicious_pct, s.content_pct, s.known_bot_pct
    );
    let _ = writeln!(
        out,
        "  {:<40} {:.2}% referrer, {:.2}% verified, {:.2}% unverified, {:.2}% none",
        "Campaign attribution",
        s.crosspromo_direct_referrer_pct,
        s.crosspromo_param_verified_pct,
        s.crosspromo_param_unverified_pct,
        s.crosspromo_unattributed_pct
    );

    for list in &summary.lists {
        render_list(&mut out, list);
    }

    if let Some(comparison) = &analysis.comparison {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "=== COMPARED TO PREVIOUS WINDOW ({} .. {}) ===",
            comparison.previous_window.start, comparison.previous_window.end
        );
        for name in COMPARED_METRICS {
            if let Some(delta) = comparison.deltas.get(*name) {
                let change = match delta.pct_change {
                    Some(pct) => format!("{:+.2}%", pct),
                    None => "n/a".to_string(),
                };
                let _ = writeln!(
                    out,
                    "  {:<42} {:>8} -> {:>8}  ({:+}, {})",
                    name, delta.previous, delta.current, delta.delta, change
                );
            }
        }
    }
    out
}

fn render_list(out: &mut String, list: &TopList) {
    let _ = writeln!(out);
    let _ = writeln!(out, "=== {} ===", list.title.to_uppercase());
    if list.rows.is_empty() {
        let _ = writeln!(out, "  (none)");
        return;
    }
    for (key, count) in &list.rows {
        let _ = writeln!(out, "  {:>6}  {}", count, key);
    }
}

pub fn print_report(analysis: &Analysis) {
    print!("{}", render(analysis));
}

/// The JSON document consumed by the site scripts.
pub fn to_json(analysis: &Analysis) -> Result<Value> {
    let mut doc = Map::new();
    doc.insert("summary".to_string(), serde_json::to_value(&analysis.current.scalars)?);
    for list in &analysis.current.lists {
        doc.insert(list.name.to_string(), serde_json::to_value(list)?);
    }
    if let Some(comparison) = &analysis.comparison {
        doc.insert("comparison".to_string(), serde_json::to_value(comparison)?);
    }
    Ok(Value::Object(doc))
}

pub fn write_json(path: &Path, analysis: &Analysis) -> Result<()> {
    let doc = to_json(analysis)?;
    let mut body = serde_json::to_string_pretty(&doc)?;
    body.push('\n');
    fs::write(path, body).map_err(|source| Error::WriteReport {
        path: path.to_path_buf(),
        source,
    })
}
