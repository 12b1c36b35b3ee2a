extern crate weblogstat;

use std::fs;
use std::io::Write;

use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use weblogstat::parser::parse_line;
use weblogstat::{analyze, run, Analysis, Error, Options, Settings};

const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()
}

fn line(ip: &str, time: &str, target: &str, status: u16, referrer: &str, ua: &str) -> String {
    format!(
        "{} - - [{} +0000] \"GET {} HTTP/1.1\" {} 512 \"{}\" \"{}\"",
        ip, time, target, status, referrer, ua
    )
}

fn analyze_lines(lines: &[String], compare: bool) -> Analysis {
    let events = lines.iter().filter_map(|l| parse_line(l)).collect();
    analyze(events, &Settings::default(), now(), 24, 20, compare).unwrap()
}

#[test]
fn clean_hit_and_probe_from_same_ip() {
    let lines = vec![
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/tools/json-formatter", 200, "-", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:00:05", "/wp-login.php", 404, "-", FIREFOX),
    ];
    let s = analyze_lines(&lines, false).current.scalars;
    assert_eq!(1, s.content_requests);
    assert_eq!(1, s.suspicious_requests);
    assert_eq!(0, s.clean_404);
    assert_eq!(1, s.suspicious_404);
    assert_eq!(1, s.unique_ips);
}

#[test]
fn google_referral_counts_as_organic_not_campaign() {
    let lines = vec![line(
        "198.51.100.4",
        "01/Mar/2025:09:00:00",
        "/blog/my-post",
        200,
        "https://www.google.com/search?q=x",
        FIREFOX,
    )];
    let summary = analyze_lines(&lines, false).current;
    assert_eq!(1, summary.scalars.organic_referrals);
    assert_eq!(1, summary.count("organic_engines", "google"));
    assert_eq!(1, summary.count("organic_sections", "blog"));
    assert_eq!(0, summary.scalars.crosspromo_campaign_hits);
    assert_eq!(0, summary.scalars.crosspromo_non_bot_hits);
    assert!(summary.list("crosspromo_campaign_landing_pages").unwrap().rows.is_empty());
}

#[test]
fn recency_verification_across_the_horizon() {
    let tagged = "/datekit/?utm_source=devtoolbox&utm_campaign=crosspromo-top-organic&utm_content=foo";
    let verified = vec![
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/blog/foo", 200, "-", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:10:00", tagged, 200, "-", FIREFOX),
    ];
    let s = analyze_lines(&verified, false).current.scalars;
    assert_eq!(1, s.crosspromo_param_verified_hits);
    assert_eq!(0, s.crosspromo_param_unverified_hits);

    let stale = vec![
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/blog/foo", 200, "-", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:40:00", tagged, 200, "-", FIREFOX),
    ];
    let s = analyze_lines(&stale, false).current.scalars;
    assert_eq!(0, s.crosspromo_param_verified_hits);
    assert_eq!(1, s.crosspromo_param_unverified_hits);
}

#[test]
fn out_of_order_input_is_sorted_before_attribution() {
    let tagged = "/sleepkit?utm_campaign=crosspromo-top-organic&utm_content=foo";
    let lines = vec![
        line("198.51.100.4", "01/Mar/2025:09:10:00", tagged, 200, "-", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/blog/foo/", 200, "-", FIREFOX),
    ];
    let s = analyze_lines(&lines, false).current.scalars;
    assert_eq!(1, s.crosspromo_param_verified_hits);
}

#[test]
fn redirect_hop_is_not_a_landing() {
    let lines = vec![
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/go/datekit?utm_campaign=crosspromo-top-organic", 302, "https://devtoolbox.dedyn.io/blog/foo", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:00:01", "/datekit/?utm_campaign=crosspromo-top-organic&utm_content=foo", 200, "https://devtoolbox.dedyn.io/blog/foo", FIREFOX),
    ];
    let summary = analyze_lines(&lines, false).current;
    assert_eq!(1, summary.scalars.crosspromo_campaign_hits);
    assert_eq!(1, summary.scalars.crosspromo_redirect_hops);
    assert_eq!(1, summary.scalars.crosspromo_direct_referrer_hits);
    assert_eq!(0, summary.count("crosspromo_campaign_landing_pages", "/go/datekit"));
    assert_eq!(1, summary.count("crosspromo_campaign_landing_pages", "/datekit"));
}

#[test]
fn automation_verdicts_partition_campaign_hits() {
    let tagged = "/opskit?utm_campaign=crosspromo-top-organic&utm_content=kubernetes-guide";
    let spoofed = "Mozilla/5.0 (iPhone; CPU iPhone OS 13_2_3 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1";
    let lines = vec![
        line("198.51.100.4", "01/Mar/2025:09:00:00", tagged, 200, "-", FIREFOX),
        line("198.51.100.5", "01/Mar/2025:09:00:00", tagged, 200, "-", spoofed),
        line("43.153.10.10", "01/Mar/2025:09:00:00", tagged, 200, "-", spoofed),
        line("43.153.10.11", "01/Mar/2025:09:00:00", tagged, 200, "https://devtoolbox.dedyn.io/", spoofed),
        line("192.0.2.1", "01/Mar/2025:09:00:00", tagged, 200, "-", "Mozilla/5.0 (compatible; bingbot/2.0)"),
    ];
    let s = analyze_lines(&lines, false).current.scalars;
    assert_eq!(5, s.crosspromo_campaign_hits);
    assert_eq!(3, s.crosspromo_non_bot_hits);
    assert_eq!(1, s.crosspromo_known_bot_hits);
    assert_eq!(1, s.crosspromo_suspected_automation_hits);
    assert_eq!(
        s.crosspromo_campaign_hits,
        s.crosspromo_non_bot_hits + s.crosspromo_known_bot_hits + s.crosspromo_suspected_automation_hits
    );
    assert_eq!(
        s.crosspromo_campaign_hits,
        s.crosspromo_direct_referrer_hits
            + s.crosspromo_param_verified_hits
            + s.crosspromo_param_unverified_hits
            + s.crosspromo_unattributed_hits
    );
}

#[test]
fn previous_window_and_deltas() {
    let lines = vec![
        line("198.51.100.4", "28/Feb/2025:09:00:00", "/blog/a", 200, "-", FIREFOX),
        line("198.51.100.4", "28/Feb/2025:09:05:00", "/blog/b", 200, "-", FIREFOX),
        line("198.51.100.4", "01/Mar/2025:09:00:00", "/blog/a", 200, "-", FIREFOX),
        line("198.51.100.4", "26/Feb/2025:09:00:00", "/blog/too-old", 200, "-", FIREFOX),
    ];
    let analysis = analyze_lines(&lines, true);
    assert_eq!(1, analysis.current.scalars.total_requests);
    let comparison = analysis.comparison.unwrap();
    let total = &comparison.deltas["total_requests"];
    assert_eq!(1, total.current);
    assert_eq!(2, total.previous);
    assert_eq!(-1, total.delta);
    assert_eq!(Some(-50.0), total.pct_change);
    assert_eq!(None, comparison.deltas["crosspromo_campaign_hits"].pct_change);
}

#[test]
fn run_reads_rotated_logs_and_writes_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("access.log");
    fs::write(
        &base,
        format!(
            "{}\nnot a log line\n",
            line("198.51.100.4", "01/Mar/2025:23:00:00", "/blog/foo", 200, "https://duckduckgo.com/", FIREFOX)
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("access.log.1"),
        line("198.51.100.4", "01/Mar/2025:12:00:00", "/tools/base64", 200, "-", FIREFOX),
    )
    .unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(line("198.51.100.9", "01/Mar/2025:06:00:00", "/.env", 404, "-", "curl/8.0").as_bytes())
        .unwrap();
    fs::write(dir.path().join("access.log.2.gz"), encoder.finish().unwrap()).unwrap();

    let json_path = dir.path().join("report.json");
    let options = Options {
        json: Some(json_path.clone()),
        logs: vec![base],
        now: now(),
        compare_previous: true,
        ..Options::default()
    };
    run(&options).unwrap();

    let doc: Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(3, doc["summary"]["total_requests"]);
    assert_eq!(1, doc["summary"]["suspicious_404"]);
    assert_eq!(1, doc["summary"]["content_blog_requests"]);
    assert_eq!("duckduckgo", doc["organic_engines"][0]["engine"]);
    assert_eq!("/.env", doc["top_suspicious_paths"][0]["path"]);
    assert_eq!(24, doc["comparison"]["current_window"]["hours"]);
    assert!(doc["comparison"]["deltas"]["total_requests"].is_object());
}

#[test]
fn unwritable_json_path_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        json: Some(dir.path().join("missing-dir").join("report.json")),
        logs: vec![dir.path().join("absent.log")],
        now: now(),
        ..Options::default()
    };
    match run(&options) {
        Err(Error::WriteReport { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn invalid_window_is_rejected() {
    for &(hours, compare_previous) in &[(0, false), (3_000_000_000, false), (2_000_000_000, true)] {
        let options = Options {
            hours,
            compare_previous,
            ..Options::default()
        };
        match run(&options) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("hours {}: unexpected {:?}", hours, other),
        }
    }

    match analyze(Vec::new(), &Settings::default(), now(), 3_000_000_000, 20, false) {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn tagged_bot_hit_on_a_missing_page_is_counted() {
    let lines = vec![line(
        "198.51.100.4",
        "01/Mar/2025:09:00:00",
        "/datekit/old?utm_campaign=crosspromo-top-organic",
        404,
        "-",
        "python-requests/2.31.0",
    )];
    let s = analyze_lines(&lines, false).current.scalars;
    assert_eq!(1, s.crosspromo_campaign_hits);
    assert_eq!(1, s.crosspromo_known_bot_hits);
    assert_eq!(0, s.crosspromo_non_bot_hits);
    assert_eq!(0, s.content_requests);
}
