use url::Url;

/// Split a request-line target into a normalized path and the raw query string.
///
/// Absolute targets (`http://host/path?q`) are reduced to their path, since
/// some proxies log the full URL instead of the origin-form target.
pub fn split_target(target: &str) -> (String, String) {
    let target = target.trim();
    let relative = if !target.starts_with('/') && target.contains("://") {
        strip_origin(target)
    } else {
        target
    };

    let without_fragment = relative.split('#').next().unwrap_or("");
    let mut parts = without_fragment.splitn(2, '?');
    let path = parts.next().unwrap_or("");
    let query = parts.next().unwrap_or("");

    (normalize_path(path), query.to_string())
}

/// Normalize a path: leading slash, no repeated slashes, no trailing slash
/// except for the root itself.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    for c in path.chars() {
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Path of an absolute URL, normalized, or `None` when the value is not a URL.
pub fn url_path(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    Some(normalize_path(url.path()))
}

/// Host of an absolute URL, lowercased and without a leading `www.`.
pub fn url_host(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(strip_www(&host).to_string())
}

pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn strip_origin(target: &str) -> &str {
    let after_scheme = match target.find("://") {
        Some(idx) => &target[idx + 3..],
        None => return target,
    };
    match after_scheme.find(|c: char| c == '/' || c == '?' || c == '#') {
        Some(idx) => &after_scheme[idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_and_trims_slashes() {
        assert_eq!("/", normalize_path(""));
        assert_eq!("/", normalize_path("/"));
        assert_eq!("/", normalize_path("///"));
        assert_eq!("/blog/post", normalize_path("//blog///post/"));
        assert_eq!("/tools", normalize_path("tools/"));
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in &["", "/", "a//b/", "/x/y//", "////z", "/blog/my-post/", "no-slash"] {
            let once = normalize_path(raw);
            assert_eq!(once, normalize_path(&once), "input {:?}", raw);
        }
    }

    #[test]
    fn splits_path_and_query() {
        let (path, query) = split_target("/datekit/?utm_campaign=crosspromo-top-organic&utm_content=x");
        assert_eq!("/datekit", path);
        assert_eq!("utm_campaign=crosspromo-top-organic&utm_content=x", query);

        let (path, query) = split_target("/tools/json-formatter#faq");
        assert_eq!("/tools/json-formatter", path);
        assert_eq!("", query);
    }

    #[test]
    fn absolute_targets_keep_only_the_path() {
        let (path, query) = split_target("http://devtoolbox.dedyn.io//blog/post/?a=1");
        assert_eq!("/blog/post", path);
        assert_eq!("a=1", query);

        let (path, _) = split_target("https://example.com");
        assert_eq!("/", path);

        let (path, query) = split_target("/go/datekit?next=https://devtoolbox.dedyn.io/datekit");
        assert_eq!("/go/datekit", path);
        assert_eq!("next=https://devtoolbox.dedyn.io/datekit", query);
    }

    #[test]
    fn url_helpers() {
        assert_eq!(Some("/blog/foo".to_string()), url_path("https://www.devtoolbox.dedyn.io/blog/foo/"));
        assert_eq!(Some("devtoolbox.dedyn.io".to_string()), url_host("https://WWW.devtoolbox.dedyn.io/"));
        assert_eq!(None, url_host("not a url"));
    }
}
