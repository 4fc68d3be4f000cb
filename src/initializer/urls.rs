//! Candidate URLs for the versioned download protocol
//!
//! A resource `http://host/lib/app.jar` requested in version `1.0` may be
//! served as any of:
//!
//! ```text
//! http://host/lib/app__V1.0.jar.pack.gz
//! http://host/lib/app__V1.0.jar
//! http://host/lib/app.jar.pack.gz?version-id=1.0&current-version-id=0.9
//! http://host/lib/app.jar?version-id=1.0&current-version-id=0.9
//! ```

use reqwest::Url;

use crate::http::{CURRENT_VERSION_ID_PARAM, VERSION_ID_PARAM};
use crate::resource::DownloadOptions;
use crate::version::{VersionId, VersionString};

/// Separates file name and version in versioned file names
pub const VERSION_PREFIX: &str = "__V";

const PACK_SUFFIX: &str = ".pack.gz";

/// `app.jar` → `app__V1.0.jar`; the version goes before the last `.`
pub fn versioned_file_name(name: &str, version: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) => format!("{}{}{}.{}", stem, VERSION_PREFIX, version, extension),
        None => format!("{}{}{}", name, VERSION_PREFIX, version),
    }
}

/// Replaces the last path segment; `None` if the URL has no file name
fn with_file_name(location: &Url, rename: impl FnOnce(&str) -> String) -> Option<Url> {
    let (dir, name) = location.path().rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }

    let mut url = location.clone();
    url.set_path(&format!("{}/{}", dir, rename(name)));
    Some(url)
}

pub fn pack_url(location: &Url) -> Option<Url> {
    with_file_name(location, |name| format!("{}{}", name, PACK_SUFFIX))
}

pub fn version_url(location: &Url, version: &VersionString) -> Option<Url> {
    with_file_name(location, |name| {
        versioned_file_name(name, &version.to_string())
    })
}

pub fn pack_version_url(location: &Url, version: &VersionString) -> Option<Url> {
    with_file_name(location, |name| {
        format!(
            "{}{}",
            versioned_file_name(name, &version.to_string()),
            PACK_SUFFIX
        )
    })
}

/// True if `url` points at the versioned file name of `location` in
/// `version`, packed or not (`app__V1.0.jar`, `app__V1.0.jar.pack.gz`)
pub fn is_versioned_file_url(url: &Url, location: &Url, version: &VersionId) -> bool {
    let version = version.as_version_string();
    [
        version_url(location, &version),
        pack_version_url(location, &version),
    ]
    .into_iter()
    .flatten()
    .any(|candidate| candidate.path() == url.path())
}

/// Adds `version-id` (and `current-version-id` if known) to the query,
/// replacing earlier values of both
pub fn versioned_query_url(
    location: &Url,
    version: &VersionString,
    current_version: Option<&VersionId>,
) -> Url {
    let kept: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| key != VERSION_ID_PARAM && key != CURRENT_VERSION_ID_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = location.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(kept);
        query.append_pair(VERSION_ID_PARAM, &version.to_string());
        if let Some(current) = current_version {
            query.append_pair(CURRENT_VERSION_ID_PARAM, current.as_str());
        }
    }
    url
}

pub fn unversioned_candidates(location: &Url, options: DownloadOptions) -> Vec<Url> {
    let mut candidates = Vec::new();
    if options.use_pack {
        candidates.extend(pack_url(location));
    }
    candidates.push(location.clone());
    candidates
}

/// Candidates for an exact version, best first.
///
/// `current_version` is the newest cached version below the requested one;
/// the server may use it to answer with a jardiff.
pub fn exact_candidates(
    location: &Url,
    version: &VersionString,
    options: DownloadOptions,
    current_version: Option<&VersionId>,
) -> Vec<Url> {
    let mut candidates = Vec::new();
    if options.use_pack && options.use_version {
        candidates.extend(pack_version_url(location, version));
    }
    if options.use_version {
        candidates.extend(version_url(location, version));
    }
    if options.use_pack
        && let Some(pack) = pack_url(location)
    {
        candidates.push(versioned_query_url(&pack, version, current_version));
    }
    candidates.push(versioned_query_url(location, version, current_version));
    candidates
}

pub fn range_candidates(
    location: &Url,
    version: &VersionString,
    options: DownloadOptions,
    current_version: Option<&VersionId>,
) -> Vec<Url> {
    let mut candidates = Vec::new();
    if options.use_pack
        && let Some(pack) = pack_url(location)
    {
        candidates.push(versioned_query_url(&pack, version, current_version));
    }
    candidates.push(versioned_query_url(location, version, current_version));
    candidates
}

/// Puts an `https` variant in front of every `http` candidate on the default
/// port, unless `https_dont_enforce` is set. Duplicates are dropped.
pub fn prepend_https(candidates: Vec<Url>, https_dont_enforce: bool) -> Vec<Url> {
    let https = candidates
        .iter()
        .filter(|url| !https_dont_enforce && url.scheme() == "http" && url.port().is_none())
        .filter_map(|url| {
            let mut https = url.clone();
            https.set_scheme("https").ok()?;
            Some(https)
        })
        .collect::<Vec<_>>();

    let mut result: Vec<Url> = Vec::with_capacity(https.len() + candidates.len());
    for url in https.into_iter().chain(candidates) {
        if !result.contains(&url) {
            result.push(url);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn vs(s: &str) -> VersionString {
        VersionString::parse(s).unwrap()
    }

    fn strings(urls: Vec<Url>) -> Vec<String> {
        urls.into_iter().map(String::from).collect()
    }

    #[rstest]
    #[case("app.jar", "1.0", "app__V1.0.jar")]
    #[case("j2-commons-cli.jar", "1.0", "j2-commons-cli__V1.0.jar")]
    #[case("app.tar.gz", "2", "app.tar__V2.gz")]
    #[case("app", "1.0", "app__V1.0")]
    fn versioned_file_name_inserts_version_before_extension(
        #[case] name: &str,
        #[case] version: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(versioned_file_name(name, version), expected);
    }

    #[test]
    fn version_url_keeps_query() {
        assert_eq!(
            version_url(&url("http://h/lib/app.jar?x=1"), &vs("1.0")).unwrap(),
            url("http://h/lib/app__V1.0.jar?x=1")
        );
    }

    #[rstest]
    #[case("http://127.0.0.1:8080/lib/app__V1.0.jar", true)]
    #[case("http://127.0.0.1:8080/lib/app__V1.0.jar.pack.gz", true)]
    #[case("https://mirror/lib/app__V1.0.jar", true)]
    #[case("http://127.0.0.1:8080/lib/app__V1.0.1.jar", false)]
    #[case("http://127.0.0.1:8080/lib/app.jar?version-id=1.0", false)]
    #[case("http://1.0.0.1:8080/lib/app.jar", false)]
    fn is_versioned_file_url_only_checks_file_name(#[case] candidate: &str, #[case] expected: bool) {
        let version = VersionId::parse("1.0").unwrap();

        assert_eq!(
            is_versioned_file_url(
                &url(candidate),
                &url("http://127.0.0.1:8080/lib/app.jar"),
                &version
            ),
            expected
        );
    }

    #[test]
    fn pack_url_requires_file_name() {
        assert_eq!(pack_url(&url("http://h/lib/")), None);
        assert_eq!(
            pack_url(&url("http://h/lib/app.jar")).unwrap(),
            url("http://h/lib/app.jar.pack.gz")
        );
    }

    #[rstest]
    #[case("http://h/app.jar", "1.0", None, "http://h/app.jar?version-id=1.0")]
    #[case(
        "http://h/app.jar?a=b&version-id=0.1&current-version-id=0.1",
        "1.0",
        Some("0.9"),
        "http://h/app.jar?a=b&version-id=1.0&current-version-id=0.9"
    )]
    #[case("http://h/app.jar", "1.0+ 2.0*", None, "http://h/app.jar?version-id=1.0%2B+2.0*")]
    fn versioned_query_url_replaces_version_params(
        #[case] location: &str,
        #[case] version: &str,
        #[case] current: Option<&str>,
        #[case] expected: &str,
    ) {
        let current = current.map(|c| VersionId::parse(c).unwrap());

        assert_eq!(
            versioned_query_url(&url(location), &vs(version), current.as_ref()).as_str(),
            expected
        );
    }

    #[test]
    fn exact_candidates_follow_priority_order() {
        let current = VersionId::parse("0.9").unwrap();

        let candidates = exact_candidates(
            &url("http://h:8080/app.jar"),
            &vs("1.0"),
            DownloadOptions::new(true, true),
            Some(&current),
        );

        assert_eq!(
            strings(candidates),
            vec![
                "http://h:8080/app__V1.0.jar.pack.gz",
                "http://h:8080/app__V1.0.jar",
                "http://h:8080/app.jar.pack.gz?version-id=1.0&current-version-id=0.9",
                "http://h:8080/app.jar?version-id=1.0&current-version-id=0.9",
            ]
        );
    }

    #[test]
    fn exact_candidates_without_options_only_use_query() {
        let candidates = exact_candidates(
            &url("http://h:8080/app.jar"),
            &vs("1.0"),
            DownloadOptions::NONE,
            None,
        );

        assert_eq!(strings(candidates), vec!["http://h:8080/app.jar?version-id=1.0"]);
    }

    #[rstest]
    #[case(DownloadOptions::NONE, vec!["http://h:8080/app.jar"])]
    #[case(
        DownloadOptions::new(true, false),
        vec!["http://h:8080/app.jar.pack.gz", "http://h:8080/app.jar"]
    )]
    fn unversioned_candidates_prefer_pack(
        #[case] options: DownloadOptions,
        #[case] expected: Vec<&str>,
    ) {
        assert_eq!(
            strings(unversioned_candidates(&url("http://h:8080/app.jar"), options)),
            expected
        );
    }

    #[test]
    fn range_candidates_use_query_only() {
        let candidates = range_candidates(
            &url("http://h:8080/app.jar"),
            &vs("1.0+"),
            DownloadOptions::new(true, true),
            None,
        );

        assert_eq!(
            strings(candidates),
            vec![
                "http://h:8080/app.jar.pack.gz?version-id=1.0%2B",
                "http://h:8080/app.jar?version-id=1.0%2B",
            ]
        );
    }

    #[test]
    fn prepend_https_prefers_https_for_default_port() {
        let candidates = vec![
            url("http://h/app.jar.pack.gz"),
            url("http://h:8080/app.jar"),
            url("https://h/app.jar"),
            url("http://h/app.jar"),
        ];

        assert_eq!(
            strings(prepend_https(candidates, false)),
            vec![
                "https://h/app.jar.pack.gz",
                "https://h/app.jar",
                "http://h/app.jar.pack.gz",
                "http://h:8080/app.jar",
                "http://h/app.jar",
            ]
        );
    }

    #[test]
    fn prepend_https_can_be_disabled() {
        let candidates = vec![url("http://h/app.jar")];

        assert_eq!(
            strings(prepend_https(candidates, true)),
            vec!["http://h/app.jar"]
        );
    }
}
