//! Remote version check against a JSON release feed.
//!
//! The feed answers with the latest release object, e.g.
//! `{"tag_name": "v0.2.0", "body": "<ul><li>…</li></ul>"}`.

use std::time::Duration;

use serde::Deserialize;

use keeper_core::UpdateInfo;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    body: String,
}

/// Query `feed_url` and compare its latest tag with `current_version`.
///
/// Never fails: problems are reported through [`UpdateInfo::error`].
pub fn check_release_feed(feed_url: &str, current_version: &str) -> UpdateInfo {
    if feed_url.trim().is_empty() {
        return UpdateInfo::failed("no release feed configured");
    }

    let response = match ureq::get(feed_url)
        .timeout(Duration::from_secs(10))
        .call()
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(url = feed_url, error = %err, "update check request failed");
            return UpdateInfo::failed(format!("could not reach release feed: {err}"));
        }
    };

    match response.into_json::<Release>() {
        Ok(release) => compare_release(&release.tag_name, release.body, current_version),
        Err(err) => UpdateInfo::failed(format!("malformed release feed: {err}")),
    }
}

fn compare_release(tag: &str, notes: String, current_version: &str) -> UpdateInfo {
    let latest = tag.trim_start_matches('v').to_owned();
    UpdateInfo {
        update_available: is_newer(&latest, current_version),
        latest_release: latest,
        release_notes: notes,
        error: None,
    }
}

/// Numeric comparison of dotted versions; pre-release suffixes are ignored.
pub fn is_newer(latest: &str, current: &str) -> bool {
    version_parts(latest) > version_parts(current)
}

fn version_parts(version: &str) -> Vec<u64> {
    let core = version
        .trim()
        .trim_start_matches('v')
        .split(|c: char| c == '-' || c == '+')
        .next()
        .unwrap_or("");
    let mut parts: Vec<u64> = core
        .split('.')
        .map(|p| p.parse::<u64>().unwrap_or(0))
        .collect();
    while parts.len() < 3 {
        parts.push(0);
    }
    parts
}
