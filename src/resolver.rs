//! Locator resolution (search terms and URLs) through yt-dlp
//!
//! Resolution never downloads media. A flat pass only lists metadata so a
//! long playlist comes back quickly; a full pass also resolves the direct
//! stream URL of a single item.

use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::ResolutionError;

/// Title plus the locator used in the next resolution step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub title: String,
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSet {
    Single(ResolvedItem),
    Playlist(Vec<ResolvedItem>),
}

impl ResolvedSet {
    pub fn into_items(self) -> Vec<ResolvedItem> {
        match self {
            ResolvedSet::Single(item) => vec![item],
            ResolvedSet::Playlist(items) => items,
        }
    }
}

/// Blocking resolver; only called from worker threads
pub trait Resolver: Send + Sync {
    fn resolve(&self, locator: &str, flat: bool) -> Result<ResolvedSet, ResolutionError>;
}

/// Subset of the yt-dlp info JSON the bot cares about
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    entries: Option<Vec<Option<EntryJson>>>,
}

#[derive(Debug, Deserialize)]
struct EntryJson {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

const UNKNOWN_TRACK: &str = "Unknown Track";
const UNKNOWN: &str = "Unknown";

/// Interpret yt-dlp output for a flat (metadata-only) pass
fn parse_flat(locator: &str, raw: &[u8]) -> Result<ResolvedSet, ResolutionError> {
    let info: InfoJson =
        serde_json::from_slice(raw).map_err(|e| ResolutionError::Malformed(e.to_string()))?;

    match info.entries {
        Some(entries) => {
            let items = entries
                .into_iter()
                .flatten()
                .filter_map(|entry| {
                    let locator = entry.url.or(entry.webpage_url)?;
                    Some(ResolvedItem {
                        title: entry.title.unwrap_or_else(|| UNKNOWN_TRACK.to_string()),
                        locator,
                    })
                })
                .collect();
            Ok(ResolvedSet::Playlist(items))
        }
        None => Ok(ResolvedSet::Single(ResolvedItem {
            title: info.title.unwrap_or_else(|| UNKNOWN.to_string()),
            locator: info.webpage_url.unwrap_or_else(|| locator.to_string()),
        })),
    }
}

/// Interpret yt-dlp output for a full pass: the direct stream of one item
fn parse_stream(locator: &str, raw: &[u8]) -> Result<ResolvedSet, ResolutionError> {
    let info: InfoJson =
        serde_json::from_slice(raw).map_err(|e| ResolutionError::Malformed(e.to_string()))?;

    let (title, url) = match info.entries {
        Some(entries) => {
            let first = entries
                .into_iter()
                .flatten()
                .next()
                .ok_or_else(|| ResolutionError::Empty(locator.to_string()))?;
            (first.title, first.url)
        }
        None => (info.title, info.url),
    };

    let url = url.ok_or_else(|| ResolutionError::NoStream(locator.to_string()))?;
    Ok(ResolvedSet::Single(ResolvedItem {
        title: title.unwrap_or_else(|| UNKNOWN.to_string()),
        locator: url,
    }))
}

/// Resolver backed by the `yt-dlp` command line tool
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: PathBuf,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(locator: &str, flat: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-J".into(),
            "--no-warnings".into(),
            "--no-check-certificate".into(),
            "--default-search".into(),
            "auto".into(),
            "--source-address".into(),
            "0.0.0.0".into(),
        ];
        if flat {
            args.push("--flat-playlist".into());
        } else {
            args.extend(["-f", "bestaudio/best", "--no-playlist"].map(String::from));
        }
        // "--" keeps search text starting with a dash from being read as an option
        args.push("--".into());
        args.push(locator.to_string());
        args
    }
}

impl Resolver for YtDlpResolver {
    fn resolve(&self, locator: &str, flat: bool) -> Result<ResolvedSet, ResolutionError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(ResolutionError::Empty(String::new()));
        }

        tracing::debug!(locator, flat, "Resolving");
        let output = Command::new(&self.binary)
            .args(Self::args(locator, flat))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ResolutionError::Unavailable(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("no output").trim().to_string();
            return Err(ResolutionError::Failed(reason));
        }

        if flat {
            parse_flat(locator, &output.stdout)
        } else {
            parse_stream(locator, &output.stdout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_playlist_skips_unusable_entries() {
        let raw = br#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"title": "One", "url": "https://youtu.be/1"},
                null,
                {"title": "Two", "webpage_url": "https://youtu.be/2"},
                {"title": "Three"},
                {"url": "https://youtu.be/4"}
            ]
        }"#;
        let set = parse_flat("mix", raw).unwrap();
        let ResolvedSet::Playlist(items) = set else {
            panic!("expected playlist");
        };
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two", UNKNOWN_TRACK]);
        assert_eq!(items[1].locator, "https://youtu.be/2");
    }

    #[test]
    fn test_flat_playlist_with_no_usable_entries_is_empty_success() {
        let raw = br#"{"entries": [null, {"title": "gone"}]}"#;
        assert_eq!(parse_flat("x", raw).unwrap(), ResolvedSet::Playlist(vec![]));
    }

    #[test]
    fn test_flat_single_falls_back_to_input_locator() {
        let raw = br#"{"id": "abc"}"#;
        let set = parse_flat("https://example.com/song.mp3", raw).unwrap();
        assert_eq!(
            set,
            ResolvedSet::Single(ResolvedItem {
                title: UNKNOWN.into(),
                locator: "https://example.com/song.mp3".into(),
            })
        );
    }

    #[test]
    fn test_stream_pass_takes_first_entry() {
        let raw = br#"{"entries": [null, {"title": "Hit", "url": "https://cdn/x.webm"}]}"#;
        let set = parse_stream("hit", raw).unwrap();
        assert_eq!(set.into_items()[0].locator, "https://cdn/x.webm");
    }

    #[test]
    fn test_stream_pass_errors() {
        assert_eq!(
            parse_stream("q", br#"{"entries": []}"#),
            Err(ResolutionError::Empty("q".into()))
        );
        assert_eq!(
            parse_stream("q", br#"{"title": "no url"}"#),
            Err(ResolutionError::NoStream("q".into()))
        );
        assert!(matches!(
            parse_stream("q", b"not json"),
            Err(ResolutionError::Malformed(_))
        ));
    }

    #[test]
    fn test_args_select_pass() {
        let flat = YtDlpResolver::args("lofi", true);
        assert!(flat.contains(&"--flat-playlist".to_string()));
        assert_eq!(flat.last().map(String::as_str), Some("lofi"));

        let full = YtDlpResolver::args("lofi", false);
        assert!(full.contains(&"bestaudio/best".to_string()));
        assert!(!full.contains(&"--flat-playlist".to_string()));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp");
        assert!(matches!(
            resolver.resolve("lofi", true),
            Err(ResolutionError::Unavailable(_))
        ));
    }
}
