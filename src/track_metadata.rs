use std::sync::LazyLock;

use regex::Regex;

/// Output template handed to the downloader's `--get-filename`. Each field is
/// rendered between fixed markers so it can be matched back out.
pub const METADATA_TEMPLATE: &str =
    "#title#%(title)s#artist#%(artist)s#track#%(track)s#islive#%(is_live)r";

/// Placeholder the downloader prints for fields it has no value for.
const NOT_AVAILABLE: &str = "NA";

/// How the downloader renders a true `is_live` with the `r` conversion.
const LIVE_TRUE: &str = "True";

static METADATA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#title#(?P<title>.*)#artist#(?P<artist>.*)#track#(?P<track>.*)#islive#(?P<islive>.*)")
        .expect("metadata pattern is a valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub track: Option<String>,
    pub is_live: bool,
}

fn field(value: &str) -> Option<String> {
    if value == NOT_AVAILABLE {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse the downloader's rendering of [`METADATA_TEMPLATE`]. Returns `None`
/// when the output does not have the expected shape.
pub fn parse_metadata_output(output: &str) -> Option<ItemMetadata> {
    let captures = METADATA_PATTERN.captures(output)?;

    Some(ItemMetadata {
        title: field(&captures["title"]),
        artist: field(&captures["artist"]),
        track: field(&captures["track"]),
        is_live: &captures["islive"] == LIVE_TRUE,
    })
}

/// Collapse whitespace runs into single underscores, drop everything that is
/// not a word character or hyphen, and lower-case the result.
pub fn sanitize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

/// The on-disk name for an item: `artist-track` when both are known, else the
/// title, else the item URL. `extension` is appended after a dot.
pub fn derive_file_name(metadata: &ItemMetadata, url: &str, extension: &str) -> String {
    let name = match (&metadata.artist, &metadata.track) {
        (Some(artist), Some(track)) => Some(format!("{}-{}", artist, track)),
        _ => metadata.title.clone(),
    };

    let sanitized = name.as_deref().map(sanitize_name).unwrap_or_default();
    if sanitized.is_empty() {
        return format!("{}.{}", sanitize_name(url), extension);
    }

    format!("{}.{}", sanitized, extension)
}
