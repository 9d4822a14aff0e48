//! Archive and entry names

use std::collections::HashSet;
use std::path::Path;

use uuid::Uuid;

const ARCHIVE_EXTENSION: &str = ".zip";
const DEFAULT_ARCHIVE_NAME: &str = "archive";

/// Reduce a client-supplied name to a bare file name. Returns `fallback` when
/// nothing usable is left.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .filter(|s| !s.chars().any(char::is_control))
        .unwrap_or(fallback)
        .to_string()
}

/// Download name of an archive, always ending in `.zip`.
pub fn archive_file_name(requested: Option<&str>) -> String {
    let base = sanitize_file_name(requested.unwrap_or(""), DEFAULT_ARCHIVE_NAME);
    if base.to_ascii_lowercase().ends_with(ARCHIVE_EXTENSION) {
        base
    } else {
        format!("{}{}", base, ARCHIVE_EXTENSION)
    }
}

/// Hands out unique entry names within one archive. A repeated name gets a
/// counter before its extension: `report.pdf`, `report (1).pdf`, `report (2).pdf`.
#[derive(Debug, Default)]
pub struct EntryNamer {
    taken: HashSet<String>,
}

impl EntryNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, display_name: &str, file_id: Uuid) -> String {
        let fallback = format!("file-{}", file_id);
        let name = sanitize_file_name(display_name, &fallback);
        if self.taken.insert(name.to_lowercase()) {
            return name;
        }

        let (stem, ext) = split_extension(&name);
        let mut n = 1u32;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Split `name` into stem and extension (with dot). Leading-dot names have no
/// extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => name.split_at(i),
    }
}
