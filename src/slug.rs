//! Output filename derivation for city pages.
//!
//! Every record becomes one file named after its city and state:
//!
//! ```text
//! "Salt Lake City", "Utah"  →  steel-buildings-salt-lake-city-utah.html
//! "  St.  George ", "UT"    →  steel-buildings-st.-george-ut.html
//! ```
//!
//! The filename doubles as the canonical URL path segment, so it must be
//! stable across runs: the same inputs always produce the same name.
//! Characters that would change the path or break the URL (`/`, `\`, `?`,
//! `#`, `%`, control characters) are not escaped; [`find_unsafe_char`] lets
//! the composer reject such a record instead.
//!
//! ## Collisions
//!
//! Two rows can slug to the same filename (e.g. a duplicated row, or
//! `"Park City"` vs `"park  city"`). [`SlugPlan`] resolves this once, before
//! any rendering: the **last** record in dataset order owns the file and
//! earlier ones are marked superseded. The generator still falls back to an
//! earlier page when the owner fails. Callers that prefer a hard failure use
//! [`SlugPlan::collisions`] to reject the dataset instead.

use crate::dataset::Record;
use crate::types::RecordId;
use std::collections::HashMap;

/// Prefix shared by every generated page.
pub const FILENAME_PREFIX: &str = "steel-buildings";

/// Lowercase a value and collapse whitespace runs into single hyphens.
///
/// Leading and trailing whitespace is dropped. Other characters pass through
/// unchanged.
pub fn slugify(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// First character of `value` that cannot appear in a page filename.
///
/// Whitespace is fine since [`slugify`] turns it into hyphens.
pub fn find_unsafe_char(value: &str) -> Option<char> {
    value.chars().find(|&c| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || (c.is_control() && !c.is_whitespace())
    })
}

/// Filename for the page of `city`, `state`.
pub fn page_filename(city: &str, state: &str) -> String {
    format!(
        "{}-{}-{}.html",
        FILENAME_PREFIX,
        slugify(city),
        slugify(state)
    )
}

/// A filename claimed by more than one record.
#[derive(Debug, Clone, PartialEq)]
pub struct SlugCollision {
    pub filename: String,
    /// Every record mapping to `filename`, in dataset order.
    pub records: Vec<RecordId>,
}

/// Filenames for a whole dataset, with collision ownership resolved.
#[derive(Debug)]
pub struct SlugPlan {
    filenames: Vec<String>,
    owns_file: Vec<bool>,
    collisions: Vec<SlugCollision>,
}

impl SlugPlan {
    pub fn new(records: &[Record]) -> Self {
        let filenames: Vec<String> = records
            .iter()
            .map(|r| page_filename(&r.city, &r.state))
            .collect();

        let mut last_index: HashMap<&str, usize> = HashMap::new();
        let mut claimants: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();
        for (idx, name) in filenames.iter().enumerate() {
            last_index.insert(name.as_str(), idx);
            let entry = claimants.entry(name.as_str()).or_default();
            if entry.is_empty() {
                first_seen.push(name.as_str());
            }
            entry.push(idx);
        }

        let owns_file = filenames
            .iter()
            .enumerate()
            .map(|(idx, name)| last_index.get(name.as_str()) == Some(&idx))
            .collect();

        let collisions = first_seen
            .into_iter()
            .filter_map(|name| {
                let indices = claimants.get(name)?;
                (indices.len() > 1).then(|| SlugCollision {
                    filename: name.to_string(),
                    records: indices.iter().map(|&i| records[i].id()).collect(),
                })
            })
            .collect();

        Self {
            filenames,
            owns_file,
            collisions,
        }
    }

    /// Filename for the record at dataset index `idx`.
    pub fn filename(&self, idx: usize) -> &str {
        &self.filenames[idx]
    }

    /// Whether the record at `idx` is the one that writes its file.
    pub fn owns_file(&self, idx: usize) -> bool {
        self.owns_file[idx]
    }

    /// Colliding filenames, ordered by first occurrence in the dataset.
    pub fn collisions(&self) -> &[SlugCollision] {
        &self.collisions
    }

    /// Number of distinct output files the dataset maps to.
    pub fn unique_count(&self) -> usize {
        self.owns_file.iter().filter(|owns| **owns).count()
    }
}
