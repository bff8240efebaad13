//! Shared test utilities for the city-pages test suite.
//!
//! Provides record and CSV builders, a composer with fixed globals, and
//! renderers that fail or cancel on a chosen city.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let data = dataset(numbered_records(250));
//! let composer = test_composer();
//! let renderer = FailingRenderer::new("City 7");
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::compose::{Composer, PageContext, SiteGlobals};
use crate::dataset::{Dataset, REQUIRED_COLUMNS, Record};
use crate::generate::CancelFlag;
use crate::render::{RenderError, Renderer, TeraRenderer};
use crate::sections::SectionTable;

// =========================================================================
// CSV builders
// =========================================================================

/// The required header, comma-joined.
pub const HEADER: &str = "City,State,Latitude,Longitude,Introduction,CityIntro,\
ResidentialContent,CommercialContent,IndustrialContent,AgriculturalContent";

/// One complete data row with non-empty texts derived from the city name.
pub fn csv_row(city: &str, state: &str, latitude: &str, longitude: &str) -> String {
    format!(
        "{city},{state},{latitude},{longitude},Welcome to {city},{city} intro,\
{city} homes,{city} shops,{city} plants,{city} farms"
    )
}

/// [`HEADER`] followed by `rows`, newline-terminated.
pub fn csv_with_header(rows: &[String]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

// =========================================================================
// Records
// =========================================================================

/// A valid record located in Provo's coordinates.
pub fn record(row: usize, city: &str, state: &str) -> Record {
    Record {
        row,
        city: city.to_string(),
        state: state.to_string(),
        latitude: "40.2338".to_string(),
        longitude: "-111.6585".to_string(),
        introduction: format!("Welcome to {city}"),
        city_intro: format!("{city} intro"),
        residential_content: format!("{city} homes"),
        commercial_content: format!("{city} shops"),
        industrial_content: format!("{city} plants"),
        agricultural_content: format!("{city} farms"),
        undecodable: None,
    }
}

/// `n` records with distinct filenames: "City 1" .. "City n", Utah.
pub fn numbered_records(n: usize) -> Vec<Record> {
    (1..=n).map(|i| record(i, &format!("City {i}"), "Utah")).collect()
}

pub fn dataset(records: Vec<Record>) -> Dataset {
    Dataset {
        columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        records,
    }
}

// =========================================================================
// Composer and renderers
// =========================================================================

pub fn test_globals() -> SiteGlobals {
    SiteGlobals {
        domain: "https://timpanogos-steel.com".to_string(),
        form_endpoint: "https://forms.test/submit".to_string(),
        recaptcha_site_key: "site-key".to_string(),
        sentry_dsn: "https://sentry.test/1".to_string(),
        ga_tracking_id: "G-TEST".to_string(),
        current_year: 2025,
        variables: BTreeMap::new(),
    }
}

pub fn test_composer() -> Composer {
    Composer::new(test_globals(), SectionTable::stock())
}

/// Minimal page template registered as `base.html`.
pub const PAGE_TEMPLATE: &str =
    "<h1>{{ city }}, {{ state }}</h1><a href=\"{{ page_url }}\">{{ filename }}</a>";

pub fn test_renderer() -> TeraRenderer {
    TeraRenderer::from_raw("base.html", PAGE_TEMPLATE).unwrap()
}

/// Renders [`PAGE_TEMPLATE`] but fails every record whose city matches.
pub struct FailingRenderer {
    fail_city: String,
    inner: TeraRenderer,
}

impl FailingRenderer {
    pub fn new(fail_city: &str) -> Self {
        Self {
            fail_city: fail_city.to_string(),
            inner: test_renderer(),
        }
    }
}

impl Renderer for FailingRenderer {
    fn render(&self, template: &str, context: &PageContext) -> Result<String, RenderError> {
        if context.get_str("city") == Some(self.fail_city.as_str()) {
            return Err(RenderError::Engine {
                template: template.to_string(),
                message: format!("refusing to render {}", self.fail_city),
            });
        }
        self.inner.render(template, context)
    }

    fn has_template(&self, template: &str) -> bool {
        self.inner.has_template(template)
    }
}

/// Renders normally and raises the cancel flag after rendering `city`.
pub struct CancellingRenderer {
    city: String,
    cancel: CancelFlag,
    inner: TeraRenderer,
}

impl CancellingRenderer {
    pub fn new(city: &str, cancel: CancelFlag) -> Self {
        Self {
            city: city.to_string(),
            cancel,
            inner: test_renderer(),
        }
    }
}

impl Renderer for CancellingRenderer {
    fn render(&self, template: &str, context: &PageContext) -> Result<String, RenderError> {
        let html = self.inner.render(template, context)?;
        if context.get_str("city") == Some(self.city.as_str()) {
            self.cancel.cancel();
        }
        Ok(html)
    }

    fn has_template(&self, template: &str) -> bool {
        self.inner.has_template(template)
    }
}

// =========================================================================
// Filesystem
// =========================================================================

/// Names of the regular files directly inside `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
