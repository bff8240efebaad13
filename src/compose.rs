//! Per-record template context assembly.
//!
//! [`Composer`] holds everything that is the same for every page of a run,
//! the site globals and the section boilerplate, and turns one [`Record`]
//! into the [`PageContext`] handed to the renderer.
//!
//! ## Context keys
//!
//! ```text
//! city, state, latitude, longitude        record identity and map position
//! hero_content, city_intro                record introduction texts
//! <section>_static_content                shared boilerplate (4 sections)
//! <section>_dynamic_content               the row's own text (4 sections)
//! sections                                { <key>: { name, section } }
//! page_url, filename                      canonical URL and output file
//! form_endpoint, recaptcha_site_key,
//! sentry_dsn, ga_tracking_id,
//! site_domain, current_year               site globals
//! <any key from [site.variables]>         extra site globals
//! ```
//!
//! Globals are inserted first and record-derived keys after, so on a name
//! clash the record wins.

use crate::config::SiteConfig;
use crate::dataset::Record;
use crate::sections::{Section, SectionTable};
use crate::slug::find_unsafe_char;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("{0} column is not valid UTF-8")]
    InvalidEncoding(String),
    #[error("{0} is blank")]
    BlankField(&'static str),
    #[error("{field} {value:?} contains {ch:?}, which cannot appear in a page filename")]
    UnsafeFilenameChar {
        field: &'static str,
        value: String,
        ch: char,
    },
    #[error("{field} is not a number: {value:?}")]
    InvalidCoordinate { field: &'static str, value: String },
    #[error("{field} {value} is outside [-{limit}, {limit}]")]
    CoordinateOutOfRange {
        field: &'static str,
        value: f64,
        limit: f64,
    },
}

/// Site-wide values merged into every page.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGlobals {
    pub domain: String,
    pub form_endpoint: String,
    pub recaptcha_site_key: String,
    pub sentry_dsn: String,
    pub ga_tracking_id: String,
    pub current_year: i32,
    pub variables: BTreeMap<String, String>,
}

impl SiteGlobals {
    pub fn from_config(config: &SiteConfig, current_year: i32) -> Self {
        let site = &config.site;
        Self {
            domain: site.domain.trim_end_matches('/').to_string(),
            form_endpoint: site.form_endpoint.clone(),
            recaptcha_site_key: site.recaptcha_site_key.clone(),
            sentry_dsn: site.sentry_dsn.clone(),
            ga_tracking_id: site.ga_tracking_id.clone(),
            current_year,
            variables: site.variables.clone(),
        }
    }

    /// Canonical URL of a page file.
    pub fn page_url(&self, filename: &str) -> String {
        format!("{}/{}", self.domain, filename)
    }

    fn insert_into(&self, values: &mut Map<String, Value>) {
        for (key, value) in &self.variables {
            values.insert(key.clone(), Value::String(value.clone()));
        }
        values.insert("form_endpoint".into(), json!(self.form_endpoint));
        values.insert("recaptcha_site_key".into(), json!(self.recaptcha_site_key));
        values.insert("sentry_dsn".into(), json!(self.sentry_dsn));
        values.insert("ga_tracking_id".into(), json!(self.ga_tracking_id));
        values.insert("site_domain".into(), json!(self.domain));
        values.insert("current_year".into(), json!(self.current_year));
    }
}

/// The complete set of values bound into the page template for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    values: Map<String, Value>,
}

impl PageContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Read-only per-run state shared by every page.
#[derive(Debug, Clone)]
pub struct Composer {
    globals: SiteGlobals,
    sections: SectionTable,
}

impl Composer {
    pub fn new(globals: SiteGlobals, sections: SectionTable) -> Self {
        Self { globals, sections }
    }

    pub fn globals(&self) -> &SiteGlobals {
        &self.globals
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    /// Build the context for `record`, whose output file is `filename`.
    pub fn compose(&self, record: &Record, filename: &str) -> Result<PageContext, CompositionError> {
        if let Some(column) = &record.undecodable {
            return Err(CompositionError::InvalidEncoding(column.clone()));
        }
        require_name("city", &record.city)?;
        require_name("state", &record.state)?;
        let latitude = parse_coordinate("latitude", &record.latitude, 90.0)?;
        let longitude = parse_coordinate("longitude", &record.longitude, 180.0)?;

        let mut values = Map::new();
        self.globals.insert_into(&mut values);

        values.insert("city".into(), json!(record.city));
        values.insert("state".into(), json!(record.state));
        values.insert("latitude".into(), json!(latitude));
        values.insert("longitude".into(), json!(longitude));
        values.insert("hero_content".into(), json!(record.introduction));
        values.insert("city_intro".into(), json!(record.city_intro));

        let mut sections = Map::new();
        for section in Section::ALL {
            values.insert(
                format!("{}_static_content", section.key()),
                json!(self.sections.text(section)),
            );
            values.insert(
                format!("{}_dynamic_content", section.key()),
                json!(record.dynamic_content(section)),
            );
            sections.insert(
                section.key().to_string(),
                json!({ "name": section.display_name(), "section": section.key() }),
            );
        }
        values.insert("sections".into(), Value::Object(sections));

        values.insert("page_url".into(), json!(self.globals.page_url(filename)));
        values.insert("filename".into(), json!(filename));

        Ok(PageContext { values })
    }
}

/// City and state end up in the filename, so they must be non-blank and
/// free of path or URL syntax.
fn require_name(field: &'static str, value: &str) -> Result<(), CompositionError> {
    if value.trim().is_empty() {
        return Err(CompositionError::BlankField(field));
    }
    match find_unsafe_char(value) {
        Some(ch) => Err(CompositionError::UnsafeFilenameChar {
            field,
            value: value.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

fn parse_coordinate(field: &'static str, raw: &str, limit: f64) -> Result<f64, CompositionError> {
    let value: f64 = raw
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| CompositionError::InvalidCoordinate {
            field,
            value: raw.to_string(),
        })?;
    if value.abs() > limit {
        return Err(CompositionError::CoordinateOutOfRange {
            field,
            value,
            limit,
        });
    }
    Ok(value)
}
