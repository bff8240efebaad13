//! # City Pages
//!
//! A batch generator for location landing pages. Every row of a CSV dataset
//! (a city, its state, coordinates, and per-section marketing text) becomes
//! one static HTML page, rendered through a shared template and written to a
//! flat output directory ready for upload.
//!
//! # Architecture: One Pass, Four Steps per Record
//!
//! ```text
//! dataset.csv ─► schema check ─► for each record:
//!                                  filename  (slug)
//!                                  context   (compose: record + site globals + section boilerplate)
//!                                  html      (render: Tera template)
//!                                  write     (generate: atomic, skip if unchanged)
//! ```
//!
//! The schema check is all-or-nothing: a dataset missing a required column
//! produces no output at all. After that, each record succeeds or fails on
//! its own, and the failure policy decides whether one bad record stops the
//! run or is just reported.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`dataset`] | CSV loading, required-column validation, the typed [`dataset::Record`] |
//! | [`slug`] | Deterministic `steel-buildings-<city>-<state>.html` filenames and duplicate detection |
//! | [`sections`] | The four page sections and their shared boilerplate |
//! | [`compose`] | Builds each record's template context from record, globals and boilerplate |
//! | [`render`] | The [`render::Renderer`] seam and its Tera implementation |
//! | [`generate`] | Batching, failure policy, parallel rendering, atomic writes, run summary |
//! | [`config`] | Layered `config.toml` + environment configuration and validation |
//! | [`output`] | CLI output formatting for build progress, summaries and checks |
//! | [`types`] | Record identity and failure types shared across modules |
//!
//! # Design Decisions
//!
//! ## Runtime Templates
//!
//! Pages are rendered with [Tera](https://keats.github.io/tera/) from a
//! templates directory loaded at startup. Designers edit HTML without a
//! rebuild, and a template that references an unknown variable fails the
//! page loudly instead of shipping an empty hole. Tera autoescapes `.html`
//! templates, so dataset text cannot inject markup.
//!
//! ## Deterministic Output
//!
//! The same dataset, templates and config produce byte-identical files. The
//! only time-dependent value, `current_year`, is resolved once per run. Files
//! whose bytes are unchanged are not rewritten, so an upload step that syncs
//! by modification time only ships real changes.
//!
//! ## Duplicate Filenames
//!
//! Two rows that slug to the same filename would silently overwrite each
//! other. Collisions are found before anything renders. The default keeps the
//! page of the last record that succeeds and reports the rest as superseded;
//! `on_duplicate = "reject"` refuses the whole run instead.

pub mod compose;
pub mod config;
pub mod dataset;
pub mod generate;
pub mod output;
pub mod render;
pub mod sections;
pub mod slug;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
