//! Batched page generation.
//!
//! Drives every record of a validated [`Dataset`] through the pipeline:
//!
//! ```text
//! record ──► filename (SlugPlan) ──► PageContext (Composer) ──► HTML (Renderer) ──► <output>/<filename>
//! ```
//!
//! ## Batches
//!
//! Records are split into consecutive, non-overlapping batches in dataset
//! order (default 100 per batch; the last one may be smaller). Batches are
//! the unit of progress reporting: each produces a [`BatchResult`] and a
//! pair of log lines with its index, row range, and success/failure counts.
//!
//! ## Failure policy
//!
//! - [`FailurePolicy::Abort`]: records run one at a time; the first failure
//!   stops the run with [`GenerateError::Aborted`]. Nothing after the failing
//!   record is written.
//! - [`FailurePolicy::Continue`]: records inside a batch are rendered in
//!   parallel with [rayon](https://docs.rs/rayon); failures are collected
//!   into the batch result and the run carries on.
//!
//! Outcomes are always folded in dataset order, so counts, failure lists and
//! log order never depend on thread scheduling.
//!
//! ## Output files
//!
//! Pages are written through a temporary file in the output directory and
//! renamed into place: a cancelled or crashed run never leaves half a page.
//! A page whose bytes already match the file on disk is not rewritten, which
//! keeps modification times stable for the upload step.
//!
//! Duplicate filenames are resolved before anything renders (see
//! [`crate::slug`]). Under [`DuplicatePolicy::Overwrite`] earlier duplicates
//! are still rendered, so their errors surface, but only the last one writes.
//! The latest successful earlier rendering is held back until the last
//! record is done: if that record fails, or the run ends before reaching it,
//! the held page is written instead, so a filename never loses every page.
//!
//! ## Cancellation
//!
//! A [`CancelFlag`] stops scheduling new records. Records already being
//! rendered finish, including their write.

use crate::compose::{CompositionError, Composer};
use crate::config::{DuplicatePolicy, FailurePolicy, GenerationConfig};
use crate::dataset::Dataset;
use crate::render::{RenderError, Renderer};
use crate::slug::{SlugCollision, SlugPlan};
use crate::types::{PageFailure, RecordId};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why a single record produced no page.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template '{0}' not found")]
    MissingTemplate(String),
    #[error("{} output filename(s) claimed by more than one record", .0.len())]
    DuplicateSlugs(Vec<SlugCollision>),
    #[error("generation aborted at {record}: {source}")]
    Aborted {
        record: RecordId,
        source: PageError,
        /// Everything processed up to and including the failing record.
        summary: Box<RunSummary>,
    },
}

/// Run settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub template: String,
    pub batch_size: usize,
    pub on_error: FailurePolicy,
    pub on_duplicate: DuplicatePolicy,
}

impl GenerateOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            template: config.template.clone(),
            batch_size: config.batch_size,
            on_error: config.on_error,
            on_duplicate: config.on_duplicate,
        }
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

/// A consecutive slice of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based batch number.
    pub index: usize,
    /// Dataset indices covered.
    pub range: Range<usize>,
}

impl Batch {
    /// 1-based row number of the first record.
    pub fn first_row(&self) -> usize {
        self.range.start + 1
    }

    /// 1-based row number of the last record.
    pub fn last_row(&self) -> usize {
        self.range.end
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Split `total` records into batches of `batch_size` (at least 1).
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .enumerate()
        .map(|(i, start)| Batch {
            index: i + 1,
            range: start..(start + size).min(total),
        })
        .collect()
}

/// What happened to a successfully processed record's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// File created or replaced.
    Written,
    /// File already had identical contents; left untouched.
    Unchanged,
    /// Rendered, but a later record wrote the same filename.
    Superseded,
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub index: usize,
    pub range: Range<usize>,
    /// Records that were started (cancellation may leave some unattempted).
    pub attempted: usize,
    /// Records that rendered without error, whatever their [`WriteStatus`].
    pub succeeded: usize,
    pub unchanged: usize,
    pub superseded: usize,
    /// Failing records in dataset order.
    pub failures: Vec<PageFailure>,
}

impl BatchResult {
    fn new(batch: &Batch) -> Self {
        Self {
            index: batch.index,
            range: batch.range.clone(),
            attempted: 0,
            succeeded: 0,
            unchanged: 0,
            superseded: 0,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub total_records: usize,
    /// Distinct output files the dataset maps to.
    pub unique_files: usize,
    pub batches: Vec<BatchResult>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.batches.iter().map(|b| b.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    pub fn unchanged(&self) -> usize {
        self.batches.iter().map(|b| b.unchanged).sum()
    }

    pub fn superseded(&self) -> usize {
        self.batches.iter().map(|b| b.superseded).sum()
    }

    /// Files created or replaced during this run.
    pub fn written(&self) -> usize {
        self.succeeded() - self.unchanged() - self.superseded()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failed()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PageFailure> {
        self.batches.iter().flat_map(|b| b.failures.iter())
    }

    /// Every record attempted and none failed.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed() == 0 && self.attempted() == self.total_records
    }
}

/// Result of a dry run over the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub records: usize,
    pub unique_files: usize,
    pub collisions: Vec<SlugCollision>,
    /// Records that would fail, in dataset order.
    pub failures: Vec<PageFailure>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Cooperative stop signal shared with the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications for a CLI front end.
#[derive(Debug, Clone)]
pub enum GenerateEvent {
    RunStarted {
        total: usize,
        batch_size: usize,
        batches: usize,
    },
    BatchStarted {
        index: usize,
        first_row: usize,
        last_row: usize,
    },
    PageGenerated {
        record: RecordId,
        filename: String,
        status: WriteStatus,
    },
    PageFailed(PageFailure),
    BatchCompleted(BatchResult),
    Cancelled {
        remaining: usize,
    },
}

/// A successfully rendered record.
enum Processed {
    Finished(WriteStatus),
    /// Rendered, but a later record owns the filename. The page is held
    /// until that record succeeds.
    Deferred(String),
}

type RecordOutcome = Result<Processed, PageError>;

/// Held pages of superseded duplicates, by filename: dataset index and HTML
/// of the latest successful claimant.
type HeldPages = BTreeMap<String, (usize, String)>;

/// Drives a dataset through compose → render → write.
pub struct Generator<'a, R: Renderer> {
    composer: &'a Composer,
    renderer: &'a R,
    output_dir: &'a Path,
    options: GenerateOptions,
    cancel: CancelFlag,
    events: Option<Sender<GenerateEvent>>,
}

impl<'a, R: Renderer> Generator<'a, R> {
    pub fn new(
        composer: &'a Composer,
        renderer: &'a R,
        output_dir: &'a Path,
        options: GenerateOptions,
    ) -> Self {
        Self {
            composer,
            renderer,
            output_dir,
            options,
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Sender<GenerateEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Generate a page for every record of `dataset`.
    pub fn run(&self, dataset: &Dataset) -> Result<RunSummary, GenerateError> {
        let template = &self.options.template;
        if !self.renderer.has_template(template) {
            return Err(GenerateError::MissingTemplate(template.clone()));
        }

        let plan = SlugPlan::new(&dataset.records);
        self.check_collisions(&plan)?;

        fs::create_dir_all(self.output_dir).map_err(|source| GenerateError::OutputDir {
            path: self.output_dir.to_path_buf(),
            source,
        })?;

        let batches = plan_batches(dataset.len(), self.options.batch_size);
        tracing::info!(
            total = dataset.len(),
            batch_size = self.options.batch_size,
            batches = batches.len(),
            "starting page generation"
        );
        self.emit(GenerateEvent::RunStarted {
            total: dataset.len(),
            batch_size: self.options.batch_size,
            batches: batches.len(),
        });

        let mut summary = RunSummary {
            total_records: dataset.len(),
            unique_files: plan.unique_count(),
            ..RunSummary::default()
        };
        let mut held = HeldPages::new();

        for batch in &batches {
            if self.cancel.is_cancelled() {
                break;
            }
            tracing::info!(
                batch = batch.index,
                first = batch.first_row(),
                last = batch.last_row(),
                "processing batch"
            );
            self.emit(GenerateEvent::BatchStarted {
                index: batch.index,
                first_row: batch.first_row(),
                last_row: batch.last_row(),
            });

            let outcomes = match self.options.on_error {
                FailurePolicy::Abort => self.run_sequential(dataset, &plan, batch),
                FailurePolicy::Continue => self.run_parallel(dataset, &plan, batch),
            };

            let mut result = BatchResult::new(batch);
            let mut abort = None;
            for (idx, outcome) in outcomes {
                let record = dataset.records[idx].id();
                result.attempted += 1;
                match outcome {
                    Ok(processed) => {
                        let filename = plan.filename(idx);
                        let status = match processed {
                            Processed::Finished(status) => {
                                held.remove(filename);
                                status
                            }
                            Processed::Deferred(html) => {
                                held.insert(filename.to_string(), (idx, html));
                                WriteStatus::Superseded
                            }
                        };
                        result.succeeded += 1;
                        match status {
                            WriteStatus::Unchanged => result.unchanged += 1,
                            WriteStatus::Superseded => result.superseded += 1,
                            WriteStatus::Written => {}
                        }
                        tracing::info!(
                            city = %record.city,
                            state = %record.state,
                            file = plan.filename(idx),
                            ?status,
                            "generated page"
                        );
                        self.emit(GenerateEvent::PageGenerated {
                            record,
                            filename: plan.filename(idx).to_string(),
                            status,
                        });
                    }
                    Err(err) => {
                        tracing::error!(
                            city = %record.city,
                            state = %record.state,
                            row = record.row,
                            error = %err,
                            "page generation failed"
                        );
                        let failure = PageFailure {
                            record: record.clone(),
                            reason: err.to_string(),
                        };
                        result.failures.push(failure.clone());
                        self.emit(GenerateEvent::PageFailed(failure));
                        if self.options.on_error == FailurePolicy::Abort {
                            abort = Some((record, err));
                        }
                    }
                }
            }

            tracing::info!(
                batch = batch.index,
                attempted = result.attempted,
                succeeded = result.succeeded,
                failed = result.failed(),
                "completed batch"
            );
            self.emit(GenerateEvent::BatchCompleted(result.clone()));
            summary.batches.push(result);

            if let Some((record, source)) = abort {
                self.write_held_pages(dataset, held, &mut summary);
                tracing::error!(record = %record, "aborting run");
                return Err(GenerateError::Aborted {
                    record,
                    source,
                    summary: Box::new(summary),
                });
            }
        }

        self.write_held_pages(dataset, held, &mut summary);

        if self.cancel.is_cancelled() && summary.attempted() < summary.total_records {
            summary.cancelled = true;
            let remaining = summary.total_records - summary.attempted();
            tracing::warn!(remaining, "generation cancelled");
            self.emit(GenerateEvent::Cancelled { remaining });
        }

        tracing::info!(
            attempted = summary.attempted(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "page generation finished"
        );
        Ok(summary)
    }

    /// Compose and render every record without writing anything.
    ///
    /// Duplicate filenames are reported rather than rejected, whatever the
    /// duplicate policy.
    pub fn check(&self, dataset: &Dataset) -> Result<CheckReport, GenerateError> {
        let template = &self.options.template;
        if !self.renderer.has_template(template) {
            return Err(GenerateError::MissingTemplate(template.clone()));
        }
        let plan = SlugPlan::new(&dataset.records);
        let failures: Vec<PageFailure> = (0..dataset.len())
            .into_par_iter()
            .filter_map(|idx| {
                let record = &dataset.records[idx];
                let result = self
                    .composer
                    .compose(record, plan.filename(idx))
                    .map_err(PageError::from)
                    .and_then(|ctx| {
                        self.renderer
                            .render(template, &ctx)
                            .map_err(PageError::from)
                    });
                result.err().map(|err| PageFailure {
                    record: record.id(),
                    reason: err.to_string(),
                })
            })
            .collect();
        tracing::info!(
            records = dataset.len(),
            failed = failures.len(),
            collisions = plan.collisions().len(),
            "check finished"
        );
        Ok(CheckReport {
            records: dataset.len(),
            unique_files: plan.unique_count(),
            collisions: plan.collisions().to_vec(),
            failures,
        })
    }

    fn check_collisions(&self, plan: &SlugPlan) -> Result<(), GenerateError> {
        let collisions = plan.collisions();
        if collisions.is_empty() {
            return Ok(());
        }
        match self.options.on_duplicate {
            DuplicatePolicy::Reject => {
                for collision in collisions {
                    tracing::error!(
                        file = %collision.filename,
                        records = collision.records.len(),
                        "duplicate output filename"
                    );
                }
                Err(GenerateError::DuplicateSlugs(collisions.to_vec()))
            }
            DuplicatePolicy::Overwrite => {
                for collision in collisions {
                    tracing::warn!(
                        file = %collision.filename,
                        records = collision.records.len(),
                        "duplicate output filename; last successful record wins"
                    );
                }
                Ok(())
            }
        }
    }

    /// One record at a time, stopping after the first failure or on cancel.
    fn run_sequential(&self, dataset: &Dataset, plan: &SlugPlan, batch: &Batch) -> Vec<(usize, RecordOutcome)> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for idx in batch.range.clone() {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.process_record(dataset, plan, idx);
            let failed = outcome.is_err();
            outcomes.push((idx, outcome));
            if failed {
                break;
            }
        }
        outcomes
    }

    /// All records of the batch on the rayon pool; results in dataset order.
    ///
    /// Records reached after cancellation are left out.
    fn run_parallel(&self, dataset: &Dataset, plan: &SlugPlan, batch: &Batch) -> Vec<(usize, RecordOutcome)> {
        batch
            .range
            .clone()
            .into_par_iter()
            .filter_map(|idx| {
                if self.cancel.is_cancelled() {
                    None
                } else {
                    Some((idx, self.process_record(dataset, plan, idx)))
                }
            })
            .collect()
    }

    fn process_record(&self, dataset: &Dataset, plan: &SlugPlan, idx: usize) -> RecordOutcome {
        let record = &dataset.records[idx];
        let filename = plan.filename(idx);
        let context = self.composer.compose(record, filename)?;
        let html = self.renderer.render(&self.options.template, &context)?;
        if !plan.owns_file(idx) {
            return Ok(Processed::Deferred(html));
        }
        Ok(Processed::Finished(write_page(self.output_dir, filename, &html)?))
    }

    /// Write pages whose owning record failed or was never attempted.
    ///
    /// The held record's counts move from superseded to written (or
    /// unchanged) in its batch; a write failure turns it into a failure.
    fn write_held_pages(&self, dataset: &Dataset, held: HeldPages, summary: &mut RunSummary) {
        for (filename, (idx, html)) in held {
            let Some(batch) = summary.batches.iter_mut().find(|b| b.range.contains(&idx)) else {
                continue;
            };
            let record = dataset.records[idx].id();
            batch.superseded -= 1;
            match write_page(self.output_dir, &filename, &html) {
                Ok(status) => {
                    if status == WriteStatus::Unchanged {
                        batch.unchanged += 1;
                    }
                    tracing::warn!(
                        record = %record,
                        file = %filename,
                        "later duplicate produced no page; keeping this record's page"
                    );
                    self.emit(GenerateEvent::PageGenerated {
                        record,
                        filename,
                        status,
                    });
                }
                Err(err) => {
                    batch.succeeded -= 1;
                    let err = PageError::from(err);
                    tracing::error!(record = %record, error = %err, "page generation failed");
                    let failure = PageFailure {
                        record,
                        reason: err.to_string(),
                    };
                    batch.failures.push(failure.clone());
                    batch.failures.sort_by_key(|f| f.record.row);
                    self.emit(GenerateEvent::PageFailed(failure));
                }
            }
        }
    }

    fn emit(&self, event: GenerateEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching progress.
            let _ = tx.send(event);
        }
    }
}

/// Write `content` to `<dir>/<filename>` atomically.
///
/// Returns [`WriteStatus::Unchanged`] without touching the file when it
/// already holds exactly `content`.
pub fn write_page(dir: &Path, filename: &str, content: &str) -> Result<WriteStatus, WriteError> {
    let path = dir.join(filename);
    if fs::read(&path).is_ok_and(|existing| existing == content.as_bytes()) {
        return Ok(WriteStatus::Unchanged);
    }

    fs::create_dir_all(dir).map_err(|source| WriteError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let write_err = |source| WriteError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(write_err)?;
    }
    tmp.persist(&path).map_err(|e| write_err(e.error))?;
    Ok(WriteStatus::Written)
}
