// In: src/decode/job.rs

//! The Distributed Decode Job.
//!
//! `submit` validates the setup and the stripe schema synchronously, then
//! runs the decode on a background thread that drives a rayon pool with one
//! task per unit. The submitter blocks on [`DecodeJob::wait`].
//!
//! Lifecycle: `Submitted -> Running -> Succeeded | Failed`, or `Cancelled`
//! from either of the first two states.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::DecodeConfig;
use crate::decode::dataset::{assemble, MaterializedDataset};
use crate::decode::stripe_decoder::{decode_unit, plan_units, DecodedPiece};
use crate::error::StripeError;
use crate::format::{FileMetadata, SourceFile};
use crate::schema::inference::resolve_for_decode;
use crate::schema::{render_issues, FrozenSetup, ParseIssue, ParseSetup};
use crate::types::ColumnType;

/// Unique job identifier.
pub type JobId = String;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Job status.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug)]
enum Outcome {
    Pending,
    Dataset(Arc<MaterializedDataset>),
    /// The error is handed to the first waiter; `message` stays for later ones.
    Error {
        error: Option<StripeError>,
        message: String,
    },
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    outcome: Outcome,
}

#[derive(Debug)]
struct JobShared {
    state: Mutex<JobState>,
    finished: Condvar,
    cancel_requested: AtomicBool,
}

impl JobShared {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A submitted decode of one file.
#[derive(Debug)]
pub struct DecodeJob {
    id: JobId,
    setup: FrozenSetup,
    shared: Arc<JobShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DecodeJob {
    /// Opens `path` and submits it.
    pub fn submit_path(
        path: impl AsRef<Path>,
        setup: &ParseSetup,
        config: Arc<DecodeConfig>,
    ) -> Result<Self, StripeError> {
        let source = Arc::new(SourceFile::open(path)?);
        Self::submit(source, setup, config)
    }

    /// Re-validates `setup` against the file and starts the decode.
    ///
    /// File-level problems (`CorruptFile`, `InconsistentStripeSchema`,
    /// `ColumnCountMismatch`) are returned here, before any unit starts.
    /// Rejected overrides become job warnings.
    pub fn submit(
        source: Arc<SourceFile>,
        setup: &ParseSetup,
        config: Arc<DecodeConfig>,
    ) -> Result<Self, StripeError> {
        let id = format!("decode-{:04}", NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed));

        // 1. Metadata and the stripe schema check.
        let metadata = match source.metadata() {
            Ok(metadata) => {
                source.ensure_uniform_stripe_schema(&metadata)?;
                Some(metadata)
            }
            Err(StripeError::EmptyFile(_)) => None,
            Err(e) => return Err(e),
        };

        // 2. Freeze the setup. Warnings are its issues, verbatim.
        let frozen = match &metadata {
            Some(metadata) => resolve_for_decode(metadata, setup, &config)?,
            None => ParseSetup::new(Vec::new(), Vec::new(), setup.errors().to_vec()).freeze(),
        };
        for issue in frozen.issues() {
            log::warn!("{}: {}", id, issue);
        }

        let shared = Arc::new(JobShared {
            state: Mutex::new(JobState {
                status: JobStatus::Submitted,
                outcome: Outcome::Pending,
            }),
            finished: Condvar::new(),
            cancel_requested: AtomicBool::new(false),
        });

        // 3. Hand the work to a background thread.
        let path = source.path().display().to_string();
        let worker = {
            let id = id.clone();
            let shared = Arc::clone(&shared);
            let column_types = frozen.column_types().to_vec();
            std::thread::Builder::new()
                .name(format!("stripefile-{}", id))
                .spawn(move || {
                    if !mark_running(&shared) {
                        return;
                    }
                    let started = Instant::now();
                    let result = match metadata {
                        Some(metadata) => run_decode(
                            &id,
                            &source,
                            &metadata,
                            &column_types,
                            &config,
                            &shared.cancel_requested,
                        ),
                        None => Ok(MaterializedDataset::empty()),
                    };
                    finish(&id, &shared, result, started);
                })?
        };

        log::info!("Submitted {} for {}", id, path);
        Ok(Self {
            id,
            setup: frozen,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.shared.lock().status
    }

    pub fn setup(&self) -> &FrozenSetup {
        &self.setup
    }

    /// Every configuration issue of the submitted setup, unchanged.
    pub fn warnings(&self) -> &[ParseIssue] {
        self.setup.issues()
    }

    /// The warnings rendered exactly like [`render_issues`] renders setup errors.
    pub fn warnings_string(&self) -> String {
        render_issues(self.setup.issues())
    }

    /// Requests cancellation. Has no effect once the job is terminal.
    ///
    /// Returns `true` if this call cancelled the job.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.lock();
        if state.status.is_terminal() {
            return false;
        }
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        state.status = JobStatus::Cancelled;
        self.shared.finished.notify_all();
        log::info!("{} cancelled", self.id);
        true
    }

    /// Blocks until the job is terminal and returns its dataset.
    pub fn wait(&self) -> Result<Arc<MaterializedDataset>, StripeError> {
        let result = {
            let mut state = self.shared.lock();
            while !state.status.is_terminal() {
                state = self
                    .shared
                    .finished
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            let status = state.status;
            match (status, &mut state.outcome) {
                (JobStatus::Cancelled, _) => Err(StripeError::Cancelled(self.id.clone())),
                (_, Outcome::Dataset(dataset)) => Ok(Arc::clone(dataset)),
                (_, Outcome::Error { error, message }) => Err(error.take().unwrap_or_else(|| {
                    StripeError::JobFailed {
                        job: self.id.clone(),
                        message: message.clone(),
                    }
                })),
                (status, Outcome::Pending) => Err(StripeError::InternalError(format!(
                    "{} is {:?} without an outcome",
                    self.id, status
                ))),
            }
        };

        // Reap the worker once it has finished.
        if !matches!(result, Err(StripeError::Cancelled(_))) {
            let handle = self
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::error!("{} worker thread panicked", self.id);
                }
            }
        }
        result
    }
}

/// Moves a submitted job to `Running`. Returns `false` if it was cancelled first.
fn mark_running(shared: &JobShared) -> bool {
    let mut state = shared.lock();
    if state.status != JobStatus::Submitted {
        return false;
    }
    state.status = JobStatus::Running;
    true
}

fn finish(
    id: &str,
    shared: &JobShared,
    result: Result<MaterializedDataset, StripeError>,
    started: Instant,
) {
    let mut state = shared.lock();
    if state.status == JobStatus::Cancelled {
        log::debug!("{} finished after cancellation; result discarded", id);
        return;
    }
    match result {
        Ok(dataset) => {
            log::info!(
                "{} succeeded: {} rows x {} columns in {:.3}s",
                id,
                dataset.num_rows(),
                dataset.num_columns(),
                started.elapsed().as_secs_f64()
            );
            state.status = JobStatus::Succeeded;
            state.outcome = Outcome::Dataset(Arc::new(dataset));
        }
        Err(StripeError::Cancelled(_)) => {
            state.status = JobStatus::Cancelled;
        }
        Err(error) => {
            log::error!("{} failed: {}", id, error);
            state.status = JobStatus::Failed;
            state.outcome = Outcome::Error {
                message: error.to_string(),
                error: Some(error),
            };
        }
    }
    shared.finished.notify_all();
}

//==================================================================================
// The decode itself
//==================================================================================

/// Picks the worker count for `num_units` units: one thread per unit up to
/// twice the core count, otherwise one per core, never above `cap`.
pub(crate) fn resolve_decode_threads(num_units: usize, cap: Option<usize>) -> usize {
    let logical_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let max_threads = logical_threads.saturating_mul(2).max(1);
    let threads_used = if num_units == 0 {
        1
    } else if num_units <= max_threads {
        num_units
    } else {
        logical_threads.max(1)
    };
    match cap {
        Some(cap) => threads_used.min(cap.max(1)),
        None => threads_used,
    }
}

fn run_decode(
    id: &str,
    source: &SourceFile,
    metadata: &FileMetadata,
    column_types: &[ColumnType],
    config: &DecodeConfig,
    cancel_requested: &AtomicBool,
) -> Result<MaterializedDataset, StripeError> {
    // 1. Plan the units and size the pool.
    let threads = resolve_decode_threads(metadata.stripes.len(), config.max_decode_threads);
    let columns_per_split = metadata.columns.len().div_ceil(threads).max(1);
    let units = plan_units(metadata, config.large_stripe_rows, columns_per_split);
    let threads = resolve_decode_threads(units.len(), config.max_decode_threads);
    log_metric!(
        "event" = "decode_plan",
        "job" = id,
        "stripes" = &metadata.stripes.len(),
        "units" = &units.len(),
        "threads" = &threads
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("stripefile-decode-{}", i))
        .build()
        .map_err(|e| StripeError::InternalError(format!("failed to build rayon thread pool: {e}")))?;

    // 2. Decode every unit. Any failure aborts the collect.
    let decoded: Vec<Vec<DecodedPiece>> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                if cancel_requested.load(Ordering::SeqCst) {
                    return Err(StripeError::Cancelled(id.to_string()));
                }
                decode_unit(source, metadata, column_types, unit).map_err(|e| e.in_stripe(unit.stripe))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    if cancel_requested.load(Ordering::SeqCst) {
        return Err(StripeError::Cancelled(id.to_string()));
    }

    // 3. Barrier reached: lay the pieces out as [stripe][column].
    let mut grid: Vec<Vec<Option<DecodedPiece>>> = metadata
        .stripes
        .iter()
        .map(|_| (0..metadata.columns.len()).map(|_| None).collect())
        .collect();
    for (unit, pieces) in units.iter().zip(decoded) {
        for (col, piece) in unit.columns.clone().zip(pieces) {
            grid[unit.stripe][col] = Some(piece);
        }
    }
    let pieces = grid
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|piece| {
                    piece.ok_or_else(|| StripeError::InternalError("a column piece is missing".into()))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    // 4. Merge domains and concatenate.
    assemble(metadata, column_types, pieces)
}
