//! Background consolidation ("dream") engine.
//!
//! A batch job over the whole corpus, run detached from the interactive
//! session: deduplication, orphan rescue, then pattern mining. Phases are
//! individually toggleable; a phase failure is logged and the next phase
//! still runs; the store lock is released on exit no matter what.
//!
//! Progress is published on a broadcast stream — bounded, lag-dropping, so
//! a slow or absent subscriber can never block the worker — and mirrored to
//! `tracing` for the detached process's log file.

pub mod dedup;
pub mod mining;
pub mod orphans;
pub mod process;

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::ReverieConfig;
use crate::coordination::lock::StoreLock;
use crate::coordination::{server_guard, store_lock_path};
use crate::error::{Error, Result};

/// Event buffer size. Laggards drop oldest events rather than block.
const EVENT_CAPACITY: usize = 256;

/// Which phases to run.
#[derive(Debug, Clone)]
pub struct DreamOptions {
    pub dedup: bool,
    pub rescue: bool,
    pub mining: bool,
    /// Restrict pattern mining to one tag.
    pub tag_filter: Option<String>,
    /// Refuse to run while the shared server holds the store connection.
    pub check_server: bool,
}

impl Default for DreamOptions {
    fn default() -> Self {
        Self {
            dedup: true,
            rescue: true,
            mining: true,
            tag_filter: None,
            check_server: true,
        }
    }
}

/// One entry on the consolidation log stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DreamEvent {
    Started,
    PhaseStarted { phase: &'static str },
    PhaseCompleted { phase: &'static str, summary: String },
    PhaseFailed { phase: &'static str, error: String },
    Completed { summary: String },
}

/// Fan-out handle for dream progress. Cloneable; every subscriber gets its
/// own bounded queue.
#[derive(Clone)]
pub struct DreamEvents {
    tx: broadcast::Sender<DreamEvent>,
}

impl DreamEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DreamEvent> {
        self.tx.subscribe()
    }

    /// Publish never blocks and never fails: with no subscribers the event
    /// simply evaporates, which is the correct behavior for a detached
    /// worker whose invoker already returned.
    pub fn publish(&self, event: DreamEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for DreamEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Final report from one consolidation run.
#[derive(Debug, Default, Serialize)]
pub struct DreamReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<dedup::DedupReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue: Option<orphans::RescueReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining: Option<mining::MiningReport>,
    /// Phases that failed, by name.
    pub failed_phases: Vec<String>,
}

pub struct DreamWorker {
    config: ReverieConfig,
    events: DreamEvents,
}

impl DreamWorker {
    pub fn new(config: ReverieConfig) -> Self {
        Self {
            config,
            events: DreamEvents::new(),
        }
    }

    pub fn events(&self) -> &DreamEvents {
        &self.events
    }

    /// Lock file coordinating dream workers with each other.
    pub fn dream_lock_path(config: &ReverieConfig) -> PathBuf {
        config.data_dir().join("dream.lock")
    }

    /// Run the full consolidation job.
    ///
    /// Holds two locks for the duration: `dream.lock` (worker-to-worker,
    /// zero wait — a second invocation reports "already running" instead of
    /// queueing) and the store write lock (bounded wait). Both are RAII
    /// guards, so they release on every exit path.
    pub fn run(&self, opts: &DreamOptions) -> Result<DreamReport> {
        // The shared server and the worker must not hold the store at once
        if opts.check_server
            && server_guard::is_server_running(&self.config.server.host, self.config.server.port)
        {
            return Err(Error::Unavailable(format!(
                "shared server is active on port {}; stop it or retry after it exits",
                self.config.server.port
            )));
        }

        let dream_lock = StoreLock::new(Self::dream_lock_path(&self.config));
        let _dream_guard = dream_lock.try_acquire()?.ok_or_else(|| {
            Error::Conflict("a dream worker is already running".into())
        })?;

        let db_path = self.config.resolved_db_path();
        let store_lock = StoreLock::new(store_lock_path(&db_path));
        let _store_guard = store_lock
            .acquire(Duration::from_secs(self.config.coordination.lock_timeout_secs))?;

        self.events.publish(DreamEvent::Started);
        tracing::info!(db = %db_path.display(), "dream worker starting");

        if let Err(e) = self.backup_database() {
            // A failed backup is worth knowing about but not worth aborting for
            tracing::warn!("database backup failed: {e}");
        }

        let mut conn = crate::db::open_database(&db_path)
            .map_err(|e| Error::Unavailable(format!("cannot open store: {e}")))?;

        let mut report = DreamReport::default();

        if opts.dedup {
            self.run_phase("dedup", &mut report.failed_phases, || {
                let result = dedup::run(&mut conn, self.config.dream.dedup_similarity)?;
                let summary = format!(
                    "{} pairs checked, {} supersedes edges created",
                    result.pairs_checked, result.edges_created
                );
                report.dedup = Some(result);
                Ok(summary)
            });
        }

        if opts.rescue {
            self.run_phase("rescue", &mut report.failed_phases, || {
                let result = orphans::run(&mut conn, self.config.dream.rescue_floor)?;
                let summary = format!(
                    "{} orphans found, {} rescued",
                    result.orphans_found, result.rescued
                );
                report.rescue = Some(result);
                Ok(summary)
            });
        }

        if opts.mining {
            self.run_phase("mining", &mut report.failed_phases, || {
                let result = mining::run(
                    &mut conn,
                    &mining::MiningOptions {
                        tag_filter: opts.tag_filter.clone(),
                        min_cluster_size: self.config.dream.min_cluster_size,
                        cohesion_floor: self.config.dream.cohesion_floor,
                    },
                )?;
                let summary = format!(
                    "{} clusters, {} patterns created, {} reinforced, {} memories linked",
                    result.clusters_found,
                    result.patterns_created,
                    result.patterns_reinforced,
                    result.memories_linked
                );
                report.mining = Some(result);
                Ok(summary)
            });
        }

        let summary = if report.failed_phases.is_empty() {
            "consolidation complete".to_string()
        } else {
            format!(
                "consolidation complete with failed phases: {}",
                report.failed_phases.join(", ")
            )
        };
        tracing::info!("{summary}");
        self.events.publish(DreamEvent::Completed { summary });

        Ok(report)
    }

    /// Run one phase, converting failure into a logged event instead of an
    /// abort — later phases still get their turn.
    fn run_phase(
        &self,
        phase: &'static str,
        failed: &mut Vec<String>,
        body: impl FnOnce() -> Result<String>,
    ) {
        tracing::info!(phase, "dream phase starting");
        self.events.publish(DreamEvent::PhaseStarted { phase });
        match body() {
            Ok(summary) => {
                tracing::info!(phase, %summary, "dream phase complete");
                self.events
                    .publish(DreamEvent::PhaseCompleted { phase, summary });
            }
            Err(e) => {
                tracing::warn!(phase, error = %e, "dream phase failed");
                failed.push(phase.to_string());
                self.events.publish(DreamEvent::PhaseFailed {
                    phase,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Snapshot the store file into `backups/`, keeping the most recent N.
    fn backup_database(&self) -> Result<()> {
        let db_path = self.config.resolved_db_path();
        if !db_path.exists() {
            tracing::info!("no database file yet, skipping backup");
            return Ok(());
        }

        let backup_dir = self.config.data_dir().join("backups");
        std::fs::create_dir_all(&backup_dir)
            .map_err(|e| Error::Internal(format!("failed to create backup dir: {e}")))?;

        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let file_name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "memory.db".into());
        let backup_path = backup_dir.join(format!("{file_name}_{stamp}"));

        std::fs::copy(&db_path, &backup_path)
            .map_err(|e| Error::Internal(format!("backup copy failed: {e}")))?;
        tracing::info!(backup = %backup_path.display(), "database backup created");

        // Rotate: newest first, drop the rest
        let mut backups: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(&backup_dir)
            .map_err(|e| Error::Internal(format!("cannot list backups: {e}")))?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(&file_name) {
                    return None;
                }
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.path()))
            })
            .collect();
        backups.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, old) in backups.into_iter().skip(self.config.dream.max_backups) {
            if let Err(e) = std::fs::remove_file(&old) {
                tracing::warn!(path = %old.display(), "failed to remove old backup: {e}");
            } else {
                tracing::info!(path = %old.display(), "removed old backup");
            }
        }

        Ok(())
    }
}
