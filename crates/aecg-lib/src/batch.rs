use crate::config::IndexConfig;
use crate::index::{index_document, AecgDocument, IndexRecord};
use crossbeam_channel::unbounded;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// What happened to one job of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Indexed(Vec<IndexRecord>),
    /// Never started because the batch was cancelled first.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One entry per job, in job order.
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.outcomes.iter().flat_map(|outcome| match outcome {
            JobOutcome::Indexed(rows) => rows.as_slice(),
            JobOutcome::Skipped => &[],
        })
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Skipped))
            .count()
    }
}

/// Index every job on a pool of `cfg.workers` threads.
///
/// `load` turns a job path into a document; its failures become a file-level
/// error row. Workers check `cancel` before starting each job and leave the
/// job skipped once it is set. With `cfg.fail_fast` the first load failure
/// sets `cancel`. Jobs already running always finish.
pub fn index_batch<J, F>(
    jobs: &[J],
    cfg: &IndexConfig,
    cancel: &AtomicBool,
    load: F,
) -> BatchReport
where
    J: AsRef<Path> + Sync,
    F: Fn(&Path) -> anyhow::Result<AecgDocument> + Sync,
{
    let workers = cfg.workers.clamp(1, jobs.len().max(1));
    let (job_tx, job_rx) = unbounded();
    for job in jobs.iter().enumerate() {
        if job_tx.send(job).is_err() {
            break;
        }
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded();
    let load = &load;
    std::thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (i, job) in job_rx.iter() {
                    if cancel.load(Ordering::SeqCst) {
                        continue;
                    }
                    let path = job.as_ref();
                    let rows = match load(path) {
                        Ok(doc) => index_document(&doc, cfg),
                        Err(err) => {
                            warn!("{}: {:#}", path.display(), err);
                            if cfg.fail_fast {
                                cancel.store(true, Ordering::SeqCst);
                            }
                            vec![IndexRecord::file_error(
                                &path.display().to_string(),
                                format!("{:#}", err),
                            )]
                        }
                    };
                    info!("indexed {} ({} rows)", path.display(), rows.len());
                    if result_tx.send((i, rows)).is_err() {
                        break;
                    }
                }
                debug!("worker {} done", worker);
            });
        }
    });
    drop(result_tx);

    let mut outcomes = vec![JobOutcome::Skipped; jobs.len()];
    for (i, rows) in result_rx.try_iter() {
        outcomes[i] = JobOutcome::Indexed(rows);
    }
    let report = BatchReport { outcomes };
    if report.skipped() > 0 {
        warn!("batch cancelled, {} files skipped", report.skipped());
    }
    report
}
