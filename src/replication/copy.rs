// ABOUTME: Scan, transform and write loop that moves records between tables
// ABOUTME: Retries unprocessed writes with linear backoff and threads progress explicitly

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor;
use crate::error::{CopyError, Result};
use crate::plan::{CopyPlan, ResumePoint};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::retry::{pause, write_backoff};
use crate::store::{Cursor, Item, TableStore};

/// Records requested per scan, and therefore the largest batch ever written.
pub const PAGE_SIZE: i32 = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyProgress {
    /// Where the next scan starts; `None` before the first page.
    pub cursor: Option<Cursor>,
    pub copied: u64,
    /// Resets to zero after every fully accepted write.
    pub consecutive_retries: u32,
    pub scans: u64,
    pub writes: u64,
    /// Set once the source reported no further page.
    pub exhausted: bool,
}

impl CopyProgress {
    pub fn starting_at(resume: Option<&ResumePoint>) -> Self {
        match resume {
            Some(point) => Self {
                cursor: Some(point.cursor.clone()),
                copied: point.copied,
                ..Default::default()
            },
            None => Self::default(),
        }
    }
}

pub struct CopyEngine<'a> {
    source: &'a dyn TableStore,
    destination: &'a dyn TableStore,
    plan: &'a CopyPlan,
    reporter: &'a dyn ProgressReporter,
    cancel: &'a CancellationToken,
}

impl<'a> CopyEngine<'a> {
    pub fn new(
        plan: &'a CopyPlan,
        source: &'a dyn TableStore,
        destination: &'a dyn TableStore,
        reporter: &'a dyn ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            destination,
            plan,
            reporter,
            cancel,
        }
    }

    /// Copy pages until the source is exhausted.
    ///
    /// On failure the last fully copied position is logged so the run can be
    /// resumed from it.
    pub async fn run(&self, start: CopyProgress) -> Result<CopyProgress> {
        info!(
            source = %self.plan.source_table,
            destination = %self.plan.destination_table,
            resumed = start.cursor.is_some(),
            "Starting data copy"
        );

        let mut progress = start;
        while !progress.exhausted {
            let resume_cursor = progress
                .cursor
                .as_ref()
                .map(|c| cursor::encode(c).to_string())
                .unwrap_or_else(|| "<start>".to_string());
            let resume_copied = progress.copied;

            progress = match self.copy_page(progress).await {
                Ok(next) => next,
                Err(err) => {
                    error!(
                        error = %err,
                        resume_cursor = %resume_cursor,
                        copied = resume_copied,
                        "Copy aborted"
                    );
                    return Err(err);
                }
            };
        }

        info!(
            copied = progress.copied,
            scans = progress.scans,
            writes = progress.writes,
            "Data copy complete"
        );
        self.reporter.report(&ProgressEvent::Finished {
            copied: progress.copied,
        });
        Ok(progress)
    }

    /// One scan, transform and write round. Advances the cursor only after the
    /// page has been fully written.
    pub async fn copy_page(&self, progress: CopyProgress) -> Result<CopyProgress> {
        if self.cancel.is_cancelled() {
            return Err(CopyError::Cancelled {
                operation: "scan",
                table: self.plan.source_table.clone(),
            });
        }

        let page = self
            .source
            .scan(&self.plan.source_table, PAGE_SIZE, progress.cursor.clone())
            .await?;
        debug!(
            items = page.items.len(),
            more = page.next_cursor.is_some(),
            "Scanned page"
        );

        let batch = self.transform(page.items);
        let progress = self
            .write_batch(
                CopyProgress {
                    scans: progress.scans + 1,
                    ..progress
                },
                batch,
            )
            .await?;

        Ok(CopyProgress {
            exhausted: page.next_cursor.is_none(),
            cursor: page.next_cursor,
            ..progress
        })
    }

    fn transform(&self, items: Vec<Item>) -> Vec<Item> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.plan.transform.apply(item, index))
            .collect()
    }

    /// Write `batch`, resubmitting whatever the store leaves unprocessed until
    /// everything is accepted. A failed write call is fatal and not retried.
    async fn write_batch(
        &self,
        mut progress: CopyProgress,
        mut batch: Vec<Item>,
    ) -> Result<CopyProgress> {
        let table = self.plan.destination_table.as_str();
        let mut attempts = 0u32;

        while !batch.is_empty() {
            let submitted = batch.len();
            let unprocessed = self.destination.batch_write(table, batch).await?;
            progress.writes += 1;
            attempts += 1;

            let accepted = submitted.saturating_sub(unprocessed.len());
            progress.copied += accepted as u64;

            if unprocessed.is_empty() {
                progress.consecutive_retries = 0;
                self.report_copied(&progress);
                break;
            }

            progress.consecutive_retries += 1;
            self.report_copied(&progress);

            if let Some(max) = self.plan.retry.max_write_retries {
                if attempts > max {
                    return Err(CopyError::Timeout {
                        operation: "batch_write",
                        table: table.to_string(),
                        attempts,
                    });
                }
            }

            let delay = write_backoff(progress.consecutive_retries);
            warn!(
                unprocessed = unprocessed.len(),
                retry = progress.consecutive_retries,
                delay_ms = delay.as_millis() as u64,
                "Destination left items unprocessed, retrying"
            );
            pause(delay, self.cancel, "batch_write", table).await?;
            batch = unprocessed;
        }

        Ok(progress)
    }

    fn report_copied(&self, progress: &CopyProgress) {
        self.reporter.report(&ProgressEvent::Copied {
            copied: progress.copied,
        });
    }
}
