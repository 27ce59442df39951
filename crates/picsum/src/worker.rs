use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{debug, warn};

use crate::{CancelToken, FetchError, FetchRequest, ImageSource, ShutdownFlag};

/// What a worker hands back exactly once when its fetch ends.
#[derive(Debug)]
pub struct FetchReport {
    pub request: FetchRequest,
    pub buffer: Vec<u8>,
    pub result: Result<(), FetchError>,
    pub elapsed: Duration,
}

impl FetchReport {
    fn lost(request: FetchRequest, elapsed: Duration) -> Self {
        Self {
            request,
            buffer: Vec::new(),
            result: Err(FetchError::WorkerLost),
            elapsed,
        }
    }
}

/// One in-flight fetch: the worker thread plus its one-shot completion channel.
///
/// Dropping a job cancels it and joins the worker, so no thread outlives the
/// tile that started it.
pub struct FetchJob {
    label: String,
    request: FetchRequest,
    started_at: Instant,
    cancel: CancelToken,
    done: Receiver<FetchReport>,
    handle: Option<JoinHandle<()>>,
}

impl FetchJob {
    pub fn spawn(
        source: Arc<dyn ImageSource>,
        request: FetchRequest,
        shutdown: &ShutdownFlag,
        label: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let label = label.into();
        let cancel = CancelToken::new(shutdown.clone());
        let (done_tx, done_rx) = bounded(1);
        let worker_cancel = cancel.clone();
        let started_at = Instant::now();

        let handle = thread::Builder::new()
            .name(format!("picsum-{label}"))
            .spawn(move || {
                let mut buffer = Vec::new();
                let result = source.fetch_into(&request, &mut buffer, &worker_cancel);
                let report = FetchReport {
                    request,
                    buffer,
                    result,
                    elapsed: started_at.elapsed(),
                };
                let _ = done_tx.send(report);
            })
            .map_err(FetchError::ResourceExhaustion)?;

        debug!(
            job = %label,
            width = request.width,
            height = request.height,
            "spawned fetch worker"
        );

        Ok(Self {
            label,
            request,
            started_at,
            cancel,
            done: done_rx,
            handle: Some(handle),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn request(&self) -> FetchRequest {
        self.request
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Completion channel, for callers that block in a `Select`.
    pub fn receiver(&self) -> &Receiver<FetchReport> {
        &self.done
    }

    /// Asks the worker to wind down without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking check for the completion report.
    pub fn try_complete(&self) -> Option<FetchReport> {
        match self.done.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!(job = %self.label, "fetch worker exited without a report");
                Some(FetchReport::lost(self.request, self.started_at.elapsed()))
            }
        }
    }

    /// Cancels, waits for the report and joins the worker.
    pub fn finish(mut self) -> FetchReport {
        self.cancel.cancel();
        let report = self
            .done
            .recv()
            .unwrap_or_else(|_| FetchReport::lost(self.request, self.started_at.elapsed()));
        self.join();
        report
    }

    /// Joins the worker once its report has been taken.
    pub fn release(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(job = %self.label, "fetch worker panicked");
            }
        }
    }
}

impl Drop for FetchJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            self.join();
        }
    }
}

impl std::fmt::Debug for FetchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchJob")
            .field("label", &self.label)
            .field("request", &self.request)
            .field("running", &self.handle.is_some())
            .finish()
    }
}
