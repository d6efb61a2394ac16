use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use tracing::debug;

use crate::generation::LoadTicket;
use crate::grid::GridSpec;
use crate::loader::{load_image_array, LoadError, LoadOptions, LoadOutcome, Progress};
use crate::source::ImageSource;

/// Messages streamed from a background load to the render loop.
#[derive(Debug)]
pub enum LoadEvent {
    Progress(Progress),
    Finished(Result<LoadOutcome, LoadError>),
}

/// Handle to a load running on a worker thread.
///
/// The worker performs the same strictly sequential fetch chain as
/// [`load_image_array`]; the owner polls [`BackgroundLoad::poll`] from its
/// frame loop so it never blocks on the network.
pub struct BackgroundLoad {
    ticket: LoadTicket,
    events: Receiver<LoadEvent>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl BackgroundLoad {
    /// A load that already finished with `error`, without a worker.
    fn failed(ticket: LoadTicket, error: LoadError) -> Self {
        let (tx, rx) = unbounded();
        let _ = tx.send(LoadEvent::Finished(Err(error)));
        Self {
            ticket,
            events: rx,
            worker: None,
            finished: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.ticket.generation()
    }

    pub fn is_current(&self) -> bool {
        self.ticket.is_current()
    }

    /// Asks the worker to stop; it finishes the fetch in flight, then
    /// reports [`LoadError::Superseded`].
    pub fn cancel(&self) {
        self.ticket.cancel();
    }

    /// Drains whatever the worker produced since the last call.
    pub fn poll(&mut self) -> Vec<LoadEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if matches!(event, LoadEvent::Finished(_)) {
                        self.finished = true;
                    }
                    drained.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.join_worker();
                    break;
                }
            }
        }
        drained
    }

    /// Blocks until the worker reports completion.
    pub fn wait<F>(mut self, mut on_progress: F) -> Result<LoadOutcome, LoadError>
    where
        F: FnMut(Progress),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                LoadEvent::Progress(progress) => on_progress(progress),
                LoadEvent::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }
        self.finished = true;
        self.join_worker();
        outcome.unwrap_or(Err(LoadError::Superseded {
            generation: self.ticket.generation(),
        }))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(
                    generation = self.ticket.generation(),
                    "light-field load worker panicked"
                );
            }
        }
    }
}

impl Drop for BackgroundLoad {
    fn drop(&mut self) {
        self.join_worker();
    }
}

/// Starts `grid` loading on a worker thread under `ticket`.
pub fn spawn_load(
    grid: GridSpec,
    source: Arc<dyn ImageSource>,
    options: LoadOptions,
    ticket: LoadTicket,
) -> BackgroundLoad {
    let (tx, rx) = unbounded();
    let worker_ticket = ticket.clone();
    let worker = thread::Builder::new()
        .name(format!("lf-load-{}", ticket.generation()))
        .spawn(move || {
            let progress_tx = tx.clone();
            let result = load_image_array(&grid, source.as_ref(), options, &worker_ticket, |p| {
                let _ = progress_tx.send(LoadEvent::Progress(p));
            });
            debug!(
                generation = worker_ticket.generation(),
                ok = result.is_ok(),
                "background load finished"
            );
            let _ = tx.send(LoadEvent::Finished(result));
        });

    match worker {
        Ok(handle) => BackgroundLoad {
            ticket,
            events: rx,
            worker: Some(handle),
            finished: false,
        },
        Err(err) => {
            tracing::error!(error = %err, "failed to spawn load worker");
            BackgroundLoad::failed(ticket, LoadError::Spawn(err))
        }
    }
}
