//! Snapshot assembly from a coordinate provider.
//!
//! A fixed pool of worker threads pulls node names off a shared queue and
//! reports each outcome to the collector over a channel. The collector stops
//! waiting at the overall deadline; whatever has not reported by then is
//! excluded, and workers stop taking new names.
//!
//! Each provider call runs on its own thread and the worker waits at most
//! the per-node timeout for it. A call that hangs is left detached and its
//! late result is dropped, so hung nodes never hold a worker past their
//! timeout.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use vicinity_core::{Coordinate, CoordinateProvider, Exclusion, ExclusionReason, Snapshot};

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};

const CALL_PANICKED: &str = "provider call panicked";
const WORKER_EXITED: &str = "fetch worker exited before reporting";

#[derive(Debug)]
enum Outcome {
    Fetched(Coordinate),
    Missing,
    Failed(String),
    TimedOut(Duration),
}

pub fn fetch_snapshot<P>(provider: Arc<P>, cfg: &FetchConfig) -> Result<Snapshot>
where
    P: CoordinateProvider + ?Sized + 'static,
{
    cfg.validate()?;
    let started = Instant::now();
    let deadline = started + cfg.deadline();

    let names: BTreeSet<String> = provider
        .list_nodes()
        .map_err(|e| FetchError::ProviderUnavailable(e.message))?
        .into_iter()
        .collect();
    let queue = Arc::new(Mutex::new(names.iter().cloned().collect::<VecDeque<_>>()));
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<(String, Outcome)>();

    let workers = cfg.workers.min(names.len());
    for id in 0..workers {
        let queue = Arc::clone(&queue);
        let cancel = Arc::clone(&cancel);
        let provider = Arc::clone(&provider);
        let tx = tx.clone();
        let timeout = cfg.per_node_timeout();
        thread::Builder::new()
            .name(format!("fetch-{id}"))
            .spawn(move || fetch_worker(provider, &queue, &cancel, timeout, tx))
            .map_err(|e| FetchError::Core(e.into()))?;
    }
    drop(tx);

    let mut pending = names;
    let mut coords = Vec::with_capacity(pending.len());
    let mut excluded = Vec::new();
    let mut disconnected = false;
    while !pending.is_empty() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout(deadline - now) {
            Ok((name, outcome)) => {
                pending.remove(&name);
                match outcome {
                    Outcome::Fetched(mut coord) => {
                        if coord.name != name {
                            tracing::debug!(
                                requested = %name,
                                returned = %coord.name,
                                "renaming coordinate to requested node"
                            );
                            coord.name = name;
                        }
                        coords.push(coord);
                    }
                    Outcome::Missing => excluded.push(Exclusion {
                        name,
                        reason: ExclusionReason::NotFound,
                    }),
                    Outcome::Failed(message) => excluded.push(Exclusion {
                        name,
                        reason: ExclusionReason::Provider { message },
                    }),
                    Outcome::TimedOut(elapsed) => excluded.push(Exclusion {
                        name,
                        reason: ExclusionReason::Timeout {
                            elapsed_ms: elapsed.as_millis() as u64,
                        },
                    }),
                }
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                disconnected = true;
                break;
            }
        }
    }
    cancel.store(true, Ordering::Relaxed);

    if disconnected && !pending.is_empty() {
        tracing::warn!(unreported = pending.len(), "fetch workers exited before reporting");
    }
    for name in pending {
        let reason = if disconnected {
            ExclusionReason::Provider {
                message: WORKER_EXITED.to_string(),
            }
        } else {
            ExclusionReason::DeadlineExceeded
        };
        excluded.push(Exclusion { name, reason });
    }

    tracing::info!(
        fetched = coords.len(),
        excluded = excluded.len(),
        workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "coordinate fetch complete"
    );
    Ok(Snapshot::assemble(coords, excluded)?)
}

fn fetch_worker<P>(
    provider: Arc<P>,
    queue: &Mutex<VecDeque<String>>,
    cancel: &AtomicBool,
    timeout: Duration,
    tx: mpsc::Sender<(String, Outcome)>,
) where
    P: CoordinateProvider + ?Sized + 'static,
{
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(name) = next else {
            break;
        };

        let outcome = fetch_one(Arc::clone(&provider), &name, timeout);
        if tx.send((name, outcome)).is_err() {
            break;
        }
    }
}

fn fetch_one<P>(provider: Arc<P>, name: &str, timeout: Duration) -> Outcome
where
    P: CoordinateProvider + ?Sized + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let node = name.to_string();
    let t0 = Instant::now();
    let spawned = thread::Builder::new()
        .name(format!("get-{name}"))
        .spawn(move || {
            // receiver is gone once the wait timed out
            let _ = done_tx.send(provider.get_coordinate(&node));
        });
    if let Err(err) = spawned {
        return Outcome::Failed(err.to_string());
    }

    match done_rx.recv_timeout(timeout) {
        Ok(Ok(Some(coord))) => Outcome::Fetched(coord),
        Ok(Ok(None)) => Outcome::Missing,
        Ok(Err(err)) => Outcome::Failed(err.message),
        Err(RecvTimeoutError::Timeout) => Outcome::TimedOut(t0.elapsed()),
        Err(RecvTimeoutError::Disconnected) => Outcome::Failed(CALL_PANICKED.to_string()),
    }
}
