// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device flow scheduler: one priority queue and one long-lived worker
//! task per `stable_id`. Devices never share a worker, so a slow or wedged
//! flow on one device never starves another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::domain::device::StableId;
use crate::domain::flow::FlowPriority;
use crate::error::{EngineError, ErrorCode};
use crate::time::epoch_ms;
use crate::transport::BoxFuture;

/// The scheduler's only dependency: whatever actually runs a flow to
/// completion. The flow executor implements this; the scheduler never
/// depends on the executor's concrete type.
pub trait FlowRunner: Send + Sync {
    fn run(&self, stable_id: StableId, flow_id: String) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone)]
struct QueueEntry {
    flow_id: String,
    priority: FlowPriority,
    enqueued_at_ms: u64,
}

/// Selects the highest-priority, earliest-enqueued entry and removes it.
fn pop_next(items: &mut Vec<QueueEntry>) -> Option<QueueEntry> {
    let mut best: Option<usize> = None;
    for (i, entry) in items.iter().enumerate() {
        let replace = match best {
            None => true,
            Some(b) => {
                let current = &items[b];
                entry.priority > current.priority
                    || (entry.priority == current.priority && entry.enqueued_at_ms < current.enqueued_at_ms)
            }
        };
        if replace {
            best = Some(i);
        }
    }
    best.map(|i| items.remove(i))
}

struct DeviceQueue {
    items: Vec<QueueEntry>,
    running: bool,
    notify: Arc<Notify>,
    worker: JoinHandle<()>,
}

/// Shared handle, cheap to clone, safe to hand to every HTTP handler and
/// the connection monitor's reconnect replay path.
#[derive(Clone)]
pub struct FlowScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    runner: Arc<dyn FlowRunner>,
    shutdown: CancellationToken,
    queues: RwLock<HashMap<StableId, DeviceQueue>>,
    pending_flow_ids: Mutex<HashSet<String>>,
    /// Devices whose worker must not dequeue new flows — set by the
    /// connection monitor while a reconnect's command-queue replay is
    /// still in flight.
    blocked: RwLock<HashSet<StableId>>,
}

impl FlowScheduler {
    pub fn new(config: EngineConfig, runner: Arc<dyn FlowRunner>, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                shutdown,
                queues: RwLock::new(HashMap::new()),
                pending_flow_ids: Mutex::new(HashSet::new()),
                blocked: RwLock::new(HashSet::new()),
            }),
        }
    }

    /// Prevent `stable_id`'s worker from dequeuing new flows until
    /// [`Self::unblock`] is called. Already-running flows are unaffected.
    pub async fn block(&self, stable_id: &str) {
        self.inner.blocked.write().await.insert(stable_id.to_owned());
    }

    /// Lift a block and wake the device's worker so it resumes dequeuing.
    pub async fn unblock(&self, stable_id: &str) {
        self.inner.blocked.write().await.remove(stable_id);
        if let Some(queue) = self.inner.queues.read().await.get(stable_id) {
            queue.notify.notify_one();
        }
    }

    /// Enqueue `flow_id` to run on `stable_id`. Non-blocking: rejects with
    /// [`ErrorCode::QueueOverflow`] once the device's backlog is at
    /// capacity. A tick for a `flow_id` that already has a pending instance
    /// (on any device) is silently dropped rather than rejected.
    pub async fn enqueue(
        &self,
        stable_id: &str,
        flow_id: &str,
        priority: FlowPriority,
    ) -> Result<(), EngineError> {
        {
            let mut pending = self.inner.pending_flow_ids.lock().await;
            if pending.contains(flow_id) {
                return Ok(());
            }
            pending.insert(flow_id.to_owned());
        }

        let notify = {
            let mut queues = self.inner.queues.write().await;
            if !queues.contains_key(stable_id) {
                queues.insert(stable_id.to_owned(), self.spawn_worker(stable_id.to_owned()));
            }
            let Some(queue) = queues.get_mut(stable_id) else {
                return Err(EngineError::new(ErrorCode::Internal, "device queue vanished after insert"));
            };

            if queue.items.len() >= self.inner.config.max_queue_depth {
                self.inner.pending_flow_ids.lock().await.remove(flow_id);
                return Err(EngineError::new(
                    ErrorCode::QueueOverflow,
                    format!("flow queue for device {stable_id} is at capacity"),
                ));
            }

            queue.items.push(QueueEntry {
                flow_id: flow_id.to_owned(),
                priority,
                enqueued_at_ms: epoch_ms(),
            });
            Arc::clone(&queue.notify)
        };

        notify.notify_one();
        Ok(())
    }

    /// Remove a pending (not yet running) instance of `flow_id` from
    /// `stable_id`'s queue.
    pub async fn cancel(&self, stable_id: &str, flow_id: &str) -> bool {
        let mut queues = self.inner.queues.write().await;
        let Some(queue) = queues.get_mut(stable_id) else { return false };
        let before = queue.items.len();
        queue.items.retain(|entry| entry.flow_id != flow_id);
        let removed = queue.items.len() != before;
        if removed {
            self.inner.pending_flow_ids.lock().await.remove(flow_id);
        }
        removed
    }

    pub async fn get_queue_depth(&self, stable_id: &str) -> usize {
        self.inner.queues.read().await.get(stable_id).map_or(0, |q| q.items.len())
    }

    pub async fn is_running(&self, stable_id: &str) -> bool {
        self.inner.queues.read().await.get(stable_id).is_some_and(|q| q.running)
    }

    fn spawn_worker(&self, stable_id: StableId) -> DeviceQueue {
        let notify = Arc::new(Notify::new());
        let worker = {
            let inner = Arc::clone(&self.inner);
            let notify = Arc::clone(&notify);
            let stable_id = stable_id.clone();
            tokio::spawn(async move { Self::worker_loop(inner, stable_id, notify).await })
        };
        DeviceQueue { items: Vec::new(), running: false, notify, worker }
    }

    async fn worker_loop(inner: Arc<Inner>, stable_id: StableId, notify: Arc<Notify>) {
        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = notify.notified() => {}
            }

            loop {
                if inner.blocked.read().await.contains(&stable_id) {
                    break;
                }

                let entry = {
                    let mut queues = inner.queues.write().await;
                    let Some(queue) = queues.get_mut(&stable_id) else { break };
                    let Some(entry) = pop_next(&mut queue.items) else { break };
                    queue.running = true;
                    entry
                };

                inner.pending_flow_ids.lock().await.remove(&entry.flow_id);
                inner.runner.run(stable_id.clone(), entry.flow_id).await;

                if let Some(queue) = inner.queues.write().await.get_mut(&stable_id) {
                    queue.running = false;
                }

                if inner.shutdown.is_cancelled() {
                    return;
                }
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Workers are owned by `queues` indirectly through `JoinHandle`s,
        // which we abort so a dropped scheduler doesn't leak idle workers.
        if let Ok(mut queues) = self.queues.try_write() {
            for queue in queues.values_mut() {
                queue.worker.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
