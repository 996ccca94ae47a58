// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded fan-out of independent key operations.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use log::debug;
use log::info;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::TypeConfig;

/// Results of a bulk operation, in completion order, each paired with its key.
pub type KeyedStream<K, T> = BoxStream<'static, (K, T)>;

/// Counts a submitted task from spawn until it finishes or is discarded.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        InFlight(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

/// Runs key operations concurrently, at most `worker_count` at a time.
///
/// Every submitted operation becomes a background task that first waits for a worker
/// permit. Shutting down closes the permit semaphore: tasks still waiting for a permit
/// are discarded, tasks holding one run to completion.
pub struct TaskPool<C: TypeConfig> {
    name: String,
    worker_count: usize,
    permits: Arc<Semaphore>,
    in_flight: Arc<watch::Sender<usize>>,
    _p: PhantomData<fn() -> C>,
}

impl<C> fmt::Display for TaskPool<C>
where C: TypeConfig
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskPool({})[workers={}]", self.name, self.worker_count)
    }
}

impl<C> TaskPool<C>
where C: TypeConfig
{
    pub fn new(worker_count: usize, name: impl ToString) -> Self {
        let worker_count = worker_count.max(1);
        let (in_flight, _rx) = watch::channel(0usize);

        TaskPool {
            name: name.to_string(),
            worker_count,
            permits: Arc::new(Semaphore::new(worker_count)),
            in_flight: Arc::new(in_flight),
            _p: PhantomData,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of submitted tasks that are waiting or running.
    pub fn pending(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }

    /// Run `op` once per key and yield `(key, output)` pairs as operations complete.
    ///
    /// All operations are submitted before this returns; the returned stream only
    /// collects their outputs. One operation failing does not affect the others. After
    /// shutdown, submitted operations are discarded and the stream ends empty.
    pub fn map_unordered<K, T, F, Fut>(
        &self,
        keys: impl IntoIterator<Item = K>,
        op: F,
    ) -> KeyedStream<K, T>
    where
        K: Clone + fmt::Display + Send + 'static,
        T: Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let op = Arc::new(op);

        let mut submitted = 0usize;

        for key in keys {
            let guard = InFlight::enter(self.in_flight.clone());
            let permits = self.permits.clone();
            let tx = tx.clone();
            let op = op.clone();
            let task_name = format!("{}-{}", self.name, key);

            let fu = async move {
                let _guard = guard;

                let Ok(_permit) = permits.acquire_owned().await else {
                    debug!("{}: discarded before start", key);
                    return;
                };

                let output = (*op)(key.clone()).await;

                // The receiver may be gone if the caller dropped the stream.
                let _ = tx.send((key, output));
            };

            C::spawn(fu, task_name);
            submitted += 1;
        }

        debug!("{}: submitted {} tasks", self, submitted);

        UnboundedReceiverStream::new(rx).boxed()
    }

    /// Stop accepting work and wait for submitted tasks.
    ///
    /// Graceful shutdown waits for every submitted task to run. Forced shutdown discards
    /// tasks that have not started; tasks already running still complete. Repeated calls
    /// are harmless.
    pub async fn shutdown(&self, force: bool) {
        if force {
            self.permits.close();
        }

        info!(
            "{}: shutting down (force={}), {} tasks pending",
            self,
            force,
            self.pending()
        );

        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so this only returns once the count drops to zero.
        let _ = rx.wait_for(|n| *n == 0).await;

        self.permits.close();
    }
}
