use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use df_core::{Error, Result};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

/// A bounded set of tokio tasks that can be shut down as a unit.
///
/// At most `size` tasks run the submitted future at the same time; the rest
/// wait for a permit. After [`WorkerPool::shutdown`] no new task gets a
/// permit and running ones are dropped at their next await point, both
/// resolving to [`Error::Shutdown`].
#[derive(Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    size: usize,
    permits: Arc<Semaphore>,
    stop: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(name: impl Into<Arc<str>>, size: usize) -> Self {
        let size = size.max(1);
        let (stop, _) = watch::channel(false);
        Self {
            name: name.into(),
            size,
            permits: Arc::new(Semaphore::new(size)),
            stop: Arc::new(stop),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_shut_down(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn spawn<F, T>(&self, task: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let stop = self.stop.subscribe();
        let name = self.name.clone();

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Shutdown(name.to_string()))?;
            if *stop.borrow() {
                return Err(Error::Shutdown(name.to_string()));
            }
            tokio::select! {
                out = task => Ok(out),
                _ = stopped(stop) => Err(Error::Shutdown(name.to_string())),
            }
        })
    }

    /// Stops accepting work and interrupts running tasks. Idempotent.
    pub fn shutdown(&self) {
        self.permits.close();
        self.stop.send_replace(true);
    }
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            // Pool dropped without a shutdown: nothing will ever stop us.
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for every handle, turning panics and aborts into [`Error::Task`].
pub async fn join_all<T>(handles: Vec<JoinHandle<Result<T>>>) -> Vec<Result<T>> {
    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| Error::Task(e.to_string())).and_then(|r| r))
        .collect()
}

pub async fn with_timeout<F, T>(limit: Duration, what: impl Into<String>, task: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, task).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit, what.into())),
    }
}
