//! Where connection drivers run.
//!
//! Clients created inside a tokio runtime spawn their driver there. Clients
//! created outside one share a single process-wide runtime that is built on
//! first use and shut down when the last such client is dropped.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::error::ClientError;

static SHARED: Mutex<Weak<SharedRuntime>> = Mutex::new(Weak::new());

pub(crate) struct SharedRuntime {
    runtime: Option<Runtime>,
}

impl Drop for SharedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            info!("Shutting down shared runtime");
            runtime.shutdown_background();
        }
    }
}

pub(crate) enum ExecutionContext {
    /// The runtime the client was created in.
    Ambient(Handle),
    Shared(Arc<SharedRuntime>),
}

impl ExecutionContext {
    pub(crate) fn acquire() -> Result<Self, ClientError> {
        if let Ok(handle) = Handle::try_current() {
            debug!("Using the current runtime");
            return Ok(ExecutionContext::Ambient(handle));
        }

        let mut slot = SHARED.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(shared) = slot.upgrade() {
            return Ok(ExecutionContext::Shared(shared));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mqlink-transport")
            .enable_all()
            .build()
            .map_err(|e| ClientError::Runtime(e.to_string()))?;

        info!("Started shared runtime");

        let shared = Arc::new(SharedRuntime {
            runtime: Some(runtime),
        });
        *slot = Arc::downgrade(&shared);

        Ok(ExecutionContext::Shared(shared))
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            ExecutionContext::Ambient(handle) => {
                handle.spawn(future);
            }
            ExecutionContext::Shared(shared) => {
                if let Some(runtime) = &shared.runtime {
                    runtime.spawn(future);
                }
            }
        }
    }
}

/// Whether the process-wide runtime is currently alive.
pub fn shared_runtime_active() -> bool {
    SHARED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .upgrade()
        .is_some()
}
