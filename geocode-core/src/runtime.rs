//! Driving async resolution from synchronous callers.

use std::future::Future;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::task;

use crate::ResolutionError;

/// Run `future` to completion from synchronous code.
///
/// Inside a multi-thread runtime the current worker is handed over with
/// `block_in_place`. A current-thread runtime cannot be blocked, so the
/// future then runs on a helper thread with its own runtime. Outside any
/// runtime a throwaway current-thread runtime is used.
pub fn block_on<F, T>(future: F) -> Result<T, ResolutionError>
where
    F: Future<Output = Result<T, ResolutionError>> + Send + 'static,
    T: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(|| handle.block_on(future))
        }
        Ok(_) => std::thread::spawn(move || run_on_fresh_runtime(future))
            .join()
            .map_err(|_| ResolutionError::Runtime("resolver thread panicked".into()))?,
        Err(_) => run_on_fresh_runtime(future),
    }
}

fn run_on_fresh_runtime<F, T>(future: F) -> Result<T, ResolutionError>
where
    F: Future<Output = Result<T, ResolutionError>>,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| ResolutionError::Runtime(format!("failed to start runtime: {err}")))?
        .block_on(future)
}
