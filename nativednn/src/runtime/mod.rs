use std::sync::{Mutex, MutexGuard, PoisonError};

mod async_scheduler;
mod executor;
mod model;
mod request_pool;
mod task;

pub use async_scheduler::{AsyncExecutor, DeferredExecutor, Job, ThreadPoolExecutor};
pub use model::{AsyncResult, ExecParams, InputInfo, ModelHooks, NativeModel};

/// What the model output is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunctionType {
    /// Output tensor becomes a new frame.
    #[default]
    Process,
    /// Output tensor annotates the input frame with detections.
    AnalyticsDetect,
    /// Output tensor annotates the input frame with classifications.
    AnalyticsClassify,
}

/// Lock that keeps going after a panicking holder; queue and pool state stay
/// consistent between individual pushes and pops.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
