//! Loader and runtime for the native DNN model format: a layer graph read from
//! a `FFMPEGDNNNATIVE` file, executed on CPU through a bounded pool of request
//! slots, synchronously or on an async executor.

pub mod config;
pub mod error;
pub mod frame;
pub mod io_proc;
pub mod logging;
pub mod model_loader;
pub mod operand;
pub mod ops;
pub mod runtime;

pub use config::ModelOptions;
pub use error::{DnnError, Result};
pub use frame::{Frame, PixelFormat};
pub use io_proc::{DefaultFrameProcessor, FrameProcessor, TensorView, TensorViewMut};
pub use model_loader::ModelGraph;
pub use operand::{BufferAccounting, DataType, Operand, OperandKind};
pub use ops::{Layer, LayerKind, LayerParams};
pub use runtime::{
    AsyncExecutor, AsyncResult, DeferredExecutor, ExecParams, FunctionType, InputInfo, Job, ModelHooks,
    NativeModel, ThreadPoolExecutor,
};
