use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::config::ModelOptions;
use crate::error::{DnnError, Result};
use crate::frame::{Frame, PixelFormat};
use crate::io_proc::{DefaultFrameProcessor, FrameProcessor};
use crate::model_loader::ModelGraph;
use crate::ops::{Layer, LayerContext};
use crate::operand::{BufferAccounting, DataType, Operand, OperandKind};
use crate::runtime::async_scheduler::{AsyncExecutor, InFlight, ThreadPoolExecutor};
use crate::runtime::executor::{self, find_operand};
use crate::runtime::request_pool::RequestPool;
use crate::runtime::task::{self, Task, TaskQueues};
use crate::runtime::{lock, FunctionType};

/// One inference request.
#[derive(Debug, Clone)]
pub struct ExecParams {
    pub input_name: String,
    pub output_names: Vec<String>,
    pub in_frame: Frame,
    /// Required for [`FunctionType::Process`].
    pub out_frame: Option<Frame>,
}

impl ExecParams {
    pub fn new(input_name: impl Into<String>, output_name: impl Into<String>, in_frame: Frame) -> Self {
        Self {
            input_name: input_name.into(),
            output_names: vec![output_name.into()],
            in_frame,
            out_frame: None,
        }
    }

    pub fn with_out_frame(mut self, frame: Frame) -> Self {
        self.out_frame = Some(frame);
        self
    }
}

/// State of the oldest submitted request.
#[derive(Debug)]
pub enum AsyncResult {
    EmptyQueue,
    NotReady,
    Ready { input: Frame, output: Option<Frame> },
    Failed { input: Frame },
}

/// Shape and type of a model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputInfo {
    pub data_type: DataType,
    pub height: i32,
    pub width: i32,
    pub channels: i32,
}

/// Collaborators plugged in at load time.
#[derive(Clone)]
pub struct ModelHooks {
    pub frame_proc: Arc<dyn FrameProcessor>,
    /// Built from [`ModelOptions::threads`] when not supplied.
    pub executor: Option<Arc<dyn AsyncExecutor>>,
}

impl Default for ModelHooks {
    fn default() -> Self {
        Self {
            frame_proc: Arc::new(DefaultFrameProcessor),
            executor: None,
        }
    }
}

impl ModelHooks {
    pub fn with_frame_processor(mut self, frame_proc: Arc<dyn FrameProcessor>) -> Self {
        self.frame_proc = frame_proc;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn AsyncExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }
}

impl fmt::Debug for ModelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHooks")
            .field("executor", &self.executor.is_some())
            .finish()
    }
}

pub(crate) struct ModelInner {
    pub(crate) layers: Vec<Layer>,
    pub(crate) operands: Vec<Operand>,
    pub(crate) minor_version: i32,
    pub(crate) function: FunctionType,
    pub(crate) options: ModelOptions,
    pub(crate) pool: RequestPool,
    pub(crate) queues: Mutex<TaskQueues>,
    pub(crate) frame_proc: Arc<dyn FrameProcessor>,
    pub(crate) executor: Arc<dyn AsyncExecutor>,
    pub(crate) in_flight: Arc<InFlight>,
    pub(crate) layer_ctx: LayerContext,
    pub(crate) accounting: Arc<BufferAccounting>,
}

/// A loaded model with its request slots and task queues.
///
/// Dropping it (or calling [`NativeModel::free`]) waits for in-flight
/// inferences, then releases every queued task and slot.
pub struct NativeModel {
    inner: Arc<ModelInner>,
}

impl NativeModel {
    pub fn load(path: impl AsRef<Path>, function: FunctionType, options: ModelOptions) -> Result<Self> {
        Self::load_with_hooks(path, function, options, ModelHooks::default())
    }

    pub fn load_with_hooks(
        path: impl AsRef<Path>,
        function: FunctionType,
        options: ModelOptions,
        hooks: ModelHooks,
    ) -> Result<Self> {
        let path = path.as_ref();
        let graph = ModelGraph::open(path)?;
        debug!(path = %path.display(), "loaded model file");
        Self::build(graph, function, options, hooks)
    }

    pub fn from_bytes(bytes: &[u8], function: FunctionType, options: ModelOptions, hooks: ModelHooks) -> Result<Self> {
        let graph = ModelGraph::parse(bytes)?;
        Self::build(graph, function, options, hooks)
    }

    fn build(graph: ModelGraph, function: FunctionType, options: ModelOptions, hooks: ModelHooks) -> Result<Self> {
        let nireq = options.resolved_nireq();
        let accounting = Arc::new(BufferAccounting::default());

        let mut layer_ctx = LayerContext::new(Arc::clone(&accounting));
        if options.conv2d_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(options.conv2d_threads)
                .thread_name(|index| format!("nativednn-conv2d-{}", index))
                .build()
                .map_err(|err| DnnError::Executor(format!("failed to build conv2d threadpool: {}", err)))?;
            layer_ctx = layer_ctx.with_conv_pool(Arc::new(pool));
        }

        let executor: Arc<dyn AsyncExecutor> = match hooks.executor {
            Some(executor) => executor,
            None => Arc::new(ThreadPoolExecutor::new(options.threads)?),
        };

        let pool = RequestPool::new(&graph.operands, nireq);
        info!(
            layers = graph.layers.len(),
            operands = graph.operands.len(),
            nireq,
            async_mode = options.async_mode,
            function = ?function,
            "native model ready"
        );
        let inner = ModelInner {
            layers: graph.layers,
            operands: graph.operands,
            minor_version: graph.minor_version,
            function,
            options,
            pool,
            queues: Mutex::new(TaskQueues::default()),
            frame_proc: hooks.frame_proc,
            executor,
            in_flight: Arc::new(InFlight::default()),
            layer_ctx,
            accounting,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Submit one request. In async mode this returns once the inference is
    /// dispatched; poll [`NativeModel::get_result`] for the outcome.
    ///
    /// When every slot is busy the request stays queued and
    /// [`DnnError::NoRequestSlot`] is returned; [`NativeModel::flush`] runs it
    /// later.
    pub fn execute(&self, params: ExecParams) -> Result<()> {
        self.check_exec_params(&params)?;
        let task = Arc::new(Task::new(
            params.input_name,
            params.output_names,
            params.in_frame,
            params.out_frame,
            true,
            self.inner.options.async_mode,
        ));
        {
            let mut queues = lock(&self.inner.queues);
            queues.tasks.push_back(Arc::clone(&task));
            let lltasks = task::extract_lltasks(&task);
            queues.lltasks.extend(lltasks);
        }

        let slot = self.inner.pool.acquire()?;
        executor::dispatch(&self.inner, slot, task.async_mode)
    }

    fn check_exec_params(&self, params: &ExecParams) -> Result<()> {
        match params.output_names.len() {
            0 => return Err(DnnError::InvalidArgument("no output requested".to_string())),
            1 => {}
            count => {
                return Err(DnnError::Unsupported(format!(
                    "{} outputs requested, only one output per request is supported",
                    count
                )))
            }
        }
        if self.inner.function == FunctionType::Process && params.out_frame.is_none() {
            return Err(DnnError::InvalidArgument(
                "an output frame is required for processing models".to_string(),
            ));
        }
        Ok(())
    }

    /// Dispatch the oldest request still waiting for a slot on the async
    /// executor. Nothing pending is not an error.
    pub fn flush(&self) -> Result<()> {
        if lock(&self.inner.queues).lltasks.is_empty() {
            return Ok(());
        }
        let slot = self.inner.pool.acquire()?;
        executor::dispatch(&self.inner, slot, true)
    }

    /// Inspect the oldest request, popping it once it has finished or failed.
    pub fn get_result(&self) -> Result<AsyncResult> {
        let mut queues = lock(&self.inner.queues);
        let Some(task) = queues.tasks.front().cloned() else {
            return Ok(AsyncResult::EmptyQueue);
        };
        let mut state = lock(&task.state);
        if !state.failed && !state.is_finished() {
            return Ok(AsyncResult::NotReady);
        }
        queues.tasks.pop_front();

        let input = state
            .in_frame
            .take()
            .ok_or_else(|| DnnError::Internal("finished task lost its input frame".to_string()))?;
        if state.failed {
            return Ok(AsyncResult::Failed { input });
        }
        Ok(AsyncResult::Ready {
            input,
            output: state.out_frame.take(),
        })
    }

    pub fn get_input(&self, name: &str) -> Result<InputInfo> {
        let operand = find_operand(&self.inner.operands, name)
            .map(|index| &self.inner.operands[index])
            .ok_or_else(|| DnnError::InvalidArgument(format!("could not find input operand \"{}\"", name)))?;
        if operand.kind != OperandKind::Input {
            return Err(DnnError::InvalidArgument(format!(
                "operand \"{}\" is not a model input",
                name
            )));
        }
        Ok(InputInfo {
            data_type: operand.data_type,
            height: operand.height(),
            width: operand.width(),
            channels: operand.channels(),
        })
    }

    /// Output `(width, height)` for an input of `width x height`, found by
    /// running the graph once on a zero frame outside the request queues.
    /// Borrows a request slot for the run and fails with
    /// [`DnnError::NoRequestSlot`] when none is free.
    pub fn get_output(
        &self,
        input_name: &str,
        width: usize,
        height: usize,
        output_name: &str,
    ) -> Result<(usize, usize)> {
        let task = Arc::new(Task::new(
            input_name.to_string(),
            vec![output_name.to_string()],
            Frame::new(width, height, PixelFormat::GrayF32),
            Some(Frame::new(width, height, PixelFormat::GrayF32)),
            false,
            false,
        ));
        let mut slot = self.inner.pool.acquire()?;
        slot.lltask = task::extract_lltasks(&task).into_iter().next();
        let result = executor::run_detached(&self.inner, &mut slot, &task);
        self.inner.pool.release(slot);
        result?;

        let state = lock(&task.state);
        let frame = state
            .out_frame
            .as_ref()
            .ok_or_else(|| DnnError::Internal("shape probe lost its output frame".to_string()))?;
        Ok((frame.width, frame.height))
    }

    pub fn operands(&self) -> &[Operand] {
        &self.inner.operands
    }

    pub fn layers(&self) -> &[Layer] {
        &self.inner.layers
    }

    pub fn minor_version(&self) -> i32 {
        self.inner.minor_version
    }

    pub fn function_type(&self) -> FunctionType {
        self.inner.function
    }

    pub fn options(&self) -> &ModelOptions {
        &self.inner.options
    }

    pub fn nireq(&self) -> usize {
        self.inner.pool.capacity()
    }

    pub fn free_slots(&self) -> usize {
        self.inner.pool.free_count()
    }

    /// Submitted requests not yet retrieved.
    pub fn pending_tasks(&self) -> usize {
        lock(&self.inner.queues).tasks.len()
    }

    /// Requests still waiting for a slot.
    pub fn pending_inferences(&self) -> usize {
        lock(&self.inner.queues).lltasks.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.count()
    }

    pub fn buffer_accounting(&self) -> Arc<BufferAccounting> {
        Arc::clone(&self.inner.accounting)
    }

    pub fn free(self) {
        drop(self);
    }
}

impl Drop for NativeModel {
    fn drop(&mut self) {
        let inner = &self.inner;
        inner.executor.shutdown();
        inner.in_flight.wait_idle();

        let (tasks, lltasks) = {
            let mut queues = lock(&inner.queues);
            (queues.tasks.drain(..).count(), queues.lltasks.drain(..).count())
        };
        let slots = inner.pool.drain();
        if slots.len() != inner.pool.capacity() {
            warn!(
                returned = slots.len(),
                nireq = inner.pool.capacity(),
                "request slots missing at teardown"
            );
        }
        debug!(tasks, lltasks, slots = slots.len(), "native model released");
    }
}

impl fmt::Debug for NativeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModel")
            .field("layers", &self.inner.layers.len())
            .field("operands", &self.inner.operands.len())
            .field("function", &self.inner.function)
            .field("nireq", &self.nireq())
            .field("free_slots", &self.free_slots())
            .finish()
    }
}
