use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::error::{DnnError, Result};
use crate::io_proc::{TensorView, TensorViewMut};
use crate::operand::{DataType, Operand, OperandKind};
use crate::runtime::lock;
use crate::runtime::model::ModelInner;
use crate::runtime::request_pool::RequestSlot;
use crate::runtime::task::Task;
use crate::runtime::FunctionType;

/// Bind the front pending unit to `slot`, fill its input and run it, inline
/// or on the async executor. The slot goes back to the pool on every path.
pub(crate) fn dispatch(inner: &Arc<ModelInner>, mut slot: RequestSlot, async_mode: bool) -> Result<()> {
    let Some(lltask) = lock(&inner.queues).lltasks.pop_front() else {
        inner.pool.release(slot);
        return Err(DnnError::Internal("no pending inference to dispatch".to_string()));
    };
    let task = Arc::clone(&lltask.task);
    slot.lltask = Some(lltask);

    if let Err(err) = fill_model_input(inner, &mut slot) {
        return finish(inner, slot, &task, Err(err));
    }

    if async_mode {
        let guard = inner.in_flight.enter();
        let job_inner = Arc::clone(inner);
        inner.executor.spawn(Box::new(move || {
            let _guard = guard;
            let mut slot = slot;
            let result = run_layers(&job_inner, &mut slot.operands)
                .and_then(|_| complete(&job_inner, &slot.operands, &task));
            if let Err(err) = finish(&job_inner, slot, &task, result) {
                error!(error = %err, input = %task.input_name, "async inference failed");
            }
        }));
        return Ok(());
    }

    let result = run_layers(inner, &mut slot.operands).and_then(|_| complete(inner, &slot.operands, &task));
    finish(inner, slot, &task, result)?;
    let state = lock(&task.state);
    if state.inference_done != state.inference_todo {
        return Err(DnnError::Internal(format!(
            "inference finished {} of {} units",
            state.inference_done, state.inference_todo
        )));
    }
    Ok(())
}

/// Run one task on a borrowed slot, bypassing the queues. The caller
/// returns the slot to the pool.
pub(crate) fn run_detached(inner: &ModelInner, slot: &mut RequestSlot, task: &Arc<Task>) -> Result<()> {
    fill_input(inner, &mut slot.operands, task)?;
    run_layers(inner, &mut slot.operands)?;
    complete(inner, &slot.operands, task)
}

/// Return the slot and record a failure on the task.
fn finish(inner: &ModelInner, slot: RequestSlot, task: &Task, result: Result<()>) -> Result<()> {
    inner.pool.release(slot);
    if result.is_err() {
        task.mark_failed();
    }
    result
}

fn fill_model_input(inner: &ModelInner, slot: &mut RequestSlot) -> Result<()> {
    let task = slot
        .lltask
        .as_ref()
        .map(|lltask| Arc::clone(&lltask.task))
        .ok_or_else(|| DnnError::Internal("request slot has no task bound".to_string()))?;
    fill_input(inner, &mut slot.operands, &task)
}

pub(crate) fn find_operand(operands: &[Operand], name: &str) -> Option<usize> {
    operands.iter().position(|operand| operand.name == name)
}

fn fill_input(inner: &ModelInner, operands: &mut [Operand], task: &Task) -> Result<()> {
    if inner.layers.is_empty() || operands.is_empty() {
        return Err(DnnError::InvalidArgument("model has no layers or operands".to_string()));
    }
    let index = find_operand(operands, &task.input_name).ok_or_else(|| {
        DnnError::InvalidArgument(format!("could not find input operand \"{}\"", task.input_name))
    })?;
    let input = &mut operands[index];
    if input.kind != OperandKind::Input {
        return Err(DnnError::InvalidArgument(format!(
            "operand \"{}\" is not a model input",
            input.name
        )));
    }
    if input.data_type != DataType::Float {
        return Err(DnnError::Unsupported(format!(
            "input operand \"{}\" has data type {}, only float is supported",
            input.name, input.data_type
        )));
    }
    let channels = input.channels();
    if channels <= 0 {
        return Err(DnnError::InvalidArgument(format!(
            "input operand \"{}\" has {} channels",
            input.name, channels
        )));
    }

    let state = lock(&task.state);
    let frame = state
        .in_frame
        .as_ref()
        .ok_or_else(|| DnnError::Internal("task has no input frame".to_string()))?;
    let height = i32::try_from(frame.height)
        .map_err(|_| DnnError::InvalidArgument(format!("frame height {} too large", frame.height)))?;
    let width = i32::try_from(frame.width)
        .map_err(|_| DnnError::InvalidArgument(format!("frame width {} too large", frame.width)))?;
    input.resize([1, height, width, channels])?;

    let data_type = input.data_type;
    let data = input.alloc_zeroed(&inner.accounting);
    trace!(input = %task.input_name, width, height, channels, "filled model input");
    if task.do_ioproc {
        let view = TensorViewMut {
            height: frame.height,
            width: frame.width,
            channels: channels as usize,
            data_type,
            data,
        };
        inner.frame_proc.pre_proc(frame, view).map_err(DnnError::FrameProc)?;
    }
    Ok(())
}

fn run_layers(inner: &ModelInner, operands: &mut [Operand]) -> Result<()> {
    for (index, layer) in inner.layers.iter().enumerate() {
        layer.exec(operands, &inner.layer_ctx).map_err(|source| {
            error!(layer = index, kind = %layer.kind(), error = %source, "layer execution failed");
            DnnError::Layer {
                index,
                kind: layer.kind(),
                source,
            }
        })?;
    }
    debug!(layers = inner.layers.len(), "graph executed");
    Ok(())
}

fn complete(inner: &ModelInner, operands: &[Operand], task: &Task) -> Result<()> {
    let mut state = lock(&task.state);
    for name in &task.output_names {
        let index = find_operand(operands, name)
            .ok_or_else(|| DnnError::Internal(format!("could not find output operand \"{}\"", name)))?;
        let operand = &operands[index];
        let (height, width, channels) = (
            operand.height().max(0) as usize,
            operand.width().max(0) as usize,
            operand.channels().max(0) as usize,
        );

        if !task.do_ioproc {
            let frame = state
                .out_frame
                .as_mut()
                .ok_or_else(|| DnnError::Internal("task has no output frame".to_string()))?;
            frame.width = width;
            frame.height = height;
            continue;
        }

        let view = TensorView {
            height,
            width,
            channels,
            data_type: operand.data_type,
            data: operand
                .data()
                .map_err(|err| DnnError::Internal(format!("{:#}", err)))?,
        };
        let frame = match inner.function {
            FunctionType::Process => state.out_frame.as_mut(),
            FunctionType::AnalyticsDetect | FunctionType::AnalyticsClassify => state.in_frame.as_mut(),
        }
        .ok_or_else(|| DnnError::Internal("task has no frame to post-process into".to_string()))?;
        inner
            .frame_proc
            .post_proc(view, frame, inner.function)
            .map_err(DnnError::FrameProc)?;
    }
    state.inference_done += 1;
    Ok(())
}
