use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::frame::Frame;

/// Mutable part of a task, shared between the submitter and the slot running it.
#[derive(Debug)]
pub(crate) struct TaskState {
    pub(crate) in_frame: Option<Frame>,
    pub(crate) out_frame: Option<Frame>,
    pub(crate) inference_todo: usize,
    pub(crate) inference_done: usize,
    pub(crate) failed: bool,
}

impl TaskState {
    pub(crate) fn is_finished(&self) -> bool {
        self.inference_todo > 0 && self.inference_done == self.inference_todo
    }
}

/// One caller-level inference request.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) input_name: String,
    pub(crate) output_names: Vec<String>,
    pub(crate) do_ioproc: bool,
    pub(crate) async_mode: bool,
    pub(crate) state: Mutex<TaskState>,
}

impl Task {
    pub(crate) fn new(
        input_name: String,
        output_names: Vec<String>,
        in_frame: Frame,
        out_frame: Option<Frame>,
        do_ioproc: bool,
        async_mode: bool,
    ) -> Self {
        Self {
            input_name,
            output_names,
            do_ioproc,
            async_mode,
            state: Mutex::new(TaskState {
                in_frame: Some(in_frame),
                out_frame,
                inference_todo: 0,
                inference_done: 0,
                failed: false,
            }),
        }
    }

    pub(crate) fn mark_failed(&self) {
        super::lock(&self.state).failed = true;
    }
}

/// Schedulable unit carved out of a [`Task`].
#[derive(Debug, Clone)]
pub(crate) struct LastLevelTask {
    pub(crate) task: Arc<Task>,
}

/// Split `task` into the units a slot executes and reset its counters.
///
/// A task always produces a single unit today.
pub(crate) fn extract_lltasks(task: &Arc<Task>) -> Vec<LastLevelTask> {
    let lltasks = vec![LastLevelTask {
        task: Arc::clone(task),
    }];
    let mut state = super::lock(&task.state);
    state.inference_todo = lltasks.len();
    state.inference_done = 0;
    lltasks
}

/// The two FIFO queues owned by a model.
#[derive(Debug, Default)]
pub(crate) struct TaskQueues {
    pub(crate) tasks: VecDeque<Arc<Task>>,
    pub(crate) lltasks: VecDeque<LastLevelTask>,
}
