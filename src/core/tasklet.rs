use std::time::Instant;

use log::{error, info};

use crate::BatchError;

use super::{
    parameters::JobParameters,
    step::{Step, StepExecution, StepStatus},
};

/// A single atomic unit of work, run exactly once per step execution.
///
/// Used for small bulk operations (a seed pass, a cleanup) where chunk overhead is
/// unwarranted. A failure ends the step `Failed`; the tasklet is not retried.
pub trait Tasklet {
    fn execute(
        &self,
        step_execution: &mut StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError>;
}

pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl Step for TaskletStep<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        step_execution: &mut StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError> {
        step_execution.start_time = Instant::now();
        step_execution.status = StepStatus::Starting;
        info!("Start of step: {}, id: {}", self.name, step_execution.id);

        let result = self.tasklet.execute(step_execution, parameters);

        match &result {
            Ok(()) => step_execution.finish(StepStatus::Completed),
            Err(err) => {
                error!("Tasklet of step {} failed: {}", self.name, err);
                step_execution.fail(err.clone());
            }
        }

        info!("End of step: {}, status: {:?}", self.name, step_execution.status);

        result
    }
}

pub struct TaskletStepBuilder<'a> {
    name: String,
    tasklet: Option<&'a dyn Tasklet>,
}

impl<'a> TaskletStepBuilder<'a> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasklet: None,
        }
    }

    pub fn tasklet(mut self, tasklet: &'a dyn Tasklet) -> Self {
        self.tasklet = Some(tasklet);
        self
    }

    pub fn build(self) -> Result<TaskletStep<'a>, BatchError> {
        let tasklet = self.tasklet.ok_or_else(|| {
            BatchError::Configuration(format!(
                "Tasklet is required for building step {}",
                self.name
            ))
        })?;

        Ok(TaskletStep {
            name: self.name,
            tasklet,
        })
    }
}
