use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::BatchError;

use super::{
    build_name,
    flow::{COMPLETED, FAILED, Flow, FlowEdge, FlowNode, JobExecutionDecider},
    parameters::JobParameters,
    repository::{BatchStatus, InMemoryJobRepository, JobRepository, RunIdIncrementer},
    step::{Step, StepExecution},
};

/// Type alias for job execution results.
type JobResult<T> = Result<T, BatchError>;

/// Hook run by the job after a step's execution is finalized, whether it succeeded or
/// failed.
///
/// A listener may perform a bounded side effect. Its failure is logged and never
/// changes the status of the step it observed, nor of the job.
pub trait StepExecutionListener {
    fn after_step(
        &self,
        step_execution: &StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError>;
}

/// Hooks run around a whole job run. Failures are logged and otherwise ignored.
pub trait JobExecutionListener {
    fn before_job(&self, _job_execution: &JobExecution) -> Result<(), BatchError> {
        Ok(())
    }

    fn after_job(&self, _job_execution: &JobExecution) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Represents a job that can be executed.
///
/// A job is a named graph of steps and decisions. Running it allocates a fresh run id;
/// restarting re-runs a previously failed run id from the entry node.
pub trait Job {
    fn get_name(&self) -> &str;

    /// Runs the job under a fresh run id.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` once the run reached a terminal status, `COMPLETED` or
    ///   `FAILED` (see [`JobExecution::status`])
    /// - `Err(BatchError)` when the run could not be identified or recorded
    fn run(&self, parameters: &JobParameters) -> JobResult<JobExecution>;

    /// Re-runs a failed run from the start, keeping its run id.
    ///
    /// Chunks committed by the failed attempt are not rolled back, so the sinks of a
    /// restartable job must tolerate being written again.
    fn restart(&self, run_id: u64, parameters: &JobParameters) -> JobResult<JobExecution>;
}

/// One identified run of a job.
#[derive(Debug)]
pub struct JobExecution {
    pub run_id: u64,
    pub job_name: String,
    /// Launch parameters, immutable for the run
    pub parameters: JobParameters,
    pub status: BatchStatus,
    /// Executions of the steps entered, in execution order
    pub step_executions: Vec<StepExecution>,
    /// The error that ended the run `FAILED`, if any
    pub failure: Option<BatchError>,
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
}

impl JobExecution {
    fn new(run_id: u64, job_name: &str, parameters: JobParameters) -> Self {
        let now = Instant::now();
        Self {
            run_id,
            job_name: job_name.to_string(),
            parameters,
            status: BatchStatus::Starting,
            step_executions: Vec::new(),
            failure: None,
            start: now,
            end: now,
            duration: Duration::default(),
        }
    }

    /// The last execution of the named step in this run.
    pub fn step_execution(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions
            .iter()
            .rev()
            .find(|step_execution| step_execution.name == name)
    }

    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}

/// Represents an instance of a job.
///
/// Walks its flow from the entry node: a step's outcome is `COMPLETED` or `FAILED`, a
/// decision's outcome is whatever the decider returns. The run ends `COMPLETED` when an
/// outcome has no edge, or `FAILED` when a `FAILED` outcome has no edge.
pub struct JobInstance<'a> {
    name: String,
    flow: Flow<'a>,
    step_listeners: HashMap<String, Vec<&'a dyn StepExecutionListener>>,
    job_listeners: Vec<&'a dyn JobExecutionListener>,
    incrementer: Option<RunIdIncrementer<'a>>,
    local_repository: InMemoryJobRepository,
}

impl Job for JobInstance<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn run(&self, parameters: &JobParameters) -> JobResult<JobExecution> {
        let run_id = match &self.incrementer {
            Some(incrementer) => incrementer.next(&self.name)?,
            None => RunIdIncrementer::new(&self.local_repository).next(&self.name)?,
        };

        self.launch(run_id, parameters)
    }

    fn restart(&self, run_id: u64, parameters: &JobParameters) -> JobResult<JobExecution> {
        match self.repository().find_status(&self.name, run_id)? {
            Some(BatchStatus::Failed) => {
                info!("Restarting run {} of job {}", run_id, self.name);
                self.launch(run_id, parameters)
            }
            Some(status) => Err(BatchError::Configuration(format!(
                "run {} of job {} is {}, only a FAILED run can be restarted",
                run_id, self.name, status
            ))),
            None => Err(BatchError::Configuration(format!(
                "job {} has no run {}",
                self.name, run_id
            ))),
        }
    }
}

impl JobInstance<'_> {
    fn repository(&self) -> &dyn JobRepository {
        match &self.incrementer {
            Some(incrementer) => incrementer.repository(),
            None => &self.local_repository,
        }
    }

    fn launch(&self, run_id: u64, parameters: &JobParameters) -> JobResult<JobExecution> {
        let mut execution = JobExecution::new(run_id, &self.name, parameters.clone());

        info!(
            "Start of job: {}, run: {}, parameters: {}",
            self.name, run_id, execution.parameters
        );

        for listener in &self.job_listeners {
            Self::manage_listener_error(&self.name, listener.before_job(&execution));
        }

        execution.status = BatchStatus::InProgress;
        self.repository()
            .update_status(&self.name, run_id, execution.status)?;

        self.execute_flow(&mut execution);

        execution.end = Instant::now();
        execution.duration = execution.end.duration_since(execution.start);
        self.repository()
            .update_status(&self.name, run_id, execution.status)?;

        for listener in &self.job_listeners {
            Self::manage_listener_error(&self.name, listener.after_job(&execution));
        }

        info!(
            "End of job: {}, run: {}, status: {}, duration: {:?}",
            self.name, run_id, execution.status, execution.duration
        );

        Ok(execution)
    }

    fn execute_flow(&self, execution: &mut JobExecution) {
        let mut current = self.flow.entry().to_string();
        let mut last_failure = None;

        loop {
            let outcome = match self.flow.node(&current) {
                Some(FlowNode::Step(step)) => {
                    let step_execution = self.execute_step(&current, *step, &execution.parameters);
                    if let Some(failure) = &step_execution.failure {
                        last_failure = Some(failure.clone());
                    }
                    let outcome = step_execution.exit_status().to_string();
                    execution.step_executions.push(step_execution);
                    outcome
                }
                Some(FlowNode::Decision(decider)) => {
                    match decider.decide(&execution.parameters) {
                        Ok(outcome) => {
                            info!("Decision {} returned {}", current, outcome);
                            outcome
                        }
                        Err(err) => {
                            error!("Decision {} failed: {}", current, err);
                            last_failure = Some(err);
                            FAILED.to_string()
                        }
                    }
                }
                None => {
                    last_failure = Some(BatchError::Configuration(format!(
                        "node {} is not part of job {}",
                        current, self.name
                    )));
                    FAILED.to_string()
                }
            };

            match self.flow.next(&current, &outcome) {
                Some(next) => {
                    debug!("{} --{}--> {}", current, outcome, next);
                    current = next.to_string();
                }
                None if outcome == FAILED => {
                    execution.status = BatchStatus::Failed;
                    execution.failure =
                        last_failure.or_else(|| Some(BatchError::Step(current.clone())));
                    return;
                }
                None => {
                    debug!("No transition from {} on {}, ending job", current, outcome);
                    execution.status = BatchStatus::Completed;
                    return;
                }
            }
        }
    }

    fn execute_step(
        &self,
        node: &str,
        step: &dyn Step,
        parameters: &JobParameters,
    ) -> StepExecution {
        let mut step_execution = StepExecution::new(step.get_name());

        if let Err(err) = step.execute(&mut step_execution, parameters) {
            error!("Step {} failed ({:?}): {}", step.get_name(), err.kind(), err);
        }

        if let Some(listeners) = self.step_listeners.get(node) {
            for listener in listeners {
                Self::manage_listener_error(
                    step.get_name(),
                    listener.after_step(&step_execution, parameters),
                );
            }
        }

        step_execution
    }

    fn manage_listener_error(owner: &str, result: Result<(), BatchError>) {
        if let Err(err) = result {
            warn!("Listener of {} failed: {}", owner, err);
        }
    }
}

/// Builder for creating a job instance.
///
/// ```
/// use order_batch::core::{
///     flow::{JobParametersDecider, CONTINUE},
///     job::{Job, JobBuilder},
///     parameters::JobParameters,
///     step::{Step, StepExecution},
/// };
/// use order_batch::BatchError;
///
/// struct Noop(&'static str);
///
/// impl Step for Noop {
///     fn get_name(&self) -> &str {
///         self.0
///     }
///
///     fn execute(&self, _: &mut StepExecution, _: &JobParameters) -> Result<(), BatchError> {
///         Ok(())
///     }
/// }
///
/// let (seed, report) = (Noop("seed"), Noop("report"));
/// let decider = JobParametersDecider::new("date");
///
/// let job = JobBuilder::new()
///     .name("monthly")
///     .start(&seed)
///     .decision("hasDate", &decider)
///     .on(CONTINUE)
///     .to(&report)
///     .build()
///     .unwrap();
///
/// let execution = job.run(&JobParameters::new()).unwrap();
/// assert!(execution.is_completed());
/// assert!(execution.step_execution("report").is_none());
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    entry: Option<String>,
    /// Node that the next transition leaves from
    current: Option<String>,
    nodes: HashMap<String, FlowNode<'a>>,
    edges: Vec<FlowEdge>,
    step_listeners: HashMap<String, Vec<&'a dyn StepExecutionListener>>,
    job_listeners: Vec<&'a dyn JobExecutionListener>,
    incrementer: Option<RunIdIncrementer<'a>>,
    errors: Vec<String>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the entry step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> Self {
        let name = self.add_node(step.get_name(), FlowNode::Step(step));
        if self.entry.is_some() {
            self.errors
                .push(format!("entry node is already set, cannot start at {}", name));
        } else {
            self.entry = Some(name.clone());
        }
        self.current = Some(name);
        self
    }

    /// Adds a step reached when the current node ends `COMPLETED`.
    pub fn next(self, step: &'a dyn Step) -> Self {
        self.link(COMPLETED, step.get_name(), FlowNode::Step(step))
    }

    /// Adds a named decision reached when the current node ends `COMPLETED`.
    pub fn decision(self, name: &str, decider: &'a dyn JobExecutionDecider) -> Self {
        self.link(COMPLETED, name, FlowNode::Decision(decider))
    }

    /// Starts a transition from the current node on `outcome`.
    pub fn on(self, outcome: &str) -> TransitionBuilder<'a> {
        TransitionBuilder {
            builder: self,
            outcome: outcome.to_string(),
        }
    }

    /// Moves back to an already added node, to declare more transitions from it.
    pub fn from(mut self, node: &str) -> Self {
        if self.nodes.contains_key(node) {
            self.current = Some(node.to_string());
        } else {
            self.errors.push(format!("unknown node {}", node));
        }
        self
    }

    /// Registers a listener on the current step.
    pub fn listener(mut self, listener: &'a dyn StepExecutionListener) -> Self {
        match &self.current {
            Some(current) if matches!(self.nodes.get(current), Some(FlowNode::Step(_))) => {
                self.step_listeners
                    .entry(current.clone())
                    .or_default()
                    .push(listener);
            }
            _ => self
                .errors
                .push("a step listener must follow a step".to_string()),
        }
        self
    }

    pub fn job_listener(mut self, listener: &'a dyn JobExecutionListener) -> Self {
        self.job_listeners.push(listener);
        self
    }

    /// Draws run ids from the incrementer's repository instead of a private in-memory one.
    pub fn incrementer(mut self, incrementer: RunIdIncrementer<'a>) -> Self {
        self.incrementer = Some(incrementer);
        self
    }

    pub fn build(self) -> Result<JobInstance<'a>, BatchError> {
        if !self.errors.is_empty() {
            return Err(BatchError::Configuration(self.errors.join("; ")));
        }

        let entry = self.entry.ok_or_else(|| {
            BatchError::Configuration("a job needs an entry step".to_string())
        })?;

        let flow = Flow::new(&entry, self.nodes, self.edges)?;

        Ok(JobInstance {
            name: self.name.unwrap_or_else(build_name),
            flow,
            step_listeners: self.step_listeners,
            job_listeners: self.job_listeners,
            incrementer: self.incrementer,
            local_repository: InMemoryJobRepository::new(),
        })
    }

    fn add_node(&mut self, name: &str, node: FlowNode<'a>) -> String {
        if self.nodes.insert(name.to_string(), node).is_some() {
            self.errors.push(format!("duplicate node {}", name));
        }
        name.to_string()
    }

    fn link(mut self, outcome: &str, name: &str, node: FlowNode<'a>) -> Self {
        let name = self.add_node(name, node);
        match self.current.take() {
            Some(from) => self.edges.push(FlowEdge::new(&from, outcome, &name)),
            None => {
                self.errors
                    .push(format!("{} must follow a start step", name));
            }
        }
        self.current = Some(name);
        self
    }
}

/// A pending `on(outcome)` transition.
pub struct TransitionBuilder<'a> {
    builder: JobBuilder<'a>,
    outcome: String,
}

impl<'a> TransitionBuilder<'a> {
    pub fn to(self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.builder
            .link(&self.outcome, step.get_name(), FlowNode::Step(step))
    }

    pub fn to_decision(self, name: &str, decider: &'a dyn JobExecutionDecider) -> JobBuilder<'a> {
        self.builder
            .link(&self.outcome, name, FlowNode::Decision(decider))
    }
}
