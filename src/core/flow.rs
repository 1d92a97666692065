//! # Flow
//!
//! Conditional routing between the nodes of a job.
//!
//! A job is a directed graph: nodes are steps or decisions, edges are [`FlowEdge`]s
//! keyed by `(node, outcome)`. After a node finishes, its outcome is looked up in the
//! edge table to find the next node. Outcome labels are case-sensitive; an outcome with
//! no matching edge ends the job at that node.

use std::collections::HashMap;

use crate::BatchError;

use super::{
    parameters::{JobParameters, YearMonth},
    step::Step,
};

/// Outcome of a step that ended successfully.
pub const COMPLETED: &str = "COMPLETED";
/// Outcome of a step that failed, or of a decision that could not be made.
pub const FAILED: &str = "FAILED";
/// Decision outcome: continue with the optional part of the flow.
pub const CONTINUE: &str = "CONTINUE";
/// Decision outcome: skip the optional part of the flow.
pub const SKIP: &str = "SKIP";

/// Picks the next node of a job from its launch parameters.
///
/// A decider is a pure function of the parameters: calling it twice with the same
/// parameters returns the same outcome, and it never looks at step executions.
pub trait JobExecutionDecider {
    fn decide(&self, parameters: &JobParameters) -> Result<String, BatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterFormat {
    Any,
    YearMonth,
}

/// Returns [`CONTINUE`] when a parameter is present and not blank, [`SKIP`] otherwise.
///
/// ```
/// use order_batch::core::flow::{JobExecutionDecider, JobParametersDecider, CONTINUE, SKIP};
/// use order_batch::core::parameters::JobParameters;
///
/// let decider = JobParametersDecider::new("date");
///
/// let with_date = JobParameters::new().with("date", "2020-11");
/// assert_eq!(decider.decide(&with_date).unwrap(), CONTINUE);
/// assert_eq!(decider.decide(&JobParameters::new()).unwrap(), SKIP);
/// ```
pub struct JobParametersDecider {
    key: String,
    format: ParameterFormat,
}

impl JobParametersDecider {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            format: ParameterFormat::Any,
        }
    }

    /// Requires a present value to be a year-month (`2020-11`); anything else is a
    /// [`BatchError::DecisionError`].
    pub fn year_month(mut self) -> Self {
        self.format = ParameterFormat::YearMonth;
        self
    }
}

impl JobExecutionDecider for JobParametersDecider {
    fn decide(&self, parameters: &JobParameters) -> Result<String, BatchError> {
        let value = match parameters.get_string(&self.key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Ok(SKIP.to_string()),
        };

        if self.format == ParameterFormat::YearMonth {
            value.parse::<YearMonth>().map_err(|_| {
                BatchError::DecisionError(format!(
                    "parameter {} = '{}' is not a year-month",
                    self.key, value
                ))
            })?;
        }

        Ok(CONTINUE.to_string())
    }
}

/// A node of the job graph.
pub enum FlowNode<'a> {
    Step(&'a dyn Step),
    Decision(&'a dyn JobExecutionDecider),
}

/// Transition `(from, on) -> to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub from: String,
    pub on: String,
    pub to: String,
}

impl FlowEdge {
    pub fn new(from: &str, on: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            on: on.to_string(),
            to: to.to_string(),
        }
    }
}

/// Named nodes, an entry node and the outcome-keyed edge table.
pub struct Flow<'a> {
    entry: String,
    nodes: HashMap<String, FlowNode<'a>>,
    edges: HashMap<(String, String), String>,
}

impl<'a> Flow<'a> {
    /// Builds a flow, checking that the entry and every edge end point are known nodes
    /// and that no `(node, outcome)` pair leads to two different nodes.
    pub fn new(
        entry: &str,
        nodes: HashMap<String, FlowNode<'a>>,
        edges: Vec<FlowEdge>,
    ) -> Result<Self, BatchError> {
        if !nodes.contains_key(entry) {
            return Err(BatchError::Configuration(format!(
                "entry node {} is not part of the flow",
                entry
            )));
        }

        let mut table = HashMap::with_capacity(edges.len());
        for edge in edges {
            for end in [&edge.from, &edge.to] {
                if !nodes.contains_key(end) {
                    return Err(BatchError::Configuration(format!(
                        "edge {} --{}--> {} refers to unknown node {}",
                        edge.from, edge.on, edge.to, end
                    )));
                }
            }

            let key = (edge.from.clone(), edge.on.clone());
            if let Some(existing) = table.get(&key) {
                if *existing != edge.to {
                    return Err(BatchError::Configuration(format!(
                        "outcome {} of {} leads to both {} and {}",
                        edge.on, edge.from, existing, edge.to
                    )));
                }
            }
            table.insert(key, edge.to);
        }

        Ok(Self {
            entry: entry.to_string(),
            nodes,
            edges: table,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&FlowNode<'a>> {
        self.nodes.get(name)
    }

    /// The node reached from `from` on `outcome`, if an edge matches.
    pub fn next(&self, from: &str, outcome: &str) -> Option<&str> {
        self.edges
            .get(&(from.to_string(), outcome.to_string()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl JobExecutionDecider for Fixed {
        fn decide(&self, _parameters: &JobParameters) -> Result<String, BatchError> {
            Ok(self.0.to_string())
        }
    }

    fn decisions<'a>(nodes: &[(&str, &'a Fixed)]) -> HashMap<String, FlowNode<'a>> {
        nodes
            .iter()
            .map(|(name, decider)| {
                (
                    name.to_string(),
                    FlowNode::Decision(*decider as &dyn JobExecutionDecider),
                )
            })
            .collect()
    }

    #[test]
    fn decider_should_be_deterministic() -> Result<(), BatchError> {
        let decider = JobParametersDecider::new("date");
        let parameters = JobParameters::new().with("date", "2020-11");

        assert_eq!(decider.decide(&parameters)?, CONTINUE);
        assert_eq!(decider.decide(&parameters)?, CONTINUE);
        assert_eq!(decider.decide(&JobParameters::new().with("date", " "))?, SKIP);
        Ok(())
    }

    #[test]
    fn malformed_year_month_should_be_a_decision_error() {
        let decider = JobParametersDecider::new("date").year_month();
        let result = decider.decide(&JobParameters::new().with("date", "2020-13"));
        assert!(matches!(result, Err(BatchError::DecisionError(_))));
    }

    #[test]
    fn edges_should_be_resolved_by_outcome() -> Result<(), BatchError> {
        let a = Fixed(CONTINUE);
        let b = Fixed(COMPLETED);
        let flow = Flow::new(
            "a",
            decisions(&[("a", &a), ("b", &b)]),
            vec![FlowEdge::new("a", CONTINUE, "b")],
        )?;

        assert_eq!(flow.entry(), "a");
        assert_eq!(flow.next("a", CONTINUE), Some("b"));
        assert_eq!(flow.next("a", "continue"), None);
        assert_eq!(flow.next("a", SKIP), None);
        Ok(())
    }

    #[test]
    fn conflicting_edges_should_be_rejected() {
        let a = Fixed(CONTINUE);
        let b = Fixed(COMPLETED);
        let c = Fixed(COMPLETED);
        let result = Flow::new(
            "a",
            decisions(&[("a", &a), ("b", &b), ("c", &c)]),
            vec![
                FlowEdge::new("a", CONTINUE, "b"),
                FlowEdge::new("a", CONTINUE, "c"),
            ],
        );
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn unknown_nodes_should_be_rejected() {
        let a = Fixed(CONTINUE);
        let result = Flow::new(
            "a",
            decisions(&[("a", &a)]),
            vec![FlowEdge::new("a", CONTINUE, "missing")],
        );
        assert!(matches!(result, Err(BatchError::Configuration(_))));

        let result = Flow::new("missing", decisions(&[("a", &a)]), Vec::new());
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
