// Job Graph Planner
// Orders workflow jobs by their `needs` with a depth-first post-order visit

use crate::workflow::Workflow;

use std::collections::HashMap;
use std::fmt;

/// Error type for graph operations
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// Reference to an undeclared job
    UnknownDependency,
    /// Nothing to run
    EmptyPlan,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn cyclic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::CyclicDependency,
        }
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::UnknownDependency,
        }
    }

    pub fn empty_plan(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::EmptyPlan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

/// Plans the order jobs run in.
pub struct JobPlanner<'a> {
    workflow: &'a Workflow,
    state: HashMap<String, VisitState>,
    /// Jobs currently on the DFS stack, used to report cycle paths
    path: Vec<String>,
    order: Vec<String>,
}

impl<'a> JobPlanner<'a> {
    /// Plan `requested` and everything it transitively needs, or every job
    /// in declaration order when `requested` is `None`.
    ///
    /// A job is only appended after all of its `needs`, so the result is a
    /// valid sequential execution order.
    pub fn plan(workflow: &'a Workflow, requested: Option<&str>) -> Result<Vec<String>, GraphError> {
        let mut planner = Self {
            workflow,
            state: HashMap::new(),
            path: Vec::new(),
            order: Vec::new(),
        };

        match requested {
            Some(job_id) => {
                if !workflow.jobs.contains_key(job_id) {
                    return Err(GraphError::unknown_dependency(format!(
                        "job '{}' is not declared in the workflow",
                        job_id
                    )));
                }
                planner.visit(job_id)?;
            }
            None => {
                for job_id in workflow.jobs.keys() {
                    planner.visit(job_id)?;
                }
            }
        }

        if planner.order.is_empty() {
            return Err(GraphError::empty_plan("no jobs resolved for execution"));
        }
        Ok(planner.order)
    }

    fn visit(&mut self, job_id: &str) -> Result<(), GraphError> {
        match self.state.get(job_id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Visiting) => {
                let start = self.path.iter().position(|id| id == job_id).unwrap_or(0);
                let mut cycle: Vec<&str> = self.path[start..].iter().map(String::as_str).collect();
                cycle.push(job_id);
                return Err(GraphError::cyclic(format!(
                    "circular dependency detected: {}",
                    cycle.join(" -> ")
                )));
            }
            None => {}
        }

        let workflow = self.workflow;
        let job = workflow.jobs.get(job_id).ok_or_else(|| {
            let parent = self.path.last().map(String::as_str).unwrap_or("<workflow>");
            GraphError::unknown_dependency(format!(
                "job '{}' needs undeclared job '{}'",
                parent, job_id
            ))
        })?;

        self.state.insert(job_id.to_string(), VisitState::Visiting);
        self.path.push(job_id.to_string());

        for needed in job.needs.to_vec() {
            self.visit(&needed)?;
        }

        self.path.pop();
        self.state.insert(job_id.to_string(), VisitState::Done);
        self.order.push(job_id.to_string());
        Ok(())
    }
}

/// Group a planned order into levels whose jobs have no needs between them.
///
/// Used for display; the scheduler starts jobs as soon as their own needs
/// are done rather than waiting for a whole level.
pub fn parallel_levels(workflow: &Workflow, order: &[String]) -> Vec<Vec<String>> {
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for job_id in order {
        let level = workflow
            .jobs
            .get(job_id)
            .map(|job| {
                job.needs
                    .to_vec()
                    .iter()
                    .filter_map(|need| level_of.get(need.as_str()))
                    .map(|l| l + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        level_of.insert(job_id.as_str(), level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(job_id.clone());
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::models::{Job, JobNeeds};

    fn make_workflow(jobs: Vec<(&str, Vec<&str>)>) -> Workflow {
        let yaml = "on: push\njobs: {}\n";
        let mut workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        for (id, needs) in jobs {
            workflow.jobs.insert(
                id.to_string(),
                Job {
                    needs: JobNeeds::from(needs),
                    ..Default::default()
                },
            );
        }
        workflow
    }

    #[test]
    fn test_requested_job_pulls_in_needs() {
        let workflow = make_workflow(vec![("A", vec![]), ("B", vec!["A"]), ("C", vec!["B"])]);
        let order = JobPlanner::plan(&workflow, Some("C")).unwrap();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_requested_job_excludes_unrelated() {
        let workflow = make_workflow(vec![("A", vec![]), ("B", vec!["A"]), ("X", vec![])]);
        let order = JobPlanner::plan(&workflow, Some("B")).unwrap();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn test_undeclared_requested_job() {
        let workflow = make_workflow(vec![("A", vec![])]);
        let err = JobPlanner::plan(&workflow, Some("nope")).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::UnknownDependency);
    }

    #[test]
    fn test_undeclared_need() {
        let workflow = make_workflow(vec![("A", vec!["ghost"])]);
        let err = JobPlanner::plan(&workflow, None).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::UnknownDependency);
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_whole_workflow_runs_each_job_once() {
        let workflow = make_workflow(vec![
            ("deploy", vec!["test", "build"]),
            ("test", vec!["build"]),
            ("build", vec![]),
            ("lint", vec![]),
        ]);
        let order = JobPlanner::plan(&workflow, None).unwrap();
        assert_eq!(order.len(), 4);

        let pos = |id: &str| order.iter().position(|j| j == id).unwrap();
        assert!(pos("build") < pos("test"));
        assert!(pos("test") < pos("deploy"));
        assert_eq!(order, vec!["build", "test", "deploy", "lint"]);
    }

    #[test]
    fn test_cycle_detection() {
        let workflow = make_workflow(vec![("A", vec!["C"]), ("B", vec!["A"]), ("C", vec!["B"])]);
        let err = JobPlanner::plan(&workflow, None).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::CyclicDependency);
        assert!(err.message.contains("A -> C -> B -> A"));
    }

    #[test]
    fn test_self_cycle() {
        let workflow = make_workflow(vec![("A", vec!["A"])]);
        let err = JobPlanner::plan(&workflow, Some("A")).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::CyclicDependency);
    }

    #[test]
    fn test_empty_workflow() {
        let workflow = make_workflow(vec![]);
        let err = JobPlanner::plan(&workflow, None).unwrap_err();
        assert_eq!(err.kind, GraphErrorKind::EmptyPlan);
    }

    #[test]
    fn test_parallel_levels() {
        let workflow = make_workflow(vec![
            ("build", vec![]),
            ("lint", vec![]),
            ("test", vec!["build"]),
            ("deploy", vec!["test", "lint"]),
        ]);
        let order = JobPlanner::plan(&workflow, None).unwrap();
        let levels = parallel_levels(&workflow, &order);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec!["build", "lint"]);
        assert_eq!(levels[1], vec!["test"]);
        assert_eq!(levels[2], vec!["deploy"]);
    }
}
