pub mod models;
pub mod parser;

pub use models::{
    Defaults, EventConfig, ExprBool, ExprFloat, ExprInt, ExprValue, Job, JobContainer, JobNeeds,
    Matrix, RunDefaults, Step, Strategy, Trigger, Workflow, WorkflowInput,
};
pub use parser::WorkflowParser;
