//! Command execution: dispatch to the payment domain, reply templates, and
//! the per-session pipeline that ties parsing and context together.

mod executor;
mod pipeline;
pub mod responses;

pub use executor::AgentExecutor;
pub use pipeline::CommandPipeline;
