//! CLI command implementations.
//!
//! | Module    | Commands handled                          |
//! |-----------|-------------------------------------------|
//! | `run`     | `Run`                                     |
//! | `project` | `Init`, `Status`, `Steps`, `Agents`, `Reset` |

pub mod project;
pub mod run;

pub use project::{cmd_agents, cmd_init, cmd_reset, cmd_status, cmd_steps};
pub use run::run_workflow;
