//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled     |
//! |------------|----------------------|
//! | `init`     | `Init`               |
//! | `serve`    | `Serve`              |
//! | `run`      | `Run`, `Replay`      |
//! | `projects` | `Projects`           |
//! | `config`   | `Config`             |

pub mod config;
pub mod init;
pub mod projects;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use projects::cmd_projects;
pub use run::{cmd_replay, cmd_run};
pub use serve::cmd_serve;
