//! # Command-Line Interface
//!
//! User-facing `tg` commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Task | Create and change tasks | `add`, `edit`, `done`, `move`, `dep` |
//! | Query | Derived views | `tree`, `ready`, `blocked`, `stats`, `order` |
//! | Data | Backup and settings | `export`, `import`, `settings`, `info` |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! The default comes from `[output] default_format` in `config.toml`.
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`. Use `--verbose` (or `-v`)
//! for debug output, or set `RUST_LOG` for finer control:
//! ```bash
//! tg --verbose ready
//! RUST_LOG=taskgraph=trace tg tree
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod task;
mod query;
mod data;

pub use app::{open_manager, run, Cli, Commands, Manager};
pub use output::{Output, OutputFormat};
