//! # altd
//!
//! Access log tail dispatcher.
//!
//! `altd` follows a web server's access log and treats request paths as
//! command invocations: `GET /deploy/staging HTTP/1.1` runs the operator's
//! allowlisted `deploy` command with argument `staging`. The requester never
//! gets a shell; they can only pick from a fixed registry, and everything
//! they trigger is rate-limited, concurrency-limited, time-limited and
//! output-limited.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use altd::{CommandRegistry, DispatchConfig, Dispatcher, FileTail};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CommandRegistry::builder()
//!     .allow("echo")
//!     .build()?;
//!
//! let (lines, _tail) = FileTail::new("/var/log/nginx/access.log").start().await?;
//! let handle = Dispatcher::new(registry, DispatchConfig::default()).watch(lines);
//!
//! // `GET /echo/hello HTTP/1.1` appended to the log now runs `echo hello`
//! let reason = handle.wait().await;
//! println!("stopped: {reason:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`extract_path`]: find `METHOD target HTTP/x`, keep only the URL path
//! 2. [`parse_command`]: split on `/`, percent-decode each segment strictly
//! 3. [`CommandRegistry::resolve`]: exact-name lookup plus the command's
//!    [`ArgPolicy`]
//! 4. [`Governor`]: rate window, concurrency ceiling, minimum spacing
//! 5. [`Spawner`]: argv execution with a minimal environment, timeout and
//!    output cap
//!
//! A failure at any of steps 1–4 drops the line silently. Malformed input,
//! unknown commands and rate-limited requests look identical from outside.
//!
//! ## Platform Support
//!
//! Unix only.

#[cfg(windows)]
compile_error!(
    "altd does not support Windows. \
     Arguments must reach the child as a real argv, which CreateProcess does not provide."
);

mod arg_policy;
mod config;
mod dispatch;
mod env_policy;
mod error;
mod extract;
mod governor;
mod limits;
mod parse;
mod registry;
mod request;
mod resolve_bin;
mod spawner;
mod tail;

// Public API
pub use arg_policy::{ArgBuilder, ArgBuilderFn, ArgPolicy, DEFAULT_MAX_ARGS, DEFAULT_MAX_ARG_LEN};
pub use config::{CommandSection, Config, PolicyKind};
pub use dispatch::{DispatchConfig, DispatchHandle, DispatchState, Dispatcher, StopHandle, StopReason};
pub use env_policy::{inherited_search_path, EnvPolicy, ALWAYS_STRIP, FALLBACK_SEARCH_PATH};
pub use error::{ConfigError, RegistryError, Rejection, SpawnError};
pub use extract::extract_path;
pub use governor::{Governor, GovernorConfig, GovernorState};
pub use limits::{ParseLimits, ResourceLimits};
pub use parse::parse_command;
pub use registry::{CommandEntry, CommandRegistry, RegistryBuilder};
pub use request::{ExecutionRequest, ParsedCommand};
pub use resolve_bin::resolve_executable;
pub use spawner::{Completion, OutputMode, SpawnedProcess, Spawner};
pub use tail::{FileTail, LineBuffer, CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL};
