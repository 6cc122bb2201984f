//! Command registry and execution resolution.
//!
//! The registry is the only authorization boundary: a parsed command runs
//! only if its name is an exact key here, and only with the argv its
//! entry's [`ArgPolicy`] produced.

use crate::arg_policy::ArgPolicy;
use crate::env_policy::inherited_search_path;
use crate::error::{RegistryError, Rejection};
use crate::request::{ExecutionRequest, ParsedCommand};
use crate::resolve_bin::resolve_executable;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One allowlisted command.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    name: String,
    program: PathBuf,
    policy: ArgPolicy,
}

impl CommandEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn policy(&self) -> &ArgPolicy {
        &self.policy
    }
}

/// Immutable map from command name to resolved executable and argument policy.
///
/// Create using `CommandRegistry::builder()`.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    entries: HashMap<String, CommandEntry>,
    max_arg_len: usize,
}

impl CommandRegistry {
    /// Create a new registry builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Authorize a parsed command and produce its execution request.
    ///
    /// Absence from the registry and a policy refusal are both plain
    /// rejections, indistinguishable to the caller of the dispatch loop.
    ///
    /// # Errors
    ///
    /// - `NotAllowed` if the name is not a registry key
    /// - any rejection from the entry's `ArgPolicy`
    /// - `ArgTooLong` / `ArgContainsNul` if a produced argument breaks the
    ///   global caps
    pub fn resolve(&self, parsed: &ParsedCommand) -> Result<ExecutionRequest, Rejection> {
        let entry = self.entries.get(parsed.name()).ok_or(Rejection::NotAllowed)?;

        let args = entry.policy.build(parsed.args())?;

        for (index, arg) in args.iter().enumerate() {
            if arg.len() > self.max_arg_len {
                return Err(Rejection::ArgTooLong {
                    index,
                    max: self.max_arg_len,
                    got: arg.len(),
                });
            }
            if arg.contains('\0') {
                return Err(Rejection::ArgContainsNul { index });
            }
        }

        Ok(ExecutionRequest {
            command: entry.name.clone(),
            program: entry.program.clone(),
            args,
        })
    }

    /// Look up an entry by exact name.
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for `CommandRegistry`.
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    /// Names to resolve, with their policies. Later duplicates replace earlier.
    commands: Vec<(String, ArgPolicy)>,

    /// Entries whose executable the caller supplied directly.
    explicit: Vec<(String, PathBuf, ArgPolicy)>,

    /// Directories searched for bare names.
    search_path: String,

    /// Global per-argument cap applied after every policy.
    max_arg_len: usize,
}

impl RegistryBuilder {
    /// Create a new builder searching the dispatcher's own `PATH`.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            explicit: Vec::new(),
            search_path: inherited_search_path(),
            max_arg_len: crate::limits::ParseLimits::default().max_segment_len,
        }
    }

    /// Allow a command with the default bounded policy.
    pub fn allow(self, name: impl Into<String>) -> Self {
        self.allow_with(name, ArgPolicy::default())
    }

    /// Allow a command with a specific argument policy.
    pub fn allow_with(mut self, name: impl Into<String>, policy: ArgPolicy) -> Self {
        self.commands.push((name.into(), policy));
        self
    }

    /// Allow a command bound to an explicit executable path.
    ///
    /// The path is canonicalized and checked at build time.
    pub fn allow_program(
        mut self,
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        policy: ArgPolicy,
    ) -> Self {
        self.explicit.push((name.into(), program.into(), policy));
        self
    }

    /// Set the colon-separated search path for bare names.
    pub fn search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = path.into();
        self
    }

    /// Set the global per-argument cap.
    pub fn max_arg_len(mut self, max: usize) -> Self {
        self.max_arg_len = max;
        self
    }

    /// Resolve every name and build the registry.
    ///
    /// Names that fail to resolve are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Empty` if nothing resolved.
    pub fn build(self) -> Result<CommandRegistry, RegistryError> {
        let mut entries = HashMap::new();

        for (name, policy) in self.commands {
            match resolve_executable(&name, &self.search_path) {
                Ok(program) => {
                    tracing::debug!(command = %name, program = %program.display(), "registered command");
                    entries.insert(
                        name.clone(),
                        CommandEntry {
                            name,
                            program,
                            policy,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(command = %name, error = %err, "dropping allowlisted command");
                }
            }
        }

        for (name, program, policy) in self.explicit {
            match explicit_entry(&name, &program) {
                Ok(program) => {
                    entries.insert(
                        name.clone(),
                        CommandEntry {
                            name,
                            program,
                            policy,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(command = %name, error = %err, "dropping allowlisted command");
                }
            }
        }

        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(CommandRegistry {
            entries,
            max_arg_len: self.max_arg_len,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn explicit_entry(name: &str, program: &Path) -> Result<PathBuf, RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
        });
    }
    let program_str = program.to_str().ok_or_else(|| RegistryError::InvalidName {
        name: name.to_string(),
    })?;
    // An empty search path leaves only the absolute-path branch
    resolve_executable(program_str, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = "/usr/bin:/bin";

    fn parsed(v: &[&str]) -> ParsedCommand {
        ParsedCommand::new(v.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn echo_registry() -> CommandRegistry {
        CommandRegistry::builder()
            .search_path(SEARCH)
            .allow("echo")
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolves_allowlisted_command() {
        let registry = echo_registry();
        let request = registry.resolve(&parsed(&["echo", "hi"])).unwrap();

        assert_eq!(request.command(), "echo");
        assert_eq!(request.program(), resolve_executable("echo", SEARCH).unwrap());
        assert_eq!(request.args(), ["hi".to_string()]);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let registry = echo_registry();
        assert_eq!(
            registry.resolve(&parsed(&["rm", "-rf", "/"])),
            Err(Rejection::NotAllowed)
        );
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = echo_registry();
        for name in ["ECHO", "echo ", "/bin/echo", "ech"] {
            assert_eq!(
                registry.resolve(&parsed(&[name])),
                Err(Rejection::NotAllowed),
                "name: {name:?}"
            );
        }
    }

    #[test]
    fn test_policy_applied() {
        let registry = CommandRegistry::builder()
            .search_path(SEARCH)
            .allow_with("echo", ArgPolicy::NoArgs)
            .build()
            .unwrap();

        assert!(registry.resolve(&parsed(&["echo"])).unwrap().args().is_empty());
        assert!(matches!(
            registry.resolve(&parsed(&["echo", "x"])),
            Err(Rejection::TooManyArgs { .. })
        ));
    }

    #[test]
    fn test_global_cap_applies_after_policy() {
        let registry = CommandRegistry::builder()
            .search_path(SEARCH)
            .allow_with(
                "echo",
                ArgPolicy::custom(|raw| Ok(raw.iter().map(|a| a.repeat(10)).collect())),
            )
            .max_arg_len(20)
            .build()
            .unwrap();

        assert!(registry.resolve(&parsed(&["echo", "ab"])).is_ok());
        assert!(matches!(
            registry.resolve(&parsed(&["echo", "abc"])),
            Err(Rejection::ArgTooLong { index: 0, max: 20, got: 30 })
        ));
    }

    #[test]
    fn test_nul_argument_rejected() {
        let registry = echo_registry();
        assert_eq!(
            registry.resolve(&parsed(&["echo", "a\0b"])),
            Err(Rejection::ArgContainsNul { index: 0 })
        );
    }

    #[test]
    fn test_unresolvable_names_dropped() {
        let registry = CommandRegistry::builder()
            .search_path(SEARCH)
            .allow("echo")
            .allow("definitely-not-a-command-xyz")
            .build()
            .unwrap();

        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("definitely-not-a-command-xyz").is_none());
    }

    #[test]
    fn test_empty_registry_is_error() {
        let result = CommandRegistry::builder()
            .search_path(SEARCH)
            .allow("definitely-not-a-command-xyz")
            .build();
        assert!(matches!(result, Err(RegistryError::Empty)));

        assert!(matches!(
            CommandRegistry::builder().build(),
            Err(RegistryError::Empty)
        ));
    }

    #[test]
    fn test_explicit_program() {
        let echo = resolve_executable("echo", SEARCH).unwrap();
        let registry = CommandRegistry::builder()
            .allow_program("say", echo.clone(), ArgPolicy::default())
            .build()
            .unwrap();

        let request = registry.resolve(&parsed(&["say", "hi"])).unwrap();
        assert_eq!(request.program(), echo);
        assert_eq!(request.command(), "say");
        assert_eq!(registry.resolve(&parsed(&["echo"])), Err(Rejection::NotAllowed));

        let entry = registry.get("say").unwrap();
        assert_eq!(entry.name(), "say");
        assert_eq!(entry.program(), echo);
        assert!(matches!(entry.policy(), ArgPolicy::Bounded { .. }));
        assert!(!registry.is_empty());
    }
}
