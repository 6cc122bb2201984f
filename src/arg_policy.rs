//! Per-command argument policies.
//!
//! Every registry entry carries an `ArgPolicy` that turns the raw decoded
//! arguments into the final argv, or rejects them. Policies are chosen when
//! the registry is built and never change afterwards.

use crate::error::Rejection;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Signature of a caller-supplied argument builder.
pub type ArgBuilderFn = dyn Fn(&[String]) -> Result<Vec<String>, Rejection> + Send + Sync;

/// Default cap on argument count for the bounded policies.
pub const DEFAULT_MAX_ARGS: usize = 16;

/// Default cap on a single argument for the bounded policies.
pub const DEFAULT_MAX_ARG_LEN: usize = 256;

/// A caller-supplied builder, shared between clones of its policy.
#[derive(Clone)]
pub struct ArgBuilder(Arc<ArgBuilderFn>);

impl fmt::Debug for ArgBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgBuilder(..)")
    }
}

/// How a command's raw arguments become its argv.
#[derive(Debug, Clone)]
pub enum ArgPolicy {
    /// Pass arguments through unchanged, bounded in count and length (default).
    Bounded { max_args: usize, max_arg_len: usize },

    /// The command takes no arguments at all.
    NoArgs,

    /// Bounded, and no argument may start with `-`. A `--` terminator is
    /// prepended so the program treats everything as an operand.
    Positional { max_args: usize, max_arg_len: usize },

    /// Every argument must be one of a fixed set of values.
    Choices {
        values: HashSet<String>,
        max_args: usize,
    },

    /// Caller-supplied builder. A panic inside it is treated as a rejection.
    Custom(ArgBuilder),
}

impl Default for ArgPolicy {
    fn default() -> Self {
        ArgPolicy::Bounded {
            max_args: DEFAULT_MAX_ARGS,
            max_arg_len: DEFAULT_MAX_ARG_LEN,
        }
    }
}

impl ArgPolicy {
    /// Identity with the given bounds.
    pub fn bounded(max_args: usize, max_arg_len: usize) -> Self {
        ArgPolicy::Bounded {
            max_args,
            max_arg_len,
        }
    }

    /// Operands only, with the given bounds.
    pub fn positional(max_args: usize, max_arg_len: usize) -> Self {
        ArgPolicy::Positional {
            max_args,
            max_arg_len,
        }
    }

    /// Arguments drawn from a fixed set.
    pub fn choices(values: &[&str], max_args: usize) -> Self {
        ArgPolicy::Choices {
            values: values.iter().map(|s| s.to_string()).collect(),
            max_args,
        }
    }

    /// Wrap a closure as a policy.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[String]) -> Result<Vec<String>, Rejection> + Send + Sync + 'static,
    {
        ArgPolicy::Custom(ArgBuilder(Arc::new(f)))
    }

    /// Build the final argv from raw arguments.
    ///
    /// Total: every input yields either an argv or a `Rejection`.
    pub fn build(&self, raw: &[String]) -> Result<Vec<String>, Rejection> {
        match self {
            ArgPolicy::Bounded {
                max_args,
                max_arg_len,
            } => {
                check_bounds(raw, *max_args, *max_arg_len)?;
                Ok(raw.to_vec())
            }

            ArgPolicy::NoArgs => {
                check_count(raw, 0)?;
                Ok(Vec::new())
            }

            ArgPolicy::Positional {
                max_args,
                max_arg_len,
            } => {
                check_bounds(raw, *max_args, *max_arg_len)?;
                if let Some(index) = raw.iter().position(|a| a.starts_with('-')) {
                    return Err(Rejection::ArgLooksLikeOption { index });
                }
                let mut argv = Vec::with_capacity(raw.len() + 1);
                argv.push("--".to_string());
                argv.extend(raw.iter().cloned());
                Ok(argv)
            }

            ArgPolicy::Choices { values, max_args } => {
                check_count(raw, *max_args)?;
                if let Some(index) = raw.iter().position(|a| !values.contains(a)) {
                    return Err(Rejection::ArgNotAChoice { index });
                }
                Ok(raw.to_vec())
            }

            ArgPolicy::Custom(ArgBuilder(f)) => match catch_unwind(AssertUnwindSafe(|| f(raw))) {
                Ok(result) => result,
                Err(_) => Err(Rejection::BuilderRejected {
                    reason: "argument builder panicked".to_string(),
                }),
            },
        }
    }
}

fn check_count(raw: &[String], max: usize) -> Result<(), Rejection> {
    if raw.len() > max {
        return Err(Rejection::TooManyArgs {
            max,
            got: raw.len(),
        });
    }
    Ok(())
}

fn check_bounds(raw: &[String], max_args: usize, max_arg_len: usize) -> Result<(), Rejection> {
    check_count(raw, max_args)?;
    for (index, arg) in raw.iter().enumerate() {
        if arg.len() > max_arg_len {
            return Err(Rejection::ArgTooLong {
                index,
                max: max_arg_len,
                got: arg.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bounded_is_identity() {
        let policy = ArgPolicy::default();
        assert_eq!(policy.build(&s(&["a", "-b", "c d"])).unwrap(), s(&["a", "-b", "c d"]));
        assert!(policy.build(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_bounded_limits() {
        let policy = ArgPolicy::bounded(2, 3);
        assert!(policy.build(&s(&["abc", "de"])).is_ok());
        assert_eq!(
            policy.build(&s(&["a", "b", "c"])),
            Err(Rejection::TooManyArgs { max: 2, got: 3 })
        );
        assert_eq!(
            policy.build(&s(&["a", "abcd"])),
            Err(Rejection::ArgTooLong {
                index: 1,
                max: 3,
                got: 4
            })
        );
    }

    #[test]
    fn test_no_args() {
        assert!(ArgPolicy::NoArgs.build(&[]).unwrap().is_empty());
        assert_eq!(
            ArgPolicy::NoArgs.build(&s(&["x"])),
            Err(Rejection::TooManyArgs { max: 0, got: 1 })
        );
    }

    #[test]
    fn test_positional_injects_terminator() {
        let policy = ArgPolicy::positional(4, 64);
        assert_eq!(
            policy.build(&s(&["staging", "web"])).unwrap(),
            s(&["--", "staging", "web"])
        );
        assert_eq!(policy.build(&[]).unwrap(), s(&["--"]));
    }

    #[test]
    fn test_positional_rejects_options() {
        let policy = ArgPolicy::positional(4, 64);
        assert_eq!(
            policy.build(&s(&["ok", "--exec=rm"])),
            Err(Rejection::ArgLooksLikeOption { index: 1 })
        );
        // A lone dash is an option too under this policy
        assert!(policy.build(&s(&["-"])).is_err());
    }

    #[test]
    fn test_choices() {
        let policy = ArgPolicy::choices(&["staging", "production"], 1);
        assert_eq!(policy.build(&s(&["staging"])).unwrap(), s(&["staging"]));
        assert_eq!(
            policy.build(&s(&["dev"])),
            Err(Rejection::ArgNotAChoice { index: 0 })
        );
        assert!(matches!(
            policy.build(&s(&["staging", "production"])),
            Err(Rejection::TooManyArgs { .. })
        ));
    }

    #[test]
    fn test_custom_transforms() {
        let policy = ArgPolicy::custom(|raw| Ok(raw.iter().map(|a| a.to_uppercase()).collect()));
        assert_eq!(policy.build(&s(&["hi"])).unwrap(), s(&["HI"]));
    }

    #[test]
    fn test_custom_panic_is_rejection() {
        let policy = ArgPolicy::custom(|_| panic!("boom"));
        assert!(matches!(
            policy.build(&s(&["x"])),
            Err(Rejection::BuilderRejected { .. })
        ));
    }

    #[test]
    fn test_debug_hides_closure() {
        let policy = ArgPolicy::custom(|raw| Ok(raw.to_vec()));
        assert_eq!(format!("{policy:?}"), "Custom(ArgBuilder(..))");
    }
}
