//! Environment passed to spawned commands.
//!
//! Children never inherit the dispatcher's environment. By default they get
//! exactly one variable, `PATH`.

use std::collections::HashMap;

/// Variables removed from any environment handed to a child.
///
/// These can inject code into the child or redirect its network traffic.
pub const ALWAYS_STRIP: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "BASH_ENV",
    "ENV",
    "IFS",
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "PERL5LIB",
    "PERL5OPT",
    "RUBYOPT",
    "NODE_OPTIONS",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

/// Search path used when the dispatcher itself has no `PATH`.
pub const FALLBACK_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Policy for the child environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Only `PATH`, set to the given search path.
    SearchPathOnly(String),

    /// A fixed set of variables. `ALWAYS_STRIP` still applies.
    Fixed(HashMap<String, String>),
}

impl Default for EnvPolicy {
    fn default() -> Self {
        EnvPolicy::SearchPathOnly(inherited_search_path())
    }
}

impl EnvPolicy {
    /// Produce the environment for a child.
    pub fn build(&self) -> HashMap<String, String> {
        let mut env = match self {
            EnvPolicy::SearchPathOnly(path) => HashMap::from([("PATH".to_string(), path.clone())]),
            EnvPolicy::Fixed(fixed) => fixed.clone(),
        };
        for key in ALWAYS_STRIP {
            env.remove(*key);
        }
        env
    }

    /// The search path children see, also used to resolve allowlisted names.
    pub fn search_path(&self) -> String {
        match self {
            EnvPolicy::SearchPathOnly(path) => path.clone(),
            EnvPolicy::Fixed(fixed) => fixed
                .get("PATH")
                .cloned()
                .unwrap_or_else(|| FALLBACK_SEARCH_PATH.to_string()),
        }
    }
}

/// The dispatcher's own `PATH`, or [`FALLBACK_SEARCH_PATH`].
pub fn inherited_search_path() -> String {
    std::env::var("PATH")
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| FALLBACK_SEARCH_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_path_only() {
        let policy = EnvPolicy::SearchPathOnly("/opt/bin:/bin".to_string());
        let env = policy.build();

        assert_eq!(env.len(), 1);
        assert_eq!(env.get("PATH"), Some(&"/opt/bin:/bin".to_string()));
        assert_eq!(policy.search_path(), "/opt/bin:/bin");
    }

    #[test]
    fn test_fixed_strips_dangerous() {
        let policy = EnvPolicy::Fixed(HashMap::from([
            ("PATH".to_string(), "/bin".to_string()),
            ("LANG".to_string(), "C.UTF-8".to_string()),
            ("LD_PRELOAD".to_string(), "/evil.so".to_string()),
        ]));
        let env = policy.build();

        assert!(env.contains_key("PATH"));
        assert!(env.contains_key("LANG"));
        assert!(!env.contains_key("LD_PRELOAD"));
    }

    #[test]
    fn test_fixed_without_path_falls_back() {
        let policy = EnvPolicy::Fixed(HashMap::new());
        assert_eq!(policy.search_path(), FALLBACK_SEARCH_PATH);
    }

    #[test]
    fn test_default_never_empty() {
        assert!(!EnvPolicy::default().search_path().is_empty());
    }
}
