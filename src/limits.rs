//! Input and resource limits.

use std::time::Duration;

/// Bounds applied while turning a log line into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Longest log line considered at all.
    ///
    /// Default: 10 000 bytes.
    pub max_line_len: usize,

    /// Longest extracted path.
    ///
    /// Default: 2048 bytes.
    pub max_path_len: usize,

    /// Most non-empty path segments (command name included).
    ///
    /// Default: 32.
    pub max_segments: usize,

    /// Longest segment, checked before and after percent-decoding.
    /// Also the global per-argument cap enforced by the resolver.
    ///
    /// Default: 256 bytes.
    pub max_segment_len: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_line_len: 10_000,
            max_path_len: 2048,
            max_segments: 32,
            max_segment_len: 256,
        }
    }
}

/// Limits applied to each spawned process.
///
/// When either limit is exceeded the process is killed with SIGKILL.
/// Output already forwarded is not retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Wall-clock timeout.
    ///
    /// Default: 10 seconds.
    pub timeout: Duration,

    /// Combined stdout + stderr bytes forwarded before the process is killed.
    ///
    /// Default: 64 KiB.
    pub max_output: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_output: 64 * 1024,
        }
    }
}

impl ResourceLimits {
    /// Set the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the combined output cap.
    pub fn with_max_output(mut self, max: usize) -> Self {
        self.max_output = max;
        self
    }
}
