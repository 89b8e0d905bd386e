//! Per-execution resource limits.

use std::time::Duration;

use crate::config::SandboxConfig;
use crate::errors::JamError;

/// CFS accounting period used with the CPU quota, in microseconds
pub const CPU_PERIOD_MICROS: i64 = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct LimitPolicy {
    pub timeout: Duration,
    /// Docker-style size string, passed verbatim to the CLI backend
    pub memory_limit: String,
    /// Fraction of one CPU core
    pub cpu_limit: f64,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl LimitPolicy {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_seconds),
            memory_limit: config.memory_limit.clone(),
            cpu_limit: config.cpu_limit,
        }
    }

    pub fn memory_bytes(&self) -> Result<i64, JamError> {
        parse_memory_limit(&self.memory_limit)
    }

    /// CPU quota per period: `cpu_limit * 100000` microseconds.
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_limit * CPU_PERIOD_MICROS as f64).round() as i64
    }
}

/// Parses sizes like `128m`, `1g`, `512k`, `64mb` or a bare byte count.
pub fn parse_memory_limit(value: &str) -> Result<i64, JamError> {
    let normalized = value.trim().to_lowercase();
    let trimmed = normalized.strip_suffix('b').unwrap_or(&normalized);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024_i64),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };

    let amount: i64 = digits.trim().parse().map_err(|_| {
        JamError::ValidationError(format!("Invalid memory limit '{}'", value))
    })?;
    if amount <= 0 {
        return Err(JamError::ValidationError(format!(
            "Memory limit must be positive, got '{}'",
            value
        )));
    }

    amount.checked_mul(multiplier).ok_or_else(|| {
        JamError::ValidationError(format!("Memory limit '{}' is too large", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_units() {
        assert_eq!(parse_memory_limit("128m").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_memory_limit("128MB").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_memory_limit("4096").unwrap(), 4096);
    }

    #[test]
    fn test_parse_memory_rejects_garbage() {
        assert!(parse_memory_limit("").is_err());
        assert!(parse_memory_limit("m").is_err());
        assert!(parse_memory_limit("-5m").is_err());
        assert!(parse_memory_limit("lots").is_err());
    }

    #[test]
    fn test_cpu_quota_uses_fixed_period() {
        let policy = LimitPolicy {
            cpu_limit: 0.8,
            ..LimitPolicy::default()
        };
        assert_eq!(policy.cpu_quota(), 80_000);

        let policy = LimitPolicy {
            cpu_limit: 2.0,
            ..LimitPolicy::default()
        };
        assert_eq!(policy.cpu_quota(), 200_000);
    }

    #[test]
    fn test_defaults_follow_config() {
        let policy = LimitPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.memory_limit, "128m");
        assert_eq!(policy.memory_bytes().unwrap(), 134_217_728);
    }
}
