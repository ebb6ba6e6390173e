//! Result and settings types for remote execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Connection settings shared by every remote shell session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Login user
    #[serde(default = "default_user")]
    pub user: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-candidate connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_user() -> String {
    "pi".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    8
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl SshSettings {
    /// Per-candidate connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Set login user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let result = CommandResult {
            status: 1,
            stdout: "partial".into(),
            stderr: "denied".into(),
            duration: Duration::from_millis(3),
        };
        assert!(!result.success());
        assert_eq!(result.combined_output(), "partial\ndenied");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = SshSettings::default().with_port(2222);
        assert_eq!(settings.user, "pi");
        assert_eq!(settings.port, 2222);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(8));
    }
}
