//! Interactive terminal bridge types
//!
//! Both the engine exec path and the remote shell path hand back a
//! `TerminalBridge`: output bytes flow out through one channel, keystrokes and
//! window size changes flow in through the other. The task pumping the
//! underlying session ends when either side closes.

use tokio::sync::mpsc;

use crate::error::ExecError;

/// Shell selection run inside containers: prefer bash, fall back to sh
pub const CONTAINER_SHELL: &str = "command -v bash >/dev/null && exec bash || exec sh";

/// Terminal type advertised when allocating a pseudo-terminal
pub const TERM: &str = "xterm-256color";

const BRIDGE_CAPACITY: usize = 256;

/// Terminal window size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
}

impl PtySize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Default size for a host login shell
    #[must_use]
    pub fn host_default() -> Self {
        Self::new(80, 24)
    }

    /// Default size for a container shell
    #[must_use]
    pub fn container_default() -> Self {
        Self::new(120, 40)
    }
}

/// Input accepted by a running terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    Data(Vec<u8>),
    Resize(PtySize),
}

/// What a remote shell terminal should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalTarget {
    /// The login user's shell on the host
    HostShell,
    /// A shell inside the given container, through the engine CLI
    ContainerExec(String),
}

impl TerminalTarget {
    /// Command to run on the host, or `None` for a login shell
    ///
    /// # Errors
    /// Returns `ExecError::InvalidContainerRef` for ids that are unsafe to
    /// interpolate
    pub fn command(&self) -> Result<Option<String>, ExecError> {
        match self {
            Self::HostShell => Ok(None),
            Self::ContainerExec(id) => container_exec_command(id).map(Some),
        }
    }

    /// Default window size for this target
    #[must_use]
    pub fn default_size(&self) -> PtySize {
        match self {
            Self::HostShell => PtySize::host_default(),
            Self::ContainerExec(_) => PtySize::container_default(),
        }
    }
}

/// Client side of a live terminal
#[derive(Debug)]
pub struct TerminalBridge {
    /// Bytes produced by the remote process
    pub output: mpsc::Receiver<Vec<u8>>,
    /// Keystrokes and resize requests
    pub input: mpsc::Sender<TerminalInput>,
}

/// Session side of a live terminal, owned by the pump task
#[derive(Debug)]
pub struct TerminalEnds {
    pub output: mpsc::Sender<Vec<u8>>,
    pub input: mpsc::Receiver<TerminalInput>,
}

impl TerminalBridge {
    /// Create a connected bridge / session pair
    #[must_use]
    pub fn pair() -> (TerminalBridge, TerminalEnds) {
        let (output_tx, output_rx) = mpsc::channel(BRIDGE_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(BRIDGE_CAPACITY);
        (
            TerminalBridge {
                output: output_rx,
                input: input_tx,
            },
            TerminalEnds {
                output: output_tx,
                input: input_rx,
            },
        )
    }
}

/// Whether `id` is a plain container id or name
#[must_use]
pub fn is_valid_container_ref(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Engine CLI command opening an interactive shell in a container
///
/// # Errors
/// Returns `ExecError::InvalidContainerRef` for unsafe ids
pub fn container_exec_command(id: &str) -> Result<String, ExecError> {
    if !is_valid_container_ref(id) {
        return Err(ExecError::InvalidContainerRef(id.to_string()));
    }
    Ok(format!("docker exec -it {id} sh -c '{CONTAINER_SHELL}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_exec_command() {
        let cmd = container_exec_command("3f2a9c1b7d0e").unwrap();
        assert_eq!(
            cmd,
            "docker exec -it 3f2a9c1b7d0e sh -c 'command -v bash >/dev/null && exec bash || exec sh'"
        );
    }

    #[test]
    fn test_rejects_shell_metacharacters() {
        assert!(container_exec_command("web; rm -rf /").is_err());
        assert!(container_exec_command("").is_err());
        assert!(is_valid_container_ref("my_app-1.web"));
    }

    #[test]
    fn test_target_defaults() {
        assert_eq!(TerminalTarget::HostShell.command().unwrap(), None);
        assert_eq!(TerminalTarget::HostShell.default_size(), PtySize::new(80, 24));
        assert_eq!(
            TerminalTarget::ContainerExec("abc".into()).default_size(),
            PtySize::new(120, 40)
        );
    }

    #[tokio::test]
    async fn test_bridge_pair_is_connected() {
        let (mut bridge, mut ends) = TerminalBridge::pair();

        ends.output.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(bridge.output.recv().await.unwrap(), b"hello".to_vec());

        bridge
            .input
            .send(TerminalInput::Resize(PtySize::new(100, 30)))
            .await
            .unwrap();
        assert_eq!(
            ends.input.recv().await.unwrap(),
            TerminalInput::Resize(PtySize::new(100, 30))
        );
    }
}
