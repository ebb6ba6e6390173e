//! Start/stop detection across aggregation passes

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use fleetdeck_api::models::{ContainerSnapshot, ContainerState};

/// A detected lifecycle change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    Started,
    Stopped,
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// One change observed for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub host_id: String,
    pub container_id: String,
    pub name: String,
    pub change: StateChange,
}

#[derive(Debug)]
struct Entry {
    state: ContainerState,
    missed: u32,
}

/// Last seen state per `(host, container)`
///
/// Entries for containers missing from `eviction_passes` consecutive passes
/// of their host are dropped, so the map stays proportional to the live fleet.
#[derive(Debug)]
pub struct LifecycleTracker {
    eviction_passes: u32,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl LifecycleTracker {
    #[must_use]
    pub fn new(eviction_passes: u32) -> Self {
        Self {
            eviction_passes: eviction_passes.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record one pass of a host's listing and return the transitions it implies
    ///
    /// Only exited to running and running to exited count; the first sighting
    /// of a container never produces a transition.
    pub fn observe(&self, host_id: &str, containers: &[ContainerSnapshot]) -> Vec<Transition> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut transitions = Vec::new();

        for c in containers {
            let key = (host_id.to_string(), c.id.clone());
            match entries.get_mut(&key) {
                Some(entry) => {
                    let change = match (entry.state, c.state) {
                        (ContainerState::Exited, ContainerState::Running) => {
                            Some(StateChange::Started)
                        }
                        (ContainerState::Running, ContainerState::Exited) => {
                            Some(StateChange::Stopped)
                        }
                        _ => None,
                    };
                    if let Some(change) = change {
                        transitions.push(Transition {
                            host_id: host_id.to_string(),
                            container_id: c.id.clone(),
                            name: c.name.clone(),
                            change,
                        });
                    }
                    entry.state = c.state;
                    entry.missed = 0;
                }
                None => {
                    entries.insert(
                        key,
                        Entry {
                            state: c.state,
                            missed: 0,
                        },
                    );
                }
            }
        }

        let eviction_passes = self.eviction_passes;
        entries.retain(|(host, id), entry| {
            if host != host_id || containers.iter().any(|c| &c.id == id) {
                return true;
            }
            entry.missed += 1;
            entry.missed < eviction_passes
        });

        transitions
    }

    /// Drop every entry for a host
    pub fn forget_host(&self, host_id: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(host, _), _| host != host_id);
    }

    /// Number of tracked containers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
