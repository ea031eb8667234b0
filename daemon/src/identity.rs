//! Per-service process identity tracking

/// What is currently known about a service's process. `Unknown` covers both
/// "never observed" and "not running"; a pid is never overloaded as a
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityState {
    #[default]
    Unknown,
    Running(u32),
}

/// A state change worth reporting. Steady states (same pid, still down)
/// produce nothing, so each transition is reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Up(u32),
    Down,
    PidChange(u32),
}

#[derive(Debug, Default)]
pub struct IdentityTracker {
    state: IdentityState,
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self {
            state: IdentityState::Unknown,
        }
    }

    pub fn state(&self) -> IdentityState {
        self.state
    }

    /// Feed one pid lookup result (`None` == lookup failed / not running)
    /// and get back the transition it caused, if any.
    pub fn advance(&mut self, lookup: Option<u32>) -> Option<Transition> {
        let next = match lookup {
            Some(pid) => IdentityState::Running(pid),
            None => IdentityState::Unknown,
        };
        let transition = match (self.state, next) {
            (IdentityState::Unknown, IdentityState::Running(pid)) => Some(Transition::Up(pid)),
            (IdentityState::Running(old), IdentityState::Running(new)) if old != new => {
                Some(Transition::PidChange(new))
            }
            (IdentityState::Running(_), IdentityState::Unknown) => Some(Transition::Down),
            _ => None,
        };
        self.state = next;
        transition
    }
}
