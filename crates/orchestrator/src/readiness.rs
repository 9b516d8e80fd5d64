//! Fleet readiness checks
//!
//! A set of instances is "at state X" only when every member reports X. An
//! empty set is never vacuously at a state: a scan that comes back empty
//! means the fleet is not visible yet, not that it is ready.

use berth_cloud::model::{Instance, InstanceState};
use berth_core::error::conflict;
use berth_core::Result;

/// Check that every instance reports `target`.
///
/// Errors on an empty set and on any divergent member. Callers poll this
/// through the fixed-interval executor, so a divergence means "look again",
/// not "give up", until the poll budget runs out.
pub fn ensure_all_in_state(instances: &[Instance], target: InstanceState) -> Result<()> {
    if instances.is_empty() {
        return Err(conflict(format!(
            "no instances reported while waiting for {target}"
        )));
    }
    for instance in instances {
        if instance.state != target {
            return Err(conflict(format!(
                "instance {} is {}, want {}",
                instance.id, instance.state, target
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_cloud::model::InstanceId;

    fn instance(id: &str, state: InstanceState) -> Instance {
        let mut instance = Instance::new(InstanceId::new(id), "test");
        instance.state = state;
        instance
    }

    #[test]
    fn test_all_running() {
        let fleet = vec![
            instance("i-1", InstanceState::Running),
            instance("i-2", InstanceState::Running),
        ];
        assert!(ensure_all_in_state(&fleet, InstanceState::Running).is_ok());
    }

    #[test]
    fn test_divergent_member_fails() {
        let fleet = vec![
            instance("i-1", InstanceState::Running),
            instance("i-2", InstanceState::Terminated),
        ];
        assert!(ensure_all_in_state(&fleet, InstanceState::Running).is_err());
    }

    #[test]
    fn test_empty_set_is_never_ready() {
        assert!(ensure_all_in_state(&[], InstanceState::Running).is_err());
    }

    #[test]
    fn test_all_terminated() {
        let fleet = vec![
            instance("i-1", InstanceState::Terminated),
            instance("i-2", InstanceState::Terminated),
        ];
        assert!(ensure_all_in_state(&fleet, InstanceState::Terminated).is_ok());
    }
}
