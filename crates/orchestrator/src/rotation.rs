//! Zero-downtime rotation
//!
//! Updates swap traffic between two alternately-named clusters: the base
//! name and its `-alt` twin. Exactly one of the two must be occupied at any
//! time, on both the cluster and the service probe; anything else means
//! provider state has drifted and the update refuses to guess.

use berth_core::error::conflict;
use berth_core::Result;

/// One of the two alternately-named slots an environment rotates between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The base cluster name
    Primary,
    /// The `-alt` twin
    Alternate,
}

impl Slot {
    /// Cluster name for this slot
    pub fn cluster_name(&self, base: &str) -> String {
        match self {
            Slot::Primary => base.to_string(),
            Slot::Alternate => format!("{base}-alt"),
        }
    }

    /// The other slot
    pub fn other(&self) -> Slot {
        match self {
            Slot::Primary => Slot::Alternate,
            Slot::Alternate => Slot::Primary,
        }
    }
}

/// Existence of one resource kind across the two slots
#[derive(Debug, Clone, Copy)]
pub struct SlotProbe {
    pub primary: bool,
    pub alternate: bool,
}

/// Pick the unoccupied slot to rotate into.
///
/// `clusters` and `services` are independent probes of the same pair of
/// names. The only valid states are "primary occupied on both" and
/// "alternate occupied on both"; any other combination is a conflict, not a
/// coin toss.
pub fn select_rotation_slot(clusters: SlotProbe, services: SlotProbe) -> Result<Slot> {
    match (
        clusters.primary,
        clusters.alternate,
        services.primary,
        services.alternate,
    ) {
        (true, false, true, false) => Ok(Slot::Alternate),
        (false, true, false, true) => Ok(Slot::Primary),
        (cp, ca, sp, sa) => Err(conflict(format!(
            "rotation probes are inconsistent: clusters=({cp}, {ca}) services=({sp}, {sa})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(primary: bool, alternate: bool) -> SlotProbe {
        SlotProbe { primary, alternate }
    }

    #[test]
    fn test_primary_occupied_selects_alternate() {
        let slot = select_rotation_slot(probe(true, false), probe(true, false)).unwrap();
        assert_eq!(slot, Slot::Alternate);
        assert_eq!(slot.cluster_name("berth-pid-demo--pr-5"), "berth-pid-demo--pr-5-alt");
    }

    #[test]
    fn test_alternate_occupied_selects_primary() {
        let slot = select_rotation_slot(probe(false, true), probe(false, true)).unwrap();
        assert_eq!(slot, Slot::Primary);
        assert_eq!(slot.cluster_name("base"), "base");
    }

    #[test]
    fn test_both_occupied_is_a_conflict() {
        let err = select_rotation_slot(probe(true, true), probe(true, false)).unwrap_err();
        assert!(matches!(err, berth_core::Error::Conflict(_)));
    }

    #[test]
    fn test_neither_occupied_is_a_conflict() {
        assert!(select_rotation_slot(probe(false, false), probe(false, false)).is_err());
    }

    #[test]
    fn test_disagreeing_probes_are_a_conflict() {
        assert!(select_rotation_slot(probe(true, false), probe(false, true)).is_err());
    }

    #[test]
    fn test_slot_other() {
        assert_eq!(Slot::Primary.other(), Slot::Alternate);
        assert_eq!(Slot::Alternate.other(), Slot::Primary);
    }
}
