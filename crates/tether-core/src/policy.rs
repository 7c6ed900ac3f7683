//! Ownership policies attached to call slots.
//!
//! Every boundary-crossing call is annotated with zero or more policies. A
//! policy names the slot it governs and says what happens to ownership of the
//! value in that slot once the call returns.

use std::fmt;

use crate::slot::Slot;

/// How ownership of one slot's value is handled after a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnershipPolicy {
    /// The host borrows the value; the native side keeps ownership.
    /// This is the default for every object slot.
    Borrowed(Slot),

    /// On the return slot: the bridge takes ownership and releases the object
    /// when its representative is collected. On a parameter: ownership moves
    /// from the bridge to the native callee.
    Adopted(Slot),

    /// The value is duplicated; the host owns the independent copy.
    Copied(Slot),

    /// The return value is dropped without creating a representative.
    Discarded,

    /// The returned object lives inside parameter `to`; keep that parameter
    /// alive while the result is reachable.
    ReturnReference { to: u16 },

    /// Keep `dependency` alive while `dependent` is reachable.
    Dependency { dependent: Slot, dependency: Slot },

    /// A pointer parameter the callee writes through; the host supplies the
    /// initial value and receives the final one as an extra result.
    OutValue(u16),

    /// Like [`OutValue`](Self::OutValue) but the host supplies no initial
    /// value.
    PureOutValue(u16),
}

impl OwnershipPolicy {
    /// The slot this policy is keyed on for conflict detection.
    pub fn primary_slot(&self) -> Slot {
        match self {
            OwnershipPolicy::Borrowed(slot)
            | OwnershipPolicy::Adopted(slot)
            | OwnershipPolicy::Copied(slot) => *slot,
            OwnershipPolicy::Discarded | OwnershipPolicy::ReturnReference { .. } => Slot::Return,
            OwnershipPolicy::Dependency { dependent, .. } => *dependent,
            OwnershipPolicy::OutValue(n) | OwnershipPolicy::PureOutValue(n) => Slot::Param(*n),
        }
    }

    /// Every slot this policy refers to.
    pub fn slots(&self) -> Vec<Slot> {
        match self {
            OwnershipPolicy::ReturnReference { to } => vec![Slot::Return, Slot::Param(*to)],
            OwnershipPolicy::Dependency {
                dependent,
                dependency,
            } => vec![*dependent, *dependency],
            other => vec![other.primary_slot()],
        }
    }

    /// Whether the policy decides who owns its slot's value.
    ///
    /// At most one transfer policy may target a slot. `Dependency` only adds
    /// an edge and may be combined freely.
    pub fn is_transfer(&self) -> bool {
        !matches!(self, OwnershipPolicy::Dependency { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            OwnershipPolicy::Borrowed(_) => "borrowed",
            OwnershipPolicy::Adopted(_) => "adopted",
            OwnershipPolicy::Copied(_) => "copied",
            OwnershipPolicy::Discarded => "discarded",
            OwnershipPolicy::ReturnReference { .. } => "return_reference",
            OwnershipPolicy::Dependency { .. } => "dependency",
            OwnershipPolicy::OutValue(_) => "out_value",
            OwnershipPolicy::PureOutValue(_) => "pure_out_value",
        }
    }
}

impl fmt::Display for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipPolicy::Borrowed(slot)
            | OwnershipPolicy::Adopted(slot)
            | OwnershipPolicy::Copied(slot) => write!(f, "{}({slot})", self.name()),
            OwnershipPolicy::Discarded => f.write_str("discarded"),
            OwnershipPolicy::ReturnReference { to } => write!(f, "return_reference(param #{to})"),
            OwnershipPolicy::Dependency {
                dependent,
                dependency,
            } => write!(f, "dependency({dependent} -> {dependency})"),
            OwnershipPolicy::OutValue(n) | OwnershipPolicy::PureOutValue(n) => {
                write!(f, "{}(param #{n})", self.name())
            }
        }
    }
}
