//! The interface the bridge consumes from the host runtime.
//!
//! The host owns representatives and runs its own collector. The bridge only
//! needs to create representatives, keep dependencies alive through them, pin
//! call arguments, and learn which representatives a collection finalized.

use tether_core::{NativeAddr, RepHandle, TypeHash};

/// A garbage-collected runtime that can hold representatives of native objects.
pub trait HostRuntime: Send {
    /// Create a host object standing for the native object at `addr`.
    fn new_representative(&mut self, addr: NativeAddr, type_hash: TypeHash) -> RepHandle;

    /// Whether `rep` exists and has not been finalized.
    fn is_alive(&self, rep: RepHandle) -> bool;

    /// Keep `to` alive for as long as `from` is reachable.
    ///
    /// Called once per distinct edge; repeated edges are counted by the bridge.
    fn install_strong_ref(&mut self, from: RepHandle, to: RepHandle);

    /// Root `rep` until the matching [`unpin`](Self::unpin).
    fn pin(&mut self, rep: RepHandle);

    /// Release the most recent pin of `rep`.
    fn unpin(&mut self, rep: RepHandle);

    /// Run one collection pass and return the representatives it finalized.
    fn collect(&mut self) -> Vec<RepHandle>;
}
