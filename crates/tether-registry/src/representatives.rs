//! Identity map from native addresses to host representatives.
//!
//! At most one live representative exists per native address. The map is
//! populated lazily the first time an object crosses into the host and is
//! pruned when the host reports the representative collected.

use rustc_hash::FxHashMap;
use tether_core::{NativeAddr, RepHandle, TypeHash};

/// Bookkeeping for one live representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepEntry {
    pub addr: NativeAddr,
    pub type_hash: TypeHash,
    /// The bridge releases the native object when this representative is
    /// collected.
    pub owning: bool,
    /// Ownership was handed back to native code; the address is no longer
    /// mapped to this representative.
    pub detached: bool,
}

/// The identity map.
#[derive(Debug, Default)]
pub struct RepresentativeRegistry {
    by_addr: FxHashMap<NativeAddr, RepHandle>,
    entries: FxHashMap<RepHandle, RepEntry>,
}

impl RepresentativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The representative currently mapped to `addr`.
    pub fn lookup(&self, addr: NativeAddr) -> Option<RepHandle> {
        self.by_addr.get(&addr).copied()
    }

    pub fn get(&self, rep: RepHandle) -> Option<&RepEntry> {
        self.entries.get(&rep)
    }

    pub fn contains(&self, rep: RepHandle) -> bool {
        self.entries.contains_key(&rep)
    }

    /// Register a freshly created representative for `addr`.
    ///
    /// Returns the representative previously mapped to the address, which is
    /// left registered but detached.
    pub fn insert(
        &mut self,
        rep: RepHandle,
        addr: NativeAddr,
        type_hash: TypeHash,
        owning: bool,
    ) -> Option<RepHandle> {
        self.entries.insert(
            rep,
            RepEntry {
                addr,
                type_hash,
                owning,
                detached: false,
            },
        );
        let previous = self.by_addr.insert(addr, rep);
        if let Some(prev) = previous
            && let Some(entry) = self.entries.get_mut(&prev)
        {
            entry.detached = true;
        }
        previous
    }

    /// Mark whether the bridge owns the object behind `rep`.
    ///
    /// Returns `false` if `rep` is unknown.
    pub fn set_owning(&mut self, rep: RepHandle, owning: bool) -> bool {
        match self.entries.get_mut(&rep) {
            Some(entry) => {
                entry.owning = owning;
                true
            }
            None => false,
        }
    }

    /// Hand ownership back to native code.
    ///
    /// The representative stays registered so the host can still collect it,
    /// but it no longer owns its object and the address is unmapped, so the
    /// next crossing of that address creates a new representative.
    pub fn detach(&mut self, rep: RepHandle) -> Option<RepEntry> {
        let entry = self.entries.get_mut(&rep)?;
        entry.owning = false;
        entry.detached = true;
        let entry = *entry;
        if self.by_addr.get(&entry.addr) == Some(&rep) {
            self.by_addr.remove(&entry.addr);
        }
        Some(entry)
    }

    /// Undo a [`detach`](Self::detach): the representative owns its object
    /// again and the address maps back to it.
    ///
    /// Returns `false` if `rep` is unknown or another representative has
    /// claimed the address in the meantime.
    pub fn reattach(&mut self, rep: RepHandle) -> bool {
        let Some(entry) = self.entries.get_mut(&rep) else {
            return false;
        };
        if self.by_addr.get(&entry.addr).is_some_and(|mapped| *mapped != rep) {
            return false;
        }
        entry.owning = true;
        entry.detached = false;
        self.by_addr.insert(entry.addr, rep);
        true
    }

    /// Forget a collected representative.
    pub fn remove(&mut self, rep: RepHandle) -> Option<RepEntry> {
        let entry = self.entries.remove(&rep)?;
        if self.by_addr.get(&entry.addr) == Some(&rep) {
            self.by_addr.remove(&entry.addr);
        }
        Some(entry)
    }

    /// Number of registered representatives, detached ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of addresses currently mapped.
    pub fn mapped_count(&self) -> usize {
        self.by_addr.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RepHandle, &RepEntry)> {
        self.entries.iter().map(|(rep, entry)| (*rep, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> TypeHash {
        TypeHash::from_name("Widget")
    }

    #[test]
    fn lookup_after_insert() {
        let mut reps = RepresentativeRegistry::new();
        let addr = NativeAddr::new(0, 0);
        let rep = RepHandle::new(0, 0);
        assert_eq!(reps.insert(rep, addr, widget(), false), None);
        assert_eq!(reps.lookup(addr), Some(rep));
        assert_eq!(reps.get(rep).map(|e| e.owning), Some(false));
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn detach_unmaps_the_address() {
        let mut reps = RepresentativeRegistry::new();
        let addr = NativeAddr::new(2, 0);
        let rep = RepHandle::new(7, 0);
        reps.insert(rep, addr, widget(), true);

        let entry = reps.detach(rep).unwrap();
        assert!(!entry.owning);
        assert!(entry.detached);
        assert_eq!(reps.lookup(addr), None);
        assert!(reps.contains(rep));
        assert_eq!(reps.mapped_count(), 0);
    }

    #[test]
    fn remove_keeps_newer_mapping() {
        let mut reps = RepresentativeRegistry::new();
        let addr = NativeAddr::new(1, 0);
        let old = RepHandle::new(1, 0);
        let new = RepHandle::new(2, 0);
        reps.insert(old, addr, widget(), false);
        reps.detach(old);
        reps.insert(new, addr, widget(), false);

        reps.remove(old);
        assert_eq!(reps.lookup(addr), Some(new));
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn reattach_restores_ownership_and_mapping() {
        let mut reps = RepresentativeRegistry::new();
        let addr = NativeAddr::new(4, 0);
        let rep = RepHandle::new(3, 0);
        reps.insert(rep, addr, widget(), true);
        reps.detach(rep);

        assert!(reps.reattach(rep));
        assert_eq!(reps.lookup(addr), Some(rep));
        let entry = reps.get(rep).unwrap();
        assert!(entry.owning);
        assert!(!entry.detached);
    }

    #[test]
    fn reattach_refuses_a_claimed_address() {
        let mut reps = RepresentativeRegistry::new();
        let addr = NativeAddr::new(4, 0);
        let old = RepHandle::new(3, 0);
        let new = RepHandle::new(5, 0);
        reps.insert(old, addr, widget(), true);
        reps.detach(old);
        reps.insert(new, addr, widget(), false);

        assert!(!reps.reattach(old));
        assert_eq!(reps.lookup(addr), Some(new));
        assert!(!reps.reattach(RepHandle::new(9, 0)));
    }

    #[test]
    fn set_owning_on_unknown_rep() {
        let mut reps = RepresentativeRegistry::new();
        assert!(!reps.set_owning(RepHandle::new(0, 0), true));
    }
}
