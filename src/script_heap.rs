//! Reference host runtime: a small mark-and-sweep heap.
//!
//! Objects are either representatives of native objects or auxiliary
//! dependency tables. A representative's table holds the representatives it
//! keeps alive and is traced through its owner.
//!
//! ## Collection
//!
//! 1. Mark everything reachable from globals and pins.
//! 2. Among the unmarked representatives not yet finalized, finalize those
//!    no other such representative keeps alive, then mark them and everything
//!    reachable from them.
//! 3. Sweep the remaining unmarked objects.
//!
//! A representative finalized in pass *N* is freed in pass *N + 1*, and its
//! dependencies become unreachable only then. This is the one-pass latency of
//! finalizer-based collectors, and callers must not rely on a dependency dying
//! in the same pass as its last dependent.

use std::fmt;

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};
use tether_core::{HostValue, NativeAddr, RepHandle, TypeHash};
use tracing::debug;

use crate::host::HostRuntime;

bitflags! {
    /// Per-object collector state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        /// Reached during the current pass.
        const MARKED = 1 << 0;
        /// Reported as collected; freed on the next pass it is unreachable.
        const FINALIZED = 1 << 1;
    }
}

enum HostObject {
    Representative {
        addr: NativeAddr,
        type_hash: TypeHash,
        table: Option<RepHandle>,
    },
    DependencyTable(Vec<RepHandle>),
}

struct HeapSlot {
    generation: u32,
    flags: ObjectFlags,
    object: Option<HostObject>,
}

/// A mark-and-sweep host heap implementing [`HostRuntime`].
#[derive(Default)]
pub struct ScriptHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    globals: FxHashMap<String, HostValue>,
    pins: Vec<RepHandle>,
    collections: u64,
}

impl ScriptHeap {
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Roots
    // ==========================================================================

    /// Store a value in a global, rooting it.
    pub fn set_global(&mut self, name: impl Into<String>, value: HostValue) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&HostValue> {
        self.globals.get(name)
    }

    /// Drop a global, unrooting its value.
    pub fn clear_global(&mut self, name: &str) -> Option<HostValue> {
        self.globals.remove(name)
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    // ==========================================================================
    // Inspection
    // ==========================================================================

    /// Number of objects on the heap, tables included.
    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.object.is_some()).count()
    }

    /// Number of representatives on the heap, finalized ones included.
    pub fn representative_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.object, Some(HostObject::Representative { .. })))
            .count()
    }

    /// Whether `rep` still occupies the heap, finalized or not.
    pub fn contains(&self, rep: RepHandle) -> bool {
        self.slot(rep).is_some()
    }

    /// Native address a representative stands for.
    pub fn native_addr(&self, rep: RepHandle) -> Option<(NativeAddr, TypeHash)> {
        match self.slot(rep)?.object.as_ref()? {
            HostObject::Representative {
                addr, type_hash, ..
            } => Some((*addr, *type_hash)),
            HostObject::DependencyTable(_) => None,
        }
    }

    /// Representatives held alive through `rep`'s dependency table.
    pub fn strong_refs(&self, rep: RepHandle) -> Vec<RepHandle> {
        let Some(table) = self.table_of(rep) else {
            return Vec::new();
        };
        match self.slot(table).and_then(|slot| slot.object.as_ref()) {
            Some(HostObject::DependencyTable(entries)) => entries.clone(),
            _ => Vec::new(),
        }
    }

    /// Collector state of the object behind `rep`.
    pub fn flags(&self, rep: RepHandle) -> Option<ObjectFlags> {
        self.slot(rep).map(|slot| slot.flags)
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    // ==========================================================================
    // Internals
    // ==========================================================================

    fn slot(&self, handle: RepHandle) -> Option<&HeapSlot> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.object.is_some())
    }

    fn slot_mut(&mut self, handle: RepHandle) -> Option<&mut HeapSlot> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.object.is_some())
    }

    fn table_of(&self, rep: RepHandle) -> Option<RepHandle> {
        match self.slot(rep)?.object.as_ref()? {
            HostObject::Representative { table, .. } => *table,
            HostObject::DependencyTable(_) => None,
        }
    }

    fn alloc(&mut self, object: HostObject) -> RepHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.flags = ObjectFlags::empty();
            RepHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                flags: ObjectFlags::empty(),
                object: Some(object),
            });
            RepHandle::new(index, 0)
        }
    }

    fn free(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.object = None;
        slot.flags = ObjectFlags::empty();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index as u32);
    }

    fn children(&self, handle: RepHandle) -> Vec<RepHandle> {
        match self.slot(handle).and_then(|slot| slot.object.as_ref()) {
            Some(HostObject::Representative { table, .. }) => table.iter().copied().collect(),
            Some(HostObject::DependencyTable(entries)) => entries.clone(),
            None => Vec::new(),
        }
    }

    fn mark_from(&mut self, roots: impl IntoIterator<Item = RepHandle>) {
        let mut stack: Vec<RepHandle> = roots.into_iter().collect();
        while let Some(handle) = stack.pop() {
            let Some(slot) = self.slot_mut(handle) else {
                continue;
            };
            if slot.flags.contains(ObjectFlags::MARKED) {
                continue;
            }
            slot.flags.insert(ObjectFlags::MARKED);
            stack.extend(self.children(handle));
        }
    }

    fn reachable_from_children(&self, handle: RepHandle) -> FxHashSet<RepHandle> {
        let mut seen = FxHashSet::default();
        let mut stack = self.children(handle);
        while let Some(next) = stack.pop() {
            if self.slot(next).is_some() && seen.insert(next) {
                stack.extend(self.children(next));
            }
        }
        seen
    }

    /// Pick the candidates to finalize this pass.
    ///
    /// A candidate reachable from another candidate that it cannot reach back
    /// waits for a later pass. Candidates on a common cycle are finalized
    /// together.
    fn finalization_order(&self, candidates: &[RepHandle]) -> Vec<RepHandle> {
        let reach: Vec<FxHashSet<RepHandle>> = candidates
            .iter()
            .map(|c| self.reachable_from_children(*c))
            .collect();
        candidates
            .iter()
            .enumerate()
            .filter(|&(i, c)| {
                !reach.iter().enumerate().any(|(j, from_other)| {
                    j != i && from_other.contains(c) && !reach[i].contains(&candidates[j])
                })
            })
            .map(|(_, c)| *c)
            .collect()
    }

    fn handle_at(&self, index: usize) -> RepHandle {
        RepHandle::new(index as u32, self.slots[index].generation)
    }
}

impl HostRuntime for ScriptHeap {
    fn new_representative(&mut self, addr: NativeAddr, type_hash: TypeHash) -> RepHandle {
        self.alloc(HostObject::Representative {
            addr,
            type_hash,
            table: None,
        })
    }

    fn is_alive(&self, rep: RepHandle) -> bool {
        self.slot(rep).is_some_and(|slot| {
            matches!(slot.object, Some(HostObject::Representative { .. }))
                && !slot.flags.contains(ObjectFlags::FINALIZED)
        })
    }

    fn install_strong_ref(&mut self, from: RepHandle, to: RepHandle) {
        let table = match self.table_of(from) {
            Some(table) => table,
            None => {
                if !self.contains(from) {
                    return;
                }
                let table = self.alloc(HostObject::DependencyTable(Vec::new()));
                if let Some(HostObject::Representative { table: slot, .. }) =
                    self.slot_mut(from).and_then(|s| s.object.as_mut())
                {
                    *slot = Some(table);
                }
                table
            }
        };
        if let Some(HostObject::DependencyTable(entries)) =
            self.slot_mut(table).and_then(|s| s.object.as_mut())
        {
            entries.push(to);
        }
    }

    fn pin(&mut self, rep: RepHandle) {
        self.pins.push(rep);
    }

    fn unpin(&mut self, rep: RepHandle) {
        if let Some(pos) = self.pins.iter().rposition(|p| *p == rep) {
            self.pins.remove(pos);
        }
    }

    fn collect(&mut self) -> Vec<RepHandle> {
        for slot in &mut self.slots {
            slot.flags.remove(ObjectFlags::MARKED);
        }

        let roots: Vec<RepHandle> = self
            .globals
            .values()
            .filter_map(HostValue::as_rep)
            .chain(self.pins.iter().copied())
            .collect();
        self.mark_from(roots);

        let candidates: Vec<RepHandle> = (0..self.slots.len())
            .filter(|&index| {
                let slot = &self.slots[index];
                matches!(slot.object, Some(HostObject::Representative { .. }))
                    && !slot.flags.intersects(ObjectFlags::MARKED | ObjectFlags::FINALIZED)
            })
            .map(|index| self.handle_at(index))
            .collect();
        let finalized = self.finalization_order(&candidates);
        for rep in &finalized {
            if let Some(slot) = self.slot_mut(*rep) {
                slot.flags.insert(ObjectFlags::FINALIZED);
            }
        }
        self.mark_from(finalized.iter().copied());

        let mut swept = 0usize;
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            if slot.object.is_some() && !slot.flags.contains(ObjectFlags::MARKED) {
                self.free(index);
                swept += 1;
            }
        }

        self.collections += 1;
        debug!(
            pass = self.collections,
            finalized = finalized.len(),
            swept,
            "host collection"
        );
        finalized
    }
}

impl fmt::Debug for ScriptHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHeap")
            .field("objects", &self.object_count())
            .field("globals", &self.globals.len())
            .field("pins", &self.pins.len())
            .field("collections", &self.collections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_rep(heap: &mut ScriptHeap, i: u32) -> RepHandle {
        heap.new_representative(NativeAddr::new(i, 0), TypeHash::from_name("Node"))
    }

    #[test]
    fn rooted_representatives_survive() {
        let mut heap = ScriptHeap::new();
        let rep = new_rep(&mut heap, 0);
        heap.set_global("x", HostValue::Rep(rep));
        assert!(heap.collect().is_empty());
        assert!(heap.is_alive(rep));
    }

    #[test]
    fn unreachable_representative_is_finalized_then_freed() {
        let mut heap = ScriptHeap::new();
        let rep = new_rep(&mut heap, 0);

        assert_eq!(heap.collect(), vec![rep]);
        assert!(!heap.is_alive(rep));
        assert!(heap.contains(rep));
        assert!(heap.flags(rep).is_some_and(|flags| flags.contains(ObjectFlags::FINALIZED)));

        assert!(heap.collect().is_empty());
        assert!(!heap.contains(rep));
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn dependency_outlives_dependent_by_one_pass() {
        let mut heap = ScriptHeap::new();
        let parent = new_rep(&mut heap, 0);
        let child = new_rep(&mut heap, 1);
        heap.install_strong_ref(child, parent);
        heap.set_global("child", HostValue::Rep(child));

        assert!(heap.collect().is_empty());
        assert!(heap.is_alive(parent));

        heap.clear_global("child");
        assert_eq!(heap.collect(), vec![child]);
        assert!(heap.is_alive(parent));

        assert_eq!(heap.collect(), vec![parent]);
        assert!(heap.collect().is_empty());
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn chain_is_finalized_one_link_per_pass() {
        let mut heap = ScriptHeap::new();
        let a = new_rep(&mut heap, 0);
        let b = new_rep(&mut heap, 1);
        let c = new_rep(&mut heap, 2);
        heap.install_strong_ref(a, b);
        heap.install_strong_ref(b, c);

        assert_eq!(heap.collect(), vec![a]);
        assert_eq!(heap.collect(), vec![b]);
        assert_eq!(heap.collect(), vec![c]);
    }

    #[test]
    fn cycles_are_finalized_together() {
        let mut heap = ScriptHeap::new();
        let a = new_rep(&mut heap, 0);
        let b = new_rep(&mut heap, 1);
        heap.install_strong_ref(a, b);
        heap.install_strong_ref(b, a);

        let mut finalized = heap.collect();
        finalized.sort();
        assert_eq!(finalized, vec![a, b]);
        assert!(heap.collect().is_empty());
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn pins_are_roots() {
        let mut heap = ScriptHeap::new();
        let rep = new_rep(&mut heap, 0);
        heap.pin(rep);
        heap.pin(rep);
        heap.unpin(rep);
        assert!(heap.collect().is_empty());
        heap.unpin(rep);
        assert_eq!(heap.pin_count(), 0);
        assert_eq!(heap.collect(), vec![rep]);
    }

    #[test]
    fn strong_refs_go_through_one_table() {
        let mut heap = ScriptHeap::new();
        let a = new_rep(&mut heap, 0);
        let b = new_rep(&mut heap, 1);
        let c = new_rep(&mut heap, 2);
        heap.install_strong_ref(a, b);
        heap.install_strong_ref(a, c);
        assert_eq!(heap.strong_refs(a), vec![b, c]);
        assert_eq!(heap.object_count(), 4);
        assert_eq!(heap.representative_count(), 3);
    }

    #[test]
    fn freed_slot_gets_new_generation() {
        let mut heap = ScriptHeap::new();
        let old = new_rep(&mut heap, 0);
        heap.collect();
        heap.collect();
        let new = new_rep(&mut heap, 1);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!heap.is_alive(old));
        assert_eq!(heap.native_addr(new).map(|(addr, _)| addr), Some(NativeAddr::new(1, 0)));
    }
}
