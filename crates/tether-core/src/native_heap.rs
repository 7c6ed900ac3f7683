//! Generational arena standing in for the native runtime's allocator.
//!
//! Objects are freed only explicitly. A freed slot's generation is bumped
//! before the slot is reused, so a second release of the same address, or any
//! access through it, is detected instead of touching a newer object.

use std::any::{Any, type_name};
use std::fmt;

use crate::{NativeAddr, TypeHash};

/// Duplication operation for a native type, used by the `Copied` policy.
pub type DuplicateFn = fn(&(dyn Any + Send)) -> Option<Box<dyn Any + Send>>;

/// Duplication through `Clone`.
pub fn duplicate_of<T: Any + Send + Clone>(value: &(dyn Any + Send)) -> Option<Box<dyn Any + Send>> {
    value
        .downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as Box<dyn Any + Send>)
}

/// Heap storage for native objects with generational addresses.
pub struct NativeHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
    freed_total: u64,
}

struct HeapSlot {
    generation: u32,
    value: Option<Box<dyn Any + Send>>,
    type_hash: TypeHash,
    rust_name: &'static str,
}

impl NativeHeap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            freed_total: 0,
        }
    }

    /// Allocate a new object and return its address.
    pub fn allocate<T: Any + Send>(&mut self, type_hash: TypeHash, value: T) -> NativeAddr {
        self.insert(type_hash, type_name::<T>(), Box::new(value))
    }

    fn insert(&mut self, type_hash: TypeHash, rust_name: &'static str, boxed: Box<dyn Any + Send>) -> NativeAddr {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(boxed);
            slot.type_hash = type_hash;
            slot.rust_name = rust_name;
            NativeAddr::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(boxed),
                type_hash,
                rust_name,
            });
            NativeAddr::new(index, 0)
        }
    }

    fn slot(&self, addr: NativeAddr) -> Option<&HeapSlot> {
        self.slots
            .get(addr.index() as usize)
            .filter(|slot| slot.generation == addr.generation() && slot.value.is_some())
    }

    /// Get an immutable reference to an object.
    ///
    /// Returns `None` if the address is stale or the type doesn't match.
    pub fn get<T: Any>(&self, addr: NativeAddr) -> Option<&T> {
        self.slot(addr)?.value.as_ref()?.downcast_ref::<T>()
    }

    /// Get a mutable reference to an object.
    ///
    /// Returns `None` if the address is stale or the type doesn't match.
    pub fn get_mut<T: Any>(&mut self, addr: NativeAddr) -> Option<&mut T> {
        let slot = self.slots.get_mut(addr.index() as usize)?;
        if slot.generation != addr.generation() {
            return None;
        }
        slot.value.as_mut()?.downcast_mut::<T>()
    }

    /// Whether `addr` refers to a live object.
    pub fn contains(&self, addr: NativeAddr) -> bool {
        self.slot(addr).is_some()
    }

    /// Registered type of the object at `addr`.
    pub fn type_of(&self, addr: NativeAddr) -> Option<TypeHash> {
        self.slot(addr).map(|slot| slot.type_hash)
    }

    /// Rust type name of the object at `addr`, for diagnostics.
    pub fn rust_name(&self, addr: NativeAddr) -> Option<&'static str> {
        self.slot(addr).map(|slot| slot.rust_name)
    }

    /// Free the object at `addr`.
    ///
    /// Returns `false` without side effects if the address is stale, which
    /// includes an address that was already freed.
    pub fn free(&mut self, addr: NativeAddr) -> bool {
        if let Some(slot) = self.slots.get_mut(addr.index() as usize)
            && slot.generation == addr.generation()
            && slot.value.is_some()
        {
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(addr.index());
            self.live -= 1;
            self.freed_total += 1;
            return true;
        }
        false
    }

    /// Copy the object at `addr` into a fresh allocation of the same type.
    pub fn duplicate(&mut self, addr: NativeAddr, duplicate: DuplicateFn) -> Option<NativeAddr> {
        let slot = self.slot(addr)?;
        let (type_hash, rust_name) = (slot.type_hash, slot.rust_name);
        let copy = duplicate(slot.value.as_deref()?)?;
        Some(self.insert(type_hash, rust_name, copy))
    }

    /// Number of objects currently allocated.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of frees performed over the heap's lifetime.
    pub fn freed_total(&self) -> u64 {
        self.freed_total
    }

    /// Addresses of every live object.
    pub fn live_addrs(&self) -> impl Iterator<Item = NativeAddr> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|_| NativeAddr::new(index as u32, slot.generation))
        })
    }
}

impl Default for NativeHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NativeHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHeap")
            .field("slot_count", &self.slots.len())
            .field("live", &self.live)
            .field("free_count", &self.free_list.len())
            .finish()
    }
}
