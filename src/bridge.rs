//! Per-instance bridge state and the registration API.
//!
//! A [`Bridge`] owns everything one embedding needs: the native heap, the host
//! runtime, the representative identity map, the dependency graph and the type
//! registry. Separate bridges share nothing.

use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;

use tether_core::{
    ConversionError, Converter, HostValue, IntRepr, NativeAddr, NativeEnum, NativeFault,
    NativeHeap, NativeValue, ObjectRef, PrimitiveConverter, RegistrationError, RepHandle, SlotType,
    TypeHash, Underlying, duplicate_of,
};
use tether_registry::{
    DependencyGraph, EdgeInsert, NativeTypeEntry, RepresentativeRegistry, TypeRegistry,
};
use tracing::{debug, trace, warn};

use crate::adapter::{CallAdapter, CallAdapterBuilder};
use crate::config::BridgeConfig;
use crate::enums::EnumBuilder;
use crate::host::HostRuntime;
use crate::script_heap::ScriptHeap;

/// Counters over the lifetime of a bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Successful and failed invocations.
    pub calls: u64,
    pub reps_created: u64,
    /// Crossings that found an existing representative.
    pub reps_reused: u64,
    /// Representatives whose ownership moved to native code.
    pub adoptions: u64,
    /// Native objects released because their owning representative died.
    pub releases: u64,
    /// Releases skipped because the object was already gone.
    pub stale_releases: u64,
    pub edges_installed: u64,
    pub edges_repeated: u64,
    pub collections: u64,
}

/// Outcome of one [`Bridge::collect_garbage`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Representatives the host finalized.
    pub finalized: usize,
    /// Native objects released.
    pub released: usize,
    /// Owning representatives whose object was already freed.
    pub stale_releases: usize,
    /// Dependency edges dropped, counting multiplicity.
    pub edges_removed: usize,
}

/// The ownership bridge between a native heap and a host runtime.
pub struct Bridge<H: HostRuntime = ScriptHeap> {
    pub(crate) config: BridgeConfig,
    pub(crate) natives: NativeHeap,
    pub(crate) host: H,
    pub(crate) reps: RepresentativeRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) types: TypeRegistry,
    pub(crate) converter: Box<dyn Converter>,
    pub(crate) stats: BridgeStats,
}

impl Bridge<ScriptHeap> {
    /// A bridge over the reference host heap with default settings.
    pub fn new() -> Self {
        Self::with_host(ScriptHeap::new(), BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self::with_host(ScriptHeap::new(), config)
    }
}

impl Default for Bridge<ScriptHeap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostRuntime> Bridge<H> {
    pub fn with_host(host: H, config: BridgeConfig) -> Self {
        let converter = Box::new(PrimitiveConverter::new(config.host_number));
        Self {
            config,
            natives: NativeHeap::new(),
            host,
            reps: RepresentativeRegistry::new(),
            graph: DependencyGraph::new(),
            types: TypeRegistry::new(),
            converter,
            stats: BridgeStats::default(),
        }
    }

    /// Replace the converter used for by-value slots.
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn natives(&self) -> &NativeHeap {
        &self.natives
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn representatives(&self) -> &RepresentativeRegistry {
        &self.reps
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Number of native objects currently allocated.
    pub fn live_native_count(&self) -> usize {
        self.natives.live_count()
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Start registering a native object type.
    pub fn register_type<T: Any + Send>(&mut self, name: impl Into<String>) -> TypeBuilder<'_, H, T> {
        TypeBuilder {
            entry: NativeTypeEntry::new(name, TypeId::of::<T>(), type_name::<T>()),
            bridge: self,
            _marker: PhantomData,
        }
    }

    /// Hash of the type registered for `T`.
    pub fn type_hash<T: Any>(&self) -> Option<TypeHash> {
        self.types.hash_of(TypeId::of::<T>())
    }

    /// Start registering a native enum, checking its constants against the
    /// configured host number type.
    pub fn register_enum<E: NativeEnum>(&mut self, name: impl Into<String>) -> EnumBuilder<'_, H> {
        EnumBuilder::new(self, name.into(), E::Repr::REPR)
    }

    /// Start registering an enum described only by its representation.
    pub fn register_enum_repr(
        &mut self,
        name: impl Into<String>,
        repr: IntRepr,
    ) -> EnumBuilder<'_, H> {
        EnumBuilder::new(self, name.into(), repr)
    }

    /// Validate a call adapter against the registered types.
    pub fn bind(&mut self, builder: CallAdapterBuilder<H>) -> Result<CallAdapter<H>, RegistrationError> {
        builder.build(self)
    }

    // ==========================================================================
    // Native objects
    // ==========================================================================

    /// Allocate a native object of a registered type.
    pub fn allocate<T: Any + Send>(&mut self, value: T) -> Result<NativeAddr, NativeFault> {
        let hash = self
            .type_hash::<T>()
            .ok_or(NativeFault::UnregisteredType(type_name::<T>()))?;
        Ok(self.natives.allocate(hash, value))
    }

    pub fn get<T: Any>(&self, addr: NativeAddr) -> Option<&T> {
        self.natives.get(addr)
    }

    pub fn get_mut<T: Any>(&mut self, addr: NativeAddr) -> Option<&mut T> {
        self.natives.get_mut(addr)
    }

    /// Free a native object from native code.
    ///
    /// Returns `false` if the address was already freed.
    pub fn free_native(&mut self, addr: NativeAddr) -> bool {
        let freed = self.natives.free(addr);
        if !freed {
            warn!(%addr, "native free of a stale address ignored");
        }
        freed
    }

    // ==========================================================================
    // Representatives
    // ==========================================================================

    /// The live representative for `addr`, if any.
    pub fn representative(&self, addr: NativeAddr) -> Option<RepHandle> {
        self.reps
            .lookup(addr)
            .filter(|rep| self.host.is_alive(*rep))
    }

    /// Return the representative for `addr`, creating one if none is live.
    ///
    /// An existing representative is returned unchanged; `owning` only
    /// applies to a new one.
    pub fn wrap(&mut self, addr: NativeAddr, type_hash: TypeHash, owning: bool) -> RepHandle {
        if let Some(rep) = self.representative(addr) {
            self.stats.reps_reused += 1;
            trace!(%addr, %rep, "reused representative");
            return rep;
        }
        let rep = self.host.new_representative(addr, type_hash);
        self.reps.insert(rep, addr, type_hash, owning);
        self.stats.reps_created += 1;
        trace!(%addr, %rep, owning, "created representative");
        rep
    }

    /// Whether the bridge releases the object behind `rep` when it dies.
    pub fn is_owning(&self, rep: RepHandle) -> bool {
        self.reps.get(rep).is_some_and(|entry| entry.owning)
    }

    /// Resolve a host value for an object slot of type `expected`.
    pub(crate) fn object_arg(
        &self,
        value: &HostValue,
        expected: TypeHash,
    ) -> Result<NativeValue, ConversionError> {
        let rep = match value {
            HostValue::Nil => return Ok(NativeValue::Object(ObjectRef::null(expected))),
            HostValue::Rep(rep) => *rep,
            other => {
                return Err(ConversionError::TypeMismatch {
                    expected: self.types.type_name(expected),
                    actual: other.type_name(),
                });
            }
        };
        let entry = self
            .reps
            .get(rep)
            .filter(|entry| !entry.detached && self.host.is_alive(rep))
            .ok_or(ConversionError::StaleRepresentative(rep))?;
        if entry.type_hash != expected {
            return Err(ConversionError::ObjectTypeMismatch {
                expected,
                actual: entry.type_hash,
            });
        }
        if !self.natives.contains(entry.addr) {
            return Err(ConversionError::DanglingObject {
                rep,
                addr: entry.addr,
            });
        }
        Ok(NativeValue::Object(ObjectRef::new(entry.addr, entry.type_hash)))
    }

    /// Convert one host argument for a slot.
    pub(crate) fn to_native(&self, value: &HostValue, ty: &SlotType) -> Result<NativeValue, ConversionError> {
        match ty {
            SlotType::Object(hash) => self.object_arg(value, *hash),
            SlotType::Enum(hash) => {
                let native = self.converter.to_native(value, ty)?;
                if let NativeValue::Enum { value, .. } = &native
                    && let Some(entry) = self.types.get_enum(*hash)
                    && !entry.contains_value(*value)
                {
                    return Err(ConversionError::InvalidEnumValue {
                        enum_name: entry.name.clone(),
                        value: *value,
                    });
                }
                Ok(native)
            }
            _ => self.converter.to_native(value, ty),
        }
    }

    /// Move ownership of `rep`'s object from the bridge to native code.
    pub(crate) fn release_to_native(&mut self, rep: RepHandle) {
        if let Some(entry) = self.reps.detach(rep) {
            self.stats.adoptions += 1;
            trace!(%rep, addr = %entry.addr, "ownership moved to native code");
        }
    }

    /// Take back ownership moved by [`release_to_native`](Self::release_to_native)
    /// when the callee failed without consuming the object.
    ///
    /// Nothing is restored if the callee freed the object before failing.
    pub(crate) fn reclaim_from_native(&mut self, rep: RepHandle) -> bool {
        let Some(addr) = self.reps.get(rep).map(|entry| entry.addr) else {
            return false;
        };
        if !self.natives.contains(addr) {
            trace!(%rep, %addr, "adopted object was freed before the fault");
            return false;
        }
        if !self.reps.reattach(rep) {
            warn!(%rep, %addr, "address was rewrapped during the call, ownership not restored");
            return false;
        }
        self.stats.adoptions = self.stats.adoptions.saturating_sub(1);
        trace!(%rep, %addr, "ownership returned to the bridge after a native fault");
        true
    }

    /// Record `dependent -> dependency`, materializing new edges in the host.
    pub(crate) fn add_dependency(&mut self, dependent: RepHandle, dependency: RepHandle) {
        match self.graph.add_edge(dependent, dependency) {
            EdgeInsert::New => {
                self.host.install_strong_ref(dependent, dependency);
                self.stats.edges_installed += 1;
            }
            EdgeInsert::Repeated(_) => self.stats.edges_repeated += 1,
            EdgeInsert::SelfEdge => trace!(%dependent, "self dependency skipped"),
        }
    }

    // ==========================================================================
    // Collection
    // ==========================================================================

    /// Run one host collection and release what it finalized.
    ///
    /// For each finalized representative, its outgoing dependency edges are
    /// dropped and, if the bridge owned its object, the object is freed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> CollectStats {
        let finalized = self.host.collect();
        let mut stats = CollectStats {
            finalized: finalized.len(),
            ..CollectStats::default()
        };

        for rep in finalized {
            stats.edges_removed += self
                .graph
                .remove_dependent(rep)
                .iter()
                .map(|(_, count)| *count as usize)
                .sum::<usize>();

            let Some(entry) = self.reps.remove(rep) else {
                continue;
            };
            if !entry.owning {
                continue;
            }
            if self.natives.free(entry.addr) {
                stats.released += 1;
                trace!(%rep, addr = %entry.addr, "released owned native object");
            } else {
                stats.stale_releases += 1;
                warn!(%rep, addr = %entry.addr, "owned native object was already freed");
            }
        }

        self.stats.collections += 1;
        self.stats.releases += stats.released as u64;
        self.stats.stale_releases += stats.stale_releases as u64;
        debug!(
            finalized = stats.finalized,
            released = stats.released,
            edges_removed = stats.edges_removed,
            live_natives = self.natives.live_count(),
            "collection finished"
        );
        stats
    }
}

/// Builder for a native type registration.
pub struct TypeBuilder<'b, H: HostRuntime, T> {
    bridge: &'b mut Bridge<H>,
    entry: NativeTypeEntry,
    _marker: PhantomData<fn() -> T>,
}

impl<H: HostRuntime, T: Any + Send + Clone> TypeBuilder<'_, H, T> {
    /// Allow values of this type to be returned `Copied`.
    pub fn duplicable(mut self) -> Self {
        self.entry = self.entry.with_duplicate(duplicate_of::<T>);
        self
    }
}

impl<H: HostRuntime, T: Any + Send> TypeBuilder<'_, H, T> {
    pub fn build(self) -> Result<TypeHash, RegistrationError> {
        self.bridge.types.register_type(self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget(u32);

    fn bridge() -> (Bridge, TypeHash) {
        let mut bridge = Bridge::new();
        let hash = bridge.register_type::<Widget>("Widget").build().unwrap();
        (bridge, hash)
    }

    #[test]
    fn allocate_requires_registration() {
        let mut bridge = Bridge::new();
        assert!(matches!(
            bridge.allocate(Widget(1)),
            Err(NativeFault::UnregisteredType(_))
        ));
    }

    #[test]
    fn wrap_is_idempotent() {
        let (mut bridge, hash) = bridge();
        let addr = bridge.allocate(Widget(1)).unwrap();
        let a = bridge.wrap(addr, hash, false);
        let b = bridge.wrap(addr, hash, true);
        assert_eq!(a, b);
        assert!(!bridge.is_owning(a));
        assert_eq!(bridge.stats().reps_created, 1);
        assert_eq!(bridge.stats().reps_reused, 1);
    }

    #[test]
    fn collecting_owning_rep_frees_native() {
        let (mut bridge, hash) = bridge();
        let addr = bridge.allocate(Widget(7)).unwrap();
        bridge.wrap(addr, hash, true);

        let stats = bridge.collect_garbage();
        assert_eq!(stats.finalized, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(bridge.live_native_count(), 0);
        assert_eq!(bridge.representative(addr), None);
    }

    #[test]
    fn collecting_borrowed_rep_keeps_native() {
        let (mut bridge, hash) = bridge();
        let addr = bridge.allocate(Widget(7)).unwrap();
        bridge.wrap(addr, hash, false);

        let stats = bridge.collect_garbage();
        assert_eq!(stats.released, 0);
        assert_eq!(bridge.get::<Widget>(addr), Some(&Widget(7)));
    }

    #[test]
    fn stale_release_is_counted_not_repeated() {
        let (mut bridge, hash) = bridge();
        let addr = bridge.allocate(Widget(7)).unwrap();
        bridge.wrap(addr, hash, true);
        assert!(bridge.free_native(addr));

        let stats = bridge.collect_garbage();
        assert_eq!(stats.released, 0);
        assert_eq!(stats.stale_releases, 1);
        assert!(!bridge.free_native(addr));
    }

    #[test]
    fn object_arg_checks() {
        let (mut bridge, hash) = bridge();
        let addr = bridge.allocate(Widget(1)).unwrap();
        let rep = bridge.wrap(addr, hash, false);
        bridge.host_mut().set_global("w", HostValue::Rep(rep));

        assert_eq!(
            bridge.object_arg(&HostValue::Rep(rep), hash),
            Ok(NativeValue::Object(ObjectRef::new(addr, hash)))
        );
        assert_eq!(
            bridge.object_arg(&HostValue::Nil, hash),
            Ok(NativeValue::Object(ObjectRef::null(hash)))
        );
        let other = TypeHash::from_name("Other");
        assert!(matches!(
            bridge.object_arg(&HostValue::Rep(rep), other),
            Err(ConversionError::ObjectTypeMismatch { .. })
        ));

        bridge.free_native(addr);
        assert!(matches!(
            bridge.object_arg(&HostValue::Rep(rep), hash),
            Err(ConversionError::DanglingObject { .. })
        ));
    }

    #[test]
    fn duplicate_type_registration_fails() {
        let (mut bridge, _) = bridge();
        assert!(matches!(
            bridge.register_type::<Widget>("Widget").duplicable().build(),
            Err(RegistrationError::DuplicateType(_))
        ));
    }
}
