//! Call adapters: native callables wrapped with their ownership policies.
//!
//! An adapter is built in two steps. [`CallAdapter::builder`] collects the
//! signature, the policies and the native callable; [`Bridge::bind`] checks
//! them against the registered types and produces a [`CallAdapter`] that can
//! be invoked any number of times.
//!
//! ```
//! use tether::{Bridge, CallAdapter};
//! use tether_core::{HostValue, PrimitiveKind, Signature, SlotType};
//!
//! let mut bridge = Bridge::new();
//! let add = bridge
//!     .bind(
//!         CallAdapter::builder(
//!             "add",
//!             Signature::function(
//!                 [SlotType::Primitive(PrimitiveKind::Int32); 2],
//!                 SlotType::Primitive(PrimitiveKind::Int32),
//!             ),
//!         )
//!         .native(|call| {
//!             let sum = call.arg::<i32>(0)? + call.arg::<i32>(1)?;
//!             call.set_return(sum);
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//!
//! let results = add.invoke(&mut bridge, &[HostValue::Int(2), HostValue::Int(3)]).unwrap();
//! assert_eq!(results, vec![HostValue::Int(5)]);
//! ```

use std::any::{Any, type_name};
use std::sync::Arc;

use tether_core::{
    CallError, ConversionError, FromNative, HostValue, IntoNative, NativeAddr, NativeEnum,
    NativeFault, NativeValue, ObjectRef, OwnershipPolicy, RegistrationError, RepHandle, Signature,
    Slot, SlotType, TypeHash,
};
use tracing::{debug, trace};

use crate::bridge::Bridge;
use crate::host::HostRuntime;
use crate::script_heap::ScriptHeap;
use crate::transfer::{self, CallPlan};

/// A native callable as stored in an adapter.
pub type NativeCallable<H> =
    Arc<dyn Fn(&mut NativeCall<'_, H>) -> Result<(), NativeFault> + Send + Sync>;

// ============================================================================
// Builder
// ============================================================================

/// Unvalidated description of a call adapter.
pub struct CallAdapterBuilder<H: HostRuntime> {
    name: String,
    signature: Signature,
    policies: Vec<OwnershipPolicy>,
    native: Option<NativeCallable<H>>,
}

impl<H: HostRuntime> CallAdapterBuilder<H> {
    /// Attach one policy.
    pub fn policy(mut self, policy: OwnershipPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Attach several policies.
    pub fn policies(mut self, policies: impl IntoIterator<Item = OwnershipPolicy>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Set the native callable.
    pub fn native<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut NativeCall<'_, H>) -> Result<(), NativeFault> + Send + Sync + 'static,
    {
        self.native = Some(Arc::new(f));
        self
    }

    /// Validate against `bridge`'s registries.
    pub(crate) fn build(self, bridge: &mut Bridge<H>) -> Result<CallAdapter<H>, RegistrationError> {
        let CallAdapterBuilder {
            name,
            signature,
            policies,
            native,
        } = self;

        let params = signature.param_count();
        let limit = bridge.config.max_params;
        if params > limit {
            return Err(RegistrationError::TooManyParams {
                function: name,
                params,
                limit,
            });
        }
        if let Some(n) = signature.params.iter().position(|ty| ty.is_void()) {
            return Err(RegistrationError::VoidParam {
                function: name,
                slot: Slot::Param(n as u16 + 1),
            });
        }
        let Some(native) = native else {
            return Err(RegistrationError::MissingNative(name));
        };

        let check = Checker {
            bridge,
            function: &name,
            signature: &signature,
            discards_return: policies.contains(&OwnershipPolicy::Discarded),
        };
        check.ranges(&policies)?;
        check.slot_types()?;
        let plan = check.plan(&policies)?;

        let hash = TypeHash::from_function(&name, &signature.param_hashes());
        debug!(function = %name, %hash, policies = policies.len(), "bound call adapter");
        Ok(CallAdapter {
            inner: Arc::new(AdapterInner {
                name,
                hash,
                signature,
                policies,
                plan,
                native,
            }),
        })
    }
}

/// Bind-time validation over one signature.
struct Checker<'a, H: HostRuntime> {
    bridge: &'a Bridge<H>,
    function: &'a str,
    signature: &'a Signature,
    discards_return: bool,
}

impl<H: HostRuntime> Checker<'_, H> {
    fn ranges(&self, policies: &[OwnershipPolicy]) -> Result<(), RegistrationError> {
        for policy in policies {
            for slot in policy.slots() {
                if self.signature.slot_type(slot).is_none() {
                    return Err(RegistrationError::SlotOutOfRange {
                        function: self.function.to_string(),
                        policy: policy.clone(),
                        slot,
                        params: self.signature.param_count(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every object and enum slot must name a registered type. A discarded
    /// return never crosses the boundary, so its type may be unknown.
    fn slot_types(&self) -> Result<(), RegistrationError> {
        for slot in self.signature.slots() {
            let Some(ty) = self.signature.slot_type(slot) else {
                continue;
            };
            match ty {
                SlotType::Object(hash) => {
                    if slot.is_return() && self.discards_return {
                        continue;
                    }
                    if !self.bridge.types.contains(hash) {
                        return Err(self.unknown(slot, hash));
                    }
                }
                SlotType::Enum(hash) => {
                    let entry = self
                        .bridge
                        .types
                        .get_enum(hash)
                        .ok_or_else(|| self.unknown(slot, hash))?;
                    if !entry.is_whole_type_safe() {
                        return Err(RegistrationError::EnumNotWholeTypeSafe {
                            function: self.function.to_string(),
                            enum_name: entry.name.clone(),
                            repr: entry.repr,
                            host: entry.host,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn plan(&self, policies: &[OwnershipPolicy]) -> Result<CallPlan, RegistrationError> {
        let params = self.signature.param_count();
        let mut plan = CallPlan {
            transfers: vec![None; params + 1],
            ..CallPlan::default()
        };
        let mut pure_outs = vec![false; params];

        for policy in policies {
            self.compatible(policy)?;
            match policy {
                OwnershipPolicy::Dependency {
                    dependent,
                    dependency,
                } => plan.dependencies.push((*dependent, *dependency)),
                _ => {
                    let slot = policy.primary_slot();
                    let index = CallPlan::slot_index(slot);
                    if let Some(existing) = &plan.transfers[index] {
                        return Err(RegistrationError::DuplicatePolicy {
                            function: self.function.to_string(),
                            slot,
                            existing: existing.clone(),
                            policy: policy.clone(),
                        });
                    }
                    plan.transfers[index] = Some(policy.clone());
                }
            }
            match policy {
                OwnershipPolicy::OutValue(n) => plan.outs.push(*n as usize - 1),
                OwnershipPolicy::PureOutValue(n) => {
                    plan.outs.push(*n as usize - 1);
                    pure_outs[*n as usize - 1] = true;
                }
                OwnershipPolicy::Adopted(Slot::Param(n)) => plan.adopted_params.push(*n as usize - 1),
                _ => {}
            }
        }

        plan.outs.sort_unstable();
        let mut next = 0;
        plan.arg_index = pure_outs
            .iter()
            .map(|pure| {
                if *pure {
                    None
                } else {
                    next += 1;
                    Some(next - 1)
                }
            })
            .collect();
        plan.host_arity = next;
        Ok(plan)
    }

    /// Check a policy against the kinds of the slots it names.
    fn compatible(&self, policy: &OwnershipPolicy) -> Result<(), RegistrationError> {
        match policy {
            OwnershipPolicy::Borrowed(slot) | OwnershipPolicy::Adopted(slot) => {
                self.require_object(policy, *slot)
            }
            OwnershipPolicy::Copied(slot) => {
                if !slot.is_return() {
                    return Err(self.incompatible(policy, *slot, "only a returned value can be copied"));
                }
                self.require_object(policy, *slot)?;
                let Some(hash) = self.signature.ret.object_type() else {
                    return Ok(());
                };
                match self.bridge.types.get_type(hash) {
                    Some(entry) if entry.is_duplicable() => Ok(()),
                    _ => Err(RegistrationError::MissingDuplicate {
                        function: self.function.to_string(),
                        slot: *slot,
                        type_name: self.bridge.types.type_name(hash),
                    }),
                }
            }
            OwnershipPolicy::Discarded => {
                if self.signature.ret.is_void() {
                    Err(self.incompatible(policy, Slot::Return, "there is no return value to discard"))
                } else {
                    Ok(())
                }
            }
            OwnershipPolicy::ReturnReference { to } => {
                self.require_identity(policy, Slot::Return)?;
                self.require_identity(policy, Slot::Param(*to))
            }
            OwnershipPolicy::Dependency {
                dependent,
                dependency,
            } => {
                self.require_identity(policy, *dependent)?;
                self.require_identity(policy, *dependency)
            }
            OwnershipPolicy::OutValue(n) | OwnershipPolicy::PureOutValue(n) => {
                let slot = Slot::Param(*n);
                match self.signature.slot_type(slot) {
                    Some(SlotType::OutPtr(_)) => Ok(()),
                    _ => Err(self.incompatible(policy, slot, "out values need a pointer to a primitive")),
                }
            }
        }
    }

    /// Edges need a representative in the slot, which a discarded return
    /// never has.
    fn require_identity(&self, policy: &OwnershipPolicy, slot: Slot) -> Result<(), RegistrationError> {
        if slot.is_return() && self.discards_return {
            return Err(self.incompatible(policy, slot, "the return value is discarded"));
        }
        self.require_object(policy, slot)
    }

    fn require_object(&self, policy: &OwnershipPolicy, slot: Slot) -> Result<(), RegistrationError> {
        match self.signature.slot_type(slot) {
            Some(SlotType::Object(_)) => Ok(()),
            _ => Err(self.incompatible(policy, slot, "the slot does not hold an object")),
        }
    }

    fn incompatible(&self, policy: &OwnershipPolicy, slot: Slot, reason: &'static str) -> RegistrationError {
        RegistrationError::IncompatibleSlot {
            function: self.function.to_string(),
            policy: policy.clone(),
            slot,
            slot_type: self
                .signature
                .slot_type(slot)
                .map_or_else(|| "none".to_string(), SlotType::describe),
            reason,
        }
    }

    fn unknown(&self, slot: Slot, type_hash: TypeHash) -> RegistrationError {
        RegistrationError::UnknownType {
            function: self.function.to_string(),
            slot,
            type_hash,
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

struct AdapterInner<H: HostRuntime> {
    name: String,
    hash: TypeHash,
    signature: Signature,
    policies: Vec<OwnershipPolicy>,
    plan: CallPlan,
    native: NativeCallable<H>,
}

/// A validated native callable with its ownership policies.
///
/// Cloning is cheap; clones share the same callable.
pub struct CallAdapter<H: HostRuntime = ScriptHeap> {
    inner: Arc<AdapterInner<H>>,
}

impl<H: HostRuntime> Clone for CallAdapter<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HostRuntime> std::fmt::Debug for CallAdapter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAdapter")
            .field("name", &self.inner.name)
            .field("hash", &self.inner.hash)
            .field("signature", &self.inner.signature)
            .field("policies", &self.inner.policies)
            .finish_non_exhaustive()
    }
}

impl<H: HostRuntime> CallAdapter<H> {
    /// Start describing an adapter.
    pub fn builder(name: impl Into<String>, signature: Signature) -> CallAdapterBuilder<H> {
        CallAdapterBuilder {
            name: name.into(),
            signature,
            policies: Vec::new(),
            native: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn hash(&self) -> TypeHash {
        self.inner.hash
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    pub fn policies(&self) -> &[OwnershipPolicy] {
        &self.inner.policies
    }

    /// Number of host arguments a call takes. Pure out values take none.
    pub fn host_arity(&self) -> usize {
        self.inner.plan.host_arity
    }

    /// Number of values a successful call returns.
    pub fn result_count(&self) -> usize {
        usize::from(self.inner.plan.returns_value(&self.inner.signature)) + self.inner.plan.outs.len()
    }

    /// Call the native callable with host arguments.
    ///
    /// Results are the return value (unless void or discarded) followed by
    /// out values in parameter order. On error no ownership transfer takes
    /// place: a parameter marked `Adopted` moves to native code before the
    /// callable runs and moves back if the callable faults without freeing it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke(&self, bridge: &mut Bridge<H>, args: &[HostValue]) -> Result<Vec<HostValue>, CallError> {
        let inner = &*self.inner;
        let plan = &inner.plan;
        bridge.stats.calls += 1;

        if args.len() != plan.host_arity {
            return Err(CallError::Arity {
                function: inner.name.clone(),
                expected: plan.host_arity,
                got: args.len(),
            });
        }

        let conversion = |index: usize, source: ConversionError| CallError::Conversion {
            function: inner.name.clone(),
            index: index + 1,
            source,
        };

        let mut natives = Vec::with_capacity(inner.signature.param_count());
        for (ty, index) in inner.signature.params.iter().zip(&plan.arg_index) {
            let value = match (ty, index) {
                (SlotType::OutPtr(kind), None) => kind.default_value(),
                (_, Some(i)) => bridge.to_native(&args[*i], ty).map_err(|e| conversion(*i, e))?,
                (_, None) => NativeValue::Void,
            };
            natives.push(value);
        }

        let mut adopted: Vec<RepHandle> = Vec::with_capacity(plan.adopted_params.len());
        for &param in &plan.adopted_params {
            let Some(i) = plan.arg_index[param] else {
                continue;
            };
            if let HostValue::Rep(rep) = &args[i] {
                if !bridge.is_owning(*rep) {
                    return Err(conversion(i, ConversionError::NotOwned(*rep)));
                }
                adopted.push(*rep);
            }
        }
        for rep in &adopted {
            bridge.release_to_native(*rep);
        }

        let pinned: Vec<RepHandle> = if bridge.config.pin_arguments {
            args.iter().filter_map(HostValue::as_rep).collect()
        } else {
            Vec::new()
        };
        for rep in &pinned {
            bridge.host.pin(*rep);
        }

        let mut ret = NativeValue::Void;
        let outcome = {
            let mut call = NativeCall {
                bridge: &mut *bridge,
                function: &inner.name,
                signature: &inner.signature,
                args: &mut natives,
                ret: &mut ret,
            };
            (inner.native)(&mut call)
        };

        for rep in pinned.iter().rev() {
            bridge.host.unpin(*rep);
        }

        if let Err(fault) = outcome {
            debug!(function = %inner.name, %fault, "native callable failed");
            for rep in adopted {
                bridge.reclaim_from_native(rep);
            }
            return Err(CallError::Native(fault));
        }
        trace!(function = %inner.name, "native callable returned");
        Ok(transfer::finish_call(
            bridge,
            &inner.signature,
            plan,
            args,
            &natives,
            ret,
        ))
    }
}

// ============================================================================
// Native call context
// ============================================================================

/// What a native callable sees during one invocation.
///
/// Arguments are indexed from zero; for methods index 0 is the receiver.
pub struct NativeCall<'a, H: HostRuntime> {
    bridge: &'a mut Bridge<H>,
    function: &'a str,
    signature: &'a Signature,
    args: &'a mut [NativeValue],
    ret: &'a mut NativeValue,
}

impl<'a, H: HostRuntime> NativeCall<'a, H> {
    pub fn function(&self) -> &str {
        self.function
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Raw value of argument `index`.
    pub fn value(&self, index: usize) -> Result<&NativeValue, NativeFault> {
        self.args.get(index).ok_or(NativeFault::ArgumentIndex {
            index,
            count: self.args.len(),
        })
    }

    /// Argument `index` as a Rust value.
    pub fn arg<T: FromNative>(&self, index: usize) -> Result<T, NativeFault> {
        let value = self.value(index)?;
        T::from_native(value).map_err(|_| NativeFault::ArgumentType {
            index,
            expected: type_name::<T>(),
            actual: value.type_name(),
        })
    }

    /// Argument `index` as an enum variant.
    pub fn arg_enum<E: NativeEnum>(&self, index: usize) -> Result<E, NativeFault> {
        let value = self.value(index)?;
        match value {
            NativeValue::Enum { value, .. } => {
                E::from_discriminant(*value).ok_or_else(|| {
                    NativeFault::message(format!("{value} is not a variant of {}", E::NAME))
                })
            }
            other => Err(NativeFault::ArgumentType {
                index,
                expected: E::NAME,
                actual: other.type_name(),
            }),
        }
    }

    /// Address held by object argument `index`; `None` for null.
    pub fn object(&self, index: usize) -> Result<Option<NativeAddr>, NativeFault> {
        match self.value(index)? {
            NativeValue::Object(object) => Ok(object.addr),
            other => Err(NativeFault::ArgumentType {
                index,
                expected: "object",
                actual: other.type_name(),
            }),
        }
    }

    fn non_null(&self, index: usize) -> Result<NativeAddr, NativeFault> {
        self.object(index)?.ok_or(NativeFault::NullPointer { index })
    }

    fn missing<T: Any>(&self, addr: NativeAddr) -> NativeFault {
        if self.bridge.natives.contains(addr) {
            NativeFault::WrongNativeType {
                addr,
                expected: type_name::<T>(),
            }
        } else {
            NativeFault::StaleAddress(addr)
        }
    }

    /// Borrow the object behind argument `index`.
    pub fn object_ref<T: Any>(&self, index: usize) -> Result<&T, NativeFault> {
        let addr = self.non_null(index)?;
        match self.bridge.natives.get::<T>(addr) {
            Some(value) => Ok(value),
            None => Err(self.missing::<T>(addr)),
        }
    }

    /// Mutably borrow the object behind argument `index`.
    pub fn object_mut<T: Any>(&mut self, index: usize) -> Result<&mut T, NativeFault> {
        let addr = self.non_null(index)?;
        if self.bridge.natives.get::<T>(addr).is_none() {
            return Err(self.missing::<T>(addr));
        }
        self.bridge
            .natives
            .get_mut::<T>(addr)
            .ok_or(NativeFault::StaleAddress(addr))
    }

    /// The receiver of a method.
    pub fn this<T: Any>(&self) -> Result<&T, NativeFault> {
        self.object_ref(0)
    }

    pub fn this_mut<T: Any>(&mut self) -> Result<&mut T, NativeFault> {
        self.object_mut(0)
    }

    /// Current value of out parameter `index`.
    pub fn out<T: FromNative>(&self, index: usize) -> Result<T, NativeFault> {
        self.arg(index)
    }

    /// Write through out parameter `index`.
    pub fn set_out<T: IntoNative>(&mut self, index: usize, value: T) -> Result<(), NativeFault> {
        match self.signature.params.get(index) {
            Some(SlotType::OutPtr(_)) => {
                self.args[index] = value.into_native();
                Ok(())
            }
            Some(_) => Err(NativeFault::ArgumentType {
                index,
                expected: "out pointer",
                actual: self.args[index].type_name(),
            }),
            None => Err(NativeFault::ArgumentIndex {
                index,
                count: self.args.len(),
            }),
        }
    }

    pub fn set_return<T: IntoNative>(&mut self, value: T) {
        *self.ret = value.into_native();
    }

    /// Return an object pointer; `None` returns null.
    pub fn set_return_object(&mut self, addr: Option<NativeAddr>) {
        let type_hash = self.signature.ret.object_type().unwrap_or(TypeHash::EMPTY);
        *self.ret = NativeValue::Object(ObjectRef {
            addr,
            type_hash,
        });
    }

    pub fn set_return_enum<E: NativeEnum>(&mut self, value: E) {
        let type_hash = match self.signature.ret {
            SlotType::Enum(hash) => hash,
            _ => TypeHash::EMPTY,
        };
        *self.ret = NativeValue::Enum {
            type_hash,
            value: value.discriminant(),
        };
    }

    /// Allocate a native object of a registered type.
    pub fn allocate<T: Any + Send>(&mut self, value: T) -> Result<NativeAddr, NativeFault> {
        self.bridge.allocate(value)
    }

    /// Free a native object this callable owns.
    pub fn free(&mut self, addr: NativeAddr) -> bool {
        self.bridge.free_native(addr)
    }

    /// The bridge itself, for reentrant calls.
    pub fn bridge(&mut self) -> &mut Bridge<H> {
        self.bridge
    }
}
