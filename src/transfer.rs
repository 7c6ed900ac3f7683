//! Post-call ownership bookkeeping.
//!
//! Once a native callable returns successfully, the policies bound to the
//! adapter are applied: parameter slots first, then the return slot, then
//! dependency edges, and finally out values are appended to the results.
//! Nothing here can fail; a call that got this far always produces results.

use tether_core::{HostValue, NativeValue, OwnershipPolicy, RepHandle, Signature, Slot, SlotType};
use tracing::{trace, warn};

use crate::bridge::Bridge;
use crate::host::HostRuntime;

/// Everything an adapter decided at bind time.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallPlan {
    /// Transfer policy per slot: index 0 is the return slot, `n` is `Param(n)`.
    pub transfers: Vec<Option<OwnershipPolicy>>,
    /// `(dependent, dependency)` pairs in declaration order.
    pub dependencies: Vec<(Slot, Slot)>,
    /// Zero-based parameter indices whose final value is returned to the host.
    pub outs: Vec<usize>,
    /// For each parameter, the host argument that feeds it. `None` for pure
    /// out values.
    pub arg_index: Vec<Option<usize>>,
    /// Zero-based parameter indices adopted by the callee.
    pub adopted_params: Vec<usize>,
    pub host_arity: usize,
}

impl CallPlan {
    pub fn slot_index(slot: Slot) -> usize {
        match slot {
            Slot::Return => 0,
            Slot::Param(n) => n as usize,
        }
    }

    pub fn transfer(&self, slot: Slot) -> Option<&OwnershipPolicy> {
        self.transfers
            .get(Self::slot_index(slot))
            .and_then(Option::as_ref)
    }

    /// Whether the return value reaches the host at all.
    pub fn returns_value(&self, signature: &Signature) -> bool {
        !signature.ret.is_void()
            && !matches!(self.transfer(Slot::Return), Some(OwnershipPolicy::Discarded))
    }
}

/// Apply the plan after a successful native call and build the host results.
pub(crate) fn finish_call<H: HostRuntime>(
    bridge: &mut Bridge<H>,
    signature: &Signature,
    plan: &CallPlan,
    args: &[HostValue],
    natives: &[NativeValue],
    ret: NativeValue,
) -> Vec<HostValue> {
    let param_reps: Vec<Option<RepHandle>> = signature
        .params
        .iter()
        .zip(&plan.arg_index)
        .map(|(ty, index)| match (ty, index) {
            (SlotType::Object(_), Some(i)) => args.get(*i).and_then(HostValue::as_rep),
            _ => None,
        })
        .collect();

    for (n, rep) in param_reps.iter().enumerate() {
        if let (Some(rep), Some(policy)) = (rep, plan.transfer(Slot::Param(n as u16 + 1))) {
            trace!(%rep, %policy, "parameter policy applied");
        }
    }

    let returned = return_value(bridge, signature, plan, &param_reps, ret);

    for (dependent, dependency) in &plan.dependencies {
        let from = rep_in(*dependent, returned.1, &param_reps);
        let to = rep_in(*dependency, returned.1, &param_reps);
        match (from, to) {
            (Some(from), Some(to)) => bridge.add_dependency(from, to),
            _ => trace!(%dependent, %dependency, "dependency skipped, slot holds no representative"),
        }
    }

    let mut results = Vec::with_capacity(1 + plan.outs.len());
    if plan.returns_value(signature) {
        results.push(returned.0);
    }
    for &index in &plan.outs {
        let value = natives.get(index).cloned().unwrap_or_default();
        results.push(bridge.converter.to_host(&value));
    }
    results
}

fn rep_in(slot: Slot, ret: Option<RepHandle>, params: &[Option<RepHandle>]) -> Option<RepHandle> {
    match slot {
        Slot::Return => ret,
        Slot::Param(_) => slot.param_index().and_then(|i| params.get(i).copied().flatten()),
    }
}

/// Convert the return slot and apply its transfer policy.
fn return_value<H: HostRuntime>(
    bridge: &mut Bridge<H>,
    signature: &Signature,
    plan: &CallPlan,
    param_reps: &[Option<RepHandle>],
    ret: NativeValue,
) -> (HostValue, Option<RepHandle>) {
    let type_hash = match signature.ret {
        SlotType::Void => return (HostValue::Nil, None),
        SlotType::Object(hash) => hash,
        _ => return (bridge.converter.to_host(&ret), None),
    };

    let policy = plan.transfer(Slot::Return).cloned();
    if matches!(policy, Some(OwnershipPolicy::Discarded)) {
        trace!("return value discarded");
        return (HostValue::Nil, None);
    }

    let Some(addr) = ret.addr() else {
        return (HostValue::Nil, None);
    };
    if !bridge.natives.contains(addr) {
        warn!(%addr, "native callable returned a freed object");
        return (HostValue::Nil, None);
    }

    let rep = match policy {
        Some(OwnershipPolicy::Adopted(_)) => {
            let rep = bridge.wrap(addr, type_hash, true);
            bridge.reps.set_owning(rep, true);
            trace!(%rep, %addr, "bridge adopted returned object");
            rep
        }
        Some(OwnershipPolicy::Copied(_)) => {
            let copy = bridge
                .types
                .get_type(type_hash)
                .and_then(|entry| entry.duplicate)
                .and_then(|duplicate| bridge.natives.duplicate(addr, duplicate));
            match copy {
                Some(copy) => {
                    let rep = bridge.wrap(copy, type_hash, true);
                    trace!(%rep, original = %addr, %copy, "returned object copied");
                    rep
                }
                None => {
                    warn!(%addr, "returned object could not be duplicated");
                    return (HostValue::Nil, None);
                }
            }
        }
        Some(OwnershipPolicy::ReturnReference { to }) => {
            let rep = bridge.wrap(addr, type_hash, false);
            let owner = Slot::Param(to)
                .param_index()
                .and_then(|i| param_reps.get(i).copied().flatten());
            match owner {
                Some(owner) => bridge.add_dependency(rep, owner),
                None => trace!(to, "return reference target holds no representative"),
            }
            rep
        }
        _ => bridge.wrap(addr, type_hash, false),
    };
    (HostValue::Rep(rep), Some(rep))
}
