//! Ownership-policy bridge between native objects and a garbage-collected
//! host runtime.
//!
//! Native callables are bound with [`OwnershipPolicy`] annotations that say,
//! per call slot, who owns the value once the call returns. The [`Bridge`]
//! keeps one representative per live native object, records dependencies
//! between representatives so the host collector cannot free an object still
//! needed by another, and releases adopted objects when their representative
//! is collected.
//!
//! # Crates
//!
//! - `tether-core`: slots, policies, values, numeric rules and the native heap
//! - `tether-registry`: representative map, dependency graph and type registry
//! - `tether`: the bridge, call adapters and the reference [`ScriptHeap`] host
//!
//! # Example
//!
//! ```
//! use tether::{Bridge, CallAdapter};
//! use tether_core::{HostValue, OwnershipPolicy, Signature, Slot, SlotType};
//!
//! #[derive(Debug)]
//! struct Shape(u32);
//!
//! let mut bridge = Bridge::new();
//! let shape = bridge.register_type::<Shape>("Shape").build().unwrap();
//!
//! let make = bridge
//!     .bind(
//!         CallAdapter::builder("make_shape", Signature::function([], SlotType::Object(shape)))
//!             .policy(OwnershipPolicy::Adopted(Slot::Return))
//!             .native(|call| {
//!                 let addr = call.allocate(Shape(3))?;
//!                 call.set_return_object(Some(addr));
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//!
//! let result = make.invoke(&mut bridge, &[]).unwrap();
//! assert!(matches!(result[0], HostValue::Rep(_)));
//! assert_eq!(bridge.live_native_count(), 1);
//!
//! // Nothing holds the representative, so the next collection frees the shape.
//! bridge.collect_garbage();
//! assert_eq!(bridge.live_native_count(), 0);
//! ```

mod adapter;
mod bridge;
mod config;
mod enums;
mod host;
mod script_heap;
mod transfer;

pub use adapter::{CallAdapter, CallAdapterBuilder, NativeCall, NativeCallable};
pub use bridge::{Bridge, BridgeStats, CollectStats, TypeBuilder};
pub use config::BridgeConfig;
pub use enums::EnumBuilder;
pub use host::HostRuntime;
pub use script_heap::{ObjectFlags, ScriptHeap};

pub use tether_core;
pub use tether_registry;
