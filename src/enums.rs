//! Enum registration.
//!
//! Every constant is classified against the bridge's host number type when
//! the enum is built. One constant that no rule accepts rejects the whole
//! registration; nothing is ever deferred to a runtime cast.

use rustc_hash::FxHashSet;
use tether_core::{HostNumeric, IntRepr, NativeEnum, RegistrationError, TypeHash, ValueVerdict};
use tether_registry::{EnumConstant, EnumEntry};

use crate::bridge::Bridge;
use crate::host::HostRuntime;

/// Builder for an enum registration.
///
/// ```
/// use num_enum::{IntoPrimitive, TryFromPrimitive};
/// use tether::Bridge;
///
/// #[derive(Clone, Copy, Debug, IntoPrimitive, TryFromPrimitive)]
/// #[repr(u8)]
/// enum Mode {
///     Off = 0,
///     On = 1,
/// }
///
/// let mut bridge = Bridge::new();
/// let hash = bridge
///     .register_enum::<Mode>("Mode")
///     .variant("Off", Mode::Off)
///     .variant("On", Mode::On)
///     .build()
///     .unwrap();
/// assert!(bridge.types().get_enum(hash).unwrap().is_whole_type_safe());
/// ```
pub struct EnumBuilder<'b, H: HostRuntime> {
    bridge: &'b mut Bridge<H>,
    name: String,
    repr: IntRepr,
    constants: Vec<(String, i128)>,
}

impl<'b, H: HostRuntime> EnumBuilder<'b, H> {
    pub(crate) fn new(bridge: &'b mut Bridge<H>, name: String, repr: IntRepr) -> Self {
        Self {
            bridge,
            name,
            repr,
            constants: Vec::new(),
        }
    }

    /// Add a constant by raw value.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<i128>) -> Self {
        self.constants.push((name.into(), value.into()));
        self
    }

    /// Add a constant from an enum variant.
    pub fn variant<E: NativeEnum>(self, name: impl Into<String>, value: E) -> Self {
        self.value(name, value.discriminant())
    }

    /// Classify every constant added so far without registering anything.
    pub fn verdicts(&mut self) -> Vec<(String, ValueVerdict)> {
        let host = self.bridge.config.host_number;
        let repr = self.repr;
        let types = &mut self.bridge.types;
        self.constants
            .iter()
            .map(|(name, value)| (name.clone(), types.classify_constant(repr, *value, host)))
            .collect()
    }

    /// Validate and register the enum.
    pub fn build(self) -> Result<TypeHash, RegistrationError> {
        let host = self.bridge.config.host_number;
        let rule = self.bridge.types.rule(self.repr, host);

        let mut seen = FxHashSet::default();
        let mut constants = Vec::with_capacity(self.constants.len());
        for (name, value) in self.constants {
            if !seen.insert(name.clone()) {
                return Err(RegistrationError::DuplicateEnumValue {
                    enum_name: self.name,
                    value_name: name,
                });
            }
            let verdict = self.bridge.types.classify_constant(self.repr, value, host);
            if !verdict.is_accepted() {
                return Err(RegistrationError::EnumCast {
                    enum_name: self.name,
                    constant: name,
                    value,
                    host,
                });
            }
            constants.push(EnumConstant {
                name,
                value,
                verdict,
                host_value: HostNumeric::cast(value, host),
            });
        }

        self.bridge.types.register_enum(EnumEntry {
            type_hash: TypeHash::from_name(&self.name),
            name: self.name,
            repr: self.repr,
            host,
            rule,
            constants,
        })
    }
}
