//! Integration tests for enum registration and enum call slots.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tether::{Bridge, BridgeConfig, CallAdapter};
use tether_core::numeric::whole_type_rule;
use tether_core::{
    CallError, CastRule, ConversionError, EnumCastError, EnumCaster, FloatRepr, HostNumber,
    HostNumeric, HostValue, IntRepr, RegistrationError, Signature, SlotType, TypeHash,
    ValueVerdict, assert_enum_castable, cast_constant, classify,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
enum Porridge {
    SuperfluidHelium = 0,
    Goldilocks = 2_147_483_647,
    CookedInATokamak = u64::MAX,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum Switch {
    Off = 0,
    On = 1,
}

assert_enum_castable!(u8 => HostNumber::Float(FloatRepr::Single));
assert_enum_castable!(u64 = 0 => HostNumber::Float(FloatRepr::Single));

fn bridge(host: HostNumber) -> Bridge {
    Bridge::with_config(BridgeConfig::default().with_host_number(host))
}

// =============================================================================
// Rules
// =============================================================================

#[test]
fn test_whole_type_rules() {
    let single = HostNumber::Float(FloatRepr::Single);
    assert_eq!(whole_type_rule(IntRepr::U8, single), CastRule::Float);
    assert_eq!(whole_type_rule(IntRepr::I16, single), CastRule::Float);
    assert_eq!(whole_type_rule(IntRepr::I32, single), CastRule::Unsafe);
    assert_eq!(whole_type_rule(IntRepr::I32, HostNumber::DOUBLE), CastRule::Float);
    assert_eq!(whole_type_rule(IntRepr::I32, HostNumber::INT), CastRule::Integral);
    assert_eq!(whole_type_rule(IntRepr::U32, HostNumber::INT), CastRule::Unsafe);
    assert_eq!(whole_type_rule(IntRepr::U16, HostNumber::INT), CastRule::Integral);
    assert_eq!(
        whole_type_rule(IntRepr::U64, HostNumber::Float(FloatRepr::Extended)),
        CastRule::Float
    );
}

#[test]
fn test_porridge_against_single_precision_host() {
    let single = HostNumber::Float(FloatRepr::Single);

    assert!(matches!(
        EnumCaster::<Porridge>::new(single),
        Err(EnumCastError::UnsafeType { repr: IntRepr::U64, .. })
    ));
    assert_eq!(classify(Porridge::SuperfluidHelium, single), ValueVerdict::Float);
    assert_eq!(classify(Porridge::Goldilocks, single), ValueVerdict::Rejected);
    assert_eq!(classify(Porridge::CookedInATokamak, single), ValueVerdict::Rejected);

    assert_eq!(
        cast_constant(Porridge::SuperfluidHelium, single),
        Ok(HostNumeric::F32(0.0))
    );
    assert!(matches!(
        cast_constant(Porridge::CookedInATokamak, single),
        Err(EnumCastError::UnsafeValue { .. })
    ));
}

#[test]
fn test_porridge_against_other_hosts() {
    // Double precision holds goldilocks by the per-value rule only.
    assert_eq!(classify(Porridge::Goldilocks, HostNumber::DOUBLE), ValueVerdict::Float);
    assert_eq!(
        classify(Porridge::CookedInATokamak, HostNumber::DOUBLE),
        ValueVerdict::Rejected
    );

    assert_eq!(classify(Porridge::Goldilocks, HostNumber::INT), ValueVerdict::Integral);
    assert_eq!(
        classify(Porridge::CookedInATokamak, HostNumber::Int(IntRepr::U64)),
        ValueVerdict::WholeType(CastRule::Integral)
    );
    assert_eq!(
        classify(Porridge::CookedInATokamak, HostNumber::Float(FloatRepr::Extended)),
        ValueVerdict::WholeType(CastRule::Float)
    );
}

#[test]
fn test_caster_round_trips() {
    let caster = EnumCaster::<Switch>::new(HostNumber::DOUBLE).unwrap();
    assert_eq!(caster.rule(), CastRule::Float);
    let stored = caster.to_host(Switch::On);
    assert_eq!(stored, HostNumeric::F64(1.0));
    assert_eq!(caster.from_host(stored), Ok(Switch::On));
    assert!(matches!(
        caster.from_host(HostNumeric::F64(0.5)),
        Err(EnumCastError::NotIntegral { .. })
    ));
    assert!(matches!(
        caster.from_host(HostNumeric::F64(9.0)),
        Err(EnumCastError::UnknownDiscriminant { value: 9, .. })
    ));
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_registration_accepts_per_value_safe_constants() {
    let mut bridge = bridge(HostNumber::Float(FloatRepr::Single));
    let hash = bridge
        .register_enum::<Porridge>("Porridge")
        .variant("superfluid_helium", Porridge::SuperfluidHelium)
        .build()
        .unwrap();

    let entry = bridge.types().get_enum(hash).unwrap();
    assert!(!entry.is_whole_type_safe());
    assert_eq!(entry.constants[0].verdict, ValueVerdict::Float);
}

#[test]
fn test_registration_rejects_unsafe_constant() {
    let mut bridge = bridge(HostNumber::Float(FloatRepr::Single));
    let err = bridge
        .register_enum::<Porridge>("Porridge")
        .variant("superfluid_helium", Porridge::SuperfluidHelium)
        .variant("cooked_in_a_tokamak", Porridge::CookedInATokamak)
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        RegistrationError::EnumCast {
            enum_name: "Porridge".into(),
            constant: "cooked_in_a_tokamak".into(),
            value: u64::MAX.into(),
            host: HostNumber::Float(FloatRepr::Single),
        }
    );
    assert_eq!(bridge.types().enum_count(), 0);
}

#[test]
fn test_rule_cache_is_shared_across_registrations() {
    let mut bridge = bridge(HostNumber::DOUBLE);
    bridge
        .register_enum::<Switch>("Switch")
        .variant("off", Switch::Off)
        .variant("on", Switch::On)
        .build()
        .unwrap();
    bridge
        .register_enum_repr("Flags", IntRepr::U8)
        .value("none", 0u8)
        .build()
        .unwrap();
    assert_eq!(bridge.types().enum_count(), 2);
    assert_eq!(bridge.types().rule_count(), 1);
}

// =============================================================================
// Enum slots
// =============================================================================

fn register_switch(bridge: &mut Bridge) -> TypeHash {
    bridge
        .register_enum::<Switch>("Switch")
        .variant("off", Switch::Off)
        .variant("on", Switch::On)
        .build()
        .unwrap()
}

fn toggle(bridge: &mut Bridge, switch: TypeHash) -> CallAdapter {
    bridge
        .bind(
            CallAdapter::builder(
                "toggle",
                Signature::function([SlotType::Enum(switch)], SlotType::Enum(switch)),
            )
            .native(|call| {
                let flipped = match call.arg_enum::<Switch>(0)? {
                    Switch::Off => Switch::On,
                    Switch::On => Switch::Off,
                };
                call.set_return_enum(flipped);
                Ok(())
            }),
        )
        .unwrap()
}

#[test]
fn test_enum_slot_uses_host_numbers() {
    let mut bridge = bridge(HostNumber::DOUBLE);
    let switch = register_switch(&mut bridge);
    let toggle = toggle(&mut bridge, switch);

    assert_eq!(
        toggle.invoke(&mut bridge, &[HostValue::Number(1.0)]).unwrap(),
        vec![HostValue::Number(0.0)]
    );
    assert_eq!(
        toggle.invoke(&mut bridge, &[HostValue::Int(0)]).unwrap(),
        vec![HostValue::Number(1.0)]
    );
}

#[test]
fn test_enum_slot_on_integer_host() {
    let mut bridge = bridge(HostNumber::INT);
    let switch = register_switch(&mut bridge);
    let toggle = toggle(&mut bridge, switch);

    assert_eq!(
        toggle.invoke(&mut bridge, &[HostValue::Int(0)]).unwrap(),
        vec![HostValue::Int(1)]
    );
}

#[test]
fn test_unknown_enum_value_is_a_conversion_error() {
    let mut bridge = bridge(HostNumber::DOUBLE);
    let switch = register_switch(&mut bridge);
    let toggle = toggle(&mut bridge, switch);

    let err = toggle.invoke(&mut bridge, &[HostValue::Number(5.0)]).unwrap_err();
    assert_eq!(
        err,
        CallError::Conversion {
            function: "toggle".into(),
            index: 1,
            source: ConversionError::InvalidEnumValue {
                enum_name: "Switch".into(),
                value: 5,
            },
        }
    );

    let err = toggle.invoke(&mut bridge, &[HostValue::Number(0.5)]).unwrap_err();
    assert!(matches!(
        err,
        CallError::Conversion {
            source: ConversionError::NotIntegral { .. },
            ..
        }
    ));
}

#[test]
fn test_enum_slot_requires_whole_type_safety() {
    let mut bridge = bridge(HostNumber::Float(FloatRepr::Single));
    let porridge = bridge
        .register_enum::<Porridge>("Porridge")
        .variant("superfluid_helium", Porridge::SuperfluidHelium)
        .build()
        .unwrap();

    let err = bridge
        .bind(
            CallAdapter::builder("eat", Signature::function([SlotType::Enum(porridge)], SlotType::Void))
                .native(|_| Ok(())),
        )
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::EnumNotWholeTypeSafe {
            function: "eat".into(),
            enum_name: "Porridge".into(),
            repr: IntRepr::U64,
            host: HostNumber::Float(FloatRepr::Single),
        }
    );
}

#[test]
fn test_unregistered_enum_slot() {
    let mut bridge = bridge(HostNumber::DOUBLE);
    let err = bridge
        .bind(
            CallAdapter::builder(
                "eat",
                Signature::function([SlotType::Enum(TypeHash::from_name("Porridge"))], SlotType::Void),
            )
            .native(|_| Ok(())),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::UnknownType { .. }));
}
