//! End-to-end properties of the bridge: release exactly once, copy and
//! ownership discipline, value round trips and signal delivery.

use engine_bridge::variant::{Vector2, Vector3};
use engine_bridge::{
    BridgeError, ClassBuilder, Delegate, EngineObject, HeapEngine, NativeEngine, NativeVariant,
    Variant, VariantType,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

fn engine() -> (Arc<HeapEngine>, Arc<dyn NativeEngine>) {
    let heap = Arc::new(HeapEngine::new());
    let dyn_engine: Arc<dyn NativeEngine> = heap.clone();
    (heap, dyn_engine)
}

#[test]
fn test_dispose_then_get_ptr_fails_and_releases_once() {
    let (heap, engine) = engine();
    ClassBuilder::new("PropPlayer").base("RefCounted").register().unwrap();

    let player = EngineObject::new(engine, "PropPlayer").unwrap();
    player.dispose();

    let err = EngineObject::get_ptr(Some(&*player)).unwrap_err();
    assert!(matches!(err, BridgeError::UseAfterDispose { ref type_name } if type_name == "PropPlayer"));

    player.dispose();
    drop(player);
    assert_eq!(heap.stats().refcounted_releases, 1);
    assert_eq!(heap.stats().live_objects, 0);
}

#[test]
fn test_copy_borrowed_leaves_source_valid() {
    let (heap, engine) = engine();
    let source = NativeVariant::PackedFloat64Array(vec![1.0, 2.0]);

    let mut copy = Variant::copy_borrowed_with(engine.clone(), &source);
    copy.dispose();

    assert_eq!(source, NativeVariant::PackedFloat64Array(vec![1.0, 2.0]));
    let again = Variant::copy_borrowed_with(engine, &source);
    assert_eq!(again.as_packed_float64_array().unwrap(), vec![1.0, 2.0]);

    let stats = heap.stats();
    assert_eq!(stats.variants_copied, 2);
    assert_eq!(stats.variants_destroyed, 1);
}

#[test]
fn test_take_ownership_releases_exactly_one_resource() {
    let (heap, engine) = engine();
    let mut owned = Variant::take_ownership_with(engine, NativeVariant::String("mine".to_string()));
    let clones: Vec<_> = (0..3).map(|_| owned.clone()).collect();

    owned.dispose();
    drop(clones);

    let stats = heap.stats();
    assert_eq!(stats.variants_copied, 0);
    assert_eq!(stats.variants_destroyed, 1);
}

#[test]
fn test_value_round_trips() {
    assert!(Variant::from(true).as_bool().unwrap());
    assert_eq!(Variant::from(-7i64).as_int64().unwrap(), -7);
    assert_eq!(Variant::from(0.25f64).as_float64().unwrap(), 0.25);
    assert_eq!(Variant::from("bridge").as_string().unwrap(), "bridge");
    assert_eq!(
        Variant::from(Vector2::new(0.5, 8.0)).as_vector2().unwrap(),
        Vector2::new(0.5, 8.0)
    );
    assert_eq!(
        Variant::from(Vector3::new(-1.0, 0.0, 1.0)).as_vector3().unwrap(),
        Vector3::new(-1.0, 0.0, 1.0)
    );
    assert_eq!(
        Variant::from(vec![10i32, 20, 30]).as_packed_int32_array().unwrap(),
        vec![10, 20, 30]
    );
}

#[test]
fn test_int16_narrowing() {
    assert_eq!(Variant::from(70000i64).as_int16().unwrap(), 4464);
}

#[test]
fn test_signal_dispatch_from_native_emission() {
    let (heap, engine) = engine();
    ClassBuilder::new("PropSlider")
        .base("Node")
        .signal("Ready", &[])
        .signal("ValueChanged", &[VariantType::Int])
        .register()
        .unwrap();
    let slider = EngineObject::new(engine, "PropSlider").unwrap();
    let handle = slider.handle().unwrap();

    let ready = Arc::new(AtomicUsize::new(0));
    let counter = ready.clone();
    slider
        .connect("Ready", Delegate::new0(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    let value = Arc::new(AtomicI64::new(0));
    let sink = value.clone();
    slider
        .connect("ValueChanged", Delegate::new1(move |v: i64| sink.store(v, Ordering::SeqCst)))
        .unwrap();

    heap.emit_signal(handle, "Ready", vec![]).unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);

    heap.emit_signal(handle, "ValueChanged", vec![NativeVariant::Int(42)]).unwrap();
    assert_eq!(value.load(Ordering::SeqCst), 42);

    let err = heap.emit_signal(handle, "ValueChanged", vec![]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::SignalArgumentCountMismatch {
            signal: "ValueChanged".to_string(),
            expected: 1,
            received: 0,
        }
    );

    // After disposal the native side no longer reaches the wrapper
    slider.dispose();
    heap.emit_signal(handle, "Ready", vec![]).unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);
}

proptest! {
    #[test]
    fn prop_integer_narrowing_wraps(value in any::<i64>()) {
        let v = Variant::from(value);
        prop_assert_eq!(v.as_int16().unwrap(), value as i16);
        prop_assert_eq!(v.as_uint8().unwrap(), value as u8);
        prop_assert_eq!(v.as_int32().unwrap(), value as i32);
    }

    #[test]
    fn prop_float_truncates_then_wraps(value in -1.0e12f64..1.0e12f64) {
        let v = Variant::from(value);
        prop_assert_eq!(v.as_int64().unwrap(), value.trunc() as i64);
        prop_assert_eq!(v.as_int16().unwrap(), (value.trunc() as i64) as i16);
    }

    #[test]
    fn prop_string_round_trip(text in ".*") {
        prop_assert_eq!(Variant::from(text.as_str()).as_string().unwrap(), text);
    }

    #[test]
    fn prop_packed_round_trip(values in proptest::collection::vec(any::<i64>(), 0..64)) {
        let (heap, engine) = engine();
        let v = Variant::take_ownership_with(engine, NativeVariant::PackedInt64Array(values.clone()));
        prop_assert_eq!(v.as_packed_int64_array().unwrap(), values);
        drop(v);
        prop_assert_eq!(heap.stats().variants_destroyed, 1);
    }
}
