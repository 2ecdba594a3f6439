//! Tests for engine objects, the class table and the signal bridge

use super::*;
use crate::native::HeapEngine;
use crate::variant::VariantType;
use std::sync::atomic::{AtomicI64, AtomicUsize};
use std::sync::Mutex;
use std::thread;

fn engine() -> (Arc<HeapEngine>, Arc<dyn NativeEngine>) {
    let heap = Arc::new(HeapEngine::new());
    let dyn_engine: Arc<dyn NativeEngine> = heap.clone();
    (heap, dyn_engine)
}

#[test]
fn test_refcounted_dispose_releases_once() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestItem").base("RefCounted").register().unwrap();

    let item = EngineObject::new(engine, "ObjTestItem").unwrap();
    assert_eq!(item.ownership(), Ownership::ReferenceCounted);
    let handle = item.handle().unwrap();
    assert_eq!(heap.refcount(handle), Some(1));

    item.dispose();
    item.dispose();
    assert!(item.is_disposed());
    assert!(!heap.is_alive(handle));
    assert_eq!(heap.stats().refcounted_releases, 1);

    let err = EngineObject::get_ptr(Some(&*item)).unwrap_err();
    assert_eq!(
        err,
        BridgeError::UseAfterDispose {
            type_name: "ObjTestItem".to_string()
        }
    );
    assert_eq!(EngineObject::get_ptr(None).unwrap(), NativeHandle::NULL);
}

#[test]
fn test_exclusive_dispose_frees() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestSprite").base("Node").register().unwrap();

    let sprite = EngineObject::new(engine, "ObjTestSprite").unwrap();
    assert_eq!(sprite.ownership(), Ownership::Exclusive);
    assert_eq!(sprite.native_class(), "Node");

    sprite.dispose();
    let stats = heap.stats();
    assert_eq!(stats.exclusive_releases, 1);
    assert_eq!(stats.objects_freed, 1);
}

#[test]
fn test_drop_takes_finalizer_path() {
    let (heap, engine) = engine();
    let handle = {
        let obj = EngineObject::new(engine, "RefCounted").unwrap();
        obj.handle().unwrap()
    };

    assert!(!heap.is_alive(handle));
    let stats = heap.stats();
    assert_eq!(stats.refcounted_releases, 1);
    assert_eq!(stats.finalizer_releases, 1);
    assert!(bindings::lookup(handle).is_none());
}

#[test]
fn test_explicit_dispose_then_drop_releases_once() {
    let (heap, engine) = engine();
    let obj = EngineObject::new(engine, "Resource").unwrap();
    obj.dispose();
    drop(obj);

    let stats = heap.stats();
    assert_eq!(stats.refcounted_releases, 1);
    assert_eq!(stats.finalizer_releases, 0);
}

#[test]
fn test_concurrent_dispose_races_release_once() {
    let (heap, engine) = engine();
    let obj = EngineObject::new(engine, "Node").unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let obj = obj.clone();
            thread::spawn(move || obj.dispose())
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    drop(obj);

    assert_eq!(heap.stats().exclusive_releases, 1);
}

#[test]
fn test_pre_tied_construction() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestTheme").base("Resource").register().unwrap();

    let handle = heap.create_object("Resource").unwrap();
    let theme = EngineObject::from_handle(engine.clone(), "ObjTestTheme", handle).unwrap();
    assert_eq!(heap.refcount(handle), Some(2));
    assert_eq!(heap.script_class(handle).as_deref(), Some("ObjTestTheme"));

    // One wrapper per handle
    let again = EngineObject::from_handle(engine.clone(), "ObjTestTheme", handle).unwrap();
    assert!(Arc::ptr_eq(&theme, &again));
    assert!(Arc::ptr_eq(&bindings::lookup(handle).unwrap(), &theme));

    let err = EngineObject::from_handle(engine, "ObjTestTheme", NativeHandle::NULL).unwrap_err();
    assert!(matches!(err, BridgeError::NullHandle { .. }));

    drop((theme, again));
    assert_eq!(heap.refcount(handle), Some(1));
}

#[test]
fn test_reading_node_variant_leaves_node_alive() {
    let (heap, engine) = engine();
    let node = heap.create_object("Node").unwrap();
    let v = Variant::copy_borrowed_with(engine, &NativeVariant::object(node, "Node"));

    {
        let wrapper = v.as_object().unwrap().unwrap();
        assert_eq!(wrapper.ownership(), Ownership::Borrowed);
    }
    assert!(heap.is_alive(node));
    assert_eq!(heap.stats().exclusive_releases, 0);

    // A fresh wrapper still sees a live object
    let again = v.as_object().unwrap().unwrap();
    assert_eq!(again.to_string(), format!("<Node#{}>", node.as_raw()));
    again.dispose();
    assert!(heap.is_alive(node));

    // Same through the cached projection once the last clone goes
    let cached = v.clone();
    assert!(matches!(cached.obj().unwrap(), crate::variant::ManagedValue::Object(Some(_))));
    drop((v, cached));
    assert!(heap.is_alive(node));
    assert_eq!(heap.stats().objects_freed, 0);
}

#[test]
fn test_object_delegate_argument_leaves_node_alive() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestSpawner")
        .base("Node")
        .signal("Spawned", &[VariantType::Object])
        .register()
        .unwrap();
    let spawner = EngineObject::new(engine, "ObjTestSpawner").unwrap();
    let handle = spawner.handle().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    spawner
        .connect(
            "Spawned",
            Delegate::new1(move |child: Option<Arc<EngineObject>>| {
                if let Some(child) = child {
                    sink.lock().unwrap().push((child.handle().unwrap(), child.ownership()));
                }
            }),
        )
        .unwrap();

    let child = heap.create_object("Node").unwrap();
    let arg = NativeVariant::object(child, "Node");
    heap.emit_signal(handle, "Spawned", vec![arg.clone()]).unwrap();
    heap.emit_signal(handle, "Spawned", vec![arg]).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(child, Ownership::Borrowed); 2]);
    assert!(heap.is_alive(child));
}

#[test]
fn test_dispose_disconnects_native_signals() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestToggle").base("Node").signal("Pressed", &[]).register().unwrap();
    let button = EngineObject::new(engine.clone(), "ObjTestToggle").unwrap();
    let handle = button.handle().unwrap();
    assert_eq!(heap.connected_signals(handle).len(), 1);

    // A borrowed wrapper detaches its routes but leaves the object alive
    let existing = heap.create_object("Node").unwrap();
    let borrowed = EngineObject::from_handle(engine, "ObjTestToggle", existing).unwrap();
    assert_eq!(heap.connected_signals(existing).len(), 1);
    drop(borrowed);
    assert!(heap.connected_signals(existing).is_empty());
    assert!(heap.is_alive(existing));

    button.dispose();
    assert!(!heap.is_alive(handle));
}

#[test]
fn test_construction_failures() {
    let (_heap, engine) = engine();

    let err = EngineObject::new(engine.clone(), "ObjTestUnregistered").unwrap_err();
    assert!(matches!(err, BridgeError::UnknownClass { .. }));

    // Known to the class table, but the engine has no constructor for it
    class_db().register_native("ObjTestGhostNative", Some("Object"), false).unwrap();
    ClassBuilder::new("ObjTestGhost").base("ObjTestGhostNative").register().unwrap();
    let err = EngineObject::new(engine, "ObjTestGhost").unwrap_err();
    match err {
        BridgeError::NativeBindingNotFound { binding } => assert!(binding.contains("ObjTestGhost")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_class_table_resolution() {
    ClassBuilder::new("ObjTestBase").base("Node").signal("Ready", &[]).register().unwrap();
    ClassBuilder::new("ObjTestDerived")
        .base("ObjTestBase")
        .signal("Hit", &[VariantType::Int, VariantType::String])
        .register()
        .unwrap();

    let db = class_db();
    assert_eq!(db.native_base("ObjTestDerived").unwrap().name(), "Node");
    let names: Vec<_> = db
        .ancestry("ObjTestDerived")
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["ObjTestDerived", "ObjTestBase"]);
    assert_eq!(db.get("ObjTestDerived").unwrap().signal("Hit").unwrap().arity(), 2);
    assert!(!db.get("ObjTestDerived").unwrap().is_ref_counted());

    let err = ClassBuilder::new("ObjTestOrphan").base("ObjTestMissing").register().unwrap_err();
    assert!(matches!(err, BridgeError::UnknownClass { .. }));

    let err = ClassBuilder::new("ObjTestBase").base("ObjTestDerived").register().unwrap_err();
    assert!(matches!(err, BridgeError::UnknownClass { .. }));
}

#[test]
fn test_signals_connected_at_construction() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestEmitterBase").base("Node").signal("Ready", &[]).register().unwrap();
    ClassBuilder::new("ObjTestEmitter")
        .base("ObjTestEmitterBase")
        .signal("ValueChanged", &[VariantType::Int])
        .register()
        .unwrap();

    let emitter = EngineObject::new(engine, "ObjTestEmitter").unwrap();
    let handle = emitter.handle().unwrap();
    let names: Vec<_> = emitter.signal_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(names, vec!["ValueChanged", "Ready"]);
    assert_eq!(heap.connected_signals(handle).len(), 2);
}

#[test]
fn test_dispatch_to_delegates() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestSlider")
        .base("Node")
        .signal("Ready", &[])
        .signal("ValueChanged", &[VariantType::Int])
        .register()
        .unwrap();

    let slider = EngineObject::new(engine, "ObjTestSlider").unwrap();
    let ready = Arc::new(AtomicUsize::new(0));
    let value = Arc::new(AtomicI64::new(0));

    let counter = ready.clone();
    slider
        .connect("Ready", Delegate::new0(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    let sink = value.clone();
    slider
        .connect("ValueChanged", Delegate::new1(move |v: i64| sink.store(v, Ordering::SeqCst)))
        .unwrap();

    slider.raise_event_signal("Ready", &[]).unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);

    slider.raise_event_signal("ValueChanged", &[Variant::from(42i64)]).unwrap();
    assert_eq!(value.load(Ordering::SeqCst), 42);

    let err = slider.raise_event_signal("ValueChanged", &[]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::SignalArgumentCountMismatch {
            signal: "ValueChanged".to_string(),
            expected: 1,
            received: 0,
        }
    );

    // Undeclared signals are silent
    slider.raise_event_signal("Unknown", &[Variant::from(1i64)]).unwrap();
}

#[test]
fn test_signal_without_delegates_is_noop() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestQuiet").signal("Changed", &[VariantType::Int]).register().unwrap();
    let quiet = EngineObject::new(engine, "ObjTestQuiet").unwrap();

    // Even a wrong argument count is ignored when nobody listens
    quiet.raise_event_signal("Changed", &[]).unwrap();
}

#[test]
fn test_connect_validates_signal_and_arity() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestButton").signal("Pressed", &[]).register().unwrap();
    let button = EngineObject::new(engine, "ObjTestButton").unwrap();

    let err = button.connect("Pressed", Delegate::new1(|_: bool| {})).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::SignalArgumentCountMismatch { expected: 0, received: 1, .. }
    ));

    let err = button.connect("Released", Delegate::new0(|| {})).unwrap_err();
    assert!(matches!(err, BridgeError::UnknownSignal { .. }));

    button.dispose();
    let err = button.connect("Pressed", Delegate::new0(|| {})).unwrap_err();
    assert!(matches!(err, BridgeError::UseAfterDispose { .. }));
}

#[test]
fn test_disconnect() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestToggle").signal("Toggled", &[VariantType::Bool]).register().unwrap();
    let toggle = EngineObject::new(engine, "ObjTestToggle").unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let id = toggle
        .connect("Toggled", Delegate::new1(move |_: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    assert_eq!(toggle.delegate_count("Toggled"), 1);

    assert!(toggle.disconnect("Toggled", id));
    assert!(!toggle.disconnect("Toggled", id));
    toggle.raise_event_signal("Toggled", &[Variant::from(true)]).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_delegate_conversion_failure_surfaces() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestLabel").signal("TextChanged", &[VariantType::String]).register().unwrap();
    let label = EngineObject::new(engine, "ObjTestLabel").unwrap();
    label
        .connect("TextChanged", Delegate::new1(|_: Vector3Like| {}))
        .unwrap();

    let err = label.raise_event_signal("TextChanged", &[Variant::from("hello")]).unwrap_err();
    assert!(matches!(err, BridgeError::TypeConversionFailure { .. }));
}

/// Parameter type that only accepts Vector3 payloads
struct Vector3Like;

impl crate::variant::FromVariant for Vector3Like {
    fn from_variant(variant: &Variant) -> Result<Self> {
        variant.as_vector3().map(|_| Vector3Like)
    }
}

#[test]
fn test_class_change_after_construction_is_detected() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestReloaded").base("Node").register().unwrap();
    let obj = EngineObject::new(engine, "ObjTestReloaded").unwrap();

    ClassBuilder::new("ObjTestReloaded")
        .base("Node")
        .signal("Reloaded", &[])
        .register()
        .unwrap();

    let err = obj.raise_event_signal("Reloaded", &[]).unwrap_err();
    assert!(err.is_internal());
    assert_eq!(
        err,
        BridgeError::MissingInvocationSurface {
            class: "ObjTestReloaded".to_string(),
            signal: "Reloaded".to_string(),
        }
    );
}

#[test]
fn test_native_emission_reaches_delegates() {
    let (heap, engine) = engine();
    ClassBuilder::new("ObjTestHealth")
        .base("RefCounted")
        .signal("Damaged", &[VariantType::Int, VariantType::String])
        .register()
        .unwrap();
    let health = EngineObject::new(engine, "ObjTestHealth").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    health
        .connect("Damaged", Delegate::new2(move |amount: i32, source: String| {
            sink.lock().unwrap().push((amount, source));
        }))
        .unwrap();

    let handle = health.handle().unwrap();
    heap.emit_signal(
        handle,
        "Damaged",
        vec![NativeVariant::Int(7), NativeVariant::String("spikes".to_string())],
    )
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(7, "spikes".to_string())]);
    // The bridge's string copy plus both engine-owned arguments
    let stats = heap.stats();
    assert_eq!(stats.variants_copied, 1);
    assert_eq!(stats.variants_destroyed, 3);
}

#[test]
fn test_call_get_set() {
    let (heap, engine) = engine();
    heap.register_method("Node", "get_name", |engine, handle, _| {
        NativeVariant::String(engine.object_to_string(handle))
    });
    ClassBuilder::new("ObjTestActor").base("Node").register().unwrap();
    let actor = EngineObject::new(engine, "ObjTestActor").unwrap();

    let class = actor.call("get_class", &[]).unwrap();
    assert_eq!(class.as_string().unwrap(), "Node");
    let name = actor.call("get_name", &[Variant::from(1i64)]).unwrap();
    assert!(name.as_string().unwrap().starts_with("<Node#"));

    let err = actor.call("fly", &[]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::NativeBindingNotFound {
            binding: "Node.fly".to_string()
        }
    );

    actor.set("speed", &Variant::from(3.5f64)).unwrap();
    assert_eq!(actor.get("speed").unwrap().as_float64().unwrap(), 3.5);
    assert!(actor.get("missing").unwrap().is_nil());

    actor.dispose();
    assert!(matches!(actor.call("get_class", &[]), Err(BridgeError::UseAfterDispose { .. })));
    assert!(actor.get("speed").is_err());
}

#[test]
fn test_display() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestShown").base("Node").register().unwrap();
    let shown = EngineObject::new(engine, "ObjTestShown").unwrap();
    let handle = shown.handle().unwrap();

    assert_eq!(shown.to_string(), format!("<Node#{}>", handle.as_raw()));
    shown.dispose();
    assert_eq!(shown.to_string(), "<Freed ObjTestShown>");
    assert!(shown.to_native_string().is_err());
}

#[test]
fn test_object_variants_resolve_to_wrapper() {
    let (heap, engine) = engine();
    let obj = EngineObject::new(engine, "RefCounted").unwrap();
    let handle = obj.handle().unwrap();

    let v = Variant::from_object(Some(&*obj)).unwrap();
    assert_eq!(heap.refcount(handle), Some(2));

    let resolved = v.as_object().unwrap().unwrap();
    assert!(Arc::ptr_eq(&resolved, &obj));
    assert!(matches!(v.obj().unwrap(), crate::variant::ManagedValue::Object(Some(_))));

    let null = Variant::from_object(None).unwrap();
    assert!(null.as_object().unwrap().is_none());

    obj.dispose();
    assert!(Variant::from_object(Some(&*obj)).is_err());
}

#[test]
fn test_objects_are_tracked_while_alive() {
    let (_heap, engine) = engine();
    ClassBuilder::new("ObjTestTracked").register().unwrap();
    let obj = EngineObject::new(engine, "ObjTestTracked").unwrap();

    let described = |records: Vec<crate::tracker::LeakRecord>| {
        records.iter().any(|r| r.description.starts_with("ObjTestTracked("))
    };
    assert!(described(crate::tracker::tracker().snapshot()));

    obj.dispose();
    assert!(!described(crate::tracker::tracker().snapshot()));
}

/// Engine whose finalizer-driven release panics
struct FaultyEngine(HeapEngine);

impl NativeEngine for FaultyEngine {
    fn instantiate(&self, class: &str) -> Option<NativeHandle> {
        self.0.instantiate(class)
    }
    fn tie_managed(&self, handle: NativeHandle, class: &str, ref_counted: bool) {
        self.0.tie_managed(handle, class, ref_counted)
    }
    fn tie_managed_with_pre_setup(&self, handle: NativeHandle, class: &str, ref_counted: bool) {
        self.0.tie_managed_with_pre_setup(handle, class, ref_counted)
    }
    fn object_disposed(&self, handle: NativeHandle) {
        self.0.object_disposed(handle)
    }
    fn refcounted_disposed(&self, _handle: NativeHandle, is_finalizer: bool) {
        if is_finalizer {
            panic!("engine already shut down");
        }
    }
    fn object_to_string(&self, handle: NativeHandle) -> String {
        self.0.object_to_string(handle)
    }
    fn connect_event_signal(&self, handle: NativeHandle, signal: &StringName) {
        self.0.connect_event_signal(handle, signal)
    }
    fn disconnect_event_signals(&self, handle: NativeHandle) {
        self.0.disconnect_event_signals(handle)
    }
    fn method_bind(&self, class: &str, method: &str) -> Option<crate::native::MethodBind> {
        self.0.method_bind(class, method)
    }
    fn call(&self, handle: NativeHandle, method: crate::native::MethodBind, args: &[&NativeVariant]) -> NativeVariant {
        self.0.call(handle, method, args)
    }
    fn get_property(&self, handle: NativeHandle, name: &str) -> Option<NativeVariant> {
        self.0.get_property(handle, name)
    }
    fn set_property(&self, handle: NativeHandle, name: &str, value: &NativeVariant) -> bool {
        self.0.set_property(handle, name, value)
    }
    fn variant_new_copy(&self, value: &NativeVariant) -> NativeVariant {
        self.0.variant_new_copy(value)
    }
    fn variant_destroy(&self, value: NativeVariant) {
        self.0.variant_destroy(value)
    }
}

#[test]
fn test_finalizer_faults_never_propagate() {
    let engine: Arc<dyn NativeEngine> = Arc::new(FaultyEngine(HeapEngine::new()));
    let obj = EngineObject::new(engine, "RefCounted").unwrap();
    let handle = obj.handle().unwrap();

    let token = obj.token.id();
    assert!(crate::tracker::tracker().contains(token));

    drop(obj);
    assert!(bindings::lookup(handle).is_none());
    assert!(!crate::tracker::tracker().contains(token));
}
