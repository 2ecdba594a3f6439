//! Engine Bridge - managed/native object and value bridge
//!
//! Ties managed wrappers to natively reference-counted engine objects and
//! moves values across the boundary as tagged variants, releasing every
//! native resource exactly once.
//!
//! Layers, leaves first:
//! - `tracker`: weak registry of live native-resource owners
//! - `variant`: tagged values with explicit copy/ownership construction
//! - `object`: handle lifecycle, class table and the signal bridge
//! - `native`: the engine seam and the in-process `HeapEngine`

pub mod config;
pub mod error;
pub mod logging;
pub mod native;
pub mod object;
pub mod tracker;
pub mod variant;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use native::{HeapEngine, NativeEngine, NativeHandle};
pub use object::{ClassBuilder, Delegate, DelegateId, EngineObject, Ownership};
pub use variant::{FromVariant, ManagedValue, NativeVariant, StringName, Variant, VariantType};

/// Set up logging and the disposables tracker. Idempotent.
pub fn init(config: &BridgeConfig) {
    logging::init_with_config(&config.logging.to_log_config());
    tracker::init(&config.tracker);
    object::class_db();
    logging::log_bridge_init();
}

/// Report and sweep resources still alive. Returns how many were live.
pub fn cleanup(config: &BridgeConfig) -> usize {
    let leaked = tracker::cleanup(&config.tracker);
    logging::log_bridge_shutdown(leaked);
    logging::shutdown();
    leaked
}

/// Bridge initialization with environment configuration
#[no_mangle]
pub extern "C" fn engine_bridge_init() {
    init(&BridgeConfig::from_env());
}

/// Bridge cleanup; returns the number of leaked resources
#[no_mangle]
pub extern "C" fn engine_bridge_cleanup() -> usize {
    cleanup(&BridgeConfig::from_env())
}
