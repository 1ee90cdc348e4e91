//! mtmd Core Library
//!
//! The manufacturing-test signal override engine: an authorized operator can
//! force platform control signals (LEDs, fan PWM, GPIO-backed buttons and
//! indicators) into a test state; the engine remembers the prior state and a
//! single global revert timer restores everything after a bounded idle
//! period.
//!
//! # Module Structure
//!
//! - `catalog` - signal categories and per-signal bus addressing
//! - `access` - cached manufacturing-test privilege gate
//! - `registry` - per-LED override bookkeeping
//! - `engine` - the get/set dispatch core and batch restore
//! - `timer` - the global revert deadline
//! - `properties` - the property-bus trait seam
//! - `config` - engine configuration loaded at daemon startup

pub mod access;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod engine;
pub mod properties;
pub mod registry;
pub mod timer;

// Re-export primary types
pub use access::{AccessGate, AccessLevel};
pub use catalog::{
    category_of_get, category_of_set, fan_pwm_path, fan_tach_path, led_name, led_path,
    led_service, led_set_signal, SignalCatalog, SignalCategory,
};
pub use config::{EngineConfig, DEFAULT_CONFIG_PATH};
pub use engine::OverrideEngine;
pub use properties::{PlatformBus, Value};
pub use registry::{LedOverride, LedOverrideRegistry};
pub use timer::RevertTimer;

// Re-export the protocol vocabulary the engine speaks
pub use mtm_protocol::{
    CompletionCode, GetAction, GetSignal, GetSignalRequest, GetSignalResponse, SetAction,
    SetSignal, SetSignalRequest,
};

// Re-export the unified error type
pub use mtm_error::{MtmError, Result};
