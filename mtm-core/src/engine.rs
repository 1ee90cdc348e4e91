//! Signal override engine
//!
//! The dispatch core: given a signal and an action, determines the category,
//! reads or forces the underlying state through the property bus, and records
//! what must be reverted. A single global revert timer covers the whole
//! outstanding override set; when it expires every override is restored to
//! its recorded previous value.
//!
//! Bookkeeping rules:
//! - a failed bus write never mutates internal state (no partial lock/record)
//! - forcing (re)arms the timer; draining the last outstanding override
//!   disarms it
//! - reverting a signal with no outstanding override is a no-op success

use std::time::Instant;

use tracing::{debug, info, warn};

use mtm_error::Result;
use mtm_protocol::{
    validate_get_instance, validate_set_instance, CompletionCode, GetAction, GetSignal,
    GetSignalRequest, GetSignalResponse, SetAction, SetSignal, SetSignalRequest,
    MAX_RAW_REQUEST_LEN,
};

use crate::access::{AccessGate, AccessLevel};
use crate::catalog::{self, SignalCatalog, SignalCategory};
use crate::config::EngineConfig;
use crate::constants::{bus, fan_status, led_code};
use crate::properties::{type_error, PlatformBus, Value};
use crate::registry::LedOverrideRegistry;
use crate::timer::RevertTimer;

/// Translate an LED action state string to the numeric sample code.
fn led_state_code(state: &str) -> Option<u8> {
    if state.ends_with("Blink") {
        Some(led_code::BLINK)
    } else if state.ends_with("On") {
        Some(led_code::ON)
    } else if state.ends_with("Off") {
        Some(led_code::OFF)
    } else {
        None
    }
}

/// LED action state string for a forcing action.
fn led_force_state(action: SetAction) -> String {
    let suffix = match action {
        SetAction::ForceAsserted => "On",
        _ => "Off",
    };
    format!("{}{}", bus::LED_STATE_PREFIX, suffix)
}

pub struct OverrideEngine<B: PlatformBus> {
    pbus: B,
    gate: AccessGate,
    catalog: SignalCatalog,
    registry: LedOverrideRegistry,
    /// Masked get-signals pending restore, in force order
    outstanding: Vec<GetSignal>,
    revert_fan_pwm: bool,
    revert_led_callback: bool,
    timer: RevertTimer,
}

impl<B: PlatformBus> OverrideEngine<B> {
    pub fn new(pbus: B, config: &EngineConfig) -> Self {
        Self {
            pbus,
            gate: AccessGate::new(),
            catalog: SignalCatalog::new(config),
            registry: LedOverrideRegistry::new(),
            outstanding: Vec::new(),
            revert_fan_pwm: false,
            revert_led_callback: false,
            timer: RevertTimer::new(config.revert_timeout()),
        }
    }

    // ------------------------------------------------------------------
    // Produced interface
    // ------------------------------------------------------------------

    /// Authorize a raw upstream request against the access gate.
    pub fn detect_access_level(&mut self, raw: &[u8]) -> CompletionCode {
        if raw.len() > MAX_RAW_REQUEST_LEN {
            return CompletionCode::InvalidField;
        }
        if self.gate.level(&mut self.pbus) != AccessLevel::Available {
            return CompletionCode::InsufficientPrivilege;
        }
        CompletionCode::Success
    }

    /// Read-path dispatch.
    pub fn process_get(&mut self, req: GetSignalRequest) -> (GetSignalResponse, CompletionCode) {
        if validate_get_instance(req.signal, req.instance).is_err() {
            return (GetSignalResponse::default(), CompletionCode::InvalidField);
        }
        debug!(signal = ?req.signal, action = ?req.action, instance = req.instance, "get dispatch");
        match catalog::category_of_get(req.signal) {
            SignalCategory::Gpio => self.get_gpio(req.signal, req.action),
            SignalCategory::FanPwm => self.get_fan_pwm(req.instance, req.action),
            SignalCategory::FanTach => self.get_fan_tach(req.instance, req.action),
            SignalCategory::Led => self.get_led(req.signal, req.action),
            SignalCategory::Reserved => {
                (GetSignalResponse::default(), CompletionCode::InvalidField)
            }
        }
    }

    /// Write-path dispatch.
    pub fn process_set(&mut self, req: SetSignalRequest) -> CompletionCode {
        if validate_set_instance(req.signal, req.instance).is_err() {
            return CompletionCode::InvalidField;
        }
        debug!(signal = ?req.signal, action = ?req.action, instance = req.instance, value = req.value, "set dispatch");
        match catalog::category_of_set(req.signal) {
            SignalCategory::Led => self.set_led(req.signal, req.action),
            SignalCategory::FanPwm => self.set_fan(req.instance, req.action, req.value),
            SignalCategory::Gpio => self.set_gpio(req.signal, req.action),
            _ => CompletionCode::InvalidField,
        }
    }

    /// Restore every outstanding override and clear the bookkeeping.
    ///
    /// Invoked by the host loop on timer expiry. Restore failures are logged
    /// and do not stop the remaining restorations; the bookkeeping is always
    /// cleared so a wedged backing service cannot pin a test state forever.
    pub fn revert_all(&mut self) {
        info!("Reverting all outstanding overrides");

        let locked: Vec<SetSignal> = self
            .registry
            .iter()
            .filter(|led| led.locked())
            .map(|led| led.signal())
            .collect();
        for signal in locked {
            let (name, prev) = {
                let led = self.registry.find(signal).expect("locked entry vanished");
                (led.name(), led.prev_state().to_string())
            };
            if let Err(e) = self.write_led_state(name, &prev) {
                warn!(led = name, "Failed to restore LED state: {}", e);
            }
            let led = self.registry.find_mut(signal).expect("locked entry vanished");
            led.set_current_state(prev);
            led.set_prev_state(String::new());
            led.set_lock(false);
        }

        if self.revert_fan_pwm {
            if let Err(e) = self.pbus.set_fan_control_enabled(true) {
                warn!("Failed to resume automatic fan control: {}", e);
            }
            self.revert_fan_pwm = false;
        }

        self.revert_led_callback = false;

        let masked = std::mem::take(&mut self.outstanding);
        for signal in masked {
            if let Err(e) = self.write_gpio_ignore(signal, false) {
                warn!(signal = ?signal, "Failed to unmask input: {}", e);
            }
        }

        self.timer.disarm();
    }

    /// Fire the batch restore if the deadline has passed. Returns true when
    /// a restore ran.
    pub fn poll_revert(&mut self, now: Instant) -> bool {
        if self.timer.take_expired(now) {
            self.revert_all();
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // State queries (host loop, LED listener, tests)
    // ------------------------------------------------------------------

    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// The external LED-state-change listener checks this before propagating
    /// a sensor-driven change.
    pub fn led_callback_suppressed(&self) -> bool {
        self.revert_led_callback
    }

    pub fn fan_override_outstanding(&self) -> bool {
        self.revert_fan_pwm
    }

    pub fn outstanding_signals(&self) -> &[GetSignal] {
        &self.outstanding
    }

    pub fn registry(&self) -> &LedOverrideRegistry {
        &self.registry
    }

    pub fn platform_bus(&self) -> &B {
        &self.pbus
    }

    pub fn platform_bus_mut(&mut self) -> &mut B {
        &mut self.pbus
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    fn get_gpio(&mut self, signal: GetSignal, action: GetAction) -> (GetSignalResponse, CompletionCode) {
        let Some(path) = self.catalog.gpio_get_path(signal) else {
            return (GetSignalResponse::default(), CompletionCode::InvalidField);
        };
        let path = path.to_string();
        match action {
            GetAction::Sample => {
                match self.pbus.get_property(
                    bus::GPIO_SERVICE,
                    &path,
                    bus::GPIO_INTERFACE,
                    bus::GPIO_SAMPLED_PROPERTY,
                ) {
                    Ok(value) => match value.as_u8() {
                        Some(raw) => (GetSignalResponse::single(raw), CompletionCode::Success),
                        None => {
                            warn!(path = %path, "GPIO sample has a non-numeric value");
                            (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
                        }
                    },
                    Err(e) => {
                        warn!(path = %path, "GPIO sample failed: {}", e);
                        (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
                    }
                }
            }
            GetAction::Ignore => {
                // Masking an input is a forcing operation
                if !self.authorized() {
                    return (GetSignalResponse::default(), CompletionCode::InsufficientPrivilege);
                }
                if let Err(e) = self.write_gpio_ignore(signal, true) {
                    warn!(path = %path, "Failed to mask input: {}", e);
                    return (GetSignalResponse::default(), CompletionCode::UnspecifiedError);
                }
                if !self.outstanding.contains(&signal) {
                    self.outstanding.push(signal);
                }
                self.timer.arm();
                info!(signal = ?signal, "Masked input for test mode");
                (GetSignalResponse::default(), CompletionCode::Success)
            }
            GetAction::Revert => {
                if !self.outstanding.contains(&signal) {
                    return (GetSignalResponse::default(), CompletionCode::Success);
                }
                if let Err(e) = self.write_gpio_ignore(signal, false) {
                    warn!(path = %path, "Failed to unmask input: {}", e);
                    return (GetSignalResponse::default(), CompletionCode::UnspecifiedError);
                }
                self.outstanding.retain(|s| *s != signal);
                info!(signal = ?signal, "Unmasked input");
                self.settle();
                (GetSignalResponse::default(), CompletionCode::Success)
            }
        }
    }

    fn get_fan_pwm(&mut self, channel: u8, action: GetAction) -> (GetSignalResponse, CompletionCode) {
        // Fan forcing is tracked through the write path only; the non-sample
        // actions are benign here.
        if action != GetAction::Sample {
            return (GetSignalResponse::default(), CompletionCode::Success);
        }
        let path = catalog::fan_pwm_path(channel);
        match self.pbus.get_property(
            bus::FAN_SERVICE,
            &path,
            bus::SENSOR_VALUE_INTERFACE,
            bus::SENSOR_VALUE_PROPERTY,
        ) {
            Ok(value) => match value.as_u8() {
                Some(duty) => (GetSignalResponse::single(duty), CompletionCode::Success),
                None => {
                    warn!(path = %path, "PWM duty has a non-numeric value");
                    (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
                }
            },
            Err(e) => {
                warn!(path = %path, "PWM sample failed: {}", e);
                (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
            }
        }
    }

    fn get_fan_tach(&mut self, channel: u8, action: GetAction) -> (GetSignalResponse, CompletionCode) {
        if action != GetAction::Sample {
            return (GetSignalResponse::default(), CompletionCode::Success);
        }
        let path = catalog::fan_tach_path(channel);
        match self.pbus.get_property(
            bus::FAN_SERVICE,
            &path,
            bus::SENSOR_VALUE_INTERFACE,
            bus::SENSOR_VALUE_PROPERTY,
        ) {
            Ok(value) => match value.as_u16() {
                Some(reading) => {
                    let rsp = GetSignalResponse {
                        sig_val: fan_status::FAN_PRESENT | fan_status::FAN_SENSOR_PRESENT,
                        sig_val1: (reading & 0xff) as u8,
                        sig_val2: (reading >> 8) as u8,
                    };
                    (rsp, CompletionCode::Success)
                }
                None => {
                    warn!(path = %path, "Tachometer reading has a non-numeric value");
                    (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
                }
            },
            Err(e) => {
                warn!(path = %path, "Tachometer sample failed: {}", e);
                (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
            }
        }
    }

    fn get_led(&mut self, signal: GetSignal, action: GetAction) -> (GetSignalResponse, CompletionCode) {
        let Some(set_signal) = catalog::led_set_signal(signal) else {
            return (GetSignalResponse::default(), CompletionCode::InvalidField);
        };
        match action {
            GetAction::Sample => {
                let (name, recorded) = {
                    let Some(led) = self.registry.find(set_signal) else {
                        return (GetSignalResponse::default(), CompletionCode::InvalidField);
                    };
                    (led.name(), led.current_state().to_string())
                };
                // A never-forced entry has no recorded state; sample live
                let state = if recorded.is_empty() {
                    match self.read_led_state(name) {
                        Ok(state) => state,
                        Err(e) => {
                            warn!(led = name, "LED sample failed: {}", e);
                            return (GetSignalResponse::default(), CompletionCode::UnspecifiedError);
                        }
                    }
                } else {
                    recorded
                };
                match led_state_code(&state) {
                    Some(code) => (GetSignalResponse::single(code), CompletionCode::Success),
                    None => {
                        warn!(led = name, state = %state, "Unrecognized LED state");
                        (GetSignalResponse::default(), CompletionCode::UnspecifiedError)
                    }
                }
            }
            // Masking has no meaning for an LED
            GetAction::Ignore => (GetSignalResponse::default(), CompletionCode::Success),
            GetAction::Revert => {
                let cc = self.revert_led(set_signal);
                (GetSignalResponse::default(), cc)
            }
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    fn set_led(&mut self, signal: SetSignal, action: SetAction) -> CompletionCode {
        match action {
            SetAction::ForceAsserted | SetAction::ForceDeasserted => {
                let Some(name) = self.registry.name(signal) else {
                    return CompletionCode::InvalidField;
                };
                if !self.authorized() {
                    return CompletionCode::InsufficientPrivilege;
                }
                let target = led_force_state(action);
                let locked = self
                    .registry
                    .find(signal)
                    .map(|led| led.locked())
                    .unwrap_or(false);
                // First force captures the live state exactly once; later
                // forces must not overwrite the true original value.
                let captured_prev = if locked {
                    None
                } else {
                    match self.read_led_state(name) {
                        Ok(state) => Some(state),
                        Err(e) => {
                            warn!(led = name, "Cannot capture pre-force LED state: {}", e);
                            return CompletionCode::UnspecifiedError;
                        }
                    }
                };
                if let Err(e) = self.write_led_state(name, &target) {
                    warn!(led = name, "LED force failed: {}", e);
                    return CompletionCode::UnspecifiedError;
                }
                let led = self.registry.find_mut(signal).expect("LED entry vanished");
                if let Some(prev) = captured_prev {
                    led.set_prev_state(prev);
                }
                led.set_current_state(target);
                led.set_lock(true);
                self.revert_led_callback = true;
                self.timer.arm();
                info!(led = name, action = ?action, "Forced LED override");
                CompletionCode::Success
            }
            SetAction::Revert => self.revert_led(signal),
        }
    }

    /// Immediate single-LED restoration; shared by the explicit revert paths.
    fn revert_led(&mut self, signal: SetSignal) -> CompletionCode {
        let Some(led) = self.registry.find(signal) else {
            return CompletionCode::InvalidField;
        };
        if !led.locked() {
            // Nothing outstanding for this LED
            return CompletionCode::Success;
        }
        let name = led.name();
        let prev = led.prev_state().to_string();
        if let Err(e) = self.write_led_state(name, &prev) {
            warn!(led = name, "LED revert failed: {}", e);
            return CompletionCode::UnspecifiedError;
        }
        let led = self.registry.find_mut(signal).expect("LED entry vanished");
        led.set_current_state(prev);
        led.set_prev_state(String::new());
        led.set_lock(false);
        info!(led = name, "Reverted LED override");
        self.settle();
        CompletionCode::Success
    }

    fn set_fan(&mut self, channel: u8, action: SetAction, value: u8) -> CompletionCode {
        match action {
            SetAction::ForceAsserted | SetAction::ForceDeasserted => {
                if !self.authorized() {
                    return CompletionCode::InsufficientPrivilege;
                }
                let suspended_here = !self.revert_fan_pwm;
                if suspended_here {
                    if let Err(e) = self.pbus.set_fan_control_enabled(false) {
                        warn!("Cannot suspend automatic fan control: {}", e);
                        return CompletionCode::UnspecifiedError;
                    }
                }
                let path = catalog::fan_pwm_path(channel);
                if let Err(e) = self.pbus.set_property(
                    bus::FAN_SERVICE,
                    &path,
                    bus::SENSOR_VALUE_INTERFACE,
                    bus::SENSOR_VALUE_PROPERTY,
                    Value::Double(f64::from(value)),
                ) {
                    warn!(path = %path, "PWM force failed: {}", e);
                    if suspended_here {
                        // Undo the suspension so a failed force leaves no trace
                        if let Err(e) = self.pbus.set_fan_control_enabled(true) {
                            warn!("Cannot resume automatic fan control: {}", e);
                        }
                    }
                    return CompletionCode::UnspecifiedError;
                }
                self.revert_fan_pwm = true;
                self.timer.arm();
                info!(channel, duty = value, "Forced fan PWM override");
                CompletionCode::Success
            }
            SetAction::Revert => {
                if !self.revert_fan_pwm {
                    return CompletionCode::Success;
                }
                if let Err(e) = self.pbus.set_fan_control_enabled(true) {
                    warn!("Cannot resume automatic fan control: {}", e);
                    return CompletionCode::UnspecifiedError;
                }
                self.revert_fan_pwm = false;
                info!("Reverted fan PWM override");
                self.settle();
                CompletionCode::Success
            }
        }
    }

    fn set_gpio(&mut self, signal: SetSignal, action: SetAction) -> CompletionCode {
        let Some(path) = self.catalog.gpio_set_path(signal) else {
            return CompletionCode::InvalidField;
        };
        let path = path.to_string();
        match action {
            SetAction::ForceAsserted | SetAction::ForceDeasserted => {
                if !self.authorized() {
                    return CompletionCode::InsufficientPrivilege;
                }
                let level = u8::from(action == SetAction::ForceAsserted);
                if let Err(e) = self.pbus.set_property(
                    bus::GPIO_SERVICE,
                    &path,
                    bus::GPIO_INTERFACE,
                    bus::GPIO_VALUE_PROPERTY,
                    Value::Byte(level),
                ) {
                    warn!(path = %path, "GPIO force failed: {}", e);
                    return CompletionCode::UnspecifiedError;
                }
                info!(signal = ?signal, level, "Drove GPIO line");
                CompletionCode::Success
            }
            // Driven lines are not tracked for revert
            SetAction::Revert => CompletionCode::Success,
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn authorized(&mut self) -> bool {
        self.gate.level(&mut self.pbus) == AccessLevel::Available
    }

    fn read_led_state(&mut self, name: &str) -> Result<String> {
        let path = catalog::led_path(name);
        let value = self.pbus.get_property(
            &catalog::led_service(name),
            &path,
            bus::LED_INTERFACE,
            bus::LED_STATE_PROPERTY,
        )?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_error(&path, bus::LED_STATE_PROPERTY, "expected a state string"))
    }

    fn write_led_state(&mut self, name: &str, state: &str) -> Result<()> {
        self.pbus.set_property(
            &catalog::led_service(name),
            &catalog::led_path(name),
            bus::LED_INTERFACE,
            bus::LED_STATE_PROPERTY,
            Value::Str(state.to_string()),
        )
    }

    fn write_gpio_ignore(&mut self, signal: GetSignal, masked: bool) -> Result<()> {
        let path = self
            .catalog
            .gpio_get_path(signal)
            .map(str::to_string)
            .unwrap_or_default();
        self.pbus.set_property(
            bus::GPIO_SERVICE,
            &path,
            bus::GPIO_INTERFACE,
            bus::GPIO_IGNORE_PROPERTY,
            Value::Bool(masked),
        )
    }

    fn has_outstanding(&self) -> bool {
        !self.outstanding.is_empty()
            || self.registry.any_locked()
            || self.revert_fan_pwm
            || self.revert_led_callback
    }

    /// Drop derived flags and disarm once nothing remains outstanding.
    fn settle(&mut self) {
        if !self.registry.any_locked() {
            self.revert_led_callback = false;
        }
        if !self.has_outstanding() {
            self.timer.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_state_codes() {
        assert_eq!(
            led_state_code("xyz.openbmc_project.Led.Physical.Action.Off"),
            Some(led_code::OFF)
        );
        assert_eq!(
            led_state_code("xyz.openbmc_project.Led.Physical.Action.On"),
            Some(led_code::ON)
        );
        assert_eq!(
            led_state_code("xyz.openbmc_project.Led.Physical.Action.Blink"),
            Some(led_code::BLINK)
        );
        assert_eq!(led_state_code(""), None);
        assert_eq!(led_state_code("garbage"), None);
    }

    #[test]
    fn force_state_strings() {
        assert!(led_force_state(SetAction::ForceAsserted).ends_with(".On"));
        assert!(led_force_state(SetAction::ForceDeasserted).ends_with(".Off"));
    }
}
