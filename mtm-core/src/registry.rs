//! LED override registry
//!
//! One entry per controllable LED, created at construction and never grown
//! or shrunk afterward; only the fields mutate. The lock flag is advisory:
//! the external LED-state-change listener checks it before propagating a
//! sensor-driven state change, and skips propagation while an override is
//! active. The registry itself does not enforce that contract.

use mtm_protocol::SetSignal;

use crate::catalog::SignalCatalog;

#[derive(Debug)]
pub struct LedOverride {
    signal: SetSignal,
    name: &'static str,
    prev_state: String,
    current_state: String,
    locked: bool,
}

impl LedOverride {
    fn new(signal: SetSignal, name: &'static str) -> Self {
        Self {
            signal,
            name,
            prev_state: String::new(),
            current_state: String::new(),
            locked: false,
        }
    }

    pub fn signal(&self) -> SetSignal {
        self.signal
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prev_state(&self) -> &str {
        &self.prev_state
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn set_lock(&mut self, lock: bool) {
        self.locked = lock;
    }

    pub fn set_prev_state(&mut self, state: impl Into<String>) {
        self.prev_state = state.into();
    }

    pub fn set_current_state(&mut self, state: impl Into<String>) {
        self.current_state = state.into();
    }
}

#[derive(Debug)]
pub struct LedOverrideRegistry {
    entries: Vec<LedOverride>,
}

impl LedOverrideRegistry {
    /// Populate one entry per LED-category write signal.
    pub fn new() -> Self {
        Self {
            entries: SignalCatalog::led_signals()
                .map(|(signal, name)| LedOverride::new(signal, name))
                .collect(),
        }
    }

    pub fn find(&self, signal: SetSignal) -> Option<&LedOverride> {
        self.entries.iter().find(|led| led.signal == signal)
    }

    pub fn find_mut(&mut self, signal: SetSignal) -> Option<&mut LedOverride> {
        self.entries.iter_mut().find(|led| led.signal == signal)
    }

    /// Display name for an LED signal; None outside the LED category.
    pub fn name(&self, signal: SetSignal) -> Option<&'static str> {
        self.find(signal).map(LedOverride::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedOverride> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LedOverride> {
        self.entries.iter_mut()
    }

    pub fn any_locked(&self) -> bool {
        self.entries.iter().any(|led| led.locked)
    }
}

impl Default for LedOverrideRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populated_for_every_led_signal() {
        let registry = LedOverrideRegistry::new();
        for (signal, name) in SignalCatalog::led_signals() {
            let led = registry.find(signal).expect("catalog LED missing");
            assert_eq!(led.name(), name);
            assert!(!led.locked());
            assert!(led.prev_state().is_empty());
        }
    }

    #[test]
    fn lookup_outside_led_category_is_none() {
        let registry = LedOverrideRegistry::new();
        assert!(registry.find(SetSignal::FanPowerSpeed).is_none());
        assert!(registry.find(SetSignal::Speaker).is_none());
        assert!(registry.name(SetSignal::LcdBacklight).is_none());
    }

    #[test]
    fn field_mutation() {
        let mut registry = LedOverrideRegistry::new();
        let led = registry.find_mut(SetSignal::PowerLed).unwrap();
        led.set_prev_state("xyz.openbmc_project.Led.Physical.Action.Off");
        led.set_current_state("xyz.openbmc_project.Led.Physical.Action.On");
        led.set_lock(true);

        let led = registry.find(SetSignal::PowerLed).unwrap();
        assert!(led.locked());
        assert!(led.prev_state().ends_with("Off"));
        assert!(led.current_state().ends_with("On"));
        assert!(registry.any_locked());
    }
}
