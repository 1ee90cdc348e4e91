//! Access gate
//!
//! Caches the operator's manufacturing-test privilege level. The cached value
//! lives on the gate itself: initialized to NotRunning, mutated only here,
//! and never reset once Expired. A privilege query failure means the session
//! is over - it is treated as Expired and never retried for the process
//! lifetime.

use tracing::warn;

use crate::constants::bus;
use crate::properties::PlatformBus;

/// Manufacturing-test privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    NotRunning,
    Expired,
    Available,
}

impl From<u8> for AccessLevel {
    fn from(raw: u8) -> Self {
        match raw {
            1 => AccessLevel::Expired,
            2 => AccessLevel::Available,
            // 0 and anything out of range read as "not in test mode"
            _ => AccessLevel::NotRunning,
        }
    }
}

#[derive(Debug)]
pub struct AccessGate {
    level: AccessLevel,
}

impl AccessGate {
    pub fn new() -> Self {
        Self {
            level: AccessLevel::NotRunning,
        }
    }

    /// Evaluate the privilege level, consulting the special-mode service
    /// unless the cached level is already terminal.
    pub fn level<B: PlatformBus>(&mut self, pbus: &mut B) -> AccessLevel {
        if self.level == AccessLevel::Expired {
            return self.level;
        }
        match pbus.get_property(
            bus::SPECIAL_MODE_SERVICE,
            bus::SPECIAL_MODE_PATH,
            bus::SPECIAL_MODE_INTERFACE,
            bus::SPECIAL_MODE_PROPERTY,
        ) {
            Ok(value) => match value.as_u8() {
                Some(raw) => self.level = AccessLevel::from(raw),
                None => {
                    warn!("Special-mode property has a non-numeric value; treating as expired");
                    self.level = AccessLevel::Expired;
                }
            },
            Err(e) => {
                warn!("Special-mode query failed: {}; treating as expired", e);
                self.level = AccessLevel::Expired;
            }
        }
        self.level
    }

    /// Last evaluated level, without I/O.
    pub fn cached(&self) -> AccessLevel {
        self.level
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Value;
    use mtm_error::{MtmError, Result};

    /// Scripted bus that serves one privilege value (or failure) and counts calls.
    struct PrivilegeBus {
        reply: Option<u8>,
        queries: usize,
    }

    impl PlatformBus for PrivilegeBus {
        fn get_property(
            &mut self,
            _service: &str,
            _path: &str,
            _interface: &str,
            _property: &str,
        ) -> Result<Value> {
            self.queries += 1;
            match self.reply {
                Some(raw) => Ok(Value::Byte(raw)),
                None => Err(MtmError::property_read("specialMode", "SpecialMode", "no reply")),
            }
        }

        fn set_property(
            &mut self,
            _service: &str,
            _path: &str,
            _interface: &str,
            _property: &str,
            _value: Value,
        ) -> Result<()> {
            unreachable!("access gate never writes");
        }

        fn set_fan_control_enabled(&mut self, _enabled: bool) -> Result<()> {
            unreachable!("access gate never touches fan control");
        }
    }

    #[test]
    fn adopts_reported_level() {
        let mut pbus = PrivilegeBus {
            reply: Some(2),
            queries: 0,
        };
        let mut gate = AccessGate::new();
        assert_eq!(gate.cached(), AccessLevel::NotRunning);
        assert_eq!(gate.level(&mut pbus), AccessLevel::Available);
        // Can move back down while not expired
        pbus.reply = Some(0);
        assert_eq!(gate.level(&mut pbus), AccessLevel::NotRunning);
    }

    #[test]
    fn failure_is_sticky_and_never_requeried() {
        let mut pbus = PrivilegeBus {
            reply: None,
            queries: 0,
        };
        let mut gate = AccessGate::new();
        assert_eq!(gate.level(&mut pbus), AccessLevel::Expired);
        assert_eq!(pbus.queries, 1);

        // Service comes back; the gate must not care
        pbus.reply = Some(2);
        assert_eq!(gate.level(&mut pbus), AccessLevel::Expired);
        assert_eq!(gate.level(&mut pbus), AccessLevel::Expired);
        assert_eq!(pbus.queries, 1);
    }

    #[test]
    fn out_of_range_levels_read_as_not_running() {
        assert_eq!(AccessLevel::from(0), AccessLevel::NotRunning);
        assert_eq!(AccessLevel::from(1), AccessLevel::Expired);
        assert_eq!(AccessLevel::from(2), AccessLevel::Available);
        assert_eq!(AccessLevel::from(7), AccessLevel::NotRunning);
    }
}
