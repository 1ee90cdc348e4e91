//! Signal catalog
//!
//! Static category map for both signal enumerations plus the per-signal bus
//! addressing: GPIO-backed signals resolve to a control path configured once
//! at construction, LED signals to a physical-LED name, fan signals to a
//! per-channel sensor path.

use mtm_protocol::{GetSignal, SetSignal};

use crate::config::EngineConfig;
use crate::constants::bus;

/// Dispatch category of an addressable signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalCategory {
    Gpio,
    FanPwm,
    FanTach,
    Led,
    Reserved,
}

/// Default GPIO line names for the read-side catalog.
const GPIO_GET_LINES: &[(GetSignal, &str)] = &[
    (GetSignal::PowerButton, "power_button"),
    (GetSignal::ResetButton, "reset_button"),
    (GetSignal::SleepButton, "sleep_button"),
    (GetSignal::NmiButton, "nmi_button"),
    (GetSignal::ChassisIntrusion, "chassis_intrusion"),
    (GetSignal::PowerGood, "power_good"),
    (GetSignal::PowerRequest, "power_request"),
    (GetSignal::SleepRequest, "sleep_request"),
    (GetSignal::FrbTimerHalt, "frb_timer_halt"),
    (GetSignal::ForceUpdate, "force_update"),
    (GetSignal::RingIndication, "ring_indication"),
    (GetSignal::CarrierDetect, "carrier_detect"),
    (GetSignal::IdentifyButton, "identify_button"),
    (GetSignal::NcsiDiag, "ncsi_diag"),
    (GetSignal::LcpLeftButton, "lcp_left_button"),
    (GetSignal::LcpRightButton, "lcp_right_button"),
    (GetSignal::LcpEnterButton, "lcp_enter_button"),
];

/// Default GPIO line names for the write-side catalog.
const GPIO_SET_LINES: &[(SetSignal, &str)] = &[
    (SetSignal::PowerRequest, "power_request"),
    (SetSignal::SleepRequest, "sleep_request"),
    (SetSignal::AcpiSci, "acpi_sci"),
    (SetSignal::Speaker, "speaker"),
    (SetSignal::LcdBacklight, "lcd_backlight"),
];

/// Physical-LED names for the LED-category write signals.
const LED_NAMES: &[(SetSignal, &str)] = &[
    (SetSignal::PowerLed, "power"),
    (SetSignal::PowerFaultLed, "power_fault"),
    (SetSignal::ClusterLed, "cluster"),
    (SetSignal::DiskFaultLed, "disk_fault"),
    (SetSignal::CoolingFaultLed, "cooling_fault"),
    (SetSignal::FanPackFaultLed, "fan_pack_fault"),
    (SetSignal::CpuFailLed, "cpu_fail"),
    (SetSignal::DimmFailLed, "dimm_fail"),
    (SetSignal::IdentifyLed, "identify"),
    (SetSignal::HddLed, "hdd"),
    (SetSignal::SystemReadyLed, "system_ready"),
];

/// Category of a read-side signal.
pub fn category_of_get(signal: GetSignal) -> SignalCategory {
    match signal {
        GetSignal::FanPwm => SignalCategory::FanPwm,
        GetSignal::FanTach => SignalCategory::FanTach,
        GetSignal::Reserved => SignalCategory::Reserved,
        GetSignal::PowerLed
        | GetSignal::PowerFaultLed
        | GetSignal::ClusterLed
        | GetSignal::DiskFaultLed
        | GetSignal::CoolingFaultLed
        | GetSignal::FanPackFaultLed
        | GetSignal::CpuFailLed
        | GetSignal::DimmFailLed
        | GetSignal::IdentifyLed
        | GetSignal::HddLed
        | GetSignal::SystemReadyLed => SignalCategory::Led,
        _ => SignalCategory::Gpio,
    }
}

/// Category of a write-side signal.
pub fn category_of_set(signal: SetSignal) -> SignalCategory {
    match signal {
        SetSignal::FanPowerSpeed => SignalCategory::FanPwm,
        SetSignal::PowerRequest
        | SetSignal::SleepRequest
        | SetSignal::AcpiSci
        | SetSignal::Speaker
        | SetSignal::LcdBacklight => SignalCategory::Gpio,
        _ => SignalCategory::Led,
    }
}

/// Write-side LED signal behind a read-side LED sampling ordinal.
pub fn led_set_signal(signal: GetSignal) -> Option<SetSignal> {
    match signal {
        GetSignal::PowerLed => Some(SetSignal::PowerLed),
        GetSignal::PowerFaultLed => Some(SetSignal::PowerFaultLed),
        GetSignal::ClusterLed => Some(SetSignal::ClusterLed),
        GetSignal::DiskFaultLed => Some(SetSignal::DiskFaultLed),
        GetSignal::CoolingFaultLed => Some(SetSignal::CoolingFaultLed),
        GetSignal::FanPackFaultLed => Some(SetSignal::FanPackFaultLed),
        GetSignal::CpuFailLed => Some(SetSignal::CpuFailLed),
        GetSignal::DimmFailLed => Some(SetSignal::DimmFailLed),
        GetSignal::IdentifyLed => Some(SetSignal::IdentifyLed),
        GetSignal::HddLed => Some(SetSignal::HddLed),
        GetSignal::SystemReadyLed => Some(SetSignal::SystemReadyLed),
        _ => None,
    }
}

/// Physical-LED name behind an LED-category write signal.
pub fn led_name(signal: SetSignal) -> Option<&'static str> {
    LED_NAMES
        .iter()
        .find(|(s, _)| *s == signal)
        .map(|(_, name)| *name)
}

/// Full physical-LED object path for an LED name.
pub fn led_path(name: &str) -> String {
    format!("{}{}", bus::LED_PATH_PREFIX, name)
}

/// Controller service owning an LED name.
pub fn led_service(name: &str) -> String {
    format!("{}{}", bus::LED_SERVICE_PREFIX, name)
}

/// Per-channel fan PWM object path.
pub fn fan_pwm_path(channel: u8) -> String {
    format!("{}{}", bus::FAN_PWM_PATH_PREFIX, channel)
}

/// Per-channel fan tachometer object path.
pub fn fan_tach_path(channel: u8) -> String {
    format!("{}{}", bus::FAN_TACH_PATH_PREFIX, channel)
}

/// Per-signal bus addressing, populated once at construction.
#[derive(Debug)]
pub struct SignalCatalog {
    gpio_get_paths: Vec<(GetSignal, String)>,
    gpio_set_paths: Vec<(SetSignal, String)>,
}

impl SignalCatalog {
    pub fn new(config: &EngineConfig) -> Self {
        let gpio_get_paths = GPIO_GET_LINES
            .iter()
            .map(|(signal, line)| {
                (
                    *signal,
                    format!("{}{}", bus::GPIO_PATH_PREFIX, config.gpio_line(line)),
                )
            })
            .collect();
        let gpio_set_paths = GPIO_SET_LINES
            .iter()
            .map(|(signal, line)| {
                (
                    *signal,
                    format!("{}{}", bus::GPIO_PATH_PREFIX, config.gpio_line(line)),
                )
            })
            .collect();
        Self {
            gpio_get_paths,
            gpio_set_paths,
        }
    }

    /// Control path of a GPIO-backed read signal.
    pub fn gpio_get_path(&self, signal: GetSignal) -> Option<&str> {
        self.gpio_get_paths
            .iter()
            .find(|(s, _)| *s == signal)
            .map(|(_, path)| path.as_str())
    }

    /// Control path of a GPIO-backed write signal.
    pub fn gpio_set_path(&self, signal: SetSignal) -> Option<&str> {
        self.gpio_set_paths
            .iter()
            .find(|(s, _)| *s == signal)
            .map(|(_, path)| path.as_str())
    }

    /// The LED-category write signals with their physical names, in catalog order.
    pub fn led_signals() -> impl Iterator<Item = (SetSignal, &'static str)> {
        LED_NAMES.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtm_protocol::{GetSignal, SetSignal};

    #[test]
    fn every_gpio_get_signal_has_a_path() {
        let catalog = SignalCatalog::new(&EngineConfig::default());
        for signal in [
            GetSignal::PowerButton,
            GetSignal::ResetButton,
            GetSignal::SleepButton,
            GetSignal::NmiButton,
            GetSignal::ChassisIntrusion,
            GetSignal::PowerGood,
            GetSignal::PowerRequest,
            GetSignal::SleepRequest,
            GetSignal::FrbTimerHalt,
            GetSignal::ForceUpdate,
            GetSignal::RingIndication,
            GetSignal::CarrierDetect,
            GetSignal::IdentifyButton,
            GetSignal::NcsiDiag,
            GetSignal::LcpLeftButton,
            GetSignal::LcpRightButton,
            GetSignal::LcpEnterButton,
        ] {
            assert_eq!(category_of_get(signal), SignalCategory::Gpio);
            let path = catalog.gpio_get_path(signal).unwrap();
            assert!(path.starts_with("/xyz/openbmc_project/control/gpio/"));
        }
    }

    #[test]
    fn every_led_get_ordinal_maps_to_a_registry_signal() {
        for signal in [
            GetSignal::PowerLed,
            GetSignal::PowerFaultLed,
            GetSignal::ClusterLed,
            GetSignal::DiskFaultLed,
            GetSignal::CoolingFaultLed,
            GetSignal::FanPackFaultLed,
            GetSignal::CpuFailLed,
            GetSignal::DimmFailLed,
            GetSignal::IdentifyLed,
            GetSignal::HddLed,
            GetSignal::SystemReadyLed,
        ] {
            assert_eq!(category_of_get(signal), SignalCategory::Led);
            let set_signal = led_set_signal(signal).unwrap();
            assert_eq!(category_of_set(set_signal), SignalCategory::Led);
            assert!(led_name(set_signal).is_some());
        }
    }

    #[test]
    fn fan_and_reserved_categories() {
        assert_eq!(category_of_get(GetSignal::FanPwm), SignalCategory::FanPwm);
        assert_eq!(category_of_get(GetSignal::FanTach), SignalCategory::FanTach);
        assert_eq!(category_of_get(GetSignal::Reserved), SignalCategory::Reserved);
        assert_eq!(category_of_set(SetSignal::FanPowerSpeed), SignalCategory::FanPwm);
        assert_eq!(category_of_set(SetSignal::Speaker), SignalCategory::Gpio);
        assert_eq!(category_of_set(SetSignal::PowerLed), SignalCategory::Led);
    }

    #[test]
    fn fan_paths_carry_the_channel() {
        assert_eq!(
            fan_pwm_path(2),
            "/xyz/openbmc_project/sensors/fan_pwm/Pwm_2"
        );
        assert_eq!(
            fan_tach_path(5),
            "/xyz/openbmc_project/sensors/fan_tach/Fan_5"
        );
    }

    #[test]
    fn gpio_line_override_changes_the_path() {
        let mut config = EngineConfig::default();
        config
            .gpio_line_overrides
            .insert("reset_button".into(), "fp_reset".into());
        let catalog = SignalCatalog::new(&config);
        assert_eq!(
            catalog.gpio_get_path(GetSignal::ResetButton).unwrap(),
            "/xyz/openbmc_project/control/gpio/fp_reset"
        );
        // Other lines unaffected
        assert_eq!(
            catalog.gpio_get_path(GetSignal::PowerButton).unwrap(),
            "/xyz/openbmc_project/control/gpio/power_button"
        );
    }

    #[test]
    fn led_addressing() {
        assert_eq!(led_name(SetSignal::PowerLed), Some("power"));
        assert_eq!(led_name(SetSignal::FanPowerSpeed), None);
        assert_eq!(led_path("power"), "/xyz/openbmc_project/led/physical/power");
        assert_eq!(led_service("power"), "xyz.openbmc_project.LED.Controller.power");
    }
}
