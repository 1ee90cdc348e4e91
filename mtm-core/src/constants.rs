//! Constants for the signal override engine
//!
//! Centralizes bus addressing and configuration defaults. Never use magic
//! addressing strings in other files - add them here first.

use std::time::Duration;

/// Property bus addressing for the external control services
pub mod bus {
    /// Fan sensor service exposing per-channel PWM and tachometer values
    pub const FAN_SERVICE: &str = "xyz.openbmc_project.FanSensor";

    /// Per-channel fan PWM object path prefix (suffixed with the channel number)
    pub const FAN_PWM_PATH_PREFIX: &str = "/xyz/openbmc_project/sensors/fan_pwm/Pwm_";

    /// Per-channel fan tachometer object path prefix (suffixed with the channel number)
    pub const FAN_TACH_PATH_PREFIX: &str = "/xyz/openbmc_project/sensors/fan_tach/Fan_";

    /// Sensor value interface shared by PWM and tachometer objects
    pub const SENSOR_VALUE_INTERFACE: &str = "xyz.openbmc_project.Sensor.Value";

    /// Value property on the sensor value interface
    pub const SENSOR_VALUE_PROPERTY: &str = "Value";

    /// GPIO control service
    pub const GPIO_SERVICE: &str = "xyz.openbmc_project.Gpio";

    /// GPIO control interface
    pub const GPIO_INTERFACE: &str = "xyz.openbmc_project.Control.Gpio";

    /// GPIO control object path prefix (suffixed with the configured line name)
    pub const GPIO_PATH_PREFIX: &str = "/xyz/openbmc_project/control/gpio/";

    /// Sampled line state property on the GPIO control interface
    pub const GPIO_SAMPLED_PROPERTY: &str = "SampledValue";

    /// Input mask property on the GPIO control interface; true suppresses the line
    pub const GPIO_IGNORE_PROPERTY: &str = "Ignore";

    /// Driven line state property on the GPIO control interface
    pub const GPIO_VALUE_PROPERTY: &str = "Value";

    /// Per-LED controller service prefix (suffixed with the LED name)
    pub const LED_SERVICE_PREFIX: &str = "xyz.openbmc_project.LED.Controller.";

    /// Physical LED object path prefix (suffixed with the LED name)
    pub const LED_PATH_PREFIX: &str = "/xyz/openbmc_project/led/physical/";

    /// Physical LED interface
    pub const LED_INTERFACE: &str = "xyz.openbmc_project.Led.Physical";

    /// LED state property on the physical interface
    pub const LED_STATE_PROPERTY: &str = "State";

    /// LED action value prefix; comes with an On/Off/Blink suffix
    pub const LED_STATE_PREFIX: &str = "xyz.openbmc_project.Led.Physical.Action.";

    /// Special-mode privilege service
    pub const SPECIAL_MODE_SERVICE: &str = "xyz.openbmc_project.SpecialMode";

    /// Special-mode object path
    pub const SPECIAL_MODE_PATH: &str = "/xyz/openbmc_project/security/specialMode";

    /// Special-mode interface
    pub const SPECIAL_MODE_INTERFACE: &str = "xyz.openbmc_project.Security.SpecialMode";

    /// Special-mode level property; values map onto AccessLevel
    pub const SPECIAL_MODE_PROPERTY: &str = "SpecialMode";

    /// Automatic fan-control unit suspended while a PWM override is outstanding
    pub const FAN_CONTROL_UNIT: &str = "phosphor-pid-control.service";
}

/// Tachometer presence status bits reported in the first response field
pub mod fan_status {
    pub const FAN_SENSOR_PRESENT: u8 = 1 << 0;
    pub const FAN_PRESENT: u8 = 1 << 1;
}

/// LED state codes reported by the read path
pub mod led_code {
    pub const OFF: u8 = 0;
    pub const ON: u8 = 1;
    pub const BLINK: u8 = 2;
}

/// Default idle period before all outstanding overrides revert
pub const DEFAULT_REVERT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounds accepted for a configured revert timeout (seconds)
pub const MIN_REVERT_TIMEOUT_SECS: u64 = 5;
pub const MAX_REVERT_TIMEOUT_SECS: u64 = 3600;
