//! busctl-backed property bus
//!
//! The concrete [`PlatformBus`] for the daemon: properties go through
//! `busctl get-property` / `busctl set-property`, and the automatic
//! fan-control unit is suspended/resumed through `systemctl`. Both are local
//! invocations; call duration is bounded by the bus daemon itself.

use std::process::Command;

use tracing::debug;

use mtm_core::constants::bus;
use mtm_core::{PlatformBus, Value};
use mtm_error::{MtmError, Result};

pub struct BusctlBus;

impl BusctlBus {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BusctlBus {
    fn default() -> Self {
        Self::new()
    }
}

/// busctl type signature and argument text for a property value.
fn value_signature(value: &Value) -> (&'static str, String) {
    match value {
        Value::Byte(v) => ("y", v.to_string()),
        Value::Word(v) => ("q", v.to_string()),
        Value::Double(v) => ("d", v.to_string()),
        Value::Bool(v) => ("b", v.to_string()),
        Value::Str(v) => ("s", v.clone()),
    }
}

/// Parse a `busctl get-property` reply line, e.g. `y 2`, `d 80`, `b true`,
/// `s "xyz.openbmc_project.Led.Physical.Action.Off"`.
fn parse_variant(line: &str) -> Option<Value> {
    let (signature, text) = line.trim().split_once(' ')?;
    match signature {
        "y" => text.parse().ok().map(Value::Byte),
        "q" | "n" => text.parse().ok().map(Value::Word),
        "b" => text.parse().ok().map(Value::Bool),
        "s" => Some(Value::Str(text.trim_matches('"').to_string())),
        // Remaining numeric signatures collapse to a double
        "d" | "u" | "i" | "x" | "t" => text.parse().ok().map(Value::Double),
        _ => None,
    }
}

fn run_busctl(args: &[&str]) -> Result<String> {
    debug!(?args, "busctl");
    let output = Command::new("busctl")
        .args(args)
        .output()
        .map_err(|e| MtmError::generic(format!("Failed to run busctl: {}", e)))?;
    if !output.status.success() {
        return Err(MtmError::generic(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl PlatformBus for BusctlBus {
    fn get_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<Value> {
        let reply = run_busctl(&["get-property", service, path, interface, property])
            .map_err(|e| MtmError::property_read(path, property, e.to_string()))?;
        parse_variant(&reply).ok_or_else(|| {
            MtmError::property_read(path, property, format!("unparseable reply: {}", reply))
        })
    }

    fn set_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value,
    ) -> Result<()> {
        let (signature, text) = value_signature(&value);
        run_busctl(&[
            "set-property",
            service,
            path,
            interface,
            property,
            signature,
            &text,
        ])
        .map(|_| ())
        .map_err(|e| MtmError::property_write(path, property, e.to_string()))
    }

    fn set_fan_control_enabled(&mut self, enabled: bool) -> Result<()> {
        let verb = if enabled { "start" } else { "stop" };
        debug!(verb, unit = bus::FAN_CONTROL_UNIT, "systemctl");
        let output = Command::new("systemctl")
            .args([verb, bus::FAN_CONTROL_UNIT])
            .output()
            .map_err(|e| MtmError::service(format!("Failed to run systemctl: {}", e)))?;
        if !output.status.success() {
            return Err(MtmError::service(format!(
                "systemctl {} {} failed: {}",
                verb,
                bus::FAN_CONTROL_UNIT,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_byte_reply() {
        assert_eq!(parse_variant("y 2"), Some(Value::Byte(2)));
    }

    #[test]
    fn parses_word_and_double_replies() {
        assert_eq!(parse_variant("q 4800"), Some(Value::Word(4800)));
        assert_eq!(parse_variant("d 80"), Some(Value::Double(80.0)));
        assert_eq!(parse_variant("u 12"), Some(Value::Double(12.0)));
    }

    #[test]
    fn parses_bool_and_string_replies() {
        assert_eq!(parse_variant("b true"), Some(Value::Bool(true)));
        assert_eq!(
            parse_variant("s \"xyz.openbmc_project.Led.Physical.Action.Off\""),
            Some(Value::Str(
                "xyz.openbmc_project.Led.Physical.Action.Off".into()
            ))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_variant(""), None);
        assert_eq!(parse_variant("nonsense"), None);
        assert_eq!(parse_variant("y not-a-number"), None);
    }

    #[test]
    fn value_signatures() {
        assert_eq!(value_signature(&Value::Byte(1)).0, "y");
        assert_eq!(value_signature(&Value::Bool(false)).1, "false");
        let (sig, text) = value_signature(&Value::Str("abc".into()));
        assert_eq!((sig, text.as_str()), ("s", "abc"));
    }
}
