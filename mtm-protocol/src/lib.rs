use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum raw payload bytes accepted by DetectAccessLevel
pub const MAX_RAW_REQUEST_LEN: usize = 256;

/// Number of addressable fan channels (PWM and tachometer)
pub const MAX_FAN_CHANNELS: u8 = 8;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// Signal Catalog Ordinals
// ============================================================================

/// Addressable read-side signals.
///
/// Ordinals 0x00-0x13 are the legacy catalog and must keep their exact wire
/// values. LED sampling ordinals live at 0x20.. so the read path can address
/// the same LEDs the write path forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GetSignal {
    PowerButton = 0x00,
    ResetButton = 0x01,
    SleepButton = 0x02,
    NmiButton = 0x03,
    ChassisIntrusion = 0x04,
    PowerGood = 0x05,
    PowerRequest = 0x06,
    SleepRequest = 0x07,
    FrbTimerHalt = 0x08,
    ForceUpdate = 0x09,
    RingIndication = 0x0a,
    CarrierDetect = 0x0b,
    IdentifyButton = 0x0c,
    FanPwm = 0x0d,
    Reserved = 0x0e,
    FanTach = 0x0f,
    NcsiDiag = 0x10,
    LcpLeftButton = 0x11,
    LcpRightButton = 0x12,
    LcpEnterButton = 0x13,
    PowerLed = 0x20,
    PowerFaultLed = 0x21,
    ClusterLed = 0x22,
    DiskFaultLed = 0x23,
    CoolingFaultLed = 0x24,
    FanPackFaultLed = 0x25,
    CpuFailLed = 0x26,
    DimmFailLed = 0x27,
    IdentifyLed = 0x28,
    HddLed = 0x29,
    SystemReadyLed = 0x2a,
}

/// Addressable write-side signals, wire-compatible with the legacy catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SetSignal {
    PowerLed = 0x00,
    PowerFaultLed = 0x01,
    ClusterLed = 0x02,
    DiskFaultLed = 0x03,
    CoolingFaultLed = 0x04,
    FanPowerSpeed = 0x05,
    PowerRequest = 0x06,
    SleepRequest = 0x07,
    AcpiSci = 0x08,
    Speaker = 0x09,
    FanPackFaultLed = 0x0a,
    CpuFailLed = 0x0b,
    DimmFailLed = 0x0c,
    IdentifyLed = 0x0d,
    HddLed = 0x0e,
    SystemReadyLed = 0x0f,
    LcdBacklight = 0x10,
}

/// Read-path actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GetAction {
    Sample = 0,
    Ignore = 1,
    Revert = 2,
}

/// Write-path actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SetAction {
    ForceDeasserted = 0,
    ForceAsserted = 1,
    Revert = 2,
}

macro_rules! u8_enum_conversions {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        impl From<$name> for u8 {
            fn from(v: $name) -> u8 {
                match v {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(raw: u8) -> Result<Self, Self::Error> {
                match raw {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!(
                        concat!("Unknown ", stringify!($name), " ordinal: {:#04x}"),
                        other
                    )),
                }
            }
        }
    };
}

u8_enum_conversions!(GetSignal {
    PowerButton = 0x00,
    ResetButton = 0x01,
    SleepButton = 0x02,
    NmiButton = 0x03,
    ChassisIntrusion = 0x04,
    PowerGood = 0x05,
    PowerRequest = 0x06,
    SleepRequest = 0x07,
    FrbTimerHalt = 0x08,
    ForceUpdate = 0x09,
    RingIndication = 0x0a,
    CarrierDetect = 0x0b,
    IdentifyButton = 0x0c,
    FanPwm = 0x0d,
    Reserved = 0x0e,
    FanTach = 0x0f,
    NcsiDiag = 0x10,
    LcpLeftButton = 0x11,
    LcpRightButton = 0x12,
    LcpEnterButton = 0x13,
    PowerLed = 0x20,
    PowerFaultLed = 0x21,
    ClusterLed = 0x22,
    DiskFaultLed = 0x23,
    CoolingFaultLed = 0x24,
    FanPackFaultLed = 0x25,
    CpuFailLed = 0x26,
    DimmFailLed = 0x27,
    IdentifyLed = 0x28,
    HddLed = 0x29,
    SystemReadyLed = 0x2a,
});

u8_enum_conversions!(SetSignal {
    PowerLed = 0x00,
    PowerFaultLed = 0x01,
    ClusterLed = 0x02,
    DiskFaultLed = 0x03,
    CoolingFaultLed = 0x04,
    FanPowerSpeed = 0x05,
    PowerRequest = 0x06,
    SleepRequest = 0x07,
    AcpiSci = 0x08,
    Speaker = 0x09,
    FanPackFaultLed = 0x0a,
    CpuFailLed = 0x0b,
    DimmFailLed = 0x0c,
    IdentifyLed = 0x0d,
    HddLed = 0x0e,
    SystemReadyLed = 0x0f,
    LcdBacklight = 0x10,
});

u8_enum_conversions!(GetAction {
    Sample = 0,
    Ignore = 1,
    Revert = 2,
});

u8_enum_conversions!(SetAction {
    ForceDeasserted = 0,
    ForceAsserted = 1,
    Revert = 2,
});

// ============================================================================
// Completion Codes
// ============================================================================

/// Completion codes reported to the upstream command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CompletionCode {
    Success = 0x00,
    InvalidField = 0xcc,
    InsufficientPrivilege = 0xd4,
    UnspecifiedError = 0xff,
}

u8_enum_conversions!(CompletionCode {
    Success = 0x00,
    InvalidField = 0xcc,
    InsufficientPrivilege = 0xd4,
    UnspecifiedError = 0xff,
});

impl CompletionCode {
    pub fn is_success(self) -> bool {
        self == CompletionCode::Success
    }
}

// ============================================================================
// Typed Request / Response Records
// ============================================================================

/// A write-path signal override request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetSignalRequest {
    pub signal: SetSignal,
    pub instance: u8,
    pub action: SetAction,
    pub value: u8,
}

/// A read-path signal request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetSignalRequest {
    pub signal: GetSignal,
    pub instance: u8,
    pub action: GetAction,
}

/// Read-path response values.
///
/// Three fields are carried for wire compatibility; most signals populate
/// only `sig_val`. The tachometer path uses all three (status bits plus a
/// 16-bit reading).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSignalResponse {
    pub sig_val: u8,
    pub sig_val1: u8,
    pub sig_val2: u8,
}

impl GetSignalResponse {
    pub fn single(value: u8) -> Self {
        Self {
            sig_val: value,
            sig_val1: 0,
            sig_val2: 0,
        }
    }
}

// ============================================================================
// IPC Envelope (line-delimited JSON over the daemon socket)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Authorize the raw upstream request payload against the access gate
    DetectAccessLevel { raw: Vec<u8> },
    /// Read-path dispatch; ordinals are raw wire bytes, validated server-side
    GetSignal { signal: u8, instance: u8, action: u8 },
    /// Write-path dispatch; ordinals are raw wire bytes, validated server-side
    SetSignal {
        signal: u8,
        instance: u8,
        action: u8,
        value: u8,
    },
}

impl Request {
    /// Validate request parameters before sending to the daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping | Request::Version => Ok(()),

            Request::DetectAccessLevel { raw } => {
                if raw.len() > MAX_RAW_REQUEST_LEN {
                    return Err(format!(
                        "Raw request too large: {} > {} bytes",
                        raw.len(),
                        MAX_RAW_REQUEST_LEN
                    ));
                }
                Ok(())
            }

            Request::GetSignal {
                signal,
                instance,
                action,
            } => {
                let signal = GetSignal::try_from(*signal)?;
                GetAction::try_from(*action)?;
                validate_get_instance(signal, *instance)
            }

            Request::SetSignal {
                signal,
                instance,
                action,
                value: _,
            } => {
                let signal = SetSignal::try_from(*signal)?;
                SetAction::try_from(*action)?;
                validate_set_instance(signal, *instance)
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::DetectAccessLevel { .. } => "DetectAccessLevel",
            Request::GetSignal { .. } => "GetSignal",
            Request::SetSignal { .. } => "SetSignal",
        }
    }
}

/// Fan channels are instance-addressed; everything else is single-instance.
pub fn validate_get_instance(signal: GetSignal, instance: u8) -> Result<(), String> {
    match signal {
        GetSignal::FanPwm | GetSignal::FanTach => validate_fan_channel(instance),
        _ => Ok(()),
    }
}

pub fn validate_set_instance(signal: SetSignal, instance: u8) -> Result<(), String> {
    match signal {
        SetSignal::FanPowerSpeed => validate_fan_channel(instance),
        _ => Ok(()),
    }
}

pub fn validate_fan_channel(instance: u8) -> Result<(), String> {
    if instance >= MAX_FAN_CHANNELS {
        return Err(format!(
            "Fan channel out of range: {} (0-{})",
            instance,
            MAX_FAN_CHANNELS - 1
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data - optional fields populated per request type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<GetSignalResponse>,
}

impl ResponseData {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn string(v: String) -> Self {
        Self {
            value: Some(v),
            ..Self::default()
        }
    }

    pub fn completion(cc: CompletionCode) -> Self {
        Self {
            completion: Some(cc),
            ..Self::default()
        }
    }

    pub fn signal_values(rsp: GetSignalResponse, cc: CompletionCode) -> Self {
        Self {
            completion: Some(cc),
            signal: Some(rsp),
            ..Self::default()
        }
    }
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_completion(cc: CompletionCode) -> Self {
        Response::Ok(ResponseData::completion(cc))
    }

    pub fn ok_signal(rsp: GetSignalResponse, cc: CompletionCode) -> Self {
        Response::Ok(ResponseData::signal_values(rsp, cc))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_get_ordinals_are_stable() {
        assert_eq!(u8::from(GetSignal::PowerButton), 0x00);
        assert_eq!(u8::from(GetSignal::IdentifyButton), 0x0c);
        assert_eq!(u8::from(GetSignal::FanPwm), 0x0d);
        assert_eq!(u8::from(GetSignal::FanTach), 0x0f);
        assert_eq!(u8::from(GetSignal::LcpEnterButton), 0x13);
        // LED sampling ordinals stay clear of the legacy range
        assert_eq!(u8::from(GetSignal::PowerLed), 0x20);
        assert_eq!(u8::from(GetSignal::SystemReadyLed), 0x2a);
    }

    #[test]
    fn legacy_set_ordinals_are_stable() {
        assert_eq!(u8::from(SetSignal::PowerLed), 0x00);
        assert_eq!(u8::from(SetSignal::FanPowerSpeed), 0x05);
        assert_eq!(u8::from(SetSignal::LcdBacklight), 0x10);
    }

    #[test]
    fn unknown_ordinals_are_rejected() {
        assert!(GetSignal::try_from(0x14).is_err());
        assert!(GetSignal::try_from(0x2b).is_err());
        assert!(SetSignal::try_from(0x11).is_err());
        assert!(GetAction::try_from(3).is_err());
        assert!(SetAction::try_from(3).is_err());
    }

    #[test]
    fn completion_code_wire_values() {
        assert_eq!(u8::from(CompletionCode::Success), 0x00);
        assert_eq!(u8::from(CompletionCode::InvalidField), 0xcc);
        assert_eq!(u8::from(CompletionCode::InsufficientPrivilege), 0xd4);
        assert_eq!(u8::from(CompletionCode::UnspecifiedError), 0xff);
        assert!(CompletionCode::Success.is_success());
        assert!(!CompletionCode::InvalidField.is_success());
    }

    #[test]
    fn request_validation() {
        assert!(Request::Ping.validate().is_ok());
        assert!(Request::GetSignal {
            signal: 0x0d,
            instance: 2,
            action: 0
        }
        .validate()
        .is_ok());
        // Out-of-range fan channel
        assert!(Request::GetSignal {
            signal: 0x0f,
            instance: MAX_FAN_CHANNELS,
            action: 0
        }
        .validate()
        .is_err());
        // Unknown signal ordinal
        assert!(Request::SetSignal {
            signal: 0x40,
            instance: 0,
            action: 1,
            value: 0
        }
        .validate()
        .is_err());
        // Unknown action ordinal
        assert!(Request::GetSignal {
            signal: 0x00,
            instance: 0,
            action: 9
        }
        .validate()
        .is_err());
    }

    #[test]
    fn envelope_round_trip() {
        let env = RequestEnvelope::with_id(
            Request::SetSignal {
                signal: 0x00,
                instance: 0,
                action: 1,
                value: 0,
            },
            42,
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 42);
        assert_eq!(back.request.type_name(), "SetSignal");
    }

    #[test]
    fn response_envelope_serialization() {
        let env = ResponseEnvelope::new(
            7,
            Response::ok_signal(GetSignalResponse::single(1), CompletionCode::Success),
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        let back: ResponseEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        match back.response {
            Response::Ok(data) => {
                assert_eq!(data.completion, Some(CompletionCode::Success));
                assert_eq!(data.signal.unwrap().sig_val, 1);
            }
            Response::Error { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
