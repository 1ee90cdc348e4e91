//! Unix Socket Server
//!
//! Line-delimited JSON over a Unix domain socket. Connection tasks only
//! parse and forward: every request crosses an mpsc channel into ONE
//! dispatch task that owns the engine, so no two engine entry points ever
//! interleave and the revert deadline fires on the same serialized loop.
//!
//! # Security
//! - owner-only socket permissions (the operator interface is privileged)
//! - peer credential logging (UID/GID/PID) for every connection
//! - bounded message size, read/write timeouts, connection cap
//! - parameters validated client-side and re-validated here

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mtm_core::{OverrideEngine, PlatformBus};
use mtm_protocol::{
    CompletionCode, GetAction, GetSignal, GetSignalRequest, GetSignalResponse, Request,
    RequestEnvelope, Response, ResponseEnvelope, SetAction, SetSignal, SetSignalRequest,
    MAX_MESSAGE_SIZE,
};

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 16;

/// Depth of the serialized dispatch queue
const REQUEST_QUEUE_DEPTH: usize = 64;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions (0600 = owner only)
const SOCKET_MODE: u32 = 0o600;

/// Global connection counter
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Peer identity for audit logging
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

type DispatchItem = (RequestEnvelope, PeerCredentials, oneshot::Sender<ResponseEnvelope>);

/// Run the socket server and the engine dispatch loop until the process is
/// signalled.
pub async fn run_server<B>(socket_path: &str, engine: OverrideEngine<B>) -> anyhow::Result<()>
where
    B: PlatformBus + Send + 'static,
{
    // Stale socket from an unclean shutdown
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    info!("Listening on {}", socket_path);

    let (tx, rx) = mpsc::channel::<DispatchItem>(REQUEST_QUEUE_DEPTH);
    let dispatcher = tokio::spawn(dispatch_loop(engine, rx));

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if ACTIVE_CONNECTIONS.load(Ordering::SeqCst) >= MAX_CONNECTIONS {
                    warn!("Connection limit reached; dropping client");
                    continue;
                }
                ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, tx).await {
                        debug!("Connection closed: {}", e);
                    }
                    ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                if dispatcher.is_finished() {
                    anyhow::bail!("dispatch loop terminated");
                }
            }
        }
    }
}

/// The single serialized engine loop: inbound requests race the revert
/// deadline, nothing else ever touches the engine.
async fn dispatch_loop<B: PlatformBus>(
    mut engine: OverrideEngine<B>,
    mut rx: mpsc::Receiver<DispatchItem>,
) {
    loop {
        let deadline = engine.timer_deadline().map(tokio::time::Instant::from_std);
        // Placeholder target keeps the branch constructible while disarmed;
        // the guard prevents it from ever being polled then.
        let sleep_target = deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(24 * 3600));
        tokio::select! {
            item = rx.recv() => match item {
                Some((envelope, peer, reply)) => {
                    let response = dispatch_request(&mut engine, envelope, peer);
                    let _ = reply.send(response);
                }
                None => {
                    debug!("Dispatch channel closed");
                    break;
                }
            },
            _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                engine.poll_revert(std::time::Instant::now());
            }
        }
    }
}

/// Process one validated envelope against the engine.
fn dispatch_request<B: PlatformBus>(
    engine: &mut OverrideEngine<B>,
    envelope: RequestEnvelope,
    peer: PeerCredentials,
) -> ResponseEnvelope {
    let request_id = envelope.id;
    let request = envelope.request;

    // Re-validate server-side; clients are not trusted
    if let Err(e) = request.validate() {
        warn!("Request validation failed from uid={}: {}", peer.uid, e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    debug!(
        "Processing {} (id={}) from uid={}, pid={}",
        request.type_name(),
        request_id,
        peer.uid,
        peer.pid
    );

    let response = match request {
        Request::Ping => Response::ok_string("pong"),

        Request::Version => Response::ok_string(env!("CARGO_PKG_VERSION")),

        Request::DetectAccessLevel { raw } => {
            Response::ok_completion(engine.detect_access_level(&raw))
        }

        Request::GetSignal {
            signal,
            instance,
            action,
        } => match (GetSignal::try_from(signal), GetAction::try_from(action)) {
            (Ok(signal), Ok(action)) => {
                let (rsp, cc) = engine.process_get(GetSignalRequest {
                    signal,
                    instance,
                    action,
                });
                Response::ok_signal(rsp, cc)
            }
            _ => Response::ok_signal(GetSignalResponse::default(), CompletionCode::InvalidField),
        },

        // Write operations get extra logging
        Request::SetSignal {
            signal,
            instance,
            action,
            value,
        } => {
            info!(
                "AUDIT: SetSignal signal={:#04x} instance={} action={} value={} by uid={}, pid={}",
                signal, instance, action, value, peer.uid, peer.pid
            );
            match (SetSignal::try_from(signal), SetAction::try_from(action)) {
                (Ok(signal), Ok(action)) => {
                    let cc = engine.process_set(SetSignalRequest {
                        signal,
                        instance,
                        action,
                        value,
                    });
                    Response::ok_completion(cc)
                }
                _ => Response::ok_completion(CompletionCode::InvalidField),
            }
        }
    };

    ResponseEnvelope::new(request_id, response)
}

/// Read line-JSON requests off one client and forward them for dispatch.
async fn handle_connection(
    stream: UnixStream,
    tx: mpsc::Sender<DispatchItem>,
) -> std::io::Result<()> {
    let peer = get_peer_credentials(&stream).unwrap_or(PeerCredentials {
        uid: u32::MAX,
        gid: u32::MAX,
        pid: 0,
    });
    info!(
        "AUDIT: client connected uid={} gid={} pid={}",
        peer.uid, peer.gid, peer.pid
    );

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::with_capacity(256);

    loop {
        let n = match timeout(READ_TIMEOUT, read_line_bounded(&mut reader, &mut line)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!("Read timeout from uid={}", peer.uid);
                return Ok(());
            }
        };
        if n == 0 {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&line);
        let reply = match serde_json::from_str::<RequestEnvelope>(text.trim()) {
            Ok(envelope) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if tx.send((envelope, peer, reply_tx)).await.is_err() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "dispatch loop gone",
                    ));
                }
                match reply_rx.await {
                    Ok(reply) => reply,
                    Err(_) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "dispatch loop dropped request",
                        ))
                    }
                }
            }
            Err(e) => {
                debug!("Invalid JSON from uid={}: {}", peer.uid, e);
                ResponseEnvelope::new(0, Response::error("Invalid request format"))
            }
        };

        let mut payload = serde_json::to_vec(&reply).unwrap_or_else(|e| {
            warn!("Response serialization failed: {}", e);
            br#"{"id":0,"status":"error","message":"internal error"}"#.to_vec()
        });
        payload.push(b'\n');
        match timeout(WRITE_TIMEOUT, write_half.write_all(&payload)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!("Write timeout to uid={}", peer.uid);
                return Ok(());
            }
        }
    }
}

/// Read one newline-terminated message without buffering past the size cap.
async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(out.len());
        }

        let (take_len, found_newline) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        let remaining = MAX_MESSAGE_SIZE.saturating_sub(out.len());
        let available_len = available.len();
        if take_len > remaining {
            reader.consume(remaining.min(available_len));
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

/// Get peer credentials (uid, gid, pid) from a Unix socket
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        // SAFETY: ucred is a plain C struct; zeroing it is a valid initial state.
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: fd is a live socket descriptor and cred/len describe a
        // properly sized ucred buffer.
        let result = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if result == 0 {
            return Some(PeerCredentials {
                uid: cred.uid,
                gid: cred.gid,
                pid: cred.pid,
            });
        }
        None
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtm_core::{EngineConfig, Value};
    use mtm_error::MtmError;
    use std::collections::HashMap;

    /// Minimal scripted bus: canned properties, journaling not needed here
    struct TableBus {
        properties: HashMap<(String, String), Value>,
    }

    impl TableBus {
        fn in_test_mode() -> Self {
            let mut properties = HashMap::new();
            properties.insert(
                (
                    mtm_core::constants::bus::SPECIAL_MODE_PATH.to_string(),
                    mtm_core::constants::bus::SPECIAL_MODE_PROPERTY.to_string(),
                ),
                Value::Byte(2),
            );
            properties.insert(
                (
                    mtm_core::led_path("power"),
                    mtm_core::constants::bus::LED_STATE_PROPERTY.to_string(),
                ),
                Value::Str("xyz.openbmc_project.Led.Physical.Action.Off".into()),
            );
            Self { properties }
        }
    }

    impl PlatformBus for TableBus {
        fn get_property(
            &mut self,
            _service: &str,
            path: &str,
            _interface: &str,
            property: &str,
        ) -> mtm_error::Result<Value> {
            self.properties
                .get(&(path.to_string(), property.to_string()))
                .cloned()
                .ok_or_else(|| MtmError::property_read(path, property, "no such property"))
        }

        fn set_property(
            &mut self,
            _service: &str,
            path: &str,
            _interface: &str,
            property: &str,
            value: Value,
        ) -> mtm_error::Result<()> {
            self.properties
                .insert((path.to_string(), property.to_string()), value);
            Ok(())
        }

        fn set_fan_control_enabled(&mut self, _enabled: bool) -> mtm_error::Result<()> {
            Ok(())
        }
    }

    fn peer() -> PeerCredentials {
        PeerCredentials {
            uid: 0,
            gid: 0,
            pid: 1,
        }
    }

    #[test]
    fn ping_and_version() {
        let mut engine = OverrideEngine::new(TableBus::in_test_mode(), &EngineConfig::default());
        let reply = dispatch_request(
            &mut engine,
            RequestEnvelope::with_id(Request::Ping, 5),
            peer(),
        );
        assert_eq!(reply.id, 5);
        match reply.response {
            Response::Ok(data) => assert_eq!(data.value.as_deref(), Some("pong")),
            Response::Error { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn set_then_get_round_trips_through_the_dispatcher() {
        let mut engine = OverrideEngine::new(TableBus::in_test_mode(), &EngineConfig::default());

        let reply = dispatch_request(
            &mut engine,
            RequestEnvelope::with_id(
                Request::SetSignal {
                    signal: 0x00, // PowerLed
                    instance: 0,
                    action: 1, // ForceAsserted
                    value: 0,
                },
                1,
            ),
            peer(),
        );
        match reply.response {
            Response::Ok(data) => assert_eq!(data.completion, Some(CompletionCode::Success)),
            Response::Error { .. } => panic!("expected ok"),
        }

        let reply = dispatch_request(
            &mut engine,
            RequestEnvelope::with_id(
                Request::GetSignal {
                    signal: 0x20, // PowerLed sampling ordinal
                    instance: 0,
                    action: 0,
                },
                2,
            ),
            peer(),
        );
        match reply.response {
            Response::Ok(data) => {
                assert_eq!(data.completion, Some(CompletionCode::Success));
                assert_eq!(data.signal.unwrap().sig_val, 1);
            }
            Response::Error { .. } => panic!("expected ok"),
        }
    }

    #[test]
    fn invalid_parameters_are_rejected_before_the_engine() {
        let mut engine = OverrideEngine::new(TableBus::in_test_mode(), &EngineConfig::default());
        let reply = dispatch_request(
            &mut engine,
            RequestEnvelope::with_id(
                Request::GetSignal {
                    signal: 0x77,
                    instance: 0,
                    action: 0,
                },
                3,
            ),
            peer(),
        );
        assert!(matches!(reply.response, Response::Error { .. }));
    }
}
