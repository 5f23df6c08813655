//! Vendor bridge over Unix sockets
//!
//! Uses length-prefixed JSON over Unix domain sockets. The client connects
//! per call, so a bridge that is not running shows up as an unavailable
//! service rather than a stale connection.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{HalError, HalRequest, HalResponse, HalStatus, VendorHal};
use crate::constants::{ipc::MAX_MESSAGE_SIZE, status};

/// Client side of the vendor bridge
#[derive(Debug, Clone)]
pub struct SocketHal {
    path: PathBuf,
}

impl SocketHal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn call(&self, request: &HalRequest) -> Result<HalResponse, HalError> {
        let mut stream = UnixStream::connect(&self.path)
            .map_err(|e| HalError::Unavailable(format!("{}: {e}", self.path.display())))?;
        write_message(&mut stream, request).map_err(|e| HalError::Transport(format!("{e:#}")))?;
        read_message(&mut stream).map_err(|e| HalError::Transport(format!("{e:#}")))
    }
}

impl VendorHal for SocketHal {
    fn ext_cmd(&self, enrollment_id: i32, enable: i32) -> Result<(), HalError> {
        match self.call(&HalRequest::ExtCmd { enrollment_id, enable })? {
            HalResponse::Ack => Ok(()),
            HalResponse::Error(msg) => Err(HalError::Unavailable(msg)),
            other => Err(HalError::Protocol(format!("{other:?}"))),
        }
    }

    fn set_touch_mode(&self, group: i32, feature: i32, value: i32) -> Result<HalStatus, HalError> {
        match self.call(&HalRequest::SetTouchMode { group, feature, value })? {
            HalResponse::Status(code) => Ok(code),
            HalResponse::Error(msg) => Err(HalError::Unavailable(msg)),
            other => Err(HalError::Protocol(format!("{other:?}"))),
        }
    }
}

/// Bridge-side request handling
pub trait HalHandler {
    fn handle(&self, request: HalRequest) -> HalResponse;
}

/// Bridge that logs each command and reports success
#[derive(Debug, Default)]
pub struct StubHandler;

impl HalHandler for StubHandler {
    fn handle(&self, request: HalRequest) -> HalResponse {
        match request {
            HalRequest::ExtCmd { enrollment_id, enable } => {
                info!(enrollment_id = enrollment_id, enable = enable, "extCmd");
                HalResponse::Ack
            }
            HalRequest::SetTouchMode { group, feature, value } => {
                info!(group = group, feature = feature, value = value, "setTouchMode");
                HalResponse::Status(status::OK)
            }
        }
    }
}

/// Server listener for the vendor bridge
pub struct HalServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl HalServer {
    /// Listen at `socket_path`, replacing whatever socket a previous bridge left behind
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(dir) = socket_path.parent() {
            fs::create_dir_all(dir)
                .context(format!("Failed to create bridge socket dir {}", dir.display()))?;
        }
        match fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "Removed leftover bridge socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("Failed to clear {}", socket_path.display()));
            }
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to listen on {}", socket_path.display()))?;
        fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o700))
            .context(format!("Failed to restrict {} to its owner", socket_path.display()))?;

        Ok(Self { listener, socket_path })
    }

    /// Block until the next client connects
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()
            .context("Failed to accept vendor bridge connection")?;
        Ok(stream)
    }

    /// Serve connections one at a time until accepting fails
    pub fn serve(&self, handler: &dyn HalHandler) -> Result<()> {
        info!(path = %self.socket_path.display(), "Vendor bridge listening");
        loop {
            let stream = self.accept()?;
            if let Err(e) = serve_connection(stream, handler) {
                warn!(error = ?e, "Vendor bridge connection failed");
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for HalServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.socket_path);
    }
}

/// Answer requests on one connection until the peer hangs up
pub fn serve_connection(mut stream: UnixStream, handler: &dyn HalHandler) -> Result<()> {
    loop {
        let request: HalRequest = match read_message(&mut stream) {
            Ok(request) => request,
            Err(e) if is_disconnect(&e) => {
                debug!("Vendor bridge client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let response = handler.handle(request);
        write_message(&mut stream, &response)?;
    }
}

fn is_disconnect(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::UnexpectedEof)
}

/// Frame: payload length as u32 LE, then the JSON payload
fn write_message<T: Serialize>(stream: &mut impl Write, msg: &T) -> Result<()> {
    let payload = serde_json::to_vec(msg).context("Failed to encode bridge message")?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Bridge message of {} bytes exceeds {MAX_MESSAGE_SIZE}", payload.len()));
    }
    let header = (payload.len() as u32).to_le_bytes();

    stream.write_all(&header).context("Failed to send bridge frame header")?;
    stream.write_all(&payload).context("Failed to send bridge frame payload")?;
    stream.flush().context("Failed to flush bridge stream")
}

fn read_message<T: DeserializeOwned>(stream: &mut impl Read) -> Result<T> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).context("Failed to receive bridge frame header")?;
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Bridge frame of {len} bytes exceeds {MAX_MESSAGE_SIZE}"));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).context("Failed to receive bridge frame payload")?;
    serde_json::from_slice(&payload).context("Failed to decode bridge message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::tempdir;

    struct ScriptedHandler {
        seen: Arc<Mutex<Vec<HalRequest>>>,
        touch_status: HalStatus,
    }

    impl HalHandler for ScriptedHandler {
        fn handle(&self, request: HalRequest) -> HalResponse {
            self.seen.lock().unwrap().push(request.clone());
            match request {
                HalRequest::ExtCmd { .. } => HalResponse::Ack,
                HalRequest::SetTouchMode { .. } => HalResponse::Status(self.touch_status),
            }
        }
    }

    #[test]
    fn test_client_talks_to_server() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hal.sock");
        let server = HalServer::bind_to(path.clone()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = ScriptedHandler { seen: seen.clone(), touch_status: 5 };

        let worker = thread::spawn(move || {
            // One connection per client call
            for _ in 0..2 {
                let stream = server.accept().unwrap();
                serve_connection(stream, &handler).unwrap();
            }
        });

        let client = SocketHal::new(path);
        client.ext_cmd(4, 1).unwrap();
        assert_eq!(client.set_touch_mode(0, 10, 1).unwrap(), 5);
        worker.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                HalRequest::ExtCmd { enrollment_id: 4, enable: 1 },
                HalRequest::SetTouchMode { group: 0, feature: 10, value: 1 },
            ]
        );
    }

    #[test]
    fn test_missing_bridge_is_unavailable() {
        let dir = tempdir().unwrap();
        let client = SocketHal::new(dir.path().join("hal.sock"));
        assert!(matches!(client.set_touch_mode(0, 10, 0), Err(HalError::Unavailable(_))));
        assert!(matches!(client.ext_cmd(4, 0), Err(HalError::Unavailable(_))));
    }

    #[test]
    fn test_server_removes_socket_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hal.sock");
        let server = HalServer::bind_to(path.clone()).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());
        let result: Result<HalRequest> = read_message(&mut Cursor::new(buf));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_outgoing_message_not_written() {
        let mut sink = Vec::new();
        let response = HalResponse::Error("x".repeat(MAX_MESSAGE_SIZE));
        assert!(write_message(&mut sink, &response).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_truncated_stream_reads_as_disconnect() {
        let result: Result<HalRequest> = read_message(&mut Cursor::new(Vec::new()));
        assert!(is_disconnect(&result.unwrap_err()));
    }

    #[test]
    fn test_stub_handler_reports_success() {
        let handler = StubHandler;
        assert_eq!(
            handler.handle(HalRequest::SetTouchMode { group: 0, feature: 10, value: 1 }),
            HalResponse::Status(0)
        );
        assert_eq!(
            handler.handle(HalRequest::ExtCmd { enrollment_id: 4, enable: 0 }),
            HalResponse::Ack
        );
    }
}
