//! SSH implementation of the remote command channel
//!
//! libssh2 is blocking, so every session operation runs on Tokio's blocking
//! pool. Each command opens its own exec channel on the shared session.

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ssh2::Session;
use tracing::{debug, info, warn};

use super::channel::{
    ChannelConnector, CommandOutput, ConnectionError, ExecutionError, RemoteChannel, SshTarget,
};

/// Extra time the async side waits for a blocking command to honour its own deadline
const BLOCKING_GRACE: Duration = Duration::from_secs(5);

/// Poll interval while a command produces no output
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Bytes kept per output stream; the rest is read and discarded
const STREAM_CAP_BYTES: usize = 32 * 1024;

/// Opens password-authenticated SSH sessions.
///
/// Host keys are accepted without verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl ChannelConnector for SshConnector {
    async fn open(
        &self,
        target: &SshTarget,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteChannel>, ConnectionError> {
        let target = target.clone();
        let session = tokio::task::spawn_blocking(move || connect_session(&target, connect_timeout))
            .await
            .map_err(|e| ConnectionError::Task(e.to_string()))??;

        Ok(Box::new(SshChannel::new(session)))
    }
}

/// An authenticated SSH session to one host
pub struct SshChannel {
    session: Arc<Mutex<Option<Session>>>,
}

impl SshChannel {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(Some(session))),
        }
    }

    fn current_session(&self) -> Result<Session, ExecutionError> {
        let guard = self
            .session
            .lock()
            .map_err(|_| ExecutionError::Ssh("session lock poisoned".to_string()))?;
        guard.as_ref().cloned().ok_or(ExecutionError::Closed)
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ExecutionError> {
        let session = self.current_session()?;
        let command_owned = command.to_string();

        let task = tokio::task::spawn_blocking(move || exec_blocking(&session, &command_owned, timeout));

        match tokio::time::timeout(timeout + BLOCKING_GRACE, task).await {
            Ok(joined) => joined.map_err(|e| ExecutionError::Task(e.to_string()))?,
            Err(_) => Err(ExecutionError::Timeout(timeout.as_secs())),
        }
    }

    async fn close(&self) {
        let taken = match self.session.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(session) = taken {
            let result = tokio::task::spawn_blocking(move || {
                session.disconnect(None, "diagnosis finished", None)
            })
            .await;
            match result {
                Ok(Ok(())) => debug!("SSH session closed"),
                Ok(Err(e)) => warn!(error = %e, "SSH disconnect reported an error"),
                Err(e) => warn!(error = %e, "SSH disconnect task failed"),
            }
        }
    }
}

/// Connect, handshake and authenticate, all bounded by `connect_timeout`
fn connect_session(target: &SshTarget, connect_timeout: Duration) -> Result<Session, ConnectionError> {
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|_| ConnectionError::Resolve {
            host: target.host.clone(),
            port: target.port,
        })?
        .collect();

    let mut last_error: Option<ConnectionError> = None;
    let mut tcp = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, connect_timeout) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(source) => {
                last_error = Some(ConnectionError::Tcp {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }
    let tcp = match tcp {
        Some(stream) => stream,
        None => {
            return Err(last_error.unwrap_or(ConnectionError::Resolve {
                host: target.host.clone(),
                port: target.port,
            }))
        }
    };

    let mut session = Session::new().map_err(|e| ConnectionError::Handshake(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(duration_millis(connect_timeout));
    session.handshake().map_err(|e| {
        if is_timeout(&e) {
            ConnectionError::Timeout(connect_timeout.as_secs())
        } else {
            ConnectionError::Handshake(e.to_string())
        }
    })?;

    session
        .userauth_password(&target.username, &target.password)
        .map_err(|e| auth_error(&e, &target.username, connect_timeout))?;
    if !session.authenticated() {
        return Err(ConnectionError::Auth(target.username.clone()));
    }

    info!(host = %target.host, port = target.port, user = %target.username, "SSH session established");
    Ok(session)
}

fn auth_error(err: &ssh2::Error, username: &str, connect_timeout: Duration) -> ConnectionError {
    if is_timeout(err) {
        ConnectionError::Timeout(connect_timeout.as_secs())
    } else {
        ConnectionError::Auth(username.to_string())
    }
}

/// Run one command to completion or until `timeout` elapses
fn exec_blocking(session: &Session, command: &str, timeout: Duration) -> Result<CommandOutput, ExecutionError> {
    let deadline = Instant::now() + timeout;
    let timeout_secs = timeout.as_secs();
    let map_err = |e: ssh2::Error| {
        if is_timeout(&e) {
            ExecutionError::Timeout(timeout_secs)
        } else {
            ExecutionError::Ssh(e.to_string())
        }
    };

    session.set_blocking(true);
    session.set_timeout(duration_millis(timeout));

    let mut channel = session.channel_session().map_err(map_err)?;
    channel.exec(command).map_err(map_err)?;

    // Poll both streams so a chatty stderr cannot stall stdout
    session.set_blocking(false);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];

    let polled = loop {
        let mut progressed = false;

        match channel.read(&mut buf) {
            Ok(n) if n > 0 => {
                append_capped(&mut stdout, &buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => break Err(ExecutionError::Ssh(format!("stdout read failed: {}", e))),
        }
        match channel.stderr().read(&mut buf) {
            Ok(n) if n > 0 => {
                append_capped(&mut stderr, &buf[..n]);
                progressed = true;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => break Err(ExecutionError::Ssh(format!("stderr read failed: {}", e))),
        }

        if channel.eof() {
            break Ok(());
        }
        if Instant::now() >= deadline {
            break Err(ExecutionError::Timeout(timeout_secs));
        }
        if !progressed {
            std::thread::sleep(IDLE_POLL);
        }
    };

    session.set_blocking(true);
    if let Err(e) = polled {
        let _ = channel.close();
        return Err(e);
    }

    // Drain whatever arrived together with EOF
    drain_capped(&mut channel, &mut stdout);
    drain_capped(&mut channel.stderr(), &mut stderr);
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().unwrap_or(-1);

    Ok(CommandOutput::from_streams(
        &String::from_utf8_lossy(&stdout),
        &String::from_utf8_lossy(&stderr),
        exit_code,
    ))
}

fn append_capped(buffer: &mut Vec<u8>, chunk: &[u8]) {
    let room = STREAM_CAP_BYTES.saturating_sub(buffer.len());
    buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

fn drain_capped<R: Read>(reader: &mut R, buffer: &mut Vec<u8>) {
    let mut buf = [0u8; 8192];
    while let Ok(n) = reader.read(&mut buf) {
        if n == 0 {
            break;
        }
        append_capped(buffer, &buf[..n]);
    }
}

fn is_timeout(err: &ssh2::Error) -> bool {
    // LIBSSH2_ERROR_TIMEOUT
    matches!(err.code(), ssh2::ErrorCode::Session(-9))
}

fn duration_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
