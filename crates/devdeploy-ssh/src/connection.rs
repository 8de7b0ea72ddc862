//! SSH connection management

use crate::ConnectionError;
use ssh2::Session;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SSH configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote hostname or IP
    pub host: String,
    /// Remote port (default: 22)
    pub port: u16,
    /// Username
    pub username: String,
    /// Password used for keyboard-less password authentication
    pub password: String,
    /// Timeout for the initial TCP connect
    pub connect_timeout: Duration,
    /// Timeout applied to every socket operation after connecting
    pub session_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            username: "root".to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(3),
            session_timeout: Duration::from_secs(10),
        }
    }
}

impl SshConfig {
    /// `host:port` form used in log lines and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Remote hostname or IP
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Username
    pub username: String,
}

/// An authenticated SSH session to one host
///
/// Created by [`authenticate`] and owned by whoever drives the deployment;
/// every remote operation borrows it explicitly.
pub struct RemoteSession {
    session: Session,
    info: ConnectionInfo,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession").field("info", &self.info).finish()
    }
}

impl RemoteSession {
    /// Connection information for this session
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Borrow the underlying libssh2 session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Close the session
    pub fn disconnect(self) {
        debug!("Closing SSH session to {}:{}", self.info.host, self.info.port);
        if let Err(e) = self.session.disconnect(None, "Deployment finished", None) {
            warn!("Failed to disconnect cleanly: {}", e);
        }
    }
}

/// Check that the SSH client library can be initialised
pub fn probe_capability() -> Result<(), ssh2::Error> {
    Session::new().map(|_| ())
}

/// Open a TCP connection to `host:port` within `timeout`
///
/// Every resolved address is tried in order; the error from the last one is
/// reported.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let addr = format!("{}:{}", host, port);
    info!("Connecting to {}", addr);

    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ConnectionError::Unreachable {
            addr: addr.clone(),
            source,
        })?
        .collect();

    let mut last_error = None;
    for candidate in candidates {
        debug!("Trying {}", candidate);
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                info!("Connected to {}", addr);
                return Ok(stream);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                last_error = Some(ConnectionError::Timeout { addr: addr.clone() });
            }
            Err(source) => {
                last_error = Some(ConnectionError::Unreachable {
                    addr: addr.clone(),
                    source,
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ConnectionError::Unreachable {
        addr,
        source: io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"),
    }))
}

/// Run the SSH handshake over `stream` and log in with a password
///
/// `session_timeout` bounds every subsequent blocking operation on the
/// session. Handshake and credential failures are both reported as
/// [`ConnectionError::AuthFailed`].
pub fn authenticate(
    stream: TcpStream,
    username: &str,
    password: &str,
    session_timeout: Duration,
) -> Result<RemoteSession, ConnectionError> {
    info!("Logging in as user {}", username);

    let auth_failed = |source: ssh2::Error| ConnectionError::AuthFailed {
        user: username.to_string(),
        source,
    };

    let info = ConnectionInfo {
        host: stream
            .peer_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default(),
        port: stream.peer_addr().map(|a| a.port()).unwrap_or_default(),
        username: username.to_string(),
    };

    // Socket timeouts keep a silent peer from blocking the handshake forever.
    // A zero duration is rejected here rather than disabling the timeout.
    let socket_setup = |source: io::Error| ConnectionError::SocketSetup {
        addr: format!("{}:{}", info.host, info.port),
        source,
    };
    stream
        .set_read_timeout(Some(session_timeout))
        .map_err(socket_setup)?;
    stream
        .set_write_timeout(Some(session_timeout))
        .map_err(socket_setup)?;

    let mut session = Session::new().map_err(auth_failed)?;
    session.set_timeout(u32::try_from(session_timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(stream);
    session.handshake().map_err(auth_failed)?;
    session
        .userauth_password(username, password)
        .map_err(auth_failed)?;

    if !session.authenticated() {
        // LIBSSH2_ERROR_AUTHENTICATION_FAILED
        return Err(auth_failed(ssh2::Error::new(
            ssh2::ErrorCode::Session(-18),
            "server did not accept the credentials",
        )));
    }

    info!("Logged in successfully");
    Ok(RemoteSession { session, info })
}

/// Connect and authenticate in one step
pub fn open_session(config: &SshConfig) -> Result<RemoteSession, ConnectionError> {
    let stream = connect(&config.host, config.port, config.connect_timeout)?;
    authenticate(
        stream,
        &config.username,
        &config.password,
        config.session_timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_ssh_config_default() {
        let config = SshConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "root");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.session_timeout, Duration::from_secs(10));
        assert_eq!(config.address(), "localhost:22");
    }

    #[test]
    fn test_connect_refused_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect("127.0.0.1", port, Duration::from_secs(1));
        assert!(matches!(result, Err(ConnectionError::Unreachable { .. })));
    }

    #[test]
    fn test_connect_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port, Duration::from_secs(1));
        assert!(stream.is_ok());
    }

    #[test]
    fn test_handshake_with_non_ssh_peer_is_auth_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let _ = socket.write_all(b"this is not an ssh server\r\n");
            }
        });

        let stream = connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let result = authenticate(stream, "robot", "secret", Duration::from_secs(2));
        match result {
            Err(ConnectionError::AuthFailed { user, .. }) => assert_eq!(user, "robot"),
            other => panic!("expected AuthFailed, got {:?}", other),
        }

        server.join().unwrap();
    }

    #[test]
    fn test_zero_session_timeout_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        let result = authenticate(stream, "robot", "secret", Duration::ZERO);
        match result {
            Err(ConnectionError::SocketSetup { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port));
            }
            other => panic!("expected SocketSetup, got {:?}", other),
        }
    }
}
