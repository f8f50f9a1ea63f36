use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::config::settings::ParserSettings;
use crate::engine::parser_client::classify_response;
use crate::model::parse_outcome::{ParseFailure, ParseResult};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("parser executable not found: {0}")]
    NotFound(String),

    #[error("failed to start parser '{executable}': {source}")]
    Spawn {
        executable: String,
        source: io::Error,
    },

    #[error("failed to reserve a local port: {0}")]
    Port(io::Error),

    #[error("parser exited before accepting connections ({0})")]
    ExitedEarly(ExitStatus),

    #[error("parser at {endpoint} not ready after {timeout:?}")]
    NotReady { endpoint: String, timeout: Duration },

    #[error("parser process I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Ask the OS for an unused port by binding `host:0` and releasing it.
///
/// Another process may claim the port before the parser binds it.
pub fn free_local_port(host: &str) -> io::Result<u16> {
    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}

/// A parser running in HTTP-server mode. Owns the child and stops it on drop.
pub struct ParserServer {
    child: Child,
    host: String,
    port: u16,
    stop_timeout: Duration,
    stopped: bool,
}

impl ParserServer {
    pub fn start(settings: &ParserSettings) -> Result<Self, ProcessError> {
        let port = free_local_port(&settings.host).map_err(ProcessError::Port)?;
        let args = settings.server_args_for(port);

        tracing::info!(executable = %settings.executable, port, "starting parser server");

        let child = Command::new(&settings.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&settings.executable, e))?;

        Ok(Self::attach(
            child,
            &settings.host,
            port,
            settings.stop_timeout(),
        ))
    }

    fn attach(mut child: Child, host: &str, port: u16, stop_timeout: Duration) -> Self {
        if let Some(stdout) = child.stdout.take() {
            drain_to_log(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            drain_to_log(stderr, "stderr");
        }

        Self {
            child,
            host: host.to_string(),
            port,
            stop_timeout,
            stopped: false,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Poll until the server accepts TCP connections.
    pub fn wait_ready(&mut self, timeout: Duration, poll: Duration) -> Result<(), ProcessError> {
        let endpoint = self.endpoint();
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(ProcessError::ExitedEarly(status));
            }

            if addrs
                .iter()
                .any(|addr| TcpStream::connect_timeout(addr, poll).is_ok())
            {
                tracing::debug!(%endpoint, "parser server is accepting connections");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ProcessError::NotReady { endpoint, timeout });
            }
            thread::sleep(poll);
        }
    }

    /// Terminate the server. A no-op once the process has exited.
    pub fn stop(&mut self) -> Result<(), ProcessError> {
        if self.stopped {
            return Ok(());
        }
        if self.child.try_wait()?.is_some() {
            self.stopped = true;
            return Ok(());
        }

        tracing::debug!(pid = self.child.id(), "stopping parser server");
        self.terminate();

        if self.child.wait_timeout(self.stop_timeout)?.is_none() {
            tracing::warn!(
                pid = self.child.id(),
                "parser ignored termination for {:?}, killing",
                self.stop_timeout
            );
            if let Err(e) = self.child.kill() {
                // InvalidInput means it exited in the meantime
                if e.kind() != io::ErrorKind::InvalidInput {
                    return Err(e.into());
                }
            }
            self.child.wait()?;
        }

        self.stopped = true;
        Ok(())
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        let Ok(pid) = libc::pid_t::try_from(self.child.id()) else {
            let _ = self.child.kill();
            return;
        };
        // SAFETY: the pid belongs to our un-reaped child, so it cannot have been recycled.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            let _ = self.child.kill();
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.kill();
    }
}

impl Drop for ParserServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("failed to stop parser server: {}", e);
        }
    }
}

fn spawn_error(executable: &str, e: io::Error) -> ProcessError {
    if e.kind() == io::ErrorKind::NotFound {
        ProcessError::NotFound(executable.to_string())
    } else {
        ProcessError::Spawn {
            executable: executable.to_string(),
            source: e,
        }
    }
}

fn drain_to_log<R: Read + Send + 'static>(pipe: R, stream: &'static str) {
    thread::spawn(move || {
        for line in BufReader::new(pipe).lines().map_while(Result::ok) {
            tracing::debug!(target: "ape", stream, "{}", line);
        }
    });
}

/// Run the parser once with `sentence` on stdin and classify what it prints.
pub fn run_oneshot(settings: &ParserSettings, sentence: &str) -> ParseResult {
    let mut child = Command::new(&settings.executable)
        .args(&settings.oneshot_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ParseFailure::BinaryNotFound(settings.executable.clone()),
            _ => ParseFailure::Other(format!("failed to start {}: {}", settings.executable, e)),
        })?;

    let stdout = child.stdout.take().map(collect_pipe);
    let stderr = child.stderr.take().map(collect_pipe);

    // Written off-thread so a child that never reads cannot stall the timeout.
    let writer = child.stdin.take().map(|stdin| feed_pipe(stdin, sentence.to_string()));

    let status = match child.wait_timeout(settings.request_timeout()) {
        Ok(Some(status)) => status,
        Ok(None) => {
            tracing::warn!(
                "parser exceeded {} seconds, killing",
                settings.request_timeout_secs
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(ParseFailure::Timeout);
        }
        Err(e) => {
            let _ = child.kill();
            return Err(ParseFailure::Other(e.to_string()));
        }
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let stdout = join_pipe(stdout);
    let stderr = join_pipe(stderr);

    if !status.success() {
        return Err(ParseFailure::ExitStatus {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    classify_response(&stdout)
}

fn feed_pipe<W: Write + Send + 'static>(mut pipe: W, text: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if let Err(e) = pipe.write_all(text.as_bytes()) {
            tracing::debug!("parser closed stdin early: {}", e);
        }
    })
}

fn collect_pipe<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_pipe(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn_server(program: &str, args: &[&str], stop_timeout: Duration) -> ParserServer {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        ParserServer::attach(child, "127.0.0.1", 0, stop_timeout)
    }

    fn running(server: &mut ParserServer) -> bool {
        matches!(server.child.try_wait(), Ok(None))
    }

    fn pid_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    fn oneshot_settings(executable: &str, args: &[&str]) -> ParserSettings {
        ParserSettings {
            executable: executable.into(),
            oneshot_args: args.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[test]
    fn free_port_is_bindable() {
        let port = free_local_port("127.0.0.1").unwrap();
        assert_ne!(port, 0);
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }

    #[test]
    fn stop_on_exited_process_is_noop() {
        let mut server = spawn_server("true", &[], Duration::from_secs(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        while running(&mut server) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        server.stop().unwrap();
        server.stop().unwrap();
        assert!(!running(&mut server));
    }

    #[test]
    fn stop_terminates_live_process() {
        let mut server = spawn_server("sleep", &["30"], Duration::from_secs(5));
        assert!(running(&mut server));

        let started = Instant::now();
        server.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!running(&mut server));
    }

    #[test]
    fn stop_escalates_when_term_is_ignored() {
        let mut server = spawn_server(
            "sh",
            &["-c", "trap '' TERM; while true; do sleep 1; done"],
            Duration::from_millis(300),
        );
        thread::sleep(Duration::from_millis(100));

        server.stop().unwrap();
        assert!(!running(&mut server));
    }

    #[test]
    fn drop_releases_the_process() {
        let server = spawn_server("sleep", &["30"], Duration::from_secs(5));
        let pid = server.child.id();
        assert!(pid_alive(pid));

        drop(server);
        assert!(!pid_alive(pid));
    }

    #[test]
    fn wait_ready_succeeds_once_port_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut server = spawn_server("sleep", &["30"], Duration::from_secs(5));
        server.port = port;

        server
            .wait_ready(Duration::from_secs(2), Duration::from_millis(20))
            .unwrap();
        assert_eq!(server.endpoint(), format!("127.0.0.1:{}", port));
    }

    #[test]
    fn wait_ready_times_out_without_listener() {
        let settings = ParserSettings {
            executable: "sleep".into(),
            server_args: vec!["30".into()],
            ..Default::default()
        };
        let mut server = ParserServer::start(&settings).unwrap();

        let err = server
            .wait_ready(Duration::from_millis(200), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotReady { .. }), "{:?}", err);
    }

    #[test]
    fn wait_ready_reports_early_exit() {
        let settings = ParserSettings {
            executable: "false".into(),
            server_args: vec![],
            ..Default::default()
        };
        let mut server = ParserServer::start(&settings).unwrap();

        let err = server
            .wait_ready(Duration::from_secs(5), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, ProcessError::ExitedEarly(_)), "{:?}", err);
    }

    #[test]
    fn start_with_missing_binary_fails() {
        let settings = ParserSettings {
            executable: "/nonexistent/ape.exe".into(),
            ..Default::default()
        };
        assert!(matches!(
            ParserServer::start(&settings),
            Err(ProcessError::NotFound(_))
        ));
    }

    #[test]
    fn oneshot_classifies_stdout() {
        let settings = oneshot_settings("cat", &[]);
        assert_eq!(
            run_oneshot(&settings, "exists x (report(x)).\n"),
            Ok("exists x (report(x)).".to_string())
        );
    }

    #[test]
    fn oneshot_reports_missing_binary() {
        let settings = oneshot_settings("/nonexistent/ace", &[]);
        assert_eq!(
            run_oneshot(&settings, "Alice writes."),
            Err(ParseFailure::BinaryNotFound("/nonexistent/ace".into()))
        );
    }

    #[test]
    fn oneshot_reports_exit_status() {
        let settings = oneshot_settings("sh", &["-c", "echo oops >&2; exit 3"]);
        assert_eq!(
            run_oneshot(&settings, "Alice writes."),
            Err(ParseFailure::ExitStatus {
                code: Some(3),
                stderr: "oops".into()
            })
        );
    }

    #[test]
    fn oneshot_timeout_holds_when_child_ignores_large_stdin() {
        let settings = oneshot_settings("sleep", &["10"]);
        let sentence = "Alice writes a report. ".repeat(64 * 1024);

        let started = Instant::now();
        assert_eq!(run_oneshot(&settings, &sentence), Err(ParseFailure::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn oneshot_times_out() {
        let settings = oneshot_settings("sleep", &["10"]);
        assert_eq!(
            run_oneshot(&settings, "Alice writes."),
            Err(ParseFailure::Timeout)
        );
    }
}
