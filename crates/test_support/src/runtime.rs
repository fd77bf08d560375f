//! Container-runtime discovery for the integration suite.
//!
//! testcontainers speaks the Docker API over a unix socket. On developer
//! machines that socket is often Podman's, so discovery tries, in order:
//! an explicit `DOCKER_HOST`, the default Docker socket, any existing
//! Podman socket, and finally a Podman service spawned on the fly.

use anyhow::{Result, bail};
use std::{
    env, fs,
    io::Read,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    process::{ChildStderr, Command, Stdio},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

const SOCKET_WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Make sure testcontainers has a socket to talk to.
///
/// Discovery runs once per process; later calls replay the first outcome.
/// When a Podman socket wins, `DOCKER_HOST` is exported so testcontainers
/// picks it up.
///
/// # Errors
/// Returns an error describing every probe that failed when no runtime
/// socket could be found or started.
pub fn ensure_container_runtime() -> Result<()> {
    static OUTCOME: OnceLock<Result<(), String>> = OnceLock::new();
    match OUTCOME.get_or_init(|| {
        discover().map(|socket| {
            if let Some(path) = socket {
                // Exported exactly once, before the first container starts.
                env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
            }
        })
    }) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

/// Find a usable runtime socket. `Ok(None)` means the default Docker
/// socket works as-is; `Ok(Some(path))` names a Podman socket to export.
fn discover() -> Result<Option<PathBuf>, String> {
    if let Ok(endpoint) = env::var("DOCKER_HOST") {
        return check_explicit_endpoint(&endpoint).map(|()| None);
    }

    let mut failures: Vec<String> = Vec::new();

    let docker = Path::new("/var/run/docker.sock");
    if docker.exists() {
        if await_socket(docker, SOCKET_WAIT) {
            return Ok(None);
        }
        let mut note = format!("`{}` exists but refused the connection.", docker.display());
        if let Some(detail) = daemon_diagnostic("docker") {
            note.push_str(&format!(" docker info: {detail}."));
        }
        note.push_str(" Start the Docker daemon or set `DOCKER_HOST`.");
        failures.push(note);
    }

    if let Some(path) = existing_podman_socket() {
        if await_socket(&path, SOCKET_WAIT) {
            return Ok(Some(path));
        }
        let mut note = format!("`{}` exists but refused the connection.", path.display());
        if let Some(detail) = daemon_diagnostic("podman") {
            note.push_str(&format!(" podman info: {detail}."));
        }
        note.push_str(" Start `podman.socket` or run `podman system service`.");
        return Err(note);
    }

    match spawn_podman_service() {
        Ok(Some(path)) => return Ok(Some(path)),
        Ok(None) => {} // no podman binary on this host
        Err(err) => failures.push(err),
    }

    let mut parts = vec![
        "no container runtime socket found or reachable".to_string(),
        "start `podman.socket`, run `podman system service`, or set `DOCKER_HOST` \
         (for example: unix:///run/user/<uid>/podman/podman.sock)"
            .to_string(),
    ];
    parts.extend(failures);
    if env::var("GITHUB_ACTIONS").is_ok() {
        parts.push(
            "GitHub Actions: ensure Docker is installed and running (container jobs must \
             mount `/var/run/docker.sock`)"
                .to_string(),
        );
    }
    Err(parts.join(". "))
}

fn check_explicit_endpoint(endpoint: &str) -> Result<(), String> {
    let socket = match endpoint.split_once("://") {
        Some(("unix", path)) => path,
        // Remote daemons (tcp, ssh) cannot be probed locally; trust them.
        Some(_) => return Ok(()),
        None if endpoint.starts_with('/') => endpoint,
        None => return Ok(()),
    };

    if await_socket(Path::new(socket), SOCKET_WAIT) {
        Ok(())
    } else {
        Err(format!(
            "`DOCKER_HOST` points at `{endpoint}` but nothing answers there. Start the \
             daemon that owns the socket or unset the variable."
        ))
    }
}

fn existing_podman_socket() -> Option<PathBuf> {
    let user_candidates = env::var("XDG_RUNTIME_DIR")
        .ok()
        .map(|dir| PathBuf::from(dir).join("podman/podman.sock"))
        .into_iter()
        .chain(
            current_uid().map(|uid| PathBuf::from(format!("/run/user/{uid}/podman/podman.sock"))),
        );

    user_candidates
        .chain([
            PathBuf::from("/var/run/podman/podman.sock"),
            PathBuf::from("/run/podman/podman.sock"),
        ])
        .find(|path| path.exists())
}

fn can_connect(path: &Path) -> bool {
    path.exists() && UnixStream::connect(path).is_ok()
}

fn await_socket(path: &Path, patience: Duration) -> bool {
    let deadline = Instant::now() + patience;
    loop {
        if can_connect(path) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Ask the runtime itself why it is unhealthy via `<binary> info`.
fn daemon_diagnostic(binary: &str) -> Option<String> {
    let output = match Command::new(binary).arg("info").output() {
        Ok(output) => output,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => return Some(err.to_string()),
    };
    if output.status.success() {
        return None;
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Some(format!("`{binary} info` exited with {}", output.status))
    } else {
        Some(stderr)
    }
}

/// Launch `podman system service` on a private socket.
///
/// `Ok(None)` means podman is not installed. On success the service child
/// is left running (reaped by a detached thread) and the socket path is
/// returned ready for use.
fn spawn_podman_service() -> Result<Option<PathBuf>, String> {
    let socket = env::temp_dir().join(format!("reklamo-podman-{}.sock", std::process::id()));
    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }

    let endpoint = format!("unix://{}", socket.display());
    let mut child = match Command::new("podman")
        .args(["system", "service", "--time=300", &endpoint])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(format!("could not launch podman system service: {err}")),
    };

    let deadline = Instant::now() + SOCKET_WAIT;
    while Instant::now() < deadline {
        if can_connect(&socket) {
            thread::spawn(move || {
                let _ = child.wait();
            });
            return Ok(Some(socket));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let mut message = format!("podman system service exited with {status}");
                if let Some(ref mut pipe) = child.stderr {
                    let captured = drain_stderr(pipe);
                    if !captured.is_empty() {
                        message.push_str(&format!(": {captured}"));
                    }
                }
                return Err(message);
            }
            Ok(None) => {}
            Err(err) => return Err(format!("could not poll podman system service: {err}")),
        }
        thread::sleep(POLL_INTERVAL);
    }

    let _ = child.kill();
    let _ = child.wait();
    Err("podman system service never opened its socket".to_string())
}

fn drain_stderr(pipe: &mut ChildStderr) -> String {
    let mut captured = String::new();
    let _ = pipe.read_to_string(&mut captured);
    captured.trim().to_string()
}

fn current_uid() -> Option<u32> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}
