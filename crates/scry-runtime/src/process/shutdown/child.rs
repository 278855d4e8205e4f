//! SIGTERM → grace period → SIGKILL escalation for a spawned child.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
#[cfg(unix)]
use tokio::time::timeout;
use tracing::debug;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Stop a child gracefully, escalating to a forceful kill.
///
/// # Strategy
/// 1. Send SIGTERM and wait up to `grace` for the child to exit
/// 2. If still running, SIGKILL
/// 3. Reap the child so no zombie is left behind
///
/// On non-unix targets there is no graceful signal, so the child is killed
/// immediately and `grace` is unused.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    // Already reaped
    let Some(pid) = child.id() else {
        return child.wait().await;
    };

    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        // Exited between the id() check and the signal
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }

    debug!(pid, ?grace, "Grace period elapsed, sending SIGKILL");
    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;
    use tokio::time::{Instant, sleep};

    #[tokio::test]
    #[cfg(unix)]
    async fn sigterm_stops_a_cooperative_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep");

        let started = Instant::now();
        let status = shutdown_child(&mut child, Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn escalates_when_sigterm_is_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .spawn()
            .expect("failed to spawn sh");

        // Let the shell install its trap
        sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let status = shutdown_child(&mut child, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(!status.success());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn handles_already_exited_child() {
        let mut child = Command::new("echo")
            .arg("test")
            .spawn()
            .expect("failed to spawn echo");

        sleep(Duration::from_millis(100)).await;

        let result = shutdown_child(&mut child, Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }
}
