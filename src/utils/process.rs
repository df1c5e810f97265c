//! Child process helpers
//!
//! One-shot subprocess invocation with optional stdin payload and a hard
//! timeout. Used by the interpreter probe, the pip installer and the script
//! worker.

use std::io;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Run `program args...`, feed `input` to stdin, collect stdout/stderr.
/// The child is killed if the timeout elapses.
pub async fn run_with_input(
    program: &str,
    args: &[&str],
    input: Option<&[u8]>,
    limit: Duration,
) -> io::Result<Output> {
    debug!("Running command: {} ({} args)", program, args.len());

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(bytes), Some(mut stdin)) = (input, stdin) {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), io::Error>(())
    };
    // Stdin is fed while output is drained, both under the deadline
    let run = async move {
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        match fed {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
            _ => output,
        }
    };

    match timeout(limit, run).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", program, limit),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let res = run_with_input("definitely-not-a-real-binary-xyz", &[], None, Duration::from_secs(5)).await;
        assert!(res.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_roundtrip() {
        let out = run_with_input("cat", &[], Some(b"hello"), Duration::from_secs(5))
            .await
            .expect("cat should run");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        // More than a pipe buffer, to a child that never reads it
        let payload = vec![b'x'; 4 * 1024 * 1024];
        let started = std::time::Instant::now();
        let res = run_with_input("sleep", &["30"], Some(&payload), Duration::from_millis(300)).await;

        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_echo_does_not_deadlock() {
        let payload = vec![b'y'; 1024 * 1024];
        let out = run_with_input("cat", &[], Some(&payload), Duration::from_secs(10))
            .await
            .expect("cat should run");
        assert_eq!(out.stdout.len(), payload.len());
    }
}
