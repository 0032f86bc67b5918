//! Formatting of generated files
//!
//! gofumpt is required to succeed. prettier and rustfmt are best effort.

use crate::error::{ProtogenError, ProtogenResult};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const GOFUMPT_ATTEMPTS: u32 = 3;
const GOFUMPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// gofumpt can race with the final flush of a freshly written file
const TRANSIENT_MARKER: &str = "changed during reading";

/// Outcome of one formatter attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Ok,
    Transient(String),
    Failed(String),
}

/// Run `attempt` until it succeeds, fails hard, or runs out of attempts.
///
/// Returns the last error output on failure.
pub async fn retry_transient<F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut attempt: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut last = String::new();
    for n in 1..=max_attempts {
        if n > 1 {
            tokio::time::sleep(delay).await;
        }
        match attempt().await {
            Attempt::Ok => return Ok(()),
            Attempt::Failed(stderr) => return Err(stderr),
            Attempt::Transient(stderr) => {
                debug!("Transient formatter failure, attempt {}/{}", n, max_attempts);
                last = stderr;
            }
        }
    }
    Err(last)
}

/// Format generated files, given as project-relative paths
pub async fn format_generated(
    project_dir: &Path,
    tools_dir: &Path,
    files: &[String],
) -> ProtogenResult<()> {
    let by_suffix = |suffix: &str| -> Vec<String> {
        files.iter().filter(|f| f.ends_with(suffix)).cloned().collect()
    };

    let go_files = by_suffix(".pb.go");
    let gofumpt = tools_dir.join("bin").join("gofumpt");
    if !go_files.is_empty() && gofumpt.is_file() {
        info!("Formatting {} Go files", go_files.len());
        run_gofumpt(&gofumpt, project_dir, &go_files).await?;
    }

    let ts_files = by_suffix(".pb.ts");
    let prettier_config = tools_dir.join(".prettierrc.yaml");
    if !ts_files.is_empty() && prettier_config.is_file() {
        let mut args = vec![
            "--config".to_string(),
            prettier_config.to_string_lossy().into_owned(),
            "-w".to_string(),
        ];
        args.extend(ts_files);
        best_effort("prettier", &args, project_dir).await;
    }

    let rs_files = by_suffix(".pb.rs");
    if !rs_files.is_empty() && which::which("rustfmt").is_ok() {
        let mut args = vec!["--edition".to_string(), "2021".to_string()];
        args.extend(rs_files);
        best_effort("rustfmt", &args, project_dir).await;
    }

    Ok(())
}

async fn run_gofumpt(gofumpt: &Path, project_dir: &Path, files: &[String]) -> ProtogenResult<()> {
    let result = retry_transient(GOFUMPT_ATTEMPTS, GOFUMPT_RETRY_DELAY, || async move {
        let output = Command::new(gofumpt)
            .arg("-w")
            .args(files)
            .current_dir(project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => Attempt::Ok,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.contains(TRANSIENT_MARKER) {
                    Attempt::Transient(stderr)
                } else {
                    Attempt::Failed(stderr)
                }
            }
            Err(e) => Attempt::Failed(e.to_string()),
        }
    })
    .await;

    result.map_err(|stderr| ProtogenError::Formatter {
        tool: "gofumpt".to_string(),
        stderr,
    })
}

async fn best_effort(program: &str, args: &[String], project_dir: &Path) {
    debug!("Running {} on {} files", program, args.len());
    let output = Command::new(program)
        .args(args)
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {}
        Ok(output) => warn!(
            "{} failed (ignored): {}",
            program,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("{} unavailable (ignored): {}", program, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn transient_then_ok() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(3, Duration::ZERO, || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Attempt::Transient("size changed during reading".to_string())
            } else {
                Attempt::Ok
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hard_failure_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(3, Duration::ZERO, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Attempt::Failed("syntax error".to_string())
        })
        .await;
        assert_eq!(result.unwrap_err(), "syntax error");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_transient(3, Duration::ZERO, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Attempt::Transient("changed during reading".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn gofumpt_failure_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let bin = temp.path().join(".tools/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let gofumpt = bin.join("gofumpt");
        std::fs::write(&gofumpt, "#!/bin/sh\necho 'x.pb.go:1:1: expected package' >&2\nexit 2\n")
            .unwrap();
        std::fs::set_permissions(&gofumpt, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = format_generated(
            temp.path(),
            &temp.path().join(".tools"),
            &["x.pb.go".to_string()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProtogenError::Formatter { ref tool, .. } if tool == "gofumpt"));
    }

    #[tokio::test]
    async fn nothing_to_format() {
        let temp = tempfile::TempDir::new().unwrap();
        format_generated(temp.path(), &temp.path().join(".tools"), &["a.pb.ts".to_string()])
            .await
            .unwrap();
    }
}
