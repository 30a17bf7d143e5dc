// GNU AGPL v3 License

use crate::error::RemixError;
use std::{path::Path, process::Stdio};
use tokio::process::Command;

/// Lines of melt's stderr kept for error reports.
const STDERR_TAIL: usize = 20;

/// Run `melt` over an MLT document.
///
/// The document's consumer decides where the output is written.
pub(crate) async fn render(mlt_path: &Path) -> Result<(), RemixError> {
    let melt = which::which("melt").map_err(|_| RemixError::MeltNotFound)?;
    tracing::info!("Rendering {} with {}", mlt_path.display(), melt.display());

    let output = Command::new(&melt)
        .arg(mlt_path)
        .arg("-quiet")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!("melt: {}", line);
    }

    if output.status.success() {
        Ok(())
    } else {
        tracing::error!("melt exited with {}", output.status);
        Err(RemixError::RenderFailed {
            path: mlt_path.to_path_buf(),
            stderr: tail(&stderr, STDERR_TAIL),
        })
    }
}

fn tail(text: &str, lines: usize) -> Option<String> {
    let kept = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return None;
    }

    Some(kept[kept.len().saturating_sub(lines)..].join("\n"))
}
