// src/render/mod.rs
//! Fixed-page rendering of the styled MD&A document.
//!
//! Rendering is delegated to an external converter. A failed conversion is not
//! fatal: callers keep the styled HTML instead.

use crate::utils::error::RenderError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const DEFAULT_WKHTMLTOPDF: &str = "wkhtmltopdf";
const PAGE_MARGIN: &str = "0.75in";

pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;
    fn render(&self, document: &str, output: &Path) -> Result<(), RenderError>;
}

/// Pipes the document through `wkhtmltopdf` (A4, 0.75in margins).
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    binary: PathBuf,
}

impl WkhtmltopdfRenderer {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self { binary: binary.into() }
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--quiet", "--page-size", "A4", "--encoding", "UTF-8"])
            .args(["--margin-top", PAGE_MARGIN, "--margin-right", PAGE_MARGIN])
            .args(["--margin-bottom", PAGE_MARGIN, "--margin-left", PAGE_MARGIN])
            .args(["--no-images", "--disable-javascript", "--no-outline"])
            .args(["--load-error-handling", "ignore", "--load-media-error-handling", "ignore"])
            .arg("-") // document on stdin
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for WkhtmltopdfRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WKHTMLTOPDF)
    }
}

impl Renderer for WkhtmltopdfRenderer {
    fn name(&self) -> &str {
        "wkhtmltopdf"
    }

    fn render(&self, document: &str, output: &Path) -> Result<(), RenderError> {
        let mut cmd = self.command(output);
        tracing::debug!("Renderer command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(RenderError::Spawn)?;
        // The child is reaped even when it stops reading early; stdin closes at the end of the match.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(document.as_bytes()),
            None => Ok(()),
        };
        let result = child.wait_with_output()?;

        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(())
    }
}
