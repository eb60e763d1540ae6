//! Render targets: isolated contexts that receive a composed document.
//!
//! ## Contract
//! - `open` starts a fresh document and discards anything staged before
//! - `write` appends to the staged document
//! - `close` publishes the staged document, fully replacing the previous one
//!
//! [`render`] drives one open/write/close cycle. A target that cannot be
//! reached reports [`LivepadError::RenderTargetUnavailable`]; callers turn
//! that into a notice and skip the pass.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use crate::compose::ComposedDocument;
use crate::error::{LivepadError, Result};

/// Full-document replace primitive.
pub trait RenderTarget: Send {
    fn open(&mut self) -> Result<()>;
    fn write(&mut self, chunk: &str) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Short name used in log lines.
    fn label(&self) -> &str {
        "target"
    }
}

/// Replace the whole content of `target` with `doc`.
pub fn render(target: &mut dyn RenderTarget, doc: &ComposedDocument) -> Result<()> {
    target.open()?;
    target.write(doc.as_str())?;
    target.close()
}

// ---------------------------------------------------------------------------
// MemoryTarget
// ---------------------------------------------------------------------------

/// Keeps the current document in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    staged: Option<String>,
    current: Option<String>,
    detached: bool,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Simulate the target going away; every operation fails until reattached.
    pub fn set_detached(&mut self, detached: bool) {
        self.detached = detached;
    }

    fn check(&self) -> Result<()> {
        if self.detached {
            return Err(LivepadError::RenderTargetUnavailable(
                "memory target detached".to_string(),
            ));
        }
        Ok(())
    }
}

impl RenderTarget for MemoryTarget {
    fn open(&mut self) -> Result<()> {
        self.check()?;
        self.staged = Some(String::new());
        Ok(())
    }

    fn write(&mut self, chunk: &str) -> Result<()> {
        self.check()?;
        match self.staged.as_mut() {
            Some(buf) => {
                buf.push_str(chunk);
                Ok(())
            }
            None => Err(LivepadError::RenderTargetUnavailable(
                "write before open".to_string(),
            )),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.check()?;
        match self.staged.take() {
            Some(doc) => {
                self.current = Some(doc);
                Ok(())
            }
            None => Err(LivepadError::RenderTargetUnavailable(
                "close before open".to_string(),
            )),
        }
    }

    fn label(&self) -> &str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// ChannelTarget
// ---------------------------------------------------------------------------

/// Publishes each finished document to the browser views of a session.
///
/// Every close sends one `render` message carrying the full document and a
/// sequence number; a view replaces its sandboxed iframe with it.
pub struct ChannelTarget {
    tx: broadcast::Sender<serde_json::Value>,
    staged: Option<String>,
    seq: u64,
}

impl ChannelTarget {
    pub fn new(tx: broadcast::Sender<serde_json::Value>) -> Self {
        Self {
            tx,
            staged: None,
            seq: 0,
        }
    }

    /// Sequence number of the last published document.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl RenderTarget for ChannelTarget {
    fn open(&mut self) -> Result<()> {
        if self.tx.receiver_count() == 0 {
            return Err(LivepadError::RenderTargetUnavailable(
                "no preview attached".to_string(),
            ));
        }
        self.staged = Some(String::new());
        Ok(())
    }

    fn write(&mut self, chunk: &str) -> Result<()> {
        self.staged
            .as_mut()
            .ok_or_else(|| LivepadError::RenderTargetUnavailable("write before open".to_string()))?
            .push_str(chunk);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let doc = self
            .staged
            .take()
            .ok_or_else(|| LivepadError::RenderTargetUnavailable("close before open".to_string()))?;
        let seq = self.seq + 1;
        let msg = serde_json::json!({
            "type": "render",
            "seq": seq,
            "document": doc,
        });
        self.tx
            .send(msg)
            .map_err(|_| LivepadError::RenderTargetUnavailable("preview detached".to_string()))?;
        self.seq = seq;
        Ok(())
    }

    fn label(&self) -> &str {
        "channel"
    }
}

// ---------------------------------------------------------------------------
// FileTarget
// ---------------------------------------------------------------------------

/// Writes the document to a file, swapping it in atomically on close.
#[derive(Debug)]
pub struct FileTarget {
    path: PathBuf,
    staging: PathBuf,
    file: Option<fs::File>,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: PathBuf::from(staging),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, e: std::io::Error) -> LivepadError {
        LivepadError::RenderTargetUnavailable(format!("{}: {e}", self.path.display()))
    }
}

impl RenderTarget for FileTarget {
    fn open(&mut self) -> Result<()> {
        let file = fs::File::create(&self.staging).map_err(|e| self.unavailable(e))?;
        self.file = Some(file);
        Ok(())
    }

    fn write(&mut self, chunk: &str) -> Result<()> {
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(chunk.as_bytes()),
            None => {
                return Err(LivepadError::RenderTargetUnavailable(
                    "write before open".to_string(),
                ))
            }
        };
        result.map_err(|e| self.unavailable(e))
    }

    fn close(&mut self) -> Result<()> {
        let file = self.file.take().ok_or_else(|| {
            LivepadError::RenderTargetUnavailable("close before open".to_string())
        })?;
        file.sync_all().map_err(|e| self.unavailable(e))?;
        drop(file);
        fs::rename(&self.staging, &self.path).map_err(|e| self.unavailable(e))
    }

    fn label(&self) -> &str {
        "file"
    }
}
