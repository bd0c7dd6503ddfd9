use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Append-only diagnostic sink for one session.
///
/// Every line goes to two places: an optional log file (timestamped, for
/// post-mortem inspection) and an in-memory buffer (raw, for a renderer to
/// display). Writes are ordered by emission; nothing is ever rewritten.
/// File I/O problems never propagate (diagnostics must not take down the
/// transcription pipeline); a failed file write is itself recorded in the
/// memory buffer and the session carries on.
pub struct DebugLog {
    file: Mutex<Option<File>>,
    buffer: Mutex<String>,
}

impl DebugLog {
    /// Open the sink. The file at `path`, if given, is truncated; a create
    /// failure is noted in the memory buffer and the sink stays usable.
    pub fn init(path: Option<&Path>) -> Self {
        let mut buffer = String::new();
        let file = path.and_then(|p| match File::create(p) {
            Ok(f) => Some(f),
            Err(e) => {
                buffer.push_str(&format!(
                    "failed to open debug log {}: {}\n",
                    p.display(),
                    e
                ));
                None
            }
        });

        Self {
            file: Mutex::new(file),
            buffer: Mutex::new(buffer),
        }
    }

    /// Append one line: timestamped to the file first (if configured), then
    /// raw to the in-memory buffer. The line is observable through
    /// `contents()` as soon as this returns.
    pub fn write(&self, line: &str) {
        debug!(target: "murmur::session", "{line}");

        let mut file_note = None;
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(f) = file.as_mut() {
                let stamped = format!(
                    "[{}] {}\n",
                    Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    line
                );
                if let Err(e) = f.write_all(stamped.as_bytes()) {
                    file_note = Some(format!("debug log file write failed: {e}\n"));
                }
            }
        }

        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
        if let Some(note) = file_note {
            buffer.push_str(&note);
        }
    }

    /// Snapshot of the in-memory buffer, lines in emission order.
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
