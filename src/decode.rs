use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Encoding;
use crate::lifecycle::{TEMP_PREFIX, TEMP_SUFFIX};

/// The configured output destination, opened once at startup and shared by
/// every sink.
///
/// Wraps the forwarding socket, the output file, or stdout behind one mutex
/// so interleaved frames from different subscriptions stay whole.
#[derive(Clone)]
pub struct OutputHandle {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl std::fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandle").finish_non_exhaustive()
    }
}

impl OutputHandle {
    pub fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::from_writer(Box::new(tokio::io::stdout()))
    }

    pub async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

/// Per-item decode failures; reported by the sink, never fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("json payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("failed to stage payload to {path}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write decoded output")]
    Output(#[source] std::io::Error),
}

/// Renders raw telemetry frames to the output destination.
///
/// `json` payloads pass through as text. The gpb encodings are staged to a
/// `telemetry-msg-<uuid>.dat` scratch file — the hand-off point for the
/// companion schema-aware decode tool — and rendered here as an offset hex
/// dump. Scratch files are removed after use unless the run keeps them for
/// inspection; anything left behind is picked up by the shutdown cleanup.
pub struct Decoder {
    encoding: Encoding,
    scratch_dir: PathBuf,
    keep_scratch: bool,
    output: OutputHandle,
}

impl Decoder {
    pub fn new(
        encoding: Encoding,
        output: OutputHandle,
        scratch_dir: PathBuf,
        keep_scratch: bool,
    ) -> Self {
        Self {
            encoding,
            scratch_dir,
            keep_scratch,
            output,
        }
    }

    pub async fn decode(&mut self, req_id: i64, payload: &[u8]) -> Result<(), DecodeError> {
        match self.encoding {
            Encoding::Json => {
                let text = std::str::from_utf8(payload)?;
                let mut line = String::with_capacity(text.len() + 1);
                line.push_str(text);
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                self.output
                    .write_all(line.as_bytes())
                    .await
                    .map_err(DecodeError::Output)
            }
            Encoding::Gpb | Encoding::SelfDescribingGpb => {
                let path = self
                    .scratch_dir
                    .join(format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", Uuid::new_v4()));
                tokio::fs::write(&path, payload)
                    .await
                    .map_err(|source| DecodeError::Scratch {
                        path: path.clone(),
                        source,
                    })?;

                let mut rendered = format!(
                    "--- request {req_id}: {} bytes ({}) ---\n",
                    payload.len(),
                    self.encoding.as_str()
                );
                rendered.push_str(&hex_dump(payload));

                let result = self
                    .output
                    .write_all(rendered.as_bytes())
                    .await
                    .map_err(DecodeError::Output);

                if !self.keep_scratch {
                    if let Err(err) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "failed to remove scratch file"
                        );
                    }
                }
                result
            }
        }
    }
}

/// Offset hex dump, 16 bytes per line with an ASCII gutter.
fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (index, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", index * 16);
        for slot in 0..16 {
            match chunk.get(slot) {
                Some(byte) => {
                    let _ = write!(out, "{byte:02x} ");
                }
                None => out.push_str("   "),
            }
        }
        out.push(' ');
        for byte in chunk {
            out.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("decode-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn capture_output() -> (OutputHandle, tokio::io::DuplexStream) {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        (OutputHandle::from_writer(Box::new(writer)), reader)
    }

    async fn read_available(reader: &mut tokio::io::DuplexStream) -> Vec<u8> {
        let mut buf = vec![0u8; 64 * 1024];
        let n = reader.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn test_json_payload_passes_through_with_newline() {
        let (output, mut reader) = capture_output();
        let mut decoder = Decoder::new(Encoding::Json, output, scratch_dir(), false);

        decoder.decode(7, br#"{"cpu": 12}"#).await.unwrap();

        assert_eq!(read_available(&mut reader).await, b"{\"cpu\": 12}\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_json_is_reported() {
        let (output, _reader) = capture_output();
        let mut decoder = Decoder::new(Encoding::Json, output, scratch_dir(), false);

        let err = decoder.decode(7, &[0xff, 0xfe]).await.unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }

    #[tokio::test]
    async fn test_gpb_payload_staged_and_dumped() {
        let dir = scratch_dir();
        let (output, mut reader) = capture_output();
        let mut decoder = Decoder::new(Encoding::Gpb, output, dir.clone(), false);

        decoder.decode(7, b"abc").await.unwrap();

        let rendered = String::from_utf8(read_available(&mut reader).await).unwrap();
        assert!(rendered.starts_with("--- request 7: 3 bytes (gpb) ---\n"));
        assert!(rendered.contains("61 62 63"));

        // scratch file removed after the dump
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scratch_kept_when_cleanup_disabled() {
        let dir = scratch_dir();
        let (output, mut reader) = capture_output();
        let mut decoder =
            Decoder::new(Encoding::SelfDescribingGpb, output, dir.clone(), true);

        decoder.decode(7, b"xyz").await.unwrap();
        let _ = read_available(&mut reader).await;

        let entries: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().into_string().unwrap();
        assert!(name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX));
        assert_eq!(std::fs::read(entries[0].path()).unwrap(), b"xyz");
    }

    #[test]
    fn test_hex_dump_layout() {
        let dump = hex_dump(b"ab");
        assert!(dump.starts_with("00000000  61 62"));
        assert!(dump.trim_end().ends_with("ab"));

        let two_lines = hex_dump(&[0u8; 17]);
        assert_eq!(two_lines.lines().count(), 2);
        assert!(two_lines.lines().nth(1).unwrap().starts_with("00000010"));
    }
}
