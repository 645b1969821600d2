//! Small shared utilities: bounded text rendering and byte formatting

use core::fmt;

/// Truncating [`fmt::Write`] sink over a caller-supplied byte buffer.
///
/// Backs every `render` in this crate: writes never exceed the buffer, the
/// written byte count is tracked, and truncation lands on a UTF-8 character
/// boundary so the written prefix is always valid text.
///
/// Writes past capacity are silently dropped rather than reported as
/// errors — bounded best-effort output is the whole point of this type, so
/// `write!` chains against it never fail.
#[derive(Debug)]
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> SliceWriter<'a> {
    /// Wrap a buffer; starts empty.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Bytes of capacity left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.written
    }

    /// The written prefix as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only whole UTF-8 chunks are ever copied in, so this cannot fail.
        core::str::from_utf8(&self.buf[..self.written]).unwrap_or_default()
    }
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let space = self.remaining();
        let bytes = s.as_bytes();
        if bytes.len() <= space {
            self.buf[self.written..self.written + bytes.len()].copy_from_slice(bytes);
            self.written += bytes.len();
        } else {
            // Back off to a character boundary before truncating.
            let mut end = space;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            self.buf[self.written..self.written + end].copy_from_slice(&bytes[..end]);
            self.written += end;
        }
        Ok(())
    }
}

/// Format bytes as human-readable string
///
/// # Examples
///
/// ```
/// use aegis_guard::utils::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1048576), "1.00 MB");
/// ```
#[inline]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
