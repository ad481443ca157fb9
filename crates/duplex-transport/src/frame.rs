//! Length-prefixed framing.
//!
//! ```text
//! ┌────────────────────┬──────────────────┐
//! │ length (u32, BE)   │ body (length B)  │
//! └────────────────────┴──────────────────┘
//! ```

use std::io::{self, Read, Write};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Write one frame.
///
/// # Errors
///
/// Fails with `InvalidInput` if the body does not fit a `u32` length, or with
/// the underlying write error.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame body exceeds u32"))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    writer.write_all(&buf)?;
    writer.flush()
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream (EOF before any header byte).
///
/// # Errors
///
/// Fails with `UnexpectedEof` on a truncated frame, `InvalidData` if the
/// announced length exceeds `max_len`, or with the underlying read error.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_len}"),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}
