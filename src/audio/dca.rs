//! Codec para el contenedor de sonidos pre-codificados.
//!
//! Each clip file is a plain sequence of records:
//!
//! ```text
//! +----------------+----------------------+
//! | len: u16 (LE)  | payload: len bytes   |  ... repeated until EOF
//! +----------------+----------------------+
//! ```
//!
//! The payloads are opus frames, but nothing here looks inside them: they are
//! handed to the voice transport byte for byte. A record cut short by the end
//! of the file marks a clean end of clip, not corruption.

use bytes::Bytes;
use std::io::{self, ErrorKind, Read, Write};

/// Lazy iterator over the frames of a clip stream.
///
/// Reading stops at EOF or at a truncated trailing record. Any other I/O
/// error is yielded once and ends the iteration.
pub struct FrameReader<R> {
    inner: R,
    finished: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        let mut header = [0u8; 2];
        if read_full(&mut self.inner, &mut header)? < header.len() {
            return Ok(None);
        }

        let len = u16::from_le_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        if read_full(&mut self.inner, &mut payload)? < len {
            // Registro final truncado: fin limpio del clip
            return Ok(None);
        }

        Ok(Some(Bytes::from(payload)))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Decodes a whole clip stream into memory.
pub fn decode_frames<R: Read>(reader: R) -> io::Result<Vec<Bytes>> {
    FrameReader::new(reader).collect()
}

/// Writes frames back in the container format.
pub fn encode_frames<W, I, F>(writer: &mut W, frames: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    for frame in frames {
        let frame = frame.as_ref();
        let len = u16::try_from(frame.len()).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("frame de {} bytes excede el máximo del contenedor", frame.len()),
            )
        })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(frame)?;
    }
    Ok(())
}

/// Fills `buf` as far as the reader allows and returns how many bytes landed.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
