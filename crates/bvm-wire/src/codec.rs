use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::{Result, WireError, WireValue};
use crate::{HEADER_LEN, MAX_FRAME_BYTES};

pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_value(&mut self, v: &WireValue) {
        match v {
            WireValue::Null => self.write_u8(WireValue::TAG_NULL),
            WireValue::Boolean(b) => {
                self.write_u8(WireValue::TAG_BOOLEAN);
                self.write_bool(*b);
            }
            WireValue::Integer(i) => {
                self.write_u8(WireValue::TAG_INTEGER);
                self.write_i64(*i);
            }
            WireValue::Double(d) => {
                self.write_u8(WireValue::TAG_DOUBLE);
                self.write_f64(*d);
            }
            WireValue::String(s) => {
                self.write_u8(WireValue::TAG_STRING);
                self.write_string(s);
            }
            WireValue::Instance { class_id } => {
                self.write_u8(WireValue::TAG_INSTANCE);
                self.write_u32(*class_id);
            }
            WireValue::Class { class_id } => {
                self.write_u8(WireValue::TAG_CLASS);
                self.write_u32(*class_id);
            }
        }
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                WireError::Protocol(format!(
                    "buffer underflow: need {n} bytes at {}, have {}",
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Fails unless the whole payload was consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::Protocol(format!("{n} trailing bytes in payload"))),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take_array()?)))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| WireError::Protocol(format!("invalid utf-8 string: {e}")))
    }

    /// Reads a `u32` element count, rejecting counts that cannot possibly fit
    /// in the remaining payload given the minimum element size.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_element_size.max(1)) > self.remaining() {
            return Err(WireError::Protocol(format!(
                "element count {count} exceeds remaining payload ({} bytes)",
                self.remaining()
            )));
        }
        Ok(count)
    }

    pub fn read_value(&mut self) -> Result<WireValue> {
        let tag = self.read_u8()?;
        let v = match tag {
            WireValue::TAG_NULL => WireValue::Null,
            WireValue::TAG_BOOLEAN => WireValue::Boolean(self.read_bool()?),
            WireValue::TAG_INTEGER => WireValue::Integer(self.read_i64()?),
            WireValue::TAG_DOUBLE => WireValue::Double(self.read_f64()?),
            WireValue::TAG_STRING => WireValue::String(self.read_string()?),
            WireValue::TAG_INSTANCE => WireValue::Instance {
                class_id: self.read_u32()?,
            },
            WireValue::TAG_CLASS => WireValue::Class {
                class_id: self.read_u32()?,
            },
            other => {
                return Err(WireError::Protocol(format!("unknown value tag {other}")));
            }
        };
        Ok(v)
    }
}

pub fn encode_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.push(opcode);
    out.extend_from_slice(payload);
    out
}

/// Reads one `(opcode, payload)` frame. Returns `Ok(None)` on a clean end of
/// stream at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(WireError::Protocol(format!(
            "frame too large ({length} bytes, max {MAX_FRAME_BYTES})"
        )));
    }
    let opcode = header[4];
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(Some((opcode, payload)))
}
