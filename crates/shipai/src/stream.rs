use glam::{DQuat, DVec3};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("unexpected end of stream at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

/// Append-only little-endian writer. Field order is the format; there are no
/// field names or per-field tags.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.byte(u8::from(value));
    }

    pub fn int32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn uint32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn double(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn vector3d(&mut self, value: DVec3) {
        self.double(value.x);
        self.double(value.y);
        self.double(value.z);
    }

    pub fn quaternion(&mut self, value: DQuat) {
        self.double(value.x);
        self.double(value.y);
        self.double(value.z);
        self.double(value.w);
    }

    pub fn string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        self.uint32(bytes.len() as u32);
        self.bytes.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn byte(&mut self) -> Result<u8, StreamError> {
        Ok(self.fixed::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool, StreamError> {
        Ok(self.byte()? != 0)
    }

    pub fn int32(&mut self) -> Result<i32, StreamError> {
        Ok(i32::from_le_bytes(self.fixed::<4>()?))
    }

    pub fn uint32(&mut self) -> Result<u32, StreamError> {
        Ok(u32::from_le_bytes(self.fixed::<4>()?))
    }

    pub fn double(&mut self) -> Result<f64, StreamError> {
        Ok(f64::from_le_bytes(self.fixed::<8>()?))
    }

    pub fn vector3d(&mut self) -> Result<DVec3, StreamError> {
        let x = self.double()?;
        let y = self.double()?;
        let z = self.double()?;
        Ok(DVec3::new(x, y, z))
    }

    pub fn quaternion(&mut self) -> Result<DQuat, StreamError> {
        let x = self.double()?;
        let y = self.double()?;
        let z = self.double()?;
        let w = self.double()?;
        Ok(DQuat::from_xyzw(x, y, z, w))
    }

    pub fn string(&mut self) -> Result<String, StreamError> {
        let len = self.uint32()? as usize;
        let offset = self.cursor;
        let raw = self.read_exact(len)?;
        std::str::from_utf8(raw)
            .map(ToString::to_string)
            .map_err(|_| StreamError::InvalidUtf8 { offset })
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let raw = self.read_exact(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(raw);
        Ok(out)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        let end = self.cursor.saturating_add(len);
        if end > self.bytes.len() {
            return Err(StreamError::UnexpectedEnd {
                offset: self.cursor,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(out)
    }
}
