//! Forward-only byte cursor over a mapped PSF buffer

use crate::types::{Endian, PsfError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Forward-only cursor over the binary-payload encoding
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    /// Detect byte order from a leading 4-byte word that must equal `expected`
    pub fn detect_endian(data: &[u8], expected: u32) -> Option<Endian> {
        if data.len() < 4 {
            return None;
        }
        if LittleEndian::read_u32(&data[..4]) == expected {
            Some(Endian::Little)
        } else if BigEndian::read_u32(&data[..4]) == expected {
            Some(Endian::Big)
        } else {
            None
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(PsfError::TruncatedValueBlock(format!(
                "needed {} bytes at offset {}, {} left",
                count,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        })
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_bytes(1)?[0] as i8)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_i32(bytes),
            Endian::Big => BigEndian::read_i32(bytes),
        })
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_bytes(4)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_f32(bytes),
            Endian::Big => BigEndian::read_f32(bytes),
        })
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_f64(bytes),
            Endian::Big => BigEndian::read_f64(bytes),
        })
    }

    /// Bulk read doubles, appending to `out`
    pub fn read_doubles_into(&mut self, count: usize, out: &mut Vec<f64>) -> Result<()> {
        let byte_count = count
            .checked_mul(8)
            .ok_or_else(|| PsfError::malformed("element count overflows"))?;
        let bytes = self.read_bytes(byte_count)?;
        let start = out.len();
        out.resize(start + count, 0.0);
        match self.endian {
            Endian::Little => LittleEndian::read_f64_into(bytes, &mut out[start..]),
            Endian::Big => BigEndian::read_f64_into(bytes, &mut out[start..]),
        }
        Ok(())
    }

    /// Bulk read floats widened to f64, appending to `out`
    pub fn read_floats_as_f64_into(&mut self, count: usize, out: &mut Vec<f64>) -> Result<()> {
        let byte_count = count
            .checked_mul(4)
            .ok_or_else(|| PsfError::malformed("element count overflows"))?;
        let bytes = self.read_bytes(byte_count)?;
        out.reserve(count);
        match self.endian {
            Endian::Little => {
                out.extend(bytes.chunks_exact(4).map(|c| LittleEndian::read_f32(c) as f64))
            }
            Endian::Big => out.extend(bytes.chunks_exact(4).map(|c| BigEndian::read_f32(c) as f64)),
        }
        Ok(())
    }
}
