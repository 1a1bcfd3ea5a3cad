//! Little-endian structured readers and writers over storage handles.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IrisError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// Writes primitive values to a [`StorageOutput`], tracking the byte offset.
#[derive(Debug)]
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            position: 0,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<LittleEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let bytes = varint::encode_u64(value);
        self.write_bytes(&bytes)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.close()
    }
}

/// Reads primitive values back from a [`StorageInput`].
#[derive(Debug)]
pub struct StructReader<R: StorageInput> {
    reader: R,
    size: u64,
    position: u64,
}

impl<R: StorageInput> StructReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let size = reader.size()?;
        Ok(StructReader {
            reader,
            size,
            position: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.size
    }

    fn ensure(&self, len: u64) -> Result<()> {
        if self.position + len > self.size {
            return Err(IrisError::corruption(format!(
                "unexpected end of file: need {len} bytes at offset {} of {}",
                self.position, self.size
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        self.position += 1;
        Ok(self.reader.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        self.position += 2;
        Ok(self.reader.read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        self.position += 4;
        Ok(self.reader.read_u32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        self.position += 8;
        Ok(self.reader.read_u64::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        self.position += 8;
        Ok(self.reader.read_i64::<LittleEndian>()?)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            if shift >= 64 {
                return Err(IrisError::corruption("VarInt overflow"));
            }
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure(len as u64)?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        self.position += len as u64;
        Ok(buf)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| IrisError::corruption(format!("invalid UTF-8: {e}")))
    }
}
