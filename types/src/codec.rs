use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, ReadExt, Write};

/// Helper to write a string as length-prefixed UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Helper to read a string from length-prefixed UTF-8 bytes.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

/// Helper to get encode size of a string.
pub fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

pub fn write_opt_string(s: &Option<String>, writer: &mut impl BufMut) {
    match s {
        Some(s) => {
            true.write(writer);
            write_string(s, writer);
        }
        None => false.write(writer),
    }
}

pub fn read_opt_string(reader: &mut impl Buf, max_len: usize) -> Result<Option<String>, Error> {
    if bool::read(reader)? {
        Ok(Some(read_string(reader, max_len)?))
    } else {
        Ok(None)
    }
}

pub fn opt_string_encode_size(s: &Option<String>) -> usize {
    bool::SIZE + s.as_deref().map_or(0, string_encode_size)
}

/// Floats travel as their IEEE-754 bit pattern so decoding is exact.
pub fn write_f64(value: f64, writer: &mut impl BufMut) {
    value.to_bits().write(writer);
}

pub fn read_f64(reader: &mut impl Buf) -> Result<f64, Error> {
    Ok(f64::from_bits(u64::read(reader)?))
}

pub const F64_SIZE: usize = u64::SIZE;

pub fn write_opt_f64(value: Option<f64>, writer: &mut impl BufMut) {
    match value {
        Some(value) => {
            true.write(writer);
            write_f64(value, writer);
        }
        None => false.write(writer),
    }
}

pub fn read_opt_f64(reader: &mut impl Buf) -> Result<Option<f64>, Error> {
    if bool::read(reader)? {
        Ok(Some(read_f64(reader)?))
    } else {
        Ok(None)
    }
}

pub fn opt_f64_encode_size(value: Option<f64>) -> usize {
    bool::SIZE + if value.is_some() { F64_SIZE } else { 0 }
}
