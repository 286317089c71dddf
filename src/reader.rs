use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

macro_rules! read_endian {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                Ok(match self.big_endian {
                    true => ReadBytesExt::$name::<BigEndian>(&mut self.inner)?,
                    false => ReadBytesExt::$name::<LittleEndian>(&mut self.inner)?,
                })
            }
        )*
    };
}

/// A cursor whose byte order can be switched while reading.
///
/// Serialized files declare their endianness in their own header,
/// so one underlying stream can be read in both orders.
pub struct EndianReader<R> {
    inner: R,
    big_endian: bool,
}

impl<R> EndianReader<R> {
    pub fn new(inner: R, big_endian: bool) -> Self {
        EndianReader { inner, big_endian }
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> EndianReader<R> {
    read_endian! {
        read_i16 -> i16,
        read_u16 -> u16,
        read_i32 -> i32,
        read_u32 -> u32,
        read_i64 -> i64,
        read_u64 -> u64,
        read_f32 -> f32,
        read_f64 -> f64,
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if read != len {
            return Err(Error::UnexpectedEof);
        }
        Ok(buf)
    }

    /// Reads a NUL-terminated string.
    pub fn read_cstr(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.inner.read_u8()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        Ok(match String::from_utf8(bytes) {
            Ok(string) => string,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Reads an `i32` that is used as a length or count.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| Error::format(format!("negative length {len}")))
    }
}

impl<R: Seek> EndianReader<R> {
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, n: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(n))?;
        Ok(())
    }

    /// Advances to the next multiple of `alignment`, relative to the start of the stream.
    pub fn align_to(&mut self, alignment: u64) -> Result<()> {
        let pos = self.tell()?;
        let aligned = pos.next_multiple_of(alignment);
        if aligned != pos {
            self.seek_to(aligned)?;
        }
        Ok(())
    }

    pub fn align(&mut self) -> Result<()> {
        self.align_to(4)
    }
}

impl<R: Read> Read for EndianReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Seek> Seek for EndianReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn endianness_can_switch() {
        let mut reader = EndianReader::new(Cursor::new([0, 0, 0, 1, 1, 0, 0, 0]), true);
        assert_eq!(reader.read_i32().unwrap(), 1);
        reader.set_big_endian(false);
        assert_eq!(reader.read_i32().unwrap(), 1);
        assert!(matches!(reader.read_i32(), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn cstr_and_align() {
        let mut reader = EndianReader::new(Cursor::new(b"abc\0\0\0\0\0\x07"), true);
        assert_eq!(reader.read_cstr().unwrap(), "abc");
        assert_eq!(reader.tell().unwrap(), 4);
        reader.align().unwrap();
        assert_eq!(reader.tell().unwrap(), 4);
        reader.read_u8().unwrap();
        reader.align().unwrap();
        assert_eq!(reader.tell().unwrap(), 8);
        assert_eq!(reader.read_u8().unwrap(), 7);
    }

    #[test]
    fn unterminated_cstr() {
        let mut reader = EndianReader::new(Cursor::new(b"abc"), true);
        assert!(matches!(reader.read_cstr(), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn negative_length() {
        let mut reader = EndianReader::new(Cursor::new((-1i32).to_be_bytes()), true);
        assert!(reader.read_len().unwrap_err().is_format());
    }
}
