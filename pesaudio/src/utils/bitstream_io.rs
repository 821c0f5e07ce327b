//! Bit-level reads for header fields that do not sit on byte boundaries.
//!
//! Every read is checked against the slice length first, so a short header surfaces
//! as `UnexpectedEof` instead of reading past the field being parsed.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BsIoSliceReader<'a> {
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    len_bits: u64,
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self {
            bs: BitReader::new(io::Cursor::new(buf)),
            len_bits: (buf.len() as u64) << 3,
        }
    }

    fn ensure_available(&mut self, bits: u64, what: &str) -> io::Result<()> {
        let available = self.available()?;
        if bits > available {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{what}: {bits} bits requested, {available} left"),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn get(&mut self) -> io::Result<bool> {
        self.ensure_available(1, "get")?;
        self.bs.read_bit()
    }

    #[inline]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        self.ensure_available(n as u64, "get_n")?;
        self.bs.read_unsigned_var(n)
    }

    pub fn get_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.ensure_available((buf.len() as u64) << 3, "get_bytes")?;
        self.bs.read_bytes(buf)
    }

    #[inline]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.ensure_available(n as u64, "skip_n")?;
        self.bs.skip(n)
    }

    pub fn available(&mut self) -> io::Result<u64> {
        Ok(self.len_bits.saturating_sub(self.position()?))
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

#[test]
fn bounded_reads() -> anyhow::Result<()> {
    let data = [0b1010_0001, 0xFF, 0x00];
    let mut bs = BsIoSliceReader::from_slice(&data);

    assert!(bs.get()?);
    assert_eq!(bs.get_n::<u8>(3)?, 0b010);
    bs.skip_n(4)?;
    assert_eq!(bs.position()?, 8);

    let mut buf = [0u8; 2];
    bs.get_bytes(&mut buf)?;
    assert_eq!(buf, [0xFF, 0x00]);

    assert_eq!(bs.available()?, 0);
    assert!(bs.get().is_err());
    assert!(bs.get_n::<u8>(1).is_err());
    assert!(bs.skip_n(1).is_err());
    Ok(())
}
