use crate::ContainerError;

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Bounds-checked cursor over a byte slice.
///
/// Every read either returns the requested value and advances, or fails with
/// [`ContainerError::Truncated`] and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    /// Reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize, endian: Endian) -> Result<Self, ContainerError> {
        let mut r = Self::new(data, endian);
        r.seek(pos)?;
        Ok(r)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), ContainerError> {
        if pos > self.data.len() {
            return Err(self.truncated(pos, 0));
        }
        self.pos = pos;
        Ok(())
    }

    fn truncated(&self, offset: usize, len: usize) -> ContainerError {
        ContainerError::Truncated {
            offset,
            len,
            size: self.data.len(),
        }
    }

    /// The `len` bytes starting at absolute `offset`, without moving the cursor.
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8], ContainerError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| self.truncated(offset, len))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ContainerError> {
        let out = self.slice_at(self.pos, len)?;
        self.pos += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ContainerError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ContainerError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ContainerError> {
        let b = self.read_array::<2>()?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, ContainerError> {
        let b = self.read_array::<4>()?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    /// Consume `expected` or fail with `InvalidContainer(what)`.
    pub fn expect_bytes(&mut self, expected: &[u8], what: &'static str) -> Result<(), ContainerError> {
        match self.slice_at(self.pos, expected.len()) {
            Ok(found) if found == expected => {
                self.pos += expected.len();
                Ok(())
            }
            _ => Err(ContainerError::InvalidContainer(what)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_follow_endianness() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a];
        let mut be = ByteReader::new(&data, Endian::Big);
        assert_eq!(be.read_u16().unwrap(), 0x1234);
        assert_eq!(be.read_u16().unwrap(), 0x5678);

        let mut le = ByteReader::new(&data, Endian::Little);
        assert_eq!(le.read_u32().unwrap(), 0x7856_3412);
        assert_eq!(le.read_u8().unwrap(), 0x9a);
        assert_eq!(le.remaining(), 0);
    }

    #[test]
    fn short_read_fails_without_moving() {
        let data = [1, 2, 3];
        let mut r = ByteReader::at(&data, 1, Endian::Big).unwrap();
        assert!(matches!(
            r.read_u32(),
            Err(ContainerError::Truncated {
                offset: 1,
                len: 4,
                size: 3
            })
        ));
        assert_eq!(r.position(), 1);
        assert!(ByteReader::at(&data, 4, Endian::Big).is_err());
    }

    #[test]
    fn slice_offsets_cannot_overflow() {
        let data = [0u8; 8];
        let r = ByteReader::new(&data, Endian::Little);
        assert!(r.slice_at(usize::MAX, 2).is_err());
        assert_eq!(r.slice_at(6, 2).unwrap(), &[0, 0]);
    }

    #[test]
    fn expect_bytes_reports_marker() {
        let data = [0xff, 0xd8, 0xff];
        let mut r = ByteReader::new(&data, Endian::Big);
        r.expect_bytes(&[0xff, 0xd8], "missing SOI").unwrap();
        assert!(matches!(
            r.expect_bytes(&[0xff, 0xe1], "missing APP1"),
            Err(ContainerError::InvalidContainer("missing APP1"))
        ));
    }
}
