//! In-place velocity patching

use std::io::{self, Seek, SeekFrom, Write};

/// Overwrite the single byte at `offset` with `velocity`.
pub fn write_velocity<W: Write + Seek>(out: &mut W, offset: u64, velocity: u8) -> io::Result<()> {
    out.seek(SeekFrom::Start(offset))?;
    out.write_all(&[velocity])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_touches_one_byte() {
        let mut out = Cursor::new(vec![1u8, 2, 3, 4]);
        write_velocity(&mut out, 2, 99).unwrap();
        assert_eq!(out.into_inner(), vec![1, 2, 99, 4]);
    }
}
