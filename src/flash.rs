use core::ops::Range;
use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::FirmwareImage;

/// A decoded image seen as read-only NOR flash, so code written against the
/// `embedded-storage` traits can read it like program memory.
#[derive(Debug, Clone, Copy)]
pub struct ImageFlash<'a> {
    image: &'a FirmwareImage,
}

impl<'a> ImageFlash<'a> {
    pub fn new(image: &'a FirmwareImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &'a FirmwareImage {
        self.image
    }

    fn validate_read_operation(
        &self,
        offset: u32,
        length: usize,
    ) -> Result<Range<usize>, ImageFlashError> {
        let offset = offset as usize;
        let capacity = self.image.len();

        match offset.checked_add(length) {
            Some(end) if offset <= capacity && end <= capacity => Ok(offset..end),
            _ => Err(ImageFlashError::OutOfBounds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ImageFlashError {
    #[error("read past the end of the image")]
    OutOfBounds,
}

impl NorFlashError for ImageFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            ImageFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
        }
    }
}

impl ErrorType for ImageFlash<'_> {
    type Error = ImageFlashError;
}

impl ReadNorFlash for ImageFlash<'_> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.validate_read_operation(offset, bytes.len())?;

        bytes.copy_from_slice(&self.image.as_bytes()[range]);

        Ok(())
    }

    fn capacity(&self) -> usize {
        self.image.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{decode_str, FILL_BYTE};

    #[test]
    fn read_decoded_bytes() {
        let image = decode_str(":0100000011EE\n:0100050022D8\n").unwrap();
        let mut flash = ImageFlash::new(&image);

        let mut output = [0; 6];
        flash.read(0, &mut output).unwrap();

        assert_eq!(output, [0x11, FILL_BYTE, FILL_BYTE, FILL_BYTE, FILL_BYTE, 0x22]);
        assert_eq!(flash.capacity(), 6);
    }

    #[test]
    fn read_at_offset() {
        let image = decode_str(":0100000011EE\n:0100050022D8\n").unwrap();
        let mut flash = ImageFlash::new(&image);

        let mut output = [0; 2];
        flash.read(4, &mut output).unwrap();

        assert_eq!(output, [FILL_BYTE, 0x22]);
    }

    #[test]
    fn out_of_bounds_read_gives_error() {
        let image = decode_str(":0100000011EE\n").unwrap();
        let mut flash = ImageFlash::new(&image);

        let mut output = [0; 2];

        assert!(matches!(
            flash.read(0, &mut output),
            Err(ImageFlashError::OutOfBounds)
        ));
        assert!(matches!(
            flash.read(u32::MAX, &mut output[..1]),
            Err(ImageFlashError::OutOfBounds)
        ));
        assert!(matches!(
            ImageFlashError::OutOfBounds.kind(),
            NorFlashErrorKind::OutOfBounds
        ));
    }

    #[test]
    fn empty_read_at_end_is_fine() {
        let image = decode_str(":0100000011EE\n").unwrap();
        let mut flash = ImageFlash::new(&image);

        assert!(flash.read(1, &mut []).is_ok());
    }
}
