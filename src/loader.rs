use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::LoadError;
use crate::memory::{Memory, MEMORY_MAX};

/// A decoded program image: an origin and the words to place there.
///
/// Always fits in memory once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    orig: u16,
    words: Vec<u16>,
}

impl Image {
    pub fn new(orig: u16, words: Vec<u16>) -> Result<Image, LoadError> {
        if orig as usize + words.len() > MEMORY_MAX {
            return Err(LoadError::TooLarge {
                orig,
                words: words.len(),
            });
        }
        Ok(Image { orig, words })
    }

    /// Decode big-endian words. The first word is the origin.
    pub fn from_bytes(bytes: &[u8]) -> Result<Image, LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::MissingOrigin);
        }
        if bytes.len() % 2 != 0 {
            return Err(LoadError::Misaligned { len: bytes.len() });
        }

        let mut words = bytes
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]));
        let orig = words.next().ok_or(LoadError::MissingOrigin)?;
        Image::new(orig, words.collect())
    }

    /// Read a whole image stream.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Image, LoadError> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(LoadError::Read)?;
        Image::from_bytes(&buffer)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Image, LoadError> {
        let path = path.as_ref();
        let open_err = |source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(open_err)?;
        let mut buffer = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut buffer)
            .map_err(open_err)?;

        let image = Image::from_bytes(&buffer)?;
        debug!(
            "read image {}: {} words at 0x{:04x}",
            path.display(),
            image.len(),
            image.orig()
        );
        Ok(image)
    }

    pub fn orig(&self) -> u16 {
        self.orig
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Place every word into `mem`, starting at the origin.
    pub fn load_into(&self, mem: &mut Memory) {
        mem.copy_from(self.orig, &self.words);
    }
}
