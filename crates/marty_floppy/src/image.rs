/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    image.rs

    Implements the raw disk image store backing the floppy controller.
*/

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use crate::error::{FloppyError, FloppyResult};

pub const SECTOR_SIZE: usize = 512;

/// An open raw sector image. The file is the medium: every transfer is a seek followed by
/// a read or write, there is no track buffer.
pub struct DiskImage {
    file: File,
    path: PathBuf,
    size: u64,
}

impl DiskImage {
    /// Open an existing image for read/write. The file is never created or truncated.
    pub fn open(path: impl AsRef<Path>) -> FloppyResult<DiskImage> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();

        log::debug!("Opened disk image {} ({} bytes)", path.display(), size);
        Ok(DiskImage {
            file,
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name of the image, used as the display name of the volume root.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> FloppyResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> FloppyResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        let end = offset + buf.len() as u64;
        if end > self.size {
            self.size = end;
        }
        Ok(())
    }

    /// Read `len` bytes starting at `offset` into a new vector.
    pub fn read_vec(&mut self, offset: u64, len: usize) -> FloppyResult<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn read_byte(&mut self, offset: u64) -> FloppyResult<u8> {
        let mut byte = [0u8; 1];
        self.read_at(offset, &mut byte)?;
        Ok(byte[0])
    }

    pub fn write_byte(&mut self, offset: u64, byte: u8) -> FloppyResult<()> {
        self.write_at(offset, &[byte])
    }

    /// Push written bytes through to the file so other readers see them immediately.
    pub fn flush(&mut self) -> FloppyResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Borrow the image through a guard that restores the current file position when dropped.
    pub fn position_guard(&mut self) -> FloppyResult<PositionGuard<'_>> {
        let saved = self.file.stream_position()?;
        Ok(PositionGuard { image: self, saved })
    }
}

/// Restores the file cursor of a [DiskImage] on every exit path.
pub struct PositionGuard<'a> {
    image: &'a mut DiskImage,
    saved: u64,
}

impl Deref for PositionGuard<'_> {
    type Target = DiskImage;

    fn deref(&self) -> &DiskImage {
        self.image
    }
}

impl DerefMut for PositionGuard<'_> {
    fn deref_mut(&mut self) -> &mut DiskImage {
        self.image
    }
}

impl Drop for PositionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.image.file.seek(SeekFrom::Start(self.saved)) {
            log::warn!("Failed to restore image position to {}: {}", self.saved, e);
        }
    }
}

/// The drive slot: an optional mounted image plus the media-changed latch. The latch
/// survives ejection so the guest can see that the medium went away.
#[derive(Default)]
pub struct DiskStore {
    image: Option<DiskImage>,
    changed: bool,
}

impl DiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.image.is_some()
    }

    /// Mount the image at `path`. On failure the currently mounted image is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> FloppyResult<()> {
        let image = DiskImage::open(path)?;
        if let Some(old) = self.image.replace(image) {
            log::debug!("Replacing mounted image {}", old.path().display());
        }
        self.changed = true;
        Ok(())
    }

    pub fn eject(&mut self) -> FloppyResult<DiskImage> {
        let image = self.image.take().ok_or(FloppyError::MediaAbsent)?;
        self.changed = true;
        Ok(image)
    }

    pub fn flush(&mut self) -> FloppyResult<()> {
        self.image_mut()?.flush()
    }

    pub fn image(&self) -> Option<&DiskImage> {
        self.image.as_ref()
    }

    pub fn image_mut(&mut self) -> FloppyResult<&mut DiskImage> {
        self.image.as_mut().ok_or(FloppyError::MediaAbsent)
    }

    pub fn set_changed(&mut self) {
        self.changed = true;
    }

    /// Return the media-changed latch and clear it.
    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }

    pub fn changed(&self) -> bool {
        self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TempImage;

    #[test]
    fn load_nonexistent_keeps_current_image() {
        let tmp = TempImage::with_bytes(&[0x11; 1024]);
        let mut store = DiskStore::new();
        store.load(tmp.path()).unwrap();
        assert!(store.take_changed());

        let missing = std::env::temp_dir().join("marty_floppy_missing_image.img");
        assert!(store.load(&missing).is_err());
        assert!(store.is_present());
        assert_eq!(store.image().unwrap().path(), tmp.path());
        assert!(!store.changed());
    }

    #[test]
    fn eject_without_media_fails() {
        let mut store = DiskStore::new();
        assert!(matches!(store.eject(), Err(FloppyError::MediaAbsent)));
        assert!(matches!(store.flush(), Err(FloppyError::MediaAbsent)));
    }

    #[test]
    fn byte_io_hits_the_file() {
        let tmp = TempImage::with_bytes(&[0u8; 2048]);
        let mut image = DiskImage::open(tmp.path()).unwrap();
        image.write_at(512, &[1, 2, 3]).unwrap();
        image.flush().unwrap();
        assert_eq!(image.read_vec(511, 5).unwrap(), vec![0, 1, 2, 3, 0]);
        assert_eq!(std::fs::read(tmp.path()).unwrap()[513], 2);
        assert_eq!(image.size(), 2048);
    }

    #[test]
    fn short_read_is_an_error() {
        let tmp = TempImage::with_bytes(&[0u8; 100]);
        let mut image = DiskImage::open(tmp.path()).unwrap();
        let mut buf = [0u8; 10];
        assert!(matches!(image.read_at(95, &mut buf), Err(FloppyError::Io(_))));
    }

    #[test]
    fn position_guard_restores_cursor() {
        let tmp = TempImage::with_bytes(&[0u8; 1024]);
        let mut image = DiskImage::open(tmp.path()).unwrap();
        image.read_byte(100).unwrap();
        {
            let mut guard = image.position_guard().unwrap();
            guard.read_byte(900).unwrap();
        }
        assert_eq!(image.file.stream_position().unwrap(), 101);
    }
}
