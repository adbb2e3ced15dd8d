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

    test_util.rs

    Helpers for tests that need an image file on disk.
*/

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{
    fat12::format::{format_volume, VolumeLayout},
    image::DiskImage,
};

/// A uniquely named file under the system temp directory, removed on drop.
pub struct TempImage {
    path: PathBuf,
}

impl TempImage {
    pub fn with_bytes(bytes: &[u8]) -> TempImage {
        let path = std::env::temp_dir().join(format!("marty_floppy_{}.img", Uuid::new_v4()));
        std::fs::write(&path, bytes).unwrap();
        TempImage { path }
    }

    /// A freshly formatted 1.44MB FAT12 volume.
    pub fn formatted() -> TempImage {
        let tmp = TempImage::with_bytes(&[0u8; 1_474_560]);
        let mut image = DiskImage::open(tmp.path()).unwrap();
        format_volume(&mut image, VolumeLayout::Pc1440K, Some("TESTDISK")).unwrap();
        tmp
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> Vec<u8> {
        std::fs::read(&self.path).unwrap()
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
