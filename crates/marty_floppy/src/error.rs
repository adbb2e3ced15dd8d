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

    error.rs

    Error type shared by the disk image store, FAT12 engine and host file API.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FloppyError {
    #[error("No disk image is mounted.")]
    MediaAbsent,
    #[error("Invalid FAT12 geometry: {0}")]
    GeometryInvalid(String),
    #[error("Not enough free clusters: {needed} needed, {available} available.")]
    CapacityExhausted { needed: usize, available: usize },
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    #[error("Volume is busy: controller I/O is in progress.")]
    ConcurrentAccessRejected,
    #[error("No free slot in the root directory.")]
    DirectoryFull,
    #[error("Invalid file name: '{0}'")]
    InvalidName(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("An entry named {0} already exists.")]
    NameExists(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<binrw::Error> for FloppyError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => FloppyError::Io(io),
            other => FloppyError::GeometryInvalid(other.to_string()),
        }
    }
}

pub type FloppyResult<T> = Result<T, FloppyError>;
