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

    fat12::mod.rs

    Host-side FAT12 access to a mounted floppy image.
*/

//! The FAT12 engine works directly against the raw image bytes. Geometry, FAT and
//! directory tree are read fresh for every call; nothing is cached between calls since
//! the guest may have written to the medium in the meantime.

pub mod bpb;
pub mod chain;
pub mod dir;
pub mod export;
pub mod format;
pub mod mutate;
pub mod table;

pub use bpb::Fat12Geometry;
pub use dir::{DirectoryEntryNode, NodeKind};
pub use table::FatTable;

/// Any FAT12 value at or above this ends a cluster chain.
pub const FAT12_END_OF_CHAIN_MIN: u16 = 0xFF8;
/// Value written to the last cluster of a chain.
pub const FAT12_END_OF_CHAIN: u16 = 0xFFF;
pub const FAT12_FREE: u16 = 0x000;
pub const FAT12_ENTRY_MASK: u16 = 0x0FFF;

pub const DIR_ENTRY_SIZE: usize = 32;
