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

    fat12::table.rs

    The 12-bit FAT entry codec and an in-memory copy of the allocation table.
*/

use crate::{
    error::FloppyResult,
    fat12::{Fat12Geometry, FAT12_ENTRY_MASK, FAT12_FREE},
    image::DiskImage,
};

/// Byte index of the 16-bit little-endian word holding `cluster`'s entry.
#[inline]
fn entry_index(cluster: u16) -> usize {
    cluster as usize + (cluster as usize / 2)
}

/// Decode the FAT12 entry for `cluster`. Two entries share three bytes: an even cluster
/// owns the low 12 bits of the word at its byte index, an odd cluster the high 12 bits.
/// Returns None if the entry lies past the end of `fat`.
pub fn read_entry(fat: &[u8], cluster: u16) -> Option<u16> {
    let idx = entry_index(cluster);
    let bytes = fat.get(idx..idx + 2)?;
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    if cluster & 1 == 0 {
        Some(word & FAT12_ENTRY_MASK)
    }
    else {
        Some(word >> 4)
    }
}

/// Encode `value` into the entry for `cluster`, preserving the nibble that belongs to the
/// neighbouring entry. Returns false, leaving `fat` untouched, if the entry lies past its end.
#[must_use]
pub fn write_entry(fat: &mut [u8], cluster: u16, value: u16) -> bool {
    let idx = entry_index(cluster);
    let Some(bytes) = fat.get_mut(idx..idx + 2)
    else {
        return false;
    };
    let word = u16::from_le_bytes([bytes[0], bytes[1]]);
    let value = value & FAT12_ENTRY_MASK;
    let word = if cluster & 1 == 0 {
        (word & 0xF000) | value
    }
    else {
        (word & 0x000F) | (value << 4)
    };
    bytes.copy_from_slice(&word.to_le_bytes());
    true
}

/// A working copy of the first FAT. Changes are made in memory and written back to
/// every FAT copy with [FatTable::store].
#[derive(Clone, Debug)]
pub struct FatTable {
    bytes: Vec<u8>,
}

impl FatTable {
    pub fn from_bytes(bytes: Vec<u8>) -> FatTable {
        FatTable { bytes }
    }

    /// Read the first FAT copy from the image.
    pub fn load(image: &mut DiskImage, geometry: &Fat12Geometry) -> FloppyResult<FatTable> {
        let bytes = image.read_vec(geometry.fat_copy_offset(0), geometry.fat_len())?;
        Ok(FatTable { bytes })
    }

    /// Write this table to every FAT copy on the image.
    pub fn store(&self, image: &mut DiskImage, geometry: &Fat12Geometry) -> FloppyResult<()> {
        for copy in 0..geometry.fat_count {
            image.write_at(geometry.fat_copy_offset(copy), &self.bytes)?;
        }
        log::trace!("Wrote {} FAT copies of {} bytes", geometry.fat_count, self.bytes.len());
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn entry(&self, cluster: u16) -> Option<u16> {
        read_entry(&self.bytes, cluster)
    }

    #[must_use]
    pub fn set_entry(&mut self, cluster: u16, value: u16) -> bool {
        write_entry(&mut self.bytes, cluster, value)
    }

    /// Count of free entries among the data clusters of the volume.
    pub fn free_count(&self, geometry: &Fat12Geometry) -> usize {
        (2..geometry.cluster_limit())
            .filter(|&c| self.entry(c as u16) == Some(FAT12_FREE))
            .count()
    }
}
