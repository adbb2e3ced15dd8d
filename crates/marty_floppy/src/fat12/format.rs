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

    fat12::format.rs

    Writes an empty FAT12 file system onto a disk image.
*/

use std::{
    fs::File,
    io::Cursor,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use binrw::{binrw, BinWrite};
use strum_macros::{Display, EnumIter};

use crate::{
    error::FloppyResult,
    fat12::{
        bpb::BiosParameterBlock,
        dir::{RawDirEntry, ATTR_VOLUME_ID},
        table::write_entry,
        Fat12Geometry,
        FAT12_END_OF_CHAIN,
    },
    image::{DiskImage, SECTOR_SIZE},
};

pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;
pub const EXTENDED_BPB_OFFSET: usize = 0x24;

/// The extended boot record that follows the BPB on DOS 4.0+ volumes.
#[binrw]
#[derive(Clone, Debug)]
#[brw(little)]
pub struct ExtendedBootRecord {
    pub drive_number: u8,       // 0x24
    pub reserved: u8,           // 0x25
    pub boot_signature: u8,     // 0x26
    pub volume_id: u32,         // 0x27
    pub volume_label: [u8; 11], // 0x2B
    pub fs_type: [u8; 8],       // 0x36
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display, EnumIter)]
pub enum VolumeLayout {
    #[default]
    #[strum(serialize = "1.44M")]
    Pc1440K,
    #[strum(serialize = "720K")]
    Pc720K,
}

impl VolumeLayout {
    pub fn bpb(&self) -> BiosParameterBlock {
        let (spc, root_entries, total, media, spf, spt) = match self {
            VolumeLayout::Pc1440K => (1, 224, 2880, 0xF0, 9, 18),
            VolumeLayout::Pc720K => (2, 112, 1440, 0xF9, 3, 9),
        };
        BiosParameterBlock {
            jump: [0xEB, 0x3C, 0x90],
            oem_name: *b"MARTYPC ",
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster: spc,
            reserved_sectors: 1,
            fat_count: 2,
            root_entry_count: root_entries,
            total_sectors_16: total,
            media_descriptor: media,
            sectors_per_fat: spf,
            sectors_per_track: spt,
            head_count: 2,
            hidden_sectors: 0,
            total_sectors_32: 0,
        }
    }

    /// Image size in bytes.
    pub fn size(&self) -> u64 {
        self.bpb().total_sectors_16 as u64 * SECTOR_SIZE as u64
    }
}

fn label_field(label: &str) -> [u8; 11] {
    let mut field = [b' '; 11];
    for (dst, c) in field.iter_mut().zip(label.chars().filter(|c| c.is_ascii() && !c.is_ascii_control())) {
        *dst = c.to_ascii_uppercase() as u8;
    }
    field
}

/// Write boot sector, empty FATs and an empty root directory. The data area is left as is.
pub fn format_volume(image: &mut DiskImage, layout: VolumeLayout, label: Option<&str>) -> FloppyResult<()> {
    let bpb = layout.bpb();
    let geometry = Fat12Geometry::from_bpb(&bpb, layout.size())?;

    let volume_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    let ebr = ExtendedBootRecord {
        drive_number: 0,
        reserved: 0,
        boot_signature: 0x29,
        volume_id,
        volume_label: label.map(label_field).unwrap_or(*b"NO NAME    "),
        fs_type: *b"FAT12   ",
    };

    let mut boot = Cursor::new(vec![0u8; SECTOR_SIZE]);
    bpb.write(&mut boot)?;
    boot.set_position(EXTENDED_BPB_OFFSET as u64);
    ebr.write(&mut boot)?;
    let mut boot = boot.into_inner();
    boot[BOOT_SIGNATURE_OFFSET] = 0x55;
    boot[BOOT_SIGNATURE_OFFSET + 1] = 0xAA;

    // Clear everything up to the data area, then lay down the structures
    image.write_at(0, &vec![0u8; geometry.data_offset as usize])?;
    image.write_at(0, &boot)?;

    let mut fat = vec![0u8; geometry.fat_len()];
    let reserved = write_entry(&mut fat, 0, 0xF00 | bpb.media_descriptor as u16)
        && write_entry(&mut fat, 1, FAT12_END_OF_CHAIN);
    debug_assert!(reserved);
    for copy in 0..geometry.fat_count {
        image.write_at(geometry.fat_copy_offset(copy), &fat)?;
    }

    if let Some(label) = label {
        let mut entry = RawDirEntry::default();
        entry.set_short_name(&label_field(label));
        entry.attributes = ATTR_VOLUME_ID;
        image.write_at(geometry.root_dir_offset, &entry.to_bytes()?)?;
    }
    image.flush()?;

    log::info!(
        "Formatted {} as {} FAT12 ({} clusters)",
        image.name(),
        layout,
        geometry.total_clusters
    );
    Ok(())
}

/// Create a new image file at `path` sized for `layout` and format it.
pub fn create_image(path: impl AsRef<Path>, layout: VolumeLayout, label: Option<&str>) -> FloppyResult<DiskImage> {
    let path = path.as_ref();
    let file = File::create(path)?;
    file.set_len(layout.size())?;
    drop(file);

    let mut image = DiskImage::open(path)?;
    format_volume(&mut image, layout, label)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fat12::{dir::read_volume_tree, FatTable},
        test_util::TempImage,
    };
    use strum::IntoEnumIterator;

    #[test]
    fn formatted_volumes_are_empty() {
        for layout in VolumeLayout::iter() {
            let tmp = TempImage::with_bytes(&[0xCC; 16]);
            let mut image = create_image(tmp.path(), layout, Some("blank")).unwrap();
            assert_eq!(image.size(), layout.size());

            let geometry = Fat12Geometry::load(&mut image).unwrap();
            let fat = FatTable::load(&mut image, &geometry).unwrap();
            assert_eq!(fat.entry(0), Some(0xF00 | layout.bpb().media_descriptor as u16));
            assert_eq!(fat.entry(1), Some(FAT12_END_OF_CHAIN));
            assert_eq!(fat.free_count(&geometry), geometry.total_clusters as usize);

            let tree = read_volume_tree(&mut image).unwrap();
            assert!(tree.children.is_empty());
            assert_eq!(tree.free, tree.capacity);
            assert_eq!(tree.size, 0);
        }
    }

    #[test]
    fn boot_sector_layout() {
        let tmp = TempImage::formatted();
        let bytes = tmp.bytes();
        assert_eq!(&bytes[0x0B..0x0D], &[0x00, 0x02]);
        assert_eq!(bytes[0x26], 0x29);
        assert_eq!(&bytes[0x2B..0x36], b"TESTDISK   ");
        assert_eq!(&bytes[0x36..0x3E], b"FAT12   ");
        assert_eq!(&bytes[0x1FE..0x200], &[0x55, 0xAA]);
    }
}
