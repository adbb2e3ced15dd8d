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

    fat12::bpb.rs

    Parses the BIOS Parameter Block of a FAT12 volume into its derived geometry.
*/

use std::io::Cursor;

use binrw::{binrw, BinRead};

use crate::{
    error::{FloppyError, FloppyResult},
    fat12::DIR_ENTRY_SIZE,
    image::{DiskImage, SECTOR_SIZE},
};

/// The DOS 3.31 BIOS Parameter Block as found at the start of the boot sector.
#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(little)]
pub struct BiosParameterBlock {
    pub jump: [u8; 3],           // 0x00
    pub oem_name: [u8; 8],       // 0x03
    pub bytes_per_sector: u16,   // 0x0B
    pub sectors_per_cluster: u8, // 0x0D
    pub reserved_sectors: u16,   // 0x0E
    pub fat_count: u8,           // 0x10
    pub root_entry_count: u16,   // 0x11
    pub total_sectors_16: u16,   // 0x13
    pub media_descriptor: u8,    // 0x15
    pub sectors_per_fat: u16,    // 0x16
    pub sectors_per_track: u16,  // 0x18
    pub head_count: u16,         // 0x1A
    pub hidden_sectors: u32,     // 0x1C
    pub total_sectors_32: u32,   // 0x20
}

/// Volume layout derived from the BPB. All offsets are absolute byte offsets into the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fat12Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub root_entry_count: u32,
    pub sectors_per_fat: u32,
    pub root_dir_sectors: u32,
    pub total_sectors: u32,
    pub fat_offset: u64,
    pub root_dir_offset: u64,
    pub data_offset: u64,
    pub bytes_per_cluster: u32,
    pub total_clusters: u32,
}

impl Fat12Geometry {
    /// Derive geometry from a parsed BPB. `image_size` is used when the BPB declares no
    /// sector count at all.
    pub fn from_bpb(bpb: &BiosParameterBlock, image_size: u64) -> FloppyResult<Fat12Geometry> {
        if bpb.bytes_per_sector == 0 {
            return Err(FloppyError::GeometryInvalid("bytes per sector is zero".into()));
        }
        if bpb.sectors_per_cluster == 0 {
            return Err(FloppyError::GeometryInvalid("sectors per cluster is zero".into()));
        }
        if bpb.fat_count == 0 {
            return Err(FloppyError::GeometryInvalid("FAT count is zero".into()));
        }
        if bpb.sectors_per_fat == 0 {
            return Err(FloppyError::GeometryInvalid("sectors per FAT is zero".into()));
        }

        let bytes_per_sector = bpb.bytes_per_sector as u32;
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        let reserved_sectors = bpb.reserved_sectors as u32;
        let fat_count = bpb.fat_count as u32;
        let root_entry_count = bpb.root_entry_count as u32;
        let sectors_per_fat = bpb.sectors_per_fat as u32;

        let total_sectors = if bpb.total_sectors_16 != 0 {
            bpb.total_sectors_16 as u32
        }
        else if bpb.total_sectors_32 != 0 {
            bpb.total_sectors_32
        }
        else {
            (image_size / bytes_per_sector as u64) as u32
        };

        let root_dir_sectors = (root_entry_count * DIR_ENTRY_SIZE as u32).div_ceil(bytes_per_sector);
        let first_data_sector = reserved_sectors + fat_count * sectors_per_fat + root_dir_sectors;
        let bytes_per_cluster = bytes_per_sector * sectors_per_cluster;
        let total_clusters = total_sectors.saturating_sub(first_data_sector) / sectors_per_cluster;

        let fat_offset = reserved_sectors as u64 * bytes_per_sector as u64;
        let root_dir_offset = fat_offset + (fat_count as u64 * sectors_per_fat as u64 * bytes_per_sector as u64);
        let data_offset = root_dir_offset + root_dir_sectors as u64 * bytes_per_sector as u64;

        Ok(Fat12Geometry {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            root_entry_count,
            sectors_per_fat,
            root_dir_sectors,
            total_sectors,
            fat_offset,
            root_dir_offset,
            data_offset,
            bytes_per_cluster,
            total_clusters,
        })
    }

    /// Parse the first sector of an image.
    pub fn from_boot_sector(sector: &[u8], image_size: u64) -> FloppyResult<Fat12Geometry> {
        let bpb = BiosParameterBlock::read(&mut Cursor::new(sector))?;
        Fat12Geometry::from_bpb(&bpb, image_size)
    }

    pub fn load(image: &mut DiskImage) -> FloppyResult<Fat12Geometry> {
        let mut sector = [0u8; SECTOR_SIZE];
        image.read_at(0, &mut sector)?;
        let geometry = Fat12Geometry::from_boot_sector(&sector, image.size())?;
        log::trace!("Loaded FAT12 geometry: {:?}", geometry);
        Ok(geometry)
    }

    /// Size of one FAT copy in bytes.
    pub fn fat_len(&self) -> usize {
        (self.sectors_per_fat * self.bytes_per_sector) as usize
    }

    /// Byte offset of FAT copy `index`.
    pub fn fat_copy_offset(&self, index: u32) -> u64 {
        self.fat_offset + index as u64 * self.fat_len() as u64
    }

    /// Size of the root directory region in bytes.
    pub fn root_dir_len(&self) -> usize {
        (self.root_dir_sectors * self.bytes_per_sector) as usize
    }

    /// Byte offset of data cluster `cluster`. Cluster numbering starts at 2.
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        self.data_offset + (cluster as u64).saturating_sub(2) * self.bytes_per_cluster as u64
    }

    /// One past the highest valid cluster number.
    pub fn cluster_limit(&self) -> u32 {
        self.total_clusters + 2
    }

    pub fn is_valid_cluster(&self, cluster: u16) -> bool {
        cluster >= 2 && (cluster as u32) < self.cluster_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinWrite;

    fn bpb_1440k() -> BiosParameterBlock {
        BiosParameterBlock {
            jump: [0xEB, 0x3C, 0x90],
            oem_name: *b"MSDOS5.0",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            fat_count: 2,
            root_entry_count: 224,
            total_sectors_16: 2880,
            media_descriptor: 0xF0,
            sectors_per_fat: 9,
            sectors_per_track: 18,
            head_count: 2,
            hidden_sectors: 0,
            total_sectors_32: 0,
        }
    }

    fn sector_for(bpb: &BiosParameterBlock) -> Vec<u8> {
        let mut cursor = Cursor::new(vec![0u8; SECTOR_SIZE]);
        bpb.write(&mut cursor).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn classic_1440k_layout() {
        let sector = sector_for(&bpb_1440k());
        assert_eq!(&sector[0x0B..0x0D], &[0x00, 0x02]);
        assert_eq!(sector[0x15], 0xF0);

        let g = Fat12Geometry::from_boot_sector(&sector, 1_474_560).unwrap();
        assert_eq!(g.root_dir_sectors, 14);
        assert_eq!(g.fat_offset, 512);
        assert_eq!(g.root_dir_offset, 512 + 2 * 9 * 512);
        assert_eq!(g.data_offset, 33 * 512);
        assert_eq!(g.bytes_per_cluster, 512);
        assert_eq!(g.total_clusters, 2880 - 33);
        assert_eq!(g.cluster_offset(2), 33 * 512);
        assert_eq!(g.fat_copy_offset(1), 512 + 9 * 512);
    }

    #[test]
    fn total_sector_fallbacks() {
        let mut bpb = bpb_1440k();
        bpb.total_sectors_16 = 0;
        bpb.total_sectors_32 = 1440;
        let g = Fat12Geometry::from_bpb(&bpb, 0).unwrap();
        assert_eq!(g.total_sectors, 1440);

        bpb.total_sectors_32 = 0;
        let g = Fat12Geometry::from_bpb(&bpb, 737_280).unwrap();
        assert_eq!(g.total_sectors, 1440);
    }

    #[test]
    fn root_dir_sectors_round_up() {
        let mut bpb = bpb_1440k();
        bpb.root_entry_count = 17;
        let g = Fat12Geometry::from_bpb(&bpb, 0).unwrap();
        assert_eq!(g.root_dir_sectors, 2);
    }

    #[test]
    fn zero_fields_are_rejected() {
        let zeroed: [fn(&mut BiosParameterBlock); 4] = [
            |b| b.bytes_per_sector = 0,
            |b| b.sectors_per_cluster = 0,
            |b| b.fat_count = 0,
            |b| b.sectors_per_fat = 0,
        ];
        for zero in zeroed {
            let mut bpb = bpb_1440k();
            zero(&mut bpb);
            assert!(matches!(
                Fat12Geometry::from_bpb(&bpb, 1_474_560),
                Err(FloppyError::GeometryInvalid(_))
            ));
        }
    }
}
