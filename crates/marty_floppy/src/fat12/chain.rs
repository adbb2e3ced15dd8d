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

    fat12::chain.rs

    Cluster chain traversal and allocation.
*/

use crate::{
    error::{FloppyError, FloppyResult},
    fat12::{Fat12Geometry, FatTable, FAT12_END_OF_CHAIN, FAT12_END_OF_CHAIN_MIN, FAT12_FREE},
    image::DiskImage,
};

/// Follow the chain starting at `start` and return its cluster numbers in order.
///
/// The walk stops at an end-of-chain marker, at a free entry (a truncated chain), or at any
/// cluster number outside the data area. It never takes more than `total_clusters + 2`
/// steps, so a cyclic table terminates with whatever was collected.
pub fn chain_clusters(geometry: &Fat12Geometry, fat: &FatTable, start: u16) -> Vec<u16> {
    let limit = geometry.cluster_limit();
    let mut clusters = Vec::new();
    let mut cluster = start;

    for _ in 0..limit {
        if !geometry.is_valid_cluster(cluster) {
            break;
        }
        clusters.push(cluster);

        match fat.entry(cluster) {
            Some(next) if next >= FAT12_END_OF_CHAIN_MIN => break,
            Some(FAT12_FREE) => {
                log::warn!("Cluster chain from {} hit free cluster after {}", start, cluster);
                break;
            }
            Some(next) => cluster = next,
            None => {
                log::warn!("Cluster {} lies past the end of the FAT", cluster);
                break;
            }
        }
    }
    clusters
}

/// Return the concatenated contents of every cluster in the chain starting at `start`.
pub fn read_chain(
    image: &mut DiskImage,
    geometry: &Fat12Geometry,
    fat: &FatTable,
    start: u16,
) -> FloppyResult<Vec<u8>> {
    let clusters = chain_clusters(geometry, fat, start);
    let cluster_len = geometry.bytes_per_cluster as usize;
    let mut data = vec![0u8; clusters.len() * cluster_len];

    for (chunk, &cluster) in data.chunks_exact_mut(cluster_len).zip(clusters.iter()) {
        image.read_at(geometry.cluster_offset(cluster), chunk)?;
    }
    Ok(data)
}

/// Collect `count` free clusters, scanning upward from cluster 2. Nothing is marked used.
pub fn allocate(geometry: &Fat12Geometry, fat: &FatTable, count: usize) -> FloppyResult<Vec<u16>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let free: Vec<u16> = (2..geometry.cluster_limit())
        .map(|c| c as u16)
        .filter(|&c| fat.entry(c) == Some(FAT12_FREE))
        .take(count)
        .collect();

    if free.len() < count {
        return Err(FloppyError::CapacityExhausted {
            needed: count,
            available: free.len(),
        });
    }
    Ok(free)
}

/// Link `clusters` into a chain in order, terminating the last with an end-of-chain marker.
pub fn link_chain(fat: &mut FatTable, clusters: &[u16]) -> FloppyResult<()> {
    for (i, &cluster) in clusters.iter().enumerate() {
        let next = clusters.get(i + 1).copied().unwrap_or(FAT12_END_OF_CHAIN);
        if !fat.set_entry(cluster, next) {
            return Err(FloppyError::GeometryInvalid(format!(
                "cluster {} lies past the end of the FAT",
                cluster
            )));
        }
    }
    Ok(())
}

/// Mark every cluster of the chain starting at `start` as free. Returns the number freed.
pub fn free_chain(geometry: &Fat12Geometry, fat: &mut FatTable, start: u16) -> usize {
    let clusters = chain_clusters(geometry, fat, start);
    for &cluster in &clusters {
        // chain_clusters only yields clusters it could read, so the write is in range
        let _ = fat.set_entry(cluster, FAT12_FREE);
    }
    clusters.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TempImage;

    fn small_geometry() -> Fat12Geometry {
        let mut sector = vec![0u8; 512];
        sector[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        sector[0x0D] = 1;
        sector[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes());
        sector[0x10] = 2;
        sector[0x11..0x13].copy_from_slice(&16u16.to_le_bytes());
        sector[0x13..0x15].copy_from_slice(&40u16.to_le_bytes());
        sector[0x16..0x18].copy_from_slice(&1u16.to_le_bytes());
        Fat12Geometry::from_boot_sector(&sector, 40 * 512).unwrap()
    }

    #[test]
    fn cyclic_chain_terminates() {
        let geometry = small_geometry();
        // 1 reserved + 2 FATs + 1 root dir sector -> 36 data clusters
        assert_eq!(geometry.total_clusters, 36);

        let mut fat = FatTable::from_bytes(vec![0u8; 512]);
        assert!(fat.set_entry(2, 3));
        assert!(fat.set_entry(3, 4));
        assert!(fat.set_entry(4, 2));
        let clusters = chain_clusters(&geometry, &fat, 2);
        assert_eq!(clusters.len(), geometry.cluster_limit() as usize);
        assert_eq!(&clusters[..4], &[2, 3, 4, 2]);

        // Self loop
        assert!(fat.set_entry(10, 10));
        assert_eq!(chain_clusters(&geometry, &fat, 10).len(), 38);
    }

    #[test]
    fn chain_stops_on_free_and_out_of_range() {
        let geometry = small_geometry();
        let mut fat = FatTable::from_bytes(vec![0u8; 512]);
        assert!(fat.set_entry(2, 5));
        assert_eq!(chain_clusters(&geometry, &fat, 2), vec![2, 5]);

        assert!(fat.set_entry(6, 0x7FF));
        assert_eq!(chain_clusters(&geometry, &fat, 6), vec![6]);
        assert!(chain_clusters(&geometry, &fat, 0).is_empty());
        assert!(chain_clusters(&geometry, &fat, 1).is_empty());
    }

    #[test]
    fn allocate_and_free() {
        let geometry = small_geometry();
        let mut fat = FatTable::from_bytes(vec![0u8; 512]);
        assert!(fat.set_entry(2, FAT12_END_OF_CHAIN));
        assert!(fat.set_entry(4, FAT12_END_OF_CHAIN));

        let clusters = allocate(&geometry, &fat, 3).unwrap();
        assert_eq!(clusters, vec![3, 5, 6]);
        link_chain(&mut fat, &clusters).unwrap();
        assert_eq!(chain_clusters(&geometry, &fat, 3), vec![3, 5, 6]);
        assert_eq!(fat.entry(6), Some(FAT12_END_OF_CHAIN));
        assert_eq!(fat.free_count(&geometry), 36 - 5);

        assert_eq!(free_chain(&geometry, &mut fat, 3), 3);
        assert_eq!(fat.free_count(&geometry), 36 - 2);

        assert!(matches!(
            allocate(&geometry, &fat, 35),
            Err(FloppyError::CapacityExhausted { needed: 35, available: 34 })
        ));
    }

    #[test]
    fn read_chain_concatenates_clusters() {
        let tmp = TempImage::formatted();
        let mut image = DiskImage::open(tmp.path()).unwrap();
        let geometry = Fat12Geometry::load(&mut image).unwrap();
        let mut fat = FatTable::load(&mut image, &geometry).unwrap();

        image.write_at(geometry.cluster_offset(7), &[0x77; 512]).unwrap();
        image.write_at(geometry.cluster_offset(3), &[0x33; 512]).unwrap();
        link_chain(&mut fat, &[7, 3]).unwrap();

        let data = read_chain(&mut image, &geometry, &fat, 7).unwrap();
        assert_eq!(data.len(), 1024);
        assert!(data[..512].iter().all(|&b| b == 0x77));
        assert!(data[512..].iter().all(|&b| b == 0x33));
    }
}
