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

    fat12::mutate.rs

    File injection, deletion and renaming on a FAT12 volume.
*/

//! Mutations are performed in memory against a working FAT and then written out in the
//! order data, FAT copies, directory entry (or directory entry then FAT on delete), so that
//! a failure partway through can leave an orphaned chain but never a directory entry that
//! points at unwritten clusters. Writes already made are not rolled back.

use crate::{
    error::{FloppyError, FloppyResult},
    fat12::{
        bpb::Fat12Geometry,
        chain::{allocate, free_chain, link_chain, read_chain},
        dir::{
            build_tree,
            read_volume_tree,
            DirectoryEntryNode,
            DirectoryRegion,
            EntryLocation,
            NodeKind,
            RawDirEntry,
            ATTR_LONG_NAME,
            ATTR_LONG_NAME_MASK,
            ATTR_VOLUME_ID,
            ENTRY_DELETED,
            ENTRY_END,
        },
        FatTable,
        DIR_ENTRY_SIZE,
    },
    image::DiskImage,
};

/// Build the 11-byte short name field for `name`: the last path component, uppercased,
/// with anything outside `[A-Z0-9]` replaced by `_`, base truncated to 8 and extension to 3.
pub fn short_name_field(name: &str) -> FloppyResult<[u8; 11]> {
    let component = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let upper = component.to_uppercase();
    let (base, ext) = match upper.rfind('.') {
        Some(dot) => (&upper[..dot], &upper[dot + 1..]),
        None => (upper.as_str(), ""),
    };

    let sanitize = |part: &str, len: usize| -> Vec<u8> {
        part.chars()
            .map(|c| {
                if c.is_ascii_uppercase() || c.is_ascii_digit() {
                    c as u8
                }
                else {
                    b'_'
                }
            })
            .take(len)
            .collect()
    };

    let base = sanitize(base, 8);
    let ext = sanitize(ext, 3);
    if base.is_empty() {
        return Err(FloppyError::InvalidName(name.to_string()));
    }

    let mut field = [b' '; 11];
    field[..base.len()].copy_from_slice(&base);
    field[8..8 + ext.len()].copy_from_slice(&ext);
    Ok(field)
}

enum RootSlot {
    /// Index of the matching short entry, the entry, and the long-name fragments before it.
    Existing(usize, RawDirEntry, Vec<usize>),
    Free(usize),
}

/// Find the root entry whose short name is `short`, or else the first free slot.
fn find_root_slot(root: &DirectoryRegion, short: &[u8; 11]) -> FloppyResult<RootSlot> {
    let mut free = None;
    let mut fragments = Vec::new();
    for index in 0..root.entry_count() {
        let raw = root.entry(index);
        match raw[0] {
            ENTRY_END => {
                free.get_or_insert(index);
                break;
            }
            ENTRY_DELETED => {
                free.get_or_insert(index);
                fragments.clear();
                continue;
            }
            _ => {}
        }
        let attributes = raw[11];
        if attributes & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
            fragments.push(index);
            continue;
        }
        if attributes & ATTR_VOLUME_ID != 0 {
            fragments.clear();
            continue;
        }
        if &raw[..11] == short {
            return Ok(RootSlot::Existing(index, RawDirEntry::parse(raw)?, fragments));
        }
        fragments.clear();
    }
    free.map(RootSlot::Free).ok_or(FloppyError::DirectoryFull)
}

/// Write `data` into the root directory as `name`, replacing a file with the same short name.
pub fn add_file(image: &mut DiskImage, name: &str, data: &[u8]) -> FloppyResult<()> {
    let short = short_name_field(name)?;
    let geometry = Fat12Geometry::load(image)?;
    let mut fat = FatTable::load(image, &geometry)?;
    let root = DirectoryRegion::root(image, &geometry)?;

    let cluster_len = geometry.bytes_per_cluster as usize;
    let needed = data.len().div_ceil(cluster_len);
    let size = u32::try_from(data.len()).map_err(|_| FloppyError::CapacityExhausted {
        needed,
        available: fat.free_count(&geometry),
    })?;

    let (index, stale_fragments) = match find_root_slot(&root, &short)? {
        RootSlot::Existing(index, entry, fragments) => {
            if entry.is_directory() {
                return Err(FloppyError::NotAFile(entry.short_name()));
            }
            if geometry.is_valid_cluster(entry.first_cluster) {
                let freed = free_chain(&geometry, &mut fat, entry.first_cluster);
                log::debug!("Overwriting {}: released {} clusters", entry.short_name(), freed);
            }
            (index, fragments)
        }
        RootSlot::Free(index) => (index, Vec::new()),
    };

    let clusters = allocate(&geometry, &fat, needed)?;
    link_chain(&mut fat, &clusters)?;

    let mut buf = vec![0u8; cluster_len];
    for (chunk, &cluster) in data.chunks(cluster_len).zip(clusters.iter()) {
        buf[..chunk.len()].copy_from_slice(chunk);
        buf[chunk.len()..].fill(0);
        image.write_at(geometry.cluster_offset(cluster), &buf)?;
    }
    fat.store(image, &geometry)?;
    image.flush()?;

    let first_cluster = clusters.first().copied().unwrap_or(0);
    let entry = RawDirEntry::new_file(&short, first_cluster, size);
    // Drop the long name of the entry being replaced
    let stale: Vec<u64> = stale_fragments.iter().map(|&i| root.entry_offset(i)).collect();
    mark_deleted(image, &stale)?;
    image.write_at(root.entry_offset(index), &entry.to_bytes()?)?;
    image.flush()?;

    log::debug!(
        "Added {} ({} bytes, {} clusters from {})",
        entry.short_name(),
        size,
        clusters.len(),
        first_cluster
    );
    Ok(())
}

/// Confirm that the short entry recorded for `node` still describes it (same first cluster
/// and size); otherwise fall back to scanning the root directory for its short name.
fn locate_entry(image: &mut DiskImage, geometry: &Fat12Geometry, node: &DirectoryEntryNode) -> FloppyResult<EntryLocation> {
    if let Some(location) = &node.location {
        let raw = RawDirEntry::parse(&image.read_vec(location.entry_offset, DIR_ENTRY_SIZE)?)?;
        if raw.first_cluster == node.first_cluster && raw.file_size as u64 == node.size {
            return Ok(location.clone());
        }
        log::warn!("Directory entry for {} moved, rescanning root directory", node.name);
    }

    let root = DirectoryRegion::root(image, geometry)?;
    for index in 0..root.entry_count() {
        let raw = root.entry(index);
        if raw[0] == ENTRY_END {
            break;
        }
        if raw[0] == ENTRY_DELETED || raw[11] & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
            continue;
        }
        if RawDirEntry::parse(raw)?.short_name() == node.short_name {
            return Ok(EntryLocation {
                entry_offset: root.entry_offset(index),
                lfn_offsets:  Vec::new(),
            });
        }
    }
    Err(FloppyError::EntryNotFound(node.name.clone()))
}

fn find_file<'a>(tree: &'a DirectoryEntryNode, name: &str) -> FloppyResult<&'a DirectoryEntryNode> {
    match tree.find(name) {
        Some(node) if node.kind == NodeKind::File => Ok(node),
        Some(node) => Err(FloppyError::NotAFile(node.name.clone())),
        None => Err(FloppyError::EntryNotFound(name.to_string())),
    }
}

fn mark_deleted(image: &mut DiskImage, offsets: &[u64]) -> FloppyResult<()> {
    for &offset in offsets {
        image.write_byte(offset, ENTRY_DELETED)?;
    }
    Ok(())
}

/// Delete the file `name`: its short entry and long-name fragments are marked deleted and
/// its cluster chain is released in every FAT copy.
pub fn delete_file(image: &mut DiskImage, name: &str) -> FloppyResult<()> {
    let geometry = Fat12Geometry::load(image)?;
    let mut fat = FatTable::load(image, &geometry)?;
    let tree = build_tree(image, &geometry, &fat)?;
    let node = find_file(&tree, name)?;
    let location = locate_entry(image, &geometry, node)?;

    let freed = if geometry.is_valid_cluster(node.first_cluster) {
        free_chain(&geometry, &mut fat, node.first_cluster)
    }
    else {
        0
    };

    mark_deleted(image, &location.lfn_offsets)?;
    mark_deleted(image, &[location.entry_offset])?;
    image.flush()?;
    fat.store(image, &geometry)?;
    image.flush()?;

    log::debug!("Deleted {}: released {} clusters", node.name, freed);
    Ok(())
}

/// Give the file `name` the short name derived from `new_name`. Long-name fragments of the
/// old name are dropped.
pub fn rename_file(image: &mut DiskImage, name: &str, new_name: &str) -> FloppyResult<()> {
    let short = short_name_field(new_name)?;
    let geometry = Fat12Geometry::load(image)?;
    let fat = FatTable::load(image, &geometry)?;
    let tree = build_tree(image, &geometry, &fat)?;
    let node = find_file(&tree, name)?;

    let mut renamed = RawDirEntry::default();
    renamed.set_short_name(&short);
    let new_display = renamed.short_name();
    let siblings = tree.parent_of(node).map(|p| p.children.as_slice()).unwrap_or_default();
    if siblings
        .iter()
        .any(|s| !std::ptr::eq(s, node) && s.short_name.eq_ignore_ascii_case(&new_display))
    {
        return Err(FloppyError::NameExists(new_display));
    }

    let location = locate_entry(image, &geometry, node)?;
    let mut entry = RawDirEntry::parse(&image.read_vec(location.entry_offset, DIR_ENTRY_SIZE)?)?;
    entry.set_short_name(&short);

    mark_deleted(image, &location.lfn_offsets)?;
    image.write_at(location.entry_offset, &entry.to_bytes()?)?;
    image.flush()?;

    log::debug!("Renamed {} to {}", node.name, new_display);
    Ok(())
}

/// Read the contents of file `name`, truncated to its recorded size.
pub fn read_file(image: &mut DiskImage, name: &str) -> FloppyResult<Vec<u8>> {
    let geometry = Fat12Geometry::load(image)?;
    let fat = FatTable::load(image, &geometry)?;
    let tree = build_tree(image, &geometry, &fat)?;
    let node = find_file(&tree, name)?;

    if node.size == 0 {
        return Ok(Vec::new());
    }
    let mut data = read_chain(image, &geometry, &fat, node.first_cluster)?;
    if (data.len() as u64) < node.size {
        log::warn!(
            "Chain of {} holds {} bytes, directory says {}",
            node.name,
            data.len(),
            node.size
        );
    }
    data.truncate(node.size as usize);
    Ok(data)
}

/// Size of file `name` as recorded in its directory entry.
pub fn file_size(image: &mut DiskImage, name: &str) -> FloppyResult<u64> {
    let tree = read_volume_tree(image)?;
    Ok(find_file(&tree, name)?.size)
}
