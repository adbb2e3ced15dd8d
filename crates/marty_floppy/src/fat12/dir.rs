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

    fat12::dir.rs

    Decodes FAT12 directories, including VFAT long names, into a tree of entries.
*/

use std::{collections::HashSet, io::Cursor};

use binrw::{binrw, BinRead, BinWrite};
use strum_macros::IntoStaticStr;

use crate::{
    error::FloppyResult,
    fat12::{chain::chain_clusters, Fat12Geometry, FatTable, DIR_ENTRY_SIZE},
    image::DiskImage,
};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;
pub const ATTR_LONG_NAME_MASK: u8 = 0x3F;

pub const ENTRY_END: u8 = 0x00;
pub const ENTRY_DELETED: u8 = 0xE5;
/// A leading 0x05 stands for a real 0xE5 in the first character of a name.
pub const ENTRY_E5_ESCAPE: u8 = 0x05;

pub const LFN_LAST_FRAGMENT: u8 = 0x40;
pub const LFN_SEQUENCE_MASK: u8 = 0x1F;
pub const LFN_UNITS_PER_FRAGMENT: usize = 13;

/// Subdirectories nested deeper than this are listed without their contents.
pub const MAX_DIRECTORY_DEPTH: usize = 16;

/// The 32-byte short (8.3) directory entry.
#[binrw]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[brw(little)]
pub struct RawDirEntry {
    pub name: [u8; 8],          // 0x00
    pub ext: [u8; 3],           // 0x08
    pub attributes: u8,         // 0x0B
    pub reserved: u8,           // 0x0C
    pub create_time_tenths: u8, // 0x0D
    pub create_time: u16,       // 0x0E
    pub create_date: u16,       // 0x10
    pub access_date: u16,       // 0x12
    pub first_cluster_hi: u16,  // 0x14
    pub write_time: u16,        // 0x16
    pub write_date: u16,        // 0x18
    pub first_cluster: u16,     // 0x1A
    pub file_size: u32,         // 0x1C
}

impl RawDirEntry {
    pub fn parse(bytes: &[u8]) -> FloppyResult<RawDirEntry> {
        Ok(RawDirEntry::read(&mut Cursor::new(bytes))?)
    }

    pub fn to_bytes(&self) -> FloppyResult<[u8; DIR_ENTRY_SIZE]> {
        let mut cursor = Cursor::new([0u8; DIR_ENTRY_SIZE]);
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// A new archive entry for a file.
    pub fn new_file(short_name: &[u8; 11], first_cluster: u16, size: u32) -> RawDirEntry {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&short_name[..8]);
        ext.copy_from_slice(&short_name[8..]);
        RawDirEntry {
            name,
            ext,
            attributes: ATTR_ARCHIVE,
            first_cluster,
            file_size: size,
            ..Default::default()
        }
    }

    /// The name and extension fields as stored, 11 bytes, space padded.
    pub fn short_name_bytes(&self) -> [u8; 11] {
        let mut out = [0u8; 11];
        out[..8].copy_from_slice(&self.name);
        out[8..].copy_from_slice(&self.ext);
        out
    }

    pub fn set_short_name(&mut self, short_name: &[u8; 11]) {
        self.name.copy_from_slice(&short_name[..8]);
        self.ext.copy_from_slice(&short_name[8..]);
    }

    /// The 8.3 name with padding trimmed and the 0x05 escape undone, e.g. `COMMAND.COM`.
    pub fn short_name(&self) -> String {
        let mut name = self.name;
        if name[0] == ENTRY_E5_ESCAPE {
            name[0] = ENTRY_DELETED;
        }
        let base = latin1_trimmed(&name);
        let ext = latin1_trimmed(&self.ext);
        if ext.is_empty() {
            base
        }
        else {
            format!("{}.{}", base, ext)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn modified(&self) -> Option<String> {
        decode_timestamp(self.write_date, self.write_time)
    }
}

fn latin1_trimmed(bytes: &[u8]) -> String {
    let s: String = bytes.iter().map(|&b| b as char).collect();
    s.trim_end_matches(' ').to_string()
}

/// Format a FAT date/time pair as `YYYY-MM-DD HH:MM:SS`. Returns None if both are zero.
///
/// Time: hour (5 bits) | minute (6 bits) | seconds / 2 (5 bits)
/// Date: years since 1980 (7 bits) | month (4 bits) | day (5 bits)
pub fn decode_timestamp(date: u16, time: u16) -> Option<String> {
    if date == 0 && time == 0 {
        return None;
    }
    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        1980 + (date >> 9),
        (date >> 5) & 0x0F,
        date & 0x1F,
        time >> 11,
        (time >> 5) & 0x3F,
        (time & 0x1F) * 2
    ))
}

/// Extract the UTF-16 code units of one long-name fragment. Units live at bytes 1..11,
/// 14..26 and 28..32; a NUL or 0xFFFF filler ends the name early.
pub fn lfn_units(entry: &[u8]) -> Vec<u16> {
    let mut units = Vec::with_capacity(LFN_UNITS_PER_FRAGMENT);
    let ranges = [1..11, 14..26, 28..32];
    for range in ranges {
        for pair in entry[range].chunks_exact(2) {
            let unit = u16::from_le_bytes([pair[0], pair[1]]);
            if unit == 0x0000 || unit == 0xFFFF {
                return units;
            }
            units.push(unit);
        }
    }
    units
}

/// Collects long-name fragments preceding a short entry. Fragments are stored last first,
/// the fragment flagged as last sizes the accumulator.
#[derive(Default)]
struct LongNameAccumulator {
    parts:   Vec<Vec<u16>>,
    offsets: Vec<u64>,
}

impl LongNameAccumulator {
    fn push(&mut self, sequence: u8, units: Vec<u16>, offset: u64) {
        let seq = (sequence & LFN_SEQUENCE_MASK) as usize;
        if seq == 0 {
            self.clear();
            return;
        }
        if sequence & LFN_LAST_FRAGMENT != 0 {
            self.parts = vec![Vec::new(); seq];
            self.offsets.clear();
        }
        match self.parts.get_mut(seq - 1) {
            Some(part) => {
                *part = units;
                self.offsets.push(offset);
            }
            None => {
                log::trace!("Orphan long name fragment {} at {:X}", seq, offset);
            }
        }
    }

    fn take(&mut self) -> Option<(String, Vec<u64>)> {
        let units: Vec<u16> = self.parts.iter().flatten().copied().collect();
        let offsets = std::mem::take(&mut self.offsets);
        self.parts.clear();
        if units.is_empty() {
            return None;
        }
        Some((String::from_utf16_lossy(&units), offsets))
    }

    fn clear(&mut self) {
        self.parts.clear();
        self.offsets.clear();
    }
}

/// Where a directory's raw entries came from, so that any entry can be written back.
#[derive(Clone, Debug)]
enum RegionLayout {
    Contiguous(u64),
    Clusters { offsets: Vec<u64>, cluster_len: usize },
}

/// The raw bytes of one directory, either the fixed root region or a subdirectory chain.
#[derive(Clone, Debug)]
pub struct DirectoryRegion {
    bytes:  Vec<u8>,
    layout: RegionLayout,
}

impl DirectoryRegion {
    pub fn root(image: &mut DiskImage, geometry: &Fat12Geometry) -> FloppyResult<DirectoryRegion> {
        let bytes = image.read_vec(geometry.root_dir_offset, geometry.root_dir_len())?;
        Ok(DirectoryRegion {
            bytes,
            layout: RegionLayout::Contiguous(geometry.root_dir_offset),
        })
    }

    pub fn from_clusters(
        image: &mut DiskImage,
        geometry: &Fat12Geometry,
        clusters: &[u16],
    ) -> FloppyResult<DirectoryRegion> {
        let cluster_len = geometry.bytes_per_cluster as usize;
        let offsets: Vec<u64> = clusters.iter().map(|&c| geometry.cluster_offset(c)).collect();

        let mut bytes = vec![0u8; offsets.len() * cluster_len];
        for (chunk, &offset) in bytes.chunks_exact_mut(cluster_len).zip(offsets.iter()) {
            image.read_at(offset, chunk)?;
        }
        Ok(DirectoryRegion {
            bytes,
            layout: RegionLayout::Clusters { offsets, cluster_len },
        })
    }

    pub fn entry_count(&self) -> usize {
        self.bytes.len() / DIR_ENTRY_SIZE
    }

    pub fn entry(&self, index: usize) -> &[u8] {
        &self.bytes[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE]
    }

    /// Absolute image offset of entry `index`.
    pub fn entry_offset(&self, index: usize) -> u64 {
        let rel = index * DIR_ENTRY_SIZE;
        match &self.layout {
            RegionLayout::Contiguous(base) => base + rel as u64,
            RegionLayout::Clusters { offsets, cluster_len } => offsets[rel / cluster_len] + (rel % cluster_len) as u64,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum NodeKind {
    #[strum(serialize = "disk")]
    Disk,
    #[strum(serialize = "dir")]
    Directory,
    #[strum(serialize = "file")]
    File,
}

/// Image offsets of the short entry of a node and of the long-name fragments before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryLocation {
    pub entry_offset: u64,
    pub lfn_offsets:  Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct DirectoryEntryNode {
    pub kind: NodeKind,
    /// Long name if present, otherwise the 8.3 name.
    pub name: String,
    pub short_name: String,
    pub size: u64,
    pub first_cluster: u16,
    pub modified: Option<String>,
    pub children: Vec<DirectoryEntryNode>,
    /// Disk root only.
    pub capacity: Option<u64>,
    /// Disk root only.
    pub free: Option<u64>,
    pub location: Option<EntryLocation>,
}

impl DirectoryEntryNode {
    fn matches(&self, component: &str) -> bool {
        self.kind != NodeKind::Disk
            && (self.name.eq_ignore_ascii_case(component) || self.short_name.eq_ignore_ascii_case(component))
    }

    /// Resolve `path` below this node. Components are separated by `/` or `\`. A bare name is
    /// looked up among the direct children first, then anywhere in the tree, depth first.
    pub fn find(&self, path: &str) -> Option<&DirectoryEntryNode> {
        let components: Vec<&str> = path.split(['/', '\\']).filter(|c| !c.is_empty()).collect();
        match components.as_slice() {
            [] => None,
            [name] => self
                .children
                .iter()
                .find(|c| c.matches(name))
                .or_else(|| self.find_recursive(name)),
            _ => {
                let mut node = self;
                for component in components {
                    node = node.children.iter().find(|c| c.matches(component))?;
                }
                Some(node)
            }
        }
    }

    fn find_recursive(&self, name: &str) -> Option<&DirectoryEntryNode> {
        for child in &self.children {
            if child.matches(name) {
                return Some(child);
            }
            if let Some(found) = child.find_recursive(name) {
                return Some(found);
            }
        }
        None
    }

    /// Return the node whose children include `target`.
    pub fn parent_of(&self, target: &DirectoryEntryNode) -> Option<&DirectoryEntryNode> {
        if self.children.iter().any(|c| std::ptr::eq(c, target)) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.parent_of(target))
    }

    /// Resolve `path` and require it to be a file.
    pub fn find_file(&self, path: &str) -> Option<&DirectoryEntryNode> {
        self.find(path).filter(|n| n.kind == NodeKind::File)
    }
}

/// Directory clusters already decoded during one tree walk. Each cluster is read at most once.
#[derive(Default)]
struct DirectoryWalk {
    visited: HashSet<u16>,
}

impl DirectoryWalk {
    /// Claim the chain starting at `start`, cut short at the first cluster already claimed.
    fn claim_chain(&mut self, geometry: &Fat12Geometry, fat: &FatTable, start: u16) -> Vec<u16> {
        let mut clusters = chain_clusters(geometry, fat, start);
        if let Some(pos) = clusters.iter().position(|c| !self.visited.insert(*c)) {
            log::warn!("Directory chain from {} rejoins cluster {}", start, clusters[pos]);
            clusters.truncate(pos);
        }
        clusters
    }
}

/// Decode the entries of `region`, descending into subdirectories.
pub fn parse_directory(
    image: &mut DiskImage,
    geometry: &Fat12Geometry,
    fat: &FatTable,
    region: &DirectoryRegion,
) -> FloppyResult<Vec<DirectoryEntryNode>> {
    parse_directory_at(image, geometry, fat, region, &mut DirectoryWalk::default(), 0)
}

fn parse_directory_at(
    image: &mut DiskImage,
    geometry: &Fat12Geometry,
    fat: &FatTable,
    region: &DirectoryRegion,
    walk: &mut DirectoryWalk,
    depth: usize,
) -> FloppyResult<Vec<DirectoryEntryNode>> {
    let mut nodes = Vec::new();
    let mut long_name = LongNameAccumulator::default();

    for index in 0..region.entry_count() {
        let raw = region.entry(index);
        let offset = region.entry_offset(index);

        match raw[0] {
            ENTRY_END => break,
            ENTRY_DELETED => {
                long_name.clear();
                continue;
            }
            _ => {}
        }

        let attributes = raw[11];
        if attributes & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
            long_name.push(raw[0], lfn_units(raw), offset);
            continue;
        }
        if attributes & ATTR_VOLUME_ID != 0 {
            long_name.clear();
            continue;
        }

        let entry = RawDirEntry::parse(raw)?;
        let short_name = entry.short_name();
        if short_name == "." || short_name == ".." {
            long_name.clear();
            continue;
        }

        let (name, lfn_offsets) = match long_name.take() {
            Some((name, offsets)) => (name, offsets),
            None => (short_name.clone(), Vec::new()),
        };

        let (kind, children) = if entry.is_directory() {
            let children = if depth >= MAX_DIRECTORY_DEPTH {
                log::warn!("Directory {} nested too deep, not descending", name);
                Vec::new()
            }
            else if geometry.is_valid_cluster(entry.first_cluster) {
                let clusters = walk.claim_chain(geometry, fat, entry.first_cluster);
                if clusters.is_empty() {
                    log::warn!("Directory {} revisits cluster {}, not descending", name, entry.first_cluster);
                    Vec::new()
                }
                else {
                    let sub = DirectoryRegion::from_clusters(image, geometry, &clusters)?;
                    parse_directory_at(image, geometry, fat, &sub, walk, depth + 1)?
                }
            }
            else {
                Vec::new()
            };
            (NodeKind::Directory, children)
        }
        else {
            (NodeKind::File, Vec::new())
        };

        let size = match kind {
            NodeKind::File => entry.file_size as u64,
            _ => children.iter().map(|c| c.size).sum(),
        };

        nodes.push(DirectoryEntryNode {
            kind,
            name,
            short_name,
            size,
            first_cluster: entry.first_cluster,
            modified: entry.modified(),
            children,
            capacity: None,
            free: None,
            location: Some(EntryLocation {
                entry_offset: offset,
                lfn_offsets,
            }),
        });
    }
    Ok(nodes)
}

/// Build the whole tree of the mounted volume, rooted at a disk node named after the image.
pub fn read_volume_tree(image: &mut DiskImage) -> FloppyResult<DirectoryEntryNode> {
    let geometry = Fat12Geometry::load(image)?;
    let fat = FatTable::load(image, &geometry)?;
    build_tree(image, &geometry, &fat)
}

/// As [read_volume_tree], with geometry and FAT already loaded.
pub fn build_tree(image: &mut DiskImage, geometry: &Fat12Geometry, fat: &FatTable) -> FloppyResult<DirectoryEntryNode> {
    let root = DirectoryRegion::root(image, geometry)?;
    let children = parse_directory(image, geometry, fat, &root)?;

    let capacity = geometry.total_clusters as u64 * geometry.bytes_per_cluster as u64;
    let free = fat.free_count(geometry) as u64 * geometry.bytes_per_cluster as u64;

    Ok(DirectoryEntryNode {
        kind: NodeKind::Disk,
        name: image.name(),
        short_name: String::new(),
        size: capacity.saturating_sub(free),
        first_cluster: 0,
        modified: None,
        children,
        capacity: Some(capacity),
        free: Some(free),
        location: None,
    })
}
