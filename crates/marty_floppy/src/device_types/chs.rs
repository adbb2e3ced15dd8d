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

    device_types::chs.rs

    Cylinder/head/sector addressing for the fixed 1.44MB drive geometry.
*/

use std::fmt::Display;

/// Cylinders per disk.
pub const FLOPPY_CYLINDERS: u8 = 80;
/// Heads per cylinder.
pub const FLOPPY_HEADS: u8 = 2;
/// Sectors per track. Sector ids are 1-based.
pub const FLOPPY_SECTORS: u8 = 18;
/// Last addressable LBA, 80 * 2 * 18 - 1.
pub const FLOPPY_MAX_LBA: u32 = (FLOPPY_CYLINDERS as u32 * FLOPPY_HEADS as u32 * FLOPPY_SECTORS as u32) - 1;

/// A structure representing a cylinder, head, sector address
///  - Cylinder (c)
///  - Head (h)
///  - Sector ID (s)
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct DiskChs {
    c: u8,
    h: u8,
    s: u8,
}

impl Default for DiskChs {
    fn default() -> Self {
        Self { c: 0, h: 0, s: 1 }
    }
}

impl From<(u8, u8, u8)> for DiskChs {
    fn from((c, h, s): (u8, u8, u8)) -> Self {
        Self { c, h, s }
    }
}

impl Display for DiskChs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:2}]", self.c, self.h, self.s)
    }
}

impl DiskChs {
    pub fn new(c: u8, h: u8, s: u8) -> Self {
        Self { c, h, s }
    }
    #[inline]
    pub fn c(&self) -> u8 {
        self.c
    }
    #[inline]
    pub fn h(&self) -> u8 {
        self.h
    }
    #[inline]
    pub fn s(&self) -> u8 {
        self.s
    }

    /// Convert to an LBA sector address: `c * 36 + h * 18 + (s - 1)`.
    /// Not clamped; a sector id of 0 is treated as 1.
    pub fn to_lba(&self) -> u32 {
        let spt = FLOPPY_SECTORS as u32;
        (self.c as u32 * FLOPPY_HEADS as u32 + self.h as u32) * spt + self.s.saturating_sub(1) as u32
    }

    /// Convert to an LBA clamped to the last sector of the disk.
    pub fn to_lba_clamped(&self) -> u32 {
        self.to_lba().min(FLOPPY_MAX_LBA)
    }

    /// Convert an LBA sector address into a [DiskChs].
    /// Returns None if the address lies beyond the end of the disk.
    pub fn from_lba(lba: u32) -> Option<DiskChs> {
        if lba > FLOPPY_MAX_LBA {
            return None;
        }
        let spt = FLOPPY_SECTORS as u32;
        let hpc = FLOPPY_HEADS as u32;
        let c = lba / (hpc * spt);
        let h = (lba / spt) % hpc;
        let s = (lba % spt) + 1;
        Some(DiskChs::new(c as u8, h as u8, s as u8))
    }

    /// Return the address of the following sector. Sector ids wrap 18 -> 1 onto the next head,
    /// the last head wraps onto head 0 of the next cylinder, and the last cylinder wraps to 0.
    pub fn next_sector(&self) -> DiskChs {
        if self.s < FLOPPY_SECTORS {
            DiskChs::new(self.c, self.h, self.s + 1)
        }
        else if self.h < FLOPPY_HEADS - 1 {
            DiskChs::new(self.c, self.h + 1, 1)
        }
        else if self.c < FLOPPY_CYLINDERS - 1 {
            DiskChs::new(self.c + 1, 0, 1)
        }
        else {
            DiskChs::new(0, 0, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lba_is_injective_and_bounded() {
        let mut seen = HashSet::new();
        for c in 0..FLOPPY_CYLINDERS {
            for h in 0..FLOPPY_HEADS {
                for s in 1..=FLOPPY_SECTORS {
                    let chs = DiskChs::new(c, h, s);
                    let lba = chs.to_lba();
                    assert_eq!(lba, c as u32 * 36 + h as u32 * 18 + (s as u32 - 1));
                    assert!(lba <= FLOPPY_MAX_LBA);
                    assert!(seen.insert(lba), "duplicate lba {} for {}", lba, chs);
                    assert_eq!(DiskChs::from_lba(lba), Some(chs));
                }
            }
        }
        assert_eq!(seen.len(), 2880);
        assert_eq!(DiskChs::from_lba(2880), None);
    }

    #[test]
    fn clamps_past_end_of_disk() {
        assert_eq!(DiskChs::new(200, 1, 18).to_lba_clamped(), FLOPPY_MAX_LBA);
        assert_eq!(DiskChs::new(0, 0, 0).to_lba(), 0);
    }

    #[test]
    fn next_sector_walks_whole_disk() {
        let mut chs = DiskChs::default();
        for lba in 0..=FLOPPY_MAX_LBA {
            assert_eq!(chs.to_lba(), lba);
            chs = chs.next_sector();
        }
        assert_eq!(chs, DiskChs::default());
        assert_eq!(DiskChs::new(3, 0, 18).next_sector(), DiskChs::new(3, 1, 1));
        assert_eq!(DiskChs::new(3, 1, 18).next_sector(), DiskChs::new(4, 0, 1));
    }
}
