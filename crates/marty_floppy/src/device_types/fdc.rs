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

    device_types::fdc.rs

    Register layouts and the command table of the µPD765-style floppy controller.
*/

use modular_bitfield::{bitfield, prelude::*};
use strum_macros::EnumIter;

// Port offsets
// --------------------------------------------------------------------------------
pub const FDC_PORT_DMA_DATA0: u8 = 0x00;
pub const FDC_PORT_DMA_DATA1: u8 = 0x01;
pub const FDC_PORT_CONTROL: u8 = 0x02;
pub const FDC_PORT_IRQ_STATUS: u8 = 0x03;
pub const FDC_PORT_STATUS: u8 = 0x04;
pub const FDC_PORT_DATA: u8 = 0x05;
pub const FDC_PORT_DISK_CHANGE: u8 = 0x07;

// Main Status Register Bit Definitions
// --------------------------------------------------------------------------------
// The first four bits encode which drives are in 'positioning' mode
pub const FDC_STATUS_FDD_A_BUSY: u8 = 0b0000_0001;
pub const FDC_STATUS_FDD_B_BUSY: u8 = 0b0000_0010;
pub const FDC_STATUS_FDD_C_BUSY: u8 = 0b0000_0100;
pub const FDC_STATUS_FDD_D_BUSY: u8 = 0b0000_1000;
pub const FDC_STATUS_FDC_BUSY: u8 = 0b0001_0000;
// Set while the controller runs in non-DMA mode (Specify ND bit)
pub const FDC_STATUS_NON_DMA_MODE: u8 = 0b0010_0000;
// Set: controller -> CPU. Clear: CPU -> controller
pub const FDC_STATUS_DIO: u8 = 0b0100_0000;
pub const FDC_STATUS_MRQ: u8 = 0b1000_0000;

// Control port (2)
pub const CONTROL_DRIVE_SELECT_MASK: u8 = 0b0000_0011;
pub const CONTROL_NOT_RESET: u8 = 0b0000_0100;
pub const CONTROL_DMA_ENABLE: u8 = 0b0000_1000;

// Pin reset control (4)
pub const PIN_RESET: u8 = 0b0100_0000;

// DRQ / IRQ / disk change read-back values
pub const DRQ_BIT: u8 = 0x40;
pub const IRQ_BIT: u8 = 0x40;
pub const DISK_CHANGED_BIT: u8 = 0x80;

pub const COMMAND_MASK: u8 = 0b0001_1111;

pub const ST0_UNIT_SELECT0: u8 = 0b0000_0001;
pub const ST0_UNIT_SELECT1: u8 = 0b0000_0010;
pub const ST0_HEAD_ACTIVE: u8 = 0b0000_0100;
pub const ST0_NOT_READY: u8 = 0b0000_1000;
pub const ST0_UNIT_CHECK: u8 = 0b0001_0000;
pub const ST0_SEEK_END: u8 = 0b0010_0000;
pub const ST0_IC0: u8 = 0b0100_0000;
pub const ST0_IC1: u8 = 0b1000_0000;
pub const ST0_ABNORMAL_TERMINATION: u8 = ST0_IC0;
pub const ST0_INVALID_OPCODE: u8 = ST0_IC1;
pub const ST0_ABNORMAL_POLLING: u8 = ST0_IC0 | ST0_IC1;

pub const ST1_MISSING_ADDRESS_MARK: u8 = 0b0000_0001;
pub const ST1_NOT_WRITABLE: u8 = 0b0000_0010;
pub const ST1_NO_DATA: u8 = 0b0000_0100;
pub const ST1_OVERRUN: u8 = 0b0001_0000;
pub const ST1_DATA_ERROR: u8 = 0b0010_0000;
pub const ST1_END_OF_CYLINDER: u8 = 0b1000_0000;

pub const ST2_MISSING_DAM: u8 = 0b0000_0001;
pub const ST2_BAD_CYLINDER: u8 = 0b0000_0010;
pub const ST2_SCAN_NOT_SATISFIED: u8 = 0b0000_0100;
pub const ST2_SCAN_EQUAL_HIT: u8 = 0b0000_1000;
pub const ST2_WRONG_CYLINDER: u8 = 0b0001_0000;
pub const ST2_DATA_CRC_ERROR: u8 = 0b0010_0000;
pub const ST2_CONTROL_MARK: u8 = 0b0100_0000;

pub const ST3_UNIT_SELECT0: u8 = 0b0000_0001;
pub const ST3_UNIT_SELECT1: u8 = 0b0000_0010;
pub const ST3_HEAD: u8 = 0b0000_0100;
pub const ST3_DOUBLESIDED: u8 = 0b0000_1000;
pub const ST3_TRACK0: u8 = 0b0001_0000;
pub const ST3_READY: u8 = 0b0010_0000;
pub const ST3_WRITE_PROTECT: u8 = 0b0100_0000;
pub const ST3_FAULT: u8 = 0b1000_0000;

pub const FDC_COMMAND_BUF_LEN: usize = 10;
pub const FDC_RESULT_BUF_LEN: usize = 8;

/// Represents the current phase of the controller operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ControllerPhase {
    #[default]
    Idle,
    Command,
    Execution,
    Result,
}

/// Represent the various commands that the controller knows how to handle.
/// Opcodes not listed decode to [Command::Invalid].
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Command {
    #[default]
    Invalid = 0x00,
    ReadTrack = 0x02,
    Specify = 0x03,
    SenseDriveStatus = 0x04,
    WriteData = 0x05,
    ReadData = 0x06,
    Recalibrate = 0x07,
    SenseIntStatus = 0x08,
    WriteDeletedData = 0x09,
    ReadId = 0x0a,
    ReadDeletedData = 0x0c,
    FormatTrack = 0x0d,
    Seek = 0x0f,
    ScanEqual = 0x11,
    ScanLowOrEqual = 0x19,
    ScanHighOrEqual = 0x1d,
}

/// One entry of the command table: how many bytes make up the command (opcode included)
/// and how many result bytes it produces.
#[derive(Copy, Clone, Debug)]
pub struct CommandDescriptor {
    pub command: Command,
    pub command_len: usize,
    pub result_len: usize,
}

const fn desc(command: Command, command_len: usize, result_len: usize) -> CommandDescriptor {
    CommandDescriptor {
        command,
        command_len,
        result_len,
    }
}

const INVALID: CommandDescriptor = desc(Command::Invalid, 1, 1);

/// Indexed by the low five bits of the opcode byte.
pub static COMMAND_TABLE: [CommandDescriptor; 32] = [
    INVALID,                                   // 0x00
    INVALID,                                   // 0x01
    desc(Command::ReadTrack, 9, 7),            // 0x02
    desc(Command::Specify, 3, 0),              // 0x03
    desc(Command::SenseDriveStatus, 2, 1),     // 0x04
    desc(Command::WriteData, 9, 7),            // 0x05
    desc(Command::ReadData, 9, 7),             // 0x06
    desc(Command::Recalibrate, 2, 0),          // 0x07
    desc(Command::SenseIntStatus, 1, 2),       // 0x08
    desc(Command::WriteDeletedData, 9, 7),     // 0x09
    desc(Command::ReadId, 2, 7),               // 0x0A
    INVALID,                                   // 0x0B
    desc(Command::ReadDeletedData, 9, 7),      // 0x0C
    desc(Command::FormatTrack, 6, 7),          // 0x0D
    INVALID,                                   // 0x0E
    desc(Command::Seek, 3, 0),                 // 0x0F
    INVALID,                                   // 0x10
    desc(Command::ScanEqual, 9, 7),            // 0x11
    INVALID,                                   // 0x12
    INVALID,                                   // 0x13
    INVALID,                                   // 0x14
    INVALID,                                   // 0x15
    INVALID,                                   // 0x16
    INVALID,                                   // 0x17
    INVALID,                                   // 0x18
    desc(Command::ScanLowOrEqual, 9, 7),       // 0x19
    INVALID,                                   // 0x1A
    INVALID,                                   // 0x1B
    INVALID,                                   // 0x1C
    desc(Command::ScanHighOrEqual, 9, 7),      // 0x1D
    INVALID,                                   // 0x1E
    INVALID,                                   // 0x1F
];

#[inline]
pub fn command_descriptor(opcode: u8) -> &'static CommandDescriptor {
    &COMMAND_TABLE[(opcode & COMMAND_MASK) as usize]
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct CommandByte {
    pub command: B5,
    pub skip: bool,
    pub mfm: bool,
    pub mt: bool,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct DriveHeadSelect {
    pub drive: B2,
    pub head:  B1,
    #[skip]
    unused:    B5,
}

#[bitfield]
#[derive(Copy, Clone)]
pub struct HeadLoadDma {
    pub non_dma:   bool,
    pub head_load: B7,
}

/// Layout of a write to the control port.
#[bitfield]
#[derive(Copy, Clone)]
pub struct ControlByte {
    pub drive_select: B2,
    pub not_reset: bool,
    pub dma_enable: bool,
    pub motor: B4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn table_indexes_by_opcode() {
        for command in Command::iter().filter(|c| *c != Command::Invalid) {
            let d = command_descriptor(command as u8);
            assert_eq!(d.command, command);
            // MT/MFM/SK bits do not affect the lookup
            assert_eq!(command_descriptor(command as u8 | 0xE0).command, command);
        }
        assert_eq!(command_descriptor(0x06).command_len, 9);
        assert_eq!(command_descriptor(0x08).result_len, 2);
        assert_eq!(command_descriptor(0x1F).command, Command::Invalid);
        assert_eq!(COMMAND_TABLE.iter().filter(|d| d.command == Command::Invalid).count(), 17);
    }

    #[test]
    fn command_byte_fields() {
        let cb = CommandByte::from_bytes([0xE6]);
        assert_eq!(cb.command(), 0x06);
        assert!(cb.mt() && cb.mfm() && cb.skip());

        let ctl = ControlByte::from_bytes([0x1C]);
        assert_eq!(ctl.drive_select(), 0);
        assert!(ctl.not_reset() && ctl.dma_enable());
        assert_eq!(ctl.motor(), 1);
    }
}
