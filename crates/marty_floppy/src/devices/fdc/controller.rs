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

    devices::fdc::controller.rs

    Implements a µPD765-style Floppy Disk Controller over a raw sector image
*/

use std::collections::VecDeque;

use crossbeam_channel::Sender;

use crate::{
    device_types::{
        chs::DiskChs,
        fdc::*,
    },
    events::{EventSink, FloppyEvent, InterruptLine},
    image::{DiskStore, SECTOR_SIZE},
};

pub const FDC_LOG_LEN: usize = 1000;
pub const FDC_PORT_MASK: u8 = 0x07;

/// Snapshot of the controller registers for debugger display.
#[derive(Clone, Debug, Default)]
pub struct FdcDebugState {
    pub phase: ControllerPhase,
    pub status_register: u8,
    pub st0: u8,
    pub st1: u8,
    pub st2: u8,
    pub st3: u8,
    pub last_cmd: Command,
    pub cylinder: u8,
    pub current_lba: u32,
    pub data_offset: u64,
    pub pending_bytes: usize,
    pub intr: bool,
    pub drive_select: u8,
    pub motor: u8,
    pub dma_enable: bool,
    pub data_rate: u8,
    pub media_present: bool,
    pub command_bytes: Vec<u8>,
    pub result_bytes: Vec<u8>,
    pub last_data_read: u8,
    pub last_data_written: u8,
    pub cmd_log: Vec<String>,
}

pub struct FloppyController {
    pub(super) store: DiskStore,

    phase: ControllerPhase,
    status_register: u8,
    st0: u8,
    st1: u8,
    st2: u8,
    st3: u8,

    descriptor: &'static CommandDescriptor,
    command_buf: [u8; FDC_COMMAND_BUF_LEN],
    result_buf: [u8; FDC_RESULT_BUF_LEN],
    cycle: usize,
    last_command: Command,

    pending_bytes: usize,
    data_offset: u64,
    current_lba: u32,
    cylinder: u8,

    intr: bool,
    drive_select: u8,
    motor: u8,
    dma_enable: bool,
    data_rate: u8,
    soft_reset_latch: bool,
    hard_reset_latch: bool,

    active: bool,
    events: EventSink,
    irq_line: Option<Box<dyn InterruptLine>>,

    last_data_read: u8,
    last_data_written: u8,
    cmd_log: VecDeque<String>,
}

impl Default for FloppyController {
    fn default() -> Self {
        Self {
            store: DiskStore::new(),
            phase: ControllerPhase::Idle,
            status_register: FDC_STATUS_MRQ,
            st0: 0,
            st1: 0,
            st2: 0,
            st3: 0,
            descriptor: command_descriptor(0),
            command_buf: [0; FDC_COMMAND_BUF_LEN],
            result_buf: [0; FDC_RESULT_BUF_LEN],
            cycle: 0,
            last_command: Command::Invalid,
            pending_bytes: 0,
            data_offset: 0,
            current_lba: 0,
            cylinder: 0,
            intr: false,
            drive_select: 0,
            motor: 0,
            dma_enable: false,
            data_rate: 0,
            soft_reset_latch: false,
            hard_reset_latch: false,
            active: false,
            events: EventSink::default(),
            irq_line: None,
            last_data_read: 0,
            last_data_written: 0,
            cmd_log: VecDeque::with_capacity(FDC_LOG_LEN),
        }
    }
}

impl FloppyController {
    pub fn new() -> Self {
        Default::default()
    }

    /// Post media and activity notifications on `sender`.
    pub fn with_event_sender(mut self, sender: Sender<FloppyEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Drive `line` with the controller's interrupt request level.
    pub fn with_interrupt_line(mut self, line: Box<dyn InterruptLine>) -> Self {
        self.irq_line = Some(line);
        self
    }

    /// Read from one of the eight controller ports.
    pub fn read_port(&mut self, port: u8) -> u8 {
        let byte = match port & FDC_PORT_MASK {
            FDC_PORT_DMA_DATA0 | FDC_PORT_DMA_DATA1 => self.handle_dma_read(),
            FDC_PORT_CONTROL => DRQ_BIT,
            FDC_PORT_IRQ_STATUS => {
                if self.intr {
                    IRQ_BIT
                }
                else {
                    0
                }
            }
            FDC_PORT_STATUS => self.status_register,
            FDC_PORT_DATA => self.handle_data_register_read(),
            FDC_PORT_DISK_CHANGE => {
                if self.store.take_changed() {
                    DISK_CHANGED_BIT
                }
                else {
                    0
                }
            }
            _ => 0,
        };
        self.update_activity();
        byte
    }

    /// Write to one of the eight controller ports.
    pub fn write_port(&mut self, port: u8, data: u8) {
        match port & FDC_PORT_MASK {
            FDC_PORT_DMA_DATA0 | FDC_PORT_DMA_DATA1 => self.handle_dma_write(data),
            FDC_PORT_CONTROL => self.handle_control_write(data),
            FDC_PORT_STATUS => self.handle_pin_reset_write(data),
            FDC_PORT_DATA => self.handle_data_register_write(data),
            FDC_PORT_DISK_CHANGE => {
                self.data_rate = data & 0x03;
                log::trace!("Data rate select: {}", self.data_rate);
            }
            port => {
                log::trace!("Write to unused FDC port {}: {:02X}", port, data);
            }
        }
        self.update_activity();
    }

    pub fn irq(&self) -> bool {
        self.intr
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn status_register(&self) -> u8 {
        self.status_register
    }

    pub fn is_present(&self) -> bool {
        self.store.is_present()
    }

    /// A transfer is underway: a medium is present and the controller is either mid-command
    /// or still owes data bytes.
    pub fn is_active(&self) -> bool {
        self.store.is_present() && (self.phase != ControllerPhase::Idle || self.pending_bytes > 0)
    }

    /// Reset every register and latch except the media-changed latch.
    pub fn hard_reset(&mut self) {
        self.dma_enable = false;
        self.drive_select = 0;
        self.motor = 0;
        self.status_register = FDC_STATUS_MRQ;
        self.st0 = 0;
        self.st1 = 0;
        self.st2 = 0;
        self.st3 = 0;
        self.set_irq(false);
        self.cycle = 0;
        self.phase = ControllerPhase::Idle;
        self.pending_bytes = 0;
        self.log_str("FDC hard reset");
    }

    /// Reset the command and execution state only. The control latches and the interrupt
    /// line are kept.
    pub fn soft_reset(&mut self) {
        self.status_register = FDC_STATUS_MRQ;
        self.st0 = 0;
        self.st1 = 0;
        self.st2 = 0;
        self.st3 = 0;
        self.cycle = 0;
        self.phase = ControllerPhase::Idle;
        self.pending_bytes = 0;
        self.log_str("FDC soft reset");
    }

    /// Return to idle after the medium went away or was replaced.
    pub(super) fn reset_transfer_state(&mut self) {
        self.phase = ControllerPhase::Idle;
        self.cycle = 0;
        self.pending_bytes = 0;
        self.data_offset = 0;
        self.current_lba = 0;
        self.status_register = FDC_STATUS_MRQ | (self.status_register & FDC_STATUS_NON_DMA_MODE);
    }

    pub(super) fn rewind_transfer(&mut self) {
        self.data_offset = 0;
    }

    pub(super) fn notify(&self, event: FloppyEvent) {
        self.events.send(event);
    }

    /// Report activity transitions, once per change.
    pub(super) fn update_activity(&mut self) {
        let active = self.is_active();
        if active != self.active {
            self.active = active;
            self.events.send(if active {
                FloppyEvent::IoStarted
            }
            else {
                FloppyEvent::IoStopped
            });
        }
    }

    fn set_irq(&mut self, state: bool) {
        if self.intr != state {
            self.intr = state;
            if let Some(line) = self.irq_line.as_mut() {
                line.set_level(state);
            }
        }
    }

    fn non_dma(&self) -> bool {
        self.status_register & FDC_STATUS_NON_DMA_MODE != 0
    }

    fn data_direction_to_cpu(&mut self) {
        self.status_register |= FDC_STATUS_DIO;
    }

    fn data_direction_from_cpu(&mut self) {
        self.status_register &= !FDC_STATUS_DIO;
    }

    /// Phase a data command continues in: Execution when the CPU moves the bytes itself,
    /// otherwise straight to Result and the bytes move through the DMA ports.
    fn transfer_phase(&self) -> ControllerPhase {
        if self.non_dma() {
            ControllerPhase::Execution
        }
        else {
            ControllerPhase::Result
        }
    }

    /// Read the next byte of the transfer window. With no medium the changed latch is set
    /// and 0 is returned.
    fn read_media_byte(&mut self) -> u8 {
        let offset = self.data_offset;
        let byte = match self.store.image_mut() {
            Ok(image) => image.read_byte(offset).unwrap_or_else(|e| {
                log::warn!("Read from image offset {:X} failed: {}", offset, e);
                0
            }),
            Err(_) => {
                self.store.set_changed();
                return 0;
            }
        };
        self.data_offset += 1;
        self.last_data_read = byte;
        byte
    }

    fn write_media_byte(&mut self, byte: u8) {
        let offset = self.data_offset;
        match self.store.image_mut() {
            Ok(image) => {
                if let Err(e) = image.write_byte(offset, byte) {
                    log::warn!("Write to image offset {:X} failed: {}", offset, e);
                }
            }
            Err(_) => {
                self.store.set_changed();
                return;
            }
        }
        self.data_offset += 1;
    }

    /// Count one transferred byte. Returns true when the window is exhausted.
    fn count_transfer_byte(&mut self) -> bool {
        self.pending_bytes = self.pending_bytes.saturating_sub(1);
        self.pending_bytes == 0
    }

    /// The transfer window is exhausted: make written bytes visible and present the results.
    fn finish_transfer(&mut self, wrote: bool) {
        if wrote && self.store.is_present() {
            if let Err(e) = self.store.flush() {
                log::warn!("Flush after sector write failed: {}", e);
            }
        }
        if self.phase == ControllerPhase::Execution {
            self.cycle = 0;
            self.phase = ControllerPhase::Result;
            self.data_direction_to_cpu();
        }
        log::trace!("Transfer complete at offset {:X}", self.data_offset);
    }

    fn handle_dma_read(&mut self) -> u8 {
        if self.pending_bytes == 0 {
            if !self.store.is_present() {
                self.store.set_changed();
            }
            return 0;
        }
        let byte = self.read_media_byte();
        if self.count_transfer_byte() {
            self.finish_transfer(false);
        }
        byte
    }

    fn handle_dma_write(&mut self, data: u8) {
        self.last_data_written = data;
        if self.pending_bytes == 0 {
            if !self.store.is_present() {
                self.store.set_changed();
            }
            return;
        }
        self.write_media_byte(data);
        if self.count_transfer_byte() {
            self.finish_transfer(true);
        }
    }

    fn handle_control_write(&mut self, data: u8) {
        let control = ControlByte::from_bytes([data]);
        self.dma_enable = control.dma_enable();
        self.drive_select = control.drive_select();
        self.motor = control.motor();

        if control.not_reset() {
            if self.soft_reset_latch {
                self.soft_reset();
                self.soft_reset_latch = false;
                let ready = self.drive_select == 0 && self.store.is_present();
                self.set_irq(ready);
            }
        }
        else if !self.soft_reset_latch {
            self.soft_reset_latch = true;
            self.set_irq(false);
        }
    }

    fn handle_pin_reset_write(&mut self, data: u8) {
        if data & PIN_RESET != 0 {
            if !self.hard_reset_latch {
                self.hard_reset_latch = true;
                self.set_irq(false);
            }
        }
        else if self.hard_reset_latch {
            self.hard_reset();
            self.hard_reset_latch = false;
        }
    }

    fn handle_data_register_read(&mut self) -> u8 {
        match self.phase {
            ControllerPhase::Execution => {
                if self.pending_bytes == 0 {
                    self.finish_transfer(false);
                    return 0;
                }
                match self.last_command {
                    Command::ReadData | Command::ReadTrack => {
                        let byte = self.read_media_byte();
                        if self.count_transfer_byte() {
                            self.finish_transfer(false);
                        }
                        byte
                    }
                    cmd => {
                        log::warn!("Data register read during execution of {:?}", cmd);
                        0
                    }
                }
            }
            ControllerPhase::Result => {
                let byte = self.result_buf.get(self.cycle).copied().unwrap_or(0);
                self.cycle += 1;
                if self.cycle >= self.descriptor.result_len {
                    self.cycle = 0;
                    self.phase = ControllerPhase::Idle;
                    self.data_direction_from_cpu();
                    self.set_irq(false);
                }
                byte
            }
            _ => 0,
        }
    }

    fn handle_data_register_write(&mut self, data: u8) {
        self.last_data_written = data;
        match self.phase {
            ControllerPhase::Execution => {
                if self.pending_bytes == 0 {
                    self.finish_transfer(false);
                    return;
                }
                match self.last_command {
                    Command::WriteData => self.write_media_byte(data),
                    cmd => log::trace!("Discarding execution byte {:02X} for {:?}", data, cmd),
                }
                if self.count_transfer_byte() {
                    self.finish_transfer(self.last_command == Command::WriteData);
                }
            }
            ControllerPhase::Result => {
                log::warn!("Data register write {:02X} during result phase ignored", data);
            }
            ControllerPhase::Idle | ControllerPhase::Command => {
                if self.phase == ControllerPhase::Idle {
                    self.cycle = 0;
                    self.phase = ControllerPhase::Command;
                    self.descriptor = command_descriptor(data);
                    let command_byte = CommandByte::from_bytes([data]);
                    log::trace!(
                        "Received {:?} command: {:02X} mt:{} mfm:{} sk:{}",
                        self.descriptor.command,
                        data,
                        command_byte.mt(),
                        command_byte.mfm(),
                        command_byte.skip()
                    );
                }

                if let Some(slot) = self.command_buf.get_mut(self.cycle) {
                    *slot = data;
                }
                self.cycle += 1;

                if self.cycle >= self.descriptor.command_len {
                    let command = self.descriptor.command;
                    self.phase = self.dispatch(command);
                    self.cycle = 0;
                    self.last_command = command;
                }
            }
        }
    }

    /// Run the handler for a fully received command and return the phase to continue in.
    fn dispatch(&mut self, command: Command) -> ControllerPhase {
        match command {
            Command::Invalid => self.command_invalid(),
            Command::ReadTrack => self.command_read_track(),
            Command::Specify => self.command_specify(),
            Command::SenseDriveStatus => self.command_sense_drive_status(),
            Command::WriteData => self.command_write_data(),
            Command::ReadData => self.command_read_data(),
            Command::Recalibrate => self.command_recalibrate(),
            Command::SenseIntStatus => self.command_sense_interrupt(),
            Command::ReadId => self.command_read_id(),
            Command::FormatTrack => self.command_format_track(),
            Command::Seek => self.command_seek(),
            Command::WriteDeletedData
            | Command::ReadDeletedData
            | Command::ScanEqual
            | Command::ScanLowOrEqual
            | Command::ScanHighOrEqual => self.command_unimplemented(command),
        }
    }

    /// Load the result buffer with ST0-ST2 followed by a sector id.
    fn set_results(&mut self, chs: DiskChs, n: u8) {
        self.result_buf[..7].copy_from_slice(&[self.st0, self.st1, self.st2, chs.c(), chs.h(), chs.s(), n]);
    }

    fn command_invalid(&mut self) -> ControllerPhase {
        let opcode = self.command_buf[0];
        self.log_cmd(Command::Invalid, "command_invalid", &format!("opcode: {:02X}", opcode));
        self.st0 = ST0_INVALID_OPCODE;
        self.result_buf[0] = self.st0;
        self.data_direction_to_cpu();
        ControllerPhase::Result
    }

    fn command_read_track(&mut self) -> ControllerPhase {
        self.log_cmd(Command::ReadTrack, "command_read_track", "not implemented");
        self.data_direction_to_cpu();
        self.transfer_phase()
    }

    fn command_unimplemented(&mut self, command: Command) -> ControllerPhase {
        self.log_cmd(command, "command_unimplemented", "not implemented");
        self.transfer_phase()
    }

    /// Specify (0x03). Only the ND bit is honored; step rate and head timings are ignored.
    fn command_specify(&mut self) -> ControllerPhase {
        let hlt_nd = HeadLoadDma::from_bytes([self.command_buf[2]]);
        if hlt_nd.non_dma() {
            self.status_register |= FDC_STATUS_NON_DMA_MODE;
        }
        else {
            self.status_register &= !FDC_STATUS_NON_DMA_MODE;
        }
        let log_str = format!("srt_hut: {:02X} non_dma: {}", self.command_buf[1], hlt_nd.non_dma());
        self.log_cmd(Command::Specify, "command_specify", &log_str);
        ControllerPhase::Idle
    }

    fn make_st3_byte(&self, dhs: DriveHeadSelect) -> u8 {
        let mut st3 = dhs.drive() & (ST3_UNIT_SELECT0 | ST3_UNIT_SELECT1);
        if dhs.head() == 1 {
            st3 |= ST3_HEAD;
        }
        st3 |= ST3_DOUBLESIDED;
        if self.cylinder == 0 {
            st3 |= ST3_TRACK0;
        }
        if self.store.is_present() {
            st3 |= ST3_READY;
        }
        st3
    }

    fn command_sense_drive_status(&mut self) -> ControllerPhase {
        let dhs = DriveHeadSelect::from_bytes([self.command_buf[1]]);
        self.st3 = self.make_st3_byte(dhs);
        self.result_buf[0] = self.st3;

        let log_str = format!("drive: {} head: {} st3: {:02X}", dhs.drive(), dhs.head(), self.st3);
        self.log_cmd(Command::SenseDriveStatus, "command_sense_drive_status", &log_str);
        self.data_direction_to_cpu();
        ControllerPhase::Result
    }

    /// Decode the C, H, R, N parameters of a data command and open a one sector window.
    fn open_sector_window(&mut self) -> (DiskChs, u8) {
        let chs = DiskChs::new(self.command_buf[2], self.command_buf[3], self.command_buf[4]);
        let n = self.command_buf[5];

        self.current_lba = chs.to_lba_clamped();
        self.data_offset = self.current_lba as u64 * SECTOR_SIZE as u64;
        self.pending_bytes = SECTOR_SIZE;
        (chs, n)
    }

    fn data_command_results(&mut self, chs: DiskChs, n: u8) {
        self.st0 = if self.non_dma() { ST0_ABNORMAL_TERMINATION } else { 0 };
        self.st1 = ST1_END_OF_CYLINDER;
        self.st2 = 0;
        self.set_results(chs.next_sector(), n);
        self.set_irq(true);
    }

    fn command_write_data(&mut self) -> ControllerPhase {
        let (chs, n) = self.open_sector_window();
        let log_str = format!("chs: {} n: {} lba: {} non_dma: {}", chs, n, self.current_lba, self.non_dma());
        self.log_cmd(Command::WriteData, "command_write_data", &log_str);

        self.data_command_results(chs, n);
        self.data_direction_from_cpu();
        self.transfer_phase()
    }

    fn command_read_data(&mut self) -> ControllerPhase {
        let (chs, n) = self.open_sector_window();
        let log_str = format!("chs: {} n: {} lba: {} non_dma: {}", chs, n, self.current_lba, self.non_dma());
        self.log_cmd(Command::ReadData, "command_read_data", &log_str);

        self.data_command_results(chs, n);
        self.data_direction_to_cpu();
        self.transfer_phase()
    }

    fn command_recalibrate(&mut self) -> ControllerPhase {
        let dhs = DriveHeadSelect::from_bytes([self.command_buf[1]]);
        self.cylinder = 0;
        self.st0 = if dhs.drive() != 0 {
            ST0_SEEK_END | ST0_ABNORMAL_TERMINATION
        }
        else {
            ST0_SEEK_END
        };
        self.log_cmd(Command::Recalibrate, "command_recalibrate", &format!("drive: {}", dhs.drive()));
        self.set_irq(true);
        ControllerPhase::Idle
    }

    fn command_seek(&mut self) -> ControllerPhase {
        let dhs = DriveHeadSelect::from_bytes([self.command_buf[1]]);
        self.cylinder = self.command_buf[2];
        self.st0 = ST0_SEEK_END;

        let log_str = format!("drive: {} head: {} cylinder: {}", dhs.drive(), dhs.head(), self.cylinder);
        self.log_cmd(Command::Seek, "command_seek", &log_str);
        self.set_irq(true);
        ControllerPhase::Idle
    }

    /// Report on the last seek or recalibrate; anything else answers with an invalid or
    /// polling status depending on the selected drive.
    fn command_sense_interrupt(&mut self) -> ControllerPhase {
        let (st0, pcn) = match self.last_command {
            Command::Recalibrate => (self.st0, 0),
            Command::Seek => (ST0_SEEK_END, self.cylinder),
            _ => {
                self.st0 = if self.drive_select == 0 {
                    ST0_ABNORMAL_POLLING
                }
                else {
                    ST0_ABNORMAL_TERMINATION | ST0_SEEK_END
                };
                (self.st0, self.cylinder)
            }
        };
        self.result_buf[0] = st0;
        self.result_buf[1] = pcn;

        let log_str = format!("last: {:?} st0: {:02X} pcn: {}", self.last_command, st0, pcn);
        self.log_cmd(Command::SenseIntStatus, "command_sense_interrupt", &log_str);
        self.set_irq(false);
        self.data_direction_to_cpu();
        ControllerPhase::Result
    }

    /// Read ID (0x0A). An empty drive never answers.
    fn command_read_id(&mut self) -> ControllerPhase {
        if !self.store.is_present() {
            self.log_cmd(Command::ReadId, "command_read_id", "no media");
            return ControllerPhase::Idle;
        }
        self.st0 = 0;
        self.result_buf[..7].fill(0);
        self.log_cmd(Command::ReadId, "command_read_id", "ok");
        self.set_irq(true);
        self.data_direction_to_cpu();
        ControllerPhase::Result
    }

    /// Format Track (0x0D). Fills the sector at the current LBA with the filler byte.
    fn command_format_track(&mut self) -> ControllerPhase {
        let hd_us = self.command_buf[1];
        let n = self.command_buf[2];
        let sc = self.command_buf[3];
        let gpl = self.command_buf[4];
        let filler = self.command_buf[5];

        let offset = self.current_lba as u64 * SECTOR_SIZE as u64;
        if let Ok(image) = self.store.image_mut() {
            let result = image
                .write_at(offset, &[filler; SECTOR_SIZE])
                .and_then(|_| image.flush());
            if let Err(e) = result {
                log::warn!("Format of LBA {} failed: {}", self.current_lba, e);
            }
        }

        let log_str = format!(
            "lba: {} n: {} sc: {} gpl: {} filler: {:02X}",
            self.current_lba, n, sc, gpl, filler
        );
        self.log_cmd(Command::FormatTrack, "command_format_track", &log_str);

        self.st0 = 0;
        self.result_buf[..7].copy_from_slice(&[hd_us & 0x07, 0, 0, 0, 0, 0, n]);
        self.set_irq(true);
        self.data_direction_to_cpu();
        ControllerPhase::Result
    }

    pub fn log_cmd(&mut self, cmd: Command, func: &str, s: &str) {
        self.push_log(format!("{:?}: {}", cmd, s));
        log::trace!("{}(): {}", func, s);
    }

    pub fn log_str(&mut self, s: &str) {
        self.push_log(s.to_string());
        log::trace!("{}", s);
    }

    fn push_log(&mut self, entry: String) {
        if self.cmd_log.len() == FDC_LOG_LEN {
            self.cmd_log.pop_front();
        }
        self.cmd_log.push_back(entry);
    }

    pub fn get_debug_state(&self) -> FdcDebugState {
        FdcDebugState {
            phase: self.phase,
            status_register: self.status_register,
            st0: self.st0,
            st1: self.st1,
            st2: self.st2,
            st3: self.st3,
            last_cmd: self.last_command,
            cylinder: self.cylinder,
            current_lba: self.current_lba,
            data_offset: self.data_offset,
            pending_bytes: self.pending_bytes,
            intr: self.intr,
            drive_select: self.drive_select,
            motor: self.motor,
            dma_enable: self.dma_enable,
            data_rate: self.data_rate,
            media_present: self.store.is_present(),
            command_bytes: self.command_buf[..self.descriptor.command_len].to_vec(),
            result_bytes: self.result_buf[..self.descriptor.result_len].to_vec(),
            last_data_read: self.last_data_read,
            last_data_written: self.last_data_written,
            cmd_log: self.cmd_log.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TempImage;
    use crossbeam_channel::unbounded;
    use std::sync::{Arc, Mutex};

    const DISK_BYTES: usize = 1_474_560;

    fn blank_image() -> TempImage {
        TempImage::with_bytes(&vec![0u8; DISK_BYTES])
    }

    fn loaded(tmp: &TempImage) -> FloppyController {
        let mut fdc = FloppyController::new();
        fdc.load_image(tmp.path()).unwrap();
        fdc
    }

    fn send(fdc: &mut FloppyController, bytes: &[u8]) {
        for byte in bytes {
            fdc.write_port(FDC_PORT_DATA, *byte);
        }
    }

    fn results(fdc: &mut FloppyController, count: usize) -> Vec<u8> {
        (0..count).map(|_| fdc.read_port(FDC_PORT_DATA)).collect()
    }

    fn specify_non_dma(fdc: &mut FloppyController) {
        send(fdc, &[0x03, 0xDF, 0x03]);
    }

    struct RecordingLine(Arc<Mutex<Vec<bool>>>);

    impl InterruptLine for RecordingLine {
        fn set_level(&mut self, asserted: bool) {
            self.0.lock().unwrap().push(asserted);
        }
    }

    #[test]
    fn read_data_non_dma_transfers_one_sector() {
        let mut bytes = vec![0u8; DISK_BYTES];
        bytes[..512].fill(0xAA);
        bytes[512..1024].fill(0x55);
        let tmp = TempImage::with_bytes(&bytes);
        let mut fdc = loaded(&tmp);

        specify_non_dma(&mut fdc);
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert_ne!(fdc.status_register() & FDC_STATUS_NON_DMA_MODE, 0);

        send(&mut fdc, &[0x06, 0x00, 0x00, 0x00, 0x01, 0x02, 0x12, 0x1B, 0xFF]);
        assert_eq!(fdc.phase(), ControllerPhase::Execution);
        assert!(fdc.irq());
        assert_ne!(fdc.status_register() & FDC_STATUS_DIO, 0);

        for i in 0..512 {
            assert_eq!(fdc.read_port(FDC_PORT_DATA), 0xAA, "byte {}", i);
        }
        assert_eq!(fdc.phase(), ControllerPhase::Result);
        assert!(fdc.irq());

        assert_eq!(results(&mut fdc, 7), vec![ST0_IC0, ST1_END_OF_CYLINDER, 0, 0, 0, 2, 2]);
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert!(!fdc.irq());
        assert_eq!(fdc.status_register() & FDC_STATUS_DIO, 0);
    }

    #[test]
    fn read_data_dma_goes_straight_to_result() {
        let mut bytes = vec![0u8; DISK_BYTES];
        bytes[512..1024].fill(0x3C);
        let tmp = TempImage::with_bytes(&bytes);
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x06, 0x00, 0x00, 0x00, 0x02, 0x02, 0x12, 0x1B, 0xFF]);
        assert_eq!(fdc.phase(), ControllerPhase::Result);
        assert!(fdc.is_active());

        for _ in 0..512 {
            assert_eq!(fdc.read_port(FDC_PORT_DMA_DATA0), 0x3C);
        }
        assert_eq!(fdc.get_debug_state().pending_bytes, 0);
        // Nothing left in the window.
        assert_eq!(fdc.read_port(FDC_PORT_DMA_DATA1), 0);

        assert_eq!(results(&mut fdc, 7), vec![0, ST1_END_OF_CYLINDER, 0, 0, 0, 3, 2]);
        assert!(!fdc.is_active());
    }

    #[test]
    fn write_data_non_dma_reaches_the_file() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        specify_non_dma(&mut fdc);
        send(&mut fdc, &[0x05, 0x00, 0x00, 0x00, 0x02, 0x02, 0x12, 0x1B, 0xFF]);
        assert_eq!(fdc.phase(), ControllerPhase::Execution);
        assert_eq!(fdc.status_register() & FDC_STATUS_DIO, 0);

        send(&mut fdc, &[0x5A; 512]);
        assert_eq!(fdc.phase(), ControllerPhase::Result);
        assert_ne!(fdc.status_register() & FDC_STATUS_DIO, 0);

        let on_disk = tmp.bytes();
        assert!(on_disk[..512].iter().all(|b| *b == 0));
        assert!(on_disk[512..1024].iter().all(|b| *b == 0x5A));
        assert!(on_disk[1024..1536].iter().all(|b| *b == 0));

        assert_eq!(results(&mut fdc, 7)[5], 3);
    }

    #[test]
    fn invalid_opcode_reports_ic1() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x1F]);
        assert_eq!(fdc.phase(), ControllerPhase::Result);
        assert_eq!(results(&mut fdc, 1), vec![ST0_INVALID_OPCODE]);
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
    }

    #[test]
    fn seek_then_sense_interrupt() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x0F, 0x00, 0x05]);
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert!(fdc.irq());

        send(&mut fdc, &[0x08]);
        assert_eq!(results(&mut fdc, 2), vec![ST0_SEEK_END, 5]);
        assert!(!fdc.irq());
        assert_eq!(fdc.get_debug_state().cylinder, 5);
    }

    #[test]
    fn recalibrate_second_drive_reports_abnormal_seek() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x0F, 0x00, 0x09]);
        send(&mut fdc, &[0x07, 0x01]);
        send(&mut fdc, &[0x08]);
        assert_eq!(results(&mut fdc, 2), vec![ST0_SEEK_END | ST0_IC0, 0]);
        assert_eq!(fdc.get_debug_state().cylinder, 0);
    }

    #[test]
    fn sense_interrupt_without_seek_polls() {
        let mut fdc = FloppyController::new();
        send(&mut fdc, &[0x08]);
        assert_eq!(results(&mut fdc, 2), vec![ST0_ABNORMAL_POLLING, 0]);

        // Select drive 1, keep the controller out of reset.
        fdc.write_port(FDC_PORT_CONTROL, 0x05);
        send(&mut fdc, &[0x08]);
        assert_eq!(results(&mut fdc, 2), vec![ST0_IC0 | ST0_SEEK_END, 0]);
    }

    #[test]
    fn sense_drive_status_builds_st3() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x04, 0x05]);
        assert_eq!(
            results(&mut fdc, 1),
            vec![ST3_UNIT_SELECT0 | ST3_HEAD | ST3_DOUBLESIDED | ST3_TRACK0 | ST3_READY]
        );

        let mut empty = FloppyController::new();
        send(&mut empty, &[0x0F, 0x00, 0x01]);
        send(&mut empty, &[0x04, 0x00]);
        assert_eq!(results(&mut empty, 1), vec![ST3_DOUBLESIDED]);
    }

    #[test]
    fn read_id_needs_media() {
        let mut fdc = FloppyController::new();
        send(&mut fdc, &[0x0A, 0x00]);
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert!(!fdc.irq());

        let tmp = blank_image();
        let mut fdc = loaded(&tmp);
        send(&mut fdc, &[0x0A, 0x00]);
        assert!(fdc.irq());
        assert_eq!(results(&mut fdc, 7), vec![0; 7]);
    }

    #[test]
    fn format_track_fills_current_sector() {
        let mut bytes = vec![0u8; DISK_BYTES];
        bytes[..1024].fill(0x11);
        let tmp = TempImage::with_bytes(&bytes);
        let mut fdc = loaded(&tmp);

        send(&mut fdc, &[0x0D, 0x04, 0x02, 0x12, 0x1B, 0xE6]);
        assert_eq!(fdc.phase(), ControllerPhase::Result);
        assert!(fdc.irq());
        assert_eq!(results(&mut fdc, 7), vec![0x04, 0, 0, 0, 0, 0, 2]);

        let on_disk = tmp.bytes();
        assert!(on_disk[..512].iter().all(|b| *b == 0xE6));
        assert!(on_disk[512..1024].iter().all(|b| *b == 0x11));
    }

    #[test]
    fn hard_reset_via_pin_returns_to_idle() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        specify_non_dma(&mut fdc);
        send(&mut fdc, &[0x06, 0x00, 0x00]);
        assert_eq!(fdc.phase(), ControllerPhase::Command);

        fdc.write_port(FDC_PORT_STATUS, PIN_RESET);
        assert_eq!(fdc.phase(), ControllerPhase::Command);
        fdc.write_port(FDC_PORT_STATUS, 0);

        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert_eq!(fdc.status_register(), FDC_STATUS_MRQ);
        assert!(!fdc.irq());
        assert!(!fdc.is_active());
    }

    #[test]
    fn soft_reset_raises_irq_for_ready_drive_zero() {
        let tmp = blank_image();
        let mut fdc = loaded(&tmp);

        fdc.write_port(FDC_PORT_CONTROL, 0x1C);
        assert!(!fdc.irq());
        fdc.write_port(FDC_PORT_CONTROL, 0x18);
        assert!(!fdc.irq());
        fdc.write_port(FDC_PORT_CONTROL, 0x1C);
        assert!(fdc.irq());
        assert_eq!(fdc.phase(), ControllerPhase::Idle);

        let state = fdc.get_debug_state();
        assert!(state.dma_enable);
        assert_eq!(state.motor, 1);
    }

    #[test]
    fn media_changed_latch_clears_on_read() {
        let tmp = blank_image();
        let mut fdc = FloppyController::new();
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), 0);

        fdc.load_image(tmp.path()).unwrap();
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), DISK_CHANGED_BIT);
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), 0);
    }

    #[test]
    fn dma_access_without_media_sets_changed() {
        let mut fdc = FloppyController::new();
        assert_eq!(fdc.read_port(FDC_PORT_DMA_DATA0), 0);
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), DISK_CHANGED_BIT);
    }

    #[test]
    fn fixed_ports_and_address_masking() {
        let mut fdc = FloppyController::new();
        assert_eq!(fdc.read_port(FDC_PORT_CONTROL), DRQ_BIT);
        assert_eq!(fdc.read_port(FDC_PORT_IRQ_STATUS), 0);
        assert_eq!(fdc.read_port(0xF4), FDC_STATUS_MRQ);
        assert_eq!(fdc.read_port(0x06), 0);

        fdc.write_port(0xFF, 0x02);
        assert_eq!(fdc.get_debug_state().data_rate, 2);
    }

    #[test]
    fn activity_events_once_per_transition() {
        let tmp = blank_image();
        let (tx, rx) = unbounded();
        let mut fdc = FloppyController::new().with_event_sender(tx);

        fdc.load_image(tmp.path()).unwrap();
        specify_non_dma(&mut fdc);
        send(&mut fdc, &[0x06, 0x00, 0x00, 0x00, 0x01, 0x02, 0x12, 0x1B, 0xFF]);
        for _ in 0..512 {
            fdc.read_port(FDC_PORT_DATA);
        }
        results(&mut fdc, 7);

        let events: Vec<FloppyEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                FloppyEvent::MediaLoaded,
                FloppyEvent::IoStarted,
                FloppyEvent::IoStopped,
                FloppyEvent::IoStarted,
                FloppyEvent::IoStopped,
            ]
        );
    }

    #[test]
    fn interrupt_line_follows_level_changes() {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let tmp = blank_image();
        let mut fdc = FloppyController::new().with_interrupt_line(Box::new(RecordingLine(levels.clone())));
        fdc.load_image(tmp.path()).unwrap();

        send(&mut fdc, &[0x0F, 0x00, 0x02]);
        send(&mut fdc, &[0x0F, 0x00, 0x03]);
        send(&mut fdc, &[0x08]);
        results(&mut fdc, 2);

        assert_eq!(*levels.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn command_log_is_bounded() {
        let mut fdc = FloppyController::new();
        for _ in 0..(FDC_LOG_LEN + 10) {
            send(&mut fdc, &[0x03, 0x00, 0x00]);
        }
        let state = fdc.get_debug_state();
        assert_eq!(state.cmd_log.len(), FDC_LOG_LEN);
        assert_eq!(state.last_cmd, Command::Specify);
    }
}
