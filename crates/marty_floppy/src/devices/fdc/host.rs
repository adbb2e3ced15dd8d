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

    devices::fdc::host.rs

    Host-side media and file operations on a FloppyController
*/

//! Media lifecycle and FAT12 file operations for host tooling. These bypass the port
//! protocol and work directly on the mounted image; mutations are refused while the
//! controller has a transfer in flight. Every filesystem call goes through a
//! [PositionGuard] so the image cursor is the same afterwards.
//!
//! The `FloppyResult` methods are the primary API. The plain bool/integer wrappers at the
//! bottom keep the host contract of reporting failure without detail; they log the cause.

use std::path::Path;

use super::FloppyController;
use crate::{
    error::{FloppyError, FloppyResult},
    events::FloppyEvent,
    fat12::{dir::read_volume_tree, export::tree_to_json, mutate, DirectoryEntryNode},
    image::PositionGuard,
};

impl FloppyController {
    /// Mount the raw image at `path`. A failed load leaves the current medium mounted.
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> FloppyResult<()> {
        let path = path.as_ref();
        self.store.load(path)?;
        self.rewind_transfer();

        log::info!("Loaded floppy image: {}", path.display());
        self.notify(FloppyEvent::MediaLoaded);
        self.update_activity();
        Ok(())
    }

    /// Close the mounted image and return the controller to idle.
    pub fn eject(&mut self) -> FloppyResult<()> {
        let image = self.store.eject()?;
        self.reset_transfer_state();

        log::info!("Ejected floppy image: {}", image.path().display());
        self.notify(FloppyEvent::MediaEjected);
        self.update_activity();
        Ok(())
    }

    pub fn save_image(&mut self) -> FloppyResult<()> {
        self.store.flush()
    }

    /// Name of the mounted image file, if any.
    pub fn image_name(&self) -> Option<String> {
        self.store.image().map(|image| image.name())
    }

    fn volume(&mut self) -> FloppyResult<PositionGuard<'_>> {
        self.store.image_mut()?.position_guard()
    }

    fn volume_for_write(&mut self) -> FloppyResult<PositionGuard<'_>> {
        if self.is_active() {
            return Err(FloppyError::ConcurrentAccessRejected);
        }
        self.volume()
    }

    pub fn directory_tree(&mut self) -> FloppyResult<DirectoryEntryNode> {
        let mut volume = self.volume()?;
        read_volume_tree(&mut volume)
    }

    pub fn directory_tree_json(&mut self, pretty: bool) -> FloppyResult<String> {
        tree_to_json(&self.directory_tree()?, pretty)
    }

    pub fn add_file(&mut self, name: &str, data: &[u8]) -> FloppyResult<()> {
        let mut volume = self.volume_for_write()?;
        mutate::add_file(&mut volume, name, data)?;
        log::info!("Added {} ({} bytes)", name, data.len());
        Ok(())
    }

    pub fn delete_file(&mut self, name: &str) -> FloppyResult<()> {
        let mut volume = self.volume_for_write()?;
        mutate::delete_file(&mut volume, name)?;
        log::info!("Deleted {}", name);
        Ok(())
    }

    pub fn rename_file(&mut self, name: &str, new_name: &str) -> FloppyResult<()> {
        let mut volume = self.volume_for_write()?;
        mutate::rename_file(&mut volume, name, new_name)?;
        log::info!("Renamed {} to {}", name, new_name);
        Ok(())
    }

    pub fn read_file(&mut self, name: &str) -> FloppyResult<Vec<u8>> {
        let mut volume = self.volume()?;
        mutate::read_file(&mut volume, name)
    }

    pub fn file_size(&mut self, name: &str) -> FloppyResult<u64> {
        let mut volume = self.volume()?;
        mutate::file_size(&mut volume, name)
    }

    pub fn mount_image(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        report(&format!("load {}", path.display()), self.load_image(path)).is_some()
    }

    pub fn eject_media(&mut self) -> bool {
        report("eject", self.eject()).is_some()
    }

    pub fn save_image_file(&mut self) -> bool {
        report("save", self.save_image()).is_some()
    }

    /// Compact JSON of the directory tree, or an empty string on failure.
    pub fn get_directory_tree_json(&mut self) -> String {
        report("directory tree", self.directory_tree_json(false)).unwrap_or_default()
    }

    pub fn add_file_from_buffer(&mut self, name: &str, data: &[u8]) -> bool {
        report(&format!("add {}", name), self.add_file(name, data)).is_some()
    }

    pub fn delete_file_by_name(&mut self, name: &str) -> bool {
        report(&format!("delete {}", name), self.delete_file(name)).is_some()
    }

    /// Size of `name` in bytes; 0 when it cannot be found.
    pub fn get_file_size(&mut self, name: &str) -> usize {
        report(&format!("size of {}", name), self.file_size(name))
            .map(|size| size as usize)
            .unwrap_or(0)
    }

    /// Copy up to `buffer.len()` bytes of `name` into `buffer`, returning the count copied.
    pub fn read_file_to_buffer(&mut self, name: &str, buffer: &mut [u8]) -> usize {
        match report(&format!("read {}", name), self.read_file(name)) {
            Some(data) => {
                let len = data.len().min(buffer.len());
                buffer[..len].copy_from_slice(&data[..len]);
                len
            }
            None => 0,
        }
    }
}

fn report<T>(operation: &str, result: FloppyResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Floppy {} failed: {}", operation, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device_types::fdc::*, test_util::TempImage};
    use crossbeam_channel::unbounded;

    fn mounted(tmp: &TempImage) -> FloppyController {
        let mut fdc = FloppyController::new();
        assert!(fdc.mount_image(tmp.path()));
        fdc
    }

    /// Leave a Read Data command waiting in the execution phase.
    fn start_transfer(fdc: &mut FloppyController) {
        for byte in [0x03, 0xDF, 0x03, 0x06, 0x00, 0x00, 0x00, 0x01, 0x02, 0x12, 0x1B, 0xFF] {
            fdc.write_port(FDC_PORT_DATA, byte);
        }
        assert_eq!(fdc.phase(), ControllerPhase::Execution);
        assert!(fdc.is_active());
    }

    #[test]
    fn add_read_size_round_trip() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();

        assert!(fdc.add_file_from_buffer("TEST.TXT", &data));
        assert_eq!(fdc.get_file_size("TEST.TXT"), data.len());

        let mut buf = vec![0u8; data.len()];
        assert_eq!(fdc.read_file_to_buffer("TEST.TXT", &mut buf), data.len());
        assert_eq!(buf, data);

        let mut short = [0u8; 10];
        assert_eq!(fdc.read_file_to_buffer("TEST.TXT", &mut short), 10);
        assert_eq!(&short, &data[..10]);
    }

    #[test]
    fn delete_removes_file_from_tree() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);

        assert!(fdc.add_file_from_buffer("GONE.BIN", &[1, 2, 3]));
        assert!(fdc.get_directory_tree_json().contains("GONE.BIN"));

        assert!(fdc.delete_file_by_name("GONE.BIN"));
        assert!(!fdc.get_directory_tree_json().contains("GONE.BIN"));
        assert_eq!(fdc.get_file_size("GONE.BIN"), 0);
        assert!(!fdc.delete_file_by_name("GONE.BIN"));
    }

    #[test]
    fn mutations_rejected_during_transfer() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);
        assert!(fdc.add_file_from_buffer("KEEP.TXT", b"keep me"));
        let before = tmp.bytes();

        start_transfer(&mut fdc);

        assert!(matches!(
            fdc.add_file("NEW.TXT", b"new"),
            Err(FloppyError::ConcurrentAccessRejected)
        ));
        assert!(!fdc.delete_file_by_name("KEEP.TXT"));
        assert!(!fdc.add_file_from_buffer("NEW.TXT", b"new"));
        assert!(matches!(
            fdc.rename_file("KEEP.TXT", "OTHER.TXT"),
            Err(FloppyError::ConcurrentAccessRejected)
        ));
        assert_eq!(tmp.bytes(), before);

        // Queries are still allowed and leave the transfer undisturbed.
        assert_eq!(fdc.get_file_size("KEEP.TXT"), 7);
        assert_eq!(fdc.phase(), ControllerPhase::Execution);
    }

    #[test]
    fn queries_preserve_transfer_stream() {
        let tmp = TempImage::formatted();
        let bytes = tmp.bytes();
        let mut fdc = mounted(&tmp);

        start_transfer(&mut fdc);
        let first = fdc.read_port(FDC_PORT_DATA);
        assert!(!fdc.get_directory_tree_json().is_empty());
        let second = fdc.read_port(FDC_PORT_DATA);
        assert_eq!([first, second], [bytes[0], bytes[1]]);
    }

    #[test]
    fn rename_keeps_contents() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);
        assert!(fdc.add_file_from_buffer("OLD.TXT", b"payload"));
        assert!(fdc.add_file_from_buffer("TAKEN.TXT", b"x"));

        fdc.rename_file("OLD.TXT", "NEW.TXT").unwrap();
        assert_eq!(fdc.read_file("NEW.TXT").unwrap(), b"payload");
        assert!(matches!(fdc.file_size("OLD.TXT"), Err(FloppyError::EntryNotFound(_))));
        assert!(matches!(
            fdc.rename_file("NEW.TXT", "TAKEN.TXT"),
            Err(FloppyError::NameExists(_))
        ));
    }

    #[test]
    fn load_nonexistent_fails() {
        let mut fdc = FloppyController::new();
        assert!(!fdc.mount_image("/nonexistent/dir/disk.img"));
        assert!(!fdc.is_present());
        assert!(matches!(fdc.add_file("A.TXT", b"a"), Err(FloppyError::MediaAbsent)));
        assert_eq!(fdc.get_directory_tree_json(), "");
    }

    #[test]
    fn failed_load_keeps_mounted_image() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);
        assert!(!fdc.mount_image("/nonexistent/dir/disk.img"));
        assert!(fdc.is_present());
        assert_eq!(fdc.image_name(), tmp.path().file_name().map(|n| n.to_string_lossy().into_owned()));
    }

    #[test]
    fn eject_lifecycle() {
        let tmp = TempImage::formatted();
        let (tx, rx) = unbounded();
        let mut fdc = FloppyController::new().with_event_sender(tx);

        assert!(!fdc.eject_media());
        assert!(fdc.mount_image(tmp.path()));
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), DISK_CHANGED_BIT);

        start_transfer(&mut fdc);
        assert!(fdc.eject_media());
        assert!(!fdc.is_present());
        assert!(!fdc.is_active());
        assert_eq!(fdc.phase(), ControllerPhase::Idle);
        assert_ne!(fdc.status_register() & FDC_STATUS_NON_DMA_MODE, 0);
        assert_eq!(fdc.read_port(FDC_PORT_DISK_CHANGE), DISK_CHANGED_BIT);
        assert!(!fdc.save_image_file());

        let events: Vec<FloppyEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                FloppyEvent::MediaLoaded,
                FloppyEvent::IoStarted,
                FloppyEvent::IoStopped,
                FloppyEvent::IoStarted,
                FloppyEvent::MediaEjected,
                FloppyEvent::IoStopped,
            ]
        );
    }

    #[test]
    fn json_tree_reports_disk_root() {
        let tmp = TempImage::formatted();
        let mut fdc = mounted(&tmp);
        assert!(fdc.add_file_from_buffer("HELLO.TXT", b"hello"));

        let value: serde_json::Value = serde_json::from_str(&fdc.get_directory_tree_json()).unwrap();
        assert_eq!(value["type"], "disk");
        assert_eq!(value["children"][0]["name"], "HELLO.TXT");
        assert_eq!(value["children"][0]["size"], 5);
        assert!(fdc.directory_tree_json(true).unwrap().contains('\n'));
    }
}
