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

    events.rs

    Notification events and the interrupt line seam used by the floppy controller.
*/

//! The controller does not know who listens to it. Media and activity changes are
//! posted as [FloppyEvent]s on an optional channel, and the IRQ level is driven through
//! an [InterruptLine] supplied by whoever owns the interrupt controller.

use crossbeam_channel::Sender;
use strum_macros::Display;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum FloppyEvent {
    #[strum(serialize = "Media loaded")]
    MediaLoaded,
    #[strum(serialize = "Media ejected")]
    MediaEjected,
    #[strum(serialize = "I/O started")]
    IoStarted,
    #[strum(serialize = "I/O stopped")]
    IoStopped,
}

/// Receives the level of the controller's interrupt request line.
/// Only called when the level actually changes.
pub trait InterruptLine: Send {
    fn set_level(&mut self, asserted: bool);
}

/// Fire-and-forget event sink. A disconnected receiver is not an error.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<FloppyEvent>>,
}

impl EventSink {
    pub fn new(sender: Sender<FloppyEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn send(&self, event: FloppyEvent) {
        log::debug!("Floppy event: {}", event);
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                log::trace!("Floppy event receiver disconnected, dropping {:?}", event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_receiver_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        sink.send(FloppyEvent::MediaLoaded);
        assert_eq!(rx.try_recv().ok(), Some(FloppyEvent::MediaLoaded));
        drop(rx);
        sink.send(FloppyEvent::MediaEjected);
    }
}
