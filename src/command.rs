// src/command.rs
//
// Commands from the input context to the render context.
//
// Commands are the ONLY way the input context mutates the active-note
// set. Everything a command carries is built (and allocated) before it
// is queued, so applying it on the render side never allocates.

use crate::keymap::Key;
use crate::note::Note;

/// Default capacity of the input -> render queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// A command from the input context.
///
/// Boxed payloads keep the enum small for the ring buffer.
#[derive(Debug)]
pub enum Command {
    /// A fully built note, ready to render.
    NoteOn(Box<Note>),

    /// Key-up for the held note on `key`.
    NoteOff(Key),
}

/// Create the input -> render queue.
///
/// - Producer: owned by the control handle
/// - Consumer: owned by the render handle
pub fn command_channel(capacity: usize) -> (rtrb::Producer<Command>, rtrb::Consumer<Command>) {
    rtrb::RingBuffer::new(capacity.max(1))
}

/// Create the render -> input queue that carries retired notes back
/// to be dropped off the audio thread.
pub fn retire_channel(capacity: usize) -> (rtrb::Producer<Box<Note>>, rtrb::Consumer<Box<Note>>) {
    rtrb::RingBuffer::new(capacity.max(1))
}
