// src/note_set.rs

use crate::keymap::Key;
use crate::note::Note;

/// Outcome of offering a new note to the set.
#[derive(Debug)]
pub enum Admission {
    Admitted,
    /// The key already has a held note; the new one is handed back.
    Duplicate(Box<Note>),
    /// No free slot; the new one is handed back.
    Full(Box<Note>),
}

/// The active notes of the current project.
///
/// Responsibilities:
/// - enforce one held note per key
/// - expose notes for rendering
/// - hand back retired notes so the caller decides where they drop
///
/// Does NOT allocate after construction.
pub struct NoteSet {
    notes: Vec<Box<Note>>,
    capacity: usize,
}

impl NoteSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            notes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a triggered note, unless its key is already held.
    ///
    /// A key whose only note is releasing can be retriggered; the tail
    /// keeps rendering next to the new note.
    pub fn admit(&mut self, note: Box<Note>) -> Admission {
        if self.notes.iter().any(|n| n.key == note.key && n.is_held()) {
            return Admission::Duplicate(note);
        }
        if self.notes.len() >= self.capacity {
            return Admission::Full(note);
        }
        self.notes.push(note);
        Admission::Admitted
    }

    /// Release the held note for `key`, if any.
    pub fn release(&mut self, key: Key) {
        if let Some(n) = self.notes.iter_mut().find(|n| n.key == key && n.is_held()) {
            n.release();
        }
    }

    /// Remove every note for which `retire` returns true, passing each
    /// one to `sink`.
    pub fn retire_where<P, S>(&mut self, mut retire: P, mut sink: S)
    where
        P: FnMut(&Note) -> bool,
        S: FnMut(Box<Note>),
    {
        let mut i = 0;
        while i < self.notes.len() {
            if retire(&self.notes[i]) {
                // Order is irrelevant
                sink(self.notes.swap_remove(i));
            } else {
                i += 1;
            }
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<Note>> {
        self.notes.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().map(|n| n.as_ref())
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn held_count(&self) -> usize {
        self.notes.iter().filter(|n| n.is_held()).count()
    }
}
