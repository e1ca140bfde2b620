//! Deferred referent queue
//!
//! NDR writes every fixed field of a constructed type before any pointer
//! body. Each call to `NdrWriter::write` / `NdrReader::read` opens a level:
//! the fixed pass enqueues one entry per non-null pointer, then the level
//! switches to the deferred pass and every entry must be taken back, in
//! order, by the pointer that enqueued it. A body's own pointers open a
//! nested level, so bodies are laid out depth-first.

use std::collections::VecDeque;

use crate::{NdrError, Result};

/// Pointer semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// `[ref]`: never null, no inline representation
    Ref,
    /// `[unique]`: nullable, no aliasing
    Unique,
    /// `[ptr]`: nullable, aliasing allowed
    Full,
}

/// One pointer whose body has not been written/read yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pending {
    pub id: u32,
    pub kind: PointerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fixed,
    Deferred,
}

#[derive(Debug)]
struct Level {
    phase: Phase,
    queue: VecDeque<Pending>,
}

#[derive(Debug, Default)]
pub(crate) struct DeferredQueue {
    levels: Vec<Level>,
}

impl DeferredQueue {
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn enter(&mut self) {
        self.levels.push(Level {
            phase: Phase::Fixed,
            queue: VecDeque::new(),
        });
    }

    pub fn begin_deferred(&mut self) -> Result<()> {
        let level = self
            .levels
            .last_mut()
            .ok_or(NdrError::InvalidState("no open level"))?;
        if level.phase != Phase::Fixed {
            return Err(NdrError::InvalidState("deferred pass started twice"));
        }
        level.phase = Phase::Deferred;
        Ok(())
    }

    pub fn leave(&mut self) -> Result<()> {
        let level = self
            .levels
            .pop()
            .ok_or(NdrError::InvalidState("no open level"))?;
        if level.phase != Phase::Deferred {
            return Err(NdrError::InvalidState("level closed before deferred pass"));
        }
        if !level.queue.is_empty() {
            return Err(NdrError::InvalidState("deferred referents left unvisited"));
        }
        Ok(())
    }

    pub fn enqueue(&mut self, pending: Pending) -> Result<()> {
        let level = self
            .levels
            .last_mut()
            .ok_or(NdrError::InvalidState("pointer outside of a level"))?;
        if level.phase != Phase::Fixed {
            return Err(NdrError::InvalidState("pointer enqueued during deferred pass"));
        }
        level.queue.push_back(pending);
        Ok(())
    }

    /// Pop the front entry, which must belong to the pointer being visited.
    ///
    /// `id` is `None` when the caller does not know its own referent id
    /// (encoding a unique pointer).
    pub fn take(&mut self, kind: PointerKind, id: Option<u32>) -> Result<Pending> {
        let mismatch = || match kind {
            PointerKind::Ref => NdrError::UnexpectedNullRef,
            _ => NdrError::DanglingReferent(id.unwrap_or(0)),
        };
        let level = self.deferred_level()?;
        match level.queue.front() {
            Some(front) if front.kind == kind && id.map_or(true, |id| id == front.id) => {
                let front = *front;
                level.queue.pop_front();
                Ok(front)
            }
            Some(front) if kind != PointerKind::Ref => Err(NdrError::DanglingReferent(front.id)),
            _ => Err(mismatch()),
        }
    }

    /// Pop the front entry only if it is exactly `pending`.
    pub fn take_if(&mut self, pending: Pending) -> Result<bool> {
        let level = self.deferred_level()?;
        if level.queue.front() == Some(&pending) {
            level.queue.pop_front();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn deferred_level(&mut self) -> Result<&mut Level> {
        let level = self
            .levels
            .last_mut()
            .ok_or(NdrError::InvalidState("pointer outside of a level"))?;
        if level.phase != Phase::Deferred {
            return Err(NdrError::InvalidState("pointer body visited during fixed pass"));
        }
        Ok(level)
    }
}
