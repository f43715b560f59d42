//! Cursor-transparent read passes.
//!
//! A [`PeekGuard`] owns the store for the duration of one pass. It flushes
//! pending samples, rewinds the shared cursor to the start of the log, and
//! puts the saved cursor back when dropped, whether the pass finished,
//! failed, or unwound.

use std::ops::{Deref, DerefMut};

use log::debug;

use crate::core::cursor::Cursor;
use crate::core::store::LogSource;
use crate::core::Result;

pub struct PeekGuard<'a, S: LogSource + ?Sized> {
    source: &'a mut S,
    saved: Cursor,
}

impl<'a, S: LogSource + ?Sized> PeekGuard<'a, S> {
    /// Save the consumption cursor, flush pending samples, rewind.
    ///
    /// If the flush fails the cursor has not moved and nothing needs undoing.
    pub fn begin(source: &'a mut S) -> Result<Self> {
        let saved = source.save_cursor();
        let flushed = source.flush_pending_samples()?;
        source.set_cursor(Cursor::START);
        debug!("peek pass started (saved cursor {saved:?}, flushed {flushed})");
        Ok(Self { source, saved })
    }

    /// Cursor that will be restored when the guard drops.
    pub fn saved_cursor(&self) -> Cursor {
        self.saved
    }
}

impl<S: LogSource + ?Sized> Deref for PeekGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.source
    }
}

impl<S: LogSource + ?Sized> DerefMut for PeekGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.source
    }
}

impl<S: LogSource + ?Sized> Drop for PeekGuard<'_, S> {
    fn drop(&mut self) {
        self.source.set_cursor(self.saved);
        debug!("peek pass finished, cursor restored to {:?}", self.saved);
    }
}
