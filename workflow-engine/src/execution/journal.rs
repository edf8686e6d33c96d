// Journal
// Unbounded condvar-guarded queue carrying progress entries between threads

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Result of a blocking read
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry<T> {
    Entry(T),
    /// The journal was closed and every entry has been read
    Closed,
}

#[derive(Debug)]
struct Inner<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Multi-producer queue drained by a consumer on another thread.
///
/// `write` never blocks. `read_entry` blocks until an entry is available
/// or the journal is closed and empty.
#[derive(Debug)]
pub struct Journal<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Journal<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // Recover from poisoning; entries are plain data
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an entry. Returns false if the journal is already closed.
    pub fn write(&self, entry: T) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.queue.push_back(entry);
        drop(inner);
        self.available.notify_one();
        true
    }

    pub fn read_entry(&self) -> JournalEntry<T> {
        let mut inner = self.lock();
        loop {
            if let Some(entry) = inner.queue.pop_front() {
                return JournalEntry::Entry(entry);
            }
            if inner.closed {
                return JournalEntry::Closed;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Non-blocking read
    pub fn try_read(&self) -> Option<T> {
        self.lock().queue.pop_front()
    }

    /// Stop accepting writes; readers drain what is left, then see `Closed`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_drain_after_close() {
        let journal = Journal::new();
        assert!(journal.write("a"));
        assert!(journal.write("b"));
        journal.close();
        assert!(!journal.write("c"));

        assert_eq!(journal.read_entry(), JournalEntry::Entry("a"));
        assert_eq!(journal.read_entry(), JournalEntry::Entry("b"));
        assert_eq!(journal.read_entry(), JournalEntry::Closed);
        assert_eq!(journal.read_entry(), JournalEntry::Closed);
    }

    #[test]
    fn test_reader_blocks_until_written() {
        let journal = Arc::new(Journal::new());
        let reader = {
            let journal = Arc::clone(&journal);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let JournalEntry::Entry(n) = journal.read_entry() {
                    seen.push(n);
                }
                seen
            })
        };

        for n in 0..100 {
            journal.write(n);
        }
        journal.close();

        let seen = reader.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_try_read() {
        let journal = Journal::new();
        assert_eq!(journal.try_read(), None::<u8>);
        journal.write(1u8);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.try_read(), Some(1));
        assert!(journal.is_empty());
    }
}
