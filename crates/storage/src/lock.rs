//! Reentrant reader-writer table locks.
//!
//! Lock state is tracked explicitly as per-thread held-level counters rather
//! than delegating to an OS rwlock, because the required semantics are
//! reentrancy (re-acquiring a level you already hold bumps a counter) and
//! in-place upgrade (a reader may take the write lock without releasing its
//! read lock). There is no downgrade: releasing the write lock while a read
//! level is still held leaves the read lock in place.
//!
//! At most one reader at a time holds upgrade rights. When two readers race
//! to upgrade, the loser yields its read levels until it acquires the write
//! lock and re-holds them then; its pre-upgrade reads must be revalidated
//! under the write lock. Lock ordering across tables is the caller's
//! responsibility.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct LockCore {
    /// Read levels held, per thread.
    readers: HashMap<ThreadId, usize>,
    /// Write holder and its held level.
    writer: Option<(ThreadId, usize)>,
    /// The one reader currently allowed to upgrade in place.
    upgrader: Option<ThreadId>,
}

impl LockCore {
    fn read_level(&self, me: ThreadId) -> usize {
        self.readers.get(&me).copied().unwrap_or(0)
    }

    fn other_readers(&self, me: ThreadId) -> bool {
        self.readers.iter().any(|(tid, n)| *tid != me && *n > 0)
    }
}

/// A blocking, reentrant, upgradeable reader-writer lock for one table.
pub struct TableLock {
    core: Mutex<LockCore>,
    cond: Condvar,
}

impl TableLock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self {
            core: Mutex::new(LockCore::default()),
            cond: Condvar::new(),
        }
    }

    /// Acquires a read level, blocking while another thread holds the write
    /// lock. Reentrant: a thread already holding either level is never
    /// blocked.
    pub fn read(&self) -> ReadGuard<'_> {
        let me = thread::current().id();
        let mut core = self.core.lock();
        loop {
            match core.writer {
                Some((tid, _)) if tid != me => {
                    self.cond.wait(&mut core);
                }
                _ => break,
            }
        }
        *core.readers.entry(me).or_insert(0) += 1;
        ReadGuard { lock: self }
    }

    /// Acquires a write level, blocking while any other thread holds either
    /// level. A thread holding a read level upgrades in place when it wins
    /// the single upgrade slot; a thread that loses the race yields its read
    /// levels until the write lock is acquired, then re-holds them.
    pub fn write(&self) -> WriteGuard<'_> {
        let me = thread::current().id();
        let mut core = self.core.lock();
        let mut yielded: Option<usize> = None;
        loop {
            if let Some((tid, ref mut level)) = core.writer {
                if tid == me {
                    *level += 1;
                    break;
                }
                self.cond.wait(&mut core);
                continue;
            }
            if !core.other_readers(me) {
                if core.upgrader == Some(me) {
                    core.upgrader = None;
                }
                core.writer = Some((me, 1));
                break;
            }
            let held = core.read_level(me);
            if held == 0 {
                self.cond.wait(&mut core);
                continue;
            }
            // Upgrading while other readers are active.
            match core.upgrader {
                Some(tid) if tid != me => {
                    // Lost the upgrade race: yield the read levels so the
                    // winner's upgrade can complete, and wake it up.
                    yielded = Some(held);
                    core.readers.remove(&me);
                    self.cond.notify_all();
                    self.cond.wait(&mut core);
                }
                _ => {
                    core.upgrader = Some(me);
                    self.cond.wait(&mut core);
                }
            }
        }
        if let Some(levels) = yielded {
            core.readers.insert(me, levels);
        }
        WriteGuard { lock: self }
    }

    /// Returns whether the calling thread holds the write lock.
    pub fn is_write_held(&self) -> bool {
        let me = thread::current().id();
        matches!(self.core.lock().writer, Some((tid, _)) if tid == me)
    }

    /// Returns whether the calling thread holds a read level.
    pub fn is_read_held(&self) -> bool {
        let me = thread::current().id();
        self.core.lock().read_level(me) > 0
    }

    fn release_read(&self) {
        let me = thread::current().id();
        let mut core = self.core.lock();
        if let Some(level) = core.readers.get_mut(&me) {
            *level -= 1;
            if *level == 0 {
                core.readers.remove(&me);
            }
        }
        drop(core);
        self.cond.notify_all();
    }

    fn release_write(&self) {
        let me = thread::current().id();
        let mut core = self.core.lock();
        if let Some((tid, ref mut level)) = core.writer {
            if tid == me {
                *level -= 1;
                if *level == 0 {
                    core.writer = None;
                }
            }
        }
        drop(core);
        self.cond.notify_all();
    }
}

impl Default for TableLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one read level on drop.
pub struct ReadGuard<'a> {
    lock: &'a TableLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Releases one write level on drop.
pub struct WriteGuard<'a> {
    lock: &'a TableLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
