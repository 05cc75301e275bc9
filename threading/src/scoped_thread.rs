// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    any::Any,
    io, panic,
    thread::{self, JoinHandle, ThreadId},
};

use thiserror::Error;
use tracing::{error, trace};

/// Reasons a thread can't be wrapped in a [`ScopedThread`].
#[derive(Debug, Error)]
pub enum ScopedThreadError {
    /// There was no thread handle to take ownership of.
    #[error("no thread was given to the scoped thread, there's nothing to join")]
    NotStarted,
    /// The thread had already run to completion, so there's nothing left for
    /// the [`ScopedThread`] to wait on. The handle is returned as is, and can
    /// still be joined to get the thread's result.
    #[error("the thread has already finished running")]
    AlreadyFinished(JoinHandle<()>),
    /// The thread name contained a nul byte, which the platform can't
    /// represent.
    #[error("thread name {0:?} contains a nul byte")]
    InvalidName(String),
    /// The operating system refused to spawn a new thread.
    #[error("failed to spawn a thread")]
    Spawn(#[from] io::Error),
}

impl ScopedThreadError {
    /// Returns the handle that was passed in, if there was one.
    pub fn into_handle(self) -> Option<JoinHandle<()>> {
        match self {
            ScopedThreadError::AlreadyFinished(handle) => Some(handle),
            ScopedThreadError::NotStarted
            | ScopedThreadError::InvalidName(_)
            | ScopedThreadError::Spawn(_) => None,
        }
    }
}

/// An owned thread which is joined when this is dropped.
///
/// Unlike a plain [`JoinHandle`], which detaches the thread when dropped, this
/// makes sure the thread has finished before the scope owning it ends, however
/// it ends: returning normally, returning early with `?`, or unwinding from a
/// panic.
///
/// Not [`Clone`] nor [`Default`]: there's exactly one owner for a thread at a
/// time, and it's only ever joined once.
#[derive(Debug)]
pub struct ScopedThread {
    /// The thread being waited on. Only None after it's been joined, which
    /// happens either in [`ScopedThread::join`] or in the Drop impl, so it's
    /// always Some while the [`ScopedThread`] is usable.
    handle: Option<JoinHandle<()>>,
    id: ThreadId,
}

impl ScopedThread {
    /// Takes ownership of a running thread.
    ///
    /// Returns [`ScopedThreadError::AlreadyFinished`] (with the handle) if the
    /// thread has already finished.
    pub fn new(handle: JoinHandle<()>) -> Result<ScopedThread, ScopedThreadError> {
        if handle.is_finished() {
            return Err(ScopedThreadError::AlreadyFinished(handle));
        }
        Ok(ScopedThread::from_running(handle))
    }

    /// Like [`ScopedThread::new`], but for handles which might not exist, in
    /// which case [`ScopedThreadError::NotStarted`] is returned.
    pub fn from_handle(handle: Option<JoinHandle<()>>) -> Result<ScopedThread, ScopedThreadError> {
        let handle = handle.ok_or(ScopedThreadError::NotStarted)?;
        ScopedThread::new(handle)
    }

    /// Spawns a new thread with the given name, running `f`.
    ///
    /// The returned [`ScopedThread`] owns the thread even if `f` returns before
    /// this function does. Names with nul bytes are rejected with
    /// [`ScopedThreadError::InvalidName`].
    pub fn spawn<F>(name: impl Into<String>, f: F) -> Result<ScopedThread, ScopedThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        if name.contains('\0') {
            return Err(ScopedThreadError::InvalidName(name));
        }
        let handle = thread::Builder::new().name(name).spawn(f)?;
        Ok(ScopedThread::from_running(handle))
    }

    fn from_running(handle: JoinHandle<()>) -> ScopedThread {
        let id = handle.thread().id();
        trace!(
            "Scoped thread {:?} ({}) created.",
            id,
            handle.thread().name().unwrap_or("unnamed"),
        );
        ScopedThread {
            handle: Some(handle),
            id,
        }
    }

    /// Returns the id of the owned thread.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the name of the owned thread, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.handle.as_ref().and_then(|handle| handle.thread().name())
    }

    /// Returns true if the thread has finished running. Does not block.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Blocks until the thread finishes, returning the panic payload if the
    /// thread panicked.
    ///
    /// Dropping the [`ScopedThread`] does the same, but resumes the panic on
    /// the current thread instead of returning it.
    pub fn join(mut self) -> thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedThread {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        trace!("Joining scoped thread {:?}.", self.id);
        if let Err(payload) = handle.join() {
            if thread::panicking() {
                // Resuming here would be a panic during a panic, i.e. an abort.
                error!(
                    "Scoped thread {:?} panicked while its owner was already unwinding: {}",
                    self.id,
                    panic_message(&*payload),
                );
            } else {
                panic::resume_unwind(payload);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
