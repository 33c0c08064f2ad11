//! Subscriber output sinks.

use std::io::{self, Write};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, TrySendError};

/// Per-subscriber write failure. Any error removes the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("subscriber buffer is full")]
    Full,
    #[error("subscriber disconnected")]
    Disconnected,
    #[error("subscriber write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a subscriber's frames go. Implementations must not block: the hub
/// holds its registry lock while writing.
pub trait FrameSink: Send {
    /// Write one complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the subscriber can no longer receive.
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError>;
}

/// Sink backed by a bounded crossbeam channel. A full buffer counts as a
/// failed write.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Vec<u8>>,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(sender: Sender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl FrameSink for ChannelSink {
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        self.sender.try_send(frame.to_vec()).map_err(|err| match err {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

/// Sink writing frames to any byte stream (a socket, stdout, a file).
///
/// Frames go through a bounded channel to a dedicated writer thread, so a
/// stalled stream fills its own buffer and gets dropped instead of holding
/// up the hub. The thread exits when the sink is dropped or a write fails.
#[derive(Debug)]
pub struct WriterSink {
    queue: ChannelSink,
}

impl WriterSink {
    /// Start a writer thread that drains up to `capacity` queued frames into
    /// `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<W>(writer: W, capacity: usize) -> io::Result<(Self, WriterThread<W>)>
    where
        W: Write + Send + 'static,
    {
        let (sender, receiver) = crossbeam::channel::bounded::<Vec<u8>>(capacity);
        let thread = std::thread::Builder::new()
            .name("taskweave-sink-writer".into())
            .spawn(move || write_loop(writer, &receiver))?;
        Ok((
            Self {
                queue: ChannelSink::new(sender),
            },
            WriterThread { thread },
        ))
    }
}

impl FrameSink for WriterSink {
    fn send(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        self.queue.send(frame)
    }
}

fn write_loop<W: Write>(mut writer: W, frames: &Receiver<Vec<u8>>) -> io::Result<W> {
    for frame in frames {
        writer.write_all(&frame)?;
        writer.flush()?;
    }
    Ok(writer)
}

/// Owner of a [`WriterSink`]'s writer thread.
#[derive(Debug)]
pub struct WriterThread<W> {
    thread: JoinHandle<io::Result<W>>,
}

impl<W> WriterThread<W> {
    /// Wait for the thread to drain its queue and return the writer. Blocks
    /// until the sink has been dropped (by the hub or by its owner).
    ///
    /// # Errors
    ///
    /// Returns the write error that stopped the thread, or an error if the
    /// thread panicked.
    pub fn join(self) -> io::Result<W> {
        self.thread
            .join()
            .map_err(|_| io::Error::other("sink writer thread panicked"))?
    }
}
