//! Read Worker Module
//!
//! Serialized read access to passive segments.
//!
//! ## Responsibilities
//! - Own one open file handle per passive segment
//! - Serve `offset → entry` reads one at a time (seek + decode never race)
//! - Release the file handle when the worker stops
//!
//! ## Architecture
//! ```text
//!   get() ──┐                       ┌─────────────────────────┐
//!   get() ──┼──▶ bounded queue ────▶│ worker thread           │
//!   get() ──┘    (blocking send)    │  seek(offset) → decode  │
//!        ◀──────── one-shot reply ──│  owns segment's File    │
//!                                   └─────────────────────────┘
//! ```
//!
//! Reads against different segments run in parallel; each segment's reads
//! are serialized by its own worker.

mod pool;

use std::fs::File;
use std::io::BufReader;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use crate::codec::Entry;
use crate::error::{Result, StoreError};
use crate::segment::{read_entry_at, Segment, SegmentId};

pub use pool::ReadWorkerPool;

/// Messages accepted by a worker thread
enum ReadRequest {
    /// Decode the record at `offset` and send it back on `reply`
    Read {
        offset: u64,
        reply: Sender<Result<Entry>>,
    },

    /// Stop the thread and close the file
    Shutdown,
}

/// Handle to a running read worker for one segment
pub struct ReadWorker {
    segment: SegmentId,
    requests: Sender<ReadRequest>,
    handle: Option<JoinHandle<()>>,
}

impl ReadWorker {
    /// Open `segment` for reading and start its worker thread
    pub fn spawn(segment: &Segment, queue_depth: usize) -> Result<Self> {
        let file = File::open(segment.path())?;
        let (requests, inbox) = channel::bounded(queue_depth);
        let id = segment.id();

        let handle = thread::Builder::new()
            .name(format!("segstore-read-{}", id))
            .spawn(move || run_reader(id, file, inbox))?;

        debug!(segment = %id, path = %segment.path().display(), "Read worker started");

        Ok(Self {
            segment: id,
            requests,
            handle: Some(handle),
        })
    }

    /// Segment this worker serves
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Read the entry at `offset`, blocking until the worker replies
    pub fn read(&self, offset: u64) -> Result<Entry> {
        let (reply, response) = channel::bounded(1);

        self.requests
            .send(ReadRequest::Read { offset, reply })
            .map_err(|_| StoreError::WorkerNotFound(self.segment))?;

        response
            .recv()
            .map_err(|_| StoreError::WorkerNotFound(self.segment))?
    }

    /// Stop the worker and wait for its file handle to close
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        // A send error means the thread is already gone
        let _ = self.requests.send(ReadRequest::Shutdown);

        if handle.join().is_err() {
            warn!(segment = %self.segment, "Read worker panicked");
        }
    }
}

impl Drop for ReadWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: serve requests until shutdown or disconnect
fn run_reader(segment: SegmentId, file: File, inbox: Receiver<ReadRequest>) {
    let mut reader = BufReader::new(file);

    for request in inbox.iter() {
        match request {
            ReadRequest::Read { offset, reply } => {
                let result = read_entry_at(&mut reader, offset);
                // Caller may have given up waiting
                let _ = reply.send(result);
            }
            ReadRequest::Shutdown => break,
        }
    }

    debug!(segment = %segment, "Read worker stopped");
}
