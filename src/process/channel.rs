//! Non-blocking reads from one of a child's output streams.
//!
//! An [`OutputChannel`] keeps at most one read request outstanding. Each call
//! to [`OutputChannel::read`] either issues a new request, returning its
//! bytes if it completed straight away, or waits a short bounded time for the
//! outstanding one. Nothing is pushed to the caller; the supervisor's poll
//! loop pulls.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::poll_immediate;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::ProcessError;
use crate::context::Reason;

/// Size of the buffer a single read fills.
pub const READ_BUFFER_SIZE: usize = 50_000;

/// How long a read waits on an outstanding request before giving up.
pub const DEFAULT_PENDING_WAIT: Duration = Duration::from_millis(500);

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

type Reader = Box<dyn AsyncRead + Send + Unpin>;

struct Completion {
    reader: Reader,
    buffer: Box<[u8]>,
    result: io::Result<usize>,
}

type PendingRead = Pin<Box<dyn Future<Output = Completion> + Send>>;

/// Parent-side read end of a redirected child stream.
pub struct OutputChannel {
    id: u64,
    reason: Reason,
    /// `None` while a read is outstanding or after end of stream.
    reader: Option<Reader>,
    /// Moved into the outstanding read and handed back on completion.
    buffer: Box<[u8]>,
    pending: Option<PendingRead>,
    pending_wait: Duration,
    reads_issued: u64,
}

impl std::fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputChannel")
            .field("id", &self.id)
            .field("reason", &self.reason)
            .field("pending", &self.is_pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl OutputChannel {
    /// Wrap the read end of a stream.
    pub fn new<R>(reason: Reason, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            reason,
            reader: Some(Box::new(reader)),
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            pending: None,
            pending_wait: DEFAULT_PENDING_WAIT,
            reads_issued: 0,
        }
    }

    /// Set how long [`read`](Self::read) waits on an outstanding request.
    #[must_use]
    pub fn with_pending_wait(mut self, wait: Duration) -> Self {
        self.pending_wait = wait;
        self
    }

    /// Process-wide unique id, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Whether a read request is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.pending.is_none()
    }

    /// Return whatever is available without blocking for long.
    ///
    /// An empty slice means nothing arrived yet, or the stream has ended. The
    /// returned bytes are only valid until the next call.
    ///
    /// Cancel-safe: dropping the returned future keeps the outstanding request.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Read` for any read failure other than a broken
    /// pipe, which is treated as end of stream.
    pub async fn read(&mut self) -> Result<&[u8], ProcessError> {
        if let Some(pending) = self.pending.as_mut() {
            let waited = tokio::time::timeout(self.pending_wait, pending).await;
            let Ok(completion) = waited else {
                return Ok(&[]);
            };
            self.pending = None;
            return self.complete(completion);
        }

        let Some(reader) = self.reader.take() else {
            return Ok(&[]);
        };
        let request = self.issue(reader);
        let pending = self.pending.insert(request);

        let polled = poll_immediate(pending).await;
        let Some(completion) = polled else {
            tracing::trace!(channel = self.id, reason = %self.reason, "read pending");
            return Ok(&[]);
        };
        self.pending = None;
        self.complete(completion)
    }

    fn issue(&mut self, mut reader: Reader) -> PendingRead {
        self.reads_issued += 1;
        let mut buffer = std::mem::take(&mut self.buffer);

        Box::pin(async move {
            let result = reader.read(&mut buffer).await;
            Completion {
                reader,
                buffer,
                result,
            }
        })
    }

    fn complete(&mut self, completion: Completion) -> Result<&[u8], ProcessError> {
        let Completion {
            reader,
            buffer,
            result,
        } = completion;
        self.buffer = buffer;

        match result {
            Ok(0) => {
                tracing::trace!(channel = self.id, reason = %self.reason, "end of stream");
                Ok(&[])
            }
            Ok(n) => {
                self.reader = Some(reader);
                Ok(&self.buffer[..n])
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::trace!(channel = self.id, reason = %self.reason, "broken pipe");
                Ok(&[])
            }
            Err(source) => Err(ProcessError::Read {
                reason: self.reason,
                source,
            }),
        }
    }
}
