//! Chunk stream plumbing
//!
//! A stream is a bounded channel owned by one request. The producer task
//! writes through [`ChunkSink`], which assigns ids and guarantees a single
//! terminal chunk; the consumer reads a [`ChunkStream`]. Dropping the
//! consumer cancels the producer's in-flight provider call.

use crate::error::{Error, Result};
use dsrouter_llm::{Metadata, StreamChunk};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Consumer side of a chunk stream
///
/// Yields chunks in increasing `chunk_id` order and ends after the chunk
/// with `is_final == true`.
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamChunk>,
    _cancel_on_drop: DropGuard,
}

impl ChunkStream {
    /// Create a linked stream and sink
    #[must_use]
    pub fn channel(capacity: usize, base_metadata: Metadata) -> (ChunkSink, ChunkStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let sink = ChunkSink {
            tx,
            cancel: cancel.clone(),
            base_metadata,
            next_id: 0,
            finished: false,
        };
        let stream = ChunkStream {
            rx,
            _cancel_on_drop: cancel.drop_guard(),
        };
        (sink, stream)
    }

    /// Stop the stream and cancel the producer
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

/// Producer side of a chunk stream
#[derive(Debug)]
pub struct ChunkSink {
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
    base_metadata: Metadata,
    next_id: u64,
    finished: bool,
}

impl ChunkSink {
    /// Token cancelled when the consumer goes away
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Add metadata stamped on every later chunk
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.base_metadata.insert(key.into(), value.into());
    }

    /// Send a non-terminal chunk
    ///
    /// # Errors
    ///
    /// `StreamCancelled` if the consumer is gone
    pub async fn send(&mut self, chunk: StreamChunk) -> Result<()> {
        self.emit(chunk, false).await
    }

    /// Send the terminal chunk; later sends are ignored
    ///
    /// # Errors
    ///
    /// `StreamCancelled` if the consumer is gone
    pub async fn finish(&mut self, chunk: StreamChunk) -> Result<()> {
        self.emit(chunk, true).await
    }

    async fn emit(&mut self, mut chunk: StreamChunk, is_final: bool) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(Error::StreamCancelled);
        }

        chunk.chunk_id = self.next_id;
        chunk.is_final = is_final;
        for (key, value) in &self.base_metadata {
            chunk
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::StreamCancelled)?;
        self.next_id += 1;
        self.finished = is_final;
        Ok(())
    }
}

/// Split content into pieces of at most `chunk_size` characters
///
/// Always returns at least one piece, so empty content still produces a
/// terminal chunk.
#[must_use]
pub fn slice_content(content: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(chunk_size)
        .map(|piece| piece.iter().collect())
        .collect()
}
