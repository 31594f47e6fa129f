//! Test helpers for the transport module.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use super::{AcceptedStream, ConnectionHandler};

pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: AcceptedStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

enum Step {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

/// Reader that replays scripted chunks, then reports end of stream.
pub(crate) struct ScriptedReader {
    steps: VecDeque<Step>,
    probe: Option<Box<dyn FnMut() + Send>>,
}

impl ScriptedReader {
    pub(crate) fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            steps: chunks.into_iter().map(Step::Data).collect(),
            probe: None,
        }
    }

    pub(crate) fn then_send(mut self, chunk: Vec<u8>) -> Self {
        self.steps.push_back(Step::Data(chunk));
        self
    }

    pub(crate) fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.steps.push_back(Step::Fail(kind));
        self
    }

    /// Runs `probe` at the start of every read call.
    pub(crate) fn with_probe(mut self, probe: impl FnMut() + Send + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(probe) = self.probe.as_mut() {
            probe();
        }
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Step::Fail(kind)) => Err(kind.into()),
            Some(Step::Data(mut chunk)) => {
                let take = chunk.len().min(buf.len());
                let rest = chunk.split_off(take);
                buf[..take].copy_from_slice(&chunk);
                if !rest.is_empty() {
                    self.steps.push_front(Step::Data(rest));
                }
                Ok(take)
            }
        }
    }
}
