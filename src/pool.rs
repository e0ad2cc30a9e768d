//! Multi-threaded sentence decoding.
//!
//! A dispatcher thread reads input lines and hands one sentence at a time
//! to a fixed set of workers over a bounded channel, so it blocks (in FIFO
//! order) whenever every worker is busy. Results come back tagged with the
//! sentence id and are re-sequenced into input order.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use syndec_core::{Decoder, Translation};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("a pool needs at least one worker")]
    NoWorkers,
    #[error("cannot spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Job {
    id: usize,
    line: String,
}

pub struct DecoderPool {
    decoder: Arc<Decoder>,
    num_threads: usize,
}

impl DecoderPool {
    pub fn new(decoder: Arc<Decoder>, num_threads: usize) -> Result<Self, PoolError> {
        if num_threads == 0 {
            return Err(PoolError::NoWorkers);
        }
        Ok(Self {
            decoder,
            num_threads,
        })
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Decodes every line of `lines`, numbering sentences from 0. The
    /// returned stream yields translations in input order as soon as each
    /// one and all its predecessors are done.
    ///
    /// Dropping the stream early stops the dispatcher after the sentences
    /// already handed out.
    pub fn decode_lines<I>(&self, lines: I) -> Result<TranslationStream, PoolError>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(self.num_threads);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<(usize, Translation)>();

        let mut handles = Vec::with_capacity(self.num_threads + 1);
        for k in 0..self.num_threads {
            let decoder = Arc::clone(&self.decoder);
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("syndec-worker-{k}"))
                .spawn(move || worker(&decoder, &jobs, &results))?;
            handles.push(handle);
        }
        drop(result_tx);

        let lines = lines.into_iter();
        let handle = thread::Builder::new()
            .name("syndec-dispatch".into())
            .spawn(move || dispatch(lines, &job_tx))?;
        handles.push(handle);
        info!(threads = self.num_threads, "decoding started");

        Ok(TranslationStream {
            results: result_rx,
            pending: BTreeMap::new(),
            next: 0,
            handles,
        })
    }
}

fn dispatch(lines: impl Iterator<Item = String>, jobs: &mpsc::SyncSender<Job>) {
    let mut submitted = 0;
    for (id, line) in lines.enumerate() {
        if jobs.send(Job { id, line }).is_err() {
            debug!(id, "workers gone; stopping dispatch");
            break;
        }
        submitted += 1;
    }
    debug!(submitted, "input exhausted");
}

fn worker(
    decoder: &Decoder,
    jobs: &Mutex<mpsc::Receiver<Job>>,
    results: &mpsc::Sender<(usize, Translation)>,
) {
    loop {
        let job = {
            let rx = jobs.lock().unwrap_or_else(PoisonError::into_inner);
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };
        let translation = decode_line(decoder, job.id, &job.line);
        if results.send((job.id, translation)).is_err() {
            return;
        }
    }
}

/// Parses and decodes one line. A malformed line or a panic inside the
/// search yields a failed translation for that sentence only.
fn decode_line(decoder: &Decoder, id: usize, line: &str) -> Translation {
    let sentence = match decoder.sentence(id, line) {
        Ok(s) => s,
        Err(e) => {
            warn!(sentence_id = id, error = %e, "rejected sentence");
            return Translation::failed(id, line.trim().to_string(), e.to_string());
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(&sentence))) {
        Ok(t) => t,
        Err(_) => {
            warn!(sentence_id = id, "decoder panicked");
            let source = decoder.context().vocab.words(sentence.words());
            Translation::failed(id, source, "decoder panicked".to_string())
        }
    }
}

/// Translations in input order.
pub struct TranslationStream {
    results: mpsc::Receiver<(usize, Translation)>,
    pending: BTreeMap<usize, Translation>,
    next: usize,
    handles: Vec<JoinHandle<()>>,
}

impl Iterator for TranslationStream {
    type Item = Translation;

    fn next(&mut self) -> Option<Translation> {
        loop {
            if let Some(t) = self.pending.remove(&self.next) {
                self.next += 1;
                return Some(t);
            }
            match self.results.recv() {
                Ok((id, t)) => {
                    self.pending.insert(id, t);
                }
                Err(_) => {
                    // Every worker has exited; nothing else can arrive.
                    for handle in self.handles.drain(..) {
                        let _ = handle.join();
                    }
                    return None;
                }
            }
        }
    }
}
