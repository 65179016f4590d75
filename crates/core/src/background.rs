//! Background persistence queue.
//!
//! One worker thread runs submitted jobs strictly in submission order.
//! Delayed jobs hold the queue until their deadline, so ordering is
//! preserved across them. Fire-and-forget from the caller's side;
//! [`BackgroundQueue::flush`] blocks until everything submitted so far has
//! run.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    RunAt(Instant, Job),
    Flush(Sender<()>),
}

pub struct BackgroundQueue {
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundQueue {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Could not spawn background worker: {}", e);
                None
            }
        };
        BackgroundQueue { tx: Some(tx), worker }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.send(Message::Run(Box::new(job)));
    }

    /// Run `job` no earlier than `delay` from now.
    pub fn submit_after(&self, delay: Duration, job: impl FnOnce() + Send + 'static) {
        if delay.is_zero() {
            self.submit(job);
        } else {
            self.send(Message::RunAt(Instant::now() + delay, Box::new(job)));
        }
    }

    /// Block until every job submitted before this call has finished.
    pub fn flush(&self) {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.send(Message::Flush(done_tx));
        let _ = done_rx.recv();
    }

    fn send(&self, msg: Message) {
        let delivered = match (&self.tx, &self.worker) {
            (Some(tx), Some(_)) => tx.send(msg).is_ok(),
            _ => false,
        };
        if !delivered {
            log::warn!("Background worker unavailable; job dropped");
        }
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(rx: Receiver<Message>) {
    for msg in rx {
        match msg {
            Message::Run(job) => run_job(job),
            Message::RunAt(deadline, job) => {
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                run_job(job);
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::error!("Background job panicked");
    }
}
