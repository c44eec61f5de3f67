//! Trailing-edge debouncer: a burst of values commits only the last one,
//! once no new value arrived for the configured delay.

use std::time::Duration;
use tokio::sync::mpsc;

pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, mut commit: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();

        tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                loop {
                    tokio::select! {
                        next = rx.recv() => match next {
                            Some(value) => latest = value,
                            // Flush what we have when the sender side goes away
                            None => break,
                        },
                        _ = tokio::time::sleep(delay) => break,
                    }
                }
                commit(latest);
            }
        });

        Self { tx }
    }

    pub fn push(&self, value: T) {
        if self.tx.send(value).is_err() {
            warn!("Debouncer task has stopped, dropping value");
        }
    }
}
