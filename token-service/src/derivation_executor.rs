//! A dedicated single-thread executor for PBKDF2 key derivation.
//!
//! Request-handling threads must never run PBKDF2 directly (spec.md §5):
//! besides the latency, an attacker presenting bearer strings with
//! arbitrary unknown salts could otherwise force unbounded concurrent
//! derivation. Routing every derivation through one background thread
//! caps the work at one derivation in flight at a time regardless of how
//! many callers are decoding bearer strings concurrently.

use crypto::CryptoError;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send>;

pub struct DerivationExecutor {
    sender: mpsc::Sender<Job>,
}

impl DerivationExecutor {
    pub fn new() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("token-codec-derivation".into())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })?;
        Ok(Self { sender })
    }

    /// Run `f` on the derivation thread and await its result without
    /// blocking the calling task's own worker thread.
    pub async fn run<F, T>(&self, f: F) -> Result<T, CryptoError>
    where
        F: FnOnce() -> Result<T, CryptoError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = reply_tx.send(f());
        });
        self.sender
            .send(job)
            .map_err(|_| CryptoError::KeyDerivationFailed("derivation executor has shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| CryptoError::KeyDerivationFailed("derivation job was dropped".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn runs_work_and_returns_its_result() {
        let executor = DerivationExecutor::new().unwrap();
        let result = executor.run(|| Ok(2 + 2)).await.unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn propagates_the_job_error() {
        let executor = DerivationExecutor::new().unwrap();
        let result: Result<(), CryptoError> = executor.run(|| Err(CryptoError::InvalidKey)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serializes_concurrent_jobs_onto_one_thread() {
        let executor = std::sync::Arc::new(DerivationExecutor::new().unwrap());
        let mut handles = Vec::new();
        for i in 0..8 {
            let executor = executor.clone();
            handles.push(tokio::spawn(async move { executor.run(move || Ok(i)).await.unwrap() }));
        }
        let mut results: Vec<i32> = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }
}
