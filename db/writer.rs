// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Single-writer serialization for the metadata store.
//!
//! SQLite allows only one writer at a time; rather than contend a mutex on
//! every async task, we hand the one read-write connection to a dedicated
//! OS thread and post closures to it. This is the "async I/O vs. blocking
//! children" bridge pattern applied to disk writes instead of child
//! processes: the calling task awaits a oneshot without blocking the
//! runtime's worker threads.

use std::sync::mpsc;

type Job = Box<dyn FnOnce(&mut rusqlite::Connection) + Send>;

pub struct Writer {
    tx: mpsc::Sender<Job>,
    _handle: std::thread::JoinHandle<()>,
}

impl Writer {
    pub fn spawn(mut conn: rusqlite::Connection) -> Writer {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("db-writer".to_owned())
            .spawn(move || {
                for job in rx {
                    job(&mut conn);
                }
                tracing::debug!("db writer thread exiting");
            })
            .expect("spawning db writer thread");
        Writer {
            tx,
            _handle: handle,
        }
    }

    /// Runs `f` on the writer thread and returns its result, without
    /// blocking the calling task's runtime worker thread.
    pub async fn call<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> T + Send + 'static,
    {
        let (res_tx, res_rx) = tokio::sync::oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = res_tx.send(f(conn));
        });
        self.tx
            .send(job)
            .expect("db writer thread should outlive all Writer handles");
        res_rx
            .await
            .expect("db writer thread should not drop a pending job")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_round_trips_result() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let w = Writer::spawn(conn);
        let n: i64 = w
            .call(|conn| conn.query_row("select 1 + 1", [], |r| r.get(0)).unwrap())
            .await;
        assert_eq!(n, 2);
    }
}
