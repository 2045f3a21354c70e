// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
    time::Duration,
};

struct Shared {
    stopped: Mutex<bool>,
    cond: Condvar,
}

/// A named worker thread that runs an action every `period`.
///
/// The first run happens after one full period, so freshly constructed
/// components can be driven manually before the worker wakes up. Dropping
/// the action signals the thread and joins it.
pub struct PeriodicAction {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicAction {
    pub fn spawn<F: FnMut() + Send + 'static>(
        name: &str,
        period: Duration,
        mut action: F,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            cond: Condvar::new(),
        });

        let handle = std::thread::Builder::new().name(name.into()).spawn({
            let shared = shared.clone();

            #[allow(clippy::expect_used)]
            move || loop {
                let guard = shared.stopped.lock().expect("lock is poisoned");

                let (guard, _) = shared
                    .cond
                    .wait_timeout_while(guard, period, |stopped| !*stopped)
                    .expect("lock is poisoned");

                if *guard {
                    log::trace!("periodic action stopping");
                    return;
                }

                drop(guard);
                action();
            }
        })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }
}

impl Drop for PeriodicAction {
    #[allow(clippy::expect_used)]
    fn drop(&mut self) {
        *self.shared.stopped.lock().expect("lock is poisoned") = true;
        self.shared.cond.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("periodic action panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_periodically_and_stops_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));

        let action = {
            let counter = counter.clone();
            PeriodicAction::spawn("test-action", Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawns")
        };

        while counter.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(5));
        }

        drop(action);
        let after = counter.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(after, counter.load(Ordering::SeqCst));
    }
}
