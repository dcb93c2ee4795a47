//! Deadline scheduler for RPC call timeouts.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use silbus_core::time::TimeProvider;
use silbus_rpc::RpcClient;

struct SchedulerState {
    clients: Vec<Weak<RpcClient>>,
    stopping: bool,
}

/// Background thread that expires pending RPC calls when their deadline
/// passes.
///
/// Clients report new deadlines through their timeout wakeup; the thread
/// sleeps until the earliest deadline across all registered clients.
pub struct TimeoutScheduler {
    time: Arc<dyn TimeProvider>,
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutScheduler {
    /// Create the scheduler and start its worker thread.
    pub fn new(time: Arc<dyn TimeProvider>) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            time,
            state: Mutex::new(SchedulerState {
                clients: Vec::new(),
                stopping: false,
            }),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
        });
        let worker_handle = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::Builder::new()
                .name("silbus-rpc-timeouts".to_string())
                .spawn(move || scheduler.run())
        };
        if let Ok(handle) = worker_handle {
            *scheduler.worker.lock() = Some(handle);
        }
        scheduler
    }

    /// Track a client's deadlines.
    pub fn register_client(&self, client: &Arc<RpcClient>) {
        self.state.lock().clients.push(Arc::downgrade(client));
        self.wakeup.notify_one();
    }

    /// Wake the worker because a new deadline exists.
    pub fn notify_deadline(&self, _deadline: Duration) {
        self.wakeup.notify_one();
    }

    /// Stop the worker thread.
    pub fn stop(&self) {
        self.state.lock().stopping = true;
        self.wakeup.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.stopping {
                return;
            }

            // Drop dead clients, find the earliest deadline.
            state.clients.retain(|client| client.upgrade().is_some());
            let clients: Vec<Arc<RpcClient>> =
                state.clients.iter().filter_map(Weak::upgrade).collect();
            let next_deadline = clients
                .iter()
                .filter_map(|client| client.next_deadline())
                .min();

            match next_deadline {
                None => {
                    self.wakeup.wait(&mut state);
                }
                Some(deadline) => {
                    let now = self.time.now();
                    if deadline <= now {
                        drop(state);
                        for client in &clients {
                            client.process_timeouts(now);
                        }
                        state = self.state.lock();
                    } else {
                        let _ = self.wakeup.wait_for(&mut state, deadline - now);
                    }
                }
            }
        }
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        // The worker holds no Arc to the scheduler once stop() has joined it.
        self.stop();
    }
}
