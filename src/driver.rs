//! Periodic simulation driver
//!
//! Runs `Simulator::step` on a fixed tokio interval until stopped. The timer
//! is the only cancellable resource in the simulator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::simulator::Simulator;

pub struct DriverHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
}

impl DriverHandle {
    /// Steps run so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the timer and wait for the loop to exit. Returns the total steps run.
    pub async fn stop(mut self) -> u64 {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
        let ticks = self.ticks();
        info!("[driver] Stopped after {} steps", ticks);
        ticks
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start stepping `simulator` at its configured rate. Must be called inside a tokio runtime.
pub fn spawn(simulator: Arc<Simulator>) -> DriverHandle {
    let period = Duration::from_secs_f64(simulator.config().dt());
    let ticks = Arc::new(AtomicU64::new(0));
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let counter = Arc::clone(&ticks);
    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[driver] Running at {:.1} Hz", 1.0 / period.as_secs_f64());

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {
                    simulator.step();
                    let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % 100 == 0 {
                        debug!("[driver] {} steps", n);
                    }
                }
            }
        }
    });

    DriverHandle {
        stop_tx: Some(stop_tx),
        task,
        ticks,
    }
}
