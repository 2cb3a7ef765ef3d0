//! Self-wakeup scheduling (§4.4, §5, §9 "Alarms").
//!
//! Expressed as a generation counter guarding a `tokio::time::sleep`:
//! scheduling a new wake bumps the generation so any sleep already in
//! flight finds it stale when it fires and sends nothing. This gives the
//! "only one wake outstanding per batch" invariant without a cancellation
//! handle that the caller would have to remember to hold onto.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::command::Command;

#[derive(Clone)]
pub struct AlarmScheduler {
    tx: mpsc::Sender<Command>,
    generation: Arc<AtomicU64>,
}

impl AlarmScheduler {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arm a wake after `delay`, invalidating any wake armed before this call.
    pub fn schedule(&self, delay: Duration) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if generation.load(Ordering::SeqCst) == my_generation {
                let _ = tx.send(Command::AlarmFired).await;
            }
        });
    }

    /// Invalidate any armed wake without arming a new one.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn rescheduling_suppresses_the_earlier_wake() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(Duration::from_millis(50));
        scheduler.schedule(Duration::from_millis(5));

        let received = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(received, Ok(Some(Command::AlarmFired))));

        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "the superseded wake must not fire");
    }

    #[tokio::test]
    async fn cancel_suppresses_the_pending_wake() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(Duration::from_millis(10));
        scheduler.cancel();

        let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn immediate_wake_fires_without_delay() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(Duration::ZERO);

        let received = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(received, Ok(Some(Command::AlarmFired))));
    }
}
