// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellable timers for the session task.
//!
//! Both timers hold at most one schedule: arming a [`Timer`] replaces its
//! pending deadline and starting a [`Ticker`] replaces its running loop. An
//! idle timer's future never resolves, so either can sit in a
//! `tokio::select!` branch unconditionally.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};

/// One-shot timer with at most one pending deadline.
#[derive(Debug, Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire after `delay`, replacing any pending deadline.
    pub fn arm(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Drop the pending deadline. Returns whether one existed.
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolve once the deadline passes; disarms the timer.
    ///
    /// Cancel-safe: dropping the future leaves the deadline armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}

/// Repeating timer; one loop at a time.
#[derive(Debug, Default)]
pub struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`, first tick one period from now.
    ///
    /// A running loop is cancelled and replaced.
    pub fn start(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Returns whether a loop was running.
    pub fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolve on the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let mut timer = Timer::new();
        let start = Instant::now();
        timer.arm(Duration::from_millis(1000));
        assert!(timer.is_armed());

        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let mut timer = Timer::new();
        let start = Instant::now();
        timer.arm(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(600)).await;
        timer.arm(Duration::from_millis(1000));

        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(10));
        assert!(timer.cancel());
        assert!(!timer.cancel());

        let fired = tokio::time::timeout(Duration::from_secs(5), timer.fired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_restart_keeps_single_loop() {
        let mut ticker = Ticker::new();
        let start = Instant::now();
        ticker.start(Duration::from_millis(2000));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        ticker.start(Duration::from_millis(2000));

        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(5500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_ticker_is_idle() {
        let mut ticker = Ticker::new();
        ticker.start(Duration::from_millis(100));
        assert!(ticker.stop());
        assert!(!ticker.is_running());

        let ticked = tokio::time::timeout(Duration::from_secs(1), ticker.tick()).await;
        assert!(ticked.is_err());
    }
}
