//! Real-time broadcast hub.
//!
//! Keeps a registry `client id → (project id, sink, last ping)` and fans
//! committed change notifications out to every subscriber of the affected project.
//! A sink that fails a write is removed; the failure never reaches the
//! publisher or the other subscribers. A background heartbeat keeps idle
//! transports open.

pub mod frame;
pub mod sink;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

pub use frame::{
    Connected, FrameError, HubMessage, Notification, NotificationKind, decode_frame, encode_frame,
};
pub use sink::{ChannelSink, FrameSink, SinkError, WriterSink, WriterThread};

use crate::model::new_id;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast hub lock poisoned")]
    LockPoisoned,
    #[error("broadcast hub is shut down")]
    Closed,
    #[error("client '{client_id}' is already subscribed")]
    DuplicateClient { client_id: String },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("subscriber rejected the connected frame: {0}")]
    Sink(#[from] SinkError),
    #[error("failed to spawn heartbeat thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct Subscriber {
    project_id: String,
    sink: Box<dyn FrameSink>,
    last_ping: Instant,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<String, Subscriber>,
    closed: bool,
}

impl HubState {
    /// Write `frame` to every matching subscriber, removing those whose sink
    /// fails. `ping` refreshes `last_ping` on success.
    fn deliver(
        &mut self,
        frame: &[u8],
        matches: impl Fn(&Subscriber) -> bool,
        ping: Option<Instant>,
    ) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();
        for (client_id, subscriber) in &mut self.subscribers {
            if !matches(subscriber) {
                continue;
            }
            match subscriber.sink.send(frame) {
                Ok(()) => {
                    if let Some(now) = ping {
                        subscriber.last_ping = now;
                    }
                    delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        %client_id,
                        project_id = %subscriber.project_id,
                        error = %err,
                        "dropping subscriber"
                    );
                    failed.push(client_id.clone());
                }
            }
        }
        for client_id in failed {
            self.subscribers.remove(&client_id);
        }
        delivered
    }
}

/// Process-wide subscriber registry. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubState>>,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field(
                "total_subscribers",
                &self.inner.try_lock().ok().map(|state| state.subscribers.len()),
            )
            .finish()
    }
}

impl BroadcastHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for `project_id` and send it a `CONNECTED` frame.
    ///
    /// The connected frame goes to this sink only. If it cannot be written
    /// the subscriber is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Closed`] after shutdown,
    /// [`BroadcastError::DuplicateClient`] if the client id is already
    /// registered, or the sink's write error.
    pub fn subscribe(
        &self,
        client_id: impl Into<String>,
        project_id: impl Into<String>,
        mut sink: Box<dyn FrameSink>,
    ) -> Result<(), BroadcastError> {
        let client_id = client_id.into();
        let project_id = project_id.into();
        let mut state = self.lock_state()?;
        if state.closed {
            return Err(BroadcastError::Closed);
        }
        if state.subscribers.contains_key(&client_id) {
            return Err(BroadcastError::DuplicateClient { client_id });
        }

        let frame = encode_frame(&Connected::new(project_id.as_str(), client_id.as_str()))?;
        sink.send(&frame)?;

        tracing::debug!(%client_id, %project_id, "subscriber registered");
        state.subscribers.insert(
            client_id,
            Subscriber {
                project_id,
                sink,
                last_ping: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::LockPoisoned`] if the registry lock is
    /// poisoned.
    pub fn unsubscribe(&self, client_id: &str) -> Result<bool, BroadcastError> {
        let removed = self.lock_state()?.subscribers.remove(client_id);
        if let Some(subscriber) = &removed {
            tracing::debug!(%client_id, project_id = %subscriber.project_id, "subscriber removed");
        }
        Ok(removed.is_some())
    }

    /// Send `notification` to every subscriber of `project_id`.
    ///
    /// Subscribers whose sink fails are removed. Returns the number of
    /// successful deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error only if the frame cannot be encoded or the registry
    /// lock is poisoned; individual sink failures are not errors.
    pub fn publish(
        &self,
        project_id: &str,
        notification: &Notification,
    ) -> Result<usize, BroadcastError> {
        let frame = encode_frame(notification)?;
        let mut state = self.lock_state()?;
        Ok(state.deliver(&frame, |sub| sub.project_id == project_id, None))
    }

    /// Send one heartbeat frame to every subscriber of every project.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or the registry lock
    /// is poisoned.
    pub fn send_heartbeat(&self) -> Result<usize, BroadcastError> {
        let frame = encode_frame(&Notification::heartbeat())?;
        let mut state = self.lock_state()?;
        Ok(state.deliver(&frame, |_| true, Some(Instant::now())))
    }

    /// Subscribers whose last successful ping is older than `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::LockPoisoned`] if the registry lock is
    /// poisoned.
    pub fn stale_subscribers(&self, max_age: Duration) -> Result<Vec<String>, BroadcastError> {
        let state = self.lock_state()?;
        let mut stale: Vec<String> = state
            .subscribers
            .iter()
            .filter(|(_, sub)| sub.last_ping.elapsed() > max_age)
            .map(|(client_id, _)| client_id.clone())
            .collect();
        stale.sort();
        Ok(stale)
    }

    /// # Errors
    ///
    /// Returns [`BroadcastError::LockPoisoned`] if the registry lock is
    /// poisoned.
    pub fn subscriber_count(&self, project_id: &str) -> Result<usize, BroadcastError> {
        Ok(self
            .lock_state()?
            .subscribers
            .values()
            .filter(|sub| sub.project_id == project_id)
            .count())
    }

    /// # Errors
    ///
    /// Returns [`BroadcastError::LockPoisoned`] if the registry lock is
    /// poisoned.
    pub fn total_subscribers(&self) -> Result<usize, BroadcastError> {
        Ok(self.lock_state()?.subscribers.len())
    }

    /// Register a channel-backed subscriber with a generated client id.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes it.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::subscribe`].
    pub fn connect(
        &self,
        project_id: impl Into<String>,
        capacity: usize,
    ) -> Result<Subscription, BroadcastError> {
        let project_id = project_id.into();
        let client_id = new_id();
        let (sender, receiver) = crossbeam::channel::bounded(capacity.max(1));
        self.subscribe(
            client_id.clone(),
            project_id.clone(),
            Box::new(ChannelSink::new(sender)),
        )?;

        Ok(Subscription {
            client_id,
            project_id,
            receiver,
            hub: self.clone(),
        })
    }

    /// Start a background thread that calls [`Self::send_heartbeat`] every
    /// `interval`. Dropping the handle stops the thread.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Spawn`] if the thread cannot be started.
    pub fn start_heartbeat(&self, interval: Duration) -> Result<HeartbeatHandle, BroadcastError> {
        let (stop_tx, stop_rx) = crossbeam::channel::bounded::<()>(0);
        let hub = self.clone();
        let thread = std::thread::Builder::new()
            .name("taskweave-heartbeat".into())
            .spawn(move || heartbeat_loop(&hub, interval, &stop_rx))
            .map_err(BroadcastError::Spawn)?;

        tracing::debug!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "heartbeat started"
        );
        Ok(HeartbeatHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Drop every subscriber and refuse new ones. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::LockPoisoned`] if the registry lock is
    /// poisoned.
    pub fn shutdown(&self) -> Result<(), BroadcastError> {
        let mut state = self.lock_state()?;
        let dropped = state.subscribers.len();
        state.subscribers.clear();
        state.closed = true;
        tracing::info!(dropped, "broadcast hub shut down");
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, HubState>, BroadcastError> {
        self.inner.lock().map_err(|_| BroadcastError::LockPoisoned)
    }
}

fn heartbeat_loop(hub: &BroadcastHub, interval: Duration, stop: &Receiver<()>) {
    let ticker = crossbeam::channel::tick(interval);
    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                if let Err(err) = hub.send_heartbeat() {
                    tracing::error!(error = %err, "heartbeat failed; stopping");
                    return;
                }
            }
            recv(stop) -> _ => return,
        }
    }
}

/// Owner of the heartbeat thread.
#[derive(Debug)]
pub struct HeartbeatHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Stop the heartbeat and wait for the thread to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        // Dropping the sender disconnects the stop channel.
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("heartbeat thread panicked");
            }
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

/// A channel-backed subscriber created by [`BroadcastHub::connect`].
pub struct Subscription {
    client_id: String,
    project_id: String,
    receiver: Receiver<Vec<u8>>,
    hub: BroadcastHub,
}

impl Subscription {
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Next raw frame, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RecvTimeoutError`] on timeout or after the hub dropped this
    /// subscriber.
    pub fn recv_frame(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain and decode every queued frame. Undecodable frames are skipped.
    #[must_use]
    pub fn drain_messages(&self) -> Vec<HubMessage> {
        self.receiver
            .try_iter()
            .filter_map(|frame| match decode_frame(&frame) {
                Ok(message) => Some(message),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping undecodable frame");
                    None
                }
            })
            .collect()
    }

    /// `true` once the hub has dropped this subscriber's sink and every
    /// queued frame has been read.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.receiver.is_empty()
            && matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(err) = self.hub.unsubscribe(&self.client_id) {
            tracing::warn!(error = %err, client_id = %self.client_id, "unsubscribe on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    struct FailingSink {
        fail_after: usize,
        sent: usize,
    }

    impl FrameSink for FailingSink {
        fn send(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
            if self.sent >= self.fail_after {
                return Err(SinkError::Disconnected);
            }
            self.sent += 1;
            Ok(())
        }
    }

    fn note(project_id: &str) -> Notification {
        Notification::for_event(EventType::TaskCreated, project_id, "t1", "2024-01-01T00:00:00.000Z")
    }

    #[test]
    fn connected_frame_is_sent_first() {
        let hub = BroadcastHub::new();
        let sub = hub.connect("p1", 8).expect("connect");
        let messages = sub.drain_messages();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            HubMessage::Connected(connected) => {
                assert_eq!(connected.project_id, "p1");
                assert_eq!(connected.client_id, sub.client_id());
            }
            HubMessage::Notification(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn publish_reaches_only_the_target_project() {
        let hub = BroadcastHub::new();
        let a = hub.connect("p1", 8).expect("connect");
        let b = hub.connect("p2", 8).expect("connect");
        let _ = a.drain_messages();
        let _ = b.drain_messages();

        assert_eq!(hub.publish("p1", &note("p1")).expect("publish"), 1);
        assert_eq!(a.drain_messages().len(), 1);
        assert!(b.drain_messages().is_empty());
        assert_eq!(hub.publish("nobody", &note("nobody")).expect("publish"), 0);
    }

    #[test]
    fn failing_sink_is_removed_without_affecting_others() {
        let hub = BroadcastHub::new();
        let good = hub.connect("p1", 8).expect("connect");
        hub.subscribe(
            "bad",
            "p1",
            Box::new(FailingSink {
                fail_after: 1,
                sent: 0,
            }),
        )
        .expect("subscribe");
        assert_eq!(hub.subscriber_count("p1").expect("count"), 2);

        assert_eq!(hub.publish("p1", &note("p1")).expect("publish"), 1);
        assert_eq!(hub.subscriber_count("p1").expect("count"), 1);
        let notes: Vec<_> = good
            .drain_messages()
            .into_iter()
            .filter_map(|m| m.as_notification().cloned())
            .collect();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn sink_failing_connected_frame_is_not_registered() {
        let hub = BroadcastHub::new();
        let err = hub
            .subscribe(
                "dead",
                "p1",
                Box::new(FailingSink {
                    fail_after: 0,
                    sent: 0,
                }),
            )
            .expect_err("connected frame fails");
        assert!(matches!(err, BroadcastError::Sink(_)));
        assert_eq!(hub.total_subscribers().expect("count"), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = BroadcastHub::new();
        let sub = hub.connect("p1", 8).expect("connect");
        let client_id = sub.client_id().to_string();
        assert!(hub.unsubscribe(&client_id).expect("first"));
        assert!(!hub.unsubscribe(&client_id).expect("second"));
        drop(sub);
        assert_eq!(hub.total_subscribers().expect("count"), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = BroadcastHub::new();
        {
            let _sub = hub.connect("p1", 8).expect("connect");
            assert_eq!(hub.subscriber_count("p1").expect("count"), 1);
        }
        assert_eq!(hub.subscriber_count("p1").expect("count"), 0);
    }

    #[test]
    fn duplicate_client_is_rejected() {
        let hub = BroadcastHub::new();
        let (tx, _rx) = crossbeam::channel::bounded(4);
        hub.subscribe("c1", "p1", Box::new(ChannelSink::new(tx.clone())))
            .expect("first");
        let err = hub
            .subscribe("c1", "p1", Box::new(ChannelSink::new(tx)))
            .expect_err("duplicate");
        assert!(matches!(err, BroadcastError::DuplicateClient { .. }));
    }

    #[test]
    fn heartbeat_reaches_every_project() {
        let hub = BroadcastHub::new();
        let a = hub.connect("p1", 8).expect("connect");
        let b = hub.connect("p2", 8).expect("connect");
        let _ = a.drain_messages();
        let _ = b.drain_messages();

        assert_eq!(hub.send_heartbeat().expect("heartbeat"), 2);
        assert!(a.drain_messages().iter().all(HubMessage::is_heartbeat));
        assert!(b.drain_messages().iter().all(HubMessage::is_heartbeat));
        assert!(hub.stale_subscribers(Duration::from_secs(60)).expect("stale").is_empty());
    }

    #[test]
    fn shutdown_closes_channels_and_rejects_new_subscribers() {
        let hub = BroadcastHub::new();
        let sub = hub.connect("p1", 8).expect("connect");
        let _ = sub.drain_messages();

        hub.shutdown().expect("shutdown");
        assert!(sub.is_disconnected());
        assert!(matches!(hub.connect("p1", 8), Err(BroadcastError::Closed)));
        hub.shutdown().expect("idempotent");
    }

    #[test]
    fn full_buffer_drops_slow_subscriber() {
        let hub = BroadcastHub::new();
        // Capacity 1 is consumed by the connected frame.
        let slow = hub.connect("p1", 1).expect("connect");
        assert_eq!(hub.publish("p1", &note("p1")).expect("publish"), 0);
        assert_eq!(hub.subscriber_count("p1").expect("count"), 0);
        drop(slow);
    }
}
