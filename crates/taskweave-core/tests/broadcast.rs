//! Live notification delivery: isolation of failing subscribers, heartbeats,
//! and publish-after-commit through the repositories.

use std::io::{self, Write};
use std::time::Duration;

use crossbeam::channel::Receiver;

use taskweave_core::Tracker;
use taskweave_core::hub::{
    BroadcastHub, FrameSink, HubMessage, Notification, NotificationKind, SinkError, WriterSink,
};
use taskweave_core::model::{NewComment, NewProject, NewTask, Patch, TaskPatch};

const WAIT: Duration = Duration::from_secs(5);

/// Sink that accepts the connected frame, then fails every write.
struct FlakySink {
    writes: usize,
}

impl FrameSink for FlakySink {
    fn send(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
        self.writes += 1;
        if self.writes > 1 {
            Err(SinkError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
        } else {
            Ok(())
        }
    }
}

/// Stream whose writes hang until the gate sender is dropped.
struct StalledStream {
    gate: Receiver<()>,
    written: usize,
}

impl Write for StalledStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.gate.recv();
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn notifications(messages: Vec<HubMessage>) -> Vec<Notification> {
    messages
        .into_iter()
        .filter(|m| !m.is_heartbeat())
        .filter_map(|m| m.as_notification().cloned())
        .collect()
}

#[test]
fn failing_subscriber_does_not_affect_the_others() {
    let hub = BroadcastHub::new();
    let a = hub.connect("p1", 16).expect("a");
    let b = hub.connect("p1", 16).expect("b");
    hub.subscribe("flaky", "p1", Box::new(FlakySink { writes: 0 }))
        .expect("flaky");
    assert_eq!(hub.subscriber_count("p1").expect("count"), 3);

    let note = Notification::for_event(
        taskweave_core::event::EventType::TaskCreated,
        "p1",
        "t1",
        "2025-01-01T00:00:00.000Z",
    );
    assert_eq!(hub.publish("p1", &note).expect("publish"), 2);
    assert_eq!(hub.subscriber_count("p1").expect("count"), 2);

    for sub in [&a, &b] {
        let received = notifications(sub.drain_messages());
        assert_eq!(received, vec![note.clone()]);
    }
}

#[test]
fn stalled_stream_subscriber_does_not_hold_up_the_others() {
    let hub = BroadcastHub::new();
    let (release, gate) = crossbeam::channel::unbounded::<()>();
    let (sink, writer) = WriterSink::spawn(StalledStream { gate, written: 0 }, 2).expect("spawn");
    hub.subscribe("stalled", "p1", Box::new(sink)).expect("stalled");
    let fast = hub.connect("p1", 64).expect("fast");

    let notes: Vec<Notification> = (0..10)
        .map(|i| {
            Notification::for_event(
                taskweave_core::event::EventType::TaskUpdated,
                "p1",
                format!("t{i}"),
                "2025-01-01T00:00:00.000Z",
            )
        })
        .collect();
    for note in &notes {
        hub.publish("p1", note).expect("publish");
    }

    assert_eq!(notifications(fast.drain_messages()), notes);
    assert_eq!(hub.subscriber_count("p1").expect("count"), 1);

    drop(release);
    assert!(writer.join().expect("join").written > 0);
}

#[test]
fn heartbeat_thread_reaches_every_project() {
    let hub = BroadcastHub::new();
    let p1 = hub.connect("p1", 16).expect("p1");
    let p2 = hub.connect("p2", 16).expect("p2");
    let heartbeat = hub.start_heartbeat(Duration::from_millis(20)).expect("start");

    for sub in [&p1, &p2] {
        let connected = sub.recv_frame(WAIT).expect("connected");
        assert!(matches!(
            taskweave_core::hub::decode_frame(&connected).expect("decode"),
            HubMessage::Connected(_)
        ));
        let beat = sub.recv_frame(WAIT).expect("heartbeat");
        let message = taskweave_core::hub::decode_frame(&beat).expect("decode");
        assert!(message.is_heartbeat());
    }

    heartbeat.stop();
    assert!(hub.stale_subscribers(Duration::from_secs(60)).expect("stale").is_empty());
}

#[test]
fn repository_mutations_notify_project_subscribers_after_commit() {
    let tracker = Tracker::open_in_memory().expect("tracker");
    let project = tracker
        .projects()
        .create(NewProject::named("Roadmap"))
        .expect("project");
    let other = tracker
        .projects()
        .create(NewProject::named("Other"))
        .expect("other");

    let sub = tracker.subscribe(&project.id).expect("subscribe");
    let bystander = tracker.subscribe(&other.id).expect("bystander");

    let task = tracker
        .tasks()
        .create(NewTask::new(&project.id, "Design"))
        .expect("task");
    tracker
        .tasks()
        .update(
            &task.id,
            TaskPatch {
                title: Patch::Set("Design v2".into()),
                ..TaskPatch::default()
            },
        )
        .expect("update");

    let received = notifications(sub.drain_messages());
    let kinds: Vec<NotificationKind> = received.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::TaskCreated, NotificationKind::TaskUpdated]);
    assert!(received.iter().all(|n| n.project_id == project.id && n.entity_id == task.id));
    assert_eq!(received[1].version, Some(2));
    assert_eq!(
        received[1].delta.as_ref().map(|d| d["title"].clone()),
        Some(serde_json::json!("Design v2"))
    );

    assert!(notifications(bystander.drain_messages()).is_empty());
}

#[test]
fn deletion_notifications_carry_no_delta() {
    let tracker = Tracker::open_in_memory().expect("tracker");
    let project = tracker.projects().create(NewProject::named("p")).expect("project");
    let task = tracker
        .tasks()
        .create(NewTask::new(&project.id, "t"))
        .expect("task");
    let comment = tracker
        .comments()
        .create(NewComment::new(&task.id, "hi", "ana"))
        .expect("comment");
    let sub = tracker.subscribe(&project.id).expect("subscribe");

    assert!(tracker.comments().delete(&comment.id).expect("delete comment"));
    assert!(tracker.tasks().delete(&task.id).expect("delete task"));

    let received = notifications(sub.drain_messages());
    let kinds: Vec<NotificationKind> = received.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::CommentDeleted, NotificationKind::TaskDeleted]);
    assert!(received.iter().all(|n| n.delta.is_none()));
    assert_eq!(received[1].entity_id, task.id);
}

#[test]
fn rejected_mutation_publishes_nothing() {
    let tracker = Tracker::open_in_memory().expect("tracker");
    let project = tracker.projects().create(NewProject::named("p")).expect("project");
    let task = tracker
        .tasks()
        .create(NewTask::new(&project.id, "t"))
        .expect("task");
    let sub = tracker.subscribe(&project.id).expect("subscribe");

    let err = tracker
        .tasks()
        .update(
            &task.id,
            TaskPatch {
                dependencies: Patch::Set(vec![task.id.clone()]),
                ..TaskPatch::default()
            },
        )
        .expect_err("self dependency");
    assert!(err.is_cycle());
    assert!(notifications(sub.drain_messages()).is_empty());
}

#[test]
fn dropping_a_subscription_unsubscribes_it() {
    let tracker = Tracker::open_in_memory().expect("tracker");
    let sub = tracker.subscribe("p1").expect("subscribe");
    assert_eq!(tracker.hub().subscriber_count("p1").expect("count"), 1);
    drop(sub);
    assert_eq!(tracker.hub().total_subscribers().expect("count"), 0);
}
