//! End-to-end orchestration: ready event → scheduler → feed mailbox →
//! feeder cycle → status publish.

use std::sync::Arc;

use aquafeed::Error;
use aquafeed::adapters::bus::SimBus;
use aquafeed::adapters::storage::MemStorage;
use aquafeed::adapters::system::SimSystem;
use aquafeed::adapters::time::FakeClock;
use aquafeed::app::commands::FeedRequest;
use aquafeed::app::dispatch::{Dispatcher, Method};
use aquafeed::app::ports::{Clock, StepperPort, TaskDelegate, WallTime};
use aquafeed::config::{FeederState, NetworkConfig, ScheduleTask};
use aquafeed::connectivity::ConnectivityManager;
use aquafeed::drivers::feeder::{FeedMailbox, FeederDriver};
use aquafeed::scheduler::Scheduler;
use aquafeed::store::DocumentStore;
use aquafeed::watchdog::{HealthWatchdog, RebootFlag};

// ── Test fixtures ─────────────────────────────────────────────

#[derive(Default)]
struct RecordingStepper {
    pulses: Vec<(bool, u16, u16)>,
    direction: bool,
}

impl StepperPort for RecordingStepper {
    fn set_enabled(&mut self, _on: bool) {}

    fn set_direction(&mut self, forward: bool) {
        self.direction = forward;
    }

    fn pulse(&mut self, count: u16, half_period: u16) -> Result<(), Error> {
        self.pulses.push((self.direction, count, half_period));
        Ok(())
    }
}

/// The firmware's task action: a due task becomes a feed request.
struct FeedTaskDelegate {
    feed_store: Arc<DocumentStore<FeederState>>,
    mailbox: Arc<FeedMailbox>,
}

impl TaskDelegate for FeedTaskDelegate {
    fn on_task_due(&mut self, _name: &str) {
        let params = self.feed_store.snapshot().feeder.clamped();
        self.mailbox.request(FeedRequest { params });
    }
}

struct Rig {
    dispatcher: Dispatcher<MemStorage>,
    feed_store: Arc<DocumentStore<FeederState>>,
    mailbox: Arc<FeedMailbox>,
    reboot: Arc<RebootFlag>,
    sys: Arc<SimSystem>,
    clock: Arc<FakeClock>,
}

fn rig() -> Rig {
    let mut storage = MemStorage::new();
    let net_store = Arc::new(DocumentStore::<NetworkConfig>::load(&mut storage));
    let feed_store = Arc::new(DocumentStore::<FeederState>::load(&mut storage));
    let mailbox = Arc::new(FeedMailbox::new());
    let reboot = Arc::new(RebootFlag::new());
    let sys = Arc::new(SimSystem::with_free_heap(200_000));
    let clock = Arc::new(FakeClock::unsynced());
    let conn = Arc::new(ConnectivityManager::new(net_store.snapshot()));

    let dispatcher = Dispatcher::new(
        storage,
        net_store,
        feed_store.clone(),
        mailbox.clone(),
        reboot.clone(),
        conn,
        sys.clone(),
        clock.clone(),
    );
    Rig {
        dispatcher,
        feed_store,
        mailbox,
        reboot,
        sys,
        clock,
    }
}

/// One scheduler poll the way the firmware's scheduler loop runs it:
/// copy the task list out, poll, write the mutated list back.
fn poll_once(rig: &Rig, sched: &mut Scheduler, now: WallTime) -> usize {
    let mut delegate = FeedTaskDelegate {
        feed_store: rig.feed_store.clone(),
        mailbox: rig.mailbox.clone(),
    };
    let mut tasks = rig.feed_store.snapshot().tasks.clone();
    let fired = sched.poll(now, &mut tasks, &mut delegate);
    rig.feed_store.update_volatile(|s| s.tasks = tasks);
    fired
}

// ── Scenarios ─────────────────────────────────────────────────

/// A scheduled task fires once, the mailbox carries the request to the
/// feeder, the drum runs the configured batches, and the status
/// publish reflects the consumed occurrence.
#[test]
fn scheduled_task_feeds_exactly_once_per_day() {
    let rig = rig();
    rig.feed_store.update_volatile(|s| {
        s.tasks.push(ScheduleTask {
            grace: 5,
            ..ScheduleTask::at("morning feed", 480)
        });
        s.feeder.step_count = 2;
    });

    let mut sched = Scheduler::new();

    // Before the window: nothing queued.
    assert_eq!(poll_once(&rig, &mut sched, WallTime { minutes: 479, weekday: 4 }), 0);
    assert!(rig.mailbox.try_take().is_none());

    // Window opens: exactly one request lands in the mailbox.
    assert_eq!(poll_once(&rig, &mut sched, WallTime { minutes: 481, weekday: 4 }), 1);
    let request = rig.mailbox.try_take().expect("feed request");

    // The feeder consumes it and runs 2 batches = 4 pulse trains.
    let mut feeder = FeederDriver::new(RecordingStepper::default());
    feeder.run_cycle(&request).unwrap();
    assert_eq!(feeder.feeds_completed(), 1);

    // Rest of the grace window: the task stays consumed.
    for minute in 482..=485 {
        assert_eq!(
            poll_once(&rig, &mut sched, WallTime { minutes: minute, weekday: 4 }),
            0
        );
    }
    assert!(rig.mailbox.try_take().is_none());

    // Midnight rollover resets and the next day fires again.
    assert_eq!(poll_once(&rig, &mut sched, WallTime { minutes: 0, weekday: 5 }), 0);
    assert_eq!(poll_once(&rig, &mut sched, WallTime { minutes: 480, weekday: 5 }), 1);
}

/// Status publishing follows a scheduler pass and reports readings
/// and task progress on the per-device topic.
#[test]
fn status_publish_reports_state_on_device_topic() {
    let rig = rig();
    rig.feed_store.update_volatile(|s| {
        s.tasks.push(ScheduleTask {
            done: true,
            ..ScheduleTask::at("noon", 720)
        });
        s.readings.temperatures.insert("28-aa01".into(), 25.5);
        s.readings.water_ok = false;
        s.readings.pressure_kpa = 42.0;
    });
    rig.clock.set_wall_time(721, 2);
    rig.clock.set_uptime(3 * 3600);

    let mut bus = SimBus::connected();
    rig.dispatcher.publish_status(&mut bus);

    let (topic, payload) = bus.last_publish().expect("published").clone();
    assert_eq!(topic, "aquafeed-0/out/status");
    let v: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(v["tasks_total"], 1);
    assert_eq!(v["tasks_done"], 1);
    assert_eq!(v["readings"]["water_ok"], false);
    assert_eq!(v["readings"]["temperatures"]["28-aa01"], 25.5);
    assert_eq!(v["device"]["uptime"], "03:00:00");
    assert_eq!(v["device"]["devicename"], "aquafeed-0");
}

/// A disconnected bus swallows the publish without failing the pass.
#[test]
fn status_publish_skipped_while_bus_down() {
    let rig = rig();
    let mut bus = SimBus::default();
    rig.dispatcher.publish_status(&mut bus);
    assert!(bus.published.is_empty());
}

/// The HTTP feed command and a bus feed command share one trigger
/// path: both land in the same mailbox, last writer wins.
#[test]
fn http_and_bus_triggers_share_the_mailbox() {
    let rig = rig();

    let r = rig.dispatcher.route(Method::Post, "/ui/feed", None, None);
    assert_eq!(r.status, 200);
    rig.dispatcher
        .handle_bus_message("aquafeed-0/in/json", r#"{"feed": true, "step_count": 9}"#);

    // Single slot: the bus trigger overwrote the HTTP one.
    let request = rig.mailbox.try_take().expect("feed request");
    assert_eq!(request.params.step_count, 9);
    assert!(rig.mailbox.try_take().is_none());
}

/// Remote reboot flows end to end: HTTP command sets the flag, the
/// response can flush during the grace ticks, the third tick restarts.
#[test]
fn remote_reboot_restarts_after_grace() {
    let rig = rig();
    let r = rig
        .dispatcher
        .route(Method::Post, "/service/reboot", Some("reboot=1"), None);
    assert_eq!(r.status, 200);

    let mut wdt = HealthWatchdog::new(0);
    assert!(!wdt.tick(&rig.reboot, &*rig.sys));
    assert!(!wdt.tick(&rig.reboot, &*rig.sys));
    assert!(wdt.tick(&rig.reboot, &*rig.sys));
    assert!(rig.sys.restarted());
}

/// Heap exhaustion restarts even with a reboot already pending.
#[test]
fn heap_floor_overrides_everything() {
    let rig = rig();
    let mut wdt = HealthWatchdog::new(32_768);

    assert!(!wdt.tick(&rig.reboot, &*rig.sys));
    rig.sys.set_free_heap(10_000);
    assert!(wdt.tick(&rig.reboot, &*rig.sys));
    assert!(rig.sys.restarted());
}

/// Scheduler polls are inert until the clock syncs, then fire within
/// the grace window on the first synced poll.
#[test]
fn scheduler_waits_for_time_sync() {
    let rig = rig();
    rig.feed_store.update_volatile(|s| {
        s.tasks.push(ScheduleTask {
            grace: 5,
            ..ScheduleTask::at("after-sync", 600)
        });
    });
    let mut sched = Scheduler::new();

    // The firmware's loop skips polls entirely while unsynced; here
    // that simply means no poll happens. After sync lands inside the
    // grace window, the task still fires.
    assert!(rig.clock.wall_time().is_none());
    rig.clock.set_wall_time(603, 1);
    let now = rig.clock.wall_time().unwrap();
    assert_eq!(poll_once(&rig, &mut sched, now), 1);
    assert!(rig.mailbox.try_take().is_some());
}
