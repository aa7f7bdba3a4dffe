//! Day/time task scheduler.
//!
//! Polls the task list of the feeder-state document once per minute
//! and fires each enabled task exactly once per occurrence. The
//! scheduler notifies a [`TaskDelegate`] when a task comes due; the
//! main loop implements the delegate to push a feed request into the
//! mailbox.
//!
//! ```text
//!  Clock ──▶ ┌───────────────────────────┐
//!            │  Scheduler.poll()         │──▶ TaskDelegate
//!  tasks ──▶ │  rollover · day · grace   │      (feed mailbox)
//!            └───────────────────────────┘
//! ```
//!
//! Timing rules:
//! - a task fires when `now >= task.time && now - task.time <= grace`
//!   and it has not fired yet today;
//! - `done` flags reset only when the observed time moves backwards
//!   (midnight rollover), so a window missed before rollover stays
//!   consumed until the next day;
//! - a clock catch-up after time re-sync still fires tasks whose grace
//!   window has not fully elapsed; occurrences whose window has fully
//!   elapsed are skipped for the day.

use log::{debug, info};

use crate::app::ports::{TaskDelegate, WallTime};
use crate::config::ScheduleTask;

/// Fixed poll period, seconds. Derived from the 1 s service tick.
pub const POLL_PERIOD_SECS: u64 = 60;

/// The scheduler engine. Holds only cross-poll bookkeeping; the task
/// list itself lives in the feeder-state document snapshot.
pub struct Scheduler {
    last_observed: Option<u16>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_observed: None,
        }
    }

    /// Evaluate every task against the current wall time. Fired tasks
    /// are marked `done` in place; the caller owns persisting the
    /// mutated list. Returns the number of tasks fired this poll.
    pub fn poll(
        &mut self,
        now: WallTime,
        tasks: &mut [ScheduleTask],
        delegate: &mut dyn TaskDelegate,
    ) -> usize {
        if let Some(last) = self.last_observed {
            if now.minutes < last {
                info!("scheduler: midnight rollover, resetting {} task(s)", tasks.len());
                for task in tasks.iter_mut() {
                    task.done = false;
                }
            }
        }
        self.last_observed = Some(now.minutes);

        let mut fired = 0;
        for task in tasks.iter_mut() {
            if !task.enabled || task.done {
                continue;
            }

            if let Some(days) = &task.day_of_week {
                if !days.contains(&now.weekday) {
                    continue;
                }
            }

            if now.minutes >= task.time && now.minutes - task.time <= task.grace {
                info!(
                    "scheduler: '{}' due (scheduled {:02}:{:02}, now {:02}:{:02})",
                    task.name,
                    task.time / 60,
                    task.time % 60,
                    now.minutes / 60,
                    now.minutes % 60,
                );
                delegate.on_task_due(&task.name);
                task.done = true;
                fired += 1;
            } else {
                debug!("scheduler: '{}' outside window", task.name);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleTask;

    /// Test delegate that records fired task names.
    struct RecordingDelegate {
        fired: Vec<String>,
    }

    impl RecordingDelegate {
        fn new() -> Self {
            Self { fired: Vec::new() }
        }
    }

    impl TaskDelegate for RecordingDelegate {
        fn on_task_due(&mut self, name: &str) {
            self.fired.push(name.to_string());
        }
    }

    fn at(minutes: u16) -> WallTime {
        WallTime {
            minutes,
            weekday: 2,
        }
    }

    #[test]
    fn fires_once_inside_grace_window() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask {
            grace: 5,
            ..ScheduleTask::at("ten-oclock", 600)
        }];

        assert_eq!(sched.poll(at(599), &mut tasks, &mut delegate), 0);
        assert_eq!(sched.poll(at(600), &mut tasks, &mut delegate), 1);
        assert!(tasks[0].done);

        // Later polls inside the window must not fire again.
        for m in 601..=605 {
            assert_eq!(sched.poll(at(m), &mut tasks, &mut delegate), 0);
        }
        assert_eq!(delegate.fired, vec!["ten-oclock"]);
    }

    #[test]
    fn every_minute_of_the_window_can_fire() {
        // A poll that first lands mid-window (e.g. after a stall)
        // still fires; one past the window does not.
        for (minute, expect) in [(600, 1), (603, 1), (605, 1), (606, 0)] {
            let mut sched = Scheduler::new();
            let mut delegate = RecordingDelegate::new();
            let mut tasks = vec![ScheduleTask {
                grace: 5,
                ..ScheduleTask::at("t", 600)
            }];
            assert_eq!(
                sched.poll(at(minute), &mut tasks, &mut delegate),
                expect,
                "minute {minute}"
            );
        }
    }

    #[test]
    fn rollover_resets_done_and_allows_refire() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask::at("midnight", 0)];

        // Fire at 00:00, run through the day, wrap past midnight.
        assert_eq!(sched.poll(at(0), &mut tasks, &mut delegate), 1);
        assert_eq!(sched.poll(at(1439), &mut tasks, &mut delegate), 0);
        assert!(tasks[0].done);

        // 1439 -> 0 is the rollover; done resets and the task refires.
        assert_eq!(sched.poll(at(0), &mut tasks, &mut delegate), 1);
        assert_eq!(delegate.fired.len(), 2);
    }

    #[test]
    fn missed_window_stays_consumed_until_rollover() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask::at("morning", 480)];

        // First observation is already past the window: skipped.
        assert_eq!(sched.poll(at(490), &mut tasks, &mut delegate), 0);
        assert!(!tasks[0].done);
        // Still past the window all day.
        assert_eq!(sched.poll(at(1000), &mut tasks, &mut delegate), 0);
        // Next day it fires normally.
        assert_eq!(sched.poll(at(480), &mut tasks, &mut delegate), 1);
    }

    #[test]
    fn day_of_week_filter_skips_other_days() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask {
            day_of_week: Some(vec![1, 3, 5]),
            ..ScheduleTask::at("weekday", 600)
        }];

        // Sunday (weekday 0): time matches but the day does not.
        let sunday = WallTime {
            minutes: 600,
            weekday: 0,
        };
        assert_eq!(sched.poll(sunday, &mut tasks, &mut delegate), 0);
        assert!(!tasks[0].done);

        // Monday (weekday 1) fires.
        let monday = WallTime {
            minutes: 600,
            weekday: 1,
        };
        assert_eq!(sched.poll(monday, &mut tasks, &mut delegate), 1);
    }

    #[test]
    fn disabled_task_never_fires() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask {
            enabled: false,
            ..ScheduleTask::at("off", 600)
        }];

        assert_eq!(sched.poll(at(600), &mut tasks, &mut delegate), 0);
        assert!(!tasks[0].done);
    }

    #[test]
    fn clock_catchup_within_grace_still_fires() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![ScheduleTask {
            grace: 5,
            ..ScheduleTask::at("resync", 600)
        }];

        // Clock sat before the window, then a re-sync jumps it into
        // the tail of the grace window.
        assert_eq!(sched.poll(at(595), &mut tasks, &mut delegate), 0);
        assert_eq!(sched.poll(at(604), &mut tasks, &mut delegate), 1);
    }

    #[test]
    fn multiple_tasks_fire_independently() {
        let mut sched = Scheduler::new();
        let mut delegate = RecordingDelegate::new();
        let mut tasks = vec![
            ScheduleTask::at("a", 600),
            ScheduleTask::at("b", 600),
            ScheduleTask::at("later", 700),
        ];

        assert_eq!(sched.poll(at(600), &mut tasks, &mut delegate), 2);
        assert_eq!(sched.poll(at(700), &mut tasks, &mut delegate), 1);
        assert_eq!(delegate.fired, vec!["a", "b", "later"]);
    }
}
