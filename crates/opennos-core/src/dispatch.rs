//! Round-robin dispatch of deferred hardware work.
//!
//! Work that competes for one hardware resource (LAG member table, VLAN
//! member table, L2 table) is queued per resource class. Each dispatch pass
//! runs at most one task per class, so a burst on one class cannot starve
//! the others.

use crate::error::{CoreError, CoreResult};
use log::{debug, error};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hardware resource a queued task contends for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    LagMemberAdd,
    VlanMemberAdd,
    FdbFlush,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::LagMemberAdd,
        ResourceClass::VlanMemberAdd,
        ResourceClass::FdbFlush,
    ];

    const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceClass::LagMemberAdd => "lag-member-add",
            ResourceClass::VlanMemberAdd => "vlan-member-add",
            ResourceClass::FdbFlush => "fdb-flush",
        };
        f.write_str(s)
    }
}

/// A deferred unit of hardware work. Tasks are run once and never retried.
pub trait DispatchTask<C: ?Sized>: Send {
    fn describe(&self) -> String;

    fn run(&mut self, ctx: &mut C) -> CoreResult<()>;
}

/// Result of one task run during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub class: ResourceClass,
    pub task: String,
    pub result: CoreResult<()>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    pub fn executed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&DispatchOutcome, &CoreError)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (outcome, err)))
    }

    pub fn classes(&self) -> Vec<ResourceClass> {
        self.outcomes.iter().map(|outcome| outcome.class).collect()
    }
}

type TaskQueue<C> = Mutex<VecDeque<Box<dyn DispatchTask<C>>>>;

/// Per-class FIFO queues drained round-robin.
///
/// Any thread may enqueue; a single owner drives [`dispatch_pass`](Self::dispatch_pass).
pub struct CommandDispatcher<C: ?Sized> {
    queues: Vec<TaskQueue<C>>,
    next_start: AtomicUsize,
}

impl<C: ?Sized> CommandDispatcher<C> {
    pub fn new() -> Self {
        Self {
            queues: ResourceClass::ALL
                .iter()
                .map(|_| Mutex::new(VecDeque::new()))
                .collect(),
            next_start: AtomicUsize::new(0),
        }
    }

    pub fn enqueue<T>(&self, class: ResourceClass, task: T)
    where
        T: DispatchTask<C> + 'static,
    {
        debug!("queued {} on {}", task.describe(), class);
        self.queues[class.index()].lock().push_back(Box::new(task));
    }

    pub fn pending(&self, class: ResourceClass) -> usize {
        self.queues[class.index()].lock().len()
    }

    pub fn is_idle(&self) -> bool {
        self.queues.iter().all(|queue| queue.lock().is_empty())
    }

    /// Drops every queued task of `class`, returning how many were dropped.
    pub fn clear(&self, class: ResourceClass) -> usize {
        let mut queue = self.queues[class.index()].lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Runs at most one task from every non-empty queue.
    ///
    /// The class visited first rotates from pass to pass. Queue locks are
    /// not held while a task runs.
    pub fn dispatch_pass(&self, ctx: &mut C) -> DispatchReport {
        let classes = ResourceClass::ALL.len();
        let start = self.next_start.fetch_add(1, Ordering::Relaxed) % classes;

        let mut report = DispatchReport::default();
        for offset in 0..classes {
            let class = ResourceClass::ALL[(start + offset) % classes];
            let task = self.queues[class.index()].lock().pop_front();
            let Some(mut task) = task else {
                continue;
            };

            let description = task.describe();
            let result = task.run(ctx);
            match &result {
                Ok(()) => debug!("dispatched {} on {}", description, class),
                Err(err) => error!("{} on {} failed: {}", description, class, err),
            }
            report.outcomes.push(DispatchOutcome {
                class,
                task: description,
                result,
            });
        }
        report
    }
}

impl<C: ?Sized> Default for CommandDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for CommandDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for class in ResourceClass::ALL {
            map.entry(&class, &self.pending(class));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    type Log = Vec<&'static str>;

    struct Record(&'static str);

    impl DispatchTask<Log> for Record {
        fn describe(&self) -> String {
            self.0.to_string()
        }

        fn run(&mut self, ctx: &mut Log) -> CoreResult<()> {
            ctx.push(self.0);
            Ok(())
        }
    }

    struct Broken;

    impl DispatchTask<Log> for Broken {
        fn describe(&self) -> String {
            "broken".to_string()
        }

        fn run(&mut self, _ctx: &mut Log) -> CoreResult<()> {
            Err(CoreError::fail("hardware said no"))
        }
    }

    #[test]
    fn test_one_task_per_class_per_pass() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        dispatcher.enqueue(ResourceClass::LagMemberAdd, Record("lag-1"));
        dispatcher.enqueue(ResourceClass::LagMemberAdd, Record("lag-2"));
        dispatcher.enqueue(ResourceClass::LagMemberAdd, Record("lag-3"));
        dispatcher.enqueue(ResourceClass::VlanMemberAdd, Record("vlan-1"));

        let mut log = Vec::new();
        let report = dispatcher.dispatch_pass(&mut log);
        assert_eq!(report.executed(), 2);
        assert_eq!(log, vec!["lag-1", "vlan-1"]);
        assert_eq!(dispatcher.pending(ResourceClass::LagMemberAdd), 2);

        dispatcher.dispatch_pass(&mut log);
        dispatcher.dispatch_pass(&mut log);
        assert_eq!(log, vec!["lag-1", "vlan-1", "lag-2", "lag-3"]);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_fifo_within_class() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        for name in ["a", "b", "c"] {
            dispatcher.enqueue(ResourceClass::FdbFlush, Record(name));
        }
        let mut log = Vec::new();
        while !dispatcher.is_idle() {
            dispatcher.dispatch_pass(&mut log);
        }
        assert_eq!(log, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_start_class_rotates() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        for _ in 0..2 {
            dispatcher.enqueue(ResourceClass::LagMemberAdd, Record("lag"));
            dispatcher.enqueue(ResourceClass::VlanMemberAdd, Record("vlan"));
            dispatcher.enqueue(ResourceClass::FdbFlush, Record("fdb"));
        }

        let mut log = Vec::new();
        let first = dispatcher.dispatch_pass(&mut log);
        let second = dispatcher.dispatch_pass(&mut log);
        assert_eq!(
            first.classes(),
            vec![
                ResourceClass::LagMemberAdd,
                ResourceClass::VlanMemberAdd,
                ResourceClass::FdbFlush
            ]
        );
        assert_eq!(
            second.classes(),
            vec![
                ResourceClass::VlanMemberAdd,
                ResourceClass::FdbFlush,
                ResourceClass::LagMemberAdd
            ]
        );
    }

    #[test]
    fn test_failures_are_reported_not_retried() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        dispatcher.enqueue(ResourceClass::VlanMemberAdd, Broken);
        dispatcher.enqueue(ResourceClass::FdbFlush, Record("flush"));

        let mut log = Vec::new();
        let report = dispatcher.dispatch_pass(&mut log);
        assert_eq!(report.executed(), 2);
        let failures: Vec<_> = report.failures().map(|(o, _)| o.task.clone()).collect();
        assert_eq!(failures, vec!["broken".to_string()]);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn test_empty_pass() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        let report = dispatcher.dispatch_pass(&mut Vec::new());
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn test_concurrent_producers() {
        let dispatcher: Arc<CommandDispatcher<Log>> = Arc::new(CommandDispatcher::new());
        let producers: Vec<_> = ResourceClass::ALL
            .into_iter()
            .map(|class| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    for _ in 0..50 {
                        dispatcher.enqueue(class, Record("task"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut log = Vec::new();
        let mut passes = 0;
        while !dispatcher.is_idle() {
            let report = dispatcher.dispatch_pass(&mut log);
            assert_eq!(report.executed(), 3);
            passes += 1;
        }
        assert_eq!(passes, 50);
        assert_eq!(log.len(), 150);
    }

    #[test]
    fn test_clear() {
        let dispatcher: CommandDispatcher<Log> = CommandDispatcher::new();
        dispatcher.enqueue(ResourceClass::FdbFlush, Record("x"));
        dispatcher.enqueue(ResourceClass::FdbFlush, Record("y"));
        assert_eq!(dispatcher.clear(ResourceClass::FdbFlush), 2);
        assert!(dispatcher.is_idle());
    }
}
