//! Discrete-event worker pool.
//!
//! A single virtual clock driven by a min-heap of timestamped events.
//! Ties are broken by kind (decision tick, then completion, then arrival)
//! and then by scheduling order, so every run is totally ordered.
//!
//! Workers are kept in a `BTreeMap` keyed by id and idle workers in a
//! `BTreeSet`, which gives the ascending-id dispatch order and the
//! highest-id-first shrink order without any sorting.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};

use reflex_core::{KnobValue, SimDuration, SimTime, Task, TaskId, WorkerId};
use tracing::debug;

use crate::error::PoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Tick(u64),
    Completion(WorkerId),
    Arrival(SimDuration),
}

impl Payload {
    fn priority(&self) -> u8 {
        match self {
            Payload::Tick(_) => 0,
            Payload::Completion(_) => 1,
            Payload::Arrival(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledEvent {
    at: SimTime,
    seq: u64,
    payload: Payload,
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.payload.priority().cmp(&other.payload.priority()))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What a call to [`PoolSimulator::step`] processed.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A task arrived and joined the queue.
    Arrival { task: TaskId, service: SimDuration },
    /// A task finished; carries the completed task.
    Completion(Task),
    /// A decision tick fired. The pool itself does nothing on a tick.
    Tick(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub at: SimTime,
    pub event: PoolEvent,
    /// Tasks handed to workers as a consequence of this event.
    pub dispatched: usize,
}

/// Result of a successful resize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resize {
    pub previous: KnobValue,
    pub active: KnobValue,
    pub created: u32,
    pub reactivated: u32,
    pub retired_idle: u32,
    pub marked_retiring: u32,
    pub dispatched: usize,
}

/// Observable pool state at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub now: SimTime,
    pub queued: usize,
    /// Workers running a task, retiring ones included.
    pub busy: usize,
    pub idle: usize,
    /// Workers not marked for retirement; the current knob value.
    pub active: KnobValue,
    pub retiring: usize,
    pub arrivals: u64,
    pub dispatched: u64,
    pub completed: u64,
}

impl PoolState {
    /// Busy workers plus idle workers.
    pub fn workers(&self) -> usize {
        self.busy + self.idle
    }

    /// Every admitted task is queued, in flight, or completed.
    pub fn is_conserved(&self) -> bool {
        self.arrivals == self.queued as u64 + self.busy as u64 + self.completed
    }
}

#[derive(Debug, Default)]
struct Worker {
    current: Option<Task>,
    retiring: bool,
}

#[derive(Debug)]
pub struct PoolSimulator {
    now: SimTime,
    events: BinaryHeap<Reverse<ScheduledEvent>>,
    seq: u64,
    next_task: u64,
    next_worker: u32,
    queue: VecDeque<Task>,
    workers: BTreeMap<WorkerId, Worker>,
    idle: BTreeSet<WorkerId>,
    arrivals: u64,
    dispatched: u64,
    completed: u64,
}

impl PoolSimulator {
    /// A pool with `workers` idle workers at time zero.
    pub fn new(workers: KnobValue) -> Result<Self, PoolError> {
        let mut pool = Self {
            now: SimTime::ZERO,
            events: BinaryHeap::new(),
            seq: 0,
            next_task: 0,
            next_worker: 0,
            queue: VecDeque::new(),
            workers: BTreeMap::new(),
            idle: BTreeSet::new(),
            arrivals: 0,
            dispatched: 0,
            completed: 0,
        };
        pool.resize(workers)?;
        Ok(pool)
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Workers not marked for retirement.
    pub fn active(&self) -> KnobValue {
        self.workers.values().filter(|w| !w.retiring).count() as KnobValue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Time of the next event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.peek().map(|Reverse(e)| e.at)
    }

    pub fn state(&self) -> PoolState {
        let busy = self.workers.len() - self.idle.len();
        PoolState {
            now: self.now,
            queued: self.queue.len(),
            busy,
            idle: self.idle.len(),
            active: self.active(),
            retiring: self.workers.values().filter(|w| w.retiring).count(),
            arrivals: self.arrivals,
            dispatched: self.dispatched,
            completed: self.completed,
        }
    }

    fn schedule(&mut self, at: SimTime, payload: Payload) {
        debug_assert!(at >= self.now, "event scheduled in the past");
        self.seq += 1;
        self.events.push(Reverse(ScheduledEvent {
            at,
            seq: self.seq,
            payload,
        }));
    }

    pub fn schedule_arrival(&mut self, at: SimTime, service: SimDuration) {
        self.schedule(at, Payload::Arrival(service));
    }

    pub fn schedule_tick(&mut self, at: SimTime, tick: u64) {
        self.schedule(at, Payload::Tick(tick));
    }

    /// Admit a task to the back of the queue.
    pub fn enqueue(&mut self, mut task: Task) {
        task.mark_queued();
        self.arrivals += 1;
        self.queue.push_back(task);
    }

    /// Hand queued tasks to idle workers, FIFO onto the lowest idle id.
    pub fn dispatch(&mut self) -> usize {
        let mut count = 0;
        while !self.queue.is_empty() {
            let Some(id) = self.idle.pop_first() else {
                break;
            };
            let Some(mut task) = self.queue.pop_front() else {
                self.idle.insert(id);
                break;
            };
            task.mark_dispatched(id, self.now);
            let done = self.now + task.service;
            if let Some(worker) = self.workers.get_mut(&id) {
                worker.current = Some(task);
            }
            self.schedule(done, Payload::Completion(id));
            self.dispatched += 1;
            count += 1;
        }
        count
    }

    /// Advance to the next event. `None` when the queue is exhausted.
    pub fn step(&mut self) -> Option<Step> {
        loop {
            let Reverse(event) = self.events.pop()?;
            self.now = event.at;

            let event = match event.payload {
                Payload::Tick(n) => PoolEvent::Tick(n),
                Payload::Arrival(service) => {
                    let id = TaskId(self.next_task);
                    self.next_task += 1;
                    self.enqueue(Task::new(id, self.now, service));
                    PoolEvent::Arrival { task: id, service }
                }
                Payload::Completion(id) => match self.complete(id) {
                    Some(task) => PoolEvent::Completion(task),
                    None => {
                        debug_assert!(false, "completion for {id} without a task");
                        continue;
                    }
                },
            };

            let dispatched = self.dispatch();
            return Some(Step {
                at: self.now,
                event,
                dispatched,
            });
        }
    }

    fn complete(&mut self, id: WorkerId) -> Option<Task> {
        let worker = self.workers.get_mut(&id)?;
        let mut task = worker.current.take()?;
        task.mark_completed(self.now);
        self.completed += 1;

        if worker.retiring {
            self.workers.remove(&id);
            debug!(worker = %id, "retired after finishing its task");
        } else {
            self.idle.insert(id);
        }
        Some(task)
    }

    /// Set the active worker count. Shrinking never pre-empts: busy
    /// workers are only marked retiring and leave once their task is done.
    pub fn resize(&mut self, target: KnobValue) -> Result<Resize, PoolError> {
        if target < 1 {
            return Err(PoolError::BelowMinimum { requested: target });
        }

        let previous = self.active();
        let mut resize = Resize {
            previous,
            active: target,
            ..Default::default()
        };

        if target > previous {
            let mut missing = target - previous;
            let retiring: Vec<WorkerId> = self
                .workers
                .iter()
                .filter(|(_, w)| w.retiring)
                .map(|(id, _)| *id)
                .take(missing as usize)
                .collect();
            for id in retiring {
                if let Some(worker) = self.workers.get_mut(&id) {
                    worker.retiring = false;
                }
                resize.reactivated += 1;
                missing -= 1;
            }
            for _ in 0..missing {
                let id = WorkerId(self.next_worker);
                self.next_worker += 1;
                self.workers.insert(id, Worker::default());
                self.idle.insert(id);
                resize.created += 1;
            }
        } else if target < previous {
            let mut excess = previous - target;
            while excess > 0 {
                let Some(id) = self.idle.pop_last() else {
                    break;
                };
                self.workers.remove(&id);
                resize.retired_idle += 1;
                excess -= 1;
            }
            let busy: Vec<WorkerId> = self
                .workers
                .iter()
                .rev()
                .filter(|(_, w)| !w.retiring)
                .map(|(id, _)| *id)
                .take(excess as usize)
                .collect();
            for id in busy {
                if let Some(worker) = self.workers.get_mut(&id) {
                    worker.retiring = true;
                }
                resize.marked_retiring += 1;
            }
        }

        resize.dispatched = self.dispatch();
        if previous != target {
            debug!(
                previous,
                active = target,
                created = resize.created,
                reactivated = resize.reactivated,
                retired_idle = resize.retired_idle,
                marked_retiring = resize.marked_retiring,
                "pool resized"
            );
        }
        Ok(resize)
    }
}
