//! Per-user turn ordering.
//!
//! A [`TurnGate`] hands out tickets in arrival order. A ticket's turn starts only after every
//! earlier ticket for the same user has been dropped, so turns for one user never interleave
//! while different users proceed independently. Dropping a ticket without running it still
//! releases the lane.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

type Lanes = Arc<Mutex<HashMap<String, Lane>>>;

struct Lane {
    issued: u64,
    finished: BTreeSet<u64>,
    watermark: watch::Sender<u64>,
}

impl Lane {
    fn new() -> Self {
        let (watermark, _) = watch::channel(0);
        Self { issued: 0, finished: BTreeSet::new(), watermark }
    }

    fn finish(&mut self, sequence: u64) {
        self.finished.insert(sequence);
        let mut mark = *self.watermark.borrow();
        while self.finished.remove(&(mark + 1)) {
            mark += 1;
        }
        self.watermark.send_replace(mark);
    }

    fn drained(&self) -> bool {
        *self.watermark.borrow() == self.issued
    }
}

#[derive(Clone, Default)]
pub struct TurnGate {
    lanes: Lanes,
}

impl TurnGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next ticket for `user_key`. Call this when the message arrives, not when
    /// processing starts, so that arrival order is preserved.
    pub fn admit(&self, user_key: &str) -> TurnTicket {
        let mut lanes = lock(&self.lanes);
        let lane = lanes.entry(user_key.to_string()).or_insert_with(Lane::new);
        lane.issued += 1;
        TurnTicket {
            user_key: user_key.to_string(),
            sequence: lane.issued,
            watermark: lane.watermark.subscribe(),
            lanes: Arc::clone(&self.lanes),
        }
    }

    /// Number of users with outstanding tickets.
    pub fn active_lanes(&self) -> usize {
        lock(&self.lanes).len()
    }
}

pub struct TurnTicket {
    user_key: String,
    sequence: u64,
    watermark: watch::Receiver<u64>,
    lanes: Lanes,
}

impl TurnTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Resolves once every earlier ticket of this user has been released.
    pub async fn wait_turn(&mut self) {
        let sequence = self.sequence;
        // A closed channel means the lane was drained, so nothing is ahead of us.
        let _ = self.watermark.wait_for(|mark| mark + 1 >= sequence).await;
    }

    /// True when a newer message for the same user arrived after this ticket.
    pub fn is_superseded(&self) -> bool {
        lock(&self.lanes).get(&self.user_key).is_some_and(|lane| lane.issued > self.sequence)
    }
}

impl Drop for TurnTicket {
    fn drop(&mut self) {
        let mut lanes = lock(&self.lanes);
        let drained = match lanes.get_mut(&self.user_key) {
            Some(lane) => {
                lane.finish(self.sequence);
                lane.drained()
            }
            None => false,
        };
        if drained {
            lanes.remove(&self.user_key);
        }
    }
}

fn lock(lanes: &Lanes) -> MutexGuard<'_, HashMap<String, Lane>> {
    match lanes.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
