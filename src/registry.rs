//! Staged and frozen rules.
//!
//! Registration handles stage their builder when dropped. The next request
//! freezes everything staged so far and inserts each rule at the position
//! fixed by its ticket, so the frozen list always follows the order in which
//! handles were created. Selection then works on a snapshot of that list,
//! so rules registered concurrently with a request are either fully visible
//! to it or not at all.

use crate::request::Request;
use crate::rule::{Rule, RuleBuilder};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Position of a registration, reserved when its handle is created.
///
/// Tickets issued before a [`RuleRegistry::clear`] belong to an older epoch
/// and are discarded when staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    seq: u64,
}

pub struct RuleRegistry {
    staged: Mutex<Vec<(u64, RuleBuilder)>>,
    rules: RwLock<Vec<(u64, Arc<Rule>)>>,
    next_seq: AtomicU64,
    epoch: AtomicU64,
    not_found: Arc<Rule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(Vec::new()),
            rules: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            not_found: Arc::new(Rule::not_found()),
        }
    }

    pub fn reserve(&self) -> Ticket {
        Ticket {
            epoch: self.epoch.load(Ordering::Acquire),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn stage(&self, ticket: Ticket, builder: RuleBuilder) {
        let mut staged = self.staged.lock();
        // Epoch changes only under the stage lock.
        if ticket.epoch != self.epoch.load(Ordering::Acquire) {
            debug!(seq = ticket.seq, "Discarding rule registered before reset");
            return;
        }
        staged.push((ticket.seq, builder));
    }

    /// Freeze staged builders into rules, each placed by sequence number.
    pub fn freeze_staged(&self) {
        let mut staged = self.staged.lock();
        if staged.is_empty() {
            return;
        }
        let count = staged.len();
        // Stage lock is held until the rules are published.
        let mut rules = self.rules.write();
        for (seq, builder) in staged.drain(..) {
            let at = rules.partition_point(|(existing, _)| *existing < seq);
            rules.insert(at, (seq, Arc::new(builder.build())));
        }
        debug!(count, total = rules.len(), "Froze staged rules");
    }

    /// Current frozen rules, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Rule>> {
        self.rules.read().iter().map(|(_, rule)| Arc::clone(rule)).collect()
    }

    /// Last rule in `rules` matching `request`, if any.
    pub fn select(rules: &[Arc<Rule>], request: &Request) -> Option<Arc<Rule>> {
        rules.iter().rev().find(|rule| rule.matches(request)).cloned()
    }

    pub fn not_found(&self) -> Arc<Rule> {
        Arc::clone(&self.not_found)
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every rule and invalidate tickets of live handles.
    pub fn clear(&self) {
        let mut staged = self.staged.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        staged.clear();
        self.rules.write().clear();
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
