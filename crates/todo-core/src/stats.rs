use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::todo::Todo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
}

/// Counts over the whole, unfiltered collection in one pass.
pub fn compute_stats(todos: &[Todo], now: DateTime<Utc>) -> Stats {
    let mut stats = todos.iter().fold(Stats::default(), |mut acc, todo| {
        acc.total += 1;
        if todo.completed {
            acc.completed += 1;
        }
        if todo.is_overdue(now) {
            acc.overdue += 1;
        }
        acc
    });
    stats.pending = stats.total - stats.completed;
    stats
}
