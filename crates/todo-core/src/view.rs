use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::todo::{
  Priority,
  Todo
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum FilterMode {
  #[default]
  All,
  Completed,
  Pending,
  Overdue,
  HighPriority
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum SortMode {
  DueDate,
  Priority,
  Alphabetical,
  #[default]
  Created
}

impl FilterMode {
  pub fn as_str(
    &self
  ) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Completed => "completed",
      | Self::Pending => "pending",
      | Self::Overdue => "overdue",
      | Self::HighPriority => {
        "high-priority"
      }
    }
  }

  pub fn matches(
    &self,
    todo: &Todo,
    now: DateTime<Utc>
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Completed => {
        todo.completed
      }
      | Self::Pending => {
        !todo.completed
      }
      | Self::Overdue => {
        todo.is_overdue(now)
      }
      | Self::HighPriority => {
        !todo.completed
          && todo.priority
            == Some(Priority::High)
      }
    }
  }
}

impl SortMode {
  pub fn as_str(
    &self
  ) -> &'static str {
    match self {
      | Self::DueDate => "due_date",
      | Self::Priority => "priority",
      | Self::Alphabetical => {
        "alphabetical"
      }
      | Self::Created => "created"
    }
  }
}

impl FromStr for FilterMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | "pending" => Ok(Self::Pending),
      | "overdue" => Ok(Self::Overdue),
      | "high-priority"
      | "high_priority" => {
        Ok(Self::HighPriority)
      }
      | other => Err(anyhow!(
        "unknown filter: {other} (use \
         all, completed, pending, \
         overdue or high-priority)"
      ))
    }
  }
}

impl FromStr for SortMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "due_date" | "due-date"
      | "due" => Ok(Self::DueDate),
      | "priority" | "pri" => {
        Ok(Self::Priority)
      }
      | "alphabetical" | "title" => {
        Ok(Self::Alphabetical)
      }
      | "created" => Ok(Self::Created),
      | other => Err(anyhow!(
        "unknown sort: {other} (use \
         due_date, priority, \
         alphabetical or created)"
      ))
    }
  }
}

impl fmt::Display for FilterMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for SortMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct ViewQuery {
  pub search: String,
  pub filter: FilterMode,
  pub sort:   SortMode
}

/// Search, then filter, then sort. The input slice is never touched;
/// equal sort keys keep their input order.
#[tracing::instrument(skip(
  todos, now
))]
pub fn apply_view<'a>(
  todos: &'a [Todo],
  query: &ViewQuery,
  now: DateTime<Utc>
) -> Vec<&'a Todo> {
  let needle =
    query.search.trim().to_lowercase();

  let mut rows: Vec<&Todo> = todos
    .iter()
    .filter(|todo| {
      todo.matches_search(&needle)
    })
    .filter(|todo| {
      query.filter.matches(todo, now)
    })
    .collect();

  rows.sort_by(|a, b| {
    compare_todos(a, b, query.sort)
  });

  trace!(
    total = todos.len(),
    shown = rows.len(),
    "applied view"
  );
  rows
}

fn compare_todos(
  a: &Todo,
  b: &Todo,
  sort: SortMode
) -> Ordering {
  match sort {
    | SortMode::DueDate => {
      cmp_due(a, b)
    }
    | SortMode::Priority => {
      b.priority_rank()
        .cmp(&a.priority_rank())
        .then_with(|| cmp_due(a, b))
    }
    | SortMode::Alphabetical => {
      collation_key(&a.title)
        .cmp(&collation_key(&b.title))
        .then_with(|| {
          a.title.cmp(&b.title)
        })
    }
    | SortMode::Created => {
      b.created_at.cmp(&a.created_at)
    }
  }
}

/// Ascending by due date, undated last.
fn cmp_due(
  a: &Todo,
  b: &Todo
) -> Ordering {
  match (a.due_date, b.due_date) {
    | (Some(a), Some(b)) => a.cmp(&b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

/// Primary collation key: accents folded to ASCII, case dropped.
fn collation_key(title: &str) -> String {
  deunicode::deunicode(title)
    .to_lowercase()
}
