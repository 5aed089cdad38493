use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datastore::ThemePreference;
use crate::datetime::format_due;
use crate::session::SessionSnapshot;
use crate::stats::Stats;
use crate::todo::{Priority, Todo};

/// ANSI codes per theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    id: &'static str,
    high: &'static str,
    medium: &'static str,
    overdue: &'static str,
    muted: &'static str,
}

impl Palette {
    fn for_theme(theme: ThemePreference) -> Self {
        match theme {
            ThemePreference::Light => Self {
                id: "34",
                high: "31",
                medium: "33",
                overdue: "31",
                muted: "2",
            },
            ThemePreference::Dark => Self {
                id: "96",
                high: "91",
                medium: "93",
                overdue: "91",
                muted: "90",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: ThemePreference) -> anyhow::Result<Self> {
        let color = cfg.color_enabled()? && io::stdout().is_terminal();
        Ok(Self::with_color(color, theme))
    }

    pub fn with_color(color: bool, theme: ThemePreference) -> Self {
        Self {
            color,
            palette: Palette::for_theme(theme),
        }
    }

    #[tracing::instrument(skip(self, todos, now), fields(rows = todos.len()))]
    pub fn print_todo_table(&self, todos: &[&Todo], now: DateTime<Utc>) -> anyhow::Result<()> {
        self.write_todo_table(io::stdout().lock(), todos, now)
    }

    pub fn write_todo_table<W: Write>(
        &self,
        mut out: W,
        todos: &[&Todo],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if todos.is_empty() {
            writeln!(out, "No todos.")?;
            return Ok(());
        }

        let headers = ["ID", "Done", "Pri", "Due", "Title"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let rows = todos
            .iter()
            .map(|todo| self.todo_row(todo, now))
            .collect::<Vec<_>>();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} todo(s)", todos.len())?;
        Ok(())
    }

    fn todo_row(&self, todo: &Todo, now: DateTime<Utc>) -> Vec<String> {
        let done = if todo.completed { "x" } else { "" }.to_string();
        let due = todo.due_date.map(format_due).unwrap_or_default();
        let priority = todo.priority.map(|p| p.as_str()).unwrap_or_default();
        let title = todo.title.clone();

        if todo.completed {
            return [todo.id.to_string(), done, priority.to_string(), due, title]
                .iter()
                .map(|cell| self.paint(cell, self.palette.muted))
                .collect();
        }

        let due = if todo.is_overdue(now) {
            self.paint(&due, self.palette.overdue)
        } else {
            due
        };
        let priority = match todo.priority {
            Some(Priority::High) => self.paint(priority, self.palette.high),
            Some(Priority::Medium) => self.paint(priority, self.palette.medium),
            _ => priority.to_string(),
        };

        vec![
            self.paint(todo.id.as_str(), self.palette.id),
            done,
            priority,
            due,
            title,
        ]
    }

    #[tracing::instrument(skip(self, todo))]
    pub fn print_todo_info(&self, todo: &Todo, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.write_todo_info(io::stdout().lock(), todo, now)
    }

    pub fn write_todo_info<W: Write>(
        &self,
        mut out: W,
        todo: &Todo,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        writeln!(out, "id          {}", self.paint(todo.id.as_str(), self.palette.id))?;
        writeln!(out, "title       {}", todo.title)?;
        writeln!(
            out,
            "description {}",
            todo.description.as_deref().unwrap_or_default()
        )?;
        writeln!(
            out,
            "status      {}",
            if todo.completed { "completed" } else { "pending" }
        )?;
        writeln!(
            out,
            "priority    {}",
            todo.priority.map(|p| p.as_str()).unwrap_or_default()
        )?;
        if let Some(due) = todo.due_date {
            let text = format_due(due);
            if todo.is_overdue(now) {
                writeln!(
                    out,
                    "due         {} (overdue)",
                    self.paint(&text, self.palette.overdue)
                )?;
            } else {
                writeln!(out, "due         {text}")?;
            }
        }
        if let Some(owner) = &todo.user_id {
            writeln!(out, "owner       {owner}")?;
        }
        writeln!(out, "created     {}", todo.created_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "updated     {}", todo.updated_at.format("%Y-%m-%d %H:%M:%S"))?;
        Ok(())
    }

    pub fn print_stats(&self, stats: &Stats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "total     {}", stats.total)?;
        writeln!(out, "completed {}", stats.completed)?;
        writeln!(out, "pending   {}", stats.pending)?;
        let overdue = stats.overdue.to_string();
        if stats.overdue > 0 {
            writeln!(out, "overdue   {}", self.paint(&overdue, self.palette.overdue))?;
        } else {
            writeln!(out, "overdue   {overdue}")?;
        }
        Ok(())
    }

    pub fn print_identity(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match &snapshot.identity {
            Some(identity) if snapshot.authenticated => {
                writeln!(out, "logged in as {}", identity.display_name())?;
                if let Some(user_id) = &identity.user_id {
                    writeln!(out, "user id      {user_id}")?;
                }
            }
            _ => writeln!(out, "not logged in")?,
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let last = column_count.saturating_sub(1);
    for (idx, header) in headers.iter().enumerate() {
        if idx == last {
            write!(writer, "{header}")?;
        } else {
            write!(writer, "{:width$} ", header, width = widths[idx])?;
        }
    }
    writeln!(writer)?;

    for (idx, width) in widths.iter().enumerate() {
        let sep = if idx == last { "" } else { " " };
        write!(writer, "{:-<width$}{sep}", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx == last {
                write!(writer, "{cell}")?;
                continue;
            }
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{Renderer, strip_ansi};
    use crate::datastore::ThemePreference;
    use crate::todo::{OpaqueId, Priority, Todo};

    fn sample(id: &str, title: &str) -> Todo {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("at");
        Todo {
            id: OpaqueId::new(id),
            title: title.to_string(),
            description: None,
            completed: false,
            user_id: None,
            created_at: at,
            updated_at: at,
            due_date: None,
            priority: None,
        }
    }

    #[test]
    fn table_aligns_wide_titles() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).single().expect("now");
        let mut first = sample("1", "写报告");
        first.priority = Some(Priority::High);
        first.due_date = Some(now - Duration::days(2));
        let mut second = sample("22", "plain");
        second.completed = true;

        let renderer = Renderer::with_color(false, ThemePreference::Light);
        let mut buf = Vec::new();
        renderer
            .write_todo_table(&mut buf, &[&first, &second], now)
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "ID Done Pri  Due        Title");
        assert_eq!(lines[2], "1       high 2024-01-08 写报告");
        assert_eq!(lines[3], "22 x                    plain");
        assert_eq!(lines[5], "2 todo(s)");
    }

    #[test]
    fn overdue_dates_are_painted_when_color_is_on() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).single().expect("now");
        let mut late = sample("5", "late");
        late.due_date = Some(now - Duration::days(1));

        let renderer = Renderer::with_color(true, ThemePreference::Light);
        let mut buf = Vec::new();
        renderer
            .write_todo_table(&mut buf, &[&late], now)
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("\x1b[31m2024-01-09\x1b[0m"));
        assert!(strip_ansi(&text).contains("5           2024-01-09 late"));
    }

    #[test]
    fn empty_table_prints_placeholder() {
        let now = Utc::now();
        let renderer = Renderer::with_color(false, ThemePreference::Dark);
        let mut buf = Vec::new();
        renderer.write_todo_table(&mut buf, &[], now).expect("render");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "No todos.\n");
    }
}
