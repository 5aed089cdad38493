use std::io::{self, Write};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, EditArgs, ListArgs};
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::datetime::parse_due_expr;
use crate::gateway::HttpGateway;
use crate::render::Renderer;
use crate::todo::{NewTodo, TodoId, TodoPatch};

#[instrument(skip_all)]
pub(super) async fn cmd_list(
    gateway: &HttpGateway,
    token: &str,
    cfg: &Config,
    renderer: &Renderer,
    args: ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let mut query = cfg.default_query()?;
    if let Some(search) = args.search {
        query.search = search;
    }
    if let Some(filter) = args.filter {
        query.filter = filter;
    }
    if let Some(sort) = args.sort {
        query.sort = sort;
    }
    debug!(
        search = %query.search,
        filter = %query.filter,
        sort = %query.sort,
        "resolved view"
    );

    let mut dashboard = Dashboard::new();
    dashboard
        .refresh(gateway, Some(token))
        .await
        .context("failed to load todos")?;

    let rows = dashboard.view(&query, now);
    if args.json {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
        return Ok(());
    }
    renderer.print_todo_table(&rows, now)
}

#[instrument(skip_all)]
pub(super) async fn cmd_add(
    gateway: &HttpGateway,
    token: &str,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let due_date = args
        .due
        .as_deref()
        .map(|raw| parse_due_expr(raw, now))
        .transpose()?;
    let draft = NewTodo {
        title: args.title.join(" "),
        description: args.description,
        due_date,
        priority: args.priority,
    };

    let mut dashboard = Dashboard::new();
    let todo = dashboard
        .create(gateway, Some(token), &draft)
        .await
        .context("failed to create todo")?;
    println!("Created todo {}.", todo.id);
    Ok(())
}

#[instrument(skip(gateway, token, renderer, now))]
pub(super) async fn cmd_show(
    gateway: &HttpGateway,
    token: &str,
    renderer: &Renderer,
    id: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut dashboard = Dashboard::new();
    let todo = dashboard
        .fetch(gateway, Some(token), &TodoId::from(id))
        .await
        .with_context(|| format!("failed to load todo {id}"))?;
    renderer.print_todo_info(&todo, now)
}

#[instrument(skip_all, fields(id = %args.id))]
pub(super) async fn cmd_edit(
    gateway: &HttpGateway,
    token: &str,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let patch = build_patch(&args, now)?;
    let id = TodoId::from(args.id.as_str());
    let mut dashboard = Dashboard::new();
    dashboard
        .update(gateway, Some(token), &id, &patch)
        .await
        .with_context(|| format!("failed to update todo {id}"))?;
    println!("Modified todo {id}.");
    Ok(())
}

#[instrument(skip(gateway, token))]
pub(super) async fn cmd_set_completed(
    gateway: &HttpGateway,
    token: &str,
    id: &str,
    completed: bool,
) -> anyhow::Result<()> {
    let id = TodoId::from(id);
    let mut dashboard = Dashboard::new();
    dashboard
        .update(gateway, Some(token), &id, &TodoPatch::completed(completed))
        .await
        .with_context(|| format!("failed to update todo {id}"))?;
    if completed {
        println!("Completed todo {id}.");
    } else {
        println!("Reopened todo {id}.");
    }
    Ok(())
}

#[instrument(skip(gateway, token))]
pub(super) async fn cmd_toggle(gateway: &HttpGateway, token: &str, id: &str) -> anyhow::Result<()> {
    let id = TodoId::from(id);
    let mut dashboard = Dashboard::new();
    let todo = dashboard
        .toggle(gateway, Some(token), &id)
        .await
        .with_context(|| format!("failed to toggle todo {id}"))?;
    let state = if todo.completed { "completed" } else { "pending" };
    println!("Todo {id} is now {state}.");
    Ok(())
}

#[instrument(skip(gateway, token))]
pub(super) async fn cmd_delete(gateway: &HttpGateway, token: &str, id: &str) -> anyhow::Result<()> {
    let id = TodoId::from(id);
    let mut dashboard = Dashboard::new();
    dashboard
        .delete(gateway, Some(token), &id)
        .await
        .with_context(|| format!("failed to delete todo {id}"))?;
    println!("Deleted todo {id}.");
    Ok(())
}

#[instrument(skip(gateway, token, renderer, now))]
pub(super) async fn cmd_stats(
    gateway: &HttpGateway,
    token: &str,
    renderer: &Renderer,
    json: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut dashboard = Dashboard::new();
    dashboard
        .refresh(gateway, Some(token))
        .await
        .context("failed to load todos")?;
    let stats = dashboard.stats(now);
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    renderer.print_stats(&stats)
}

fn build_patch(args: &EditArgs, now: DateTime<Utc>) -> anyhow::Result<TodoPatch> {
    let due_date = match (&args.due, args.clear_due) {
        (_, true) => Some(None),
        (Some(raw), false) => Some(Some(parse_due_expr(raw, now)?)),
        (None, false) => None,
    };
    let description = if args.clear_description {
        Some(None)
    } else {
        args.description.clone().map(Some)
    };
    let priority = if args.clear_priority {
        Some(None)
    } else {
        args.priority.map(Some)
    };

    Ok(TodoPatch {
        title: args.title.clone(),
        description,
        completed: None,
        due_date,
        priority,
    })
}
