mod auth;
mod todos;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::cli::Command;
use crate::config::Config;
use crate::datastore::{DataStore, ThemePreference, load_theme, save_theme};
use crate::gateway::HttpGateway;
use crate::render::Renderer;
use crate::session::SessionStore;

#[instrument(skip_all, fields(command = command.name()))]
pub async fn dispatch(
    store: DataStore,
    cfg: &Config,
    renderer: &Renderer,
    gateway: &HttpGateway,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut session = SessionStore::new(store);
    session.subscribe(|event| {
        debug!(
            authenticated = event.snapshot.authenticated,
            navigation = ?event.navigation,
            "session changed"
        );
    });

    debug!(api = gateway.base_url(), "dispatching command");

    match command {
        Command::Register(args) => auth::cmd_register(&mut session, gateway, args).await,
        Command::Login(args) => auth::cmd_login(&mut session, gateway, args).await,
        Command::Logout => auth::cmd_logout(&mut session, gateway, now).await,
        Command::Whoami => auth::cmd_whoami(&mut session, renderer, now),
        Command::List(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_list(gateway, &token, cfg, renderer, args, now).await
        }
        Command::Add(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_add(gateway, &token, args, now).await
        }
        Command::Show(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_show(gateway, &token, renderer, &args.id, now).await
        }
        Command::Edit(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_edit(gateway, &token, args, now).await
        }
        Command::Done(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_set_completed(gateway, &token, &args.id, true).await
        }
        Command::Undo(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_set_completed(gateway, &token, &args.id, false).await
        }
        Command::Toggle(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_toggle(gateway, &token, &args.id).await
        }
        Command::Delete(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_delete(gateway, &token, &args.id).await
        }
        Command::Stats(args) => {
            let token = open_session(&mut session, now)?;
            todos::cmd_stats(gateway, &token, renderer, args.json, now).await
        }
        Command::Theme { theme } => cmd_theme(session.storage(), theme),
        Command::Health => cmd_health(gateway).await,
    }
}

/// Restores the stored session and hands back its token.
///
/// The bootstrap notice, if any, goes to stderr before the token check.
fn open_session(
    session: &mut SessionStore<DataStore>,
    now: DateTime<Utc>,
) -> anyhow::Result<String> {
    if let Some(notice) = session.bootstrap(now) {
        eprintln!("{}", notice.message);
    }
    let token = session
        .require_token()
        .context("run `todo login <email> <password>` first")?;
    Ok(token.to_string())
}

#[instrument(skip(store))]
fn cmd_theme(store: &DataStore, theme: Option<ThemePreference>) -> anyhow::Result<()> {
    match theme {
        Some(theme) => {
            save_theme(store, theme).context("failed to store theme")?;
            println!("Theme set to {}.", theme.storage_value());
        }
        None => println!("{}", load_theme(store).storage_value()),
    }
    Ok(())
}

#[instrument(skip(gateway))]
async fn cmd_health(gateway: &HttpGateway) -> anyhow::Result<()> {
    let status = gateway
        .health()
        .await
        .with_context(|| format!("health check against {} failed", gateway.base_url()))?;
    println!("{}: {status}", gateway.base_url());
    Ok(())
}
