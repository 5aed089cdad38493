use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::cli::CredentialArgs;
use crate::datastore::DataStore;
use crate::gateway::{Credentials, HttpGateway};
use crate::render::Renderer;
use crate::session::SessionStore;

#[instrument(skip_all, fields(email = %args.email))]
pub(super) async fn cmd_register(
    session: &mut SessionStore<DataStore>,
    gateway: &HttpGateway,
    args: CredentialArgs,
) -> anyhow::Result<()> {
    info!("command register");
    let credentials = Credentials::new(args.email, args.password);
    session
        .register(gateway, &credentials)
        .await
        .context("registration failed")?;
    println!("Registered and logged in as {}.", signed_in_as(session));
    Ok(())
}

#[instrument(skip_all, fields(email = %args.email))]
pub(super) async fn cmd_login(
    session: &mut SessionStore<DataStore>,
    gateway: &HttpGateway,
    args: CredentialArgs,
) -> anyhow::Result<()> {
    info!("command login");
    let credentials = Credentials::new(args.email, args.password);
    session
        .login(gateway, &credentials)
        .await
        .context("login failed")?;
    println!("Logged in as {}.", signed_in_as(session));
    Ok(())
}

#[instrument(skip_all)]
pub(super) async fn cmd_logout(
    session: &mut SessionStore<DataStore>,
    gateway: &HttpGateway,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command logout");
    if let Some(notice) = session.bootstrap(now) {
        eprintln!("{}", notice.message);
    }
    let was_authenticated = session.is_authenticated();
    session.logout(gateway).await;
    if was_authenticated {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

#[instrument(skip_all)]
pub(super) fn cmd_whoami(
    session: &mut SessionStore<DataStore>,
    renderer: &Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    if let Some(notice) = session.bootstrap(now) {
        eprintln!("{}", notice.message);
    }
    renderer.print_identity(&session.snapshot())
}

fn signed_in_as(session: &SessionStore<DataStore>) -> String {
    session
        .snapshot()
        .identity
        .map(|identity| identity.display_name().to_string())
        .unwrap_or_else(|| "unknown user".to_string())
}
