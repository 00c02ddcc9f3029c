use crate::auth::create_user;
use crate::backend::{Backend, UserBackend};
use crate::calendar::{date_key, next_sunday, parse_day, slot_label};
use crate::client::retry::{CancelHandle, CancelToken};
use crate::client::session::SessionStore;
use crate::client::view::CalendarView;
use crate::client::ApiClient;
use crate::configuration::Configuration;
use crate::configuration_handler::{Command, ConfigurationHandler};
use crate::database_interface::DatabaseInterface;
use crate::http::create_app;
use crate::local_store::LocalStore;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub async fn run(configuration: ConfigurationHandler) -> Result<()> {
    match configuration.command() {
        Command::Serve => serve(&configuration).await,
        Command::CreateAdmin { username, password } => {
            let database_url = configuration
                .database_url()
                .context("DATABASE_URL is required to create an admin account")?;
            let backend = DatabaseInterface::new(&database_url)?;
            create_user(&backend, &username, &password, true)?;
            println!("Admin account '{username}' created");
            Ok(())
        }
        Command::Login { username, password } => {
            let user = admin_view(&configuration).login(&username, &password).await?;
            println!("Logged in as {}", user.username);
            Ok(())
        }
        Command::Logout => {
            admin_view(&configuration).logout()?;
            println!("Logged out");
            Ok(())
        }
        Command::Week { date, admin } => {
            let day = match date {
                Some(date) => parse_day(&date)?,
                None => today_or_next_sunday(),
            };
            let view = match admin {
                true => admin_view(&configuration),
                false => public_view(&configuration),
            };
            let week = view.load_week(day, &cancel_on_interrupt()).await?;
            print!("{}", week.render(admin));
            Ok(())
        }
        Command::Upcoming { count } => {
            let sundays = public_view(&configuration)
                .upcoming(Utc::now().date_naive(), count, &cancel_on_interrupt())
                .await?;
            for sunday in sundays {
                match sunday.title {
                    Some(title) => println!("{}  {title}", date_key(sunday.date)),
                    None => println!("{}", date_key(sunday.date)),
                }
            }
            Ok(())
        }
        Command::Toggle { id } => {
            let slot = admin_view(&configuration).toggle_slot(id).await?;
            let state = match slot.is_available {
                true => "available",
                false => "unavailable",
            };
            println!(
                "{} {} is now {state}",
                date_key(slot.date.date_naive()),
                slot_label(slot.hour, slot.slot_number)
            );
            Ok(())
        }
        Command::Title { date, title } => {
            let saved = admin_view(&configuration)
                .set_title(parse_day(&date)?, &title)
                .await?;
            println!("{}: {}", date_key(saved.date), saved.title);
            Ok(())
        }
        Command::Hide { date } => {
            let hidden = admin_view(&configuration).hide(parse_day(&date)?).await?;
            println!("{} hidden", date_key(hidden.date));
            Ok(())
        }
        Command::Restore { date } => {
            let day = parse_day(&date)?;
            admin_view(&configuration).restore(day).await?;
            println!("{} restored", date_key(day));
            Ok(())
        }
    }
}

/// Serves the API until interrupted. Without a database URL the calendar
/// lives in memory and is lost on shutdown.
pub async fn serve<C: Configuration>(configuration: &C) -> Result<()> {
    let address = format!("0.0.0.0:{}", configuration.port());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    println!("Sunday slots accessible at:\n{address}");

    let app = if let Some(database_url) = configuration.database_url() {
        let backend = connect(&database_url).await;
        bootstrap_admin(
            &backend,
            &configuration.admin_username(),
            configuration.admin_password().as_deref(),
        )?;
        create_app(backend, configuration)
    } else {
        warn!("No database configured, the calendar is kept in memory");
        let backend = LocalStore::default();
        bootstrap_admin(
            &backend,
            &configuration.admin_username(),
            configuration.admin_password().as_deref(),
        )?;
        create_app(backend, configuration)
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;
    info!("Server stopped");
    Ok(())
}

async fn connect(database_url: &str) -> DatabaseInterface {
    loop {
        match DatabaseInterface::new(database_url) {
            Ok(backend) => {
                info!("Successfully connected to database");
                return backend;
            }
            Err(err) => {
                error!(%err, "Failed to establish database connection. Retry in 1 sec. Unset DATABASE_URL to run with an in-memory calendar.");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Recreates the configured admin account so the password in the environment
/// is always the one that works.
pub fn bootstrap_admin<T: Backend>(
    backend: &T,
    username: &str,
    password: Option<&str>,
) -> Result<()> {
    let Some(password) = password else {
        if backend.user_by_username(username)?.is_none() {
            warn!(%username, "ADMIN_PASSWORD not set, no admin can log in until create-admin is run");
        }
        return Ok(());
    };
    create_user(backend, username, password, true)?;
    info!(%username, "Admin account ready");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Cancels the fetch when the user presses Ctrl-C.
fn cancel_on_interrupt() -> CancelToken {
    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => handle.cancel(),
            Err(err) => {
                warn!(%err, "Cannot listen for Ctrl-C, fetch is not cancellable");
                std::future::pending::<()>().await;
            }
        }
    });
    token
}

fn today_or_next_sunday() -> NaiveDate {
    next_sunday(Utc::now().date_naive())
}

fn api_client<C: Configuration>(configuration: &C) -> ApiClient {
    ApiClient::new(&configuration.api_url())
}

fn public_view<C: Configuration>(configuration: &C) -> CalendarView {
    CalendarView::public(api_client(configuration))
}

fn admin_view<C: Configuration>(configuration: &C) -> CalendarView {
    CalendarView::admin(
        api_client(configuration),
        SessionStore::new(configuration.session_file()),
    )
}
