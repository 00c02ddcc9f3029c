use crate::configuration::Configuration;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_JWT_SECRET: &str = "change-me";

#[derive(Parser, Debug, Clone)]
#[command(name = "sunday-slots", version, about = "Sunday slot calendar")]
pub struct ConfigurationHandler {
    /// Port the API listens on
    #[arg(long, env = "PORT", default_value = "5000")]
    port: String,

    /// Postgres connection URL. Slots are kept in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "JWT_SECRET", default_value = DEFAULT_JWT_SECRET, hide_env_values = true)]
    jwt_secret: String,

    /// Origins allowed by CORS, comma separated. Any origin when empty
    #[arg(long = "allowed-origin", env = "FRONTEND_URL", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    #[arg(long, env = "FRONTEND_PATH", default_value = "frontend/index.html")]
    frontend_path: PathBuf,

    /// Admin account (re)created when the server starts
    #[arg(long, env = "ADMIN_USERNAME", default_value = "admin")]
    admin_username: String,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Base URL used by the client commands
    #[arg(long, env = "API_URL", default_value = "http://localhost:5000")]
    api_url: String,

    #[arg(long, env = "SESSION_FILE", default_value = ".sunday-slots-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create or replace an admin account in the configured database
    CreateAdmin {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and store the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the slots of the week containing DATE (next Sunday when omitted)
    Week {
        date: Option<String>,
        /// Fetch with the stored admin session
        #[arg(long)]
        admin: bool,
    },
    /// List the next visible Sundays with their titles
    Upcoming {
        #[arg(long, default_value_t = 8)]
        count: usize,
    },
    /// Flip the availability of a slot
    Toggle { id: Uuid },
    /// Set the title of a date
    Title { date: String, title: String },
    /// Hide a date from the calendar
    Hide { date: String },
    /// Make a hidden date visible again
    Restore { date: String },
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        let configuration = Self::parse();
        if configuration.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT_SECRET not set, using the built-in development secret");
        }
        configuration
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone().filter(|url| !url.is_empty())
    }

    fn jwt_secret(&self) -> String {
        self.jwt_secret.clone()
    }

    fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    fn frontend_path(&self) -> PathBuf {
        self.frontend_path.clone()
    }

    fn admin_username(&self) -> String {
        self.admin_username.clone()
    }

    fn admin_password(&self) -> Option<String> {
        self.admin_password
            .clone()
            .filter(|password| !password.is_empty())
    }

    fn api_url(&self) -> String {
        self.api_url.trim_end_matches('/').to_string()
    }

    fn session_file(&self) -> PathBuf {
        self.session_file.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let configuration = ConfigurationHandler::parse_from(["sunday-slots", "--port", "8080"]);
        assert_eq!(configuration.command(), Command::Serve);
        assert_eq!(configuration.port(), "8080");
    }

    #[test]
    fn test_parse_client_command() {
        let configuration = ConfigurationHandler::parse_from([
            "sunday-slots",
            "--api-url",
            "http://example.org/",
            "--allowed-origin",
            "http://a.example, http://b.example",
            "week",
            "2024-06-09",
            "--admin",
        ]);
        assert_eq!(
            configuration.command(),
            Command::Week {
                date: Some("2024-06-09".into()),
                admin: true
            }
        );
        assert_eq!(configuration.api_url(), "http://example.org");
        assert_eq!(
            configuration.allowed_origins(),
            vec!["http://a.example", "http://b.example"]
        );
    }

    #[test]
    fn test_admin_account_settings() {
        let configuration = ConfigurationHandler::parse_from([
            "sunday-slots",
            "--admin-username",
            "root",
            "--admin-password",
            "secret",
        ]);
        assert_eq!(configuration.admin_username(), "root");
        assert_eq!(configuration.admin_password().as_deref(), Some("secret"));

        let configuration =
            ConfigurationHandler::parse_from(["sunday-slots", "--admin-password", ""]);
        assert_eq!(configuration.admin_username(), "admin");
        assert_eq!(configuration.admin_password(), None);
    }
}
