use std::path::PathBuf;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn jwt_secret(&self) -> String;
    fn allowed_origins(&self) -> Vec<String>;
    fn frontend_path(&self) -> PathBuf;
    fn admin_username(&self) -> String;
    fn admin_password(&self) -> Option<String>;
    fn api_url(&self) -> String;
    fn session_file(&self) -> PathBuf;
}
