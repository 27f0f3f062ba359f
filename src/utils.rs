use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    pub fn app_name(&self) -> &'static str {
        match self {
            Profile::Dev => "goaltrack-dev",
            Profile::Prod => "goaltrack",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "goaltrack-dev" instead of "goaltrack"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "goaltrack", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (where the database lives)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "goaltrack", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<chrono::NaiveDate, chrono::ParseError> {
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Current UTC time in the format stored in `created_at`/`updated_at`
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_dates_only() {
        assert!(parse_date("2026-03-01").is_ok());
        assert!(parse_date("03/01/2026").is_err());
        assert!(parse_date("2026-02-30").is_err());
    }

    #[test]
    fn expand_path_leaves_absolute_paths_alone() {
        assert_eq!(expand_path("/tmp/goals.db"), PathBuf::from("/tmp/goals.db"));
    }

    #[test]
    fn profiles_use_separate_directories() {
        assert_ne!(Profile::Dev.app_name(), Profile::Prod.app_name());
    }
}
