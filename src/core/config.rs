use std::path::Path;

pub const ENV_UNIVERSE_ID: &str = "UNIVERSE_ID";
pub const ENV_ROBLOX_COOKIE: &str = "ROBLOX_COOKIE";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

const DEFAULT_UNIVERSE_ID: &str = "7281007509";

/// Runtime configuration, resolved from environment variables at startup.
#[derive(Clone, Default)]
pub struct Config {
    /// Target universe (experience) identifier on the creator dashboard.
    pub universe_id: String,
    /// `.ROBLOSECURITY` session cookie. Sensitive — never logged, never
    /// returned to clients, and deliberately without a built-in default.
    pub roblox_cookie: String,
}

impl Config {
    /// `UNIVERSE_ID` env var → built-in default. `ROBLOX_COOKIE` env var → empty
    /// (the pipeline reports `MissingCredential` rather than shipping a secret).
    pub fn from_env() -> Self {
        let universe_id = std::env::var(ENV_UNIVERSE_ID)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_UNIVERSE_ID.to_string());
        let roblox_cookie = std::env::var(ENV_ROBLOX_COOKIE)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        Self {
            universe_id,
            roblox_cookie,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.roblox_cookie.is_empty()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("universe_id", &self.universe_id)
            .field("roblox_cookie", &if self.has_credential() { "<redacted>" } else { "<unset>" })
            .finish()
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see
/// `scraping::browser_manager::find_chrome_executable()`). This function only
/// returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
