use std::env;
use std::path::PathBuf;
use super::Config;

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
const MODEL_ENV: &str = "GEMINI_MODEL";
const REPORTS_DIR_ENV: &str = "REPORTS_DIR";

/// Settings read from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Value of `GEMINI_API_KEY`
    pub api_key: Option<String>,
    /// Value of `GEMINI_MODEL`
    pub model: Option<String>,
    /// Value of `REPORTS_DIR`
    pub reports_dir: Option<PathBuf>,
}

impl EnvOverrides {
    /// Reads the overrides from the environment, ignoring blank values
    pub fn from_env() -> Self {
        Self {
            api_key: non_blank(API_KEY_ENV),
            model: non_blank(MODEL_ENV),
            reports_dir: non_blank(REPORTS_DIR_ENV).map(PathBuf::from),
        }
    }

    /// Applies every present override to the configuration
    pub fn apply(self, config: &mut Config) {
        if let Some(key) = self.api_key {
            config.gemini.api_key = Some(key);
        }
        if let Some(model) = self.model {
            config.gemini.model = model;
        }
        if let Some(dir) = self.reports_dir {
            config.output_dir = dir;
        }
    }
}

/// Picks the API key: explicit value first, then the configuration
///
/// Blank strings count as missing so an empty form field falls through.
pub fn resolve_api_key(explicit: Option<&str>, config: &Config) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| {
            config
                .gemini
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
        })
}

fn non_blank(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::new(PathBuf::from("reports"));
        EnvOverrides {
            api_key: Some("key-from-env".into()),
            model: Some("gemini-1.5-pro".into()),
            reports_dir: Some(PathBuf::from("/tmp/out")),
        }
        .apply(&mut config);

        assert_eq!(config.gemini.api_key.as_deref(), Some("key-from-env"));
        assert_eq!(config.gemini.model, "gemini-1.5-pro");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_resolve_api_key_prefers_explicit() {
        let mut config = Config::new(PathBuf::from("reports"));
        config.gemini.api_key = Some("configured".into());

        assert_eq!(resolve_api_key(Some("explicit"), &config).as_deref(), Some("explicit"));
        assert_eq!(resolve_api_key(Some("   "), &config).as_deref(), Some("configured"));
        assert_eq!(resolve_api_key(None, &config).as_deref(), Some("configured"));

        config.gemini.api_key = None;
        assert_eq!(resolve_api_key(None, &config), None);
    }
}
