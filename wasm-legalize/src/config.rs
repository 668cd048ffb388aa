///
/// # Run Configuration
///
/// Optional TOML file describing a pass pipeline. Every key is optional;
/// flags given on the command line override the file.
///
/// ## Example legalize.toml
///
/// ```toml
/// passes = ["legalize-js-interface", "post-emscripten"]
/// threads = 4
/// validate = true
///
/// [arguments]
/// emscripten-sbrk-ptr = "5242880"
/// ```
///

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::passes::PassOptions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub passes: Vec<String>,
    pub threads: Option<usize>,
    pub validate: bool,
    pub arguments: IndexMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            threads: None,
            validate: true,
            arguments: IndexMap::new(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    #[diagnostic(code(config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {reason}")]
    #[diagnostic(code(config::parse), help("see `wasm-legalize run --help` for the accepted keys"))]
    Parse { path: PathBuf, reason: String },

    #[error("invalid pass argument '{0}'")]
    #[diagnostic(code(config::argument), help("arguments are written as KEY=VALUE"))]
    Argument(String),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: err.message().to_string(),
        })
    }

    /// Adds a `KEY=VALUE` argument, replacing an earlier value for `KEY`.
    pub fn set_argument(&mut self, arg: &str) -> Result<(), ConfigError> {
        let (key, value) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| ConfigError::Argument(arg.to_string()))?;
        self.arguments.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn to_options(&self) -> PassOptions {
        PassOptions {
            arguments: self.arguments.clone(),
            threads: self.threads,
            validate: self.validate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
passes = ["post-emscripten", "legalize-js-interface"]
threads = 2
validate = false

[arguments]
emscripten-sbrk-ptr = "1024"
"#,
        )
        .unwrap();

        assert_eq!(config.passes, ["post-emscripten", "legalize-js-interface"]);
        assert_eq!(config.threads, Some(2));
        assert!(!config.validate);

        let options = config.to_options();
        assert_eq!(options.argument("emscripten-sbrk-ptr"), Some("1024"));
        assert_eq!(options.worker_threads(), 2);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::parse("passe = []").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_set_argument() {
        let mut config = Config::default();
        config.set_argument("a=1").unwrap();
        config.set_argument("a=2=3").unwrap();
        assert_eq!(config.arguments["a"], "2=3");
        assert!(config.set_argument("novalue").is_err());
        assert!(config.set_argument("=x").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legalize.toml");
        std::fs::write(&path, "threads = 1\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().threads, Some(1));

        std::fs::write(&path, "threads = \"many\"\n").unwrap();
        match Config::load(&path).unwrap_err() {
            ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));
    }
}
