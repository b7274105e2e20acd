//! Survey definition loading and config file resolution
//!
//! One survey definition per deployment, read from a TOML file. Every field
//! has a default so a missing file still yields a runnable single-image survey.

use crate::judgment::JudgmentKind;
use crate::summary::MatchReference;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the survey definition file
pub const CONFIG_ENV_VAR: &str = "PSV_CONFIG";

/// How stimulus files are grouped into items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    /// Every recognized file is its own item
    Single,
    /// `<base><gt marker>.<ext>` is paired with `<base><candidate marker>.<ext>`
    Pair,
}

/// Stimulus storage settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub image_dir: PathBuf,
    pub mode: CatalogMode,
    pub ground_truth_marker: String,
    pub candidate_marker: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            mode: CatalogMode::Single,
            ground_truth_marker: "_gt".to_string(),
            candidate_marker: "_result".to_string(),
        }
    }
}

/// Name of the judgment a participant gives per item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentKindName {
    Score,
    ForcedChoice,
}

/// Judgment settings, including the strings the UI shows around the control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentConfig {
    pub kind: JudgmentKindName,
    pub min: i64,
    pub max: i64,
    /// Initial slider position
    pub default: i64,
    pub low_label: String,
    pub high_label: String,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            kind: JudgmentKindName::Score,
            min: 0,
            max: 100,
            default: 50,
            low_label: "Hazy".to_string(),
            high_label: "Clear".to_string(),
        }
    }
}

impl JudgmentConfig {
    /// Judgment kind with its validation parameters
    pub fn judgment_kind(&self) -> JudgmentKind {
        match self.kind {
            JudgmentKindName::Score => JudgmentKind::Score {
                min: self.min,
                max: self.max,
            },
            JudgmentKindName::ForcedChoice => JudgmentKind::ForcedChoice,
        }
    }
}

/// Summary scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub reference: MatchReference,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reference: MatchReference::ScoreAtLeast(50),
        }
    }
}

/// Response log backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Csv,
    Sqlite,
}

/// Response log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Csv,
            path: PathBuf::from("ratings.csv"),
        }
    }
}

/// Left/right placement settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Fixed seed for reproducible placements; `None` draws from the OS RNG
    pub seed: Option<u64>,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Complete survey definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub title: String,
    pub prompt: String,
    pub catalog: CatalogConfig,
    pub judgment: JudgmentConfig,
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub pairing: PairingConfig,
    pub server: ServerConfig,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            title: "Image Quality Survey".to_string(),
            prompt: "How clear is this image?".to_string(),
            catalog: CatalogConfig::default(),
            judgment: JudgmentConfig::default(),
            scoring: ScoringConfig::default(),
            store: StoreConfig::default(),
            pairing: PairingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Where the survey definition was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Named on the command line or in the environment (must exist)
    pub explicit: bool,
}

/// Config file resolution, first hit wins:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `<user config dir>/psv/survey.toml`
///
/// Returns `None` when the platform has no config directory; compiled
/// defaults apply in that case.
pub fn resolve_config_location(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Option<ConfigLocation> {
    if let Some(path) = cli_arg {
        return Some(ConfigLocation {
            path: path.to_path_buf(),
            explicit: true,
        });
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(ConfigLocation {
                path: PathBuf::from(path),
                explicit: true,
            });
        }
    }

    dirs::config_dir().map(|d| ConfigLocation {
        path: d.join("psv").join("survey.toml"),
        explicit: false,
    })
}

impl SurveyConfig {
    /// Load the survey definition
    ///
    /// A missing file at the default location logs a warning and falls back
    /// to defaults. A file named explicitly must exist and parse.
    pub fn load(location: Option<&ConfigLocation>) -> Result<Self> {
        let Some(location) = location else {
            info!("No config directory available, using compiled defaults");
            return Self::default().validated();
        };

        if !location.path.exists() {
            if location.explicit {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    location.path.display()
                )));
            }
            warn!(
                "Config file {} not found, using compiled defaults",
                location.path.display()
            );
            return Self::default().validated();
        }

        let content = std::fs::read_to_string(&location.path).map_err(|e| {
            Error::Config(format!(
                "Failed to read {}: {}",
                location.path.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded survey definition from {}", location.path.display());
        Ok(config)
    }

    /// Parse and validate a survey definition
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SurveyConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid survey definition: {}", e)))?;
        config.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let j = &self.judgment;
        if j.kind == JudgmentKindName::Score {
            if j.min >= j.max {
                return Err(Error::Config(format!(
                    "judgment.min ({}) must be less than judgment.max ({})",
                    j.min, j.max
                )));
            }
            if j.default < j.min || j.default > j.max {
                return Err(Error::Config(format!(
                    "judgment.default ({}) outside {}..={}",
                    j.default, j.min, j.max
                )));
            }
        }

        let c = &self.catalog;
        if c.ground_truth_marker.is_empty() || c.candidate_marker.is_empty() {
            return Err(Error::Config("catalog markers must not be empty".to_string()));
        }
        if c.ground_truth_marker.ends_with(&c.candidate_marker)
            || c.candidate_marker.ends_with(&c.ground_truth_marker)
        {
            return Err(Error::Config(format!(
                "catalog markers '{}' and '{}' must differ and neither may end with the other",
                c.ground_truth_marker, c.candidate_marker
            )));
        }

        if j.kind == JudgmentKindName::ForcedChoice && c.mode != CatalogMode::Pair {
            return Err(Error::Config(
                "forced_choice judgments require catalog.mode = \"pair\"".to_string(),
            ));
        }

        match (&self.scoring.reference, j.kind) {
            (MatchReference::GroundTruth | MatchReference::Candidate, JudgmentKindName::Score) => {
                Err(Error::Config(
                    "ground_truth/candidate references require forced_choice judgments"
                        .to_string(),
                ))
            }
            (MatchReference::ScoreAtLeast(_), JudgmentKindName::ForcedChoice) => Err(
                Error::Config("score_at_least reference requires score judgments".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
