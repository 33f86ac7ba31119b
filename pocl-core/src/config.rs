use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::{Problem, ProblemFile};
use crate::error::{ConfigError, Result};
use crate::plan::{FlawStrategy, HeuristicKind, PlannerConfig, SearchFlags};

/// Contents of `planner.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub search: SearchSection,
    pub landmarks: LandmarksSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub heuristic: HeuristicKind,
    pub flaw_strategy: FlawStrategy,
    pub early_linking: bool,
    pub duplicate_pruning: bool,
    pub node_limit: Option<usize>,
    pub time_limit_ms: Option<u64>,
    pub verbosity: u8,
    pub max_ground_actions: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        let config = PlannerConfig::default();
        Self {
            heuristic: config.heuristic,
            flaw_strategy: config.flags.flaw_strategy,
            early_linking: config.flags.early_linking,
            duplicate_pruning: config.flags.duplicate_pruning,
            node_limit: config.node_limit,
            time_limit_ms: config.time_limit_ms,
            verbosity: config.verbosity,
            max_ground_actions: config.max_ground_actions,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LandmarksSection {
    /// Landmark dump read when `flaw_strategy = "landmark_layer"`. Relative
    /// paths resolve against the settings file.
    pub path: Option<PathBuf>,
}

impl PlannerSettings {
    pub fn planner_config(&self) -> PlannerConfig {
        let search = &self.search;
        PlannerConfig {
            heuristic: search.heuristic,
            flags: SearchFlags {
                flaw_strategy: search.flaw_strategy,
                early_linking: search.early_linking,
                duplicate_pruning: search.duplicate_pruning,
            },
            node_limit: search.node_limit,
            time_limit_ms: search.time_limit_ms,
            verbosity: search.verbosity,
            max_ground_actions: search.max_ground_actions,
        }
    }
}

pub fn load_planner_settings<P: AsRef<Path>>(path: P) -> Result<PlannerSettings> {
    let path = path.as_ref();
    let mut settings: PlannerSettings = load_toml(path)?;
    let resolved = match (&settings.landmarks.path, path.parent()) {
        (Some(landmarks), Some(base)) if landmarks.is_relative() => Some(base.join(landmarks)),
        _ => None,
    };
    if resolved.is_some() {
        settings.landmarks.path = resolved;
    }
    Ok(settings)
}

pub fn load_problem<P: AsRef<Path>>(path: P) -> Result<Problem> {
    let path = path.as_ref();
    let file: ProblemFile = load_toml(path)?;
    file.build().map_err(|source| ConfigError::Invalid {
        source,
        path: path.to_path_buf(),
    })
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_configs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let settings =
            load_planner_settings(dir.join("configs/planner.toml")).expect("settings should parse");
        assert_eq!(settings.search.heuristic, HeuristicKind::Add);
        assert_eq!(settings.search.flaw_strategy, FlawStrategy::Hardest);
        assert!(settings.search.duplicate_pruning);

        let problem = load_problem(dir.join("problems/shuttle.toml")).expect("problem should parse");
        assert_eq!(problem.domain.name, "shuttle");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("planner.toml");
        std::fs::write(&path, "[search]\nheuristic = \"max\"\n\n[landmarks]\npath = \"lm.txt\"\n").unwrap();
        let settings = load_planner_settings(&path).unwrap();
        let config = settings.planner_config();
        assert_eq!(config.heuristic, HeuristicKind::Max);
        assert_eq!(config.node_limit, PlannerConfig::default().node_limit);
        assert_eq!(settings.landmarks.path, Some(temp.path().join("lm.txt")));
    }

    #[test]
    fn reports_bad_files() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_problem(temp.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));

        let broken = temp.path().join("broken.toml");
        std::fs::write(&broken, "[search\n").unwrap();
        assert!(matches!(load_planner_settings(&broken), Err(ConfigError::Parse { .. })));

        let invalid = temp.path().join("invalid.toml");
        std::fs::write(
            &invalid,
            "[domain]\nname = \"d\"\n\n[problem]\nname = \"p\"\ngoal = \"(missing)\"\n",
        )
        .unwrap();
        assert!(matches!(load_problem(&invalid), Err(ConfigError::Invalid { .. })));
    }
}
