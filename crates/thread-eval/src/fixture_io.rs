use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::case::EvalCaseFixture;

#[derive(Debug, Error)]
pub enum FixtureIoError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} does not hold the expected JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("case_id {case_id} is used by more than one fixture")]
    DuplicateCase { case_id: String },
}

impl FixtureIoError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Case files live in `<root>/cases`, recorded snapshots in `<root>/goldens`.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl Default for FixtureStore {
    fn default() -> Self {
        Self::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"))
    }
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every case, sorted by `case_id`. Ids must be unique across files.
    pub fn load_cases(&self) -> Result<Vec<EvalCaseFixture>, FixtureIoError> {
        let mut cases = self
            .json_files("cases")?
            .iter()
            .map(|path| read_json::<EvalCaseFixture>(path))
            .collect::<Result<Vec<_>, _>>()?;

        cases.sort_by(|left, right| left.case_id.cmp(&right.case_id));
        if let Some(pair) = cases
            .windows(2)
            .find(|pair| pair[0].case_id == pair[1].case_id)
        {
            return Err(FixtureIoError::DuplicateCase {
                case_id: pair[0].case_id.clone(),
            });
        }
        Ok(cases)
    }

    pub fn golden_path(&self, case_id: &str) -> PathBuf {
        self.root
            .join("goldens")
            .join(format!("{case_id}.golden.json"))
    }

    pub fn read_golden(&self, case_id: &str) -> Result<Value, FixtureIoError> {
        read_json(&self.golden_path(case_id))
    }

    pub fn write_golden<T: Serialize>(&self, case_id: &str, snapshot: &T) -> Result<PathBuf, FixtureIoError> {
        let path = self.golden_path(case_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(FixtureIoError::io(parent))?;
        }

        let mut encoded = serde_json::to_string_pretty(snapshot).map_err(FixtureIoError::json(&path))?;
        encoded.push('\n');
        fs::write(&path, encoded).map_err(FixtureIoError::io(&path))?;
        Ok(path)
    }

    fn json_files(&self, directory: &str) -> Result<Vec<PathBuf>, FixtureIoError> {
        let dir = self.root.join(directory);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(FixtureIoError::io(&dir))? {
            let path = entry.map_err(FixtureIoError::io(&dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureIoError> {
    let raw = fs::read_to_string(path).map_err(FixtureIoError::io(path))?;
    serde_json::from_str(&raw).map_err(FixtureIoError::json(path))
}
