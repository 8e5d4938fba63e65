use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use vicinity_core::{Coordinate, CoordinateProvider, ProviderError};

use crate::error::{FetchError, Result};

/// In-memory provider. Nodes can be listed without a coordinate, made to
/// fail or made slow, which is how fetch behaviour is exercised.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    names: Vec<String>,
    coords: HashMap<String, Coordinate>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    list_error: Option<String>,
}

impl StaticProvider {
    pub fn new(coords: Vec<Coordinate>) -> Self {
        let mut provider = Self::default();
        for c in coords {
            provider.names.push(c.name.clone());
            provider.coords.insert(c.name.clone(), c);
        }
        provider
    }

    /// Lists `name` without ever returning a coordinate for it.
    pub fn with_missing(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_failure(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name.clone());
        }
        self.failures.insert(name, message.into());
        self
    }

    pub fn with_delay(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(name.into(), delay);
        self
    }

    pub fn with_list_error(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(message.into());
        self
    }
}

impl CoordinateProvider for StaticProvider {
    fn list_nodes(&self) -> std::result::Result<Vec<String>, ProviderError> {
        match &self.list_error {
            Some(msg) => Err(ProviderError::new(msg.clone())),
            None => Ok(self.names.clone()),
        }
    }

    fn get_coordinate(&self, name: &str) -> std::result::Result<Option<Coordinate>, ProviderError> {
        if let Some(delay) = self.delays.get(name) {
            thread::sleep(*delay);
        }
        if let Some(msg) = self.failures.get(name) {
            return Err(ProviderError::new(msg.clone()));
        }
        Ok(self.coords.get(name).cloned())
    }
}

/// Coordinates read from a file with one JSON object per line.
#[derive(Debug, Clone, Default)]
pub struct JsonlProvider {
    inner: StaticProvider,
    malformed: usize,
    duplicates: usize,
}

impl JsonlProvider {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let read_err = |source| FetchError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;
        let reader = BufReader::new(file);

        let mut coords: Vec<Coordinate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut malformed = 0usize;
        let mut duplicates = 0usize;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(read_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Coordinate>(&line) {
                Ok(c) => {
                    if !seen.insert(c.name.clone()) {
                        tracing::warn!(
                            line = lineno + 1,
                            node = %c.name,
                            "duplicate node, keeping first"
                        );
                        duplicates += 1;
                        continue;
                    }
                    coords.push(c);
                }
                Err(err) => {
                    tracing::warn!(
                        line = lineno + 1,
                        error = %err,
                        "skipping malformed coordinate line"
                    );
                    malformed += 1;
                }
            }
        }
        tracing::info!(
            path = %path.display(),
            nodes = coords.len(),
            malformed,
            duplicates,
            "loaded coordinates"
        );
        Ok(Self {
            inner: StaticProvider::new(coords),
            malformed,
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.names.is_empty()
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

impl CoordinateProvider for JsonlProvider {
    fn list_nodes(&self) -> std::result::Result<Vec<String>, ProviderError> {
        self.inner.list_nodes()
    }

    fn get_coordinate(&self, name: &str) -> std::result::Result<Option<Coordinate>, ProviderError> {
        self.inner.get_coordinate(name)
    }
}
