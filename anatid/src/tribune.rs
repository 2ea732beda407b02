use crate::types::{AggregatorError, AuthType, BackendType, Result, Tribune};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use url::Url;

/// Read-only tribune table, keyed by name. Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Tribunes {
    by_name: BTreeMap<String, Tribune>,
}

#[derive(Debug, Deserialize)]
struct TribuneFile {
    tribunes: Vec<Tribune>,
}

impl Tribunes {
    pub fn new(tribunes: Vec<Tribune>) -> Result<Self> {
        let mut by_name = BTreeMap::new();

        for tribune in tribunes {
            Url::parse(&tribune.backend_url)?;
            Url::parse(&tribune.post_url)?;

            if by_name.contains_key(&tribune.name) {
                return Err(AggregatorError::DuplicateTribune { name: tribune.name });
            }
            by_name.insert(tribune.name.clone(), tribune);
        }

        Ok(Self { by_name })
    }

    /// Load `[[tribunes]]` entries from a TOML, JSON or YAML file (format picked by extension).
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: TribuneFile = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        info!("Loaded {} tribunes from {}", file.tribunes.len(), path.display());
        Self::new(file.tribunes)
    }

    /// The boards the service has always relayed.
    pub fn builtin() -> Result<Self> {
        Self::new(vec![
            Tribune::new(
                "euromussels",
                "https://faab.euromussels.eu/data/backend.tsv",
                "https://faab.euromussels.eu/add.php",
            ),
            Tribune::new(
                "sveetch",
                "http://sveetch.net/tribune/remote/tsv/",
                "http://sveetch.net/tribune/post/tsv/?last_id=1",
            )
            .with_post_field("content"),
            Tribune::new(
                "moules",
                "http://moules.org/board/backend/tsv",
                "http://moules.org/board/add.php?backend=tsv",
            ),
            Tribune::new(
                "ototu",
                "https://ototu.euromussels.eu/goboard/backend/tsv",
                "https://ototu.euromussels.eu/goboard/post",
            ),
            Tribune::new(
                "dlfp",
                "https://linuxfr.org/board/index.tsv",
                "https://linuxfr.org/api/v1/board",
            )
            .with_auth_type(AuthType::Bearer),
            Tribune::new(
                "batavie",
                "http://batavie.leguyader.eu/remote.xml",
                "http://batavie.leguyader.eu/index.php/add",
            )
            .with_backend_type(BackendType::Xml),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Tribune> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tribune> {
        self.by_name.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
