use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub sources: Option<SourcesConfig>,
    pub matching: Option<MatchingConfig>,
    pub output: Option<OutputConfig>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub s2_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub disabled: Option<Vec<String>>,
    pub crossref_max_results: Option<usize>,
    pub crossref_from_date: Option<String>,
    pub scholar_max_publications: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub doi_threshold: Option<f64>,
    pub title_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub snapshot_path: Option<String>,
    pub crawled_csv_path: Option<String>,
    pub missing_bib_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub num_workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/bibsync/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bibsync").join("config.toml"))
}

/// Load config by cascading CWD `.bibsync.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".bibsync.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Pick `field` from the overlay section, falling back to the base section.
fn pick<S, T: Clone>(
    base: &Option<S>,
    overlay: &Option<S>,
    field: impl Fn(&S) -> &Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(|s| field(s).clone())
        .or_else(|| base.as_ref().and_then(|s| field(s).clone()))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (b, o) = (&base, &overlay);
    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            s2_api_key: pick(&b.api_keys, &o.api_keys, |a| &a.s2_api_key),
            crossref_mailto: pick(&b.api_keys, &o.api_keys, |a| &a.crossref_mailto),
        }),
        sources: Some(SourcesConfig {
            disabled: pick(&b.sources, &o.sources, |s| &s.disabled),
            crossref_max_results: pick(&b.sources, &o.sources, |s| &s.crossref_max_results),
            crossref_from_date: pick(&b.sources, &o.sources, |s| &s.crossref_from_date),
            scholar_max_publications: pick(&b.sources, &o.sources, |s| {
                &s.scholar_max_publications
            }),
        }),
        matching: Some(MatchingConfig {
            doi_threshold: pick(&b.matching, &o.matching, |m| &m.doi_threshold),
            title_threshold: pick(&b.matching, &o.matching, |m| &m.title_threshold),
        }),
        output: Some(OutputConfig {
            snapshot_path: pick(&b.output, &o.output, |p| &p.snapshot_path),
            crawled_csv_path: pick(&b.output, &o.output, |p| &p.crawled_csv_path),
            missing_bib_path: pick(&b.output, &o.output, |p| &p.missing_bib_path),
        }),
        network: Some(NetworkConfig {
            timeout_secs: pick(&b.network, &o.network, |n| &n.timeout_secs),
            max_retries: pick(&b.network, &o.network, |n| &n.max_retries),
            num_workers: pick(&b.network, &o.network, |n| &n.num_workers),
        }),
    }
}

impl ConfigFile {
    /// Copy every value present in the file onto `config`.
    ///
    /// Callers apply environment variables and CLI flags afterwards so those
    /// take precedence, then call [`Config::refresh_rate_limiters`].
    pub fn apply(&self, config: &mut Config) {
        if let Some(keys) = &self.api_keys {
            if let Some(k) = &keys.s2_api_key {
                config.s2_api_key = Some(k.clone());
            }
            if let Some(m) = &keys.crossref_mailto {
                config.crossref_mailto = Some(m.clone());
            }
        }
        if let Some(sources) = &self.sources {
            if let Some(d) = &sources.disabled {
                config.disabled_sources = d.clone();
            }
            if let Some(n) = sources.crossref_max_results {
                config.crossref_max_results = n;
            }
            if let Some(d) = &sources.crossref_from_date {
                config.crossref_from_date = d.clone();
            }
            if let Some(n) = sources.scholar_max_publications {
                config.scholar_max_publications = n;
            }
        }
        if let Some(matching) = &self.matching {
            if let Some(t) = matching.doi_threshold {
                config.thresholds.doi = t;
            }
            if let Some(t) = matching.title_threshold {
                config.thresholds.title = t;
            }
        }
        if let Some(output) = &self.output {
            if let Some(p) = &output.snapshot_path {
                config.snapshot_path = Some(PathBuf::from(p));
            }
            if let Some(p) = &output.crawled_csv_path {
                config.crawled_csv_path = Some(PathBuf::from(p));
            }
        }
        if let Some(network) = &self.network {
            if let Some(t) = network.timeout_secs {
                config.timeout_secs = t;
            }
            if let Some(r) = network.max_retries {
                config.max_retries = r;
            }
            if let Some(w) = network.num_workers {
                config.num_workers = w;
            }
        }
    }

    pub fn missing_bib_path(&self) -> Option<PathBuf> {
        self.output
            .as_ref()
            .and_then(|o| o.missing_bib_path.as_ref())
            .map(PathBuf::from)
    }
}
