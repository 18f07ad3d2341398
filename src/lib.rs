//! Search over notated-score (`xml`) and audio-analysis (`audio`) corpora.
//!
//! Request parameters become a backend-neutral [`search::fragment::CompositeQuery`],
//! which is scoped to the enabled corpora from the [`storage::CorpusRegistry`] and
//! run against per-domain tantivy indexes. Educational rules then filter the
//! retrieved page. The `corpus-search` binary wraps this in a small CLI.

pub mod config;
pub mod corpus;
pub mod educational;
pub mod model;
pub mod music;
pub mod search;
pub mod storage;

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use config::EngineConfig;
use corpus::CachedEnablement;
use model::{CorpusDocument, Domain};
use music::MelodicPattern;
use search::facets::{CorpusSummary, TermBucket};
use search::params::SearchParameters;
use search::query::SearchClient;
use search::tantivy::{TantivyCorpusIndex, TantivyIndex, domain_index_dir};
use storage::{CorpusRecord, CorpusRegistry};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "corpus-search",
    version,
    about = "Search notated-score and audio-analysis corpora"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override data dir (indexes + corpus registry)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a search and print the outcome as JSON
    Search {
        /// Search parameters as key=value, e.g. key=G
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Parameters as a URL query string, merged before the key=value pairs
        #[arg(long)]
        query: Option<String>,

        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    /// Fetch documents by id, failing unless all are found
    Compare {
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,

        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    /// Corpus buckets, meters and per-corpus summaries
    Facets {
        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    /// Manage the corpus registry
    Corpora {
        #[command(subcommand)]
        action: CorporaAction,
    },
    /// Add documents from a JSON-lines file to a domain index
    Ingest {
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    /// Convert note names to absolute and relative contours
    Notes {
        #[arg(required = true)]
        notes: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CorporaAction {
    List {
        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    Enable {
        id: String,
        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    Disable {
        id: String,
        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
    },
    Add {
        id: String,
        #[arg(long, value_enum, default_value_t = Domain::Xml)]
        domain: Domain,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        license_url: Option<String>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

pub fn run() -> Result<()> {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> Result<()> {
    let Cli {
        config,
        data_dir,
        command,
    } = cli;
    let load = || load_config(config.as_deref(), data_dir.clone());

    match command {
        Commands::Notes { notes } => {
            let pattern = MelodicPattern::from_notes(&notes.join(" "))?;
            print_json(&pattern)
        }
        Commands::Search {
            params,
            query,
            domain,
        } => {
            let mut parameters = query
                .as_deref()
                .map(SearchParameters::from_query_string)
                .unwrap_or_default();
            for (key, value) in params {
                parameters.insert(key, value);
            }
            let engine = Engine::open(&load()?)?;
            let outcome = engine
                .client
                .search_params(&engine.store, &parameters, domain)
                .context("search failed")?;
            print_json(&outcome)
        }
        Commands::Compare { ids, domain } => {
            let engine = Engine::open(&load()?)?;
            let docs = engine
                .client
                .compare(&engine.store, &ids, domain)
                .context("compare failed")?;
            print_json(&docs)
        }
        Commands::Facets { domain } => {
            let engine = Engine::open(&load()?)?;
            print_json(&engine.facets(domain)?)
        }
        Commands::Corpora { action } => run_corpora(&load()?, action),
        Commands::Ingest { path, domain } => {
            let added = ingest(&load()?.data_dir(), domain, &path)?;
            tracing::info!(domain = %domain, added, path = %path.display(), "ingest_done");
            print_json(&serde_json::json!({ "domain": domain, "added": added }))
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = EngineConfig::load_from(path)?;
            config.apply_env_overrides()?;
            config
        }
        None => EngineConfig::load()?,
    };
    if data_dir.is_some() {
        config.data_dir = data_dir;
    }
    Ok(config)
}

/// The index, the registry behind a TTL cache, and the orchestrator over both.
struct Engine {
    client: SearchClient<TantivyCorpusIndex>,
    store: CachedEnablement<CorpusRegistry>,
}

#[derive(Serialize)]
struct FacetReport {
    domain: Domain,
    corpora: Vec<TermBucket>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    time_signatures: Vec<String>,
    summaries: Vec<CorpusSummary>,
}

impl Engine {
    fn open(config: &EngineConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        let index = TantivyCorpusIndex::open(&data_dir, config.text_search())
            .with_context(|| format!("opening indexes under {}", data_dir.display()))?;
        let registry = CorpusRegistry::open(&config.registry_path())?;
        Ok(Self {
            client: SearchClient::new(index).with_limits(config.page_limits()),
            store: CachedEnablement::new(registry, config.enablement_ttl()),
        })
    }

    fn facets(&self, domain: Domain) -> Result<FacetReport> {
        let time_signatures = match domain {
            Domain::Xml => self.client.time_signatures(&self.store, domain)?,
            Domain::Audio => Vec::new(),
        };
        Ok(FacetReport {
            domain,
            corpora: self.client.corpus_buckets(&self.store, domain)?,
            time_signatures,
            summaries: self.client.corpus_summaries(&self.store, domain)?,
        })
    }
}

fn run_corpora(config: &EngineConfig, action: CorporaAction) -> Result<()> {
    let registry = CorpusRegistry::open(&config.registry_path())?;
    match action {
        CorporaAction::List { domain } => print_json(&registry.list(domain)?),
        CorporaAction::Enable { id, domain } => {
            registry.set_enabled(domain, &id, true)?;
            print_json(&registry.get(domain, &id)?)
        }
        CorporaAction::Disable { id, domain } => {
            registry.set_enabled(domain, &id, false)?;
            print_json(&registry.get(domain, &id)?)
        }
        CorporaAction::Add {
            id,
            domain,
            name,
            description,
            license_url,
        } => {
            let mut record = CorpusRecord::new(id, domain);
            if let Some(name) = name {
                record = record.with_name(name);
            }
            if let Some(description) = description {
                record = record.with_description(description);
            }
            if let Some(url) = license_url {
                record = record.with_license_url(url);
            }
            registry.upsert(&record)?;
            print_json(&record)
        }
    }
}

/// Append one JSON document per line to the domain index. Blank lines are skipped.
pub fn ingest(data_dir: &Path, domain: Domain, path: &Path) -> Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening documents file {}", path.display()))?;
    let mut index = TantivyIndex::open_or_create(&domain_index_dir(data_dir, domain))?;
    let mut added = 0;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: CorpusDocument = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid document", path.display(), line_no + 1))?;
        index.add_document(&doc)?;
        added += 1;
    }
    index.commit()?;
    Ok(added)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "corpus-search", "corpus-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".corpus-search"))
}
