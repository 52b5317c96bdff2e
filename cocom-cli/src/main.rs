#![deny(missing_docs)]
//! Cocom command-line interface.
//!
//! Flattens raw Cocom analyses into an enriched index and runs the studies
//! that derive the repository evolution series from it.

use clap::{Args, Parser, Subcommand};
use cocom_core::study::{DEFAULT_DATE_FIELD, DEFAULT_STUDY_INDEX};
use cocom_core::{
    CocomEnricher, DocumentStore, EnricherConfig, MAX_SIZE_BULK_ENRICHED_ITEMS, ProjectMap,
    Study, StudyParams, UploadSummary, build_studies,
};
use cocom_elastic::config::DEFAULT_URL;
#[cfg(not(test))]
use cocom_elastic::{ElasticConfig, ElasticStore};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Field raw documents are fetched in order of.
const RAW_SORT_FIELD: &str = "metadata__timestamp";

#[derive(Parser)]
#[command(name = "cocom", version, about = "Cocom enrichment CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ElasticArgs {
    /// Elasticsearch URL, credentials included if needed.
    #[arg(long = "es-url", env = "COCOM_ES_URL", default_value = DEFAULT_URL)]
    es_url: String,
}

#[derive(Args, Clone)]
struct IndexArgs {
    /// Index holding the raw Cocom events.
    #[arg(long, env = "COCOM_RAW_INDEX", default_value = "cocom_raw")]
    raw_index: String,
    /// Index receiving the flat per-file records.
    #[arg(long, env = "COCOM_ENRICH_INDEX", default_value = "cocom_enrich")]
    enrich_index: String,
}

#[derive(Args, Clone)]
struct EnrichArgs {
    /// Records buffered before each bulk upload.
    #[arg(long, env = "COCOM_BULK_SIZE", default_value_t = MAX_SIZE_BULK_ENRICHED_ITEMS)]
    bulk_size: usize,
    /// Labels attached to every record (repeatable or comma-separated).
    #[arg(long = "repository-label", value_delimiter = ',')]
    repository_labels: Vec<String>,
    /// Raw filter the repository was collected with.
    #[arg(long)]
    filter_raw: Option<String>,
    /// JSON projects file mapping repositories to projects.
    #[arg(long, env = "COCOM_PROJECTS_JSON")]
    projects_json: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct StudyArgs {
    /// Study IDs to run (repeatable or comma-separated).
    #[arg(long = "study", value_delimiter = ',')]
    studies: Vec<String>,
    /// Index receiving the study output.
    #[arg(long, env = "COCOM_STUDY_INDEX", default_value = DEFAULT_STUDY_INDEX)]
    out_index: String,
    /// Recompute the study from scratch.
    #[arg(long)]
    no_incremental: bool,
    /// Date field of the study output.
    #[arg(long, default_value = DEFAULT_DATE_FIELD)]
    date_field: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten raw events into the enriched index.
    Enrich {
        #[command(flatten)]
        elastic: ElasticArgs,
        #[command(flatten)]
        indexes: IndexArgs,
        #[command(flatten)]
        enrich: EnrichArgs,
    },
    /// Run studies over the enriched index.
    Study {
        #[command(flatten)]
        elastic: ElasticArgs,
        #[command(flatten)]
        indexes: IndexArgs,
        #[command(flatten)]
        study: StudyArgs,
    },
    /// Enrich, then run studies.
    Run {
        #[command(flatten)]
        elastic: ElasticArgs,
        #[command(flatten)]
        indexes: IndexArgs,
        #[command(flatten)]
        enrich: EnrichArgs,
        #[command(flatten)]
        study: StudyArgs,
    },
}

#[cfg(not(test))]
fn main() -> CliResult<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let lines = execute(cli.command, open_elastic)?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
fn main() {}

#[cfg(not(test))]
fn open_elastic(
    elastic: &ElasticArgs,
    index: &str,
    sort_field: Option<&str>,
) -> Box<dyn DocumentStore> {
    let mut config = ElasticConfig::from_env();
    config.url = elastic.es_url.clone();
    if let Some(field) = sort_field {
        config = config.with_sort_field(field);
    }
    Box::new(ElasticStore::new(config, index))
}

/// Run a command against stores produced by `open_store`.
///
/// Returns one summary line per completed step.
fn execute<F>(command: Commands, open_store: F) -> CliResult<Vec<String>>
where
    F: Fn(&ElasticArgs, &str, Option<&str>) -> Box<dyn DocumentStore>,
{
    let mut lines = Vec::new();
    match command {
        Commands::Enrich {
            elastic,
            indexes,
            enrich,
        } => {
            let enricher = build_enricher(&enrich)?;
            let ocean = open_store(&elastic, &indexes.raw_index, Some(RAW_SORT_FIELD));
            let target = open_store(&elastic, &indexes.enrich_index, None);
            let summary = enricher.enrich_items(ocean.as_ref(), target.as_ref())?;
            lines.push(render_summary("enrich", &summary));
        }
        Commands::Study {
            elastic,
            indexes,
            study,
        } => {
            let enricher = CocomEnricher::default();
            let ocean = open_store(&elastic, &indexes.raw_index, Some(RAW_SORT_FIELD));
            let target = open_store(&elastic, &indexes.enrich_index, None);
            for (id, summary) in run_studies(&enricher, &study, ocean.as_ref(), target.as_ref())? {
                lines.push(render_summary(&id, &summary));
            }
        }
        Commands::Run {
            elastic,
            indexes,
            enrich,
            study,
        } => {
            let enricher = build_enricher(&enrich)?;
            let ocean = open_store(&elastic, &indexes.raw_index, Some(RAW_SORT_FIELD));
            let target = open_store(&elastic, &indexes.enrich_index, None);
            let summary = enricher.enrich_items(ocean.as_ref(), target.as_ref())?;
            lines.push(render_summary("enrich", &summary));
            for (id, summary) in run_studies(&enricher, &study, ocean.as_ref(), target.as_ref())? {
                lines.push(render_summary(&id, &summary));
            }
        }
    }
    Ok(lines)
}

fn build_enricher(args: &EnrichArgs) -> CliResult<CocomEnricher> {
    if args.bulk_size == 0 {
        return Err("bulk size must be greater than zero".into());
    }
    let mut config = EnricherConfig {
        bulk_size: args.bulk_size,
        ..EnricherConfig::default()
    }
    .with_repository_labels(args.repository_labels.iter().map(String::as_str));
    config.filter_raw = args
        .filter_raw
        .as_ref()
        .map(|filter| filter.trim().to_string())
        .filter(|filter| !filter.is_empty());

    let enricher = CocomEnricher::new(config);
    match &args.projects_json {
        Some(path) => {
            let projects = ProjectMap::load(path)?;
            info!("loaded projects from {}", path.display());
            Ok(enricher.with_projects(projects))
        }
        None => Ok(enricher),
    }
}

fn resolve_studies(
    enricher: &CocomEnricher,
    ids: &[String],
) -> CliResult<Vec<Arc<dyn Study + Send + Sync>>> {
    if ids.is_empty() {
        return Ok(enricher.studies());
    }
    Ok(build_studies(ids)?)
}

fn run_studies(
    enricher: &CocomEnricher,
    args: &StudyArgs,
    ocean: &dyn DocumentStore,
    enrich: &dyn DocumentStore,
) -> CliResult<Vec<(String, UploadSummary)>> {
    let params = StudyParams {
        no_incremental: args.no_incremental,
        out_index: args.out_index.clone(),
        date_field: args.date_field.clone(),
    };
    let mut results = Vec::new();
    for study in resolve_studies(enricher, &args.studies)? {
        let summary = study.run(enricher, ocean, enrich, &params)?;
        results.push((study.id().to_string(), summary));
    }
    Ok(results)
}

fn render_summary(label: &str, summary: &UploadSummary) -> String {
    if summary.is_complete() {
        format!("{label}: {} items written", summary.inserted)
    } else {
        format!(
            "{label}: {}/{} items written ({} missing)",
            summary.inserted,
            summary.submitted,
            summary.missing()
        )
    }
}
