use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use sqlgen_engine::{
    EngineConfig, InMemoryAuditLog, Parameters, SqlGenerationEngine, TemplateStore, TenantContext,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Generate and validate tenant-scoped SQL from templates
#[derive(Parser)]
#[command(name = "sqlgen")]
#[command(about = "Template-based SQL generation with multi-layer validation")]
struct Args {
    /// Engine configuration file (JSON); SQLGEN_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print audit events after the result
    #[arg(long, global = true)]
    audit: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a statement
    Validate {
        #[arg(long)]
        sql: String,
        /// Parameter values as a JSON object
        #[arg(long)]
        params: Option<String>,
    },
    /// Score a statement and propose a rewrite
    Optimize {
        #[arg(long)]
        sql: String,
    },
    /// Generate from a named template
    Generate {
        /// Directory of template JSON files
        #[arg(long, default_value = "templates")]
        templates: PathBuf,
        #[arg(long)]
        template_id: String,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        params: Option<String>,
    },
    /// Generate from a natural-language question
    Ask {
        #[arg(long, default_value = "templates")]
        templates: PathBuf,
        #[arg(long)]
        tenant: String,
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let audit_log = Arc::new(InMemoryAuditLog::default());
    let mut engine = SqlGenerationEngine::new(config);
    if args.audit {
        engine = engine.with_audit_sink(audit_log.clone());
    }
    let cancel = CancellationToken::new();

    let output = match args.command {
        Command::Validate { sql, params } => {
            let params = parse_params(params.as_deref())?;
            let parameters: Parameters = params.into_iter().collect();
            serde_json::to_value(engine.validate(&sql, Some(&parameters)))?
        }
        Command::Optimize { sql } => serde_json::to_value(engine.optimize(&sql))?,
        Command::Generate {
            templates,
            template_id,
            tenant,
            params,
        } => {
            load_templates(&engine, &templates)?;
            let params = parse_params(params.as_deref())?;
            let result = engine
                .generate_from_template(&template_id, &params, &TenantContext::new(tenant), &cancel)
                .await;
            serde_json::to_value(result)?
        }
        Command::Ask {
            templates,
            tenant,
            question,
        } => {
            load_templates(&engine, &templates)?;
            let result = engine
                .generate_from_query(&question, &TenantContext::new(tenant), &cancel)
                .await;
            serde_json::to_value(result)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    if args.audit {
        println!("{}", serde_json::to_string_pretty(&audit_log.events())?);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn parse_params(raw: Option<&str>) -> Result<Map<String, Value>> {
    match raw {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--params must be JSON")? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("--params must be a JSON object, got {}", other),
        },
        None => Ok(Map::new()),
    }
}

/// Publish every template in `dir` through validation. Rejected templates
/// are reported and skipped.
fn load_templates(engine: &SqlGenerationEngine, dir: &Path) -> Result<()> {
    let templates = TemplateStore::read_dir(dir).with_context(|| format!("reading templates from {}", dir.display()))?;
    let mut accepted = 0;
    for template in templates {
        let id = template.id.clone();
        match engine.add_template(template) {
            Ok(_) => accepted += 1,
            Err(rejected) => warn!(template_id = %id, "Template rejected: {}", rejected.critical_summary()),
        }
    }
    info!(accepted, directory = %dir.display(), "Loaded templates");
    Ok(())
}
