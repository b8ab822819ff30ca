use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use navexpand::{
    config::{ConfigOverrides, ExpansionConfig},
    entity_catalog::load_entity_model,
    query_planner::{self, analyzer::navigation_expansion::NavigationExpansionResult},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Indented operator tree followed by the source mappings
    Tree,
    /// The whole expansion result as JSON
    Json,
}

/// navexpand - rewrites relationship navigations in a query into joins
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entity model definition (YAML)
    #[arg(long)]
    model: PathBuf,

    /// Query operator tree (JSON)
    #[arg(long)]
    query: PathBuf,

    /// Expansion configuration (YAML); defaults to NAVEXPAND_* variables
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Tree)]
    format: OutputFormat,

    /// Longest relationship chain a navigation may walk
    #[arg(long)]
    max_navigation_depth: Option<u32>,

    /// Deepest operator nesting
    #[arg(long)]
    max_operator_depth: Option<u32>,

    /// Keep string-path Include hints as they are
    #[arg(long)]
    no_string_includes: bool,

    /// Log every rewrite step
    #[arg(short, long)]
    verbose: bool,
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        ConfigOverrides {
            max_navigation_depth: cli.max_navigation_depth,
            max_operator_depth: cli.max_operator_depth,
            no_string_includes: cli.no_string_includes,
        }
    }
}

fn render_tree(result: &NavigationExpansionResult) -> String {
    let mut out = result.plan.to_string();
    out.push_str(&format!("element type: {}\n", result.element_type));
    if let Some(reducer) = result.cardinality_reducer {
        out.push_str(&format!("reducer: {}\n", reducer));
    }
    if let Some(chain) = &result.include_chain {
        out.push_str(&format!("include chain: {}\n", chain.join(".")));
    }
    for mapping in &result.source_mappings {
        out.push_str(&format!("mapping {}\n", mapping.root_entity));
        for node in &mapping.nodes {
            let name = if node.relationship_path.is_empty() {
                "<root>".to_string()
            } else {
                node.relationship_path.join(".")
            };
            out.push_str(&format!(
                "  {} {:?} optional={} to_path=[{}]\n",
                name,
                node.status,
                node.optional,
                node.to_path.join(".")
            ));
        }
    }
    out
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Defaults to INFO level, can be overridden with RUST_LOG env var
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = match &cli.config {
        Some(path) => ExpansionConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ExpansionConfig::from_env().context("reading configuration from environment")?,
    };
    config
        .merge(ConfigOverrides::from(&cli))
        .context("applying command-line overrides")?;

    let model = load_entity_model(&cli.model)
        .with_context(|| format!("loading entity model from {}", cli.model.display()))?;
    let query = query_planner::load_query(&cli.query)?;
    log::info!(
        "navexpand v{}: expanding {} over model '{}'",
        env!("CARGO_PKG_VERSION"),
        cli.query.display(),
        model.name
    );

    let result = query_planner::expand_navigations(query, &model, &config)?;
    match cli.format {
        OutputFormat::Tree => print!("{}", render_tree(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}
