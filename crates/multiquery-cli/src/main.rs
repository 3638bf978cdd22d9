//! Multiquery CLI
//!
//! Loads a JSON graph fixture into the in-memory backend and runs one batched
//! multi-vertex query against it, printing a JSON object keyed by anchor.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use multiquery_core::{
    AnchorResultMap, BatchExecutor, Direction, Edge, ExecutorConfig, GraphFixture, InMemoryGraph,
    MultiVertexQuery, Property, Relation, RelationKind, SchemaKind, SchemaResolver, TypeId, Value,
    VertexId,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod clauses;

#[derive(Parser)]
#[command(name = "multiquery")]
#[command(author, version, about = "Batched adjacency queries over many anchor vertices")]
struct Cli {
    /// Graph fixture (JSON).
    #[arg(long, global = true)]
    graph: Option<PathBuf>,

    /// Executor configuration (JSON). Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query against a set of anchor vertices.
    Query(QueryArgs),
    /// List the labels and keys defined by the graph.
    Schema,
}

#[derive(Args)]
struct QueryArgs {
    /// Anchor vertex ids (repeatable or comma separated).
    #[arg(long = "anchor", required = true, value_delimiter = ',')]
    anchors: Vec<u64>,

    #[arg(long, default_value = "both")]
    direction: Direction,

    /// Restrict to an edge label.
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Restrict to a property key.
    #[arg(long = "key")]
    keys: Vec<String>,

    /// `KEY[:PREDICATE]=VALUE` with PREDICATE one of equal, not_equal,
    /// contains, contains_prefix, contains_regex, prefix, regex.
    #[arg(long = "has")]
    has: Vec<String>,

    /// `KEY=VALUE`: keep relations whose KEY differs from VALUE.
    #[arg(long = "has-not")]
    has_not: Vec<String>,

    #[arg(long = "has-key")]
    has_key: Vec<String>,

    #[arg(long = "has-not-key")]
    has_not_key: Vec<String>,

    /// `KEY=START..END` (start inclusive, end exclusive).
    #[arg(long = "interval")]
    intervals: Vec<String>,

    /// Only edges to this vertex.
    #[arg(long)]
    adjacent: Option<u64>,

    /// `KEY[:asc|desc]`.
    #[arg(long)]
    order: Option<String>,

    /// Maximum results per anchor.
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, value_enum, default_value_t = View::Relations)]
    view: View,

    /// Sort identifier lists (vertex-ids view).
    #[arg(long)]
    sort: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum View {
    Edges,
    Properties,
    Relations,
    Vertices,
    VertexIds,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let graph_path = cli
        .graph
        .as_deref()
        .context("--graph is required")?;
    let graph = Arc::new(load_graph(graph_path)?);

    match cli.command {
        Commands::Schema => cmd_schema(&graph),
        Commands::Query(args) => {
            let config = load_config(cli.config.as_deref())?;
            cmd_query(graph, config, &args)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_graph(path: &Path) -> Result<InMemoryGraph> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read graph fixture {}", path.display()))?;
    let fixture = GraphFixture::from_json_str(&text)
        .with_context(|| format!("invalid graph fixture {}", path.display()))?;
    let graph = InMemoryGraph::from_fixture(&fixture)
        .with_context(|| format!("failed to load graph fixture {}", path.display()))?;
    Ok(graph)
}

fn load_config(path: Option<&Path>) -> Result<ExecutorConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ExecutorConfig::from_json_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ExecutorConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Serialize)]
struct SchemaEntry {
    name: String,
    id: u32,
    kind: &'static str,
}

fn cmd_schema(graph: &InMemoryGraph) -> Result<()> {
    let entries: Vec<SchemaEntry> = graph
        .schema()
        .into_iter()
        .map(|(name, element)| SchemaEntry {
            name,
            id: element.id.raw(),
            kind: match element.kind {
                SchemaKind::EdgeLabel => "edge_label",
                SchemaKind::PropertyKey => "property_key",
            },
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn cmd_query(graph: Arc<InMemoryGraph>, config: ExecutorConfig, args: &QueryArgs) -> Result<()> {
    let executor = BatchExecutor::from_graph(graph.clone(), config);
    let mut query = executor.query();
    configure(&mut query, args)?;

    let names = Names(graph.as_ref());
    let output = match args.view {
        View::Edges => {
            let edges = query.edges()?;
            report_failures(&edges);
            serde_json::to_value(edges.map(|_, edges| {
                edges.iter().map(|e| names.edge(e)).collect::<Vec<_>>()
            }))?
        }
        View::Properties => {
            let properties = query.properties()?;
            report_failures(&properties);
            serde_json::to_value(properties.map(|_, props| {
                props.iter().map(|p| names.property(p)).collect::<Vec<_>>()
            }))?
        }
        View::Relations => {
            let relations = query.relations()?;
            report_failures(&relations);
            serde_json::to_value(relations.map(|_, rels| {
                rels.iter().map(|r| names.relation(r)).collect::<Vec<_>>()
            }))?
        }
        View::Vertices => {
            let vertices = query.vertices()?;
            report_failures(&vertices);
            serde_json::to_value(vertices.map(|_, ids| ids.iter().map(|v| v.raw()).collect::<Vec<_>>()))?
        }
        View::VertexIds => {
            let lists = query.vertex_ids()?;
            report_failures(&lists);
            let sort = args.sort;
            serde_json::to_value(lists.map(|_, mut list| {
                if sort {
                    list.sort();
                }
                list.iter().map(|v| v.raw()).collect::<Vec<_>>()
            }))?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn configure(query: &mut MultiVertexQuery<'_>, args: &QueryArgs) -> Result<()> {
    query.add_all_vertices(args.anchors.iter().copied().map(VertexId::new))?;
    query.direction(args.direction)?;
    if !args.labels.is_empty() {
        query.labels(&args.labels)?;
    }
    if !args.keys.is_empty() {
        query.keys(&args.keys)?;
    }
    for raw in &args.has {
        let has = clauses::parse_has(raw)?;
        query
            .has(has.key, has.predicate, has.value)
            .with_context(|| format!("invalid --has `{raw}`"))?;
    }
    for raw in &args.has_not {
        let has = clauses::parse_has_not(raw)?;
        query
            .has(has.key, has.predicate, has.value)
            .with_context(|| format!("invalid --has-not `{raw}`"))?;
    }
    for key in &args.has_key {
        query.has_key(key)?;
    }
    for key in &args.has_not_key {
        query.has_not_key(key)?;
    }
    for raw in &args.intervals {
        let interval = clauses::parse_interval(raw)?;
        query
            .interval(interval.key, interval.start, interval.end)
            .with_context(|| format!("invalid --interval `{raw}`"))?;
    }
    if let Some(vertex) = args.adjacent {
        query.adjacent(VertexId::new(vertex))?;
    }
    if let Some(raw) = &args.order {
        let (key, order) = clauses::parse_order(raw)?;
        query.order_by(key, order)?;
    }
    if let Some(limit) = args.limit {
        query.limit(limit)?;
    }
    Ok(())
}

fn report_failures<T>(results: &AnchorResultMap<T>) {
    for (anchor, err) in results.failed() {
        tracing::warn!(anchor = %anchor, error = %err, "anchor failed");
    }
}

// ============================================================================
// Output
// ============================================================================

/// Renders schema ids as names.
struct Names<'g>(&'g InMemoryGraph);

#[derive(Serialize)]
struct EdgeOut {
    id: u64,
    label: String,
    direction: Direction,
    other: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct PropertyOut {
    id: u64,
    key: String,
    value: Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Value>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RelationOut {
    Edge(EdgeOut),
    Property(PropertyOut),
}

impl Names<'_> {
    fn name(&self, id: TypeId) -> String {
        self.0.name_of(id).unwrap_or_else(|| id.to_string())
    }

    fn attributes(&self, attributes: &BTreeMap<TypeId, Value>) -> BTreeMap<String, Value> {
        attributes
            .iter()
            .map(|(key, value)| (self.name(*key), value.clone()))
            .collect()
    }

    fn edge(&self, edge: &Edge) -> EdgeOut {
        EdgeOut {
            id: edge.id.raw(),
            label: self.name(edge.label),
            direction: edge.direction,
            other: edge.other.raw(),
            attributes: self.attributes(&edge.attributes),
        }
    }

    fn property(&self, property: &Property) -> PropertyOut {
        PropertyOut {
            id: property.id.raw(),
            key: self.name(property.key),
            value: property.value.clone(),
            attributes: self.attributes(&property.attributes),
        }
    }

    fn relation(&self, relation: &Relation) -> RelationOut {
        match &relation.kind {
            RelationKind::Edge { other } => RelationOut::Edge(EdgeOut {
                id: relation.id.raw(),
                label: self.name(relation.type_id),
                direction: relation.direction,
                other: other.raw(),
                attributes: self.attributes(&relation.attributes),
            }),
            RelationKind::Property { value } => RelationOut::Property(PropertyOut {
                id: relation.id.raw(),
                key: self.name(relation.type_id),
                value: value.clone(),
                attributes: self.attributes(&relation.attributes),
            }),
        }
    }
}
