//! Command implementations.

use anyhow::Context;
use clap::{ArgGroup, Args, Subcommand};
use ring_layout::{
    Algorithm, CapacityAnnotator, Explanation, ExplanationResolver, KeyId, KeyRendering, Layout,
    LayoutConfig, NodeId, RingLayout, RingState,
};
use ring_session::http::DEFAULT_BASE_URL;
use ring_session::stats::ComparisonRow;
use ring_session::wire::decode_state;
use ring_session::{
    AssignmentService, HttpService, LocalService, Operation, Session, StatsSummary,
};
use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of running a command.
pub type CommandResult = anyhow::Result<()>;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lay out a saved service state.
    Layout(LayoutArgs),
    /// Explain why a node or key sits where it does.
    Explain(ExplainArgs),
    /// Drive the in-process service and show the result.
    Demo(DemoArgs),
    /// Fetch the current state from a running service.
    Fetch(FetchArgs),
    /// Run one operation under every algorithm and compare churn.
    Compare(CompareArgs),
}

#[derive(Debug, Args)]
pub struct LayoutArgs {
    /// State JSON file, or `-` for stdin.
    #[arg(long)]
    pub state: PathBuf,
    /// Print the full layout as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["node", "key"])))]
pub struct ExplainArgs {
    /// State JSON file, or `-` for stdin.
    #[arg(long)]
    pub state: PathBuf,
    #[arg(long)]
    pub node: Option<String>,
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "3")]
    pub nodes: usize,
    #[arg(long, default_value = "50")]
    pub keys: usize,
    /// ring, jump, maglev or chbl.
    #[arg(long, default_value = "ring")]
    pub algorithm: Algorithm,
    /// Add one node after startup.
    #[arg(long)]
    pub add_node: bool,
    /// Remove this node after startup.
    #[arg(long)]
    pub remove_node: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub url: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// add-node, remove-node or regenerate-keys.
    #[arg(long)]
    pub operation: Operation,
    /// Node to remove, for remove-node.
    #[arg(long)]
    pub node: Option<String>,
    #[arg(long, default_value = DEFAULT_BASE_URL, conflicts_with = "local")]
    pub url: String,
    /// Compare against a fresh in-process service instead.
    #[arg(long)]
    pub local: bool,
    #[arg(long)]
    pub json: bool,
}

/// Runs one command with the given layout config.
pub async fn execute(command: Command, config: LayoutConfig) -> CommandResult {
    let engine = RingLayout::new(config);
    match command {
        Command::Layout(args) => layout(args, &engine),
        Command::Explain(args) => explain(args, &engine),
        Command::Demo(args) => demo(args, engine).await,
        Command::Fetch(args) => fetch(args, engine).await,
        Command::Compare(args) => compare(args).await,
    }
}

fn layout(args: LayoutArgs, engine: &RingLayout) -> CommandResult {
    let (state, summary) = read_state(&args.state)?;
    let layout = engine.compute(&state);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    } else {
        print!("{}", render_layout(&layout));
        if let Some(summary) = summary {
            print!("{}", summary);
        }
    }
    Ok(())
}

fn explain(args: ExplainArgs, engine: &RingLayout) -> CommandResult {
    let (state, _) = read_state(&args.state)?;
    let explanation = match (&args.node, &args.key) {
        (Some(node), _) => {
            let node = NodeId::from(node.as_str());
            if state.slot_of(node.as_str()).is_none() {
                anyhow::bail!("node {} is not part of this state", node);
            }
            ExplanationResolver::explain_node(&state, &node)
        }
        (None, Some(key)) => {
            let key = KeyId::from(key.as_str());
            if !state.keys().contains(&key) {
                anyhow::bail!("key {} is not part of this state", key);
            }
            let capacity = if CapacityAnnotator::engages(&state) {
                let layout = engine.compute(&state);
                state
                    .assigned_node(&key)
                    .and_then(|owner| layout.capacity_for(owner).cloned())
            } else {
                None
            };
            ExplanationResolver::explain_key(&state, &key, capacity.as_ref())
        }
        (None, None) => anyhow::bail!("either --node or --key is required"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    } else {
        print!("{}", render_explanation(&explanation));
    }
    Ok(())
}

async fn demo(args: DemoArgs, engine: RingLayout) -> CommandResult {
    let session = Session::new(LocalService::with_size(args.nodes, args.keys), engine);
    session.refresh().await?;
    if args.algorithm != Algorithm::Ring {
        session.set_algorithm(&args.algorithm).await?;
    }
    if args.add_node {
        session.add_node().await?;
    }
    if let Some(node) = &args.remove_node {
        session.remove_node(&NodeId::from(node.as_str())).await?;
    }
    info!(generation = session.generation(), "demo finished");
    print_session(&session, args.json)
}

async fn fetch(args: FetchArgs, engine: RingLayout) -> CommandResult {
    let session = Session::new(HttpService::new(args.url.as_str()), engine);
    session
        .refresh()
        .await
        .with_context(|| format!("failed to fetch state from {}", args.url))?;
    print_session(&session, args.json)
}

async fn compare(args: CompareArgs) -> CommandResult {
    if args.local {
        run_compare(LocalService::new(), &args).await
    } else {
        run_compare(HttpService::new(args.url.as_str()), &args).await
    }
}

async fn run_compare<S: AssignmentService>(service: S, args: &CompareArgs) -> CommandResult {
    let node = args.node.as_deref().map(NodeId::from);
    let comparisons = service
        .compare_operation(args.operation, node.as_ref())
        .await
        .with_context(|| format!("{} comparison failed on {}", args.operation, service.name()))?;
    let rows = ComparisonRow::from_comparisons(&comparisons);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_comparison(args.operation, &rows));
    }
    Ok(())
}

fn print_session<S: AssignmentService>(session: &Session<S>, json: bool) -> CommandResult {
    let layout = session.layout();
    if json {
        println!("{}", serde_json::to_string_pretty(&*layout)?);
        return Ok(());
    }
    print!("{}", render_layout(&layout));
    if let Some(summary) = session.summary() {
        print!("{}", summary);
    }
    Ok(())
}

/// Reads a state document from a file or stdin (`-`).
fn read_state(path: &Path) -> anyhow::Result<(RingState, Option<StatsSummary>)> {
    let json = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read state from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state file {}", path.display()))?
    };
    let wire = decode_state(&json).context("failed to decode state")?;
    let summary = wire.stats.as_ref().map(StatsSummary::from_statistics);
    let state = wire.to_ring_state();
    Ok((state, summary))
}

// ============================================================================
// Text rendering
// ============================================================================

/// Plain-text summary of a layout.
pub fn render_layout(layout: &Layout) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "ring: center ({:.1}, {:.1})  radius {:.1}  key ring {:.1}",
        layout.center.x, layout.center.y, layout.radius, layout.key_radius
    );

    let _ = writeln!(out, "nodes:");
    for node in &layout.nodes {
        let _ = writeln!(
            out,
            "  {:<10} {}  {:>6.1}°  {} keys",
            node.id,
            node.color,
            node.angle.to_degrees(),
            node.key_count
        );
    }

    if !layout.segments.is_empty() {
        let _ = writeln!(out, "segments:");
        for arc in &layout.segments {
            let segment = &arc.segment;
            let _ = writeln!(
                out,
                "  {:<10} {:>6.1}° -> {:>6.1}°  {} keys",
                segment.owner,
                segment.start_angle.to_degrees(),
                segment.end_angle.to_degrees(),
                segment.member_keys.len()
            );
        }
    }

    match &layout.keys {
        KeyRendering::Individual(keys) => {
            let unassigned = keys.iter().filter(|k| k.slot.is_none()).count();
            let _ = writeln!(out, "keys: {} drawn individually, {} unassigned", keys.len(), unassigned);
        }
        KeyRendering::Aggregated(markers) => {
            let total: usize = markers.iter().map(|m| m.bucket.member_count).sum();
            let _ = writeln!(
                out,
                "keys: {} aggregated into {} buckets",
                total,
                markers.len()
            );
        }
    }

    if !layout.capacity.is_empty() {
        let _ = writeln!(out, "capacity:");
        for status in &layout.capacity {
            let _ = writeln!(
                out,
                "  {:<10} {:<16} {:>5.1}%  {:?}",
                status.node,
                status.label(),
                status.load_percentage,
                status.tier
            );
        }
    }
    out
}

/// Plain-text tooltip.
pub fn render_explanation(explanation: &Explanation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", explanation.title);
    for fact in &explanation.facts {
        let _ = writeln!(out, "  {}: {}", fact.label, fact.value);
    }
    let _ = writeln!(out, "{}", explanation.heading);
    let _ = writeln!(out, "  {}", explanation.rationale);
    for (idx, step) in explanation.steps.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", idx + 1, step);
    }
    for note in explanation.footnote.iter().chain(&explanation.capacity_note) {
        let _ = writeln!(out, "  {}", note);
    }
    out
}

fn render_comparison(operation: Operation, rows: &[ComparisonRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", operation.label());
    for row in rows {
        let _ = writeln!(
            out,
            "  {:<24} {:>6.2}% churn ({} keys moved, {} nodes)",
            row.algorithm.display_name(),
            row.churn_percent,
            row.keys_moved,
            row.nodes
        );
    }
    out
}
