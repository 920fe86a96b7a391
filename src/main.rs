use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_python_tree_consensus::aggregate::aggregate_sources;
use rust_python_tree_consensus::ages::DEFAULT_ULTRAMETRIC_TOLERANCE;
use rust_python_tree_consensus::consensus::build_consensus;
use rust_python_tree_consensus::io::{
    TreeFile, WriteOptions, load_table, read_first_tree, registry_from_file, save_table,
    write_trees,
};
use rust_python_tree_consensus::options::{
    AggregateOptions, AnnotateOptions, ConsensusOptions, DEFAULT_MIN_FREQUENCY, EdgeSummary,
    MalformedTreePolicy, RootingPolicy, SupportFormat, TableOptions,
};
use rust_python_tree_consensus::support::annotate;
use rust_python_tree_consensus::{ConsensusError, Result, SplitTable, TaxonRegistry};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Summarize posterior tree samples (BEAST/NEXUS or Newick) into a consensus tree,
/// map split support onto a given tree, or save split tables for later merging.
#[derive(Parser, Debug)]
#[command(name = "tree-consensus", version, about = "Split aggregation and consensus trees")]
struct Cli {
    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a majority-rule consensus tree
    Consensus {
        #[command(flatten)]
        input: InputArgs,

        /// Split tables written by `tabulate`, merged into the aggregate
        #[arg(long = "tables", num_args = 1..)]
        tables: Vec<PathBuf>,

        /// Minimum split frequency (0 gives a greedy consensus)
        #[arg(long = "min-freq", default_value_t = DEFAULT_MIN_FREQUENCY)]
        min_freq: f64,

        /// How consensus edge lengths are chosen
        #[arg(long = "edges", value_enum, default_value_t = EdgesArg::MeanLength)]
        edges: EdgesArg,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Annotate a target tree with split support
    Annotate {
        /// Tree to annotate (its first tree is used)
        #[arg(short = 't', long = "target")]
        target: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Replace lengths of supported edges with a summary from the samples
        #[arg(long = "set-edges", value_enum)]
        set_edges: Option<EdgesArg>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Aggregate trees into a split table (JSON, gzip if the name ends in .gz)
    Tabulate {
        #[command(flatten)]
        input: InputArgs,

        /// Output path for the split table
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Tree files (NEXUS or Newick, optionally .gz); each is read by its own worker
    #[arg(short = 'i', long = "input", num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Burn-in by number of trees (drop first N trees of every file)
    #[arg(short = 'b', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Treat all trees as rooted
    #[arg(long = "rooted", conflicts_with = "unrooted")]
    rooted: bool,

    /// Treat all trees as unrooted
    #[arg(long = "unrooted")]
    unrooted: bool,

    /// Trees are ultrametric: aggregate node ages as well
    #[arg(long = "ultrametric")]
    ultrametric: bool,

    /// Maximum spread of root-to-leaf distances accepted as ultrametric
    #[arg(long = "tolerance", default_value_t = DEFAULT_ULTRAMETRIC_TOLERANCE)]
    tolerance: f64,

    /// Do not keep raw samples (no medians or HPD intervals, less memory)
    #[arg(long = "no-samples")]
    no_samples: bool,

    /// Skip trees that fail to parse instead of aborting
    #[arg(long = "skip-malformed")]
    skip_malformed: bool,

    /// Number of worker threads (default: all cores)
    #[arg(long = "threads")]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output path for the annotated tree (gzip if the name ends in .gz)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Report support as percentages
    #[arg(long = "percentages")]
    percentages: bool,

    /// Round support values to this many decimals
    #[arg(long = "precision")]
    precision: Option<usize>,

    /// Only annotate support, no length/age summaries
    #[arg(long = "no-summary")]
    no_summary: bool,

    /// Write a NEXUS file instead of plain Newick
    #[arg(long = "nexus")]
    nexus: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EdgesArg {
    MeanLength,
    MedianLength,
    MeanAge,
    MedianAge,
}

impl From<EdgesArg> for EdgeSummary {
    fn from(arg: EdgesArg) -> Self {
        match arg {
            EdgesArg::MeanLength => EdgeSummary::MeanLength,
            EdgesArg::MedianLength => EdgeSummary::MedianLength,
            EdgesArg::MeanAge => EdgeSummary::MeanAge,
            EdgesArg::MedianAge => EdgeSummary::MedianAge,
        }
    }
}

impl InputArgs {
    fn options(&self) -> AggregateOptions {
        let rooting = if self.rooted {
            RootingPolicy::ForceRooted
        } else if self.unrooted {
            RootingPolicy::ForceUnrooted
        } else {
            RootingPolicy::FromTrees
        };
        AggregateOptions {
            table: TableOptions {
                rooting,
                track_ages: self.ultrametric,
                ultrametric_tolerance: self.tolerance,
                keep_samples: !self.no_samples,
            },
            on_malformed: if self.skip_malformed {
                MalformedTreePolicy::Skip
            } else {
                MalformedTreePolicy::Abort
            },
            threads: self.threads,
        }
    }

    fn files(&self) -> Vec<TreeFile> {
        self.inputs
            .iter()
            .map(|path| TreeFile::new(path).with_burnin(self.burnin_trees))
            .collect()
    }

    /// Reads all inputs in parallel. The registry comes from the first file.
    fn aggregate(&self) -> Result<(TaxonRegistry, SplitTable)> {
        let files = self.files();
        let first = files.first().ok_or_else(|| {
            ConsensusError::InvalidOption("at least one input file is required".to_string())
        })?;
        let t0 = Instant::now();
        let registry = registry_from_file(first)?;
        let table = aggregate_sources(&files, &registry, &self.options())?;
        info!(
            files = files.len(),
            taxa = registry.len(),
            trees = table.trees(),
            splits = table.len(),
            "Aggregated trees in {:.3}s",
            t0.elapsed().as_secs_f64()
        );
        Ok((registry, table))
    }
}

impl OutputArgs {
    fn support(&self) -> SupportFormat {
        SupportFormat { as_percentage: self.percentages, precision: self.precision }
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions { annotations: true, nexus: self.nexus }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if let Err(e) = run(cli.command) {
        error!("{e}");
        std::process::exit(exit_code(&e));
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_code(err: &ConsensusError) -> i32 {
    match err {
        ConsensusError::Read { .. } | ConsensusError::MalformedTree { .. } => 2,
        ConsensusError::Io(_) => 4,
        _ => 3,
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Consensus { input, tables, min_freq, edges, output } => {
            let (registry, mut table) = match (input.inputs.is_empty(), tables.first()) {
                (true, Some(first)) => {
                    let saved = load_table(first)?;
                    (saved.taxa, saved.table)
                }
                _ => input.aggregate()?,
            };
            let skip = usize::from(input.inputs.is_empty());
            for path in tables.iter().skip(skip) {
                let saved = load_table(path)?;
                if saved.taxa != registry {
                    return Err(ConsensusError::RegistryMismatch(format!(
                        "{} was built over different taxa",
                        path.display()
                    )));
                }
                table.merge(&saved.table)?;
                info!(table = %path.display(), trees = saved.table.trees(), "Merged saved table");
            }

            let t1 = Instant::now();
            let options = ConsensusOptions {
                min_frequency: min_freq,
                edge_summary: edges.into(),
                support: output.support(),
                summarize: !output.no_summary,
            };
            let tree = build_consensus(&table, &options)?;
            info!("Building consensus {:.3}s", t1.elapsed().as_secs_f64());

            write_trees(&output.output, &[tree], &registry, &output.write_options())?;
            info!(output = %output.output.display(), "Wrote consensus tree");
        }
        Command::Annotate { target, input, set_edges, output } => {
            let (registry, table) = input.aggregate()?;
            let mut tree = read_first_tree(&target, &registry)?;
            if input.rooted || input.unrooted {
                tree.set_rooted(input.rooted);
            }
            let options = AnnotateOptions {
                support: output.support(),
                summarize: !output.no_summary,
                edge_lengths: set_edges.map(EdgeSummary::from),
            };
            annotate(&mut tree, &table, &options)?;
            write_trees(&output.output, &[tree], &registry, &output.write_options())?;
            info!(output = %output.output.display(), "Wrote annotated tree");
        }
        Command::Tabulate { input, output } => {
            let (registry, table) = input.aggregate()?;
            save_table(&output, &registry, &table)?;
            info!(output = %output.display(), "Wrote split table");
        }
    }
    Ok(())
}
