use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use pdw::logging::{init_logging, LogConfig};
use pdw::{
    load_config, Algorithm, Capabilities, Config, DataSource, Deinterleaved, Deinterleaver,
    Feature, Mode, Population, Real, SimulationSession, Simulator, Storable, StreamBuffer,
    TuningCache, Workspace, DEINTERLEAVED_FILE,
};

#[derive(Parser, Debug)]
#[command(version, about = "Pulse descriptor word simulator and de-interleaver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Owner of the output directory
    #[arg(short, long, default_value = "default", global = true)]
    user: String,

    /// Parent directory of the per-user outputs
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// Log debug events
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate windows of randomly drawn emitters
    Auto {
        #[arg(short, long, default_value_t = 1)]
        steps: usize,
        /// Discard the stored session first
        #[arg(long)]
        reset: bool,
    },
    /// Generate windows of the configured emitters
    Manual {
        #[arg(short, long, default_value_t = 1)]
        steps: usize,
        #[arg(long)]
        reset: bool,
    },
    /// Group buffered pulses by emitter
    Deinterleave {
        /// `auto`, `manual` or the path of a pulse table
        #[arg(short, long, default_value = "auto")]
        source: DataSource,
        #[arg(short, long, value_delimiter = ',')]
        features: Option<Vec<Feature>>,
        #[arg(short, long)]
        algorithm: Option<Algorithm>,
        #[arg(long)]
        eps: Option<Real>,
        #[arg(long)]
        min_samples: Option<usize>,
        #[arg(long)]
        min_cluster_size: Option<usize>,
        #[arg(short)]
        k: Option<usize>,
        /// Ground-truth emitter count; taken from the session when omitted
        #[arg(long)]
        known: Option<usize>,
        /// Skip the parameter search
        #[arg(long)]
        no_tune: bool,
    },
    /// List the clustering algorithms of this build
    Algorithms,
    /// List the files in the output directory
    Files,
}

fn simulate<P: Population>(
    population: P,
    seed: Option<u64>,
    workspace: &Workspace,
    steps: usize,
    reset: bool,
) -> anyhow::Result<()> {
    let mode = population.mode();
    let session_path = workspace.path(mode.session_file());
    let session = if !reset && session_path.exists() {
        SimulationSession::from_file(&session_path)
            .with_context(|| format!("reading {}", session_path.display()))?
    } else {
        SimulationSession::new()
    };

    let mut simulator = Simulator::resume(population, seed, session);
    for _ in 0..steps {
        simulator.step()?;
    }

    let session = simulator.session();
    session.to_file(&session_path)?;
    let table = workspace.path(mode.interleaved_file());
    session.buffer.write_csv(&table)?;

    println!(
        "{} pulses from {} emitters over {:.0} s, written to {}",
        session.buffer.len(),
        session.known_emitters,
        session.clock.now() / 1.0e6,
        table.display()
    );
    Ok(())
}

fn load_source(
    source: &DataSource,
    workspace: &Workspace,
) -> anyhow::Result<(StreamBuffer, Option<usize>)> {
    let mode = match source {
        DataSource::Auto => Mode::Auto,
        DataSource::Manual => Mode::Manual,
        DataSource::File(path) => {
            let buffer = StreamBuffer::read_csv(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok((buffer, None));
        }
    };
    let path = workspace.path(mode.session_file());
    if !path.exists() {
        bail!("no {} session yet, run `pdw {}` first", source, source);
    }
    let session = SimulationSession::from_file(&path)?;
    Ok((session.buffer, Some(session.known_emitters)))
}

fn report(result: &Deinterleaved) {
    let summary = &result.summary;
    println!("parameters:        {}", result.params);
    if let Some(tuning) = &result.tuning {
        println!(
            "tuning:            {} candidates, cluster count off by {}",
            tuning.evaluated, tuning.error
        );
    }
    println!("total pulses:      {}", summary.total_pulses);
    println!("detected emitters: {}", summary.detected_emitters);
    println!("noise pulses:      {}", summary.noise_pulses);
    if let Some(known) = summary.known_emitters {
        println!("known emitters:    {}", known);
    }

    let mut header = format!("{:>10} {:>7}", "Emitter_ID", "pulses");
    if let Some(first) = result.stats.first() {
        for stats in &first.features {
            header += &format!(" {:>12} {:>10}", format!("{} mean", stats.feature), "std");
        }
    }
    println!("\n{}", header);
    for cluster in &result.stats {
        let mut row = format!("{:>10} {:>7}", cluster.emitter_id, cluster.pulses);
        for stats in &cluster.features {
            row += &format!(" {:>12.2} {:>10.2}", stats.mean, stats.std);
        }
        println!("{}", row);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(root) = &cli.output_root {
        config.output_root = root.clone();
    }
    if cli.verbose {
        config.logging = LogConfig {
            format: config.logging.format,
            ..LogConfig::verbose()
        };
    }
    init_logging(&config.logging);

    let workspace = Workspace::open(&config.output_root, &cli.user)?;
    info!(dir = %workspace.dir().display(), "workspace ready");

    match cli.command {
        Command::Auto { steps, reset } => simulate(
            config.simulation.auto,
            config.simulation.seed,
            &workspace,
            steps,
            reset,
        )?,
        Command::Manual { steps, reset } => simulate(
            config.simulation.manual,
            config.simulation.seed,
            &workspace,
            steps,
            reset,
        )?,
        Command::Deinterleave {
            source,
            features,
            algorithm,
            eps,
            min_samples,
            min_cluster_size,
            k,
            known,
            no_tune,
        } => {
            let (buffer, session_known) = load_source(&source, &workspace)?;

            let mut settings = config.deinterleave;
            if let Some(features) = features {
                settings.features = features;
            }
            if let Some(algorithm) = algorithm {
                settings.algorithm = algorithm;
            }
            settings.eps = eps.or(settings.eps);
            settings.min_samples = min_samples.or(settings.min_samples);
            settings.min_cluster_size = min_cluster_size.or(settings.min_cluster_size);
            settings.k = k.or(settings.k);
            settings.auto_tune &= !no_tune;

            let request = settings.request(known.or(session_known))?;
            let cache_path = workspace.path(TuningCache::FILE);
            let cache = if cache_path.exists() {
                TuningCache::from_file(&cache_path)
                    .with_context(|| format!("reading {}", cache_path.display()))?
            } else {
                TuningCache::new()
            };
            let mut deinterleaver = Deinterleaver::with_cache(Capabilities::detect(), cache);
            let result = deinterleaver.run(&source, &buffer, &request)?;
            deinterleaver.cache().to_file(&cache_path)?;

            let table = workspace.path(DEINTERLEAVED_FILE);
            result.write_csv(buffer.pulses(), &table)?;
            report(&result);
            println!("\nwritten to {}", table.display());
        }
        Command::Algorithms => {
            for algorithm in Capabilities::detect().algorithms() {
                let kind = if algorithm.is_density_based() {
                    "density"
                } else {
                    "partition"
                };
                println!("{:<8} {:<10} {}", algorithm.name(), kind, algorithm);
            }
        }
        Command::Files => {
            for name in workspace.list_files()? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
