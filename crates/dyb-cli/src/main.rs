//! Daya Bay model CLI

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dyb_core::{ParameterRecord, PathKey};
use dyb_graph::{GraphOptions, Model, RenderOptions};
use dyb_io::Format;
use dyb_io::report::TableOptions;
use dyb_reactor::{ModelOptions, build_model, paths};
use std::path::{Path, PathBuf};

mod scan;

#[derive(Parser)]
#[command(name = "dayabay")]
#[command(about = "Daya Bay reactor model - storage, parameters and data sources")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(flatten)]
    model: ModelArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Model construction flags, applied over `--config`.
#[derive(clap::Args)]
struct ModelArgs {
    /// YAML file with model options (path_data, source_type, seed, parameter_values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory with the input data (synthetic inputs when omitted)
    #[arg(long, global = true)]
    path_data: Option<PathBuf>,

    /// Input data format: tsv, tsv.gz, parquet, json, keyed (aliases: hdf5, root, npz)
    #[arg(short = 's', long, visible_alias = "source", global = true)]
    source_type: Option<Format>,

    /// Set a parameter value: --par NAME VALUE (repeatable)
    #[arg(
        long = "par",
        num_args = 2,
        value_names = ["NAME", "VALUE"],
        action = ArgAction::Append,
        global = true
    )]
    par: Vec<String>,

    /// Seed of the sampled observed dataset
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print nodes and parameters as a table
    Print {
        /// Storage prefixes to print (default: everything)
        #[arg(short = 'p', long = "prefix")]
        prefixes: Vec<String>,

        /// Arrays longer than this are shown as head and tail
        #[arg(long, default_value = "6")]
        max_values: usize,

        /// Significant digits
        #[arg(long, default_value = "6")]
        precision: usize,
    },

    /// Scan a parameter with staged values and report a statistic (JSON)
    Access {
        /// Scanned parameter
        #[arg(long, default_value = paths::THETA13)]
        parameter: String,

        /// Statistic node
        #[arg(long, default_value = paths::CHI2_STAT_CNP)]
        statistic: String,

        #[arg(long, default_value = "0.0")]
        start: f64,

        #[arg(long, default_value = "0.2")]
        stop: f64,

        #[arg(long, default_value = "21")]
        points: usize,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a statistic on asimov, real and asimov data again (JSON)
    SwitchData {
        /// Statistic node
        #[arg(long, default_value = paths::CHI2_FULL_CNP)]
        statistic: String,

        /// Switch with `switch_input(index)` instead of `switch_data(name)`
        #[arg(long)]
        by_index: bool,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every node under a prefix
    Export {
        /// Target file (directory for tsv)
        output: PathBuf,

        #[arg(short, long, default_value = "json")]
        format: Format,

        #[arg(short = 'p', long, default_value = "outputs")]
        prefix: String,
    },

    /// Render nodes to SVG
    Plot {
        /// Plot every node into FOLDER
        #[arg(long, value_name = "FOLDER", conflicts_with = "plot")]
        all: Option<PathBuf>,

        /// Plot the nodes under each SOURCE prefix into FOLDER
        #[arg(long, num_args = 2.., value_names = ["FOLDER", "SOURCE"])]
        plot: Vec<String>,

        /// Skip nodes with fewer elements
        #[arg(long, default_value = "10")]
        min_size: usize,

        /// YAML render configuration
        #[arg(long)]
        render_config: Option<PathBuf>,
    },

    /// Write Graphviz DOT files of the dependency neighbourhood of nodes
    Graphs {
        /// One graph per node into FOLDER
        #[arg(long, value_name = "FOLDER", conflicts_with = "graphs")]
        all: Option<PathBuf>,

        /// One graph per node under each SOURCE prefix into FOLDER
        #[arg(long, num_args = 2.., value_names = ["FOLDER", "SOURCE"])]
        graphs: Vec<String>,

        /// Upstream levels to include (zero or negative)
        #[arg(long, default_value = "-2", allow_negative_numbers = true)]
        min_depth: i32,

        /// Downstream levels to include
        #[arg(long, default_value = "1")]
        max_depth: i32,

        /// Leave parameters out of the graphs
        #[arg(long)]
        no_parameters: bool,
    },

    /// Write parameter reports
    Parameters {
        #[command(subcommand)]
        command: ParametersCommands,
    },

    /// Systematic covariance matrix summary (JSON)
    Covariance {
        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also render the matrix to this SVG file
        #[arg(long)]
        svg: Option<PathBuf>,
    },

    /// Write synthetic input data, readable with --path-data
    GenerateData {
        /// Data directory
        dir: PathBuf,

        #[arg(short, long, default_value = "json")]
        format: Format,
    },

    /// Print version
    Version,
}

#[derive(Subcommand)]
enum ParametersCommands {
    /// Plain-text table of parameters
    Text {
        /// Output file. Defaults to stdout.
        output: Option<PathBuf>,

        #[arg(short = 'p', long, default_value = "parameters.all")]
        prefix: String,
    },

    /// LaTeX tables, one file per parameter group
    Latex {
        /// Output directory. Defaults to stdout.
        output: Option<PathBuf>,

        #[arg(short = 'p', long, default_value = "parameters.all")]
        prefix: String,
    },

    /// `\pgfkeyssetvalue` definitions for pgfplots/datax
    Datax {
        /// Output file. Defaults to stdout.
        output: Option<PathBuf>,

        #[arg(short = 'p', long, default_value = "parameters.all")]
        prefix: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let args = &cli.model;
    match cli.command {
        Commands::Print { prefixes, max_values, precision } => {
            cmd_print(&mut load_model(args)?, &prefixes, max_values, precision)
        }
        Commands::Access { parameter, statistic, start, stop, points, output } => {
            let mut model = load_model(args)?;
            let result = scan::access(&mut model, &parameter, &statistic, start, stop, points)?;
            write_json(output.as_ref(), serde_json::to_value(result)?)
        }
        Commands::SwitchData { statistic, by_index, output } => {
            let result = scan::switch_data(&mut load_model(args)?, &statistic, by_index)?;
            write_json(output.as_ref(), serde_json::to_value(result)?)
        }
        Commands::Export { output, format, prefix } => {
            print_written(&load_model(args)?.export(prefix.as_str(), format, &output)?);
            Ok(())
        }
        Commands::Plot { all, plot, min_size, render_config } => cmd_plot(
            &mut load_model(args)?,
            all.as_deref(),
            &plot,
            min_size,
            render_config.as_deref(),
        ),
        Commands::Graphs { all, graphs, min_depth, max_depth, no_parameters } => {
            let options = GraphOptions { min_depth, max_depth, parameters: !no_parameters };
            cmd_graphs(&load_model(args)?, all.as_deref(), &graphs, &options)
        }
        Commands::Parameters { command } => cmd_parameters(&load_model(args)?, command),
        Commands::Covariance { output, svg } => {
            cmd_covariance(&mut load_model(args)?, output.as_ref(), svg.as_deref())
        }
        Commands::GenerateData { dir, format } => {
            let options = model_options(args)?;
            let inputs = dyb_reactor::generate_inputs(options.seed)?;
            print_written(&inputs.save(&dir, format)?);
            Ok(())
        }
        Commands::Version => {
            println!("dayabay {}", dyb_core::VERSION);
            Ok(())
        }
    }
}

/// `--config` first, then the individual flags.
fn model_options(args: &ModelArgs) -> Result<ModelOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_yaml_ng::from_str(&text)
                .with_context(|| format!("invalid model config {}", path.display()))?
        }
        None => ModelOptions::default(),
    };
    if let Some(path) = &args.path_data {
        options.path_data = Some(path.clone());
    }
    if let Some(format) = args.source_type {
        options.source_type = format;
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    for pair in args.par.chunks(2) {
        if let [name, value] = pair {
            options = options.with_parameter(name.as_str(), value.as_str());
        }
    }
    Ok(options)
}

fn load_model(args: &ModelArgs) -> Result<Model> {
    let options = model_options(args)?;
    let model = build_model(&options)?;
    tracing::info!(
        nodes = model.n_nodes(),
        parameters = model.n_parameters(),
        "model loaded"
    );
    Ok(model)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
        println!("Write: {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

fn print_written(files: &[PathBuf]) {
    for file in files {
        println!("Write: {}", file.display());
    }
}

fn cmd_print(model: &mut Model, prefixes: &[String], max_values: usize, precision: usize) -> Result<()> {
    let options = TableOptions { max_values, precision, ..Default::default() };
    let all = [String::new()];
    let prefixes = if prefixes.is_empty() { &all[..] } else { prefixes };
    for prefix in prefixes {
        let table = model
            .to_table(prefix.as_str(), &options)
            .with_context(|| format!("cannot print '{prefix}'"))?;
        print!("{table}");
    }
    Ok(())
}

/// `folder/<prefix segments>`, escaped like the storage exports.
fn prefix_folder(folder: &str, prefix: &PathKey) -> PathBuf {
    let mut target = PathBuf::from(folder);
    for segment in prefix.segments() {
        target.push(&*dyb_io::sanitize::escape_segment(segment));
    }
    target
}

fn cmd_plot(
    model: &mut Model,
    all: Option<&Path>,
    plot: &[String],
    min_size: usize,
    render_config: Option<&Path>,
) -> Result<()> {
    let yaml = match render_config {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read render config {}", path.display()))?,
        ),
        None => None,
    };
    let options = RenderOptions {
        min_size,
        config: dyb_viz_render::config::resolve_config(yaml.as_deref())?,
    };

    let mut written = Vec::new();
    if let Some(folder) = all {
        written.extend(model.render("", folder, &options)?);
    }
    if let [folder, sources @ ..] = plot {
        for source in sources {
            let prefix = PathKey::parse(source)?;
            written.extend(model.render(&prefix, &prefix_folder(folder, &prefix), &options)?);
        }
    } else if all.is_none() {
        anyhow::bail!("nothing to plot: use --all FOLDER or --plot FOLDER SOURCE..");
    }
    print_written(&written);
    Ok(())
}

fn cmd_graphs(
    model: &Model,
    all: Option<&Path>,
    graphs: &[String],
    options: &GraphOptions,
) -> Result<()> {
    let mut written = Vec::new();
    if let Some(folder) = all {
        written.extend(model.save_graphs("", folder, options)?);
    }
    if let [folder, sources @ ..] = graphs {
        for source in sources {
            let prefix = PathKey::parse(source)?;
            written.extend(model.save_graphs(&prefix, &prefix_folder(folder, &prefix), options)?);
        }
    } else if all.is_none() {
        anyhow::bail!("no graphs requested: use --all FOLDER or --graphs FOLDER SOURCE..");
    }
    print_written(&written);
    Ok(())
}

fn cmd_parameters(model: &Model, command: ParametersCommands) -> Result<()> {
    use dyb_io::report;

    let records_under = |model: &Model, prefix: &str| -> Result<(PathKey, Vec<ParameterRecord>)> {
        let root = PathKey::parse(prefix)?;
        let records = model.parameter_records(&root)?;
        Ok((root, records))
    };
    match command {
        ParametersCommands::Text { output, prefix } => {
            let (root, records) = records_under(model, &prefix)?;
            match output {
                Some(path) => print_written(&[report::save_parameters_text(&path, &records, &root)?]),
                None => print!("{}", report::parameters_text(&records, &root)),
            }
        }
        ParametersCommands::Latex { output, prefix } => {
            let (root, records) = records_under(model, &prefix)?;
            match output {
                Some(dir) => print_written(&report::save_latex_split(&dir, &records, &root)?),
                None => {
                    for (group, tex) in report::latex_tables(&records, &root) {
                        println!("% {group}");
                        print!("{tex}");
                    }
                }
            }
        }
        ParametersCommands::Datax { output, prefix } => {
            let (root, records) = records_under(model, &prefix)?;
            match output {
                Some(path) => print_written(&[report::save_datax(&path, &records, &root)?]),
                None => print!("{}", report::datax(&records, &root)),
            }
        }
    }
    Ok(())
}

fn cmd_covariance(model: &mut Model, output: Option<&PathBuf>, svg: Option<&Path>) -> Result<()> {
    model.update_covariance_matrix()?;
    let parameters: Vec<String> = model
        .parameter_records("parameters.constrained")?
        .into_iter()
        .map(|r| r.path.to_dotted())
        .collect();
    let matrix = model.get_or_compute(paths::COVARIANCE)?.clone();
    let (n, _) = matrix
        .rows_cols()
        .with_context(|| format!("'{}' is not a matrix", paths::COVARIANCE))?;
    let expected = model.get_or_compute(paths::EXPECTED)?.clone();
    let data = matrix.data();

    let sigma: Vec<f64> = (0..n).map(|i| data[i * n + i].sqrt()).collect();
    let relative: Vec<f64> = sigma.iter().zip(expected.data()).map(|(s, m)| s / m).collect();
    let rows: Vec<&[f64]> = data.chunks(n).collect();

    if let Some(path) = svg {
        let rendered = dyb_viz_render::render_array(paths::COVARIANCE, &matrix, &Default::default())?;
        dyb_viz_render::output::svg::save_svg(&rendered, path)?;
        println!("Write: {}", path.display());
    }
    write_json(
        output,
        serde_json::json!({
            "target": paths::EXPECTED,
            "size": n,
            "parameters": parameters,
            "sigma": sigma,
            "relative_sigma": relative,
            "matrix": rows,
        }),
    )
}
