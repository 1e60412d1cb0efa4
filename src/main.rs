//main.rs
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hclus::plot::DEFAULT_PAIRWISE_CLUSTERS;
use hclus::{export, render};
use hclus::{summarize, ClusteringRequest, DataSet, Distance, Hclus, Linkage, PlotKind, DEFAULT_MAX_CASES};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[clap(version = "0.2.0", author = "Stefan L. <stefan.lang@med.lu.se>")]
/// Hierarchical cluster analysis of a CSV or TSV table.
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the analysis summary.
    Summary {
        #[clap(flatten)]
        analysis: AnalysisOpts,

        /// Print a JSON report instead of text.
        #[clap(long)]
        json: bool,
    },
    /// Draw diagnostic plots to an SVG file.
    Plot {
        #[clap(flatten)]
        analysis: AnalysisOpts,

        /// Plots to draw: scree, change, dendro, scatter.
        #[clap(short, long, value_delimiter = ',', default_value = "scree,change")]
        plots: Vec<PlotKind>,

        /// Hide merges whose normalized height does not exceed this value.
        #[clap(long, default_value_t = 0.05)]
        cutoff: f64,

        /// Clusters coloured in the scatter plot.
        #[clap(short, long, default_value_t = DEFAULT_PAIRWISE_CLUSTERS)]
        k: usize,

        #[clap(short, long)]
        outfile: PathBuf,
    },
    /// Append cluster membership to the data and write it out as CSV.
    Store {
        #[clap(flatten)]
        analysis: AnalysisOpts,

        #[clap(short, long, default_value_t = 2)]
        k: usize,

        /// Name of the new column (default: hclus<k>).
        #[clap(long)]
        name: Option<String>,

        #[clap(short, long)]
        outfile: PathBuf,
    },
    /// Write label,cluster for every clustered case.
    Export {
        #[clap(flatten)]
        analysis: AnalysisOpts,

        #[clap(short, long, default_value_t = 2)]
        k: usize,

        #[clap(short, long)]
        outfile: PathBuf,
    },
}

#[derive(Args)]
struct AnalysisOpts {
    /// Input table; `.tsv` and `.txt` are read tab separated.
    #[clap(short, long)]
    file: PathBuf,

    /// Variables to cluster on; `a:b` selects every column from a to b.
    #[clap(short, long, value_delimiter = ',', required = true)]
    vars: Vec<String>,

    /// Column holding case labels.
    #[clap(short, long)]
    labels: Option<String>,

    #[clap(short, long, default_value = "sq.euclidean")]
    distance: Distance,

    #[clap(short, long, default_value = "ward.D")]
    method: Linkage,

    #[clap(long, default_value_t = DEFAULT_MAX_CASES)]
    max_cases: usize,

    /// Use the variables on their original scale.
    #[clap(long)]
    no_standardize: bool,

    /// Row filter, e.g. "price > 1000 & cut == 'Ideal'".
    #[clap(long)]
    filter: Option<String>,
}

impl AnalysisOpts {
    fn request(&self) -> ClusteringRequest {
        let mut req = ClusteringRequest::new(self.vars.iter().cloned())
            .with_distance(self.distance)
            .with_method(self.method)
            .with_max_cases(self.max_cases)
            .with_standardize(!self.no_standardize);
        if let Some(l) = &self.labels {
            req = req.with_labels(l.clone());
        }
        if let Some(f) = &self.filter {
            req = req.with_filter(f.clone());
        }
        req
    }
}

fn read_table(path: &Path) -> Result<DataSet> {
    let tab = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("tsv") | Some("txt")
    );
    let ds = if tab {
        DataSet::from_tsv(path)
    } else {
        DataSet::from_csv(path)
    };
    ds.with_context(|| format!("reading {:?}", path))
}

fn analyse(opts: &AnalysisOpts) -> Result<(DataSet, hclus::Result<Hclus>)> {
    let ds = read_table(&opts.file)?;
    info!("Loaded {} rows × {} columns", ds.nrows(), ds.ncols());
    let outcome = hclus::hclus(&ds, &opts.request());
    Ok((ds, outcome))
}

fn run(opts: &AnalysisOpts) -> Result<(DataSet, Hclus)> {
    let (ds, outcome) = analyse(opts)?;
    Ok((ds, outcome?))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_writer(io::stderr).with_env_filter(filter).init();

    let opts = Opts::parse();

    match opts.command {
        Command::Summary { analysis, json } => {
            let (_, outcome) = analyse(&analysis)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome?.report()?)?);
            } else {
                // a failed analysis prints its message like a summary would
                print!("{}", summarize(&outcome));
            }
        }
        Command::Plot {
            analysis,
            plots,
            cutoff,
            k,
            outfile,
        } => {
            let (_, hc) = run(&analysis)?;
            let set = hclus::plot(&hc, &plots, cutoff, k)?;
            for warning in &set.warnings {
                eprintln!("{warning}");
            }
            if let Some(caption) = &set.caption {
                println!("{caption}");
            }
            render::save_svg(&set, &outfile)?;
            println!("Wrote {} plot(s) to {:?}", set.plots.len(), outfile);
        }
        Command::Store {
            analysis,
            k,
            name,
            outfile,
        } => {
            let (ds, hc) = run(&analysis)?;
            let stored = ds.store_membership(&hc, k, name.as_deref())?;
            stored
                .to_csv(&outfile)
                .with_context(|| format!("writing {:?}", outfile))?;
            println!("Assigned {} cases into {} clusters", hc.nobs(), k);
        }
        Command::Export {
            analysis,
            k,
            outfile,
        } => {
            let (_, hc) = run(&analysis)?;
            export::save_membership_csv(&outfile, &hc, k)
                .with_context(|| format!("writing {:?}", outfile))?;
            println!("Assigned {} cases into {} clusters", hc.nobs(), k);
        }
    }

    Ok(())
}
