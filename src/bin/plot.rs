use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use braille_rl::{ProgressTable, plot_learning_curves};

#[derive(Parser, Debug)]
#[command(
    name = "plot",
    about = "Plot learning curves from one or more progress files."
)]
struct Args {
    /// Output chart file (png)
    #[arg(short = 'o', long = "out", default_value = "learning_curve.png")]
    out: PathBuf,

    /// Column used for the x axis
    #[arg(long, default_value = "TotalEnvInteracts")]
    x: String,

    /// Column used for the y axis
    #[arg(long, default_value = "AverageTestEpRet")]
    y: String,

    /// Treat the files as consecutive parts of one run (e.g. progress.txt
    /// followed by resumed_progress.txt) instead of separate runs
    #[arg(long)]
    concat: bool,

    /// Progress files written during training
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let is_png = args
        .out
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
    if !is_png {
        return Err("only png output is supported".into());
    }

    let mut runs = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let table = ProgressTable::read(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        let label = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        runs.push((label, table));
    }
    if args.concat {
        let mut iter = runs.into_iter();
        let (label, first) = iter.next().ok_or("no progress files given")?;
        let joined = iter.fold(first, |acc, (_, table)| acc.concat(&table));
        runs = vec![(label, joined)];
    }

    for (label, table) in &runs {
        println!("{label}: {} epochs", table.rows.len());
    }
    plot_learning_curves(&args.out, &runs, &args.x, &args.y)?;
    println!("Saved chart -> {}", args.out.display());
    Ok(())
}
