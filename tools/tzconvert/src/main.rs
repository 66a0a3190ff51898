//! Convert Olson zoneinfo sources into per-zone iCalendar files.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use zonal_rs::ZonalCompiler;

#[derive(Parser)]
#[command(about = "Convert Olson-style timezone data into VTIMEZONE objects, one .ics per zone")]
struct Args {
    /// First year to expand.
    #[arg(long, default_value_t = 1800)]
    start: i64,

    /// Last year to expand.
    #[arg(long, default_value_t = 2038)]
    end: i64,

    /// PRODID string to stamp onto the generated calendars.
    #[arg(long)]
    prodid: Option<String>,

    /// Output directory; defaults to `DIR/zoneinfo`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory containing the Olson source files.
    dir: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if let Some(prodid) = args.prodid {
        calendar_rs::calendar::set_default_prod_id(prodid);
    }

    let compiler = match ZonalCompiler::from_directory(&args.dir) {
        Ok(compiler) => compiler,
        Err(err) => {
            eprintln!("tzconvert: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "parsed {} zones, {} rule sets, {} links",
        compiler.zones.len(),
        compiler.rules.len(),
        compiler.links.len()
    );

    let outdir = args
        .output
        .unwrap_or_else(|| args.dir.join("zoneinfo"));
    if let Err(err) = compiler.write_zoneinfo(&outdir, args.start, args.end) {
        eprintln!("tzconvert: {err}");
        return ExitCode::FAILURE;
    }
    println!("wrote {} zones to {}", compiler.zones.len(), outdir.display());
    ExitCode::SUCCESS
}
