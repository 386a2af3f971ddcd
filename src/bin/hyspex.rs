//! Command line front end for the HySpex flightline tools.

use anyhow::{bail, Context, Result};
use clap::{AppSettings, Args, Parser, Subcommand};
use std::path::PathBuf;

use hyspex::core::flight_data::{FlightDataExtractor, FlightDataParams};
use hyspex::core::flightline_mask::{write_flightline_mask, FlightlineMaskParams, FlightlineMasker, FlightlinePaths};
use hyspex::core::masking::RowMaskParams;
use hyspex::core::rgb_overview::{RgbOverviewGenerator, RgbOverviewParams};
use hyspex::core::vegetation_index::{VegetationIndex, VegetationIndexProcessor};
use hyspex::io::flightlines::{is_valid_tif_output, resolve_jobs, FlightlineInput, FlightlineJob};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Processing tools for HySpex VNIR/SWIR flightlines")]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the composite validity mask of a flightline from its four geocoded products
    Mask(MaskArgs),
    /// Generate an RGB overview image of raster data
    Rgb {
        #[clap(flatten)]
        input: InputArgs,
        /// Red band
        #[clap(short, long, default_value_t = 290)]
        red: usize,
        /// Green band
        #[clap(short, long, default_value_t = 140)]
        green: usize,
        /// Blue band
        #[clap(short, long, default_value_t = 20)]
        blue: usize,
    },
    /// Generate a vegetation or water index image of raster data
    Vi {
        #[clap(flatten)]
        input: InputArgs,
        /// Index to compute: ndvi, evi, vig, vari, ndii6, ndii7, wi or ndwi
        #[clap(short = 'v', long = "veg-idx", alias = "vegetation-index", default_value = "ndvi")]
        index: VegetationIndex,
    },
    /// Extract flight and solar geometry for ATCOR from a navigation file
    Flightdata {
        /// Navigation file of the flightline
        #[clap(short, long)]
        input: PathBuf,
        /// Radiance ENVI header (default: ../RAD/<name>_rad_bsq_float32.hdr)
        #[clap(long)]
        header: Option<PathBuf>,
        /// Report path (default: <name>_rad_f32_geo_flightdata.txt next to the input)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct MaskArgs {
    /// VNIR radiance raster
    #[clap(long)]
    vnir: PathBuf,
    /// SWIR radiance raster
    #[clap(long)]
    swir: PathBuf,
    /// VNIR navigation (scan angle / altitude) raster
    #[clap(long)]
    vnir_nav: PathBuf,
    /// SWIR navigation (scan angle / altitude) raster
    #[clap(long)]
    swir_nav: PathBuf,
    /// Output GeoTIFF
    #[clap(short, long)]
    output: PathBuf,
    /// Flightline name for messages (default: VNIR file stem)
    #[clap(long)]
    name: Option<String>,
    /// Fraction of the valid span trimmed at the left edge of each row
    #[clap(long, default_value_t = 0.0)]
    left_prop: f64,
    /// Fraction of the valid span trimmed at the right edge of each row
    #[clap(long, default_value_t = 0.0)]
    right_prop: f64,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input file name
    #[clap(short = 'f', long = "file", conflicts_with = "dir", required_unless_present = "dir")]
    file: Option<PathBuf>,
    /// Input directory
    #[clap(short = 'd', long = "dir", alias = "directory")]
    dir: Option<PathBuf>,
    /// Output file or directory. File must end in .tif
    #[clap(short, long, alias = "out")]
    output: Option<PathBuf>,
    /// Flightline prefix (e.g. 20200710-CPC)
    #[clap(short, long)]
    prefix: Option<String>,
    /// Look for *atm.bsq files rather than *atm_bcor.bsq files
    #[clap(long = "atm")]
    atm_only: bool,
}

impl InputArgs {
    fn jobs(&self, tag: &str) -> Result<Vec<FlightlineJob>> {
        let input = match (&self.file, &self.dir) {
            (Some(file), None) => FlightlineInput::File(file.clone()),
            (None, Some(dir)) => FlightlineInput::Directory(dir.clone()),
            _ => bail!("Must specify an input file OR an input directory!"),
        };
        let jobs = resolve_jobs(
            &input,
            self.output.as_deref(),
            self.prefix.as_deref(),
            self.atm_only,
            tag,
        )
        .with_context(|| format!("Cannot resolve flightlines from {}", input.path().display()))?;
        if jobs.is_empty() {
            log::warn!("No flightlines found in {}", input.path().display());
        }
        Ok(jobs)
    }
}

fn run_mask(args: MaskArgs) -> Result<()> {
    is_valid_tif_output(&args.output)?;

    let mut paths = FlightlinePaths::new(&args.vnir, &args.swir, &args.vnir_nav, &args.swir_nav);
    if let Some(name) = args.name {
        paths = paths.with_name(name);
    }

    let params = FlightlineMaskParams {
        row_params: RowMaskParams {
            left_prop: args.left_prop,
            right_prop: args.right_prop,
            ..RowMaskParams::default()
        },
        ..FlightlineMaskParams::default()
    };
    let masker = FlightlineMasker::with_params(params)?;
    let mask = masker.build(&paths)?;
    write_flightline_mask(&mask, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("Mask for {} written to {}", paths.name, args.output.display());
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Mask(args) => run_mask(args)?,
        Command::Rgb {
            input,
            red,
            green,
            blue,
        } => {
            let params = RgbOverviewParams {
                bands: [red, green, blue],
                ..RgbOverviewParams::default()
            };
            let jobs = input.jobs(&params.tag())?;
            RgbOverviewGenerator::with_params(params).generate_all(&jobs)?;
        }
        Command::Vi { input, index } => {
            let jobs = input.jobs(index.name())?;
            VegetationIndexProcessor::new().generate_all(&jobs, index)?;
        }
        Command::Flightdata { input, header, output } => {
            let extractor = FlightDataExtractor::with_params(FlightDataParams {
                header_path: header,
                output_path: output,
            });
            let (data, report) = extractor
                .extract(&input)
                .with_context(|| format!("Flight data extraction failed for {}", input.display()))?;
            log::debug!("{:?}", data);
            println!("#### flight data extraction successful: {} ####", report.display());
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
