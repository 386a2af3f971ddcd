use crate::types::{HyspexError, HyspexResult};
use std::path::{Path, PathBuf};

const RASTER_EXTENSIONS: [&str; 3] = ["bsq", "bil", "bip"];

/// Check that `path` is an existing atmospherically corrected raster
/// (`*atm*.bsq|bil|bip`)
pub fn is_valid_raster_file(path: &Path) -> HyspexResult<()> {
    if !path.is_file() {
        return Err(HyspexError::InvalidParameter(format!(
            "The file {} does not exist!",
            path.display()
        )));
    }

    let stem = file_stem(path)?;
    let tail: String = {
        let chars: Vec<char> = stem.chars().collect();
        chars[chars.len().saturating_sub(8)..].iter().collect()
    };
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    if !tail.contains("atm") || !RASTER_EXTENSIONS.contains(&extension) {
        return Err(HyspexError::InvalidParameter(format!(
            "The file {} is not a valid raster data file!",
            path.display()
        )));
    }
    Ok(())
}

/// Check that `path` is a new `.tif` file
pub fn is_valid_tif_output(path: &Path) -> HyspexResult<()> {
    if path.exists() {
        return Err(HyspexError::InvalidParameter(format!(
            "The file {} already exists!",
            path.display()
        )));
    }
    if path.extension().and_then(|e| e.to_str()) != Some("tif") {
        return Err(HyspexError::InvalidParameter(format!(
            "The file {} must be a .tif file!",
            path.display()
        )));
    }
    Ok(())
}

fn file_stem(path: &Path) -> HyspexResult<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| HyspexError::InvalidParameter(format!("No file name in {}", path.display())))
}

/// Flightline prefix: the file stem up to the first underscore
/// (e.g. `20200710-CPC` for `20200710-CPC_01_atm.bsq`)
pub fn default_prefix(path: &Path) -> HyspexResult<String> {
    let stem = file_stem(path)?;
    Ok(stem.split('_').next().unwrap_or_default().to_string())
}

/// Recursively find flightline rasters under `dir` starting with `prefix`
pub fn find_flightlines(dir: &Path, prefix: &str, atm_only: bool) -> HyspexResult<Vec<PathBuf>> {
    let suffix = if atm_only { "atm.bsq" } else { "atm_bcor.bsq" };
    let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped_dir)
        .join("**")
        .join(format!("{}*{}", glob::Pattern::escape(prefix), suffix));
    let pattern = pattern.to_string_lossy();
    log::debug!("Searching flightlines with pattern {}", pattern);

    let mut found = Vec::new();
    let entries = glob::glob(&pattern)
        .map_err(|e| HyspexError::InvalidParameter(format!("Bad search pattern {}: {}", pattern, e)))?;
    for entry in entries {
        let path = entry.map_err(|e| HyspexError::Io(e.into_error()))?;
        if path.is_file() {
            found.push(path);
        }
    }
    found.sort();

    log::info!("Found {} flightlines in {}", found.len(), dir.display());
    Ok(found)
}

/// `<out_dir>/<stem>_<tag>_overview.tif`
pub fn overview_filename(input: &Path, out_dir: &Path, tag: &str) -> HyspexResult<PathBuf> {
    let stem = file_stem(input)?;
    Ok(out_dir.join(format!("{}_{}_overview.tif", stem, tag)))
}

/// Whether an output path names a `.tif` file (`true`) or a directory (`false`).
///
/// Paths without an extension, and existing directories, are directories.
pub fn output_is_tif_file(path: &Path) -> HyspexResult<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("tif") => Ok(true),
        None => Ok(false),
        Some(_) => Err(HyspexError::InvalidParameter(format!(
            "The output {} must be a .tif file or a directory!",
            path.display()
        ))),
    }
}

/// Input/output pair for one flightline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightlineJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Where to look for flightlines
#[derive(Debug, Clone)]
pub enum FlightlineInput {
    File(PathBuf),
    Directory(PathBuf),
}

impl FlightlineInput {
    pub fn path(&self) -> &Path {
        match self {
            FlightlineInput::File(p) | FlightlineInput::Directory(p) => p,
        }
    }
}

/// Expand an input file or directory into per-flightline jobs.
///
/// Without an explicit output, results go next to the input file (or into
/// the input directory). A directory input needs a directory output.
pub fn resolve_jobs(
    input: &FlightlineInput,
    output: Option<&Path>,
    prefix: Option<&str>,
    atm_only: bool,
    tag: &str,
) -> HyspexResult<Vec<FlightlineJob>> {
    let output_is_file = match output {
        Some(out) => output_is_tif_file(out)?,
        None => false,
    };

    match input {
        FlightlineInput::File(file) => {
            is_valid_raster_file(file)?;
            let output = match output {
                Some(out) if output_is_file => {
                    is_valid_tif_output(out)?;
                    out.to_path_buf()
                }
                Some(out_dir) => {
                    std::fs::create_dir_all(out_dir)?;
                    overview_filename(file, out_dir, tag)?
                }
                None => {
                    let parent = file.parent().unwrap_or_else(|| Path::new("."));
                    overview_filename(file, parent, tag)?
                }
            };
            Ok(vec![FlightlineJob {
                input: file.clone(),
                output,
            }])
        }
        FlightlineInput::Directory(dir) => {
            if output_is_file {
                return Err(HyspexError::InvalidParameter(
                    "Cannot specify an output file for an input directory!".to_string(),
                ));
            }
            if !dir.is_dir() {
                return Err(HyspexError::InvalidParameter(format!(
                    "{} is not a directory!",
                    dir.display()
                )));
            }
            let out_dir = output.unwrap_or(dir.as_path());
            std::fs::create_dir_all(out_dir)?;

            let prefix = match prefix {
                Some(p) => p.to_string(),
                None => default_prefix(dir)?,
            };

            find_flightlines(dir, &prefix, atm_only)?
                .into_iter()
                .map(|input| {
                    let output = overview_filename(&input, out_dir, tag)?;
                    Ok(FlightlineJob { input, output })
                })
                .collect()
        }
    }
}
