// Command-line front end for garmin-dem.
//
// `encode` turns an SRTM `.hgt` raster into a DEM file with one section per
// requested point distance, `inspect` prints the headers of a DEM file and
// optionally decodes every tile, `config` prints build details.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::dem::header::{DEM_HEADER_LEN, POINTS_PER_TILE, SECTION_HEADER_LEN};
use crate::dem::{DemReader, EncodeOptions};
use crate::io::encode_hgt_file;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Garmin DEM (hill-shading) file writer.
#[derive(Parser, Debug)]
#[command(
    name = "garmin-dem",
    version,
    about = "Garmin DEM elevation file encoder/inspector",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode an .hgt raster into a DEM file.
    Encode(EncodeArgs),
    /// Print the headers of a DEM file.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Input .hgt file (big-endian i16 samples).
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output DEM file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Point distance of one zoom level in map units, rounded to a multiple
    /// of 16 and no finer than the raster; repeat for more levels. Without it
    /// a single level at the raster's spacing is written.
    #[arg(short = 'd', long = "distance", value_parser = clap::value_parser!(i32).range(1..))]
    distances: Vec<i32>,

    /// Also write a level at the raster's own spacing first.
    #[arg(long)]
    native: bool,

    /// Encode tiles on a thread pool (requires the `parallel` feature).
    #[arg(long)]
    parallel: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// DEM file to inspect.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Also list every tile header.
    #[arg(long)]
    tiles: bool,

    /// Decode every tile body to check the file is readable.
    #[arg(long)]
    verify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Inspect,
    Config,
}

struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    distances: Vec<Option<i32>>,
    parallel: bool,
    list_tiles: bool,
    verify: bool,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
            input_file: None,
            output_file: None,
            distances: Vec::new(),
            parallel: false,
            list_tiles: false,
            verify: false,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Encode(args) => {
            let mut distances: Vec<Option<i32>> = Vec::new();
            if args.native || args.distances.is_empty() {
                distances.push(None);
            }
            distances.extend(args.distances.iter().copied().map(Some));
            Options {
                input_file: Some(args.input.clone()),
                output_file: Some(args.output.clone()),
                distances,
                parallel: args.parallel,
                ..Options::new(Command::Encode, &cli)
            }
        }
        Cmd::Inspect(args) => Options {
            input_file: Some(args.input.clone()),
            list_tiles: args.tiles,
            verify: args.verify,
            ..Options::new(Command::Inspect, &cli)
        },
        Cmd::Config => Options::new(Command::Config, &cli),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("garmin-dem".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("garmin-dem version {version} (Rust)");

    let parallel = cfg!(feature = "parallel") as u8;
    let file_io = cfg!(feature = "file-io") as u8;

    eprintln!("PARALLEL={parallel}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("DEM_HEADER_LEN={DEM_HEADER_LEN}");
    eprintln!("SECTION_HEADER_LEN={SECTION_HEADER_LEN}");
    eprintln!("POINTS_PER_TILE={POINTS_PER_TILE}");

    0
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn cmd_encode(opts: &Options) -> i32 {
    let (Some(input), Some(output)) = (&opts.input_file, &opts.output_file) else {
        eprintln!("garmin-dem: encode requires an input and an output file");
        return 1;
    };

    if output.exists() && !opts.force {
        eprintln!(
            "garmin-dem: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return 1;
    }

    if opts.parallel && !cfg!(feature = "parallel") && !opts.quiet {
        eprintln!("garmin-dem: warning: built without the `parallel` feature, encoding serially");
    }

    let encode_opts = EncodeOptions {
        parallel: opts.parallel,
        ..EncodeOptions::default()
    };

    let stats = match encode_hgt_file(input, output, &opts.distances, &encode_opts) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("garmin-dem: encode error: {}: {e}", input.display());
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "garmin-dem: encoder: input size: {}, output size: {}, sections: {}, \
             tiles: {} ({} coded)",
            stats.input_size, stats.output_size, stats.sections, stats.tiles, stats.coded_tiles
        );
        if let Some(digest) = stats.output_sha256 {
            eprintln!("garmin-dem: sha256: {}", hex(&digest));
        }
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "encode",
            "input_size": stats.input_size,
            "output_size": stats.output_size,
            "sections": stats.sections,
            "tiles": stats.tiles,
            "coded_tiles": stats.coded_tiles,
            "sha256": stats.output_sha256.map(|d| hex(&d)),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("garmin-dem: json error: {e}");
                return 1;
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options) -> i32 {
    let Some(input) = &opts.input_file else {
        eprintln!("garmin-dem: inspect requires an input file");
        return 1;
    };

    let data = match std::fs::read(input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("garmin-dem: {}: {e}", input.display());
            return 1;
        }
    };

    let reader = match DemReader::parse(&data) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("garmin-dem: invalid DEM file: {e}");
            return 1;
        }
    };

    let hdr = reader.header();
    let mut sections_json = Vec::new();
    if !opts.json_output {
        let t = &hdr.creation_time;
        println!("DEM file:                 {}", input.display());
        println!("File size:                {}", data.len());
        println!(
            "Created:                  {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            t.year, t.month, t.day, t.hour, t.minute, t.second
        );
        println!("Flags:                    {:#x}", hdr.flags);
        println!("Sections:                 {}", hdr.section_count);
    }

    for (i, s) in reader.sections().iter().enumerate() {
        let tile_headers = if opts.list_tiles {
            match reader.tile_headers(i) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("garmin-dem: section {i}: {e}");
                    return 1;
                }
            }
        } else {
            Vec::new()
        };

        let decoded = if opts.verify {
            match reader.decode_section(i) {
                Ok(grid) => Some((grid.width(), grid.height())),
                Err(e) => {
                    eprintln!("garmin-dem: section {i}: decode error: {e}");
                    return 1;
                }
            }
        } else {
            None
        };

        if opts.json_output {
            let tiles: Vec<_> = tile_headers
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "offset": t.offset,
                        "base_height": t.base_height,
                        "difference_height": t.difference_height,
                        "encoding_type": t.encoding_type.as_byte(),
                    })
                })
                .collect();
            sections_json.push(serde_json::json!({
                "zoom_level": s.zoom_level,
                "tiles_lat": s.tiles_lat,
                "tiles_lon": s.tiles_lon,
                "non_std_height": s.non_std_height,
                "non_std_width": s.non_std_width,
                "record_descriptor": s.record.to_bits(),
                "tile_desc_size": s.record.tile_desc_size(),
                "data_offset": s.data_offset,
                "top": s.top,
                "left": s.left,
                "points_distance_lat": s.points_distance_lat,
                "points_distance_lon": s.points_distance_lon,
                "min_height": s.min_height,
                "max_height": s.max_height,
                "tiles": tiles,
                "verified": decoded.is_some(),
            }));
            continue;
        }

        println!();
        println!("Section {i}:");
        println!("  Zoom level:             {}", s.zoom_level);
        println!("  Tiles (lat x lon):      {} x {}", s.tiles_lat, s.tiles_lon);
        println!(
            "  Last tile size:         {} x {}",
            s.non_std_height, s.non_std_width
        );
        println!(
            "  Record descriptor:      {:#06x} (tile header {} bytes)",
            s.record.to_bits(),
            s.record.tile_desc_size()
        );
        println!("  Data offset:            {}", s.data_offset);
        println!("  Top/left:               {} / {}", s.top, s.left);
        println!(
            "  Point distance:         {} / {}",
            s.points_distance_lat, s.points_distance_lon
        );
        println!("  Height range:           {} .. {}", s.min_height, s.max_height);
        for (n, t) in tile_headers.iter().enumerate() {
            println!(
                "    tile {n:5}: offset {:8} base {:6} diff {:5} type {}",
                t.offset,
                t.base_height,
                t.difference_height,
                t.encoding_type.as_byte()
            );
        }
        if let Some((w, h)) = decoded {
            println!("  Decoded grid:           {w} x {h}");
        }
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "inspect",
            "file_size": data.len(),
            "flags": hdr.flags,
            "sections": sections_json,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("garmin-dem: json error: {e}");
                return 1;
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let default_filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = resolve_options(cli);
    let exit_code = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
