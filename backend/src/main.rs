//! geosheet CLI - edit GeoJSON attributes in a spreadsheet
//!
//! # Workflow Commands
//!
//! ```bash
//! geosheet combine a.geojson b.geojson -o all.geojson   # Merge collections
//! geosheet export all.geojson -o edit.csv               # GeoJSON -> CSV
//! geosheet import edit.csv -o edited.geojson            # Edited CSV -> GeoJSON
//! geosheet join parcels.geojson owners.csv -k parcel_id # Join attributes
//! geosheet serve                                        # Start HTTP server
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! geosheet validate input.geojson   # Check a FeatureCollection against the schema
//! ```

use clap::{Parser, Subcommand};
use geosheet::{
    combine_files, export_geojson, import_csv, join_files, parse_delimiter, read_named,
    validate_feature_collection, ExportOptions, ImportOptions, JoinOptions, ServerConfig,
    FEATURE_ID_COLUMN,
};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "geosheet")]
#[command(about = "Round-trip GeoJSON attributes through CSV for spreadsheet editing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a GeoJSON FeatureCollection to CSV
    Export {
        /// Input GeoJSON file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV delimiter (default: ',')
        #[arg(short, long, value_parser = delimiter_arg)]
        delimiter: Option<char>,

        /// Prepend a UTF-8 byte order mark (helps some spreadsheet programs)
        #[arg(long)]
        bom: bool,
    },

    /// Rebuild GeoJSON from an edited CSV
    Import {
        /// Edited CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long, value_parser = delimiter_arg)]
        delimiter: Option<char>,
    },

    /// Combine several GeoJSON files, renaming duplicate feature ids
    Combine {
        /// Input GeoJSON files, in merge order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Left-join an attribute file onto a main file
    Join {
        /// Main file (CSV or GeoJSON); every row is kept
        main: PathBuf,

        /// Attribute file (CSV or GeoJSON)
        addition: PathBuf,

        /// Key column present in both files
        #[arg(short, long, default_value = FEATURE_ID_COLUMN)]
        key: String,

        /// CSV output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write GeoJSON (main file must be GeoJSON)
        #[arg(long)]
        geojson: Option<PathBuf>,

        /// Output CSV delimiter (default: ',')
        #[arg(short, long, value_parser = delimiter_arg)]
        delimiter: Option<char>,
    },

    /// Validate a GeoJSON file against the FeatureCollection schema
    Validate {
        /// Input GeoJSON file
        input: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides GEOSHEET_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export {
            input,
            output,
            delimiter,
            bom,
        } => cmd_export(&input, output.as_deref(), delimiter, bom),

        Commands::Import {
            input,
            output,
            delimiter,
        } => cmd_import(&input, output.as_deref(), delimiter),

        Commands::Combine { inputs, output } => cmd_combine(&inputs, output.as_deref()),

        Commands::Join {
            main,
            addition,
            key,
            output,
            geojson,
            delimiter,
        } => cmd_join(
            &main,
            &addition,
            &key,
            output.as_deref(),
            geojson.as_deref(),
            delimiter,
        ),

        Commands::Validate { input } => cmd_validate(&input),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn delimiter_arg(raw: &str) -> Result<char, String> {
    parse_delimiter(raw).ok_or_else(|| format!("'{}' is not a single ASCII character or 'tab'", raw))
}

fn cmd_export(
    input: &Path,
    output: Option<&Path>,
    delimiter: Option<char>,
    bom: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Exporting: {}", input.display());

    let mut options = ExportOptions {
        bom,
        ..ExportOptions::default()
    };
    if let Some(d) = delimiter {
        options.delimiter = d;
    }

    let bytes = fs::read(input)?;
    let result = export_geojson(&bytes, &options)?;

    eprintln!("   Rows: {}", result.table_info.row_count);
    eprintln!("   Columns: {}", result.table_info.columns.join(", "));
    eprintln!("   Edit properties only; leave _feature_id and geometry_json untouched.");

    write_output(&result.csv, output)?;
    Ok(())
}

fn cmd_import(
    input: &Path,
    output: Option<&Path>,
    delimiter: Option<char>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", input.display());

    let bytes = fs::read(input)?;
    let result = import_csv(&bytes, &ImportOptions { delimiter })?;

    eprintln!("   Encoding: {}", result.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.csv_info.delimiter));
    eprintln!("   Rows: {}", result.csv_info.row_count);

    if result.geometry_errors.is_empty() {
        eprintln!("   ✅ All {} features have readable geometry", result.collection.len());
    } else {
        eprintln!("   ⚠️  {} row(s) with invalid geometry:", result.geometry_errors.len());
        for err in result.geometry_errors.iter().take(5) {
            eprintln!("     - {}", err);
        }
    }

    write_output(&result.geojson, output)?;
    Ok(())
}

fn cmd_combine(inputs: &[PathBuf], output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔄 Combining {} file(s)", inputs.len());

    let files = inputs
        .iter()
        .map(|p| read_named(p))
        .collect::<Result<Vec<_>, _>>()?;
    let result = combine_files(files)?;

    for count in &result.per_file_counts {
        eprintln!("   {}: {} features", count.name, count.features);
    }
    for rejected in &result.rejected {
        eprintln!("   ❌ Skipped {}: {}", rejected.name, rejected.reason);
    }
    if !result.renamed.is_empty() {
        eprintln!("   ⚠️  Renamed {} duplicate id(s):", result.renamed.len());
        for notice in result.renamed.iter().take(10) {
            eprintln!("     - {} → {}", notice.original, notice.renamed);
        }
    }
    eprintln!("✅ {} features total", result.collection.len());

    write_output(&result.geojson, output)?;
    Ok(())
}

fn cmd_join(
    main: &Path,
    addition: &Path,
    key: &str,
    output: Option<&Path>,
    geojson_output: Option<&Path>,
    delimiter: Option<char>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🧩 Joining {} + {} on '{}'", main.display(), addition.display(), key);

    let mut options = JoinOptions::default();
    if let Some(d) = delimiter {
        options.output_delimiter = d;
    }

    let result = join_files(&read_named(main)?, &read_named(addition)?, key, &options)?;

    eprintln!("   Rows: {}", result.table.len());
    if !result.unmatched.is_empty() {
        eprintln!("   Unmatched main rows: {}", result.unmatched.len());
    }
    if !result.fanned_out.is_empty() {
        eprintln!(
            "   ⚠️  {} main row(s) matched several attribute rows and were duplicated",
            result.fanned_out.len()
        );
    }
    for err in result.geometry_errors.iter().take(5) {
        eprintln!("   ⚠️  {}", err);
    }

    write_output(&result.csv, output)?;

    if let Some(path) = geojson_output {
        match result.geojson {
            Some(ref geojson) => {
                fs::write(path, geojson)?;
                eprintln!("💾 GeoJSON written to: {}", path.display());
            }
            None => eprintln!("⚠️  Main file is not GeoJSON; no GeoJSON written"),
        }
    }

    Ok(())
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let document: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;

    match validate_feature_collection(&document) {
        Ok(()) => {
            let count = document["features"].as_array().map_or(0, Vec::len);
            eprintln!("✅ Valid FeatureCollection ({} features)", count);
            Ok(())
        }
        Err(errors) => {
            eprintln!("❌ Invalid FeatureCollection:");
            for err in errors.iter().take(10) {
                eprintln!("   - {}", err);
            }
            std::process::exit(1);
        }
    }
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    geosheet::server::start_server(config).await
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &[u8], path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
