use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use census_prep::config::Config;
use census_prep::logging;
use census_prep::pipeline::{characteristics, clean, computed, intersect, menu, range_filter, ranges};

#[derive(Parser)]
#[command(name = "census_prep")]
#[command(about = "Census characteristic and boundary data preparation")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the characteristic hierarchy out of a census export
    Characteristics {
        /// Census characteristics CSV (latin-1 encoded)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the characteristic list JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Flag computed values and small totals at the country level
    ComputedValues {
        /// Census characteristics CSV (latin-1 encoded)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the classifier JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Group characteristics into dropdown menu sections
    Menu {
        /// Census characteristics CSV (latin-1 encoded)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Classifier output from the computed-values step
        #[arg(long)]
        computed: Option<PathBuf>,
        /// Where to write the menu JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drop menu entries with no nonzero count in the database
    Clean {
        /// Menu JSON to filter
        #[arg(long)]
        menu: Option<PathBuf>,
        /// SQLite mirror of the census tables
        #[arg(long)]
        db: Option<PathBuf>,
        /// Where to write the filtered menu (defaults to the input path)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compute per-characteristic display ranges over dissemination areas
    Ranges {
        /// Directory holding the census exports
        #[arg(long)]
        census_dir: Option<PathBuf>,
        /// Menu JSON listing the characteristics to range
        #[arg(long)]
        menu: Option<PathBuf>,
        /// Where to write the range table JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drop menu entries absent from the range table
    RangeFilter {
        /// Menu JSON to filter
        #[arg(long)]
        menu: Option<PathBuf>,
        /// Range table from the ranges step
        #[arg(long)]
        ranges: Option<PathBuf>,
        /// Where to write the filtered menu (defaults to the input path)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Overlay two boundary files and write their intersection
    Intersect {
        /// Layer to reproject (GeoJSON)
        #[arg(long)]
        areas: Option<PathBuf>,
        /// Layer whose CRS the result is expressed in (GeoJSON)
        #[arg(long)]
        overlay: Option<PathBuf>,
        /// Where to write the intersection GeoJSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the menu-building steps in order (computed-values, menu, clean)
    Run {},
}

fn print_removed_ids(removed: &std::collections::BTreeSet<u32>) {
    if removed.is_empty() {
        println!("   No entries removed");
    } else {
        let ids: Vec<String> = removed.iter().map(u32::to_string).collect();
        println!("   Removed {} entries: {}", removed.len(), ids.join(", "));
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_or_default()?;

    match cli.command {
        Commands::Characteristics { input, output } => {
            println!("🔄 Parsing characteristic hierarchy...");
            let input = input.unwrap_or_else(|| config.data.census_csv.clone());
            let output = output.unwrap_or_else(|| config.characteristic_list_path());
            let characteristics = characteristics::run(&input, &output)?;
            println!("✅ Wrote {} characteristics to {}", characteristics.len(), output.display());
        }
        Commands::ComputedValues { input, output } => {
            println!("🔄 Classifying computed values...");
            let input = input.unwrap_or_else(|| config.data.census_csv.clone());
            let output = output.unwrap_or_else(|| config.computed_values_path());
            let values = computed::run(&input, &output)?;
            println!("✅ Flagged {} computed values and {} small totals", values.computed_ids.len(), values.small_total_ids.len());
        }
        Commands::Menu { input, computed, output } => {
            println!("🔄 Building menu sections...");
            let input = input.unwrap_or_else(|| config.data.census_csv.clone());
            let computed = computed.or_else(|| {
                let default = config.computed_values_path();
                default.exists().then_some(default)
            });
            let output = output.unwrap_or_else(|| config.menu_list_path());
            let menu = menu::run(&input, computed.as_deref(), &output)?;
            let item_count: usize = menu.values().map(Vec::len).sum();
            println!("✅ Wrote {} sections ({} items) to {}", menu.len(), item_count, output.display());
        }
        Commands::Clean { menu, db, output } => {
            println!("🔨 Filtering menu against the database...");
            let menu_path = menu.unwrap_or_else(|| config.menu_list_path());
            let db = db.unwrap_or_else(|| config.data.database.clone());
            let output = output.unwrap_or_else(|| menu_path.clone());
            match clean::run(&menu_path, &db, &output) {
                Ok(summary) => {
                    println!("✅ Clean completed successfully");
                    print_removed_ids(&summary.removed_ids);
                }
                Err(e) => {
                    error!("Clean failed: {}", e);
                    println!("❌ Clean failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Ranges { census_dir, menu, output } => {
            println!("🔄 Computing display ranges...");
            let census_dir = census_dir.unwrap_or_else(|| config.data.census_dir.clone());
            let menu_path = menu.unwrap_or_else(|| config.menu_list_path());
            let output = output.unwrap_or_else(|| config.ranges_path());
            let ranges = ranges::run(&census_dir, &menu_path, &output)?;
            println!("✅ Wrote {} ranges to {}", ranges.len(), output.display());
        }
        Commands::RangeFilter { menu, ranges, output } => {
            println!("🔨 Filtering menu against the range table...");
            let menu_path = menu.unwrap_or_else(|| config.menu_list_path());
            let ranges = ranges.unwrap_or_else(|| config.ranges_path());
            let output = output.unwrap_or_else(|| menu_path.clone());
            let summary = range_filter::run(&menu_path, &ranges, &output)?;
            println!("✅ Range filter completed successfully");
            print_removed_ids(&summary.removed_ids);
        }
        Commands::Intersect { areas, overlay, output } => {
            println!("🗺️  Performing intersection...");
            let areas = areas.unwrap_or_else(|| config.data.areas.clone());
            let overlay = overlay.unwrap_or_else(|| config.data.overlay.clone());
            let output = output.unwrap_or_else(|| config.intersection_path());
            let summary = intersect::intersect_files(&areas, &overlay, &output)?;
            println!("✅ Wrote {} features to {}", summary.features_written, output.display());
            if summary.skipped_features > 0 {
                println!("⚠️  Skipped {} non-areal features", summary.skipped_features);
            }
        }
        Commands::Run {} => {
            println!("🚀 Running the menu pipeline (computed-values + menu + clean)...");

            println!("\n📥 Step 1: Classifying computed values...");
            let values = computed::run(&config.data.census_csv, &config.computed_values_path())?;
            println!("   Flagged {} computed values", values.computed_ids.len());

            println!("\n📋 Step 2: Building menu sections...");
            let menu_path = config.menu_list_path();
            let built = menu::run(
                &config.data.census_csv,
                Some(config.computed_values_path().as_path()),
                &menu_path,
            )?;
            println!("   Built {} sections", built.len());

            println!("\n🔨 Step 3: Filtering against the database...");
            match clean::run(&menu_path, &config.data.database, &menu_path) {
                Ok(summary) => {
                    println!("✅ Menu pipeline completed successfully!");
                    print_removed_ids(&summary.removed_ids);
                }
                Err(e) => {
                    error!("Clean failed: {}", e);
                    println!("❌ Clean failed: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}
