use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use datafile_gen::config::{locate_data_dir, DATAFILE_OPT};
use datafile_gen::generate_profiles;
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a sample data folder
    Init {
        /// Data folder to create
        #[arg(default_value = "data-files")]
        path: PathBuf,
    },
    /// Generate files for one or more profiles (default command)
    Generate(GenerateArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Comma-separated profile names, e.g. "basic,accounts"
    profiles: Option<String>,

    /// Data folder (defaults to the folder named in datafile.opt, else ./data-files)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Dry run mode - don't write files
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path }) => init_data_dir(&path)?,
        Some(Commands::Generate(args)) => generate(args)?,
        None => generate(cli.generate)?,
    }

    Ok(())
}

fn generate(args: GenerateArgs) -> Result<()> {
    let Some(profiles) = args.profiles else {
        bail!("no profile given, run: datagen generate <profiles>");
    };
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let data_dir = locate_data_dir(args.data_dir.as_deref(), &cwd);
    info!("Using data folder {:?}", data_dir);

    if args.dry_run {
        info!("=== DRY RUN MODE ===");
    }

    let reports = generate_profiles(&data_dir, &profiles, args.dry_run)
        .with_context(|| format!("Failed to generate profiles ({})", profiles))?;

    for report in &reports {
        info!(
            "{}: {} file(s), {} suppressed, {} existing, {} simulator file(s)",
            report.profile_name.as_deref().unwrap_or("profile"),
            report.files_written.len(),
            report.rows_suppressed,
            report.rows_reused,
            report.simulator_files.len()
        );
    }

    if args.dry_run {
        info!("=== DRY RUN COMPLETE ===");
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"{
  "output": {
    "fileExtension": ".xml"
  }
}
"#;

const SAMPLE_CONFIG: &str = r#"{
  "profileName": "sample",
  "inputSheet": "data/workbook",
  "sheetName": "Sheet1",
  "templates": [
    { "name": "default", "path": "data/template/", "fileName": "sample.xml" }
  ],
  "output": {
    "folder": "output/sample/",
    "fileNamePrefix": "SAMPLE-",
    "fileIdColumn": "ID"
  },
  "simulator": {
    "simulatorConfigTemplatePath": "data/template/",
    "simulatorConfigTemplate": "sample-sim.xml",
    "simulatorConfigFilenameParam": "{FILENAME}",
    "simulatorConfigOutput": "output/simulator/",
    "simulatorFilename": "sample-sim.xml"
  }
}
"#;

const SAMPLE_SHEET: &str = "ID,NAME,TYPE\n001,First Account,SAVINGS\n002,Second Account,LOAN\n";

const SAMPLE_TEMPLATE: &str = r#"<ACCOUNT>
  <UNIQUE_ID>{ID}</UNIQUE_ID>
  <NAME>{NAME}</NAME>
  <TYPE>{TYPE}</TYPE>
</ACCOUNT>
"#;

const SAMPLE_SIM_TEMPLATE: &str = "<response id=\"{ID}\" file=\"{FILENAME}\"/>\n";

fn init_data_dir(path: &Path) -> Result<()> {
    info!("Initializing data folder at {:?}", path);

    std::fs::create_dir_all(path.join("config"))?;
    std::fs::create_dir_all(path.join("data/template"))?;
    std::fs::create_dir_all(path.join("data/workbook"))?;
    std::fs::create_dir_all(path.join("output"))?;

    std::fs::write(path.join("config/default.json"), DEFAULT_CONFIG)?;
    std::fs::write(path.join("config/sample.json"), SAMPLE_CONFIG)?;
    std::fs::write(path.join("data/workbook/Sheet1.csv"), SAMPLE_SHEET)?;
    std::fs::write(path.join("data/template/sample.xml"), SAMPLE_TEMPLATE)?;
    std::fs::write(path.join("data/template/sample-sim.xml"), SAMPLE_SIM_TEMPLATE)?;
    std::fs::write(DATAFILE_OPT, path.to_string_lossy().as_bytes())
        .with_context(|| format!("Failed to write {}", DATAFILE_OPT))?;

    info!("✓ Data folder initialized successfully!");
    info!("  Run: datagen generate sample");

    Ok(())
}
