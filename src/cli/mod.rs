//! Command-line interface for csvexport
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Dispatching subcommands (export, make-export, config, completion, version)

pub mod completion;

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::export::{
    CsvExporter, ExportPipeline, JsonLinesSource, LineTerminator, StorageManager,
};
use crate::scaffold;

/// CSV exporter for large datasets
#[derive(Parser, Debug)]
#[command(
    name = "csvexport",
    version,
    about = "Streaming CSV export",
    long_about = "Export large datasets to CSV in fixed-size batches, to a file, \
standard output or a named storage disk, without holding the whole result in memory."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for csvexport
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a JSON Lines file to CSV
    Export(ExportArgs),

    /// Generate a new export source skeleton
    MakeExport {
        /// Type name, optionally nested: `Name` or `Sub/Name`
        #[arg(value_name = "NAME")]
        name: String,

        /// Source directory receiving `export/...`
        #[arg(long, value_name = "DIR", default_value = "src")]
        path: PathBuf,
    },

    /// Show, validate or initialize configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,

        /// List configured storage disks, one per line
        #[arg(long)]
        list_disks: bool,

        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Arguments of the `export` subcommand
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("delivery").required(true).args(["output", "stdout", "disk"])))]
pub struct ExportArgs {
    /// JSON Lines input file, one object per line
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Write the CSV to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stream the CSV to standard output
    #[arg(long)]
    pub stdout: bool,

    /// Store the CSV on this storage disk
    #[arg(long, value_name = "NAME", requires = "store_path")]
    pub disk: Option<String>,

    /// Path of the stored file on the disk
    #[arg(long, value_name = "PATH", requires = "disk")]
    pub store_path: Option<String>,

    /// Rows per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Maximum data rows to export
    #[arg(long, value_name = "N", conflicts_with = "no_cap")]
    pub row_cap: Option<usize>,

    /// Export every row, ignoring any cap
    #[arg(long)]
    pub no_cap: bool,

    /// Prefix output with a UTF-8 byte-order mark
    #[arg(long)]
    pub bom: bool,

    /// Field delimiter
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Enclosure (quote) character
    #[arg(long, value_name = "CHAR")]
    pub enclosure: Option<String>,

    /// Escape character; an empty value disables escaping
    #[arg(long, value_name = "CHAR")]
    pub escape: Option<String>,

    /// Terminate records with CRLF instead of LF
    #[arg(long)]
    pub crlf: bool,

    /// Columns to export (comma separated, dot paths for nested fields)
    #[arg(long, value_name = "COLS", value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Read the input lazily in batches instead of loading it up front
    #[arg(long)]
    pub paginate: bool,

    /// Fail on rows whose value count differs from the heading count
    #[arg(long)]
    pub strict_arity: bool,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and environment, then apply arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        // `config --init` is what creates a missing file
        let path = match &args.command {
            Commands::Config { init: true, .. } => {
                args.config_file.as_deref().filter(|path| path.exists())
            }
            _ => args.config_file.as_deref(),
        };
        let mut config = Config::load(path)?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments on top of file and environment values
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        if let Commands::Export(export) = &args.command {
            Self::apply_dialect_args(config, export);
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Apply dialect and display flags of `export`
    fn apply_dialect_args(config: &mut Config, args: &ExportArgs) {
        if let Some(delimiter) = &args.delimiter {
            config.export.delimiter = delimiter.clone();
        }
        if let Some(enclosure) = &args.enclosure {
            config.export.enclosure = enclosure.clone();
        }
        if let Some(escape) = &args.escape {
            config.export.escape = escape.clone();
        }
        if args.crlf {
            config.export.line_terminator = LineTerminator::CrLf;
        }
        if args.progress {
            config.export.progress = true;
        }
    }

    /// Handle the parsed subcommand
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Export(args) => self.run_export(args).await,
            Commands::MakeExport { name, path } => self.make_export(path, name),
            Commands::Config {
                show,
                validate,
                list_disks,
                init,
            } => {
                if *init {
                    self.init_config_file()?;
                }
                self.handle_config_command(*show, *validate, *list_disks)
            }
            Commands::Completion { shell } => {
                print!("{}", completion::generate_completion(shell)?);
                Ok(())
            }
            Commands::Version => {
                self.show_version();
                Ok(())
            }
        }
    }

    /// Build the exporter for an `export` invocation
    ///
    /// Values from configuration become source defaults; explicit flags are
    /// staged as overrides for the single run.
    fn build_exporter(&self, args: &ExportArgs) -> Result<CsvExporter> {
        self.config.validate()?;

        let pipeline = ExportPipeline::new(self.config.export.dialect()?)
            .with_progress(self.config.export.progress)
            .strict_arity(args.strict_arity);
        let exporter = CsvExporter::new(pipeline)
            .with_storage(StorageManager::from_config(&self.config.storage))
            .with_temp_dir(self.config.storage.temp_dir());

        if let Some(batch_size) = args.batch_size {
            exporter.set_batch_size(batch_size);
        }
        if args.no_cap {
            exporter.set_row_cap(None);
        } else if let Some(row_cap) = args.row_cap {
            exporter.set_row_cap(Some(row_cap));
        }
        if args.bom {
            exporter.include_bom(true);
        }

        Ok(exporter)
    }

    /// Run the `export` subcommand
    async fn run_export(&self, args: &ExportArgs) -> Result<()> {
        let exporter = self.build_exporter(args)?;
        let source = JsonLinesSource::open(
            &args.input,
            args.columns.clone(),
            args.paginate,
            self.config.export.source_defaults(),
        )
        .await?;

        if let Some(output) = &args.output {
            let path = exporter.to_path(&source, output).await?;
            self.report(&format!("Exported to {}", path.display()));
        } else if let (Some(disk), Some(store_path)) = (&args.disk, &args.store_path) {
            let stored = exporter.store(&source, store_path, disk).await?;
            self.report(&format!("Stored on disk {disk} at {stored}"));
        } else {
            let file_name = csv_file_name(&args.input);
            let response = exporter.stream(Arc::new(source), &file_name);
            response.send_to(tokio::io::stdout()).await?;
        }

        Ok(())
    }

    /// Run the `make-export` subcommand
    fn make_export(&self, base: &Path, name: &str) -> Result<()> {
        let path = scaffold::generate(base, name)?;
        self.report(&format!("Export source created: {}", path.display()));
        Ok(())
    }

    /// Show version information
    fn show_version(&self) {
        println!("csvexport version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    /// * `list_disks` - Whether to list disk names
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    fn handle_config_command(&self, show: bool, validate: bool, list_disks: bool) -> Result<()> {
        if validate {
            self.validate_config_file()?;
        }

        if show {
            self.show_config()?;
        }

        if list_disks {
            for name in self.config.storage.disks.keys() {
                println!("{name}");
            }
        }

        Ok(())
    }

    /// Write the default configuration to the config path
    ///
    /// An existing file is left untouched.
    ///
    /// # Returns
    /// * `Result<bool>` - Whether a file was written
    fn init_config_file(&self) -> Result<bool> {
        let path = self.get_config_path();
        if path.exists() {
            println!("Configuration file already exists: {}", path.display());
            return Ok(false);
        }

        Config::default().save(&path)?;
        println!("Wrote default configuration to {}", path.display());
        Ok(true)
    }

    /// Validate configuration file
    fn validate_config_file(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return Ok(());
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }

        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Configuration file: {}", path.display());
        println!();
        println!("=== Effective Configuration ===");
        println!();
        println!("{}", self.config.to_toml()?);

        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Print a status line on stderr unless in quiet mode
    fn report(&self, message: &str) {
        if !self.args.quiet {
            eprintln!("{message}");
        }
    }
}

/// Download name for an input file: `users.jsonl` -> `users.csv`
fn csv_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("export");
    format!("{stem}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ExportError};

    fn interface(argv: &[&str]) -> CliInterface {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        CliInterface { args, config }
    }

    fn export_args(cli: &CliInterface) -> &ExportArgs {
        match &cli.args.command {
            Commands::Export(args) => args,
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn test_export_requires_delivery() {
        assert!(CliArgs::try_parse_from(["csvexport", "export", "in.jsonl"]).is_err());
        assert!(
            CliArgs::try_parse_from(["csvexport", "export", "in.jsonl", "--stdout"]).is_ok()
        );
    }

    #[test]
    fn test_disk_requires_store_path() {
        assert!(
            CliArgs::try_parse_from(["csvexport", "export", "in.jsonl", "--disk", "local"])
                .is_err()
        );
        let args = CliArgs::try_parse_from([
            "csvexport",
            "export",
            "in.jsonl",
            "--disk",
            "local",
            "--store-path",
            "a.csv",
        ])
        .unwrap();
        assert!(matches!(args.command, Commands::Export(ExportArgs { disk: Some(_), .. })));
    }

    #[test]
    fn test_row_cap_conflicts_with_no_cap() {
        assert!(CliArgs::try_parse_from([
            "csvexport",
            "export",
            "in.jsonl",
            "--stdout",
            "--row-cap",
            "5",
            "--no-cap",
        ])
        .is_err());
    }

    #[test]
    fn test_columns_are_split() {
        let cli = interface(&[
            "csvexport",
            "export",
            "in.jsonl",
            "--stdout",
            "--columns",
            "id,address.city",
        ]);
        assert_eq!(
            export_args(&cli).columns,
            Some(vec!["id".to_string(), "address.city".to_string()])
        );
    }

    #[test]
    fn test_dialect_flags_override_config() {
        let cli = interface(&[
            "csvexport",
            "export",
            "in.jsonl",
            "--stdout",
            "--delimiter",
            ";",
            "--escape",
            "",
            "--crlf",
        ]);
        let dialect = cli.config().export.dialect().unwrap();
        assert_eq!(dialect.delimiter, b';');
        assert_eq!(dialect.escape, None);
        assert_eq!(dialect.terminator, LineTerminator::CrLf);
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = interface(&["csvexport", "-v", "version"]);
        assert_eq!(cli.config().logging.level, LogLevel::Debug);

        let cli = interface(&["csvexport", "version", "--vv"]);
        assert_eq!(cli.config().logging.level, LogLevel::Trace);

        let cli = interface(&["csvexport", "-q", "version"]);
        assert_eq!(cli.config().logging.level, LogLevel::Error);
    }

    #[test]
    fn test_flags_become_staged_overrides() {
        let cli = interface(&[
            "csvexport",
            "export",
            "in.jsonl",
            "--stdout",
            "--batch-size",
            "10",
            "--no-cap",
            "--bom",
        ]);
        let exporter = cli.build_exporter(export_args(&cli)).unwrap();

        let staged = exporter.staged();
        assert_eq!(staged.batch_size, Some(10));
        assert_eq!(staged.row_cap, Some(crate::export::RowCap::Unlimited));
        assert_eq!(staged.bom_enabled, Some(true));
    }

    #[test]
    fn test_bad_delimiter_rejected() {
        let cli = interface(&[
            "csvexport",
            "export",
            "in.jsonl",
            "--stdout",
            "--delimiter",
            "::",
        ]);
        let err = cli.build_exporter(export_args(&cli)).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("users.jsonl");
        let output = dir.path().join("out/users.csv");
        std::fs::write(&input, "{\"id\":1,\"name\":\"Ann\"}\n{\"id\":2,\"name\":\"Bo, Jr\"}\n")
            .unwrap();

        let cli = interface(&[
            "csvexport",
            "-q",
            "export",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--row-cap",
            "1",
        ]);
        cli.run().await.unwrap();

        let csv = std::fs::read_to_string(&output).unwrap();
        assert_eq!(csv, "id,name\n1,Ann\n");
    }

    #[tokio::test]
    async fn test_export_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("users.jsonl");
        std::fs::write(&input, "{\"id\":1}\n").unwrap();

        let mut cli = interface(&[
            "csvexport",
            "-q",
            "export",
            input.to_str().unwrap(),
            "--disk",
            "archive",
            "--store-path",
            "reports/users.csv",
        ]);
        cli.config.storage.disks.insert(
            "archive".to_string(),
            crate::config::DiskConfig {
                root: dir.path().join("archive"),
            },
        );
        cli.config.storage.temp_dir = Some(dir.path().to_path_buf());
        cli.run().await.unwrap();

        let stored = std::fs::read_to_string(dir.path().join("archive/reports/users.csv")).unwrap();
        assert_eq!(stored, "id\n1\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_make_export() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();
        let cli = interface(&["csvexport", "-q", "make-export", "Sub/Orders", "--path", base]);

        let Commands::MakeExport { name, path } = &cli.args.command else {
            panic!("expected make-export");
        };
        cli.make_export(path, name).unwrap();
        assert!(dir.path().join("export/sub/orders.rs").exists());
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let path_arg = path.to_str().unwrap();
        let argv = ["csvexport", "-c", path_arg, "config", "--init"];
        let cli = CliInterface::from_args(CliArgs::try_parse_from(argv).unwrap()).unwrap();

        assert!(cli.init_config_file().unwrap());
        assert_eq!(Config::from_file(&path).unwrap(), Config::default());

        std::fs::write(&path, "[export]\nbom = true\n").unwrap();
        assert!(!cli.init_config_file().unwrap());
        assert!(Config::from_file(&path).unwrap().export.bom);
    }

    #[test]
    fn test_csv_file_name() {
        assert_eq!(csv_file_name(Path::new("data/users.jsonl")), "users.csv");
        assert_eq!(csv_file_name(Path::new("/")), "export.csv");
    }
}
