//! Command line front ends for `pull-data` and `push-data`.
//!
//! Arguments are turned into a plan by a single validation step that never
//! touches a database. Only a valid plan is connected and executed.

use crate::config::Settings;
use crate::database::{PgTableStore, TableStore};
use crate::domains::catalog::{select_tables, TableCatalog, TableSelection};
use crate::domains::connection::ConnectionDescriptor;
use crate::domains::export::{ExportOptions, ExportSummary, Exporter};
use crate::domains::import::{ImportOptions, ImportSummary, Importer};
use crate::domains::rewrite::HostnameRewriteRule;
use crate::errors::{ConfigError, ConfigResult, SyncResult};
use crate::types::FailurePolicy;
use crate::validation::{HostnameFlags, Validate};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pull-data",
    version,
    about = "Export SuiteC tables from a database into CSV files"
)]
pub struct PullArgs {
    #[arg(
        short = 'd',
        long = "database",
        value_name = "HOST:PORT:DATABASE:USERNAME",
        help = "Source database"
    )]
    pub database: String,

    #[arg(short = 'a', long = "all", help = "Include the canvas table")]
    pub include_canvas: bool,

    #[arg(
        short = 'c',
        long = "canvas-hostname",
        value_name = "HOSTNAME",
        help = "Only export rows belonging to this Canvas hostname"
    )]
    pub canvas_hostname: Option<String>,

    #[arg(
        short = 'r',
        long = "replacement-hostname",
        value_name = "HOSTNAME",
        help = "Rewrite references to the -c hostname to this one (requires -c)"
    )]
    pub replacement_hostname: Option<String>,

    #[arg(long, value_name = "DIR", help = "CSV directory (default: $CSV_FILES_DIR or csv_files)")]
    pub csv_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "JSON table catalog replacing the built-in one")]
    pub catalog: Option<PathBuf>,

    #[arg(short = 'k', long, help = "Continue with the next table after a failure")]
    pub keep_going: bool,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "push-data",
    version,
    about = "Import CSV files into a SuiteC database, replacing table contents"
)]
pub struct PushArgs {
    #[arg(
        short = 'd',
        long = "database",
        value_name = "HOST:PORT:DATABASE:USERNAME",
        help = "Destination database"
    )]
    pub database: String,

    #[arg(short = 'a', long = "all", help = "Include the canvas table")]
    pub include_canvas: bool,

    #[arg(short = 'i', long = "inactive", help = "Mark imported courses inactive")]
    pub mark_inactive: bool,

    #[arg(
        short = 'c',
        long = "canvas-hostname",
        value_name = "HOSTNAME",
        help = "Hostname to rewrite at import time (requires -r)"
    )]
    pub canvas_hostname: Option<String>,

    #[arg(
        short = 'r',
        long = "replacement-hostname",
        value_name = "HOSTNAME",
        help = "Replacement for the -c hostname (requires -c)"
    )]
    pub replacement_hostname: Option<String>,

    #[arg(long, value_name = "DIR", help = "CSV directory (default: $CSV_FILES_DIR or csv_files)")]
    pub csv_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "JSON table catalog replacing the built-in one")]
    pub catalog: Option<PathBuf>,

    #[arg(short = 'k', long, help = "Continue with the next table after a failure")]
    pub keep_going: bool,
}

/// A validated pull invocation
#[derive(Debug, Clone)]
pub struct PullPlan {
    pub source: ConnectionDescriptor,
    pub selection: TableSelection,
    pub options: ExportOptions,
}

/// A validated push invocation
#[derive(Debug, Clone)]
pub struct PushPlan {
    pub destination: ConnectionDescriptor,
    pub selection: TableSelection,
    pub options: ImportOptions,
}

fn load_catalog(path: Option<&PathBuf>) -> ConfigResult<TableCatalog> {
    match path {
        Some(path) => TableCatalog::from_json_file(path),
        None => Ok(TableCatalog::suitec()),
    }
}

fn failure_policy(keep_going: bool) -> FailurePolicy {
    if keep_going {
        FailurePolicy::KeepGoing
    } else {
        FailurePolicy::FailFast
    }
}

impl PullArgs {
    fn hostname_flags(&self) -> HostnameFlags {
        HostnameFlags {
            canvas_hostname: self.canvas_hostname.clone(),
            replacement_hostname: self.replacement_hostname.clone(),
        }
    }

    pub fn plan(&self, settings: &Settings) -> ConfigResult<PullPlan> {
        self.validate()?;
        let source = ConnectionDescriptor::parse(&self.database)?;
        let catalog = load_catalog(self.catalog.as_ref())?;

        let mut options =
            ExportOptions::new(self.csv_dir.clone().unwrap_or_else(|| settings.csv_dir.clone()));
        options.rewrite = HostnameRewriteRule::from_flags(&self.hostname_flags())?;
        options.batch_size = settings.batch_size;
        options.failure_policy = failure_policy(self.keep_going);
        options.source = Some(source.to_string());

        Ok(PullPlan {
            selection: select_tables(
                &catalog,
                self.include_canvas,
                self.canvas_hostname.as_deref(),
            ),
            source,
            options,
        })
    }
}

impl Validate for PullArgs {
    fn validate(&self) -> ConfigResult<()> {
        self.hostname_flags().validate()
    }
}

impl PushArgs {
    fn hostname_flags(&self) -> HostnameFlags {
        HostnameFlags {
            canvas_hostname: self.canvas_hostname.clone(),
            replacement_hostname: self.replacement_hostname.clone(),
        }
    }

    pub fn plan(&self, settings: &Settings) -> ConfigResult<PushPlan> {
        self.validate()?;
        let destination = ConnectionDescriptor::parse(&self.database)?;
        let catalog = load_catalog(self.catalog.as_ref())?;

        let mut options =
            ImportOptions::new(self.csv_dir.clone().unwrap_or_else(|| settings.csv_dir.clone()));
        options.rewrite = HostnameRewriteRule::from_flags(&self.hostname_flags())?;
        options.mark_inactive = self.mark_inactive;
        options.failure_policy = failure_policy(self.keep_going);

        Ok(PushPlan {
            destination,
            selection: select_tables(&catalog, self.include_canvas, None),
            options,
        })
    }
}

impl Validate for PushArgs {
    fn validate(&self) -> ConfigResult<()> {
        // On push -c only names the host to rewrite, so it needs -r too
        if self.canvas_hostname.is_some() && self.replacement_hostname.is_none() {
            return Err(ConfigError::flag_combination("-c", "-r"));
        }
        self.hostname_flags().validate()
    }
}

pub async fn execute_pull(plan: &PullPlan, store: Arc<dyn TableStore>) -> SyncResult<ExportSummary> {
    Exporter::new(store, plan.options.clone())
        .export_all(&plan.selection)
        .await
}

pub async fn execute_push(plan: &PushPlan, store: Arc<dyn TableStore>) -> SyncResult<ImportSummary> {
    Importer::new(store, plan.options.clone())
        .import_all(&plan.selection)
        .await
}

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}

async fn connect(descriptor: &ConnectionDescriptor, settings: &Settings) -> SyncResult<Arc<dyn TableStore>> {
    let store = PgTableStore::connect(
        descriptor,
        settings.password.as_deref(),
        settings.connect_timeout,
    )
    .await?;
    Ok(Arc::new(store))
}

pub async fn run_pull(args: PullArgs) -> SyncResult<ExportSummary> {
    let settings = Settings::load()?;
    let plan = args.plan(&settings)?;
    let store = connect(&plan.source, &settings).await?;
    execute_pull(&plan, store).await
}

pub async fn run_push(args: PushArgs) -> SyncResult<ImportSummary> {
    let settings = Settings::load()?;
    let plan = args.plan(&settings)?;
    let store = connect(&plan.destination, &settings).await?;
    execute_push(&plan, store).await
}

/// Entry point of the `pull-data` binary; returns the process exit code
pub async fn pull_main() -> i32 {
    let args = PullArgs::parse();
    init_logging();
    match run_pull(args).await {
        Ok(_) => 0,
        Err(e) => {
            log::error!("pull-data failed: {}", e);
            e.exit_code()
        }
    }
}

/// Entry point of the `push-data` binary; returns the process exit code
pub async fn push_main() -> i32 {
    let args = PushArgs::parse();
    init_logging();
    match run_push(args).await {
        Ok(_) => 0,
        Err(e) => {
            log::error!("push-data failed: {}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull(args: &[&str]) -> PullArgs {
        PullArgs::try_parse_from(std::iter::once("pull-data").chain(args.iter().copied())).unwrap()
    }

    fn push(args: &[&str]) -> PushArgs {
        PushArgs::try_parse_from(std::iter::once("push-data").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_pull_plan_with_filter_and_rewrite() {
        let args = pull(&[
            "-d",
            "db.internal:5432:suitec:svc",
            "-c",
            "canvas.old.edu",
            "-r",
            "canvas.new.edu",
            "--csv-dir",
            "/tmp/out",
            "-k",
        ]);
        let plan = args.plan(&Settings::default()).unwrap();

        assert_eq!(plan.source.port, 5432);
        assert_eq!(plan.selection.canvas_hostname_filter.as_deref(), Some("canvas.old.edu"));
        assert!(!plan.selection.names().contains(&"canvas"));
        assert_eq!(plan.options.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(plan.options.failure_policy, FailurePolicy::KeepGoing);
        let rule = plan.options.rewrite.unwrap();
        assert_eq!(rule.match_host(), "canvas.old.edu");
        assert_eq!(rule.replacement_host(), "canvas.new.edu");
    }

    #[test]
    fn test_pull_defaults() {
        let settings = Settings {
            csv_dir: PathBuf::from("from_env"),
            batch_size: 50,
            ..Settings::default()
        };
        let plan = pull(&["-d", "h:1:d:u", "-a"]).plan(&settings).unwrap();
        assert!(plan.selection.names().contains(&"canvas"));
        assert_eq!(plan.selection.canvas_hostname_filter, None);
        assert_eq!(plan.options.output_dir, PathBuf::from("from_env"));
        assert_eq!(plan.options.batch_size, 50);
        assert_eq!(plan.options.failure_policy, FailurePolicy::FailFast);
        assert!(plan.options.rewrite.is_none());
    }

    #[test]
    fn test_replacement_without_canvas_hostname_is_rejected() {
        let err = pull(&["-d", "h:1:d:u", "-r", "canvas.new.edu"])
            .plan(&Settings::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::flag_combination("-r", "-c"));

        let err = push(&["-d", "h:1:d:u", "-r", "canvas.new.edu"])
            .plan(&Settings::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::flag_combination("-r", "-c"));
    }

    #[test]
    fn test_push_canvas_hostname_needs_replacement() {
        let err = push(&["-d", "h:1:d:u", "-c", "canvas.old.edu"])
            .plan(&Settings::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::flag_combination("-c", "-r"));
    }

    #[test]
    fn test_bad_connection_string_is_a_config_error() {
        let err = pull(&["-d", "h:port:d:u"]).plan(&Settings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ConnectionStringFormat { .. }));
    }

    #[test]
    fn test_push_plan() {
        let plan = push(&["-d", "h:5432:d:u", "-i"]).plan(&Settings::default()).unwrap();
        assert!(plan.options.mark_inactive);
        assert!(plan.options.rewrite.is_none());
        assert_eq!(plan.selection.canvas_hostname_filter, None);
        assert_eq!(plan.options.input_dir, PathBuf::from("csv_files"));
    }

    #[test]
    fn test_missing_database_flag_is_a_usage_error() {
        let err = PullArgs::try_parse_from(["pull-data", "-a"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
