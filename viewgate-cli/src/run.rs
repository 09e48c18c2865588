//! The `viewgate` reconciliation command.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use viewgate_core::{
    load_config_file, ApplicationId, ApplicationReport, HandlerCatalog, MessageCatalog,
    ReconcileMode, ReconcileOptions, ReconcileReport, StaticCatalog, ViewGate, ViewGateConfig,
};

use crate::error::CliError;
use crate::store::{SqlitePermissionStore, DEFAULT_DATABASE};

/// Reconcile per-handler view permissions with the handler manifest
#[derive(Parser, Debug, Clone)]
#[command(name = "viewgate")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Applications to reconcile (default: configured list, or every application)
    #[arg(value_name = "APPS")]
    pub apps: Vec<String>,

    /// Handler manifest (JSON)
    #[arg(long)]
    pub manifest: PathBuf,

    /// Configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Permission database
    #[arg(long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Permission key prefix, overrides the configuration
    #[arg(long = "perm-prefix")]
    pub perm_prefix: Option<String>,

    /// Locale for label overrides, overrides the configuration
    #[arg(long)]
    pub language: Option<String>,

    /// Label translations (JSON, `{"<locale>": {"<token>": "<text>"}}`)
    #[arg(long)]
    pub messages: Option<PathBuf>,

    /// Delete every permission of the selected applications
    #[arg(long, conflicts_with_all = ["prune_stale", "create_only"])]
    pub delete_perms: bool,

    /// Only delete permissions whose handler is gone or ignored
    #[arg(long, conflicts_with = "create_only")]
    pub prune_stale: bool,

    /// Only create missing permissions
    #[arg(long)]
    pub create_only: bool,

    /// Rewrite labels of existing permissions whose translation changed
    #[arg(long)]
    pub refresh_labels: bool,

    /// Applications reconciled concurrently
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Mode selected by the flags. Without one, create and prune.
    pub fn mode(&self) -> ReconcileMode {
        if self.delete_perms {
            ReconcileMode::RemoveAll
        } else if self.prune_stale {
            ReconcileMode::PruneOrphaned
        } else if self.create_only {
            ReconcileMode::Create
        } else {
            ReconcileMode::CreateAndPrune
        }
    }

    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions::new(self.mode()).with_refresh_labels(self.refresh_labels)
    }
}

/// Load everything the run needs and reconcile.
///
/// Errors returned here are setup failures. Per-application failures are
/// in the report.
pub async fn run(args: &Args) -> Result<ReconcileReport, CliError> {
    if args.jobs == 0 {
        return Err(CliError::InvalidArguments(
            "--jobs must be at least 1".to_string(),
        ));
    }

    let mut config = match &args.config {
        Some(path) => load_config_file(path).await?,
        None => ViewGateConfig::default(),
    };
    if let Some(prefix) = &args.perm_prefix {
        config.prefix = prefix.clone();
    }
    if let Some(language) = &args.language {
        config.language = Some(language.clone());
    }
    if args.messages.is_some() && config.language.is_none() {
        return Err(CliError::InvalidArguments(
            "--messages needs a locale from --language or the configured language".to_string(),
        ));
    }

    let catalog = StaticCatalog::load_manifest_file(&args.manifest).await?;
    info!(
        applications = catalog.applications().len(),
        handlers = catalog.handler_count(),
        "Manifest loaded"
    );

    let store = SqlitePermissionStore::new(&args.database)?;

    let locale = config.language.clone().unwrap_or_default();
    let mut builder = ViewGate::builder()
        .config(config)
        .catalog(Arc::new(catalog))
        .store(Arc::new(store));

    match &args.messages {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await?;
            let messages = MessageCatalog::from_json(&content, locale.as_str())?;
            if !messages.has_locale(&locale) {
                warn!(
                    locale = %locale,
                    path = %path.display(),
                    "No messages for locale, labels will not be translated"
                );
            }
            builder = builder.messages(messages);
        }
        None if args.language.is_some() => {
            warn!("--language given without --messages, labels will not be translated");
        }
        None => {}
    }

    let gate = builder.build()?;
    if !gate.config().ignore.is_empty() {
        info!(ignored = ?gate.config().ignore, "Ignoring handlers");
    }

    let applications = if args.apps.is_empty() {
        gate.target_applications()
    } else {
        args.apps.iter().map(ApplicationId::new).collect()
    };

    let report = gate
        .reconciler()
        .with_concurrency(args.jobs)
        .reconcile(&applications, args.options())
        .await;
    Ok(report)
}

/// One summary line for a successful application.
pub fn summary_line(report: &ApplicationReport) -> String {
    format!(
        "{}: {} created, {} relabeled, {} deleted, {} conflicts, {} ignored, {} unchanged",
        report.application,
        report.created.len(),
        report.relabeled.len(),
        report.deleted.len(),
        report.conflicts.len(),
        report.ignored.len(),
        report.unchanged,
    )
}

/// Print one line per application, successes first.
pub fn print_report(report: &ReconcileReport) {
    for app in &report.applications {
        println!("{}", summary_line(app));
    }
    for failure in &report.failures {
        eprintln!("{}: failed: {}", failure.application, failure.error);
    }
}

/// Process exit code for a finished run.
pub fn exit_code(report: &ReconcileReport) -> u8 {
    if report.is_success() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use viewgate_core::{PermissionKey, PermissionStore};

    const MANIFEST: &str = r#"{
        "applications": [
            {"name": "billing", "handlers": [
                {"module": "billing.views", "name": "Invoice", "kind": "class",
                 "routes": ["/invoices/:id"], "label": "billing.invoice"},
                {"module": "billing.views", "name": "health"}
            ]},
            {"name": "blog", "handlers": [
                {"module": "blog.views", "name": "index", "routes": ["/blog"]}
            ]}
        ]
    }"#;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::File::create(dir.path().join("manifest.json"))
                .unwrap()
                .write_all(MANIFEST.as_bytes())
                .unwrap();
            Self { dir }
        }

        fn write(&self, name: &str, content: &str) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path.display().to_string()
        }

        fn args(&self, extra: &[&str]) -> Args {
            let manifest = self.dir.path().join("manifest.json").display().to_string();
            let database = self.dir.path().join("db").join("perms.db").display().to_string();
            let mut argv = vec![
                "viewgate".to_string(),
                "--manifest".to_string(),
                manifest,
                "--database".to_string(),
                database,
            ];
            argv.extend(extra.iter().map(|s| s.to_string()));
            Args::try_parse_from(argv).unwrap()
        }

        fn store(&self) -> SqlitePermissionStore {
            SqlitePermissionStore::new(self.dir.path().join("db").join("perms.db")).unwrap()
        }
    }

    #[test]
    fn test_mode_flags() {
        let fixture = Fixture::new();
        assert_eq!(fixture.args(&[]).mode(), ReconcileMode::CreateAndPrune);
        assert_eq!(fixture.args(&["--create-only"]).mode(), ReconcileMode::Create);
        assert_eq!(fixture.args(&["--prune-stale"]).mode(), ReconcileMode::PruneOrphaned);
        assert_eq!(fixture.args(&["--delete-perms"]).mode(), ReconcileMode::RemoveAll);
        assert!(fixture.args(&["--refresh-labels"]).options().refresh_labels);
    }

    #[test]
    fn test_conflicting_mode_flags() {
        let result = Args::try_parse_from([
            "viewgate",
            "--manifest",
            "m.json",
            "--delete-perms",
            "--prune-stale",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_manifest_is_required() {
        assert!(Args::try_parse_from(["viewgate"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let fixture = Fixture::new();
        assert_eq!(fixture.args(&["-vv"]).verbose, 2);
        assert_eq!(fixture.args(&[]).database.file_name().unwrap(), "perms.db");
    }

    #[tokio::test]
    async fn test_default_run_creates_everything() {
        let fixture = Fixture::new();
        let report = run(&fixture.args(&[])).await.unwrap();

        assert!(report.is_success());
        assert_eq!(exit_code(&report), 0);
        assert_eq!(report.created(), 3);
        assert_eq!(
            summary_line(&report.applications[0]),
            "billing: 2 created, 0 relabeled, 0 deleted, 0 conflicts, 0 ignored, 0 unchanged"
        );

        let record = fixture
            .store()
            .get_permission(&PermissionKey::new("access_view_billing.views.Invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "billing.views.Invoice");
    }

    #[tokio::test]
    async fn test_selected_apps_and_prefix() {
        let fixture = Fixture::new();
        let report = run(&fixture.args(&["blog", "--perm-prefix", "can_"]))
            .await
            .unwrap();

        assert_eq!(report.applications.len(), 1);
        assert_eq!(
            report.applications[0].created,
            vec![PermissionKey::new("can_blog.views.index")]
        );
    }

    #[tokio::test]
    async fn test_unknown_app_fails_with_exit_one() {
        let fixture = Fixture::new();
        let report = run(&fixture.args(&["blog", "nope"])).await.unwrap();

        assert_eq!(report.applications.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(exit_code(&report), 1);
    }

    #[tokio::test]
    async fn test_config_and_messages() {
        let fixture = Fixture::new();
        let config = fixture.write(
            "viewgate.json",
            r#"{"ignore": ["billing.views.health"], "language": "de"}"#,
        );
        let messages = fixture.write(
            "messages.json",
            r#"{"de": {"billing.invoice": "Rechnung"}, "en": {"billing.invoice": "Invoice"}}"#,
        );

        let report = run(&fixture.args(&["billing", "--config", &config, "--messages", &messages]))
            .await
            .unwrap();
        assert_eq!(report.applications[0].created.len(), 1);
        assert_eq!(report.applications[0].ignored.len(), 1);

        let record = fixture
            .store()
            .get_permission(&PermissionKey::new("access_view_billing.views.Invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "Rechnung");

        // --language overrides the configured locale, --refresh-labels applies it
        run(&fixture.args(&[
            "billing",
            "--config",
            &config,
            "--messages",
            &messages,
            "--language",
            "en",
            "--refresh-labels",
        ]))
        .await
        .unwrap();
        let record = fixture
            .store()
            .get_permission(&PermissionKey::new("access_view_billing.views.Invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "Invoice");
    }

    #[tokio::test]
    async fn test_delete_perms() {
        let fixture = Fixture::new();
        run(&fixture.args(&[])).await.unwrap();

        let report = run(&fixture.args(&["billing", "--delete-perms"])).await.unwrap();
        assert_eq!(report.deleted(), 2);
        assert!(!fixture
            .store()
            .has_permissions(&ApplicationId::new("billing"))
            .await
            .unwrap());
        assert!(fixture
            .store()
            .has_permissions(&ApplicationId::new("blog"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_setup_errors() {
        let fixture = Fixture::new();

        let mut args = fixture.args(&[]);
        args.manifest = fixture.dir.path().join("missing.json");
        assert!(matches!(run(&args).await, Err(CliError::Catalog(_))));

        let bad = fixture.write("bad.json", r#"{"ignore": [""]}"#);
        let args = fixture.args(&["--config", &bad]);
        assert!(matches!(run(&args).await, Err(CliError::Config(_))));

        let args = fixture.args(&["--jobs", "0"]);
        assert!(matches!(run(&args).await, Err(CliError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_messages_require_a_locale() {
        let fixture = Fixture::new();
        let messages = fixture.write("messages.json", r#"{"en": {"billing.invoice": "Invoice"}}"#);

        let result = run(&fixture.args(&["--messages", &messages])).await;
        assert!(matches!(result, Err(CliError::InvalidArguments(_))));
        assert!(!fixture.dir.path().join("db").exists());

        let report = run(&fixture.args(&["--messages", &messages, "--language", "en"]))
            .await
            .unwrap();
        assert!(report.is_success());
        let record = fixture
            .store()
            .get_permission(&PermissionKey::new("access_view_billing.views.Invoice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.label, "Invoice");
    }
}
