use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, NamedTempFile, TempDir};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use page_transform_cli::{run, Cli, Commands};

const HOME_PAGE: &str = r#"{
  "id": "home",
  "name": "Home.aspx",
  "url": "/sites/classic/SitePages/Home.aspx",
  "kind": "WikiPage",
  "page_layout": "OneColumn",
  "web_parts": [
    { "type": "WikiText", "row": 1, "column": 1, "properties": { "Text": "<p>Welcome</p>" } }
  ]
}"#;

/// Source folder with one exported page, an empty target folder and a config
/// pointing at both.
fn workspace() -> (TempDir, NamedTempFile) {
    let dir = tempdir().expect("temp dir");
    let source = dir.path().join("source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("home.json"), HOME_PAGE).unwrap();

    let config = NamedTempFile::new().expect("temp config");
    fs::write(
        config.path(),
        format!(
            "source_folder: {}\ntarget_folder: {}\ntarget_site_url: https://contoso.example/sites/intranet/\nstate_folder: {}\n",
            source.display(),
            dir.path().join("target").display(),
            dir.path().join("state").display(),
        ),
    )
    .unwrap();
    (dir, config)
}

fn page_transform() -> Command {
    let mut cmd = Command::cargo_bin("page-transform").expect("Binary exists");
    cmd.env_remove("TARGET_SITE_URL");
    cmd
}

fn page_file(dir: &Path) -> std::path::PathBuf {
    dir.join("target").join("SitePages").join("Migrated_Home.aspx.json")
}

#[test]
fn transform_writes_modern_page_and_reports_completion() {
    let (dir, config) = workspace();

    page_transform()
        .arg("transform")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed").and(predicate::str::contains("1 done")));

    let page: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(page_file(dir.path())).unwrap()).unwrap();
    assert_eq!(page["name"], "Migrated_Home.aspx");
    assert!(page["sections"].as_array().is_some_and(|s| !s.is_empty()));
}

#[test]
fn existing_page_faults_only_its_task() {
    let (dir, config) = workspace();
    let existing = page_file(dir.path());
    fs::create_dir_all(existing.parent().unwrap()).unwrap();
    fs::write(&existing, "{}").unwrap();

    page_transform()
        .arg("transform")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 done, 1 failed"));

    // The page was left untouched.
    assert_eq!(fs::read_to_string(existing).unwrap(), "{}");
}

#[test]
fn status_of_unknown_process_fails() {
    let (_dir, config) = workspace();

    page_transform()
        .arg("status")
        .arg("--config")
        .arg(config.path())
        .arg("--process-id")
        .arg(uuid::Uuid::new_v4().to_string())
        .assert()
        .failure();
}

#[test]
fn missing_config_fails() {
    page_transform()
        .arg("transform")
        .arg("--config")
        .arg("/definitely/not/here.yaml")
        .assert()
        .failure();
}

/// Collects the debug rendering of every emitted event.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let cli = Cli {
        command: Commands::Transform {
            config: "/definitely/not/here.yaml".into(),
            process_id: None,
        },
    };
    assert!(run(cli).await.is_err());

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.contains("trace_initialised")), "{events:#?}");
}
