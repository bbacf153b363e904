use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A minimal Function App project with a .funcignore.
fn project(ignore: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().expect("temp project");
    let root = dir.path();
    write(root, "host.json", "{}");
    write(root, "HttpTrigger/function.json", "{}");
    write(root, "HttpTrigger/__init__.py", "");
    write(root, "bin/a.txt", "a");
    write(root, "bin/keep.txt", "keep");
    write(root, "local.settings.json", r#"{"Values":{}}"#);
    if let Some(rules) = ignore {
        write(root, ".funcignore", rules);
    }
    dir
}

fn func_publish() -> Command {
    let mut cmd = Command::cargo_bin("func-publish").expect("Binary exists");
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn list_included_files_prints_accepted_paths() {
    let dir = project(Some("bin/\n!bin/keep.txt\n"));

    func_publish()
        .args(["publish", "my-app", "--list-included-files", "--project-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(
            "HttpTrigger/__init__.py\nHttpTrigger/function.json\nbin/keep.txt\nhost.json\n",
        );
}

#[test]
fn list_ignored_files_prints_denied_paths_from_subdirectory() {
    let dir = project(Some("bin/\n!bin/keep.txt\n"));

    func_publish()
        .args(["publish", "my-app", "--list-ignored-files", "--project-dir"])
        .arg(dir.path().join("HttpTrigger"))
        .assert()
        .success()
        .stdout("bin/a.txt\n");
}

#[test]
fn list_without_ignore_file_reports_on_stderr() {
    let dir = project(None);

    func_publish()
        .args(["publish", "my-app", "--list-included-files", "--project-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("No .funcignore file"));
}

#[test]
fn overwrite_requires_a_settings_mode() {
    func_publish()
        .args(["publish", "my-app", "-y"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--publish-local-settings").or(predicate::str::contains("required")));
}

#[test]
fn list_modes_conflict_with_settings_modes() {
    func_publish()
        .args(["publish", "my-app", "--list-ignored-files", "-o"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn publish_without_config_fails_with_config_error() {
    let dir = project(None);

    func_publish()
        .args(["publish", "my-app", "--project-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str =
    "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Web/sites/my-app";

#[tokio::test(flavor = "multi_thread")]
async fn rejected_settings_update_does_not_report_upload_success() {
    let server = MockServer::start().await;
    let connection = format!(
        "AccountName=devstore;AccountKey=c2VjcmV0LWtleQ==;BlobEndpoint={}/devstore",
        server.uri()
    );
    Mock::given(method("POST"))
        .and(path(format!("{SITE}/config/appsettings/list")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": { "AzureWebJobsStorage": connection }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex("^/devstore/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{SITE}/config/appsettings")))
        .respond_with(ResponseTemplate::new(409).set_body_string("Conflict: site is busy"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = project(None);
    write(
        dir.path(),
        "func-publish.yaml",
        &format!(
            "function_app:\n  subscription_id: sub-1\n  resource_group: rg-1\narm_endpoint: {}\n",
            server.uri()
        ),
    );
    let root = dir.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        func_publish()
            .env("AZURE_ACCESS_TOKEN", "token-abc")
            .args(["publish", "my-app", "--project-dir"])
            .arg(&root)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stdout.contains("Preparing archive..."));
    assert!(!stdout.contains("Uploading content..."));
    assert!(!stdout.contains("Upload completed successfully."));
    assert!(stderr.contains("Error updating app settings:"));
    assert!(stderr.contains("Conflict: site is busy"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use func_publish::cli::{run, Cli, Commands, PublishArgs};

    let dir = project(None);
    let cli = Cli {
        command: Commands::Publish(PublishArgs {
            app_name: "my-app".into(),
            project_dir: Some(dir.path().to_path_buf()),
            list_included_files: true,
            ..Default::default()
        }),
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
