use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use trellis::hot_reload::{ChangeType, DevReloader, FileChange};
use trellis::trellis_router::{ManifestBuilder, ManifestConfig};
use trellis::{App, ComponentModule, ModuleRegistry, Rendered, Request};

fn touch(root: &Path, file: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

fn heading(html: &'static str) -> anyhow::Result<ComponentModule> {
    Ok(ComponentModule::from_fn(move |_, _, _| Ok(Rendered::html(html))))
}

#[tokio::test]
async fn test_change_rebuilds_manifest_and_invalidates_modules() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "src/routes/index.rsx");

    let config = ManifestConfig::default().with_root(dir.path());
    let manifest = ManifestBuilder::new(config.clone()).build().unwrap();

    let registry = Arc::new(
        ModuleRegistry::new()
            .with_component("src/routes/index.rsx", || heading("<h1>Home</h1>"))
            .with_component("src/routes/about.rsx", || heading("<h1>About</h1>")),
    );
    let app = App::builder(manifest, registry.clone()).build();

    assert_eq!(app.render(&Request::get("/")).await.unwrap().status, 200);
    assert!(app.render(&Request::get("/about")).await.map(|r| r.status) == Some(404));
    assert!(registry.is_cached("src/routes/index.rsx").await);

    touch(dir.path(), "src/routes/about.rsx");
    let reloader = DevReloader::new(app.clone(), config);

    let invalidated = reloader
        .apply(&FileChange {
            path: dir.path().join("src/routes/index.rsx"),
            change_type: ChangeType::Route,
        })
        .await
        .unwrap();

    assert_eq!(invalidated, vec!["src/routes/index.rsx"]);
    assert!(!registry.is_cached("src/routes/index.rsx").await);

    let about = app.render(&Request::get("/about")).await.unwrap();
    assert_eq!(about.status, 200);
    assert!(about.text_body().contains("<h1>About</h1>"));
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_manifest() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "src/routes/about.rsx");

    let config = ManifestConfig::default().with_root(dir.path());
    let manifest = ManifestBuilder::new(config.clone()).build().unwrap();
    let registry = ModuleRegistry::new().with_component("src/routes/about.rsx", || heading("<h1>About</h1>"));
    let app = App::builder(manifest, Arc::new(registry)).build();

    // Clashes with about.rsx
    touch(dir.path(), "src/routes/about/index.rsx");

    let reloader = DevReloader::new(app.clone(), config);
    let result = reloader
        .apply(&FileChange {
            path: dir.path().join("src/routes/about/index.rsx"),
            change_type: ChangeType::Route,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(app.manifest().await.pages.len(), 1);
    assert_eq!(app.render(&Request::get("/about")).await.unwrap().status, 200);
}
