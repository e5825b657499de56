use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use amend_core::AmendError;
use amend_core::AmenderRegistry;
use amend_core::Driver;
use amend_core::LEDGER_KEY;
use amend_core::Mode;
use amend_core::NpmLsLocator;
use amend_core::RunOptions;
use amend_core::StaticLocator;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::Project;
use super::read_json;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_installed_copy_is_amended_once() -> anyhow::Result<()> {
    let project = Project::new();
    let top = project.package("zrender", json!({"version": "5.4.4"}));
    let nested = project.package("echarts/node_modules/zrender", json!({"version": "5.1.0"}));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", move |patcher| {
        counter.fetch_add(1, Ordering::SeqCst);
        patcher.set_attribute("type", json!("module"))
    });

    // The top-level copy is listed twice under different spellings.
    let locator = StaticLocator::new().with_package(
        "zrender",
        [top.clone(), nested.clone(), top.join("..").join("zrender")],
    );
    let summary = Driver::new(registry, locator)
        .run(&RunOptions::default())
        .await?;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.targets.len(), 2);
    assert_eq!(summary.report.written, 2);
    for dir in [&top, &nested] {
        assert_eq!(read_json(&dir.join("package.json"))["type"], json!("module"));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_requested_packages_are_processed() -> anyhow::Result<()> {
    let project = Project::new();
    let zrender = project.package("zrender", json!({"version": "5.4.4"}));
    let echarts = project.package("echarts", json!({"version": "5.4.3"}));

    let mut registry = AmenderRegistry::new();
    for name in ["zrender", "echarts"] {
        registry.register_fn(name, |patcher| patcher.set_attribute("type", json!("module")));
    }
    let locator = StaticLocator::new()
        .with_package("zrender", [zrender.clone()])
        .with_package("echarts", [echarts.clone()]);

    let options = RunOptions {
        packages: vec!["echarts".to_string()],
        ..RunOptions::default()
    };
    let summary = Driver::new(registry, locator).run(&options).await?;

    assert_eq!(summary.packages, vec!["echarts".to_string()]);
    assert_eq!(read_json(&echarts.join("package.json"))["type"], json!("module"));
    assert_eq!(read_json(&zrender.join("package.json")).get(LEDGER_KEY), None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keep_going_still_blocks_the_commit() -> anyhow::Result<()> {
    let project = Project::new();
    let dirs: Vec<_> = (0..4)
        .map(|i| project.package(&format!("pkg-{i}"), json!({"version": "1.0.0"})))
        .collect();
    let broken = project.root.path().join("node_modules").join("not-installed");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut registry = AmenderRegistry::new();
    registry.register_fn("pkg", move |patcher| {
        counter.fetch_add(1, Ordering::SeqCst);
        patcher.set_attribute("type", json!("module"))
    });
    let locator = StaticLocator::new()
        .with_package("pkg", dirs.iter().cloned())
        .with_package("pkg", [broken.clone()]);

    let options = RunOptions {
        fail_fast: false,
        ..RunOptions::default()
    };
    let result = Driver::new(registry, locator).run(&options).await;

    assert!(matches!(result, Err(AmendError::NotADirectory(path)) if path == broken));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    for dir in &dirs {
        assert_eq!(read_json(&dir.join("package.json")), json!({"version": "1.0.0"}));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_package_fails_before_locating() {
    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", |_| Ok(()));
    let options = RunOptions {
        packages: vec!["vue-echarts".to_string()],
        mode: Mode::Revert,
        ..RunOptions::default()
    };
    let result = Driver::new(registry, StaticLocator::new())
        .run(&options)
        .await;
    assert!(matches!(result, Err(AmendError::UnknownPackage(name)) if name == "vue-echarts"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn npm_ls_output_drives_the_run() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let project = Project::new();
    let dir = project.package("resize-detector", json!({"version": "0.3.0"}));

    // Stand-in for `npm ls --parseable resize-detector`: prints the project
    // root first, like npm does, then exits non-zero.
    let fake_npm = project.root.path().join("fake-npm");
    std::fs::write(
        &fake_npm,
        format!(
            "#!/bin/sh\necho \"{}\"\necho \"{}\"\nexit 1\n",
            project.root.path().display(),
            dir.display()
        ),
    )?;
    std::fs::set_permissions(&fake_npm, std::fs::Permissions::from_mode(0o755))?;

    let mut registry = AmenderRegistry::new();
    registry.register_fn("resize-detector", |patcher| {
        patcher.set_attribute("type", json!("module"))
    });
    let locator = NpmLsLocator::new(project.root.path())
        .with_npm_bin(fake_npm.to_string_lossy().into_owned());

    let summary = Driver::new(registry, locator)
        .run(&RunOptions::default())
        .await?;

    assert_eq!(summary.targets.len(), 1);
    assert_eq!(read_json(&dir.join("package.json"))["type"], json!("module"));
    Ok(())
}
