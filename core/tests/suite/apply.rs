use amend_core::AmendError;
use amend_core::AmenderRegistry;
use amend_core::LEDGER_KEY;
use amend_core::Mode;
use amend_core::PackageRule;
use amend_core::config::SubDocumentRule;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::Project;
use super::read_json;
use super::run;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apply_records_absent_keys_in_ledger() -> anyhow::Result<()> {
    let project = Project::new();
    let dir = project.package("zrender", json!({"version": "5.0.0"}));

    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", |patcher| {
        patcher.set_attribute("type", json!("module"))?;
        patcher.set_attribute("exports", json!({"./*": "./*"}))
    });

    let summary = run(registry, &[("zrender", &dir)], Mode::Apply, false).await?;
    assert_eq!(summary.report.written, 1);

    let manifest = read_json(&dir.join("package.json"));
    assert_eq!(
        manifest,
        json!({
            "version": "5.0.0",
            "type": "module",
            "exports": {"./*": "./*"},
            LEDGER_KEY: {"": {"type": "ABSENT_KEY", "exports": "ABSENT_KEY"}}
        })
    );
    // Key order is part of the on-disk contract.
    let keys: Vec<&String> = manifest.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["version", "type", "exports", LEDGER_KEY]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apply_creates_missing_sub_document() -> anyhow::Result<()> {
    let project = Project::new();
    let dir = project.package("echarts", json!({"version": "5.4.3"}));
    std::fs::create_dir(dir.join("dist"))?;

    let mut registry = AmenderRegistry::new();
    registry.register_fn("echarts", |patcher| {
        patcher.ensure_sub_document(["dist"], |sub| sub.set_attribute("type", json!("commonjs")))
    });

    run(registry, &[("echarts", &dir)], Mode::Apply, false).await?;

    assert_eq!(
        read_json(&dir.join("dist").join("package.json")),
        json!({"type": "commonjs"})
    );
    assert_eq!(
        read_json(&dir.join("package.json"))[LEDGER_KEY],
        json!({"": {}, "dist/package.json": "ABSENT_FILE"})
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn applying_twice_keeps_first_originals() -> anyhow::Result<()> {
    let project = Project::new();
    let dir = project.package("zrender", json!({"version": "5.0.0", "type": "commonjs"}));
    std::fs::create_dir(dir.join("lib"))?;
    std::fs::write(dir.join("lib").join("package.json"), r#"{"sideEffects": true}"#)?;

    let registry = || {
        let mut registry = AmenderRegistry::new();
        registry.register_fn("zrender", |patcher| {
            patcher.set_attribute("type", json!("module"))?;
            patcher.ensure_sub_document(["lib"], |sub| {
                sub.set_attribute("sideEffects", json!(false))
            })
        });
        registry
    };

    run(registry(), &[("zrender", &dir)], Mode::Apply, false).await?;
    let first = read_json(&dir.join("package.json"))[LEDGER_KEY].clone();
    run(registry(), &[("zrender", &dir)], Mode::Apply, false).await?;
    let second = read_json(&dir.join("package.json"))[LEDGER_KEY].clone();

    assert_eq!(first, second);
    assert_eq!(
        second,
        json!({
            "": {"type": {"value": "commonjs"}},
            "lib/package.json": {"sideEffects": {"value": true}}
        })
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_amender_prevents_every_write() -> anyhow::Result<()> {
    let project = Project::new();
    let good = project.package("zrender", json!({"version": "5.0.0"}));
    let bad = project.package("echarts", json!({"version": "5.4.0"}));
    let good_before = std::fs::read_to_string(good.join("package.json"))?;
    let bad_before = std::fs::read_to_string(bad.join("package.json"))?;

    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", |patcher| {
        patcher.set_attribute("type", json!("module"))
    });
    registry.register_fn("echarts", |patcher| {
        patcher.set_attribute("type", json!("module"))?;
        patcher.expect_version("5.1.2")
    });

    let result = run(
        registry,
        &[("zrender", &good), ("echarts", &bad)],
        Mode::Apply,
        false,
    )
    .await;

    assert!(matches!(result, Err(AmendError::VersionMismatch { .. })));
    assert_eq!(std::fs::read_to_string(good.join("package.json"))?, good_before);
    assert_eq!(std::fs::read_to_string(bad.join("package.json"))?, bad_before);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn amender_error_blocks_sub_documents_too() -> anyhow::Result<()> {
    let project = Project::new();
    let dir = project.package("zrender", json!({"version": "5.0.0", "main": "index.js"}));
    std::fs::create_dir(dir.join("dist"))?;
    let before = std::fs::read_to_string(dir.join("package.json"))?;

    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", |patcher| {
        patcher.set_attribute("type", json!("module"))?;
        patcher.ensure_sub_document(["dist"], |sub| sub.set_attribute("type", json!("commonjs")))?;
        if patcher.get_attribute_clone("module").is_none() {
            return Err(AmendError::amender(
                patcher.package_name(),
                "no \"module\" entry to point exports at",
            ));
        }
        Ok(())
    });

    let result = run(registry, &[("zrender", &dir)], Mode::Apply, false).await;

    match result {
        Err(AmendError::Amender { package, message }) => {
            assert_eq!(package, "zrender");
            assert_eq!(message, "no \"module\" entry to point exports at");
        }
        other => panic!("expected an amender error, got {other:?}"),
    }
    assert_eq!(std::fs::read_to_string(dir.join("package.json"))?, before);
    assert!(!dir.join("dist").join("package.json").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dry_run_leaves_tree_untouched() -> anyhow::Result<()> {
    let project = Project::new();
    let dir = project.package("zrender", json!({"version": "5.0.0"}));
    std::fs::create_dir(dir.join("dist"))?;
    let before = std::fs::read_to_string(dir.join("package.json"))?;

    let mut registry = AmenderRegistry::new();
    registry.register_fn("zrender", |patcher| {
        patcher.set_attribute("type", json!("module"))?;
        patcher.ensure_sub_document(["dist"], |sub| sub.set_attribute("type", json!("commonjs")))
    });

    let summary = run(registry, &[("zrender", &dir)], Mode::Apply, true).await?;
    assert_eq!(summary.report.written, 2);
    assert_eq!(std::fs::read_to_string(dir.join("package.json"))?, before);
    assert!(!dir.join("dist").join("package.json").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declarative_rule_skips_packages_with_exports() -> anyhow::Result<()> {
    let project = Project::new();
    let patched = project.package("zrender", json!({"version": "5.4.4"}));
    let shipped = project.package("echarts", json!({"version": "5.5.0", "exports": {".": "./index.js"}}));
    std::fs::create_dir(patched.join("dist"))?;

    let rule = PackageRule {
        skip_if_present: vec!["exports".to_string()],
        set: [
            ("type".to_string(), json!("module")),
            ("exports".to_string(), json!({"./*": "./*"})),
        ]
        .into_iter()
        .collect(),
        sub_documents: vec![SubDocumentRule {
            path: vec!["dist".to_string()],
            set: [("type".to_string(), json!("commonjs"))].into_iter().collect(),
        }],
        ..PackageRule::default()
    };
    let mut registry = AmenderRegistry::new();
    registry.register("zrender", rule.clone());
    registry.register("echarts", rule);

    run(
        registry,
        &[("zrender", &patched), ("echarts", &shipped)],
        Mode::Apply,
        false,
    )
    .await?;

    let zrender = read_json(&patched.join("package.json"));
    assert_eq!(zrender["type"], json!("module"));
    assert_eq!(
        read_json(&patched.join("dist").join("package.json")),
        json!({"type": "commonjs"})
    );

    // Untouched apart from an empty ledger.
    let echarts = read_json(&shipped.join("package.json"));
    assert_eq!(echarts["exports"], json!({".": "./index.js"}));
    assert_eq!(echarts.get("type"), None);
    assert_eq!(echarts[LEDGER_KEY], json!({"": {}}));
    Ok(())
}
