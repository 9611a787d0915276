mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use text_generation_service::{
    ConfigPatch, GenerationOptions, GenerationRequest, ModelRegistry, ServiceError,
};

use common::{StubBackend, field};

fn patch(value: serde_json::Value) -> ConfigPatch {
    match value {
        serde_json::Value::Object(map) => ConfigPatch::from(map),
        _ => unreachable!(),
    }
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        prompt: prompt.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_a_half_applied_config() {
    let backend = StubBackend::with_build_delay(Duration::from_millis(5));
    let registry = ModelRegistry::initialize(backend, GenerationOptions::default()).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for reader in 0..16 {
        let registry = registry.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                let response = registry
                    .generate(request(&format!("reader {reader}")))
                    .await
                    .unwrap();
                let left = field(&response.generated_text, "left");
                let right = field(&response.generated_text, "right");
                assert_eq!(left, right, "mixed pipeline: {}", response.generated_text);
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        }));
    }

    for value in 1..=20 {
        let version = registry
            .change_config(patch(json!({"left": value, "right": value})))
            .await
            .unwrap();
        assert_eq!(version, value as u64);
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(registry.snapshot().config["left"], 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_commit_one_after_another() {
    let registry =
        ModelRegistry::initialize(StubBackend::new(), GenerationOptions::default()).unwrap();

    let mut writers = Vec::new();
    for value in 0..8i64 {
        let registry = registry.clone();
        writers.push(tokio::spawn(async move {
            registry
                .change_config(patch(json!({"left": value, "right": value})))
                .await
        }));
    }

    let mut versions = Vec::new();
    for writer in writers {
        versions.push(writer.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.version, 8);
    assert_eq!(snapshot.config["left"], snapshot.config["right"]);
}

#[tokio::test]
async fn rejected_patch_leaves_the_active_pipeline_in_place() {
    let registry =
        ModelRegistry::initialize(StubBackend::new(), GenerationOptions::default()).unwrap();
    let before = registry.current();

    let err = registry
        .change_config(patch(json!({"left": 1, "bogus_field": true})))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidConfigKey(ref key) if key == "bogus_field"));

    let after = registry.current();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.config().left, 0);
}

#[tokio::test]
async fn in_flight_generation_keeps_its_pipeline_snapshot() {
    let registry =
        ModelRegistry::initialize(StubBackend::new(), GenerationOptions::default()).unwrap();
    let pinned = registry.current();

    registry
        .change_config(patch(json!({"left": 7, "right": 7})))
        .await
        .unwrap();

    let old = pinned
        .generate("Hello", &registry.options())
        .unwrap();
    assert_eq!(field(&old, "left"), "0");

    let new = registry.generate(request("Hello")).await.unwrap();
    assert_eq!(field(&new.generated_text, "left"), "7");
    assert_eq!(registry.current().version(), 1);
}
