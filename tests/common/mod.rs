#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use text_generation_service::{
    ConfigSchema, GenerationEngine, GenerationOptions, ModelBackend, ServiceError,
    model::config::value,
};
use tower::ServiceExt;

#[derive(Debug, Clone, PartialEq)]
pub struct StubConfig {
    pub temperature: f64,
    pub left: i64,
    pub right: i64,
    pub fail_generation: bool,
    pub broken_build: bool,
}

/// Backend whose output spells out the configuration its pipeline was built
/// from, so tests can tell which pipeline served a request.
pub struct StubBackend {
    schema: ConfigSchema<StubConfig>,
    build_delay: Duration,
    generations: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_build_delay(Duration::ZERO)
    }

    pub fn with_build_delay(build_delay: Duration) -> Self {
        let schema = ConfigSchema::<StubConfig>::new()
            .field(
                "temperature",
                |c| json!(c.temperature),
                |c, v| {
                    c.temperature = value::to_non_negative_f64(v)?;
                    Ok(())
                },
            )
            .field(
                "left",
                |c| json!(c.left),
                |c, v| {
                    c.left = v.as_i64().ok_or("expected an integer")?;
                    Ok(())
                },
            )
            .field(
                "right",
                |c| json!(c.right),
                |c, v| {
                    c.right = v.as_i64().ok_or("expected an integer")?;
                    Ok(())
                },
            )
            .field(
                "fail_generation",
                |c| json!(c.fail_generation),
                |c, v| {
                    c.fail_generation = value::to_bool(v)?;
                    Ok(())
                },
            )
            .field(
                "broken_build",
                |c| json!(c.broken_build),
                |c, v| {
                    c.broken_build = value::to_bool(v)?;
                    Ok(())
                },
            );
        Self {
            schema,
            build_delay,
            generations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared count of engine invocations across every pipeline built.
    pub fn generation_counter(&self) -> Arc<AtomicUsize> {
        self.generations.clone()
    }
}

impl ModelBackend for StubBackend {
    type Config = StubConfig;
    type Engine = StubEngine;

    fn model_id(&self) -> &str {
        "stub/echo"
    }

    fn schema(&self) -> &ConfigSchema<StubConfig> {
        &self.schema
    }

    fn initial_config(&self) -> StubConfig {
        StubConfig {
            temperature: 1.0,
            left: 0,
            right: 0,
            fail_generation: false,
            broken_build: false,
        }
    }

    fn build_pipeline(&self, config: &StubConfig) -> Result<StubEngine, ServiceError> {
        if config.broken_build {
            return Err(ServiceError::Rebuild("stub refuses to build".into()));
        }
        if !self.build_delay.is_zero() {
            thread::sleep(self.build_delay);
        }
        Ok(StubEngine {
            config: config.clone(),
            generations: self.generations.clone(),
        })
    }
}

pub struct StubEngine {
    config: StubConfig,
    generations: Arc<AtomicUsize>,
}

impl GenerationEngine for StubEngine {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ServiceError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        if self.config.fail_generation {
            return Err(ServiceError::Generation("simulated out of memory".into()));
        }
        Ok(format!(
            "{prompt} [temperature={} left={} right={} max_new_tokens={}]",
            self.config.temperature, self.config.left, self.config.right, options.max_new_tokens,
        ))
    }
}

/// Reads `name=<value>` out of a stub generation.
pub fn field(text: &str, name: &str) -> String {
    let needle = format!("{name}=");
    let start = text
        .find(&needle)
        .unwrap_or_else(|| panic!("{name} missing from {text}"))
        + needle.len();
    text[start..]
        .split([' ', ']'])
        .next()
        .unwrap_or_default()
        .to_string()
}

pub async fn call(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

pub async fn post(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    call(router, Method::POST, uri, body).await
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    call(router, Method::GET, uri, "").await
}
