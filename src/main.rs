//! tiercache demo binary.
//!
//! Wires an in-memory L1/L2 and a trivial origin stub together to exercise
//! one fetch through the pipeline, so the crate can be `cargo run` without
//! a real origin or managed backend configured.

use std::collections::HashMap;
use std::panic;
use std::sync::Arc;

use tiercache::config::EngineConfig;
use tiercache::fingerprint::{AuthShape, CanonicalValue, Descriptor, DuplicateKeyPolicy};
use tiercache::l1::InMemoryL1Backend;
use tiercache::l2::InMemoryL2Backend;
use tiercache::origin::{FnOriginFetcher, OriginResponse};
use tiercache::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("tiercache fatal error:");
        eprintln!("{panic_info}");
        if let Some(location) = panic_info.location() {
            eprintln!("location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("tiercache {} starting demo run", tiercache::VERSION);

    let origin = Arc::new(FnOriginFetcher::new(|descriptor: &Descriptor| {
        let path = descriptor.path.clone();
        async move {
            Ok(OriginResponse {
                body: format!("hello from {path}").into_bytes(),
                headers: HashMap::new(),
                status_code: "200".to_string(),
                origin_provided_expires_at_millis: None,
            })
        }
    }));

    let pipeline = Pipeline::new(
        EngineConfig::default(),
        Arc::new(InMemoryL1Backend::new()),
        Arc::new(InMemoryL2Backend::new()),
        origin,
        None,
    )?;

    let descriptor = Descriptor {
        method: "GET".to_string(),
        host: "demo.internal".to_string(),
        path: "/widgets".to_string(),
        query: vec![],
        duplicate_key_policy: DuplicateKeyPolicy::Join,
        body: CanonicalValue::Null,
        auth_shape: AuthShape::default(),
    };
    let profile = tiercache::config::CacheProfile {
        host_id: "demo".to_string(),
        path_id: "widgets".to_string(),
        ..Default::default()
    };

    let first = pipeline.fetch(&descriptor, &profile).await?;
    tracing::info!(source = ?first.source, body = %String::from_utf8_lossy(&first.artifact.body), "first fetch");

    let second = pipeline.fetch(&descriptor, &profile).await?;
    tracing::info!(source = ?second.source, "second fetch");

    Ok(())
}
