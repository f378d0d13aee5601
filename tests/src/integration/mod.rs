//! # Integration Tests
//!
//! Cross-service choreography over the in-memory broker:
//!
//! ```text
//! [ctl service] ──request/properties/get──→ [Bus] ──→ [gnss service]
//!       ↑                                                  │
//!       └────────── info/properties/values ←───────────────┘
//! ```
//!
//! Each test spins up real [`Microservice`] dispatch loops on an
//! [`InMemoryBroker`] and drives them through published messages only.

pub mod discovery;
pub mod dispatch;
pub mod properties;
pub mod telemetry;
pub mod timeouts;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;

use edge_bus::{InMemoryBroker, Transport};
use edge_isc::{
    IscError, Microservice, MicroserviceConfig, MicroserviceProxy, PropertyDef, ProxyConfig,
};

/// Generous upper bound for awaiting bus traffic in tests.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A `gnss` service with one `info` and one `config` property.
///
/// Returns the service and the backing store of `report_interval`.
pub fn gnss_service(transport: Arc<dyn Transport>) -> (Microservice, Arc<AtomicI64>) {
    let interval = Arc::new(AtomicI64::new(10));
    let mut service =
        Microservice::new(MicroserviceConfig::new("gnss"), transport).expect("service");
    service
        .register_property(PropertyDef::info("fix_age", || json!(12)))
        .expect("register fix_age");
    let get = Arc::clone(&interval);
    let set = Arc::clone(&interval);
    service
        .register_property(PropertyDef::config(
            "report_interval",
            move || json!(get.load(Ordering::SeqCst)),
            move |value| {
                let seconds = value.as_i64().ok_or_else(|| IscError::InvalidValue {
                    name: "report_interval".to_string(),
                    reason: "must be an integer".to_string(),
                })?;
                set.store(seconds, Ordering::SeqCst);
                Ok(())
            },
        ))
        .expect("register report_interval");
    service
        .rollcall_property_add("fix_age")
        .expect("rollcall property");
    (service, interval)
}

/// Subscribe a service on the broker and drive its dispatch loop.
pub fn spawn_service(broker: &InMemoryBroker, service: Arc<Microservice>) -> JoinHandle<()> {
    let mut subscription = broker.subscribe(service.filters());
    tokio::spawn(async move {
        service.run(&mut subscription).await;
    })
}

/// A running `gnss` service plus a `ctl` service holding a proxy for it.
pub struct ProxyHarness {
    pub broker: Arc<InMemoryBroker>,
    pub proxy: Arc<MicroserviceProxy>,
    pub interval: Arc<AtomicI64>,
    pub remote: JoinHandle<()>,
    pub local: JoinHandle<()>,
    pub init: tokio::sync::oneshot::Receiver<bool>,
}

/// Stand up the harness and kick off proxy initialization.
pub async fn proxy_harness(proxy_config: ProxyConfig) -> ProxyHarness {
    let broker = Arc::new(InMemoryBroker::new());
    let transport: Arc<dyn Transport> = broker.clone();

    let (remote_service, interval) = gnss_service(transport.clone());
    let remote = spawn_service(&broker, Arc::new(remote_service));

    let mut ctl =
        Microservice::new(MicroserviceConfig::new("ctl"), transport.clone()).expect("ctl");
    let (init_tx, init) = tokio::sync::oneshot::channel();
    let proxy = Arc::new(
        MicroserviceProxy::new(proxy_config, transport, ctl.filters()).with_init_callback(
            move |success| {
                let _ = init_tx.send(success);
            },
        ),
    );
    ctl.attach_proxy(Arc::clone(&proxy));
    let local = spawn_service(&broker, Arc::new(ctl));

    proxy.initialize().await.expect("initialize");
    ProxyHarness {
        broker,
        proxy,
        interval,
        remote,
        local,
        init,
    }
}
