//! Service/proxy property round trips over the bus.
//!
//! The proxy side never touches the remote service directly: every value
//! it sees travelled through a published request and response.

#[cfg(test)]
mod tests {
    use crate::integration::{gnss_service, proxy_harness, spawn_service, RECV_TIMEOUT};
    use edge_bus::{FilterSet, InMemoryBroker, Transport};
    use edge_isc::{Payload, ProxyConfig};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_initialize_then_serve_from_warm_store() -> anyhow::Result<()> {
        let harness = proxy_harness(ProxyConfig::new("gnss")).await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await??);
        assert!(harness.proxy.is_initialized());

        let published = harness.broker.messages_published();
        let properties = harness.proxy.properties().await?;
        assert_eq!(properties["fixAge"], json!(12));
        assert_eq!(properties["reportInterval"], json!(10));
        // Served warm, no further bus traffic.
        assert_eq!(harness.broker.messages_published(), published);
        Ok(())
    }

    #[tokio::test]
    async fn test_property_set_applies_remotely() -> anyhow::Result<()> {
        let harness = proxy_harness(ProxyConfig::new("gnss")).await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await??);

        let mut values = Payload::new();
        values.insert("reportInterval".to_string(), json!(30));
        let applied = harness.proxy.property_set(values).await?;

        assert_eq!(applied["reportInterval"], json!(30));
        assert_eq!(harness.interval.load(Ordering::SeqCst), 30);

        let fetched = harness.proxy.property_get(&["reportInterval"]).await?;
        assert_eq!(fetched["reportInterval"], json!(30));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_read_only_reported_not_applied() -> anyhow::Result<()> {
        let harness = proxy_harness(ProxyConfig::new("gnss")).await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await??);

        let mut values = Payload::new();
        values.insert("fixAge".to_string(), json!(0));
        let applied = harness.proxy.property_set(values).await?;
        assert!(applied.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_cache_triggers_refetch() -> anyhow::Result<()> {
        let harness =
            proxy_harness(ProxyConfig::new("gnss").cache_ttl(Duration::from_millis(50))).await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await??);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let published = harness.broker.messages_published();
        let properties = harness.proxy.properties().await?;
        assert_eq!(properties["fixAge"], json!(12));
        // A fresh round trip went over the bus.
        assert!(harness.broker.messages_published() > published);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_request_over_bus() -> anyhow::Result<()> {
        let broker = Arc::new(InMemoryBroker::new());
        let transport: Arc<dyn Transport> = broker.clone();
        let (service, _interval) = gnss_service(transport);
        let _service_loop = spawn_service(&broker, Arc::new(service));

        let filters = FilterSet::from_filters(vec!["edge/gnss/info/#".parse()?]);
        let mut watcher = broker.subscribe(filters);
        broker
            .publish("edge/gnss/request/properties/list", json!({"uid": "l-9"}))
            .await?;

        let response = timeout(RECV_TIMEOUT, watcher.recv()).await?.expect("list");
        assert_eq!(response.topic.as_str(), "edge/gnss/info/properties/list");
        assert_eq!(response.payload["uid"], json!("l-9"));
        assert_eq!(
            response.payload["properties"],
            json!(["fixAge", "reportInterval"])
        );
        Ok(())
    }
}
