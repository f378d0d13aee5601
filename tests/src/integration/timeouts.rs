//! Deadlines and single-slot request discipline.
//!
//! Every proxy request carries a deadline. On expiry the timeout path
//! fires exactly once, the slot is freed, and any late reply is
//! discarded silently.

#[cfg(test)]
mod tests {
    use crate::integration::{proxy_harness, RECV_TIMEOUT};
    use edge_bus::{InMemoryBroker, Transport};
    use edge_isc::{IscError, IscTask, MicroserviceProxy, ProxyConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_initialize_timeout_when_remote_silent() {
        let broker = Arc::new(InMemoryBroker::new());
        let transport: Arc<dyn Transport> = broker.clone();
        let (init_tx, init_rx) = tokio::sync::oneshot::channel();
        let proxy = MicroserviceProxy::new(
            ProxyConfig::new("ghost").init_timeout(Duration::from_millis(100)),
            transport,
            edge_bus::FilterSet::new(),
        )
        .with_init_callback(move |success| {
            let _ = init_tx.send(success);
        });

        proxy.initialize().await.unwrap();
        let success = timeout(RECV_TIMEOUT, init_rx).await.unwrap().unwrap();
        assert!(!success);
        assert!(!proxy.is_initialized());
        assert!(!proxy.is_busy());

        // Back to idle: property operations refuse instead of hanging.
        let err = proxy.properties().await.unwrap_err();
        assert!(matches!(err, IscError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn test_request_timeout_after_remote_dies() {
        let harness = proxy_harness(
            ProxyConfig::new("gnss").request_timeout(Duration::from_millis(100)),
        )
        .await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await.unwrap().unwrap());

        // Remote stops answering.
        harness.remote.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = harness.proxy.property_get(&["fixAge"]).await.unwrap_err();
        assert!(matches!(err, IscError::Timeout { .. }));
        assert!(!harness.proxy.is_busy());
    }

    #[tokio::test]
    async fn test_second_request_fails_fast_while_slot_occupied() {
        let harness = proxy_harness(ProxyConfig::new("gnss")).await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await.unwrap().unwrap());

        harness
            .proxy
            .task_add(IscTask::new("occupier").with_uid("busy"))
            .unwrap();
        let err = harness.proxy.property_get(&["fixAge"]).await.unwrap_err();
        assert!(matches!(err, IscError::QueueBusy { .. }));

        // Freeing the slot restores service.
        harness.proxy.task_complete("busy");
        let values = harness.proxy.property_get(&["fixAge"]).await.unwrap();
        assert_eq!(values["fixAge"], serde_json::json!(12));
    }

    #[tokio::test]
    async fn test_late_reply_discarded() {
        let harness = proxy_harness(
            ProxyConfig::new("gnss").request_timeout(Duration::from_millis(100)),
        )
        .await;
        assert!(timeout(RECV_TIMEOUT, harness.init).await.unwrap().unwrap());
        harness.remote.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = harness.proxy.property_get(&["fixAge"]).await.unwrap_err();
        let IscError::Timeout { uid, .. } = err else {
            panic!("expected timeout");
        };

        // A reply for the expired uid finds no outstanding task.
        let handled = harness
            .proxy
            .handle_message(
                "edge/gnss/info/properties/values",
                &serde_json::json!({"uid": uid, "properties": {"fixAge": 12}}),
            )
            .await;
        assert!(!handled);
    }
}
