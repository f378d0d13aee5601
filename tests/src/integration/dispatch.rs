//! Dispatch chain ordering over the bus.
//!
//! Built-in protocol handlers claim their topics before features see
//! them; features are offered unclaimed traffic in attachment order;
//! proxies come last.

#[cfg(test)]
mod tests {
    use crate::integration::{spawn_service, RECV_TIMEOUT};
    use async_trait::async_trait;
    use edge_bus::{FilterSet, InMemoryBroker, Transport};
    use edge_isc::{Feature, Microservice, MicroserviceConfig, Notifier, Payload};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::time::timeout;
    use uuid::Uuid;

    /// Claims `request/restart` and acknowledges over the bus.
    struct RestartFeature {
        notifier: Notifier,
    }

    #[async_trait]
    impl Feature for RestartFeature {
        fn tag(&self) -> &str {
            "restart"
        }

        async fn on_isc_message(&self, topic: &str, payload: &Value) -> bool {
            if !topic.ends_with("request/restart") {
                return false;
            }
            let mut ack = Payload::new();
            if let Some(uid) = payload.get("uid") {
                ack.insert("uid".to_string(), uid.clone());
            }
            ack.insert("restarting".to_string(), json!(true));
            self.notifier
                .notify("event/restart", ack)
                .await
                .expect("notify");
            true
        }
    }

    #[tokio::test]
    async fn test_feature_claims_custom_request_over_bus() -> anyhow::Result<()> {
        let broker = Arc::new(InMemoryBroker::new());
        let transport: Arc<dyn Transport> = broker.clone();
        let mut service = Microservice::new(MicroserviceConfig::new("gnss"), transport)?;
        let feature = RestartFeature {
            notifier: service.notifier(),
        };
        service.add_feature(Arc::new(feature))?;
        let _service_loop = spawn_service(&broker, Arc::new(service));

        let filters = FilterSet::from_filters(vec!["edge/gnss/event/#".parse()?]);
        let mut watcher = broker.subscribe(filters);
        let uid = Uuid::new_v4().to_string();
        broker
            .publish("edge/gnss/request/restart", json!({"uid": uid}))
            .await?;

        let ack = timeout(RECV_TIMEOUT, watcher.recv()).await?.expect("ack");
        assert_eq!(ack.topic.as_str(), "edge/gnss/event/restart");
        assert_eq!(ack.payload["uid"], json!(uid));
        assert_eq!(ack.payload["restarting"], json!(true));
        assert!(ack.payload["ts"].is_u64());
        Ok(())
    }
}
