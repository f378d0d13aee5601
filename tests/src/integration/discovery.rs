//! Rollcall discovery across running services.
//!
//! One service broadcasts a rollcall; every other service answers on its
//! own `rollcall/response` topic, echoing the request uid and attaching
//! its advertised rollcall properties.

#[cfg(test)]
mod tests {
    use crate::integration::{gnss_service, spawn_service, RECV_TIMEOUT};
    use edge_bus::{FilterSet, InMemoryBroker, Transport};
    use edge_isc::{Microservice, MicroserviceConfig};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_rollcall_round_trip() -> anyhow::Result<()> {
        let broker = Arc::new(InMemoryBroker::new());
        let transport: Arc<dyn Transport> = broker.clone();

        let (gnss, _interval) = gnss_service(transport.clone());
        let _gnss_loop = spawn_service(&broker, Arc::new(gnss));

        let modem = Arc::new(Microservice::new(
            MicroserviceConfig::new("modem"),
            transport,
        )?);
        let _modem_loop = spawn_service(&broker, Arc::clone(&modem));

        let mut watcher = broker.subscribe(FilterSet::all());
        modem.rollcall().await?;

        let broadcast = timeout(RECV_TIMEOUT, watcher.recv()).await?.expect("rollcall");
        assert_eq!(broadcast.topic.as_str(), "edge/modem/rollcall");
        let uid = broadcast.payload["uid"].clone();
        assert!(uid.is_string());

        let response = timeout(RECV_TIMEOUT, watcher.recv()).await?.expect("response");
        assert_eq!(response.topic.as_str(), "edge/gnss/rollcall/response");
        assert_eq!(response.payload["uid"], uid);
        assert_eq!(response.payload["fixAge"], json!(12));
        assert!(response.payload["ts"].is_u64());
        Ok(())
    }

    #[tokio::test]
    async fn test_rollcall_not_answered_by_sender() -> anyhow::Result<()> {
        let broker = Arc::new(InMemoryBroker::new());
        let transport: Arc<dyn Transport> = broker.clone();

        let modem = Arc::new(Microservice::new(
            MicroserviceConfig::new("modem"),
            transport,
        )?);
        let _modem_loop = spawn_service(&broker, Arc::clone(&modem));

        let filters =
            FilterSet::from_filters(vec!["edge/modem/rollcall/response".parse()?]);
        let mut watcher = broker.subscribe(filters);
        modem.rollcall().await?;

        let outcome = timeout(RECV_TIMEOUT / 4, watcher.recv()).await;
        assert!(outcome.is_err(), "sender must not answer its own rollcall");
        Ok(())
    }
}
