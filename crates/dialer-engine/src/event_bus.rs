//! Event Publisher
//!
//! Publishes lifecycle events to `calls.started`, `calls.answered`, `calls.ended`
//! (§6). Publication is at-least-once and not atomic with the durable write;
//! failures are logged and the call continues (§5, §9).

use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::config::EventBusConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    Started,
    Answered,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    pub event_id: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub payload: Value,
}

impl CallEvent {
    pub fn new(event_type: &'static str, tenant_id: &str, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            timestamp: Utc::now(),
            version: 1,
            event_type,
            payload,
        }
    }
}

/// Thin wrapper over a Kafka producer. A publish failure is logged, never
/// propagated -- consumers tolerate at-least-once delivery and dedupe on
/// `eventId` (§9).
pub struct EventPublisher {
    producer: FutureProducer,
    config: EventBusConfig,
}

impl EventPublisher {
    pub fn new(config: EventBusConfig) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer, config })
    }

    async fn publish(&self, topic: &str, key: &str, event: &CallEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, event_id = %event.event_id, "failed to serialize event");
                return;
            }
        };

        let record = FutureRecord::to(topic).key(key).payload(&payload);
        if let Err((e, _)) = self.producer.send(record, Duration::from_secs(5)).await {
            tracing::warn!(
                topic,
                key,
                event_id = %event.event_id,
                error = %e,
                "event publish failed; call continues, consumers must tolerate at-least-once delivery"
            );
        }
    }

    pub async fn publish_started(&self, call_id: &str, tenant_id: &str, payload: Value) {
        let topic = self.config.topic_started.clone();
        self.publish(&topic, call_id, &CallEvent::new("calls.started", tenant_id, payload))
            .await;
    }

    pub async fn publish_answered(&self, call_id: &str, tenant_id: &str, payload: Value) {
        let topic = self.config.topic_answered.clone();
        self.publish(&topic, call_id, &CallEvent::new("calls.answered", tenant_id, payload))
            .await;
    }

    pub async fn publish_ended(&self, call_id: &str, tenant_id: &str, payload: Value) {
        let topic = self.config.topic_ended.clone();
        self.publish(&topic, call_id, &CallEvent::new("calls.ended", tenant_id, payload))
            .await;
    }
}
