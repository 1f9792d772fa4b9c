use crate::config::MqttSettings;
use crate::error::PublishError;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tracing::{info, warn};

// Requests the client buffers while the broker is unreachable
const REQUEST_CAPACITY: usize = 64;

/// Destination for topic/payload pairs.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), PublishError>;
}

/// Publishes over a single persistent broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Creates the client and spawns the task driving its event loop.
    ///
    /// Reconnection is left to rumqttc: the event loop reconnects on the next
    /// poll after an error.
    pub fn connect(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(15));
        if let Some((username, password)) = &settings.credentials {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let broker = format!("{}:{}", settings.host, settings.port);
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("Connected to MQTT broker {broker}");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Self { client }
    }
}

#[async_trait::async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), PublishError> {
        // try_publish drops the message when the queue is full instead of
        // stalling the polling loop
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Published {
        pub topic: String,
        pub payload: String,
        pub retain: bool,
    }

    /// Keeps every message in memory. Topics listed in `failing` are rejected.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub messages: Mutex<Vec<Published>>,
        pub failing: Mutex<Vec<String>>,
    }

    impl RecordingPublisher {
        pub fn take(&self) -> Vec<Published> {
            std::mem::take(&mut *self.messages.lock().unwrap())
        }

        pub fn payload(&self, topic: &str) -> Option<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|m| m.topic == topic)
                .map(|m| m.payload.clone())
        }
    }

    #[async_trait::async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            payload: &[u8],
            retain: bool,
        ) -> Result<(), PublishError> {
            if self.failing.lock().unwrap().iter().any(|t| t == topic) {
                return Err(PublishError::Client("queue full".into()));
            }
            self.messages.lock().unwrap().push(Published {
                topic: topic.to_string(),
                payload: String::from_utf8_lossy(payload).into_owned(),
                retain,
            });
            Ok(())
        }
    }
}
