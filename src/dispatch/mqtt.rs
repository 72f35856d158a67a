use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{Dispatcher, WaveMetrics};
use crate::config::MqttSettings;

/// Publishes each metric to `<prefix>/<key>` at QoS 1.
pub struct MqttDispatcher {
    client: Client,
    connection_handle: Option<JoinHandle<()>>,
    topic_prefix: String,
}

impl MqttDispatcher {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let (host, port) = split_host_port(&settings.broker)?;
        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);

        let (client, connection) = Client::new(options, 10);
        log::info!(
            "MQTT dispatcher publishing to {} under {}/",
            settings.broker,
            settings.topic_prefix
        );
        Ok(Self {
            client,
            connection_handle: Some(spawn_event_loop(connection)),
            topic_prefix: settings.topic_prefix.trim_end_matches('/').to_string(),
        })
    }

    fn topic(&self, key: &str) -> String {
        format!("{}/{}", self.topic_prefix, key)
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        let result = self.client.disconnect().context("disconnect MQTT client");
        let _ = handle.join();
        result
    }
}

fn spawn_event_loop(mut connection: Connection) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

impl Dispatcher for MqttDispatcher {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn dispatch(&mut self, metrics: &WaveMetrics) -> Result<()> {
        for (key, value) in metrics.entries() {
            let topic = self.topic(key);
            // Never block capture on a full request queue.
            self.client
                .try_publish(topic.clone(), QoS::AtLeastOnce, false, format!("{:.4}", value))
                .with_context(|| format!("publish {}", topic))?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for MqttDispatcher {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::debug!("MQTT shutdown: {}", err);
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    let addr = addr
        .split_once("://")
        .map(|(scheme, rest)| match scheme {
            "mqtt" | "tcp" => Ok(rest),
            other => Err(anyhow!("unsupported MQTT scheme: {}", other)),
        })
        .transpose()?
        .unwrap_or(addr);

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        return Ok((host.to_string(), port.parse().context("invalid MQTT port")?));
    }
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok((host.to_string(), port.parse().context("invalid MQTT port")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_address_forms() -> Result<()> {
        assert_eq!(split_host_port("127.0.0.1:1883")?, ("127.0.0.1".to_string(), 1883));
        assert_eq!(split_host_port("mqtt://broker.lan:1884")?, ("broker.lan".to_string(), 1884));
        assert_eq!(split_host_port("[::1]:1883")?, ("::1".to_string(), 1883));
        assert!(split_host_port("broker.lan").is_err());
        assert!(split_host_port("ws://broker:80").is_err());
        assert!(split_host_port(":1883").is_err());
        Ok(())
    }

    #[test]
    fn topics_use_prefix_without_trailing_slash() -> Result<()> {
        let settings = MqttSettings {
            broker: "127.0.0.1:1".to_string(),
            topic_prefix: "surf/cam1/".to_string(),
            client_id: "wave_analyzer_test".to_string(),
        };
        let dispatcher = MqttDispatcher::connect(&settings)?;
        assert_eq!(dispatcher.topic("freq_mid"), "surf/cam1/freq_mid");
        Ok(())
    }
}
