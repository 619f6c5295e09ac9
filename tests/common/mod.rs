#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing_log_shipper::{SendOutcome, ShipperConfig, Transport, TransportRequest};

pub const TOKEN: &str = "test-token-0123456789";

pub fn valid_config() -> ShipperConfig {
    ShipperConfig::new("http://ingest.test/api/v1/logs", Some(TOKEN.to_string()), Some("abc".to_string()))
}

#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub at: Instant,
}

impl RecordedBatch {
    pub fn logs(&self) -> Vec<Value> {
        self.body["logs"].as_array().cloned().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that records every request and answers from a script,
/// falling back to `200 OK` once the script runs out.
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<RecordedBatch>>,
    script: Mutex<VecDeque<SendOutcome>>,
    latency: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_with(&self, outcome: SendOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn respond_status(&self, status: u16, body: Option<Value>) {
        self.respond_with(SendOutcome::Response { status, body });
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|b| b.logs().len()).collect()
    }

    /// Payloads of every shipped entry, in shipping order.
    pub fn payloads(&self) -> Vec<Value> {
        self.batches()
            .iter()
            .flat_map(|b| b.logs())
            .map(|log| log["payload"].clone())
            .collect()
    }

    pub async fn wait_for_batches(&self, count: usize) {
        while self.batches.lock().unwrap().len() < count {
            sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> SendOutcome {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        let body = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        self.batches.lock().unwrap().push(RecordedBatch {
            url: request.url,
            headers: request.headers,
            body,
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Response { status: 200, body: None })
    }
}
