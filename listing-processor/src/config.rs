use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "127.0.0.1")]
    pub bind_host: String,

    #[envconfig(default = "3310")]
    pub bind_port: u16,

    // Kafka configuration
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "10000000")]
    pub kafka_producer_queue_messages: u32,

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "10")]
    pub kafka_producer_graceful_shutdown_secs: u64,

    #[envconfig(default = "listing-processor")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: u32,

    // Topics
    #[envconfig(default = "Monitors-Raw")]
    pub source_topic: String,

    #[envconfig(default = "Monitors-Rekeyed")]
    pub rekeyed_topic: String,

    #[envconfig(default = "Monitors-Processed")]
    pub success_topic: String,

    #[envconfig(default = "Monitors-Rejected")]
    pub rejected_topic: String,

    #[envconfig(default = "Monitors-Feedback")]
    pub feedback_topic: String,

    #[envconfig(default = "Monitors-Recovery")]
    pub recovery_topic: String,

    /// Replaces the bundled display vocabulary when set
    pub vocabulary_path: Option<String>,

    // View consumers join a fresh group per process so they always replay the whole topic
    #[envconfig(default = "listing-processor-views")]
    pub view_group_prefix: String,

    // Stages start only once both views replayed their topic up to its end offsets
    #[envconfig(default = "300")]
    pub view_catch_up_timeout_secs: u64,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    /// Initialize from environment variables (for production and tests)
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    pub fn producer_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.kafka_producer_graceful_shutdown_secs)
    }

    pub fn view_catch_up_timeout(&self) -> Duration {
        Duration::from_secs(self.view_catch_up_timeout_secs)
    }
}
