//! DynamoDB-backed record store.
//!
//! The SDK is async; scans are blocking and single-threaded, so the store owns
//! a current-thread tokio runtime and drives each request with `block_on`.
//!
//! ## Throttling
//!
//! Page requests rejected with `ProvisionedThroughputExceededException` or
//! `RequestLimitExceeded` are retried with exponential backoff on top of the
//! SDK's own transport retries:
//! min(max_delay, base_delay * 2^attempt) ± 25% jitter

use super::{Item, PageCursor, RecordStore};
use crate::config::{ScanSettings, StoreConfig, ThrottleRetryConfig};
use crate::{Error, Result, StoreError};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::scan::ScanOutput as DynamoScanOutput;
use aws_sdk_dynamodb::types::{AttributeValue, KeyType};
use aws_sdk_dynamodb::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Exponential backoff for throttled page requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay for first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ThrottleRetryConfig::default())
    }
}

impl From<&ThrottleRetryConfig> for RetryPolicy {
    fn from(config: &ThrottleRetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retries: config.max_retries,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Disable jitter (for testing).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff delay for a given attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_delay_ms = delay_ms.min(max_ms);

        let final_delay_ms = if self.jitter {
            let jitter_range = capped_delay_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_delay_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms)
    }
}

/// Record store backed by a DynamoDB table scan.
pub struct DynamoStore {
    client: Client,
    runtime: Runtime,
    consistent_read: bool,
    retry: RetryPolicy,
}

impl DynamoStore {
    /// Connect using the store and scan sections of the configuration.
    pub fn connect(store: &StoreConfig, scan: &ScanSettings) -> Result<Self> {
        let runtime = Self::build_runtime()?;
        let sdk_config = runtime.block_on(Self::build_aws_config(store));
        let client = Client::new(&sdk_config);

        info!(
            region = %store.region,
            endpoint = ?store.endpoint_url,
            consistent_read = scan.consistent_read,
            "DynamoDB client initialized"
        );

        Ok(Self {
            client,
            runtime,
            consistent_read: scan.consistent_read,
            retry: RetryPolicy::from(&scan.throttle_retry),
        })
    }

    /// Wrap an already-configured client.
    pub fn from_client(client: Client) -> Result<Self> {
        Ok(Self {
            client,
            runtime: Self::build_runtime()?,
            consistent_read: false,
            retry: RetryPolicy::default(),
        })
    }

    /// Request strongly consistent reads.
    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Set the throttling retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_runtime() -> Result<Runtime> {
        Ok(tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?)
    }

    /// Build AWS configuration with credentials.
    async fn build_aws_config(config: &StoreConfig) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .retry_config(
                aws_config::retry::RetryConfig::standard()
                    .with_max_attempts(config.max_attempts),
            );

        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.aws_access_key_id, &config.aws_secret_access_key)
        {
            debug!("Using explicit AWS credentials");
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "dynscan-explicit-credentials",
            );
            loader = loader.credentials_provider(credentials);
        } else {
            debug!("Using default AWS credential chain");
        }

        loader.load().await
    }

    /// Resolve the table's hash key attribute, if it has one.
    fn describe_hash_key(&self, table: &str) -> Result<Option<String>> {
        let request = self.client.describe_table().table_name(table).send();
        let output = self.runtime.block_on(request).map_err(|err| {
            match err.as_service_error() {
                Some(e) if e.is_resource_not_found_exception() => StoreError::TableNotFound {
                    table: table.to_string(),
                },
                _ => StoreError::Transport(DisplayErrorContext(&err).to_string()),
            }
        })?;

        Ok(output.table().and_then(|description| {
            description
                .key_schema()
                .iter()
                .find(|element| *element.key_type() == KeyType::Hash)
                .map(|element| element.attribute_name().to_string())
        }))
    }

    /// Issue one Scan request, retrying while the table is throttled.
    fn scan_page(
        &self,
        table: &str,
        limit: i32,
        start_key: Option<HashMap<String, AttributeValue>>,
    ) -> Result<DynamoScanOutput> {
        let mut attempt = 0;
        loop {
            let request = self
                .client
                .scan()
                .table_name(table)
                .limit(limit)
                .consistent_read(self.consistent_read)
                .set_exclusive_start_key(start_key.clone())
                .send();

            let err = match self.runtime.block_on(request) {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            let service_error = err.as_service_error();
            if service_error.is_some_and(|e| e.is_resource_not_found_exception()) {
                return Err(StoreError::TableNotFound {
                    table: table.to_string(),
                }
                .into());
            }

            let throttled = service_error.is_some_and(|e| {
                e.is_provisioned_throughput_exceeded_exception() || e.is_request_limit_exceeded()
            });
            if !throttled {
                return Err(StoreError::Transport(DisplayErrorContext(&err).to_string()).into());
            }
            if attempt >= self.retry.max_retries {
                return Err(StoreError::Throttled {
                    table: table.to_string(),
                    attempts: attempt + 1,
                }
                .into());
            }

            let delay = self.retry.calculate_delay(attempt);
            warn!(
                table = %table,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Scan throttled, backing off"
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

impl RecordStore for DynamoStore {
    type Record = Item;

    fn open_scan(
        &self,
        table: &str,
        page_size: usize,
    ) -> Result<Box<dyn PageCursor<Record = Item> + '_>> {
        let limit = i32::try_from(page_size)
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| Error::Config(format!("invalid page size {page_size}")))?;

        let hash_key = self.describe_hash_key(table)?.ok_or_else(|| {
            Error::Config(format!("Table '{table}' has no mapping for HASH key"))
        })?;
        debug!(table = %table, hash_key = %hash_key, limit, "Opened DynamoDB scan");

        Ok(Box::new(DynamoCursor {
            store: self,
            table: table.to_string(),
            limit,
            start_key: None,
            exhausted: false,
        }))
    }
}

/// Cursor following `LastEvaluatedKey` continuation tokens.
struct DynamoCursor<'a> {
    store: &'a DynamoStore,
    table: String,
    limit: i32,
    start_key: Option<HashMap<String, AttributeValue>>,
    exhausted: bool,
}

impl PageCursor for DynamoCursor<'_> {
    type Record = Item;

    fn next_page(&mut self) -> Result<Option<Vec<Item>>> {
        if self.exhausted {
            return Ok(None);
        }

        let output = self
            .store
            .scan_page(&self.table, self.limit, self.start_key.take())?;

        self.start_key = output.last_evaluated_key().cloned();
        if self.start_key.is_none() {
            self.exhausted = true;
        }

        Ok(Some(output.items().iter().map(item_from_attributes).collect()))
    }
}

/// Convert a DynamoDB attribute map into a JSON object.
pub fn item_from_attributes(attributes: &HashMap<String, AttributeValue>) -> Item {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), attribute_to_json(value)))
        .collect()
}

/// Convert a single attribute value into JSON.
///
/// Numbers that do not fit a JSON number are kept as strings; binary values
/// become arrays of byte values.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_value(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(list) => Value::Array(list.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(item_from_attributes(map)),
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(set.iter().map(|n| number_value(n)).collect()),
        AttributeValue::B(blob) => bytes_value(blob.as_ref()),
        AttributeValue::Bs(blobs) => {
            Value::Array(blobs.iter().map(|blob| bytes_value(blob.as_ref())).collect())
        }
        _ => Value::Null,
    }
}

fn number_value(n: &str) -> Value {
    n.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(n.to_string()))
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}
