use super::{Query, QueryExecutor, QueryParams, Row};
use crate::error::{ConfigError, NetError};
use crate::utils::config::WarehouseConfig;
use crate::utils::retry::{classify_status, retry_transient, transport_error, RetryPolicy};
use async_trait::async_trait;
use std::time::Duration;

/// ClickHouse over its HTTP interface: SQL in the POST body, `param_<name>` in the URL,
/// rows back as `JSONEachRow`.
#[derive(Debug, Clone)]
pub struct ClickHouseExecutor {
    client: reqwest::Client,
    url: reqwest::Url,
    user: String,
    password: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ClickHouseExecutor {
    pub fn new(
        config: &WarehouseConfig,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let url = config.url.parse::<reqwest::Url>().map_err(|e| {
            ConfigError::Invalid(format!("CLICKHOUSE_URL `{}`: {e}", config.url))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
            timeout,
            retry,
        })
    }

    fn request_url(&self, params: &QueryParams) -> reqwest::Url {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params.iter() {
                pairs.append_pair(&format!("param_{name}"), value);
            }
        }
        url
    }

    async fn execute_once(&self, query: &Query, params: &QueryParams) -> Result<Vec<Row>, NetError> {
        let body = format!("{}\nFORMAT JSONEachRow", query.sql.trim());
        let resp = self
            .client
            .post(self.request_url(params))
            .basic_auth(&self.user, self.password.as_deref())
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(query.name, &e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_error(query.name, &e))?;
        if !status.is_success() {
            return Err(classify_status(query.name, status.as_u16(), &text));
        }
        parse_json_each_row(query.name, &text)
    }
}

/// One JSON object per non-empty line. Anything else is a malformed response.
pub fn parse_json_each_row(context: &str, text: &str) -> Result<Vec<Row>, NetError> {
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            NetError::permanent(context, format!("line {}: {e}", lineno + 1))
        })?;
        let row = Row::from_value(value).ok_or_else(|| {
            NetError::permanent(context, format!("line {}: not a JSON object", lineno + 1))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[async_trait]
impl QueryExecutor for ClickHouseExecutor {
    async fn execute(&self, query: &Query, params: &QueryParams) -> Result<Vec<Row>, NetError> {
        let started = std::time::Instant::now();
        let rows = retry_transient(self.retry, query.name, || self.execute_once(query, params)).await?;
        tracing::debug!(
            "[WAREHOUSE] {} ok rows={} elapsed_ms={}",
            query.name,
            rows.len(),
            started.elapsed().as_millis()
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_each_row_skips_blank_lines() {
        let text = "{\"a\":1}\n\n{\"a\":\"2\"}\n";
        let rows = parse_json_each_row("q", text).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].u64_col("q", "a").expect("quoted"), 2);
    }

    #[test]
    fn test_parse_json_each_row_rejects_non_objects() {
        let err = parse_json_each_row("q", "[1,2]\n").expect_err("array line");
        assert!(!err.is_transient());
        assert!(parse_json_each_row("q", "{oops\n").is_err());
    }

    #[test]
    fn test_request_url_carries_named_params() {
        let executor = ClickHouseExecutor::new(
            &WarehouseConfig {
                url: "http://localhost:8123/".into(),
                user: "default".into(),
                password: None,
                network: "mainnet".into(),
            },
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        )
        .expect("valid config");
        let url = executor.request_url(&QueryParams::new().with_str("network", "mainnet"));
        assert_eq!(url.query(), Some("param_network=mainnet"));
    }
}
