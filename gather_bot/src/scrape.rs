use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::time::Duration;
use surf::http::Method;
use surf::{RequestBuilder, Url};
use thiserror::Error;

use gather_core::{Gatherer, Sample};

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("failed to scrape {url}: {error}")]
    Failed { url: Url, error: surf::Error },
    #[error("scrape of {url} timed out after {timeout:?}")]
    Timeout { url: Url, timeout: Duration },
}

/// Gathers a service's samples from a "/metrics" endpoint.
pub struct ScrapeTarget {
    pub service: String,

    /// The url to be scraped.
    ///
    /// e.g. http://10.0.15.15:9025/metrics
    pub url: Url,

    /// How long to wait for the endpoint before giving up on this generation
    pub timeout: Duration,
}

impl ScrapeTarget {
    pub fn new(service: String, url: Url, timeout: Duration) -> Self {
        ScrapeTarget {
            service,
            url,
            timeout,
        }
    }

    /// Make a request to the scrape target and return the response
    pub async fn scrape(&self) -> Result<String, ScrapeError> {
        async_std::future::timeout(self.timeout, async {
            RequestBuilder::new(Method::Get, self.url.clone())
                .recv_string()
                .await
                .map_err(|error| ScrapeError::Failed {
                    url: self.url.clone(),
                    error,
                })
        })
        .await
        .map_err(|_| ScrapeError::Timeout {
            url: self.url.clone(),
            timeout: self.timeout,
        })?
    }
}

#[async_trait]
impl Gatherer for ScrapeTarget {
    async fn gather(&self) -> Result<Vec<Sample>> {
        let input = self.scrape().await?;
        Ok(parse(&input, Utc::now()))
    }
}

/// Convert Prometheus's text exposition format into samples.
///
/// Each data line becomes one sample: the metric name and its label set form the type, and
/// the line's timestamp (or `now`) forms the label. Lines that can't be parsed are skipped.
pub fn parse(input: &str, now: DateTime<Utc>) -> Vec<Sample> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| parse_line(line, now))
        .collect()
}

fn parse_line(line: &str, now: DateTime<Utc>) -> Option<Sample> {
    // Split `metric_name{labels} value timestamp` into parts
    let (metric, rest) = match line.rfind('}') {
        // use rfind, because label values could contain an escaped '}'
        Some(end) => (&line[..=end], &line[end + 1..]),
        None => {
            let end = line.find(char::is_whitespace)?;
            (&line[..end], &line[end..])
        }
    };
    let mut parts = rest.split_whitespace();
    let value = parts.next()?.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    let time = match parts.next() {
        Some(millis) => Utc.timestamp_millis_opt(millis.parse().ok()?).single()?,
        None => now,
    };

    Some(Sample::new(
        metric.trim(),
        time.to_rfc3339_opts(SecondsFormat::Secs, true),
        value as i64,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_text_format() {
        let now = "2020-07-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let samples = parse(
            r#"
# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000

# Minimalistic line:
metric_without_timestamp_and_labels 12.47

# Values that can't be stored are skipped
something_weird{problem="division by zero"} +Inf -3982045
not_a_number NaN
missing_value

# TYPE escaped_counter counter
escaped_counter{label="}"} 1
            "#,
            now,
        );

        assert_eq!(samples.len(), 4);
        assert_eq!(
            samples[0],
            Sample::new(
                r#"http_requests_total{method="post",code="200"}"#,
                "2014-03-17T14:26:03Z",
                1027
            )
        );
        assert_eq!(samples[1].value, 3);
        assert_eq!(samples[2].type_, "metric_without_timestamp_and_labels");
        assert_eq!(samples[2].label, "2020-07-01T12:00:00Z");
        assert_eq!(samples[2].value, 12);
        assert_eq!(samples[3].type_, r#"escaped_counter{label="}"}"#);
        assert_eq!(samples[3].value, 1);
    }

    #[async_std::test]
    async fn unreachable_target_fails_the_gather() {
        let target = ScrapeTarget::new(
            "api".into(),
            Url::parse("http://127.0.0.1:1/metrics").unwrap(),
            Duration::from_millis(500),
        );
        assert!(target.gather().await.is_err());
    }
}
