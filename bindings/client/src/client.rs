use std::time::{Duration, Instant};

use anyhow::Context;
use crosswind_instruments::prelude::{names, tags, MetricsScope, SampleValue, Tags};
use reqwest::header::CONTENT_TYPE;

use crate::error::{classify, describe};
use crate::request::HttpRequest;
use crate::response::{is_failed_status, HttpResponse, Timings};

/// A `reqwest` client that records the `http_req*` metrics for every request it sends.
///
/// Requests are never retried and never fail from the caller's point of view. A timeout or a
/// transport error comes back as a response with status 0 and an error description.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    inner: reqwest::Client,
    metrics: MetricsScope,
}

impl HttpClientInstrumented {
    pub fn new(metrics: MetricsScope, timeout: Duration) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { inner, metrics })
    }

    pub fn metrics(&self) -> &MetricsScope {
        &self.metrics
    }

    pub async fn request(&self, request: HttpRequest) -> HttpResponse {
        let name = request.name();
        let method = request.method.to_string();
        let url = request.url.clone();
        let extra_tags = request.tags.clone();

        let mut builder = self.inner.request(request.method, &request.url);
        for (header, value) in &request.headers {
            builder = builder.header(header.as_str(), value.as_str());
        }
        if let Some(body) = &request.json {
            let has_content_type = request
                .headers
                .iter()
                .any(|(header, _)| header.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.to_string());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let waiting = started.elapsed();
                let timings = Timings {
                    duration: waiting,
                    waiting,
                    receiving: Duration::ZERO,
                };
                return self.failed(url, &method, &name, extra_tags, timings, &e);
            }
        };
        let waiting = started.elapsed();
        let status = response.status().as_u16();

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                let duration = started.elapsed();
                let timings = Timings {
                    duration,
                    waiting,
                    receiving: duration.saturating_sub(waiting),
                };
                return self.failed(url, &method, &name, extra_tags, timings, &e);
            }
        };
        let duration = started.elapsed();
        let timings = Timings {
            duration,
            waiting,
            receiving: duration.saturating_sub(waiting),
        };

        self.record(base_tags(&method, &name, status, extra_tags), status, timings);

        HttpResponse {
            status,
            body,
            timings,
            error: None,
            url,
        }
    }

    /// Send all requests concurrently. Responses are in the same order as `requests`.
    pub async fn batch(&self, requests: Vec<HttpRequest>) -> Vec<HttpResponse> {
        futures::future::join_all(requests.into_iter().map(|request| self.request(request))).await
    }

    pub async fn get(&self, url: impl Into<String>) -> HttpResponse {
        self.request(HttpRequest::get(url)).await
    }

    fn failed(
        &self,
        url: String,
        method: &str,
        name: &str,
        extra_tags: Tags,
        timings: Timings,
        err: &reqwest::Error,
    ) -> HttpResponse {
        let description = describe(err);
        log::debug!("{method} {url} failed: {description}");

        let mut request_tags = base_tags(method, name, 0, extra_tags);
        request_tags.insert(tags::ERROR.to_string(), classify(err).to_string());
        self.record(request_tags, 0, timings);

        HttpResponse::transport_error(url, timings, description)
    }

    fn record(&self, request_tags: Tags, status: u16, timings: Timings) {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;

        self.metrics.record(
            names::HTTP_REQS,
            SampleValue::Counter(1.0),
            request_tags.clone(),
        );
        self.metrics.record(
            names::HTTP_REQ_DURATION,
            SampleValue::Trend(ms(timings.duration)),
            request_tags.clone(),
        );
        self.metrics.record(
            names::HTTP_REQ_WAITING,
            SampleValue::Trend(ms(timings.waiting)),
            request_tags.clone(),
        );
        self.metrics.record(
            names::HTTP_REQ_RECEIVING,
            SampleValue::Trend(ms(timings.receiving)),
            request_tags.clone(),
        );
        self.metrics.record(
            names::HTTP_REQ_FAILED,
            SampleValue::Rate(is_failed_status(status)),
            request_tags,
        );
    }
}

fn base_tags(method: &str, name: &str, status: u16, extra_tags: Tags) -> Tags {
    let mut request_tags = Tags::from([
        (tags::METHOD.to_string(), method.to_string()),
        (tags::NAME.to_string(), name.to_string()),
        (tags::STATUS.to_string(), status.to_string()),
        (
            tags::EXPECTED_RESPONSE.to_string(),
            (!is_failed_status(status)).to_string(),
        ),
    ]);
    request_tags.extend(extra_tags);
    request_tags
}
