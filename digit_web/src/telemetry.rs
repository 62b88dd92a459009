use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

/// Bucket layout for submission latency: fine-grained below one second, then
/// coarser up to the default gateway timeout.
const SUBMISSION_DURATION_RANGES: &[(u64, u64, usize)] = &[
    (0, 100, 10),
    (100, 1_000, 100),
    (1_000, 5_000, 500),
    (5_000, 20_000, 2_500),
];

pub struct Metrics {
    request_counter: Counter<u64>,
    submission_counter: Counter<u64>,
    submission_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        // TODO: deprecated crate to be replaced with an OTLP exporter
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("digit_web");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let submission_counter = meter
            .u64_counter("submissions_total")
            .with_description("Image submissions by outcome")
            .build();

        let submission_duration = meter
            .u64_histogram("submission_duration_ms")
            .with_boundaries(generate_boundaries(SUBMISSION_DURATION_RANGES))
            .with_description("Duration of image submissions in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            submission_counter,
            submission_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_submission(&self, outcome: &'static str, duration_ms: u64) {
        let attributes = vec![KeyValue::new("outcome", outcome)];
        self.submission_counter.add(1, &attributes);
        self.submission_duration.record(duration_ms, &attributes);
    }
}

/// Concatenates `(start, end, step)` ranges into sorted, de-duplicated bucket
/// boundaries. Ranges are inclusive on both ends.
fn generate_boundaries(ranges: &[(u64, u64, usize)]) -> Vec<f64> {
    let mut seen = HashSet::new();
    ranges
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step))
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_generate_boundaries() {
        let ranges = [(2, 22, 10), (22, 26, 2), (26, 46, 20), (46, 146, 100)];
        let get = generate_boundaries(&ranges);
        let expected = vec![2.0, 12.0, 22.0, 24.0, 26.0, 46.0, 146.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_submission_boundaries_are_increasing() {
        let boundaries = generate_boundaries(SUBMISSION_DURATION_RANGES);

        assert!(boundaries.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(boundaries.last(), Some(&20_000.0));
    }

    #[test]
    fn test_recorded_submission_is_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_submission("success", 42);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let exported = String::from_utf8(buffer).unwrap();

        assert!(exported.contains("submissions_total"));
        assert!(exported.contains("outcome=\"success\""));
    }
}
