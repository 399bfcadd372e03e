use crate::aggregate::Aggregate;
use crate::metrics::{names, tags, Sample, SampleValue, Tags};
use crosswind_summary_model::{CheckSummary, MetricKind, MetricSummary, SubMetricSummary};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

type SeriesKey = (String, Tags);

#[derive(Debug)]
struct Series {
    aggregate: Aggregate,
    first_seen: SystemTime,
    last_seen: SystemTime,
}

/// Collects samples for the lifetime of a run.
///
/// Samples are aggregated as they arrive, nothing is kept per sample. A series is a metric name
/// plus a tag set. Recording takes a read lock on the series map and a lock on the one series being
/// updated, so workers recording into different series do not contend.
///
/// The first sample recorded for a metric name fixes the kind of that metric. Later samples with a
/// different kind are dropped with a warning.
#[derive(Debug)]
pub struct MetricsRegistry {
    kinds: RwLock<HashMap<String, MetricKind>>,
    series: RwLock<HashMap<SeriesKey, Arc<Mutex<Series>>>>,
    started: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            kinds: RwLock::new(HashMap::new()),
            series: RwLock::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    pub fn record(&self, sample: Sample) {
        let kind = sample.value.kind();
        if !self.claim_kind(&sample.name, kind) {
            return;
        }

        let Sample {
            name,
            value,
            tags,
            timestamp,
        } = sample;
        let key = (name, tags);

        let existing = self.series.read().get(&key).cloned();
        let series = match existing {
            Some(series) => series,
            None => self
                .series
                .write()
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Series {
                        aggregate: Aggregate::new(kind),
                        first_seen: timestamp,
                        last_seen: timestamp,
                    }))
                })
                .clone(),
        };

        let mut series = series.lock();
        if series.aggregate.observe(value, timestamp) {
            series.first_seen = series.first_seen.min(timestamp);
            series.last_seen = series.last_seen.max(timestamp);
        }
    }

    /// Record the outcome of a check into the `checks` rate. Returns the outcome so that it can be
    /// used in a condition.
    pub fn check(&self, label: &str, passed: bool, base_tags: &Tags) -> bool {
        self.record(
            Sample::new(names::CHECKS, SampleValue::Rate(passed))
                .with_tags(base_tags)
                .with_tag(tags::CHECK, label),
        );
        if !passed {
            log::debug!("Check failed: {label}");
        }
        passed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Take a snapshot of every series, using the time since the registry was created for
    /// per-second rates.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_with_elapsed(self.started.elapsed())
    }

    pub fn snapshot_with_elapsed(&self, elapsed: Duration) -> MetricsSnapshot {
        let mut series = self
            .series
            .read()
            .iter()
            .map(|((name, tags), series)| {
                let series = series.lock();
                SeriesSnapshot {
                    name: name.clone(),
                    tags: tags.clone(),
                    aggregate: series.aggregate.clone(),
                    first_seen: series.first_seen,
                    last_seen: series.last_seen,
                }
            })
            .collect::<Vec<_>>();
        series.sort_by(|a, b| (&a.name, &a.tags).cmp(&(&b.name, &b.tags)));

        MetricsSnapshot { elapsed, series }
    }

    fn claim_kind(&self, name: &str, kind: MetricKind) -> bool {
        let existing = self.kinds.read().get(name).copied();
        let claimed = match existing {
            Some(claimed) => claimed,
            None => *self.kinds.write().entry(name.to_string()).or_insert(kind),
        };

        if claimed != kind {
            log::warn!(
                "Dropping {kind} sample for metric `{name}` which is already registered as a {claimed}"
            );
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    pub name: String,
    pub tags: Tags,
    pub aggregate: Aggregate,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

impl SeriesSnapshot {
    fn matches(&self, name: &str, filter: &Tags) -> bool {
        self.name == name
            && filter
                .iter()
                .all(|(k, v)| self.tags.get(k).is_some_and(|value| value == v))
    }
}

/// A point in time copy of all metrics in a [MetricsRegistry].
///
/// Series are sorted by name and tags so that a snapshot does not depend on the order in which
/// series were created.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    elapsed: Duration,
    series: Vec<SeriesSnapshot>,
}

impl MetricsSnapshot {
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn series(&self) -> &[SeriesSnapshot] {
        &self.series
    }

    pub fn metric_names(&self) -> BTreeSet<&str> {
        self.series.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.aggregate.kind())
    }

    /// Merge every series of `name` whose tags include all of `filter`. Returns `None` if no series
    /// matched.
    pub fn aggregate(&self, name: &str, filter: &Tags) -> Option<Aggregate> {
        let mut matching = self.series.iter().filter(|s| s.matches(name, filter));
        let mut aggregate = matching.next()?.aggregate.clone();
        for series in matching {
            aggregate.merge(&series.aggregate);
        }
        Some(aggregate)
    }

    /// Summarise every metric.
    ///
    /// Each metric gets a sub-metric per value of the `scenario` tag, per value of the `name` tag
    /// for HTTP metrics, and one for each of `filters` that refers to it. A filter is a metric name
    /// and tag set, as used by thresholds.
    pub fn summarize(&self, filters: &[(String, Tags)]) -> Vec<MetricSummary> {
        self.metric_names()
            .into_iter()
            .filter_map(|name| {
                let overall = self.aggregate(name, &Tags::new())?;

                let mut sub_filters = BTreeSet::new();
                for series in self.series.iter().filter(|s| s.name == name) {
                    if let Some(scenario) = series.tags.get(tags::SCENARIO) {
                        sub_filters.insert(Tags::from([(
                            tags::SCENARIO.to_string(),
                            scenario.clone(),
                        )]));
                    }
                    if name.starts_with("http_req") {
                        if let Some(endpoint) = series.tags.get(tags::NAME) {
                            sub_filters.insert(Tags::from([(
                                tags::NAME.to_string(),
                                endpoint.clone(),
                            )]));
                        }
                    }
                }
                sub_filters.extend(
                    filters
                        .iter()
                        .filter(|(metric, tags)| metric == name && !tags.is_empty())
                        .map(|(_, tags)| tags.clone()),
                );

                let submetrics = sub_filters
                    .into_iter()
                    .filter_map(|filter| {
                        let aggregate = self.aggregate(name, &filter)?;
                        Some(SubMetricSummary {
                            tags: filter,
                            values: aggregate.to_values(self.elapsed),
                        })
                    })
                    .collect();

                Some(MetricSummary {
                    name: name.to_string(),
                    kind: overall.kind(),
                    values: overall.to_values(self.elapsed),
                    submetrics,
                })
            })
            .collect()
    }

    /// Pass and fail counts per check label and scenario, in the order the checks were first seen.
    pub fn checks(&self) -> Vec<CheckSummary> {
        let mut grouped: BTreeMap<(String, Option<String>), (SystemTime, u64, u64)> =
            BTreeMap::new();

        for series in self.series.iter().filter(|s| s.name == names::CHECKS) {
            let Aggregate::Rate { trues, total } = series.aggregate else {
                continue;
            };
            let label = series.tags.get(tags::CHECK).cloned().unwrap_or_default();
            let scenario = series.tags.get(tags::SCENARIO).cloned();

            let entry = grouped
                .entry((label, scenario))
                .or_insert((series.first_seen, 0, 0));
            entry.0 = entry.0.min(series.first_seen);
            entry.1 += trues;
            entry.2 += total - trues;
        }

        let mut checks = grouped.into_iter().collect::<Vec<_>>();
        checks.sort_by(|(a_key, a), (b_key, b)| a.0.cmp(&b.0).then_with(|| a_key.cmp(b_key)));
        checks
            .into_iter()
            .map(|((name, scenario), (_, passes, fails))| CheckSummary {
                name,
                scenario,
                passes,
                fails,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswind_summary_model::MetricValues;
    use rand::seq::SliceRandom;

    fn samples() -> Vec<Sample> {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut samples = Vec::new();
        for i in 0..200u64 {
            let at = base + Duration::from_millis(i * 7);
            let scenario = if i % 3 == 0 { "steady_read" } else { "spike" };
            samples.push(
                Sample::new(names::HTTP_REQ_DURATION, SampleValue::Trend(i as f64 * 1.37))
                    .with_tag(tags::SCENARIO, scenario)
                    .with_tag(tags::NAME, "/healthz")
                    .at(at),
            );
            samples.push(
                Sample::new(names::HTTP_REQ_FAILED, SampleValue::Rate(i % 10 == 0))
                    .with_tag(tags::SCENARIO, scenario)
                    .at(at),
            );
            samples.push(
                Sample::new(names::HTTP_REQS, SampleValue::Counter(0.1))
                    .with_tag(tags::SCENARIO, scenario)
                    .at(at),
            );
            samples.push(Sample::new(names::VUS, SampleValue::Gauge((i % 17) as f64)).at(at));
        }
        samples
    }

    fn summarize_in_order(samples: Vec<Sample>) -> (Vec<MetricSummary>, Vec<CheckSummary>) {
        let registry = MetricsRegistry::new();
        for sample in samples {
            registry.record(sample);
        }
        let snapshot = registry.snapshot_with_elapsed(Duration::from_secs(10));
        (snapshot.summarize(&[]), snapshot.checks())
    }

    #[test]
    fn aggregation_does_not_depend_on_sample_order() {
        let ordered = summarize_in_order(samples());

        let mut rng = rand::thread_rng();
        for _ in 0..5 {
            let mut shuffled = samples();
            shuffled.shuffle(&mut rng);
            pretty_assertions::assert_eq!(ordered, summarize_in_order(shuffled));
        }

        let mut reversed = samples();
        reversed.reverse();
        pretty_assertions::assert_eq!(ordered, summarize_in_order(reversed));
    }

    #[test]
    fn aggregation_is_the_same_across_threads() {
        let ordered = summarize_in_order(samples());

        let registry = Arc::new(MetricsRegistry::new());
        let handles = samples()
            .chunks(50)
            .map(|chunk| {
                let chunk = chunk.to_vec();
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for sample in chunk.into_iter().rev() {
                        registry.record(sample);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot_with_elapsed(Duration::from_secs(10));
        pretty_assertions::assert_eq!(ordered, (snapshot.summarize(&[]), snapshot.checks()));
    }

    #[test]
    fn aggregate_filters_by_tags() {
        let registry = MetricsRegistry::new();
        for sample in samples() {
            registry.record(sample);
        }
        let snapshot = registry.snapshot();

        let all = snapshot
            .aggregate(names::HTTP_REQ_FAILED, &Tags::new())
            .unwrap();
        let steady = snapshot
            .aggregate(
                names::HTTP_REQ_FAILED,
                &Tags::from([(tags::SCENARIO.to_string(), "steady_read".to_string())]),
            )
            .unwrap();

        let Aggregate::Rate { total, .. } = all else {
            panic!("Expected a rate");
        };
        assert_eq!(200, total);
        let Aggregate::Rate { total, .. } = steady else {
            panic!("Expected a rate");
        };
        assert_eq!(67, total);

        assert!(snapshot
            .aggregate(
                names::HTTP_REQ_FAILED,
                &Tags::from([(tags::SCENARIO.to_string(), "missing".to_string())])
            )
            .is_none());
    }

    #[test]
    fn metric_kind_is_fixed_by_first_sample() {
        let registry = MetricsRegistry::new();
        registry.record(Sample::new("read_duration", SampleValue::Trend(12.0)));
        registry.record(Sample::new("read_duration", SampleValue::Rate(true)));

        let snapshot = registry.snapshot();
        assert_eq!(Some(MetricKind::Trend), snapshot.kind("read_duration"));
        let Some(Aggregate::Trend(trend)) = snapshot.aggregate("read_duration", &Tags::new())
        else {
            panic!("Expected a trend");
        };
        assert_eq!(1, trend.count());
    }

    #[test]
    fn checks_are_grouped_by_label_and_scenario() {
        let registry = MetricsRegistry::new();
        let base = Tags::from([(tags::SCENARIO.to_string(), "smoke".to_string())]);

        assert!(registry.check("health 200", true, &base));
        assert!(registry.check("health 200", true, &base));
        assert!(!registry.check("today 200", false, &base));

        let snapshot = registry.snapshot();
        let checks = snapshot.checks();
        assert_eq!(2, checks.len());
        assert_eq!("health 200", checks[0].name);
        assert_eq!(Some("smoke".to_string()), checks[0].scenario);
        assert_eq!((2, 0), (checks[0].passes, checks[0].fails));
        assert_eq!((0, 1), (checks[1].passes, checks[1].fails));

        let summary = snapshot.summarize(&[]);
        let checks_metric = summary.iter().find(|m| m.name == names::CHECKS).unwrap();
        let MetricValues::Rate { passes, fails, .. } = checks_metric.values else {
            panic!("Expected rate values");
        };
        assert_eq!((2, 1), (passes, fails));
    }

    #[test]
    fn summarize_adds_requested_submetrics() {
        let registry = MetricsRegistry::new();
        for sample in samples() {
            registry.record(sample);
        }
        let snapshot = registry.snapshot();

        let filter = Tags::from([(tags::NAME.to_string(), "/healthz".to_string())]);
        let summary = snapshot.summarize(&[(names::HTTP_REQ_FAILED.to_string(), filter.clone())]);
        let failed = summary
            .iter()
            .find(|m| m.name == names::HTTP_REQ_FAILED)
            .unwrap();

        // Two scenarios plus the requested filter, which has no data for this metric.
        assert_eq!(2, failed.submetrics.len());
        assert!(failed.submetrics.iter().all(|s| s.tags != filter));

        let duration = summary
            .iter()
            .find(|m| m.name == names::HTTP_REQ_DURATION)
            .unwrap();
        assert!(duration.submetrics.iter().any(|s| s.tags == filter));
    }
}
