mod metric;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::Path;

pub use metric::{
    format_metric_expression, CheckSummary, MetricKind, MetricSummary, MetricValues,
    SubMetricSummary, ThresholdVerdict,
};

/// Summary of a run
///
/// Produced once by the runner at the end of a run. There are no methods to modify a summary after
/// [RunSummary::with_results] has been called.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run. This is also the value of the `scenario` tag.
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration that the run was planned for, in seconds
    ///
    /// Runs that are bounded by an iteration count can finish much sooner than this.
    pub run_duration: Option<u64>,
    /// How long the run actually took, in milliseconds
    pub elapsed_ms: u64,
    /// Human readable description of the executor, for example `ramping-vus (4 stages)`
    pub executor: String,
    /// The highest number of VUs that were running at the same time
    pub peak_vus: usize,
    pub metrics: Vec<MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdVerdict>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the configuration that the runner is
    /// aware of.
    pub env: HashMap<String, String>,
    /// The version of Crosswind that was used for this run
    pub crosswind_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration: Option<u64>,
        executor: String,
        crosswind_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            elapsed_ms: 0,
            executor,
            peak_vus: 0,
            metrics: Vec::new(),
            checks: Vec::new(),
            thresholds: Vec::new(),
            env: HashMap::with_capacity(0),
            crosswind_version,
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Attach the results of the run
    pub fn with_results(
        mut self,
        elapsed_ms: u64,
        peak_vus: usize,
        metrics: Vec<MetricSummary>,
        checks: Vec<CheckSummary>,
        thresholds: Vec<ThresholdVerdict>,
    ) -> Self {
        self.elapsed_ms = elapsed_ms;
        self.peak_vus = peak_vus;
        self.metrics = metrics;
        self.checks = checks;
        self.thresholds = thresholds;
        self
    }

    /// True if every threshold passed. A run without thresholds passes.
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdVerdict> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// The overall pass rate of all checks, if any checks ran.
    pub fn checks_rate(&self) -> Option<f64> {
        match self.metric("checks").map(|m| &m.values) {
            Some(MetricValues::Rate { rate, .. }) => Some(*rate),
            _ => None,
        }
    }

    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn threshold(&self, metric: &str, condition: &str) -> Option<&ThresholdVerdict> {
        self.thresholds
            .iter()
            .find(|t| t.metric == metric && t.condition == condition)
    }

    /// All values of the `scenario` tag seen in this summary, sorted.
    pub fn scenario_tags(&self) -> Vec<String> {
        let mut scenarios = BTreeSet::new();
        scenarios.insert(self.scenario_name.clone());
        for metric in &self.metrics {
            for sub in &metric.submetrics {
                if let Some(scenario) = sub.tags.get("scenario") {
                    scenarios.insert(scenario.clone());
                }
            }
        }
        for check in &self.checks {
            if let Some(scenario) = &check.scenario {
                scenarios.insert(scenario.clone());
            }
        }
        scenarios.into_iter().collect()
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Run duration
    ///     - Executor description
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Crosswind version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        if let Some(run_duration) = self.run_duration {
            Digest::update(&mut hasher, run_duration.to_le_bytes());
        }
        Digest::update(&mut hasher, self.executor.as_bytes());
        self.thresholds
            .iter()
            .map(|t| format!("{}:{}", t.metric, t.condition))
            .sorted()
            .for_each(|t| Digest::update(&mut hasher, t.as_bytes()));
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.crosswind_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: &Path) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_summary() -> RunSummary {
        RunSummary::new(
            "run-1".to_string(),
            "steady_read".to_string(),
            1_700_000_000,
            Some(240),
            "ramping-vus (4 stages)".to_string(),
            "0.1.0".to_string(),
        )
        .with_env("BASE_URL", "http://localhost:4000")
        .with_results(
            1_500,
            50,
            vec![MetricSummary {
                name: "checks".to_string(),
                kind: MetricKind::Rate,
                values: MetricValues::Rate {
                    rate: 0.75,
                    passes: 3,
                    fails: 1,
                },
                submetrics: vec![SubMetricSummary {
                    tags: BTreeMap::from([("scenario".to_string(), "other".to_string())]),
                    values: MetricValues::Rate {
                        rate: 1.0,
                        passes: 1,
                        fails: 0,
                    },
                }],
            }],
            vec![CheckSummary {
                name: "health 200".to_string(),
                scenario: Some("steady_read".to_string()),
                passes: 3,
                fails: 1,
            }],
            vec![ThresholdVerdict {
                metric: "checks".to_string(),
                condition: "rate>0.95".to_string(),
                observed: Some(0.75),
                passed: false,
                note: None,
            }],
        )
    }

    #[test]
    fn thresholds_passed_reflects_verdicts() {
        let summary = sample_summary();
        assert!(!summary.thresholds_passed());
        assert_eq!(1, summary.failed_thresholds().count());

        let empty = RunSummary::new(
            "run-2".to_string(),
            "smoke".to_string(),
            0,
            None,
            "ramping-vus (1 stage)".to_string(),
            "0.1.0".to_string(),
        );
        assert!(empty.thresholds_passed());
    }

    #[test]
    fn checks_rate_reads_the_checks_metric() {
        assert_eq!(Some(0.75), sample_summary().checks_rate());
    }

    #[test]
    fn scenario_tags_include_submetric_and_check_scenarios() {
        assert_eq!(
            vec!["other".to_string(), "steady_read".to_string()],
            sample_summary().scenario_tags()
        );
    }

    #[test]
    fn fingerprint_ignores_results() {
        let summary = sample_summary();
        let mut other = summary.clone();
        other.run_id = "run-other".to_string();
        other.elapsed_ms = 99;
        other.thresholds[0].observed = Some(1.0);

        assert_eq!(summary.fingerprint(), other.fingerprint());

        other.env.insert("BASE_URL".to_string(), "http://other".to_string());
        assert_ne!(summary.fingerprint(), other.fingerprint());
    }

    #[test]
    fn append_and_load_summaries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run_summary.jsonl");

        let summary = sample_summary();
        append_run_summary(&summary, &path)?;
        append_run_summary(&summary, &path)?;

        let loaded = load_summary_runs(&path)?;
        assert_eq!(2, loaded.len());
        pretty_assertions::assert_eq!(summary, loaded[0]);

        let single = load_run_summary(serde_json::to_vec(&summary)?.as_slice())?;
        pretty_assertions::assert_eq!(summary, single);

        Ok(())
    }
}
