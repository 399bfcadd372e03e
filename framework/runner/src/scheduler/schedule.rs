use std::time::Duration;

/// A timed linear ramp from the previous target to `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("A scenario needs at least one stage")]
    NoStages,
    #[error("The arrival rate time unit must be greater than zero")]
    ZeroTimeUnit,
    #[error("max_vus ({max_vus}) must be at least pre_allocated_vus ({pre_allocated_vus})")]
    MaxVusBelowPreAllocated { max_vus: u64, pre_allocated_vus: u64 },
    #[error("An arrival rate scenario needs at least one VU to run iterations on")]
    NoVus,
    #[error("No schedule has been configured, use `with_ramping_vus` or `with_ramping_arrival_rate`")]
    Missing,
}

/// A piecewise linear target over time, starting from `start`.
#[derive(Debug, Clone)]
pub(crate) struct Schedule {
    start: f64,
    stages: Vec<Stage>,
}

impl Schedule {
    pub(crate) fn new(start: u64, stages: &[Stage]) -> Self {
        Self {
            start: start as f64,
            stages: stages.to_vec(),
        }
    }

    pub(crate) fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// The interpolated target at `elapsed`. Past the end of the schedule this is the last target.
    pub(crate) fn value_at(&self, elapsed: Duration) -> f64 {
        let mut from = self.start;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            let end = offset + stage.duration;
            if elapsed < end {
                let progress = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                return from + (stage.target as f64 - from) * progress;
            }
            from = stage.target as f64;
            offset = end;
        }
        from
    }

    /// The integral of the target from the start of the schedule until `elapsed`, in target-seconds.
    pub(crate) fn area_until(&self, elapsed: Duration) -> f64 {
        let mut area = 0.0;
        let mut from = self.start;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            if elapsed <= offset {
                break;
            }
            let to = stage.target as f64;
            let d = stage.duration.as_secs_f64();
            let s = (elapsed - offset).min(stage.duration).as_secs_f64();
            if d > 0.0 {
                area += from * s + (to - from) * s * s / (2.0 * d);
            }
            from = to;
            offset += stage.duration;
        }
        area
    }

    /// When the `n`th arrival (counting from 1) is due, for a rate of `target` arrivals per
    /// `time_unit`. Returns `None` if the schedule ends before then.
    pub(crate) fn arrival_time(&self, n: u64, time_unit: Duration) -> Option<Duration> {
        let unit = time_unit.as_secs_f64();
        let wanted = n as f64 - 1e-9;
        let arrivals = |t: f64| self.area_until(Duration::from_secs_f64(t)) / unit;

        let total = self.total_duration().as_secs_f64();
        if arrivals(total) < wanted {
            return None;
        }

        let (mut lo, mut hi) = (0.0, total);
        for _ in 0..64 {
            let mid = (lo + hi) / 2.0;
            if arrivals(mid) >= wanted {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Some(Duration::from_secs_f64(hi))
    }
}

/// Run a pool of VUs, each looping over the behaviour, with the pool size following the stages.
#[derive(Debug, Clone, PartialEq)]
pub struct RampingVus {
    pub(crate) start_vus: u64,
    pub(crate) stages: Vec<Stage>,
    pub(crate) graceful_ramp_down: Duration,
}

impl RampingVus {
    pub fn new(start_vus: u64) -> Self {
        Self {
            start_vus,
            stages: Vec::new(),
            graceful_ramp_down: Duration::from_secs(30),
        }
    }

    pub fn stage(mut self, duration: Duration, target: u64) -> Self {
        self.stages.push(Stage { duration, target });
        self
    }

    /// How long a VU that is retired because the target went down may take to finish its current
    /// iteration before that iteration is interrupted.
    pub fn graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    pub(crate) fn schedule(&self) -> Schedule {
        Schedule::new(self.start_vus, &self.stages)
    }
}

/// Start iterations at a rate that follows the stages, independent of how long they take.
#[derive(Debug, Clone, PartialEq)]
pub struct RampingArrivalRate {
    pub(crate) start_rate: u64,
    pub(crate) time_unit: Duration,
    pub(crate) pre_allocated_vus: u64,
    pub(crate) max_vus: Option<u64>,
    pub(crate) stages: Vec<Stage>,
}

impl RampingArrivalRate {
    pub fn new(start_rate: u64) -> Self {
        Self {
            start_rate,
            time_unit: Duration::from_secs(1),
            pre_allocated_vus: 1,
            max_vus: None,
            stages: Vec::new(),
        }
    }

    /// The period that stage targets are expressed over. Defaults to one second.
    pub fn time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit = time_unit;
        self
    }

    pub fn pre_allocated_vus(mut self, pre_allocated_vus: u64) -> Self {
        self.pre_allocated_vus = pre_allocated_vus;
        self
    }

    /// Defaults to `pre_allocated_vus`.
    pub fn max_vus(mut self, max_vus: u64) -> Self {
        self.max_vus = Some(max_vus);
        self
    }

    pub fn stage(mut self, duration: Duration, target: u64) -> Self {
        self.stages.push(Stage { duration, target });
        self
    }

    pub(crate) fn effective_max_vus(&self) -> u64 {
        self.max_vus.unwrap_or(self.pre_allocated_vus)
    }

    pub(crate) fn schedule(&self) -> Schedule {
        Schedule::new(self.start_rate, &self.stages)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleKind {
    RampingVus(RampingVus),
    RampingArrivalRate(RampingArrivalRate),
}

impl ScheduleKind {
    pub(crate) fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            ScheduleKind::RampingVus(config) => {
                if config.stages.is_empty() {
                    return Err(ScheduleError::NoStages);
                }
            }
            ScheduleKind::RampingArrivalRate(config) => {
                if config.stages.is_empty() {
                    return Err(ScheduleError::NoStages);
                }
                if config.time_unit.is_zero() {
                    return Err(ScheduleError::ZeroTimeUnit);
                }
                let max_vus = config.effective_max_vus();
                if max_vus < config.pre_allocated_vus {
                    return Err(ScheduleError::MaxVusBelowPreAllocated {
                        max_vus,
                        pre_allocated_vus: config.pre_allocated_vus,
                    });
                }
                if max_vus == 0 {
                    return Err(ScheduleError::NoVus);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn planned_duration(&self) -> Duration {
        match self {
            ScheduleKind::RampingVus(config) => config.schedule().total_duration(),
            ScheduleKind::RampingArrivalRate(config) => config.schedule().total_duration(),
        }
    }

    pub(crate) fn description(&self) -> String {
        match self {
            ScheduleKind::RampingVus(config) => {
                format!("ramping-vus ({} stages)", config.stages.len())
            }
            ScheduleKind::RampingArrivalRate(config) => format!(
                "ramping-arrival-rate ({} stages, {}..{} VUs)",
                config.stages.len(),
                config.pre_allocated_vus,
                config.effective_max_vus()
            ),
        }
    }
}
