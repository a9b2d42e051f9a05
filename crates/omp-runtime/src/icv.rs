//! Internal control variables (ICVs).
//!
//! Four blocks, matching how state is shared: `GlobalVars` is process-wide,
//! `DataEnv` is copied for every encountered parallel region, `DeviceVars`
//! is per device, and `ITaskVars` rides on the implicit task. Defaults come
//! from the optional config file, then `OMP_*` environment variables win.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::config::FileConfig;

/// Loop schedule selected by `schedule(runtime)` and `omp_set_schedule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedKind {
    Static,
    Dynamic,
    Guided,
    Auto,
    Runtime,
}

impl SchedKind {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "static" => SchedKind::Static,
            "dynamic" => SchedKind::Dynamic,
            "guided" => SchedKind::Guided,
            "auto" => SchedKind::Auto,
            "runtime" => SchedKind::Runtime,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SchedKind::Static => "static",
            SchedKind::Dynamic => "dynamic",
            SchedKind::Guided => "guided",
            SchedKind::Auto => "auto",
            SchedKind::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub kind: SchedKind,
    pub chunk: i64,
    pub monotonic: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            kind: SchedKind::Static,
            chunk: -1,
            monotonic: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Active,
    Passive,
}

#[derive(Debug, Clone)]
pub struct GlobalVars {
    pub cancel: bool,
    pub debug: bool,
    pub max_task_priority: i64,
    pub target_offload: String,
}

#[derive(Debug, Clone)]
pub struct DataEnv {
    pub active_levels: i64,
    pub levels: i64,
    pub max_active_levels: i64,
    pub league_size: i64,
    pub team_num: i64,
    pub team_size: i64,
    pub thread_num: i64,
    pub thread_limit: i64,
    pub dynamic: bool,
    pub explicit_task: bool,
    pub final_task: bool,
    pub default_device: i64,
    /// Head is this region's width; the tail feeds nested regions.
    pub nthreads: Vec<i64>,
    pub run_sched: Schedule,
}

#[derive(Debug, Clone)]
pub struct DeviceVars {
    pub nteams: i64,
    pub teams_thread_limit: i64,
    pub stacksize: i64,
    pub wait_policy: WaitPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct ITaskVars {
    pub def_allocator: String,
}

/// The full ICV block carried by every task frame. Cloning shares the
/// process-wide parts and copies the per-region `DataEnv`.
#[derive(Debug, Clone)]
pub struct ControlVars {
    pub global: Arc<GlobalVars>,
    pub dataenv: DataEnv,
    pub device: Arc<DeviceVars>,
    pub itask: ITaskVars,
}

const LARGE: i64 = i64::MAX / 4;

pub fn n_cores() -> i64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(1)
}

fn getenv<T>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match std::env::var(name) {
        Ok(raw) => match parse(&raw) {
            Some(v) => v,
            None => {
                debug!(target: "config", var = name, value = %raw, "unparseable, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_nthreads_entry(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.contains("n_cores") {
        let substituted = raw.replace("n_cores", &n_cores().to_string());
        return substituted.trim().parse().ok();
    }
    raw.parse().ok()
}

fn parse_nthreads_list(raw: &str) -> Option<Vec<i64>> {
    raw.split(',').map(parse_nthreads_entry).collect()
}

static SCHED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(monotonic|nonmonotonic)\s*:\s*)?(static|dynamic|guided|auto)\s*(?:,\s*(\d+))?\s*$")
        .expect("schedule pattern compiles")
});

/// `[monotonic:|nonmonotonic:]kind[,chunk]`, e.g. `nonmonotonic:dynamic,4`.
pub fn parse_schedule(raw: &str) -> Option<Schedule> {
    let lowered = raw.to_ascii_lowercase();
    let caps = SCHED_RE.captures(&lowered)?;
    let kind = SchedKind::parse(caps.get(2)?.as_str())?;
    let monotonic = match caps.get(1).map(|m| m.as_str()) {
        Some(m) => m == "monotonic",
        None => kind == SchedKind::Static,
    };
    let chunk = caps
        .get(3)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(-1))?;
    Some(Schedule {
        kind,
        chunk,
        monotonic,
    })
}

static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([BKMG])?\s*$").expect("size pattern compiles"));

/// `OMP_STACKSIZE` grammar: a number with an optional B/K/M/G suffix,
/// kilobytes when no suffix is given.
pub fn parse_size(raw: &str) -> Option<i64> {
    let upper = raw.to_ascii_uppercase();
    let caps = SIZE_RE.captures(&upper)?;
    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("B") => 1,
        None | Some("K") => 1024,
        Some("M") => 1024 * 1024,
        Some("G") => 1024 * 1024 * 1024,
        _ => return None,
    };
    n.checked_mul(scale)
}

impl ControlVars {
    /// Build the process-initial ICV block: config file first, environment
    /// on top, hard defaults underneath.
    pub fn initial() -> Self {
        Self::with_config(&FileConfig::discover())
    }

    pub fn with_config(file: &FileConfig) -> Self {
        let global = GlobalVars {
            cancel: getenv("OMP_CANCELLATION", false, parse_bool),
            debug: getenv("OMP_DEBUG", false, parse_bool),
            max_task_priority: getenv("OMP_MAX_TASK_PRIORITY", 0, |s| s.trim().parse().ok()),
            target_offload: getenv("OMP_TARGET_OFFLOAD", "default".to_string(), |s| {
                let v = s.trim().to_ascii_lowercase();
                matches!(v.as_str(), "mandatory" | "disabled" | "default").then_some(v)
            }),
        };

        let nthreads_default = file
            .num_threads
            .clone()
            .unwrap_or_else(|| vec![n_cores()]);
        let sched_default = file
            .schedule
            .as_deref()
            .and_then(parse_schedule)
            .unwrap_or_default();
        let dataenv = DataEnv {
            active_levels: 0,
            levels: 0,
            max_active_levels: getenv(
                "OMP_MAX_ACTIVE_LEVELS",
                file.max_active_levels.unwrap_or(LARGE),
                |s| s.trim().parse().ok(),
            ),
            league_size: 1,
            team_num: 0,
            team_size: 1,
            thread_num: 0,
            thread_limit: getenv(
                "OMP_THREAD_LIMIT",
                file.thread_limit.unwrap_or(LARGE),
                |s| s.trim().parse().ok(),
            ),
            dynamic: getenv("OMP_DYNAMIC", false, parse_bool),
            explicit_task: false,
            final_task: false,
            default_device: getenv("OMP_DEFAULT_DEVICE", 0, |s| s.trim().parse().ok()),
            nthreads: getenv("OMP_NUM_THREADS", nthreads_default, parse_nthreads_list),
            run_sched: getenv("OMP_SCHEDULE", sched_default, parse_schedule),
        };

        let device = DeviceVars {
            nteams: getenv("OMP_NUM_TEAMS", 0, |s| s.trim().parse().ok()),
            teams_thread_limit: getenv("OMP_TEAMS_THREAD_LIMIT", 0, |s| s.trim().parse().ok()),
            stacksize: getenv("OMP_STACKSIZE", -1, parse_size),
            wait_policy: getenv("OMP_WAIT_POLICY", WaitPolicy::Active, |s| {
                match s.trim().to_ascii_lowercase().as_str() {
                    "active" => Some(WaitPolicy::Active),
                    "passive" => Some(WaitPolicy::Passive),
                    _ => None,
                }
            }),
        };

        Self {
            global: Arc::new(global),
            dataenv,
            device: Arc::new(device),
            itask: ITaskVars::default(),
        }
    }

    /// Resolve the `num_threads` list into this region's team size, shifting
    /// the list tail down for nested regions. Returns the requested size
    /// before any limit clamping.
    pub fn take_team_size(&mut self) -> i64 {
        let requested = *self.dataenv.nthreads.first().unwrap_or(&1);
        if self.dataenv.nthreads.len() > 1 {
            self.dataenv.nthreads.remove(0);
        }
        requested
    }
}
