//! Logging configuration.
//!
//! `LAD_LOG` holds either a bare level applied to every lad component
//! (`debug`) or a comma list of `component=level` pairs with an optional
//! bare default (`warn,store=debug,reaper=trace`). Unknown entries are
//! ignored. `-v`/`-q` replace the whole setting. `RUST_LOG`, when set,
//! bypasses all of this and goes straight to `EnvFilter`.

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines on stderr (default).
    #[default]
    Human,
    /// One JSON object per event on stderr.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(name)
    }
}

/// A part of lad that can be given its own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The `lad` binary and `lad_core`.
    Cli,
    Config,
    /// Tree operations: insert, query, delta, remove.
    Store,
    /// Reaper passes, including the background thread.
    Reaper,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Cli,
        Component::Config,
        Component::Store,
        Component::Reaper,
    ];

    /// Tracing targets covered by this component.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Component::Cli => &["lad", "lad_core"],
            Component::Config => &["lad_config"],
            Component::Store => &["lad_store"],
            Component::Reaper => &["lad_store::reaper"],
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cli" | "core" => Some(Component::Cli),
            "config" => Some(Component::Config),
            "store" => Some(Component::Store),
            "reaper" => Some(Component::Reaper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Level for components without an override.
    pub level: LogLevel,
    pub overrides: Vec<(Component, LogLevel)>,
}

impl LogConfig {
    /// Resolve from `LAD_LOG`, `LAD_LOG_FORMAT` and CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_vars(
            std::env::var("LAD_LOG").ok().as_deref(),
            std::env::var("LAD_LOG_FORMAT").ok().as_deref(),
            cli_level,
            cli_format,
        )
    }

    pub fn from_vars(
        lad_log: Option<&str>,
        lad_log_format: Option<&str>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();
        if let Some(filter) = lad_log {
            config.apply_filter(filter);
        }
        if let Some(format) = lad_log_format.and_then(|v| v.parse::<LogFormat>().ok()) {
            config.format = format;
        }

        if let Some(level) = cli_level {
            config.level = level;
            config.overrides.clear();
        }
        if let Some(format) = cli_format {
            config.format = format;
        }
        config
    }

    fn apply_filter(&mut self, filter: &str) {
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((name, level)) => {
                    let level = level.parse::<LogLevel>();
                    if let (Some(component), Ok(level)) = (Component::parse(name), level) {
                        self.set(component, level);
                    }
                }
                None => {
                    if let Ok(level) = entry.parse::<LogLevel>() {
                        self.level = level;
                    }
                }
            }
        }
    }

    fn set(&mut self, component: Component, level: LogLevel) {
        self.overrides.retain(|(c, _)| *c != component);
        self.overrides.push((component, level));
    }

    pub fn level_for(&self, component: Component) -> LogLevel {
        self.overrides
            .iter()
            .find(|(c, _)| *c == component)
            .map_or(self.level, |(_, level)| *level)
    }

    /// `EnvFilter` directives for every lad target.
    pub fn directives(&self) -> String {
        Component::ALL
            .iter()
            .flat_map(|&component| {
                let level = self.level_for(component);
                component
                    .targets()
                    .iter()
                    .map(move |target| format!("{}={}", target, level))
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
