use anyhow::{bail, Result};
use std::{path::PathBuf, time::Duration};

/// Output encodings. `yml` is accepted as an alias of `yaml` and kept as the file extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Yaml,
    Yml,
}

/// Settings for a single collection run.
#[derive(Clone, Debug)]
pub struct Config {
    /// The kubeconfig context being collected. Reported (possibly hashed) as the cluster name.
    pub context: String,

    pub hide_names: bool,

    /// Reload the report at `output` and only collect what it lacks.
    pub resume: bool,

    pub output: PathBuf,

    /// Number of workers to scale each pass's concurrency limit by.
    pub parallelism: usize,

    pub progress: bool,

    /// Bounds the whole collection.
    pub timeout: Duration,
}

// === impl Format ===

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Yml => "yml",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Builds `<dir>/<prefix>.<format>`.
pub fn output_path(dir: impl Into<PathBuf>, prefix: &str, format: Format) -> PathBuf {
    dir.into().join(format!("{prefix}.{}", format.extension()))
}

/// The host's available parallelism, optionally capped. Values <= 0 do not cap.
pub fn parallelism(max_processors: i32) -> usize {
    let available = std::thread::available_parallelism().map_or(1, |n| n.get());
    match usize::try_from(max_processors) {
        Ok(max) if max > 0 => available.min(max),
        _ => available,
    }
}

/// Parses durations like `90s`, `30m`, or `1h30m`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            bail!("{s} is not a valid duration");
        }
        let (magnitude, tail) = rest.split_at(digits);
        let magnitude = magnitude.parse::<u64>()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit = match unit {
            "ms" => Duration::from_millis(1),
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(60 * 60),
            "" if magnitude == 0 && tail.is_empty() => Duration::ZERO,
            _ => bail!("invalid duration unit {unit:?} (expected one of 'ms', 's', 'm', or 'h')"),
        };

        let magnitude = u32::try_from(magnitude)?;
        total = unit
            .checked_mul(magnitude)
            .and_then(|d| total.checked_add(d))
            .ok_or_else(|| anyhow::anyhow!("duration {s} overflows"))?;
        rest = tail;
    }

    Ok(total)
}
