#![forbid(unsafe_code)]
//! CLI argument parsing and the typed run configuration derived from it.
//! Grounded on the teacher's `settings.rs` (`Args`/`Settings` split,
//! `from_args`/`validate`, thread-count clamping) and `cli.rs`'s `Args`
//! derive shape.

use std::{cmp, fmt, path::PathBuf};
use clap::Parser;
use derive_builder::Builder;

use crate::{error::RuntimeError, report::DEFAULT_SUSPECT_EPS};

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BatteryKind {
    #[value(name = "SmallCrush")]
    SmallCrush,
    #[value(name = "Crush")]
    Crush,
    #[value(name = "BigCrush")]
    BigCrush,
    #[value(name = "pseudoDIEHARD")]
    PseudoDiehard,
    #[value(name = "SmallCrush_ser")]
    SmallCrushSer,
    #[value(name = "Crush_ser")]
    CrushSer,
    #[value(name = "BigCrush_ser")]
    BigCrushSer,
    #[value(name = "pseudoDIEHARD_ser")]
    PseudoDiehardSer,
    #[value(name = "stdout32")]
    Stdout32,
    #[value(name = "stdout64")]
    Stdout64,
    #[value(name = "stdout32v")]
    Stdout32v,
    #[value(name = "stdout64v")]
    Stdout64v,
    #[value(name = "speed")]
    Speed,
    #[value(name = "selftest")]
    SelfTest,
}

impl BatteryKind {
    /// Whether this selection pins the dispatcher to a single thread,
    /// matching the `*_ser` variants' pass-through-over-the-same-machinery
    /// treatment (see SPEC_FULL.md §9 Open Questions).
    pub fn is_serial(self) -> bool {
        matches!(
            self,
            Self::SmallCrushSer | Self::CrushSer | Self::BigCrushSer | Self::PseudoDiehardSer
        )
    }

    pub fn is_stdout_sink(self) -> bool {
        matches!(self, Self::Stdout32 | Self::Stdout64 | Self::Stdout32v | Self::Stdout64v)
    }

    pub fn is_speed(self) -> bool {
        matches!(self, Self::Speed)
    }

    pub fn is_self_test(self) -> bool {
        matches!(self, Self::SelfTest)
    }
}

impl fmt::Display for BatteryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::SmallCrush => "SmallCrush",
            Self::Crush => "Crush",
            Self::BigCrush => "BigCrush",
            Self::PseudoDiehard => "pseudoDIEHARD",
            Self::SmallCrushSer => "SmallCrush_ser",
            Self::CrushSer => "Crush_ser",
            Self::BigCrushSer => "BigCrush_ser",
            Self::PseudoDiehardSer => "pseudoDIEHARD_ser",
            Self::Stdout32 => "stdout32",
            Self::Stdout64 => "stdout64",
            Self::Stdout32v => "stdout32v",
            Self::Stdout64v => "stdout64v",
            Self::Speed => "speed",
            Self::SelfTest => "selftest",
        };
        write!(f, "{name}")
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(value_enum, help = "Test battery (or mode) to run")]
    pub battery: BatteryKind,
    #[arg(help = "Path to a PRNG plug-in .so, or builtin:xoshiro256pp")]
    pub module: String,
    #[arg(help = "Run only this test id [default: whole battery]")]
    pub test_id: Option<i32>,
    #[arg(long, default_value = "", help = "Generator options string passed to the plug-in")]
    pub gen_options: String,
    #[arg(long, help = "Number of worker threads [default: one per core, halved to fit]")]
    pub threads: Option<usize>,
    #[arg(long, help = "Suspicious p-value band half-width [default: 0.001]")]
    pub eps: Option<f64>,
    #[arg(short, long, default_value = "report.txt", help = "Report/protocol output file")]
    pub output: String,
    #[arg(short, long, action = clap::ArgAction::Count,
        help = "Increase log verbosity (repeatable: warn, info, debug, trace)")]
    pub verbose: u8,
}

#[derive(Clone, Debug, Builder)]
#[builder(setter(into))]
pub struct RunSettings {
    pub battery: BatteryKind,
    pub module: String,
    #[builder(default)]
    pub test_id: Option<i32>,
    #[builder(default)]
    pub gen_options: String,
    #[builder(default)]
    pub threads: Option<usize>,
    #[builder(default = "DEFAULT_SUSPECT_EPS")]
    pub suspect_eps: f64,
    #[builder(default = "PathBuf::from(\"report.txt\")")]
    pub output_file: PathBuf,
    #[builder(default)]
    pub verbose: u8,
}

impl RunSettings {
    const MAX_THREAD_COUNT: usize = 1024;

    pub fn from_args(args: Args) -> Result<Self, RuntimeError> {
        let settings = Self {
            battery: args.battery,
            module: args.module,
            test_id: args.test_id,
            gen_options: args.gen_options,
            threads: args.threads.map(|t| cmp::min(cmp::max(t, 1), Self::MAX_THREAD_COUNT)),
            suspect_eps: args.eps.unwrap_or(DEFAULT_SUSPECT_EPS),
            output_file: PathBuf::from(args.output),
            verbose: args.verbose,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if let Some(id) = self.test_id {
            if id <= 0 {
                return Err(RuntimeError::InvalidTestId(id));
            }
        }
        if let Some(threads) = self.threads {
            if threads > Self::MAX_THREAD_COUNT {
                return Err(RuntimeError::RangeError(
                    format!("threads must be <= {}", Self::MAX_THREAD_COUNT)));
            }
        }
        Ok(())
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let settings = RunSettingsBuilder::default()
            .battery(BatteryKind::SmallCrush)
            .module("builtin:xoshiro256pp")
            .build()
            .unwrap();
        assert_eq!(settings.suspect_eps, DEFAULT_SUSPECT_EPS);
        assert_eq!(settings.output_file, PathBuf::from("report.txt"));
        assert_eq!(settings.test_id, None);
    }

    #[test]
    fn invalid_test_id_is_rejected() {
        let settings = RunSettingsBuilder::default()
            .battery(BatteryKind::SmallCrush)
            .module("builtin:xoshiro256pp")
            .test_id(Some(0))
            .build()
            .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn battery_kind_display_matches_cli_literal() {
        assert_eq!(BatteryKind::PseudoDiehard.to_string(), "pseudoDIEHARD");
        assert_eq!(BatteryKind::Stdout32v.to_string(), "stdout32v");
    }
}
