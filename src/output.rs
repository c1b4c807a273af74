//! Terminal styling for user-facing output
//!
//! Logs go through `tracing` to stderr; everything here goes to stdout.

use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

use crate::sync::{MirrorReport, MirrorStats};

const INPUT: Color = Color::Rgb {
    r: 0x89,
    g: 0xC7,
    b: 0x13,
};
const INFO: Color = Color::Rgb {
    r: 0x13,
    g: 0x89,
    b: 0xC7,
};
const WARN: Color = Color::Rgb {
    r: 0xff,
    g: 0x00,
    b: 0x66,
};

/// Colors for prompts, information and warnings
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn input(&self, text: &str) -> String {
        self.paint(text, INPUT)
    }

    pub fn info(&self, text: &str) -> String {
        self.paint(text, INFO)
    }

    pub fn warn(&self, text: &str) -> String {
        self.paint(text, WARN)
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn print_stats(&self, stats: &MirrorStats, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", self.info("========= Stats ========="))?;
        for (key, value) in stats.entries() {
            writeln!(out, "{}: {}", self.input(key), self.info(&value.to_string()))?;
        }
        Ok(())
    }

    /// Stats, then one line per failed repository
    pub fn print_report(&self, report: &MirrorReport, out: &mut impl Write) -> io::Result<()> {
        self.print_stats(&report.stats, out)?;

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            writeln!(out, "{}", self.warn("Failed repositories:"))?;
            for outcome in failures {
                writeln!(
                    out,
                    "  {} ({}): {}",
                    outcome.repository(),
                    outcome.path().display(),
                    outcome.error().unwrap_or_default()
                )?;
            }
        }
        Ok(())
    }
}
