//! Line-oriented progress on stderr.

use std::io::{Write, stderr};

use apkroot_core::{Reporter, ScriptKind};
use apkroot_schema::{PackageName, Version};
use crossterm::style::Stylize;

use super::theme::{Icons, format_size};

/// Prints one line per event to stderr. In quiet mode only warnings and
/// failures are printed.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    icons: Icons,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            icons: Icons::default(),
            quiet,
        }
    }

    fn package_line(&self, icon: &str, name: &PackageName, version: &Version, status: &str) {
        if self.quiet {
            return;
        }
        line(&format!(
            "  {icon} {} {} {status}",
            format!("{:<28}", name.as_str()).cyan(),
            format!("{:<16}", version.as_str()).dark_grey(),
        ));
    }
}

fn line(text: &str) {
    let mut err = stderr().lock();
    let _ = writeln!(err, "{text}");
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            line(&title.bold().to_string());
        }
    }

    fn fetching(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        if current == 0 {
            let size = total.map(format_size).unwrap_or_default();
            self.package_line(self.icons.pending, name, version, &format!("fetching {size}"));
        }
    }

    fn unpacking(&self, _name: &PackageName, _version: &Version) {}

    fn installing(&self, name: &PackageName, version: &Version) {
        self.package_line(self.icons.active, name, version, "installing");
    }

    fn script(&self, name: &PackageName, version: &Version, kind: ScriptKind) {
        self.package_line(self.icons.active, name, version, &format!("running {kind}"));
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>) {
        let size = size.map(|s| format!(" ({})", format_size(s))).unwrap_or_default();
        self.package_line(
            &self.icons.success.green().to_string(),
            name,
            version,
            &format!("{detail}{size}"),
        );
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        line(&format!(
            "  {} {} {} {}",
            self.icons.error.red(),
            name.as_str().cyan(),
            version.as_str().dark_grey(),
            reason.red()
        ));
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            line(&format!("{} {msg}", self.icons.info.dark_grey()));
        }
    }

    fn warning(&self, msg: &str) {
        line(&format!("{} {}", self.icons.warning.yellow(), msg.yellow()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        if !self.quiet {
            line(&format!(
                "{} {count} packages {action} in {elapsed_secs:.1}s",
                self.icons.success.green()
            ));
        }
    }
}
