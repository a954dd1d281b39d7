//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying the import
//! preview, progress and report in text, YAML or JSON.

use colored::Colorize;
use std::io::Write;
use tabled::{Table, Tabled};

use crate::error::{KpError, Result};
use crate::importer::{ImportReport, ImportReporter};
use crate::planner::Preview;
use crate::secret::SecretKind;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
    /// Whether diff lines are colored.
    color: bool,
}

/// Applied object row for table display.
#[derive(Tabled)]
struct AppliedRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self {
            format,
            color: false,
        }
    }

    /// Enables or disables colored diff lines.
    #[must_use]
    pub const fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Returns the selected format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats the import preview.
    #[must_use]
    pub fn format_preview(&self, preview: &Preview) -> String {
        let text = preview.to_string();
        if !self.color {
            return text;
        }

        let mut output = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let (content, newline) = line
                .strip_suffix('\n')
                .map_or((line, ""), |content| (content, "\n"));
            if content.starts_with("+ ") {
                output.push_str(&content.green().to_string());
                output.push_str(newline);
            } else if content.starts_with("- ") {
                output.push_str(&content.red().to_string());
                output.push_str(newline);
            } else {
                output.push_str(line);
            }
        }
        output
    }

    /// Formats the import report.
    ///
    /// # Errors
    ///
    /// Returns an error if an object cannot be serialized.
    pub fn format_report(&self, report: &ImportReport) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(Self::format_report_text(report)),
            OutputFormat::Yaml => {
                let mut output = String::new();
                for object in &report.applied {
                    output.push_str("---\n");
                    output.push_str(
                        &serde_yaml::to_string(&object.manifest)
                            .map_err(|e| KpError::internal(format!("failed to render YAML: {e}")))?,
                    );
                }
                Ok(output)
            }
            OutputFormat::Json => {
                let objects: Vec<&serde_json::Value> =
                    report.applied.iter().map(|o| &o.manifest).collect();
                let mut output = serde_json::to_string_pretty(&objects)
                    .map_err(|e| KpError::internal(format!("failed to render JSON: {e}")))?;
                output.push('\n');
                Ok(output)
            }
        }
    }

    fn format_report_text(report: &ImportReport) -> String {
        let mut output = String::new();

        if !report.applied.is_empty() {
            let rows: Vec<AppliedRow> = report
                .applied
                .iter()
                .map(|o| AppliedRow {
                    kind: o.kind.to_string(),
                    name: o.name.clone(),
                    action: o.action.to_string(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output.push_str("Imported resources");
        if report.dry_run {
            output.push_str(" (dry run)");
        }
        output.push('\n');
        output
    }

    /// Formats the selected secret kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind cannot be serialized.
    pub fn format_secret(&self, kind: &SecretKind) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(format!("Secret kind: {kind}\n")),
            OutputFormat::Yaml => serde_yaml::to_string(kind)
                .map_err(|e| KpError::internal(format!("failed to render YAML: {e}"))),
            OutputFormat::Json => serde_json::to_string_pretty(kind)
                .map(|s| s + "\n")
                .map_err(|e| KpError::internal(format!("failed to render JSON: {e}"))),
        }
    }
}

/// Reporter writing an import to the terminal.
///
/// In text mode the preview and progress go to `out`. In YAML and JSON mode
/// `out` carries only the report: the preview goes to `err` and progress is
/// dropped.
#[derive(Debug)]
pub struct ConsoleReporter<O, E> {
    formatter: OutputFormatter,
    out: O,
    err: E,
}

impl<O: Write, E: Write> ConsoleReporter<O, E> {
    /// Creates a reporter over the given streams.
    pub const fn new(formatter: OutputFormatter, out: O, err: E) -> Self {
        Self {
            formatter,
            out,
            err,
        }
    }

    /// Writes the final report to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be rendered or written.
    pub fn report(&mut self, report: &ImportReport) -> Result<()> {
        let text = self.formatter.format_report(report)?;
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    const fn is_text(&self) -> bool {
        matches!(self.formatter.format, OutputFormat::Text)
    }
}

impl<O: Write, E: Write> ImportReporter for ConsoleReporter<O, E> {
    fn preview(&mut self, preview: &Preview) -> Result<()> {
        let text = self.formatter.format_preview(preview);
        if self.is_text() {
            writeln!(self.out, "{text}")?;
            self.out.flush()?;
        } else {
            writeln!(self.err, "{text}")?;
        }
        Ok(())
    }

    fn progress(&mut self, line: &str) -> Result<()> {
        if self.is_text() {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn notice(&mut self, line: &str) -> Result<()> {
        if self.is_text() {
            writeln!(self.out, "{line}")?;
        } else {
            writeln!(self.err, "{line}")?;
        }
        Ok(())
    }
}
