//! Report orchestration: groups registers into tables and frames the output.

use std::collections::BTreeMap;
use std::io::{self, Write};

use thiserror::Error;

use crate::backend::RegisterBackend;
use crate::error::{ErrorKind, RegisterError};
use crate::status::markup::{strip_sort_prefix, MarkupStyle};
use crate::status::matrix::{StatusMatrix, StatusMode};

const HEAD_COLOR: &str = "lightblue";
const CELL_COLOR: &str = "lightgreen";
const ERROR_COLOR: &str = "#FB412d";
const WARNING_COLOR: &str = "#FFFF00";
const NULL_COLOR: &str = "lightgrey";

/// Report settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReportConfig {
    /// Output format.
    pub mode: StatusMode,
    /// Row/column markup dialect.
    pub markup: MarkupStyle,
    /// Document title used by LaTeX output.
    pub title: String,
    /// Authors, most recent first.
    pub authors: Vec<String>,
    /// Software version printed in the trailer.
    pub version: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            mode: StatusMode::Text,
            markup: MarkupStyle::Positional,
            title: String::new(),
            authors: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Failure of a whole report cycle.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Register enumeration failed.
    #[error(transparent)]
    Register(#[from] RegisterError),
    /// Writing the output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Registers that failed during one report cycle, grouped by error kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSummary {
    failures: BTreeMap<ErrorKind, Vec<String>>,
}

impl ErrorSummary {
    /// Records a failed register.
    pub fn record(&mut self, kind: ErrorKind, register: impl Into<String>) {
        self.failures.entry(kind).or_default().push(register.into());
    }

    /// Returns `true` when no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Registers recorded under `kind`.
    #[must_use]
    pub fn registers(&self, kind: ErrorKind) -> &[String] {
        self.failures.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Iterates kinds with their failed registers.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, &[String])> {
        self.failures
            .iter()
            .map(|(kind, registers)| (*kind, registers.as_slice()))
    }

    /// Total number of failures.
    #[must_use]
    pub fn total(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }

    fn clear(&mut self) {
        self.failures.clear();
    }
}

/// Compares table names ignoring case and numeric sort prefixes.
#[must_use]
pub fn table_names_match(left: &str, right: &str) -> bool {
    strip_sort_prefix(left).eq_ignore_ascii_case(strip_sort_prefix(right))
}

/// Builds and renders every status table exposed by a backend.
///
/// Tables are keyed by their raw `Table` parameter so numeric sort prefixes
/// order the output. Tables and the error summary are rebuilt by every
/// [`StatusReport::process`] call.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    config: ReportConfig,
    tables: BTreeMap<String, StatusMatrix>,
    errors: ErrorSummary,
}

impl StatusReport {
    /// Creates a report with the given settings.
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Report settings.
    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Mutable report settings.
    pub fn config_mut(&mut self) -> &mut ReportConfig {
        &mut self.config
    }

    /// Failures recorded by the last [`StatusReport::process`].
    #[must_use]
    pub const fn errors(&self) -> &ErrorSummary {
        &self.errors
    }

    /// Rebuilds all tables from the backend.
    ///
    /// Registers without both `Status` and `Table` are skipped. With
    /// `single_table`, only registers of the matching table are added.
    /// Per-register failures are recorded in [`StatusReport::errors`] and do
    /// not stop processing.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot enumerate registers.
    pub fn process<B: RegisterBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        single_table: Option<&str>,
    ) -> Result<(), RegisterError> {
        self.tables.clear();
        self.errors.clear();

        for name in backend.enumerate_names("*")? {
            if let Err(err) = self.process_register(backend, &name, single_table) {
                tracing::warn!(register = %name, kind = %err.kind(), "{err}");
                self.errors.record(err.kind(), name);
            }
        }
        tracing::debug!(
            tables = self.tables.len(),
            errors = self.errors.total(),
            "status tables processed"
        );
        Ok(())
    }

    fn process_register<B: RegisterBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        single_table: Option<&str>,
    ) -> Result<(), RegisterError> {
        let Some(table) = backend.parameter(name, "Table")? else {
            return Ok(());
        };
        if backend.parameter(name, "Status")?.is_none() {
            tracing::debug!(register = %name, table = %table, "no Status, skipped");
            return Ok(());
        }
        if single_table.is_some_and(|wanted| !table_names_match(&table, wanted)) {
            return Ok(());
        }

        let style = self.config.markup;
        let matrix = self.tables.entry(table.clone()).or_insert_with(|| {
            tracing::debug!(table = %table, "new status table");
            StatusMatrix::new(style)
        });
        let result = matrix.add(name, backend);
        if matrix.cell_count() == 0 {
            self.tables.remove(&table);
        }
        result
    }

    /// Names of the tables built by the last cycle, in output order.
    #[must_use]
    pub fn table_list(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Looks up a table by its raw name, falling back to a comparison that
    /// ignores case and sort prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when no table matches.
    pub fn table(&self, name: &str) -> Result<&StatusMatrix, RegisterError> {
        self.tables
            .get(name)
            .or_else(|| {
                self.tables
                    .iter()
                    .find(|(key, _)| table_names_match(key, name))
                    .map(|(_, matrix)| matrix)
            })
            .ok_or_else(|| RegisterError::bad_value(format!("table {name} not found")))
    }

    /// Row names of a table.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when no table matches.
    pub fn table_rows(&self, name: &str) -> Result<Vec<String>, RegisterError> {
        self.table(name).map(StatusMatrix::rows)
    }

    /// Column names of a table.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when no table matches.
    pub fn table_columns(&self, name: &str) -> Result<Vec<String>, RegisterError> {
        self.table(name).map(StatusMatrix::columns)
    }

    /// Writes the document preamble for LaTeX and HTML modes.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_header<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match self.config.mode {
            StatusMode::Latex => {
                let title = format!("{} Documentation", self.config.title);
                writeln!(out, "\\documentclass[a4paper,10pt]{{article}}")?;
                writeln!(out, "\\usepackage[margin=0.5in]{{geometry}}")?;
                writeln!(out, "\\title{{{}}}", title.trim())?;
                writeln!(out, "\\author{{{}}}", self.config.authors.join(", "))?;
                writeln!(out, "\\begin{{document}}")?;
                writeln!(out, "\\maketitle")?;
                writeln!(out)
            }
            StatusMode::Html => writeln!(out, "<!DOCTYPE html><html><head><style>"),
            StatusMode::Text | StatusMode::BareHtml | StatusMode::Graphite => Ok(()),
        }
    }

    /// Writes the HTML style sheet (HTML mode only).
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_style<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        if self.config.mode != StatusMode::Html {
            return Ok(());
        }
        writeln!(out, "table {{ float: left; margin: 10px;}}")?;
        writeln!(out, "th {{ font-size: smaller; background-color:{HEAD_COLOR};}}")?;
        writeln!(out, "th.name {{font-size: 20px; }}")?;
        writeln!(
            out,
            "td {{ background-color:{NULL_COLOR}; text-align: right;}}"
        )?;
        writeln!(out, "td.nonerror {{ background-color:{CELL_COLOR};}}")?;
        writeln!(out, "td.warning {{ background-color:{WARNING_COLOR};}}")?;
        writeln!(out, "td.error {{ background-color:{ERROR_COLOR};}}")?;
        writeln!(
            out,
            "td.null {{ background-color:{NULL_COLOR};}} </style></head><body>"
        )
    }

    /// Renders every table built by the last cycle.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_body<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        timestamp: i64,
    ) -> io::Result<()> {
        for matrix in self.tables.values() {
            matrix.render_at(out, level, self.config.mode, timestamp)?;
        }
        Ok(())
    }

    /// Writes the error summary (text mode only).
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_exceptions<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        if self.config.mode != StatusMode::Text {
            return Ok(());
        }
        writeln!(out, "=============")?;
        writeln!(out, "ERROR SUMMARY")?;
        writeln!(out, "=============")?;
        writeln!(out)?;
        if self.errors.is_empty() {
            return writeln!(out, "No errors are caught!");
        }
        for (kind, registers) in self.errors.iter() {
            writeln!(out, "Error type: {kind}, # of errors: {}", registers.len())?;
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes the document trailer with the software version.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write_trailer<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let version = &self.config.version;
        match self.config.mode {
            StatusMode::Latex => {
                writeln!(out, "\\section{{Version}}")?;
                writeln!(out, "Using SW version: {version}.")?;
                writeln!(out, "\\end{{document}}")
            }
            StatusMode::Html => {
                writeln!(out, "<table><tr><td>SW:</td><td>{version}</td></tr></table>")?;
                writeln!(out, "</body></html>")
            }
            StatusMode::Text => writeln!(out, "SW VER: {version}"),
            StatusMode::BareHtml | StatusMode::Graphite => Ok(()),
        }
    }

    /// Runs a full cycle: process, then header, style, tables, error summary
    /// and trailer.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when enumeration or writing fails.
    pub fn report<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
        &mut self,
        backend: &mut B,
        out: &mut W,
        level: u32,
        single_table: Option<&str>,
    ) -> Result<(), ReportError> {
        self.report_at(
            backend,
            out,
            level,
            single_table,
            chrono::Utc::now().timestamp(),
        )
    }

    /// [`StatusReport::report`] with an explicit Graphite timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when enumeration or writing fails.
    pub fn report_at<B: RegisterBackend + ?Sized, W: Write + ?Sized>(
        &mut self,
        backend: &mut B,
        out: &mut W,
        level: u32,
        single_table: Option<&str>,
        timestamp: i64,
    ) -> Result<(), ReportError> {
        self.process(backend, single_table)?;
        self.write_header(out)?;
        self.write_style(out)?;
        self.write_body(out, level, timestamp)?;
        self.write_exceptions(out)?;
        self.write_trailer(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{table_names_match, ErrorSummary, ReportConfig, StatusReport};
    use crate::error::ErrorKind;
    use crate::status::matrix::StatusMode;

    #[test]
    fn table_names_ignore_prefix_and_case() {
        assert!(table_names_match("3_POWER", "power"));
        assert!(table_names_match("POWER", "12_Power"));
        assert!(!table_names_match("POWER", "CLOCKS"));
    }

    #[test]
    fn error_summary_groups_by_kind() {
        let mut summary = ErrorSummary::default();
        summary.record(ErrorKind::BusError, "A");
        summary.record(ErrorKind::BusError, "B");
        summary.record(ErrorKind::BadValue, "C");
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.registers(ErrorKind::BusError), ["A", "B"]);
        assert!(summary.registers(ErrorKind::BadMarkupName).is_empty());
    }

    #[test]
    fn text_framing_reports_empty_summary_and_version() {
        let report = StatusReport::new(ReportConfig {
            version: "1.2.3".to_string(),
            ..ReportConfig::default()
        });
        let mut out = Vec::new();
        report.write_header(&mut out).unwrap();
        report.write_exceptions(&mut out).unwrap();
        report.write_trailer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ERROR SUMMARY"));
        assert!(text.contains("No errors are caught!"));
        assert!(text.ends_with("SW VER: 1.2.3\n"));
    }

    #[test]
    fn bare_html_has_no_document_framing() {
        let report = StatusReport::new(ReportConfig {
            mode: StatusMode::BareHtml,
            ..ReportConfig::default()
        });
        let mut out = Vec::new();
        report.write_header(&mut out).unwrap();
        report.write_style(&mut out).unwrap();
        report.write_exceptions(&mut out).unwrap();
        report.write_trailer(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn latex_framing_names_title_and_authors() {
        let report = StatusReport::new(ReportConfig {
            mode: StatusMode::Latex,
            title: "Board".to_string(),
            authors: vec!["B. Author".to_string(), "A. Author".to_string()],
            ..ReportConfig::default()
        });
        let mut out = Vec::new();
        report.write_header(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\\title{Board Documentation}"));
        assert!(text.contains("\\author{B. Author, A. Author}"));
    }
}
