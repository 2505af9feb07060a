//! A named status table: cells indexed by row and column, plus renderers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::backend::RegisterBackend;
use crate::convert::{contiguous_bit_count, resolve_pair, split_pair_name, PairHalf};
use crate::error::RegisterError;
use crate::status::cell::{CellSettings, StatusCell, MAX_FILLS};
use crate::status::markup::{build_name, strip_pair_suffix, strip_sort_prefix, MarkupStyle};

/// Report level at or above which every cell is forced visible.
pub const FORCE_DISPLAY_LEVEL: u32 = 99;

/// Minimum width of the row-name column in text output.
pub const MIN_HEADER_WIDTH: usize = 16;

/// Output format of a rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum StatusMode {
    /// Fixed-width text grid.
    #[default]
    Text,
    /// HTML tables inside a styled document.
    Html,
    /// HTML tables without document framing.
    BareHtml,
    /// LaTeX documentation of register placement.
    Latex,
    /// Graphite plaintext protocol lines.
    Graphite,
}

impl StatusMode {
    /// Returns the lowercase mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::BareHtml => "bare-html",
            Self::Latex => "latex",
            Self::Graphite => "graphite",
        }
    }
}

impl fmt::Display for StatusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusMode {
    type Err = RegisterError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            "bare-html" | "barehtml" => Ok(Self::BareHtml),
            "latex" => Ok(Self::Latex),
            "graphite" => Ok(Self::Graphite),
            other => Err(RegisterError::bad_value(format!("unknown status mode {other}"))),
        }
    }
}

/// Cells of one table.
///
/// Cells live in an arena; `row_col` and `col_row` hold indices into it, so
/// both maps always name the same cell for a given (row, column).
#[derive(Debug, Clone, Default)]
pub struct StatusMatrix {
    name: String,
    style: MarkupStyle,
    cells: Vec<StatusCell>,
    by_register: HashMap<String, usize>,
    row_col: BTreeMap<String, BTreeMap<String, usize>>,
    col_row: BTreeMap<String, BTreeMap<String, usize>>,
}

/// Visibility computed for one render pass.
struct Layout<'a> {
    force: bool,
    header_width: usize,
    columns: Vec<(&'a str, usize)>,
    rows: BTreeSet<&'a str>,
}

impl StatusMatrix {
    /// Creates an empty, unnamed table.
    #[must_use]
    pub fn new(style: MarkupStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Canonical table name (sort prefix removed); empty until the first add.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Adds a register to the table.
    ///
    /// `_LO`/`_HI` registers are merged into one cell named after their base.
    /// The table is unchanged when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] for a missing or mismatched
    /// `Table`, a missing `Row`/`Column`, inconsistent cell configuration or
    /// an occupied position; [`RegisterError::BadMarkupName`] for invalid
    /// markup; and propagates backend failures such as
    /// [`RegisterError::BusError`].
    pub fn add<B: RegisterBackend + ?Sized>(
        &mut self,
        register: &str,
        backend: &mut B,
    ) -> Result<(), RegisterError> {
        let table = backend.require_parameter(register, "Table")?;
        let table = build_name(&table, register, "Table", self.style)?;
        let table = strip_sort_prefix(&table);
        if table.is_empty() {
            return Err(RegisterError::bad_value(format!(
                "register {register} has an empty table name"
            )));
        }
        if !self.name.is_empty() && !self.name.eq_ignore_ascii_case(table) {
            return Err(RegisterError::bad_value(format!(
                "tried adding entry of table {table} to table {}",
                self.name
            )));
        }

        let row = self.placement(backend, register, "Row")?;
        let col = self.placement(backend, register, "Column")?;

        let (base, half, shift, partner) = match resolve_pair(backend, register) {
            Some((lo, hi)) => {
                let (base, half) = split_pair_name(register)
                    .ok_or_else(|| RegisterError::bad_reg_name(register))?;
                let width = contiguous_bit_count(backend.mask(&lo)?);
                let (shift, partner) = match half {
                    PairHalf::Lo if !is_status_entry(backend, &hi)? => (0, Some((hi, width))),
                    PairHalf::Lo => (0, None),
                    PairHalf::Hi => (width, None),
                };
                (base.to_string(), Some(half), shift, partner)
            }
            None => (register.to_string(), None, 0, None),
        };

        let settings = CellSettings::from_backend(backend, register)?;
        let word = if settings.status_level != 0 && settings.readable {
            Some(backend.read_name(register)?)
        } else {
            None
        };
        // An untagged high half is read together with its low half.
        let partner_word = match (word, partner) {
            (Some(_), Some((hi, width))) => Some((backend.read_name(&hi)?, width)),
            _ => None,
        };
        let incoming = usize::from(word.is_some()) + usize::from(partner_word.is_some());

        let existing = self.by_register.get(&base).copied();
        if let Some(index) = self.row_col.get(&row).and_then(|cols| cols.get(&col)) {
            if Some(*index) != existing {
                return Err(RegisterError::bad_value(format!(
                    "cell ({row}, {col}) of table {table} already holds {}",
                    self.cells[*index].address()
                )));
            }
        }
        if let Some(index) = existing {
            if self.cells[index].fill_count() + incoming > MAX_FILLS {
                return Err(RegisterError::bad_value(format!(
                    "cell {base} already holds {MAX_FILLS} words"
                )));
            }
        }

        let index = match existing {
            Some(index) => {
                self.cells[index].setup(&base, &row, &col, settings, half)?;
                index
            }
            None => {
                let mut cell = StatusCell::default();
                cell.setup(&base, &row, &col, settings, half)?;
                self.cells.push(cell);
                let index = self.cells.len() - 1;
                self.by_register.insert(base, index);
                index
            }
        };
        if let Some(word) = word {
            self.cells[index].fill(word, shift)?;
        }
        if let Some((word, width)) = partner_word {
            self.cells[index].fill(word, width)?;
        }

        if self.name.is_empty() {
            self.name = table.to_string();
        }
        self.row_col
            .entry(row.clone())
            .or_default()
            .insert(col.clone(), index);
        self.col_row.entry(col).or_default().insert(row, index);
        Ok(())
    }

    /// Derives a row or column name from the register's markup parameter.
    fn placement<B: RegisterBackend + ?Sized>(
        &self,
        backend: &B,
        register: &str,
        parameter: &str,
    ) -> Result<String, RegisterError> {
        let markup = backend.parameter(register, parameter)?.ok_or_else(|| {
            RegisterError::bad_value(format!("missing {parameter} for {register}"))
        })?;
        let name = build_name(&markup.to_uppercase(), register, parameter, self.style)?;
        Ok(strip_pair_suffix(&name).to_string())
    }

    /// Row names in sorted order.
    #[must_use]
    pub fn rows(&self) -> Vec<String> {
        self.row_col.keys().cloned().collect()
    }

    /// Column names in sorted order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.col_row.keys().cloned().collect()
    }

    /// Returns the cell at (`row`, `col`).
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::BadValue`] when no cell occupies the position.
    pub fn cell(&self, row: &str, col: &str) -> Result<&StatusCell, RegisterError> {
        self.row_col
            .get(row)
            .and_then(|cols| cols.get(col))
            .map(|index| &self.cells[*index])
            .ok_or_else(|| {
                RegisterError::bad_value(format!("no cell in (\"{row}\",\"{col}\") position"))
            })
    }

    fn layout(&self, level: u32) -> Option<Layout<'_>> {
        let force = level >= FORCE_DISPLAY_LEVEL;
        let mut printable = false;
        let mut shown = BTreeSet::new();
        let mut killed = BTreeSet::new();
        let mut columns = Vec::with_capacity(self.col_row.len());

        for (col, rows) in &self.col_row {
            let mut width = 0;
            for (row, index) in rows {
                let cell = &self.cells[*index];
                if cell.display(level, force) {
                    printable = true;
                    shown.insert(row.as_str());
                    width = width.max(cell.print(None).len());
                }
                if cell.suppress_row(force) {
                    killed.insert(row.as_str());
                }
            }
            columns.push((col.as_str(), width));
        }

        if !printable {
            return None;
        }
        let rows: BTreeSet<&str> = shown.difference(&killed).copied().collect();
        let header_width = rows
            .iter()
            .map(|row| row.len())
            .chain([MIN_HEADER_WIDTH, self.name.len()])
            .max()
            .unwrap_or(MIN_HEADER_WIDTH);
        Some(Layout {
            force,
            header_width,
            columns,
            rows,
        })
    }

    fn shown_cell(&self, row: &str, col: &str, level: u32, force: bool) -> Option<&StatusCell> {
        self.cell(row, col)
            .ok()
            .filter(|cell| cell.display(level, force))
    }

    /// Renders the table at report `level`, stamping Graphite lines with the
    /// current time. Nothing is written when no cell is visible.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn render<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        mode: StatusMode,
    ) -> io::Result<()> {
        self.render_at(out, level, mode, chrono::Utc::now().timestamp())
    }

    /// Renders the table with an explicit Unix timestamp for Graphite lines.
    ///
    /// # Errors
    ///
    /// Propagates write failures.
    pub fn render_at<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        mode: StatusMode,
        timestamp: i64,
    ) -> io::Result<()> {
        let Some(layout) = self.layout(level) else {
            return Ok(());
        };
        match mode {
            StatusMode::Text => self.print_text(out, level, &layout),
            StatusMode::Html | StatusMode::BareHtml => self.print_html(out, level, &layout),
            StatusMode::Latex => self.print_latex(out),
            StatusMode::Graphite => self.print_graphite(out, level, &layout, timestamp),
        }
    }

    fn print_text<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        layout: &Layout<'_>,
    ) -> io::Result<()> {
        let header = layout.header_width;
        let visible = || layout.columns.iter().filter(|(_, width)| *width > 0);

        write!(out, "{:>w$}|", self.name, w = header + 1)?;
        for (col, width) in visible() {
            write!(out, "{:>w$}|", col, w = (*width).max(col.len()) + 1)?;
        }
        writeln!(out)?;
        write!(out, "{:>w$}", "--|", w = header + 2)?;
        for (col, width) in visible() {
            write!(out, "{}|", "-".repeat((*width).max(col.len()) + 1))?;
        }
        writeln!(out)?;

        for row in &layout.rows {
            write!(out, "{:>w$}|", row, w = header + 1)?;
            for (col, width) in visible() {
                let span = (*width).max(col.len());
                match self.shown_cell(row, col, level, layout.force) {
                    Some(cell) => write!(out, "{:>w$}|", cell.print(Some(*width)), w = span + 1)?,
                    None => write!(out, "{:>w$}", " |", w = span + 2)?,
                }
            }
            writeln!(out)?;
        }
        writeln!(out)
    }

    fn print_html<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        layout: &Layout<'_>,
    ) -> io::Result<()> {
        let visible = || layout.columns.iter().filter(|(_, width)| *width > 0);

        write!(
            out,
            "<table border=\"1\" ><tr><th class=\"name\">{}</th>",
            escape_html(&self.name)
        )?;
        for (col, _) in visible() {
            write!(out, "<th>{}</th>", escape_html(col))?;
        }
        writeln!(out, "</tr>")?;

        for row in &layout.rows {
            write!(out, "<tr><th>{}</th>", escape_html(row))?;
            for (col, width) in visible() {
                let Ok(cell) = self.cell(row, col) else {
                    write!(out, "<td> </td>")?;
                    continue;
                };
                let title = escape_html(cell.description());
                if cell.display(level, layout.force) {
                    let value = cell.print(Some(*width));
                    write!(
                        out,
                        "<td title=\"{title}\" class=\"{}\">{}</td>",
                        html_class(cell.description(), &value),
                        escape_html(&value)
                    )?;
                } else {
                    write!(out, "<td title=\"{title}\"> </td>")?;
                }
            }
            writeln!(out, "</tr>")?;
        }
        writeln!(out, "</table>")
    }

    fn print_latex<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let title = self.name.replace('_', " ");
        let columns: Vec<&str> = self.col_row.keys().map(String::as_str).collect();

        writeln!(out, "\\section{{{title}}}")?;
        writeln!(out, "\\begin{{center}}")?;
        writeln!(out, "\\begin{{tabular}}{{{}|l|}}", "|l".repeat(columns.len()))?;
        writeln!(out, "\\hline")?;
        write!(out, "{title}")?;
        for col in &columns {
            write!(out, " & {}", col.replace('_', " "))?;
        }
        writeln!(out, " \\\\")?;
        writeln!(out, "\\hline")?;

        for (row, cols) in &self.row_col {
            write!(out, "{}", row.replace('_', " "))?;
            for col in &columns {
                match cols.get(*col).map(|index| &self.cells[*index]) {
                    Some(cell) => {
                        let leaf = cell
                            .address()
                            .rsplit('.')
                            .next()
                            .unwrap_or_default()
                            .replace('_', " ");
                        write!(out, " & 0x{:x}/{leaf}", cell.mask())?;
                    }
                    None => write!(out, " & / ")?,
                }
            }
            writeln!(out, "\\\\")?;
            writeln!(out, "\\hline")?;
        }
        writeln!(out, "\\end{{tabular}}")?;
        writeln!(out, "\\end{{center}}")?;
        writeln!(out)
    }

    fn print_graphite<W: Write + ?Sized>(
        &self,
        out: &mut W,
        level: u32,
        layout: &Layout<'_>,
        timestamp: i64,
    ) -> io::Result<()> {
        for row in &layout.rows {
            for (col, _) in layout.columns.iter().filter(|(_, width)| *width > 0) {
                let Some(cell) = self.shown_cell(row, col, level, layout.force) else {
                    continue;
                };
                let path = format!(
                    "{}.{}.{}",
                    self.name,
                    row.replace(' ', "_"),
                    col.replace(' ', "_")
                );
                let value = cell.print(None);
                if is_hex_number(&value) {
                    writeln!(out, "{path} {value} {timestamp}")?;
                } else {
                    writeln!(out, "{path}.{value} 1 {timestamp}")?;
                }
            }
        }
        Ok(())
    }
}

/// Whether the report adds `register` by itself (it has `Status` and `Table`).
fn is_status_entry<B: RegisterBackend + ?Sized>(
    backend: &B,
    register: &str,
) -> Result<bool, RegisterError> {
    Ok(backend.parameter(register, "Status")?.is_some()
        && backend.parameter(register, "Table")?.is_some())
}

fn html_class(description: &str, value: &str) -> &'static str {
    if value == "0" {
        "null"
    } else if description.contains("error") {
        "error"
    } else if description.contains("warning") {
        "warning"
    } else {
        "nonerror"
    }
}

fn is_hex_number(value: &str) -> bool {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Escapes text for HTML element and attribute content.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_html, html_class, is_hex_number, StatusMatrix, StatusMode};
    use crate::backend::{MemoryBackend, RegisterDescriptor, RegisterNameCase};
    use crate::error::ErrorKind;
    use crate::status::markup::MarkupStyle;

    fn placed(name: &str, address: u32, row: &str, col: &str) -> RegisterDescriptor {
        RegisterDescriptor::new(name, address)
            .with_parameter("Table", "T")
            .with_parameter("Row", row)
            .with_parameter("Column", col)
            .with_parameter("Status", "1")
    }

    #[test]
    fn second_register_cannot_take_an_occupied_position() {
        let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
        backend.insert(placed("A", 0, "R", "C")).unwrap();
        backend.insert(placed("B", 1, "R", "C")).unwrap();

        let mut matrix = StatusMatrix::new(MarkupStyle::Positional);
        matrix.add("A", &mut backend).unwrap();
        let err = matrix.add("B", &mut backend).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
        assert_eq!(matrix.cell("R", "C").unwrap().address(), "A");
    }

    #[test]
    fn same_register_twice_overfills_its_cell() {
        let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
        backend.insert(placed("A", 0, "R", "C")).unwrap();

        let mut matrix = StatusMatrix::new(MarkupStyle::Positional);
        matrix.add("A", &mut backend).unwrap();
        matrix.add("A", &mut backend).unwrap();
        let err = matrix.add("A", &mut backend).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
        assert_eq!(matrix.cell("R", "C").unwrap().fill_count(), 2);
    }

    #[test]
    fn missing_placement_and_empty_positions_are_bad_values() {
        let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
        backend
            .insert(RegisterDescriptor::new("A", 0).with_parameter("Table", "T"))
            .unwrap();
        backend.insert(placed("B", 1, "R", "C")).unwrap();

        let mut matrix = StatusMatrix::new(MarkupStyle::Positional);
        let err = matrix.add("A", &mut backend).unwrap_err();
        assert_eq!(err.to_string(), "bad value: missing Row for A");
        matrix.add("B", &mut backend).unwrap();
        assert_eq!(matrix.name(), "T");
        assert_eq!(matrix.rows(), ["R"]);
        assert_eq!(matrix.columns(), ["C"]);
        let err = matrix.cell("R", "D").unwrap_err();
        assert_eq!(err.to_string(), "bad value: no cell in (\"R\",\"D\") position");
    }

    #[test]
    fn text_grid_pads_to_column_width() {
        let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
        backend.insert(placed("A", 0, "R", "COUNT")).unwrap();
        backend.poke(0, 0x5);

        let mut matrix = StatusMatrix::new(MarkupStyle::Positional);
        matrix.add("A", &mut backend).unwrap();
        let mut out = Vec::new();
        matrix.render_at(&mut out, 1, StatusMode::Text, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!(
            "{:>17}|{:>6}|\n{:>18}{}|\n{:>17}|{:>6}|\n\n",
            "T", "COUNT", "--|", "-".repeat(6), "R", "5"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn modes_parse_ignoring_case() {
        assert_eq!("HTML".parse::<StatusMode>().unwrap(), StatusMode::Html);
        assert_eq!("bare-html".parse::<StatusMode>().unwrap(), StatusMode::BareHtml);
        assert_eq!("BAREHTML".parse::<StatusMode>().unwrap(), StatusMode::BareHtml);
        assert_eq!(
            "pdf".parse::<StatusMode>().unwrap_err().kind(),
            ErrorKind::BadValue
        );
        assert_eq!(StatusMode::Latex.to_string(), "latex");
    }

    #[test]
    fn html_class_prefers_null_then_description() {
        assert_eq!(html_class("error counter", "0"), "null");
        assert_eq!(html_class("error counter", "0x3"), "error");
        assert_eq!(html_class("link warning", "1"), "warning");
        assert_eq!(html_class("temperature", "25"), "nonerror");
    }

    #[test]
    fn graphite_value_check_accepts_bare_and_prefixed_hex() {
        assert!(is_hex_number("0x1F"));
        assert!(is_hex_number("136756"));
        assert!(!is_hex_number("ON (0x1)"));
        assert!(!is_hex_number("-2"));
        assert!(!is_hex_number("1.00"));
        assert!(!is_hex_number(""));
        assert!(!is_hex_number("0x"));
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("a<b & \"c\">"), "a&lt;b &amp; &quot;c&quot;&gt;");
    }
}
