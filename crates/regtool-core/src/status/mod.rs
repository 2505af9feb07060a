//! Status tables: cells, name markup, table layout and report framing.

/// Single table cell built from one or two registers.
pub mod cell;
pub use cell::{CellSettings, DisplayRule, StatusCell, DEFAULT_CELL_FORMAT, MAX_FILLS};

/// Row, column and table name derivation.
pub mod markup;
pub use markup::{build_name, strip_pair_suffix, strip_sort_prefix, MarkupStyle};

/// Named table of cells and its renderers.
pub mod matrix;
pub use matrix::{escape_html, StatusMatrix, StatusMode, FORCE_DISPLAY_LEVEL, MIN_HEADER_WIDTH};

/// Report orchestration across all tables.
pub mod report;
pub use report::{table_names_match, ErrorSummary, ReportConfig, ReportError, StatusReport};
