//! End-to-end status report coverage over the in-memory backend.

#![allow(clippy::pedantic, clippy::nursery)]

use chrono as _;
use globset as _;
use proptest as _;
use regtool_core::{
    read_convert, ConvertedValue, ErrorKind, MarkupStyle, MemoryBackend, RegisterDescriptor,
    RegisterNameCase, ReportConfig, StatusMatrix, StatusMode, StatusReport,
};
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

fn status_register(
    name: &str,
    address: u32,
    table: &str,
    row: &str,
    column: &str,
) -> RegisterDescriptor {
    RegisterDescriptor::new(name, address)
        .with_parameter("Table", table)
        .with_parameter("Row", row)
        .with_parameter("Column", column)
        .with_parameter("Status", "1")
}

fn temperature_board() -> MemoryBackend {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    for (name, address) in [("TEMP_LO", 0x10), ("TEMP_HI", 0x14)] {
        backend
            .insert(
                status_register(name, address, "BOARD1", "__0", "VALUE")
                    .with_mask(0xFFFF)
                    .with_parameter("Format", "u"),
            )
            .unwrap();
    }
    backend.poke(0x10, 0x1234);
    backend.poke(0x14, 0x0002);
    backend
}

fn render(report: &mut StatusReport, backend: &mut MemoryBackend, level: u32) -> String {
    let mut out = Vec::new();
    report
        .report_at(backend, &mut out, level, None, 1_700_000_000)
        .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn merged_pair_fills_one_cell() {
    let mut backend = temperature_board();
    assert_eq!(
        read_convert(&mut backend, "TEMP_LO").unwrap(),
        ConvertedValue::Unsigned(0x2_1234)
    );

    let mut report = StatusReport::new(ReportConfig::default());
    let text = render(&mut report, &mut backend, 1);

    assert_eq!(report.table_list(), ["BOARD1"]);
    assert_eq!(report.table_rows("BOARD1").unwrap(), ["TEMP"]);
    assert_eq!(report.table_columns("board1").unwrap(), ["VALUE"]);
    let cell = report.table("BOARD1").unwrap().cell("TEMP", "VALUE").unwrap();
    assert_eq!(cell.address(), "TEMP");
    assert_eq!(cell.fill_count(), 2);
    assert_eq!(cell.print(None), "135732");
    assert!(text.contains(&format!("{:>17}|{:>7}|", "TEMP", "135732")));
    assert!(text.contains("No errors are caught!"));
}

#[test]
fn sensor_pair_with_literal_placement() {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    for (name, address, word) in [("TEMP_LO", 0x0, 0x1234), ("TEMP_HI", 0x1, 0x0002)] {
        backend
            .insert(
                status_register(name, address, "SENSORS", "BOARD1", "TEMP")
                    .with_mask(0x0000_FFFF)
                    .with_parameter("Format", "u"),
            )
            .unwrap();
        backend.poke(address, word);
    }

    let mut report = StatusReport::new(ReportConfig::default());
    render(&mut report, &mut backend, 1);
    let cell = report.table("SENSORS").unwrap().cell("BOARD1", "TEMP").unwrap();
    assert_eq!(cell.raw_value(), 0x2_1234);
    assert_eq!(cell.value(), Some(ConvertedValue::Unsigned(135_732)));
}

#[test]
fn untagged_high_half_is_merged_by_the_low_half() {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    backend
        .insert(
            status_register("TEMP_LO", 0x10, "BOARD1", "__0", "VALUE")
                .with_mask(0xFFFF)
                .with_parameter("Format", "u"),
        )
        .unwrap();
    backend
        .insert(RegisterDescriptor::new("TEMP_HI", 0x14).with_mask(0xFFFF))
        .unwrap();
    backend.poke(0x10, 0x1234);
    backend.poke(0x14, 0x0002);

    assert_eq!(
        read_convert(&mut backend, "TEMP_LO").unwrap(),
        ConvertedValue::Unsigned(135_732)
    );
    let mut report = StatusReport::new(ReportConfig::default());
    let text = render(&mut report, &mut backend, 1);

    assert!(report.errors().is_empty());
    let cell = report.table("BOARD1").unwrap().cell("TEMP", "VALUE").unwrap();
    assert_eq!(cell.fill_count(), 2);
    assert_eq!(cell.value(), Some(ConvertedValue::Unsigned(135_732)));
    assert!(text.contains(&format!("{:>17}|{:>7}|", "TEMP", "135732")));
}

#[test]
fn level_below_status_hides_table() {
    let mut backend = temperature_board();
    let mut report = StatusReport::new(ReportConfig::default());
    let text = render(&mut report, &mut backend, 0);
    assert!(!text.contains("BOARD1"));
    assert!(text.contains("ERROR SUMMARY"));
}

#[test]
fn zero_row_rule_hides_the_whole_row() {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    backend
        .insert(status_register("IDLE.FLAG", 0x0, "LINKS", "__1", "__2").with_parameter("Show", "NZR"))
        .unwrap();
    backend
        .insert(status_register("IDLE.COUNT", 0x4, "LINKS", "__1", "__2"))
        .unwrap();
    backend
        .insert(status_register("BUSY.COUNT", 0x8, "LINKS", "__1", "__2"))
        .unwrap();
    backend.poke(0x4, 7);
    backend.poke(0x8, 9);

    let mut report = StatusReport::new(ReportConfig::default());
    let text = render(&mut report, &mut backend, 1);

    assert_eq!(report.table_rows("LINKS").unwrap(), ["BUSY", "IDLE"]);
    assert!(text.contains("            BUSY|"));
    assert!(!text.contains("IDLE|"));

    let forced = render(&mut report, &mut backend, 99);
    assert!(forced.contains("            IDLE|"));
}

#[test]
fn matrix_rejects_entries_of_another_table() {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    backend
        .insert(status_register("A", 0x0, "1_POWER", "R", "C"))
        .unwrap();
    backend
        .insert(status_register("B", 0x4, "power", "R", "D"))
        .unwrap();
    backend
        .insert(status_register("C", 0x8, "CLOCKS", "R", "E"))
        .unwrap();

    let mut matrix = StatusMatrix::new(MarkupStyle::Positional);
    matrix.add("A", &mut backend).unwrap();
    matrix.add("B", &mut backend).unwrap();
    let err = matrix.add("C", &mut backend).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadValue);
    assert!(err.to_string().contains("tried adding entry of table CLOCKS to table POWER"));
    assert_eq!(matrix.cell_count(), 2);
}

#[test]
fn failures_are_summarised_by_kind() {
    let mut backend = temperature_board();
    backend
        .insert(status_register("BROKEN", 0x40, "BOARD1", "ROW_", "VALUE"))
        .unwrap();
    backend
        .insert(status_register("FAR", 0x44, "BOARD1", "__4", "VALUE"))
        .unwrap();
    backend
        .insert(status_register("DEAD", 0x48, "BOARD1", "DEAD", "VALUE"))
        .unwrap();
    backend.inject_bus_fault(0x48);

    let mut report = StatusReport::new(ReportConfig::default());
    let text = render(&mut report, &mut backend, 1);

    let errors = report.errors();
    assert_eq!(errors.registers(ErrorKind::BadMarkupName), ["BROKEN"]);
    assert_eq!(errors.registers(ErrorKind::BadValue), ["FAR"]);
    assert_eq!(errors.registers(ErrorKind::BusError), ["DEAD"]);
    assert!(text.contains("Error type: BusError, # of errors: 1"));
    assert!(text.contains("Error type: BadMarkupName, # of errors: 1"));
    assert!(text.contains("135732"));

    backend.clear_bus_fault(0x48);
    render(&mut report, &mut backend, 1);
    assert!(report.errors().registers(ErrorKind::BusError).is_empty());
}

#[test]
fn registers_without_status_or_table_are_skipped() {
    let mut backend = temperature_board();
    backend
        .insert(RegisterDescriptor::new("PLAIN", 0x80).with_parameter("Table", "BOARD1"))
        .unwrap();
    backend
        .insert(RegisterDescriptor::new("LOOSE", 0x84).with_parameter("Status", "1"))
        .unwrap();

    let mut report = StatusReport::new(ReportConfig::default());
    render(&mut report, &mut backend, 1);
    assert!(report.errors().is_empty());
    assert_eq!(report.table("BOARD1").unwrap().cell_count(), 1);
}

#[test]
fn single_table_filter_ignores_sort_prefix() {
    let mut backend = temperature_board();
    backend
        .insert(status_register("FAN", 0x20, "2_COOLING", "FAN", "RPM"))
        .unwrap();

    let mut report = StatusReport::new(ReportConfig::default());
    let mut out = Vec::new();
    report
        .report_at(&mut backend, &mut out, 1, Some("cooling"), 0)
        .unwrap();
    assert_eq!(report.table_list(), ["2_COOLING"]);
    assert!(report.table("BOARD1").is_err());
}

#[rstest]
#[case(StatusMode::Html, "<table border=\"1\" ><tr><th class=\"name\">BOARD1</th>")]
#[case(StatusMode::BareHtml, "<td title=\"\" class=\"nonerror\">135732</td>")]
#[case(StatusMode::Latex, "TEMP & 0xffff/TEMP")]
#[case(StatusMode::Graphite, "BOARD1.TEMP.VALUE 135732 1700000000")]
fn render_modes(#[case] mode: StatusMode, #[case] expected: &str) {
    let mut backend = temperature_board();
    let mut report = StatusReport::new(ReportConfig {
        mode,
        ..ReportConfig::default()
    });
    let text = render(&mut report, &mut backend, 1);
    assert!(text.contains(expected), "{mode}: {text}");
    assert!(!text.contains("ERROR SUMMARY"));
}

#[test]
fn html_document_is_framed_and_versioned() {
    let mut backend = temperature_board();
    let mut report = StatusReport::new(ReportConfig {
        mode: StatusMode::Html,
        version: "7.1".to_string(),
        ..ReportConfig::default()
    });
    let text = render(&mut report, &mut backend, 1);
    assert!(text.starts_with("<!DOCTYPE html><html><head><style>"));
    assert!(text.contains("td.error { background-color:#FB412d;}"));
    assert!(text.ends_with("<table><tr><td>SW:</td><td>7.1</td></tr></table>\n</body></html>\n"));
}

#[test]
fn graphite_labels_become_path_components() {
    let mut backend = MemoryBackend::new(RegisterNameCase::Upper);
    backend
        .insert(status_register("LINK.ERRORS", 0x0, "NET", "__1", "__2"))
        .unwrap();
    backend
        .insert(
            status_register("LINK.STATE", 0x4, "NET", "__1", "__2")
                .with_parameter("Format", "t_0_DOWN_1_UP"),
        )
        .unwrap();
    backend.poke(0x0, 0x1F);
    backend.poke(0x4, 1);

    let mut report = StatusReport::new(ReportConfig {
        mode: StatusMode::Graphite,
        ..ReportConfig::default()
    });
    let text = render(&mut report, &mut backend, 1);
    assert_eq!(
        text,
        "NET.LINK.ERRORS 0x1F 1700000000\nNET.LINK.STATE.UP 1 1700000000\n"
    );
}
