//! Feature extraction.
//!
//! Maps one loaded report to a flat named record: static PE attributes,
//! YARA/CAPE-YARA aggregates, behavioral aggregates and top-level
//! scoring hints. Pure function of the report; every read defaults on
//! absence.
//!
//! Join semantics: concatenation follows the report's native list order
//! and is never re-sorted. A text field whose backing section is absent
//! gets an explicit sentinel ("Unknown"/"N/A") instead of an empty
//! string, so downstream encoders can tell "absent" from "empty".

use serde_json::Value;

use crate::logic::report::Report;

use super::record::{FeatureRecord, RawValue};

/// Sentinel for absent free-text sections.
pub const ABSENT_TEXT: &str = "N/A";

/// Sentinel for an absent file name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Extract the named feature record for one report.
pub fn extract(report: &Report) -> FeatureRecord {
    let mut record = FeatureRecord::new();

    // --- Static file attributes ---
    record.push_text("filename", report.str_at(&["target", "file", "name"], UNKNOWN_NAME));
    record.push_number("size", report.f64_at(&["target", "file", "size"]));
    record.push_text("md5", report.str_at(&["target", "file", "md5"], "No-hashed"));
    record.push_text("sha1", report.str_at(&["target", "file", "sha1"], "No-hashed"));
    record.push_text("sha256", report.str_at(&["target", "file", "sha256"], "No-hashed"));
    record.push_text("ssdeep", report.str_at(&["target", "file", "ssdeep"], "No-ssdeep"));
    record.push_text("type", report.str_at(&["target", "file", "type"], "unknown"));

    // --- YARA / CAPE-YARA aggregates ---
    push_rule_fields(&mut record, report, "yara", "yara");
    push_rule_fields(&mut record, report, "cape_yara", "cape_yara");

    // --- PE structure ---
    record.push_text(
        "pe_digital_signers",
        join_strings(report.array_at(&["target", "file", "pe", "digital_signers"])),
    );
    record.push_text("pe_imagebase", report.str_at(&["target", "file", "pe", "imagebase"], "0"));
    record.push_text("pe_entrypoint", report.str_at(&["target", "file", "pe", "entrypoint"], "0"));
    record.push_text("pe_ep_bytes", report.str_at(&["target", "file", "pe", "ep_bytes"], ABSENT_TEXT));
    record.push_text(
        "pe_reported_checksum",
        report.str_at(&["target", "file", "pe", "reported_checksum"], "0"),
    );
    record.push_text(
        "pe_actual_checksum",
        report.str_at(&["target", "file", "pe", "actual_checksum"], "0"),
    );
    record.push_text(
        "pe_exported_dll_name",
        report.str_at(&["target", "file", "pe", "exported_dll_name"], ABSENT_TEXT),
    );
    record.push_number(
        "pe_imported_dll_count",
        report.f64_at(&["target", "file", "pe", "imported_dll_count"]),
    );

    let sections = report.array_at(&["target", "file", "pe", "sections"]);
    record.push_text("pe_sections", join_field(sections, "name"));
    record.push_number("pe_section_count", sections.len() as f64);
    record.push_text(
        "pe_entropy",
        sections
            .iter()
            .map(|s| match s.get("entropy") {
                Some(Value::String(v)) => v.clone(),
                Some(Value::Number(v)) => v.to_string(),
                _ => ABSENT_TEXT.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
    );

    record.push_text(
        "pe_overlay_offset",
        report.str_at(&["target", "file", "pe", "overlay", "offset"], ABSENT_TEXT),
    );
    record.push_text(
        "pe_overlay_size",
        report.str_at(&["target", "file", "pe", "overlay", "size"], ABSENT_TEXT),
    );

    // Import entries render as "<name> at <address>" pairs.
    record.push_text(
        "pe_imports",
        report
            .array_at(&["target", "file", "pe", "imports", "mscoree", "imports"])
            .iter()
            .map(|imp| {
                format!(
                    "{} at {}",
                    imp.get("name").and_then(Value::as_str).unwrap_or(""),
                    imp.get("address").and_then(Value::as_str).unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
    );
    record.push_text(
        "pe_exports",
        join_field(report.array_at(&["target", "file", "pe", "exports"]), "name"),
    );

    let custom = report.at(&["target", "file", "strings"]);
    record.push_text(
        "custom_strings",
        match custom.and_then(Value::as_array) {
            Some(items) => join_strings(items),
            None => ABSENT_TEXT.to_string(),
        },
    );

    // --- Top-level scoring hints ---
    record.push_text("malstatus", report.str_at(&["malstatus"], "unknown"));
    record.push_number("malscore", report.f64_at(&["malscore"]));

    // --- Behavioral aggregates ---
    let processes = report.array_at(&["behavior", "processes"]);
    record.push_number("behavior_process_count", processes.len() as f64);

    let mut call_apis = Vec::new();
    let mut call_repeats = Vec::new();
    for process in processes {
        for call in process
            .get("calls")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
        {
            call_apis.push(call.get("api").and_then(Value::as_str).unwrap_or("").to_string());
            call_repeats.push(call.get("repeated").and_then(Value::as_f64).unwrap_or(0.0));
        }
    }
    record.push_text(
        "call_api",
        if report.at(&["behavior"]).is_none() {
            ABSENT_TEXT.to_string()
        } else {
            call_apis.join(", ")
        },
    );
    record.push("call_repeat", RawValue::NumberList(call_repeats));

    // --- Signature matches ---
    let signatures = report.array_at(&["signatures"]);
    record.push_text(
        "sig_name",
        if report.at(&["signatures"]).is_none() {
            ABSENT_TEXT.to_string()
        } else {
            join_with(signatures, "name", " ")
        },
    );
    record.push_text(
        "sig_description",
        if report.at(&["signatures"]).is_none() {
            ABSENT_TEXT.to_string()
        } else {
            join_with(signatures, "description", " ")
        },
    );
    record.push(
        "sig_severity",
        RawValue::NumberList(
            signatures
                .iter()
                .map(|s| s.get("severity").and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
        ),
    );
    record.push(
        "sig_confidence",
        RawValue::NumberList(
            signatures
                .iter()
                .map(|s| s.get("confidence").and_then(Value::as_f64).unwrap_or(0.0))
                .collect(),
        ),
    );

    record.push_text(
        "ttp_signatures",
        join_with(report.array_at(&["ttps"]), "signature", ", "),
    );

    record
}

/// Names space-joined, descriptions and strings comma-joined, matching
/// the native report presentation of rule hits.
fn push_rule_fields(record: &mut FeatureRecord, report: &Report, section: &str, prefix: &str) {
    let rules = report.array_at(&["target", "file", section]);
    let absent = report.at(&["target", "file", section]).is_none();

    let names = rules
        .iter()
        .map(|r| r.get("name").and_then(Value::as_str).unwrap_or("").to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let descriptions = rules
        .iter()
        .map(|r| {
            r.get("meta")
                .and_then(|m| m.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(", ");
    let strings = rules
        .iter()
        .flat_map(|r| {
            r.get("strings")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let or_absent = |joined: String| {
        if absent {
            ABSENT_TEXT.to_string()
        } else {
            joined
        }
    };

    record.push_text(&format!("{}_names", prefix), or_absent(names));
    record.push_text(&format!("{}_descriptions", prefix), or_absent(descriptions));
    record.push_text(&format!("{}_strings", prefix), or_absent(strings));
}

fn join_strings(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_field(items: &[Value], field: &str) -> String {
    join_with(items, field, ", ")
}

fn join_with(items: &[Value], field: &str, sep: &str) -> String {
    items
        .iter()
        .map(|item| item.get(field).and_then(Value::as_str).unwrap_or("").to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_report() -> Report {
        Report::from_value(json!({
            "target": {
                "file": {
                    "name": "dropper.exe",
                    "size": 4096,
                    "md5": "aa", "sha1": "bb", "sha256": "cc",
                    "type": "PE32 executable",
                    "yara": [
                        {"name": "UPX", "meta": {"description": "packer"}, "strings": ["UPX0", "UPX1"]},
                        {"name": "Loader", "strings": []}
                    ],
                    "pe": {
                        "imagebase": "0x400000",
                        "entrypoint": "0x4014e0",
                        "imported_dll_count": 3,
                        "sections": [
                            {"name": ".text", "entropy": "6.1"},
                            {"name": ".rsrc", "entropy": "7.9"}
                        ]
                    },
                    "strings": ["http://evil.example", "cmd.exe"]
                }
            },
            "malstatus": "malicious",
            "malscore": 9.1,
            "behavior": {
                "processes": [
                    {"calls": [
                        {"api": "CreateFileW", "repeated": 2},
                        {"api": "WriteFile", "repeated": 5}
                    ]},
                    {"calls": [{"api": "RegSetValueExW", "repeated": 1}]}
                ]
            },
            "signatures": [
                {"name": "persistence_autorun", "description": "Installs autorun", "severity": 3, "confidence": 80},
                {"name": "network_http", "description": "HTTP traffic", "severity": 1, "confidence": 50}
            ],
            "ttps": [{"signature": "T1547"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_extract_static_fields() {
        let record = extract(&sample_report());
        assert_eq!(record.get("filename").unwrap().as_text(), Some("dropper.exe"));
        assert_eq!(record.get("size").unwrap().coerce_numeric(), Some(4096.0));
        assert_eq!(record.get("type").unwrap().as_text(), Some("PE32 executable"));
        assert_eq!(record.get("pe_imagebase").unwrap().as_text(), Some("0x400000"));
        assert_eq!(record.get("pe_section_count").unwrap().coerce_numeric(), Some(2.0));
    }

    #[test]
    fn test_join_order_follows_report_order() {
        let record = extract(&sample_report());
        assert_eq!(record.get("yara_names").unwrap().as_text(), Some("UPX Loader"));
        assert_eq!(
            record.get("yara_strings").unwrap().as_text(),
            Some("UPX0, UPX1")
        );
        assert_eq!(
            record.get("call_api").unwrap().as_text(),
            Some("CreateFileW, WriteFile, RegSetValueExW")
        );
        assert_eq!(
            record.get("sig_name").unwrap().as_text(),
            Some("persistence_autorun network_http")
        );
    }

    #[test]
    fn test_behavioral_aggregates() {
        let record = extract(&sample_report());
        assert_eq!(
            record.get("behavior_process_count").unwrap().coerce_numeric(),
            Some(2.0)
        );
        assert_eq!(
            record.get("call_repeat").unwrap(),
            &RawValue::NumberList(vec![2.0, 5.0, 1.0])
        );
        assert_eq!(
            record.get("sig_severity").unwrap().coerce_numeric(),
            Some(4.0)
        );
    }

    #[test]
    fn test_missing_sections_use_sentinels_never_raise() {
        let report = Report::from_value(json!({"some": "thing"})).unwrap();
        let record = extract(&report);

        assert_eq!(record.get("filename").unwrap().as_text(), Some(UNKNOWN_NAME));
        assert_eq!(record.get("size").unwrap().coerce_numeric(), Some(0.0));
        assert_eq!(record.get("malstatus").unwrap().as_text(), Some("unknown"));
        assert_eq!(record.get("malscore").unwrap().coerce_numeric(), Some(0.0));

        // Absent sections carry the sentinel, not an empty string.
        assert_eq!(record.get("yara_names").unwrap().as_text(), Some(ABSENT_TEXT));
        assert_eq!(record.get("call_api").unwrap().as_text(), Some(ABSENT_TEXT));
        assert_eq!(record.get("sig_name").unwrap().as_text(), Some(ABSENT_TEXT));
        assert_eq!(record.get("custom_strings").unwrap().as_text(), Some(ABSENT_TEXT));
        assert_eq!(
            record.get("behavior_process_count").unwrap().coerce_numeric(),
            Some(0.0)
        );
    }

    #[test]
    fn test_present_but_empty_differs_from_absent() {
        let report = Report::from_value(json!({
            "target": {"file": {"yara": []}},
            "signatures": []
        }))
        .unwrap();
        let record = extract(&report);
        assert_eq!(record.get("yara_names").unwrap().as_text(), Some(""));
        assert_eq!(record.get("sig_name").unwrap().as_text(), Some(""));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let report = sample_report();
        let a = extract(&report);
        let b = extract(&report);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
