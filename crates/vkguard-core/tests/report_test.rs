//! Integration test: diagnostics sink

use std::sync::Arc;

use parking_lot::Mutex;
use vkguard_api::{Handle, ObjectType};
use vkguard_core::config::ReportSettings;
use vkguard_core::{DebugReport, Diagnostic, ErrorKind, MessengerCreateInfo, Severity};

fn collector(report: &DebugReport) -> Arc<Mutex<Vec<Diagnostic>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    report.create_messenger(MessengerCreateInfo::new(move |d| sink.lock().push(d.clone())));
    seen
}

fn usage(id: &'static str) -> Diagnostic {
    Diagnostic::new(ErrorKind::InvalidUsage, id, "bad usage").with_object(ObjectType::Buffer, Handle(3))
}

#[test]
fn test_messenger_receives_diagnostics() {
    let report = DebugReport::default();
    let seen = collector(&report);

    report.report(usage("Test-Usage"));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, ErrorKind::InvalidUsage);
    assert_eq!(seen[0].severity, Severity::Error);
    assert!(seen[0].involves(Handle(3)));
}

#[test]
fn test_duplicate_limit_mutes_but_counts() {
    let report = DebugReport::new(ReportSettings {
        min_severity: Severity::Verbose,
        duplicate_message_limit: 2,
    });
    let seen = collector(&report);

    for _ in 0..5 {
        report.report(usage("Test-Repeated"));
    }
    report.report(usage("Test-Other"));

    assert_eq!(seen.lock().len(), 3);
    assert_eq!(report.count(ErrorKind::InvalidUsage), 6);
    assert_eq!(report.total(), 6);
}

#[test]
fn test_zero_limit_is_unlimited() {
    let report = DebugReport::new(ReportSettings {
        min_severity: Severity::Verbose,
        duplicate_message_limit: 0,
    });
    let seen = collector(&report);
    for _ in 0..50 {
        report.report(usage("Test-Unlimited"));
    }
    assert_eq!(seen.lock().len(), 50);
}

#[test]
fn test_min_severity_filters_delivery() {
    let report = DebugReport::default();
    let seen = collector(&report);

    report.report(
        Diagnostic::new(ErrorKind::ShaderInterfaceMismatch, "Test-Perf", "unused output")
            .with_severity(Severity::Info),
    );
    assert!(seen.lock().is_empty());
    assert_eq!(report.count(ErrorKind::ShaderInterfaceMismatch), 1);
}

#[test]
fn test_messenger_kind_filter_and_destroy() {
    let report = DebugReport::default();
    let leaks = Arc::new(Mutex::new(0));
    let sink = leaks.clone();
    let id = report.create_messenger(
        MessengerCreateInfo::new(move |_| *sink.lock() += 1).kinds([ErrorKind::ResourceLeak]),
    );

    report.report(usage("Test-NotALeak"));
    report.report(Diagnostic::new(ErrorKind::ResourceLeak, "Test-Leak", "leaked"));
    assert_eq!(*leaks.lock(), 1);

    assert!(report.destroy_messenger(id));
    assert!(!report.destroy_messenger(id));
    report.report(Diagnostic::new(ErrorKind::ResourceLeak, "Test-Leak", "leaked"));
    assert_eq!(*leaks.lock(), 1);
}

#[test]
fn test_leak_defaults_to_warning() {
    let diag = Diagnostic::new(ErrorKind::ResourceLeak, "Test-Leak", "leaked");
    assert_eq!(diag.severity, Severity::Warning);
    let text = diag.with_object(ObjectType::Fence, Handle(0x10)).to_string();
    assert!(text.contains("VkFence 0x10"));
}
