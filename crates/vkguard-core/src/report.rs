//! Diagnostics sink shared by every layer in a chain.
//!
//! Each [`Diagnostic`] is emitted through `tracing` and fanned out to the
//! registered debug messengers, subject to the chain's minimum severity and
//! per-message duplicate limit.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use vkguard_api::{Handle, ObjectType};

use crate::config::ReportSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidParameter,
    InvalidHandle,
    UnknownObject,
    UseAfterFree,
    DoubleDestroy,
    ConcurrentAccess,
    InvalidUsage,
    BindingMismatch,
    ShaderInterfaceMismatch,
    SynchronizationHazard,
    ResourceLeak,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::InvalidParameter,
        ErrorKind::InvalidHandle,
        ErrorKind::UnknownObject,
        ErrorKind::UseAfterFree,
        ErrorKind::DoubleDestroy,
        ErrorKind::ConcurrentAccess,
        ErrorKind::InvalidUsage,
        ErrorKind::BindingMismatch,
        ErrorKind::ShaderInterfaceMismatch,
        ErrorKind::SynchronizationHazard,
        ErrorKind::ResourceLeak,
    ];

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::ResourceLeak => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    /// Stable identifier, e.g. `CoreValidation-CommandBuffer-Pending`.
    pub message_id: &'static str,
    pub objects: Vec<(ObjectType, Handle)>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: kind.default_severity(),
            kind,
            message_id,
            objects: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_object(mut self, object_type: ObjectType, handle: Handle) -> Self {
        self.objects.push((object_type, handle));
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn involves(&self, handle: Handle) -> bool {
        self.objects.iter().any(|(_, h)| *h == handle)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {} {}: {}", self.severity, self.kind, self.message_id, self.message)?;
        for (ty, handle) in &self.objects {
            write!(f, " ({} {})", ty.type_name(), handle)?;
        }
        Ok(())
    }
}

pub type MessengerCallback = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Registration parameters of a debug messenger.
#[derive(Clone)]
pub struct MessengerCreateInfo {
    pub min_severity: Severity,
    /// `None` accepts every kind.
    pub kinds: Option<Vec<ErrorKind>>,
    pub callback: MessengerCallback,
}

impl MessengerCreateInfo {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        Self {
            min_severity: Severity::Verbose,
            kinds: None,
            callback: Arc::new(callback),
        }
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    fn accepts(&self, diag: &Diagnostic) -> bool {
        diag.severity >= self.min_severity
            && self
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&diag.kind))
    }
}

impl fmt::Debug for MessengerCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerCreateInfo")
            .field("min_severity", &self.min_severity)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessengerId(pub u64);

pub struct DebugReport {
    settings: ReportSettings,
    messengers: RwLock<Vec<(MessengerId, MessengerCreateInfo)>>,
    next_messenger: AtomicU64,
    /// Reports seen per message id, for the duplicate limit.
    seen: DashMap<&'static str, u32>,
    counts: DashMap<ErrorKind, u64>,
}

impl DebugReport {
    pub fn new(settings: ReportSettings) -> Self {
        Self {
            settings,
            messengers: RwLock::new(Vec::new()),
            next_messenger: AtomicU64::new(1),
            seen: DashMap::new(),
            counts: DashMap::new(),
        }
    }

    pub fn create_messenger(&self, info: MessengerCreateInfo) -> MessengerId {
        let id = MessengerId(self.next_messenger.fetch_add(1, Ordering::Relaxed));
        self.messengers.write().push((id, info));
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn destroy_messenger(&self, id: MessengerId) -> bool {
        let mut messengers = self.messengers.write();
        let before = messengers.len();
        messengers.retain(|(mid, _)| *mid != id);
        messengers.len() != before
    }

    pub fn report(&self, diag: Diagnostic) {
        *self.counts.entry(diag.kind).or_insert(0) += 1;

        if diag.severity < self.settings.min_severity {
            return;
        }

        let occurrences = {
            let mut seen = self.seen.entry(diag.message_id).or_insert(0);
            *seen += 1;
            *seen
        };
        let limit = self.settings.duplicate_message_limit;
        if limit != 0 && occurrences > limit {
            if occurrences == limit + 1 {
                tracing::debug!(message_id = diag.message_id, "duplicate limit reached, muting");
            }
            return;
        }

        match diag.severity {
            Severity::Error => tracing::error!(kind = %diag.kind, message_id = diag.message_id, "{}", diag.message),
            Severity::Warning => tracing::warn!(kind = %diag.kind, message_id = diag.message_id, "{}", diag.message),
            Severity::Info => tracing::info!(kind = %diag.kind, message_id = diag.message_id, "{}", diag.message),
            Severity::Verbose => tracing::debug!(kind = %diag.kind, message_id = diag.message_id, "{}", diag.message),
        }

        // Callbacks run without the messenger lock held.
        let targets: Vec<MessengerCallback> = self
            .messengers
            .read()
            .iter()
            .filter(|(_, info)| info.accepts(&diag))
            .map(|(_, info)| info.callback.clone())
            .collect();
        for callback in targets {
            callback(&diag);
        }
    }

    /// Reports of this kind so far, including muted duplicates.
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).map(|c| *c).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }
}

impl Default for DebugReport {
    fn default() -> Self {
        Self::new(ReportSettings::default())
    }
}
