use crate::sources::InverterId;
use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "dpl", "sim", "main")
    pub component: String,
    /// Serial of the inverter the messages refer to
    pub inverter: Option<InverterId>,
    /// Additional context fields
    pub extra_fields: std::collections::BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            inverter: None,
            extra_fields: std::collections::BTreeMap::new(),
        }
    }

    /// Set the inverter serial
    #[must_use]
    pub const fn with_inverter(mut self, inverter: InverterId) -> Self {
        self.inverter = Some(inverter);
        self
    }

    /// Add extra field
    #[must_use]
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    /// Create a new structured logger with context
    pub const fn new(context: LogContext) -> Self {
        Self { context }
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    /// Same logger, bound to another inverter
    #[must_use]
    pub fn for_inverter(&self, inverter: InverterId) -> Self {
        Self::new(self.context.clone().with_inverter(inverter))
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(inverter) = self.context.inverter {
            fields.push(format!("inverter={inverter}"));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{key}={value}"));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub const fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
