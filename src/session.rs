use typed_builder::TypedBuilder;

/// Options a store session is opened with.
///
/// ```
/// use deltadb::session::SessionOptions;
///
/// let options = SessionOptions::builder().read_only(true).label("reporting").build();
/// assert!(options.read_only);
/// ```
#[derive(TypedBuilder, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// A read-only session rejects every write before it reaches the backend.
    #[builder(default)]
    pub read_only: bool,
    /// Reads may be served by stale replicas. Backends without replicas ignore it.
    #[builder(default)]
    pub secondary_preferred: bool,
    /// Recorded on every log line emitted by the session, to tell sessions apart.
    #[builder(default, setter(strip_option, into))]
    pub label: Option<String>,
}

impl SessionOptions {
    pub fn read_only_session() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub(crate) fn log_label(&self) -> &str {
        self.label.as_deref().unwrap_or("default")
    }
}
