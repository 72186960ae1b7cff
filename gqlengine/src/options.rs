use std::borrow::Cow;

/// Options an [`Engine`](crate::Engine) is constructed with.
#[derive(Clone, Debug)]
pub struct Options {
    pub(crate) tracing: bool,
    pub(crate) ws_sub_protocol: Cow<'static, str>,
    pub(crate) tags: bool,
    pub(crate) multipart_parsing_buffer_size: usize,
    pub(crate) debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tracing: false,
            ws_sub_protocol: Cow::Borrowed("graphql-ws"),
            tags: false,
            multipart_parsing_buffer_size: 10 * 1024 * 1024,
            debug: false,
        }
    }
}

impl Options {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches per-phase and per-resolver timings to every response under the `tracing`
    /// extension. Off by default.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Specifies the WebSocket subprotocol subscriptions are served with. `graphql-ws` by
    /// default.
    #[must_use]
    pub fn with_ws_sub_protocol(mut self, protocol: impl Into<Cow<'static, str>>) -> Self {
        self.ws_sub_protocol = protocol.into();
        self
    }

    /// Exposes the `_tags` query listing the operations per tag. Off by default.
    #[must_use]
    pub fn with_tags(mut self, enabled: bool) -> Self {
        self.tags = enabled;
        self
    }

    /// Specifies the maximum size of a multipart request body. 10 MiB by default.
    #[must_use]
    pub fn with_multipart_parsing_buffer_size(mut self, size: usize) -> Self {
        self.multipart_parsing_buffer_size = size;
        self
    }

    /// Attaches panic messages to the internal errors of recovered resolver panics. Off by
    /// default.
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Indicates whether timings are attached to responses.
    pub fn tracing(&self) -> bool {
        self.tracing
    }

    /// Returns the WebSocket subprotocol.
    pub fn ws_sub_protocol(&self) -> &str {
        &self.ws_sub_protocol
    }

    /// Indicates whether the `_tags` query is exposed.
    pub fn tags(&self) -> bool {
        self.tags
    }

    /// Returns the maximum size of a multipart request body.
    pub fn multipart_parsing_buffer_size(&self) -> usize {
        self.multipart_parsing_buffer_size
    }

    /// Indicates whether panic messages are attached to internal errors.
    pub fn debug(&self) -> bool {
        self.debug
    }
}
