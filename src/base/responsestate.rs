/// Lifecycle of one exchange's response, driven by native callbacks and
/// local cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    /// The exchange state exists but the engine has not been started.
    #[default]
    Created,

    /// The exchange has begun; waiting for the status line.
    HeadersPending,

    /// Status and headers are available.
    HeadersReceived,

    /// At least one body chunk has arrived.
    BodyStreaming,

    /// The body finished cleanly (trailers, if any, are available).
    Completed,

    /// The engine reported an error.
    Failed,

    /// Cancelled locally or aborted by the engine.
    Cancelled,
}

impl ResponseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResponseState::Completed | ResponseState::Failed | ResponseState::Cancelled)
    }

    pub fn has_headers(self) -> bool {
        matches!(
            self,
            ResponseState::HeadersReceived | ResponseState::BodyStreaming | ResponseState::Completed
        )
    }

    /// Whether `next` is a legal successor. Terminal states have none.
    pub fn can_transition_to(self, next: ResponseState) -> bool {
        use ResponseState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) => true,
            (_, Failed) => true,
            (Created, HeadersPending) => true,
            (Created | HeadersPending, HeadersReceived) => true,
            (HeadersReceived, BodyStreaming) => true,
            (HeadersReceived | BodyStreaming, Completed) => true,
            _ => false,
        }
    }
}
