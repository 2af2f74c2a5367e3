use crate::base::neterror::BridgeError;
use crate::base::responsestate::ResponseState;

#[test]
fn test_error_codes_are_distinct() {
    let errors = [
        BridgeError::RuntimeInitFailed,
        BridgeError::ContextInitFailed { message: String::new() },
        BridgeError::setter_failed("uri", ""),
        BridgeError::UnsupportedVersion("HTTP/3.0".into()),
        BridgeError::InvalidUrl,
        BridgeError::BeginFailed { message: String::new() },
        BridgeError::CompleteBodyFailed { message: String::new() },
        BridgeError::request_failed("", 0),
        BridgeError::cancelled(""),
        BridgeError::InvalidState(""),
        BridgeError::Disposed(""),
        BridgeError::BodyError(String::new()),
        BridgeError::InvalidUtf8,
        BridgeError::JsonParseError,
    ];
    let mut codes: Vec<i32> = errors.iter().map(|e| e.as_i32()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}

#[test]
fn test_cancellation_is_not_failure() {
    let cancelled = BridgeError::cancelled("request cancelled");
    assert!(cancelled.is_cancelled());
    assert!(!cancelled.is_native());

    let failed = BridgeError::request_failed("connection reset", 0);
    assert!(!failed.is_cancelled());
    assert!(failed.is_native());
}

#[test]
fn test_request_failed_display() {
    let plain = BridgeError::request_failed("connection reset", 0);
    assert_eq!(plain.to_string(), "connection reset");

    let reset = BridgeError::request_failed("stream error", 0x8);
    assert_eq!(
        reset.to_string(),
        "The HTTP/2 server reset the stream. HTTP/2 error code (0x8): stream error"
    );
}

#[test]
fn test_setter_failed_display() {
    let err = BridgeError::setter_failed("header", "invalid header name");
    assert_eq!(err.to_string(), "Setting request header failed: invalid header name");
}

#[test]
fn test_terminal_states() {
    assert!(ResponseState::Completed.is_terminal());
    assert!(ResponseState::Failed.is_terminal());
    assert!(ResponseState::Cancelled.is_terminal());
    assert!(!ResponseState::BodyStreaming.is_terminal());
    assert!(!ResponseState::Created.is_terminal());
}

#[test]
fn test_no_transition_out_of_terminal() {
    for terminal in [ResponseState::Completed, ResponseState::Failed, ResponseState::Cancelled] {
        for next in [
            ResponseState::HeadersReceived,
            ResponseState::BodyStreaming,
            ResponseState::Completed,
            ResponseState::Failed,
            ResponseState::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
        }
    }
}

#[test]
fn test_happy_path_transitions() {
    use ResponseState::*;
    assert!(Created.can_transition_to(HeadersPending));
    assert!(HeadersPending.can_transition_to(HeadersReceived));
    assert!(HeadersReceived.can_transition_to(BodyStreaming));
    assert!(BodyStreaming.can_transition_to(Completed));
    assert!(HeadersReceived.can_transition_to(Completed));
}

#[test]
fn test_body_requires_headers() {
    use ResponseState::*;
    assert!(!HeadersPending.can_transition_to(BodyStreaming));
    assert!(!HeadersPending.can_transition_to(Completed));
    assert!(!BodyStreaming.can_transition_to(HeadersReceived));
}
