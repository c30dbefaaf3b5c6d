//! Upstream status code → gateway error mapping.
//!
//! The production gateway does not pass backend status codes through
//! unchanged. This table reproduces what it answers for each one.

use std::collections::HashMap;

/// Status, reason and domain the gateway reports for an upstream status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub http_status: u16,
    pub reason: &'static str,
    pub domain: &'static str,
}

impl ErrorInfo {
    const fn new(http_status: u16, reason: &'static str) -> Self {
        Self {
            http_status,
            reason,
            domain: "global",
        }
    }
}

const UNSUPPORTED: ErrorInfo = ErrorInfo::new(404, "unsupportedProtocol");
const BACKEND_ERROR: ErrorInfo = ErrorInfo::new(503, "backendError");

/// Immutable lookup table, built once at startup.
#[derive(Debug, Clone)]
pub struct StatusCodeMap {
    entries: HashMap<u16, ErrorInfo>,
}

impl Default for StatusCodeMap {
    fn default() -> Self {
        let entries = [
            (400, ErrorInfo::new(400, "badRequest")),
            (401, ErrorInfo::new(401, "required")),
            (402, UNSUPPORTED),
            (403, ErrorInfo::new(403, "forbidden")),
            (404, ErrorInfo::new(404, "notFound")),
            (405, ErrorInfo::new(501, "unsupportedMethod")),
            (406, UNSUPPORTED),
            (407, UNSUPPORTED),
            (408, BACKEND_ERROR),
            (409, ErrorInfo::new(409, "conflict")),
            (410, ErrorInfo::new(410, "deleted")),
            (411, UNSUPPORTED),
            (412, ErrorInfo::new(412, "conditionNotMet")),
            (413, ErrorInfo::new(413, "uploadTooLarge")),
            (414, UNSUPPORTED),
            (415, UNSUPPORTED),
            (416, UNSUPPORTED),
            (417, UNSUPPORTED),
        ]
        .into_iter()
        .collect();

        Self { entries }
    }
}

impl StatusCodeMap {
    /// Look up the gateway-facing error for an upstream status.
    ///
    /// Every 5xx collapses to `503 backendError`; anything unlisted is
    /// reported as `404 unsupportedProtocol`.
    pub fn lookup(&self, upstream_status: u16) -> &ErrorInfo {
        if upstream_status >= 500 {
            return &BACKEND_ERROR;
        }
        self.entries.get(&upstream_status).unwrap_or(&UNSUPPORTED)
    }
}
