//! Reply statuses.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Forbidden,
    TooManyRequests,
    InternalServerError,
}

/// Faults injected by the responder, indexed by the fault roll.
pub const FAULTS: [Status; 3] = [
    Status::InternalServerError,
    Status::Forbidden,
    Status::TooManyRequests,
];

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Forbidden => 403,
            Status::TooManyRequests => 429,
            Status::InternalServerError => 500,
        }
    }

    /// Standard reason phrase, also used as the error body.
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Forbidden => "Forbidden",
            Status::TooManyRequests => "Too Many Requests",
            Status::InternalServerError => "Internal Server Error",
        }
    }

    pub fn is_error(self) -> bool {
        self.code() >= 400
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}
