use thiserror::Error;

/// Primary error type for recorder checkpoint operations.
///
/// The hot write paths never surface errors: allocation failure marks the
/// writer invalid and subsequent writes become no-ops, oversized small-framed
/// events are silently discarded, and an empty serialization is rolled back.
/// These variants cover the cold surfaces — writer construction and buffer
/// leasing — where a caller can actually react.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The backing buffer could not grow to satisfy a write or reservation.
    #[error("buffer exhausted: requested {requested} bytes, capacity {capacity}")]
    BufferExhausted { requested: usize, capacity: usize },

    /// The buffer pool is at its outstanding-lease limit.
    #[error("no writer buffer available for lease (outstanding {outstanding}, limit {limit})")]
    LeaseUnavailable { outstanding: usize, limit: usize },
}

/// Convenience alias used throughout the recorder crates.
pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        let e = RecorderError::BufferExhausted {
            requested: 512,
            capacity: 256,
        };
        assert_eq!(
            e.to_string(),
            "buffer exhausted: requested 512 bytes, capacity 256"
        );

        let e = RecorderError::LeaseUnavailable {
            outstanding: 4,
            limit: 4,
        };
        assert_eq!(
            e.to_string(),
            "no writer buffer available for lease (outstanding 4, limit 4)"
        );
    }
}
