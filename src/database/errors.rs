//! Database error to gRPC status mapping.
//!
//! Services returning database failures through the RPC boundary should not
//! leak `sqlx` internals; `to_status` classifies them into the appropriate
//! gRPC code instead.

use tonic::{Code, Status};

/// Maps a database error to a gRPC status.
///
/// A missing row is `NOT_FOUND`; Postgres errors are classified by their
/// SQLSTATE class (connection problems are `UNAVAILABLE`, data exceptions
/// `INVALID_ARGUMENT`, constraint violations `FAILED_PRECONDITION`,
/// authorization failures `PERMISSION_DENIED`); anything else is
/// `INTERNAL`.
pub fn to_status(err: &sqlx::Error) -> Status {
    match err {
        sqlx::Error::RowNotFound => Status::not_found(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let code = db_err
                .code()
                .as_deref()
                .and_then(|code| code.get(..2))
                .map(code_for_class)
                .unwrap_or(Code::Unavailable);
            Status::new(code, db_err.message().to_string())
        }
        _ => Status::internal(err.to_string()),
    }
}

// SQLSTATE class (the first two characters of the five-character code).
fn code_for_class(class: &str) -> Code {
    match class {
        // Connection exception
        "08" => Code::Unavailable,
        // Data exception
        "22" => Code::InvalidArgument,
        // Integrity constraint violation
        "23" => Code::FailedPrecondition,
        // Invalid authorization specification
        "28" => Code::PermissionDenied,
        // Syntax error / access rule violation, internal errors
        "42" | "XX" => Code::Internal,
        _ => Code::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[derive(Debug)]
    struct FakeDbError {
        code: Option<&'static str>,
    }

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database exploded")
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "database exploded"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    fn db_error(code: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError { code }))
    }

    #[test]
    fn missing_row_is_not_found() {
        let status = to_status(&sqlx::Error::RowNotFound);
        assert_eq!(status.code(), Code::NotFound);
    }

    #[test]
    fn sqlstate_classes_map_to_grpc_codes() {
        let cases = [
            ("08006", Code::Unavailable),
            ("22P02", Code::InvalidArgument),
            ("23505", Code::FailedPrecondition),
            ("28000", Code::PermissionDenied),
            ("42601", Code::Internal),
            ("XX000", Code::Internal),
        ];

        for (sqlstate, expected) in cases {
            let status = to_status(&db_error(Some(sqlstate)));
            assert_eq!(status.code(), expected, "sqlstate {sqlstate}");
            assert_eq!(status.message(), "database exploded");
        }
    }

    #[test]
    fn unknown_or_missing_sqlstate_is_unavailable() {
        assert_eq!(
            to_status(&db_error(Some("57014"))).code(),
            Code::Unavailable
        );
        assert_eq!(to_status(&db_error(None)).code(), Code::Unavailable);
    }

    #[test]
    fn anything_else_is_internal() {
        let status = to_status(&sqlx::Error::PoolTimedOut);
        assert_eq!(status.code(), Code::Internal);
    }
}
