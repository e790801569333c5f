//! Request identifiers for analytics hand-offs.
//!
//! An id is `msg_<unix millis>_<uuid v4 as 32 hex chars>`. The timestamp keeps ids roughly
//! sortable in logs; the random part makes collisions between concurrent turns
//! practically impossible.

use chrono::Utc;
use uuid::Uuid;

const PREFIX: &str = "msg_";

/// Generates a new request id. Never blocks, never fails.
pub fn generate_request_id() -> String {
    format!(
        "{}{}_{}",
        PREFIX,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Whether `id` has the shape produced by [`generate_request_id`].
pub fn is_request_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(PREFIX) else {
        return false;
    };
    match rest.split_once('_') {
        Some((millis, random)) => {
            !millis.is_empty()
                && millis.bytes().all(|b| b.is_ascii_digit())
                && random.len() == 32
                && random.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}
